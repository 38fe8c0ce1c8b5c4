//! HTTP API for the analysis service.
//!
//! ## Endpoints
//!
//! - `POST /analyze-video` - Run one quota-gated analysis on an uploaded video
//! - `GET /quota-status` - Proxy the caller's current ledger snapshot
//! - `GET /health` - Liveness plus provider-credential presence
//! - `GET /` - Service banner

mod auth;
mod routes;
pub mod types;

pub use routes::{router, serve, AppState};
pub use types::*;
