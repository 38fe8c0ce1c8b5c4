//! Quota-gated workout video form analysis.
//!
//! One workflow: accept an uploaded video, stage it locally, drive one
//! asynchronous analysis job on a remote media-understanding provider,
//! parse the structured critique, and charge the caller's usage quota
//! only after the critique succeeds.

pub mod analysis;
pub mod api;
pub mod config;
pub mod error;
pub mod ledger;
pub mod pipeline;
pub mod provider;
pub mod staging;
