//! Service configuration, built once at startup from the environment and
//! passed into each component constructor. No ambient globals.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Inference provider settings.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// API key for the provider; empty means unconfigured (health reports it).
    pub api_key: String,
    /// Base URL of the provider REST API.
    pub base_url: String,
    /// Model name used for structured-critique generation.
    pub model: String,
    /// Per-call timeout for provider requests.
    pub timeout: Duration,
}

/// Usage ledger service settings.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Base URL of the ledger service.
    pub base_url: String,
    /// Per-call timeout for ledger requests.
    pub timeout: Duration,
}

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub provider: ProviderConfig,
    pub ledger: LedgerConfig,
    /// Directory staged artifacts are written to.
    pub staging_dir: PathBuf,
    /// Interval between remote job state polls.
    pub poll_interval: Duration,
    /// Wall-clock deadline for the polling stage.
    pub poll_deadline: Duration,
}

const DEFAULT_PROVIDER_BASE: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

impl Config {
    /// Load configuration from the environment, falling back to defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr = env_or("BIND_ADDR", "0.0.0.0:8000")
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid BIND_ADDR: {}", e))?;

        let api_key = std::env::var("GEMINI_API_KEY").unwrap_or_default();
        if api_key.is_empty() {
            tracing::error!("GEMINI_API_KEY is missing; analysis requests will fail");
        }

        Ok(Self {
            bind_addr,
            provider: ProviderConfig {
                api_key,
                base_url: env_or("PROVIDER_BASE_URL", DEFAULT_PROVIDER_BASE),
                model: env_or("PROVIDER_MODEL", DEFAULT_MODEL),
                timeout: Duration::from_secs(10),
            },
            ledger: LedgerConfig {
                base_url: env_or("LEDGER_BASE_URL", "http://localhost:3000"),
                timeout: Duration::from_secs(10),
            },
            staging_dir: std::env::var("STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir()),
            poll_interval: Duration::from_secs(3),
            poll_deadline: Duration::from_secs(45),
        })
    }

    /// Whether the inference-provider credential is configured.
    pub fn provider_key_set(&self) -> bool {
        !self.provider.api_key.is_empty()
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
