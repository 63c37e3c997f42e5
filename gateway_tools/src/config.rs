use log::*;
use plg_common::Secret;

#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    /// Base URL of the gateway REST API, e.g. "https://api.gateway.example".
    pub base_url: String,
    pub api_key: Secret<String>,
    /// Per-request timeout in seconds. The client never retries on its own; retries happen at the
    /// next reconciliation sweep.
    pub timeout_secs: u64,
}

const DEFAULT_TIMEOUT_SECS: u64 = 15;

impl GatewayConfig {
    pub fn new_from_env_or_default() -> Self {
        let base_url = std::env::var("PLG_GATEWAY_URL").unwrap_or_else(|_| {
            warn!("PLG_GATEWAY_URL not set. Using a placeholder that will not reach any gateway.");
            "https://localhost:9443".to_string()
        });
        let api_key = Secret::new(std::env::var("PLG_GATEWAY_API_KEY").unwrap_or_else(|_| {
            warn!("PLG_GATEWAY_API_KEY not set. Gateway calls will be rejected upstream.");
            String::default()
        }));
        let timeout_secs = std::env::var("PLG_GATEWAY_TIMEOUT")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Self { base_url, api_key, timeout_secs }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.reveal().is_empty()
    }
}
