use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("The gateway client is not configured. Set PLG_GATEWAY_URL and PLG_GATEWAY_API_KEY.")]
    NotConfigured,
    #[error("Could not reach the gateway: {0}")]
    RequestError(String),
    #[error("Could not deserialize gateway response: {0}")]
    JsonError(String),
    #[error("Gateway call failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
    #[error("The gateway does not know reference {0}")]
    ReferenceNotFound(String),
}

impl GatewayApiError {
    /// Transient errors leave the local intent pending; the reconciler retries on the next sweep.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RequestError(_) => true,
            Self::QueryError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
