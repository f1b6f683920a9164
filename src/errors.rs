use thiserror::Error;

#[derive(Error, Debug)]
pub enum WhoisError {
    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    #[error("Invalid IP address: {0}")]
    InvalidAddress(String),

    #[error("No server found for {0}")]
    NotFound(String),

    #[error("Network error talking to {server}: {reason}")]
    Network { server: String, reason: String },

    #[error("Server list unavailable ({source_name}): {reason}")]
    RegistryUnavailable { source_name: String, reason: String },

    #[error("Could not decode response as {encoding}")]
    Decode { encoding: String },

    #[error("Gave up after following {0} referrals")]
    TooManyReferrals(usize),

    #[error("RDAP query to {url} failed with status {status}")]
    Rdap { url: String, status: u16 },

    #[error("Network timeout")]
    Timeout,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Response too large")]
    ResponseTooLarge,

    #[error("Configuration error: {0}")]
    ConfigError(#[from] config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tokio::time::error::Elapsed> for WhoisError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        WhoisError::Timeout
    }
}

impl WhoisError {
    pub fn network(server: &str, reason: impl ToString) -> Self {
        WhoisError::Network {
            server: server.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn registry(source_name: &str, reason: impl ToString) -> Self {
        WhoisError::RegistryUnavailable {
            source_name: source_name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Errors worth a second attempt on a fresh connection.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WhoisError::Network { .. } | WhoisError::Timeout | WhoisError::IoError(_)
        )
    }
}
