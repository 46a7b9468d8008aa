use thiserror::Error;

/// Failure talking to the ecommerce backend.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store request to `{endpoint}` failed: {message}")]
    Transport { endpoint: String, message: String },
    #[error("store endpoint `{endpoint}` returned status {status}")]
    Status { endpoint: String, status: u16 },
    #[error("could not decode store response from `{endpoint}`: {message}")]
    Decode { endpoint: String, message: String },
    #[error("store client could not be configured: {0}")]
    Configuration(String),
}

impl StoreError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "store_transport",
            Self::Status { .. } => "store_status",
            Self::Decode { .. } => "store_decode",
            Self::Configuration(_) => "store_configuration",
        }
    }
}
