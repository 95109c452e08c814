use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    /// Invalid or missing run configuration. Fatal at setup.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("credential minting failed: {0}")]
    Credential(String),

    /// Connection or timeout failure for a single request.
    #[error("request failed: {0}")]
    Transport(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("export failed: {0}")]
    Export(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl HarnessError {
    pub fn config(msg: impl Into<String>) -> Self {
        HarnessError::Configuration(msg.into())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, HarnessError::Configuration(_) | HarnessError::Credential(_))
    }

    /// 2 when the run could not be set up, 1 for store, export and I/O failures.
    pub fn exit_code(&self) -> u8 {
        if self.is_fatal() {
            2
        } else {
            1
        }
    }
}

pub type Result<T> = std::result::Result<T, HarnessError>;
