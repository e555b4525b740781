use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    // Lookup errors
    #[error("Not found: {0}")]
    NotFound(String),

    // Graph errors
    #[error("Flow graph parse error: {0}")]
    Parse(String),

    // Node execution errors
    #[error("Missing credential for provider: {0}")]
    MissingCredential(String),

    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    // Non-fatal side channels
    #[error("Ledger write failed: {0}")]
    LedgerWrite(String),

    #[error("Status signal delivery failed: {channel}: {message}")]
    SignalDelivery { channel: String, message: String },

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Gateway errors
    #[error("Gateway error: {0}")]
    Gateway(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FlowError {
    /// Whether this error aborts a flow run.
    ///
    /// Ledger and signal delivery failures are logged and swallowed by the
    /// engine; every other kind stops execution immediately.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            FlowError::LedgerWrite(_) | FlowError::SignalDelivery { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FlowError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
