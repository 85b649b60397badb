use thiserror::Error;

/// Every failure the bridge can report.
///
/// Components never let these escape as panics; each one is turned into a
/// `Response { success: false, error }` at the component boundary via
/// [`crate::protocol::Response::from_error`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {url}")]
    HttpStatus { status: u16, url: String },

    /// 404 from the ledger. Usually means "not initialized yet" rather than a
    /// real failure; balance and decimals resolution turn it into a default.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("Wallet not found. Please install the Petra wallet extension from the Chrome Web Store.")]
    WalletUnavailable,

    #[error("Connection rejected by user.")]
    WalletRejected,

    #[error("{0}")]
    Submission(String),

    #[error("Transaction failed: {vm_status}")]
    ExecutionFailure { vm_status: String, hash: String },

    #[error("Transaction not confirmed: timeout waiting for transaction")]
    ConfirmationTimeout { hash: String },

    #[error("Timeout waiting for response")]
    RelayTimeout,

    #[error("Content script not loaded. Use the \"Reload\" button.")]
    ReceiverMissing,

    #[error("Content script injection failed: {0}")]
    InjectionFailed(String),

    #[error("Cannot inject content script on this page type")]
    UnsupportedContext,

    #[error("No active tab found")]
    NoActiveTab,

    #[error("Busy")]
    Busy,
}

impl BridgeError {
    /// Transaction hash attached to the failure, if one was submitted.
    pub fn hash(&self) -> Option<&str> {
        match self {
            BridgeError::ExecutionFailure { hash, .. } | BridgeError::ConfirmationTimeout { hash } => {
                Some(hash)
            }
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BridgeError::NotFound(_))
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BridgeError::MalformedResponse(err.to_string())
        } else {
            BridgeError::Network(err.to_string())
        }
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
