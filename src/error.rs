// Error taxonomy shared by the device adapter, session client and controller

use thiserror::Error;

/// Exit code for a clean shutdown
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for user errors (bad config, bad arguments)
pub const EXIT_USER: i32 = 1;
/// Exit code for unrecoverable runtime failures (device or login at startup)
pub const EXIT_FATAL: i32 = 2;

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Device unreachable, address invalid, or link lost
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ConnectionError(pub String);

impl ConnectionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Device connection failed: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Time tracking service unavailable: {operation} failed after {attempts} attempt(s): {reason}")]
    RemoteUnavailable {
        operation: String,
        attempts: u32,
        reason: String,
    },

    #[error("Time tracking service rejected {operation} (HTTP {status}): {body}")]
    Rejected {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    pub fn config(message: impl Into<String>) -> Self {
        BridgeError::Config(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        BridgeError::Auth(message.into())
    }

    /// Whether the controller can keep running after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BridgeError::RemoteUnavailable { .. } | BridgeError::Rejected { .. } | BridgeError::Auth(_)
        )
    }

    /// Get the process exit code for this error when it reaches `main`
    pub fn exit_code(&self) -> i32 {
        match self {
            BridgeError::Config(_) => EXIT_USER,
            BridgeError::Cancelled => EXIT_SUCCESS,
            BridgeError::Connection(_)
            | BridgeError::Auth(_)
            | BridgeError::RemoteUnavailable { .. }
            | BridgeError::Rejected { .. }
            | BridgeError::Io(_) => EXIT_FATAL,
        }
    }
}
