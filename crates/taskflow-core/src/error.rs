use thiserror::Error;

pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong. Please try again.";
pub const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired. Please log in again.";

/// Failures of remote calls and of the store operations built on them.
///
/// Field-level input problems are not represented here; those are
/// [`crate::validate::ValidationErrors`] and never leave the form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The server rejected the token (HTTP 401), or there is no token to send.
    #[error("session expired or missing; log in again")]
    AuthExpired,

    #[error("remote API returned HTTP {status}")]
    Remote {
        status: u16,
        message: Option<String>,
    },

    /// No response was received.
    #[error("network failure: {0}")]
    Network(String),

    /// A 2xx response whose body does not have the expected shape.
    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("no task with id {0} in the local cache")]
    UnknownTask(String),

    #[error("failed to persist session: {0}")]
    Session(String),
}

impl SyncError {
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired)
    }

    /// The notice shown to the user. Never includes the HTTP status.
    pub fn user_message(&self) -> String {
        match self {
            Self::AuthExpired => SESSION_EXPIRED_MESSAGE.to_string(),
            Self::UnknownTask(_) => "That task no longer exists.".to_string(),
            Self::Remote { .. } | Self::Network(_) | Self::Decode(_) | Self::Session(_) => {
                GENERIC_FAILURE_MESSAGE.to_string()
            }
        }
    }

    /// Like [`Self::user_message`], but lets a server-supplied explanation
    /// through. Used by the sign-in forms, where the server says things like
    /// "Invalid credentials".
    pub fn server_message(&self) -> String {
        match self {
            Self::Remote {
                message: Some(message),
                ..
            } if !message.trim().is_empty() => message.clone(),
            other => other.user_message(),
        }
    }
}
