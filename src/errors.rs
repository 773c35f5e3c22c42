use thiserror::Error;

/// Canonical failure message shown to users when a summary could not be produced.
pub const CANONICAL_FAILURE_MESSAGE: &str =
    "Sorry, I couldn't generate a summary at this time. Please try again later.";

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Requested range is too wide: {0}")]
    RangeTooWide(String),

    #[error("User is not a member of the target channel")]
    Unauthorized,

    #[error("Summarization is disabled")]
    Disabled,

    #[error("Completion client is not configured")]
    ClientUnavailable,

    #[error("No messages to summarize")]
    EmptyConversation,

    #[error("Cancelled while waiting for a rate limit token")]
    RateLimitWaitCancelled,

    #[error("Request cancelled: {0}")]
    Cancelled(String),

    #[error("Completion endpoint rejected credentials: {0}")]
    UpstreamAuth(String),

    #[error("Completion endpoint rejected the request (status {status}): {message}")]
    UpstreamRejected { status: u16, message: String },

    #[error("Completion endpoint failed after {attempts} attempt(s): {message}")]
    UpstreamTransient { attempts: u32, message: String },

    #[error("Failed to parse completion response: {0}")]
    InvalidResponse(String),

    #[error("Failed to write summary cache: {0}")]
    CacheWriteFailed(String),

    #[error("Failed to access message store: {0}")]
    Store(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

/// Coarse grouping of failures for callers deciding what to tell the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The caller has to fix the request.
    InvalidInput,
    /// Transient failure; the same request may succeed later.
    RetryLater,
    /// The feature is switched off or not configured.
    Unavailable,
    Internal,
}

impl SummaryError {
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidRequest(_)
            | Self::RangeTooWide(_)
            | Self::Unauthorized
            | Self::EmptyConversation => ErrorCategory::InvalidInput,
            Self::RateLimitWaitCancelled
            | Self::Cancelled(_)
            | Self::UpstreamTransient { .. } => ErrorCategory::RetryLater,
            Self::Disabled | Self::ClientUnavailable | Self::Configuration(_) => {
                ErrorCategory::Unavailable
            }
            Self::UpstreamAuth(_)
            | Self::UpstreamRejected { .. }
            | Self::InvalidResponse(_)
            | Self::CacheWriteFailed(_)
            | Self::Store(_) => ErrorCategory::Internal,
        }
    }

    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.category(), ErrorCategory::RetryLater)
    }

    /// Sentence suitable for showing to the person who asked for the summary.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyConversation => "There are no messages to summarize.".to_string(),
            Self::Unauthorized => "You don't have access to that channel.".to_string(),
            Self::InvalidRequest(_) | Self::RangeTooWide(_) => {
                format!("That request can't be summarized: {self}")
            }
            _ => match self.category() {
                ErrorCategory::Unavailable => {
                    "Summarization is not available right now.".to_string()
                }
                _ => CANONICAL_FAILURE_MESSAGE.to_string(),
            },
        }
    }
}
