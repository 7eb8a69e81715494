use std::fmt;

use crate::bot::materials::StoreError;

/// Reply shown whenever an upstream call (Gemini or Telegram) fails.
pub const FALLBACK_REPLY: &str = "Sorry, I couldn't get an answer right now. Please try again.";

pub const UNAUTHORIZED_REPLY: &str = "Only admins may upload or delete materials.";

/// Failures while handling one update. None of them stop the server.
#[derive(Debug)]
pub enum BotError {
    /// Webhook body that is not a valid update.
    MalformedRequest(String),
    /// Material id absent from the store.
    NotFound(String),
    /// Non-admin attempting an admin action.
    Unauthorized,
    /// Bad caption, id or arguments; the message is shown to the user.
    InvalidInput(String),
    /// The AI or messaging API failed.
    Upstream(String),
    Store(StoreError),
}

impl BotError {
    /// Text sent back to the user for this failure.
    pub fn user_message(&self) -> String {
        match self {
            Self::MalformedRequest(_) => "Sorry, I couldn't read that message.".to_string(),
            Self::NotFound(id) => format!("Material '{}' not found.", id),
            Self::Unauthorized => UNAUTHORIZED_REPLY.to_string(),
            Self::InvalidInput(msg) => msg.clone(),
            Self::Upstream(_) => FALLBACK_REPLY.to_string(),
            Self::Store(_) => "Storage error, please try again later.".to_string(),
        }
    }
}

impl fmt::Display for BotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedRequest(msg) => write!(f, "malformed request: {}", msg),
            Self::NotFound(id) => write!(f, "material '{}' not found", id),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            Self::Upstream(msg) => write!(f, "upstream failure: {}", msg),
            Self::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for BotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for BotError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::Duplicate(id) => Self::InvalidInput(format!(
                "Material '{id}' already exists. Remove it first with /delete {id}."
            )),
            other => Self::Store(other),
        }
    }
}
