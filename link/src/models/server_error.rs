use serde::{Deserialize, Serialize};

/// Error payload the server attaches to a failed statement or request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServerError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl ServerError {
    pub fn new(error_code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            error_code,
            message: message.into(),
        }
    }
}
