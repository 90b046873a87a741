use std::fmt;

use serde::{Deserialize, Serialize};

/// Server-side logical connection context (catalog, schema, session config).
///
/// One is opened per logical connection and reused by every statement on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionHandle {
    id: String,
    /// Raw secret bytes some backends pair with the id (binary RPC only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    secret: Vec<u8>,
}

impl SessionHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            secret: Vec::new(),
        }
    }

    pub fn with_secret(id: impl Into<String>, secret: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            secret,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn secret(&self) -> &[u8] {
        &self.secret
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}
