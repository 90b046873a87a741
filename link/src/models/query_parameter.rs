use serde::{Deserialize, Serialize};

use super::value::Value;

/// A bound statement parameter (named or positional).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParameter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub value: Value,
    /// Server type name, e.g. `INT` or `STRING`. Inferred when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
}

impl QueryParameter {
    pub fn positional(value: impl Into<Value>) -> Self {
        Self {
            name: None,
            value: value.into(),
            type_name: None,
        }
    }

    pub fn named(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: Some(name.into()),
            value: value.into(),
            type_name: None,
        }
    }

    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    /// Type name sent on the wire: explicit, else inferred from the value.
    pub fn effective_type_name(&self) -> Option<String> {
        if let Some(name) = &self.type_name {
            return Some(name.clone());
        }
        match self.value {
            Value::Null => None,
            Value::Boolean(_) => Some("BOOLEAN".to_string()),
            Value::Int64(_) => Some("BIGINT".to_string()),
            Value::Float64(_) => Some("DOUBLE".to_string()),
            Value::String(_) => Some("STRING".to_string()),
            Value::Binary(_) => Some("BINARY".to_string()),
        }
    }

    /// Textual form of the value (both wire protocols send parameters as text).
    pub fn value_text(&self) -> Option<String> {
        match &self.value {
            Value::Null => None,
            Value::Binary(bytes) => Some(hex::encode(bytes)),
            other => Some(other.to_string()),
        }
    }
}
