use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LinkError;

/// Wire protocol used to talk to the compute service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// JSON statement-execution API.
    #[default]
    Rest,
    /// Binary RPC service with stateful sessions.
    Rpc,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Rest => "rest",
            Backend::Rpc => "rpc",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rest" | "sea" | "http" => Ok(Backend::Rest),
            "rpc" | "thrift" | "binary" => Ok(Backend::Rpc),
            other => Err(LinkError::Configuration(format!("Unknown backend '{}'", other))),
        }
    }
}
