use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque reference to the compute resource statements run on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ComputeRef {
    Warehouse(String),
    Cluster(String),
}

impl ComputeRef {
    pub fn id(&self) -> &str {
        match self {
            ComputeRef::Warehouse(id) | ComputeRef::Cluster(id) => id,
        }
    }
}

impl fmt::Display for ComputeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeRef::Warehouse(id) => write!(f, "warehouse:{}", id),
            ComputeRef::Cluster(id) => write!(f, "cluster:{}", id),
        }
    }
}
