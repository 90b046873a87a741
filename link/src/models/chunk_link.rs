use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One remotely fetchable slice of a statement's result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkLink {
    /// 0-based, dense position within the result.
    pub index: u64,
    pub url: String,
    /// The link may only be fetched before this instant.
    pub expires_at: DateTime<Utc>,
    pub row_count: u64,
    /// Rows preceding this chunk in the full result.
    #[serde(default)]
    pub row_offset: u64,
}

impl ChunkLink {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
