use chrono::{DateTime, Utc};

use crate::error::{LinkError, Result};
use crate::models::ChunkLink;

/// The fixed link set of a remote result, indexed `[0, len)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkLinks {
    statement_id: String,
    links: Vec<ChunkLink>,
}

impl ChunkLinks {
    /// Sort `links` by index and check they form a dense `[0, len)` range.
    pub fn new(statement_id: impl Into<String>, mut links: Vec<ChunkLink>) -> Result<Self> {
        let statement_id = statement_id.into();
        links.sort_by_key(|link| link.index);
        for (position, link) in links.iter().enumerate() {
            if link.index != position as u64 {
                return Err(LinkError::Protocol(format!(
                    "Chunk links of statement {} are not contiguous: expected index {}, found {}",
                    statement_id, position, link.index
                )));
            }
        }
        Ok(Self {
            statement_id,
            links,
        })
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn total_row_count(&self) -> u64 {
        self.links.iter().map(|link| link.row_count).sum()
    }

    /// Link for chunk `index`, checked against the bounds and against `now`.
    pub fn link(&self, index: i64, now: DateTime<Utc>) -> Result<&ChunkLink> {
        let link = usize::try_from(index)
            .ok()
            .and_then(|position| self.links.get(position))
            .ok_or_else(|| LinkError::ChunkBounds {
                statement_id: self.statement_id.clone(),
                index,
                chunk_count: self.links.len(),
            })?;
        if link.is_expired_at(now) {
            return Err(LinkError::ChunkExpired {
                statement_id: self.statement_id.clone(),
                index: link.index,
                expired_at: link.expires_at,
            });
        }
        Ok(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn link(index: u64, expires_at: DateTime<Utc>) -> ChunkLink {
        ChunkLink {
            index,
            url: format!("https://storage/chunk{}", index),
            expires_at,
            row_count: 2,
            row_offset: index * 2,
        }
    }

    #[test]
    fn test_links_are_sorted_and_checked() {
        let later = Utc::now() + Duration::hours(1);
        let links = ChunkLinks::new("s", vec![link(1, later), link(0, later)]).unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links.link(0, Utc::now()).unwrap().index, 0);
        assert_eq!(links.total_row_count(), 4);

        let gap = ChunkLinks::new("s", vec![link(0, later), link(2, later)]);
        assert!(matches!(gap, Err(LinkError::Protocol(_))));
    }

    #[test]
    fn test_bounds() {
        let later = Utc::now() + Duration::hours(1);
        let links = ChunkLinks::new("s", vec![link(0, later), link(1, later)]).unwrap();
        for index in [-1, 2, i64::MAX] {
            match links.link(index, Utc::now()) {
                Err(LinkError::ChunkBounds {
                    index: got,
                    chunk_count,
                    ..
                }) => {
                    assert_eq!(got, index);
                    assert_eq!(chunk_count, 2);
                },
                other => panic!("expected bounds error, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_expiry_is_inclusive() {
        let now = Utc::now();
        let links = ChunkLinks::new("s", vec![link(0, now)]).unwrap();
        assert!(matches!(links.link(0, now), Err(LinkError::ChunkExpired { index: 0, .. })));
        assert!(links.link(0, now - Duration::seconds(1)).is_ok());
    }
}
