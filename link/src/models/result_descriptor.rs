use super::{chunk_link::ChunkLink, column_info::ColumnInfo, row::Row};

/// Where a finished statement's rows live.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultData {
    /// Rows were returned with the status response.
    Inline(Vec<Row>),
    /// Rows must be fetched chunk by chunk; links are ordered by index.
    Remote(Vec<ChunkLink>),
}

/// Immutable description of a statement's output, produced once per statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultDescriptor {
    pub columns: Vec<ColumnInfo>,
    pub data: ResultData,
}

impl ResultDescriptor {
    pub fn inline(columns: Vec<ColumnInfo>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            data: ResultData::Inline(rows),
        }
    }

    pub fn remote(columns: Vec<ColumnInfo>, links: Vec<ChunkLink>) -> Self {
        Self {
            columns,
            data: ResultData::Remote(links),
        }
    }

    /// Empty inline result, used for statements that produce no rows.
    pub fn empty() -> Self {
        Self::inline(Vec::new(), Vec::new())
    }

    pub fn total_row_count(&self) -> u64 {
        match &self.data {
            ResultData::Inline(rows) => rows.len() as u64,
            ResultData::Remote(links) => links.iter().map(|l| l.row_count).sum(),
        }
    }
}
