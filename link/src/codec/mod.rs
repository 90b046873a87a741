//! Result payload decoding.

mod columnar;
mod json_array;
pub mod null_mask;

use bytes::Bytes;

use crate::error::Result;
use crate::models::Row;

pub use columnar::{
    decode_batch, decode_columnar, encode_rows, BinaryValues, BoolValues, ColumnValues, ColumnVector, ColumnarBatch,
    DoubleValues, LongValues, StringValues,
};
pub use json_array::{decode_json_array, rows_from_json_array};

/// Encoding of a fetched result chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkFormat {
    Columnar,
    JsonArray,
}

/// Raw bytes of one result chunk as downloaded.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPayload {
    pub format: ChunkFormat,
    pub bytes: Bytes,
}

impl ChunkPayload {
    pub fn columnar(bytes: impl Into<Bytes>) -> Self {
        Self {
            format: ChunkFormat::Columnar,
            bytes: bytes.into(),
        }
    }

    pub fn json_array(bytes: impl Into<Bytes>) -> Self {
        Self {
            format: ChunkFormat::JsonArray,
            bytes: bytes.into(),
        }
    }

    /// Decode into row-major form.
    pub fn decode(&self) -> Result<Vec<Row>> {
        match self.format {
            ChunkFormat::Columnar => decode_batch(&self.bytes),
            ChunkFormat::JsonArray => decode_json_array(&self.bytes),
        }
    }
}
