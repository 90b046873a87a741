//! Columnar chunk wire format.
//!
//! A chunk is one protobuf-encoded [`ColumnarBatch`]. Each column carries a
//! dense typed value array of `row_count` entries plus a null bitmap; null
//! positions hold a placeholder that the decoder never looks at.

use prost::Message;

use super::null_mask;
use crate::error::{LinkError, Result};
use crate::models::{ColumnInfo, ColumnType, Row, Value};

#[derive(Clone, PartialEq, prost::Message)]
pub struct ColumnarBatch {
    #[prost(uint64, tag = "1")]
    pub row_count: u64,

    #[prost(message, repeated, tag = "2")]
    pub columns: Vec<ColumnVector>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ColumnVector {
    #[prost(string, tag = "1")]
    pub name: String,

    /// Packed LSB-first null bitmap; may be shorter than the column.
    #[prost(bytes = "vec", tag = "2")]
    pub nulls: Vec<u8>,

    #[prost(oneof = "ColumnValues", tags = "3, 4, 5, 6, 7")]
    pub values: Option<ColumnValues>,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub enum ColumnValues {
    #[prost(message, tag = "3")]
    Bools(BoolValues),
    #[prost(message, tag = "4")]
    Longs(LongValues),
    #[prost(message, tag = "5")]
    Doubles(DoubleValues),
    #[prost(message, tag = "6")]
    Strings(StringValues),
    #[prost(message, tag = "7")]
    Binaries(BinaryValues),
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BoolValues {
    #[prost(bool, repeated, tag = "1")]
    pub values: Vec<bool>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct LongValues {
    #[prost(int64, repeated, tag = "1")]
    pub values: Vec<i64>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DoubleValues {
    #[prost(double, repeated, tag = "1")]
    pub values: Vec<f64>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct StringValues {
    #[prost(string, repeated, tag = "1")]
    pub values: Vec<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BinaryValues {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub values: Vec<Vec<u8>>,
}

impl ColumnValues {
    fn len(&self) -> usize {
        match self {
            ColumnValues::Bools(v) => v.values.len(),
            ColumnValues::Longs(v) => v.values.len(),
            ColumnValues::Doubles(v) => v.values.len(),
            ColumnValues::Strings(v) => v.values.len(),
            ColumnValues::Binaries(v) => v.values.len(),
        }
    }

    fn value_at(&self, row: usize) -> Value {
        match self {
            ColumnValues::Bools(v) => Value::Boolean(v.values[row]),
            ColumnValues::Longs(v) => Value::Int64(v.values[row]),
            ColumnValues::Doubles(v) => Value::Float64(v.values[row]),
            ColumnValues::Strings(v) => Value::String(v.values[row].clone()),
            ColumnValues::Binaries(v) => Value::Binary(v.values[row].clone()),
        }
    }
}

/// Encode row-major data into the columnar wire form.
pub fn encode_rows(columns: &[ColumnInfo], rows: &[Row]) -> Result<Vec<u8>> {
    let mut vectors = Vec::with_capacity(columns.len());
    for (position, column) in columns.iter().enumerate() {
        let cells = rows
            .iter()
            .enumerate()
            .map(|(row_index, row)| {
                row.get(position).ok_or_else(|| {
                    LinkError::Serialization(format!(
                        "Row {} has no value for column '{}'",
                        row_index, column.name
                    ))
                })
            })
            .collect::<Result<Vec<&Value>>>()?;

        let nulls = null_mask::pack(cells.iter().map(|value| value.is_null()));
        let values = encode_column(column, &cells)?;
        vectors.push(ColumnVector {
            name: column.name.clone(),
            nulls,
            values: Some(values),
        });
    }

    let batch = ColumnarBatch {
        row_count: rows.len() as u64,
        columns: vectors,
    };
    Ok(batch.encode_to_vec())
}

fn mismatch(column: &ColumnInfo, value: &Value) -> LinkError {
    LinkError::Serialization(format!(
        "Value {:?} does not fit column '{}' of type {}",
        value, column.name, column.type_name
    ))
}

fn encode_column(column: &ColumnInfo, cells: &[&Value]) -> Result<ColumnValues> {
    // Null cells get the type's zero value as a placeholder.
    Ok(match column.column_type() {
        ColumnType::Boolean => ColumnValues::Bools(BoolValues {
            values: cells
                .iter()
                .map(|value| match value {
                    Value::Null => Ok(false),
                    Value::Boolean(b) => Ok(*b),
                    other => Err(mismatch(column, other)),
                })
                .collect::<Result<_>>()?,
        }),
        ColumnType::Int64 => ColumnValues::Longs(LongValues {
            values: cells
                .iter()
                .map(|value| match value {
                    Value::Null => Ok(0),
                    Value::Int64(n) => Ok(*n),
                    other => Err(mismatch(column, other)),
                })
                .collect::<Result<_>>()?,
        }),
        ColumnType::Float64 => ColumnValues::Doubles(DoubleValues {
            values: cells
                .iter()
                .map(|value| match value {
                    Value::Null => Ok(0.0),
                    Value::Float64(f) => Ok(*f),
                    Value::Int64(n) => Ok(*n as f64),
                    other => Err(mismatch(column, other)),
                })
                .collect::<Result<_>>()?,
        }),
        ColumnType::String => ColumnValues::Strings(StringValues {
            values: cells
                .iter()
                .map(|value| match value {
                    Value::Null => Ok(String::new()),
                    Value::Binary(_) => Err(mismatch(column, value)),
                    other => Ok(other.to_string()),
                })
                .collect::<Result<_>>()?,
        }),
        ColumnType::Binary => ColumnValues::Binaries(BinaryValues {
            values: cells
                .iter()
                .map(|value| match value {
                    Value::Null => Ok(Vec::new()),
                    Value::Binary(bytes) => Ok(bytes.clone()),
                    other => Err(mismatch(column, other)),
                })
                .collect::<Result<_>>()?,
        }),
    })
}

/// Decode a columnar chunk into rows, applying each column's null mask.
pub fn decode_batch(bytes: &[u8]) -> Result<Vec<Row>> {
    decode_columnar(&ColumnarBatch::decode(bytes)?)
}

/// Decode an already parsed batch (RPC pages embed the message directly).
pub fn decode_columnar(batch: &ColumnarBatch) -> Result<Vec<Row>> {
    let row_count = usize::try_from(batch.row_count)
        .map_err(|_| LinkError::Protocol(format!("Chunk row count {} too large", batch.row_count)))?;

    for column in &batch.columns {
        let len = column.values.as_ref().map_or(0, ColumnValues::len);
        if len != row_count {
            return Err(LinkError::Protocol(format!(
                "Column '{}' has {} value(s) but the chunk declares {} row(s)",
                column.name, len, row_count
            )));
        }
    }

    let mut rows = Vec::with_capacity(row_count);
    for row in 0..row_count {
        let values = batch
            .columns
            .iter()
            .map(|column| match &column.values {
                Some(values) if !null_mask::is_null(&column.nulls, row) => values.value_at(row),
                _ => Value::Null,
            })
            .collect::<Vec<_>>();
        rows.push(Row::new(values));
    }
    Ok(rows)
}
