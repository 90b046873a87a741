use crate::error::Result;
use crate::models::{Row, Value};

/// Convert a `JSON_ARRAY` result (`[[cell, ...], ...]`, every cell a string
/// or null) into rows.
pub fn rows_from_json_array(data: Vec<Vec<Option<String>>>) -> Vec<Row> {
    data.into_iter()
        .map(|cells| {
            Row::new(
                cells
                    .into_iter()
                    .map(|cell| cell.map_or(Value::Null, Value::String))
                    .collect(),
            )
        })
        .collect()
}

/// Decode a downloaded `JSON_ARRAY` chunk body.
pub fn decode_json_array(bytes: &[u8]) -> Result<Vec<Row>> {
    let data: Vec<Vec<Option<String>>> = serde_json::from_slice(bytes)?;
    Ok(rows_from_json_array(data))
}
