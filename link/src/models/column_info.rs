use serde::{Deserialize, Serialize};

/// Logical column type as far as decoding is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Boolean,
    Int64,
    Float64,
    String,
    Binary,
}

impl ColumnType {
    /// Map a server type name (e.g. `INT`, `DOUBLE`, `VARCHAR(10)`) to a decode type.
    pub fn from_type_name(type_name: &str) -> Self {
        let base = type_name
            .split(|c: char| c == '(' || c == '<')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_uppercase();
        match base.as_str() {
            "BOOLEAN" | "BOOL" => ColumnType::Boolean,
            "TINYINT" | "BYTE" | "SMALLINT" | "SHORT" | "INT" | "INTEGER" | "BIGINT" | "LONG" => {
                ColumnType::Int64
            },
            "FLOAT" | "REAL" | "DOUBLE" => ColumnType::Float64,
            "BINARY" => ColumnType::Binary,
            _ => ColumnType::String,
        }
    }
}

/// Schema entry for one result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub type_name: String,
    pub position: usize,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, position: usize) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            position,
        }
    }

    pub fn column_type(&self) -> ColumnType {
        ColumnType::from_type_name(&self.type_name)
    }
}
