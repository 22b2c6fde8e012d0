//! Column type model shared by the mapper, the encoder and the exporter.
//!
//! The host supplies a [`Schema`] of (name, logical type) pairs and rows of
//! [`Cell`]s aligned with it. Wire types and column roles describe the same
//! columns as the remote server sees them.

use chrono::NaiveDateTime;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::{Error, Result};

/// Timestamp layout sent to the server: microseconds, literal `Z`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Format a timestamp the way the server expects datetime cells.
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Logical column type as declared by the host pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LogicalType {
    String,
    Object,
    Int,
    Bigint,
    Smallint,
    Tinyint,
    Float,
    Double,
    Boolean,
    Date,
    Geopoint,
    Geometry,
    Array,
    Map,
    /// Any type name the host sends that is not listed above.
    Other(String),
}

impl LogicalType {
    /// Parse a host type name. Never fails; unknown names become `Other`.
    pub fn parse(name: &str) -> Self {
        match name {
            "string" => LogicalType::String,
            "object" => LogicalType::Object,
            "int" => LogicalType::Int,
            "bigint" => LogicalType::Bigint,
            "smallint" => LogicalType::Smallint,
            "tinyint" => LogicalType::Tinyint,
            "float" => LogicalType::Float,
            "double" => LogicalType::Double,
            "boolean" => LogicalType::Boolean,
            "date" => LogicalType::Date,
            "geopoint" => LogicalType::Geopoint,
            "geometry" => LogicalType::Geometry,
            "array" => LogicalType::Array,
            "map" => LogicalType::Map,
            other => LogicalType::Other(other.to_string()),
        }
    }

    /// Host type name.
    pub fn as_str(&self) -> &str {
        match self {
            LogicalType::String => "string",
            LogicalType::Object => "object",
            LogicalType::Int => "int",
            LogicalType::Bigint => "bigint",
            LogicalType::Smallint => "smallint",
            LogicalType::Tinyint => "tinyint",
            LogicalType::Float => "float",
            LogicalType::Double => "double",
            LogicalType::Boolean => "boolean",
            LogicalType::Date => "date",
            LogicalType::Geopoint => "geopoint",
            LogicalType::Geometry => "geometry",
            LogicalType::Array => "array",
            LogicalType::Map => "map",
            LogicalType::Other(name) => name,
        }
    }

    pub fn is_integer_family(&self) -> bool {
        matches!(
            self,
            LogicalType::Int | LogicalType::Bigint | LogicalType::Smallint | LogicalType::Tinyint
        )
    }

    pub fn is_float_family(&self) -> bool {
        matches!(self, LogicalType::Float | LogicalType::Double)
    }
}

impl From<String> for LogicalType {
    fn from(name: String) -> Self {
        LogicalType::parse(&name)
    }
}

impl From<LogicalType> for String {
    fn from(t: LogicalType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Data type of a column on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WireType {
    String,
    /// Accepted by the server; the mapper widens integers to `Double`.
    Integer,
    Double,
    Bool,
    Datetime,
}

impl WireType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WireType::String => "STRING",
            WireType::Integer => "INTEGER",
            WireType::Double => "DOUBLE",
            WireType::Bool => "BOOL",
            WireType::Datetime => "DATETIME",
        }
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Role of a column in the remote dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    /// Dimension, used for grouping.
    Attribute,
    /// Measure, used for aggregation.
    Metric,
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRole::Attribute => write!(f, "attribute"),
            ColumnRole::Metric => write!(f, "metric"),
        }
    }
}

/// One schema column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub logical_type: LogicalType,
}

impl Column {
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Column {
            name: name.into(),
            logical_type,
        }
    }
}

/// Ordered column list captured at `open` time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub columns: Vec<Column>,
}

impl Schema {
    /// Build a schema, rejecting empty column lists and duplicate names.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let schema = Schema { columns };
        schema.validate()?;
        Ok(schema)
    }

    /// Parse the host's `{"columns": [{"name", "type"}]}` document.
    pub fn from_json(json: &str) -> Result<Self> {
        let schema: Schema = serde_json::from_str(json)?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(Error::Config("schema has no columns".to_string()));
        }
        let mut seen = HashSet::new();
        for column in &self.columns {
            if column.name.is_empty() {
                return Err(Error::Config("schema column with empty name".to_string()));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate schema column '{}'",
                    column.name
                )));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// A single cell value supplied by the host.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Structured timestamp, UTC.
    Timestamp(NaiveDateTime),
    /// Nested value for array/map/object columns.
    Json(serde_json::Value),
}

impl Cell {
    /// Null, NaN or empty text: what an unfilled cell looks like.
    pub fn is_missing(&self) -> bool {
        match self {
            Cell::Null => true,
            Cell::Float(f) => f.is_nan(),
            Cell::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for Cell {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Cell::Null,
            serde_json::Value::Bool(b) => Cell::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Cell::Int(i),
                None => Cell::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Cell::Text(s),
            other => Cell::Json(other),
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Cell::Null => serializer.serialize_unit(),
            Cell::Bool(b) => serializer.serialize_bool(*b),
            Cell::Int(i) => serializer.serialize_i64(*i),
            Cell::Float(f) if !f.is_finite() => serializer.serialize_unit(),
            Cell::Float(f) => serializer.serialize_f64(*f),
            Cell::Text(s) => serializer.serialize_str(s),
            Cell::Timestamp(ts) => serializer.serialize_str(&format_timestamp(ts)),
            Cell::Json(v) => v.serialize(serializer),
        }
    }
}
