//! Row batch encoding.
//!
//! A batch is sent as one opaque string: the rows as a compact JSON array of
//! objects (keys in schema order), base64 encoded. Cells are coerced by
//! their column's declared logical type first.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::Serialize;

use cube_common::{Cell, Error, LogicalType, Result, Schema};

/// Date-time layouts accepted as "already a date" in date columns.
const DATETIME_LAYOUTS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Date-only layouts accepted in date columns.
const DATE_LAYOUTS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// Whether text reads as a date or date-time.
pub fn parses_as_date(text: &str) -> bool {
    let text = text.trim();
    if text.is_empty() {
        return false;
    }
    DateTime::parse_from_rfc3339(text).is_ok()
        || DATETIME_LAYOUTS
            .iter()
            .any(|layout| NaiveDateTime::parse_from_str(text, layout).is_ok())
        || DATE_LAYOUTS
            .iter()
            .any(|layout| NaiveDate::parse_from_str(text, layout).is_ok())
}

/// Coerce one cell to what its column type may carry on the wire.
///
/// - string columns never carry anything but text (otherwise `""`)
/// - date columns carry formatted timestamps, date-like text unchanged, or null
/// - everything else passes through
pub fn coerce(cell: &Cell, logical: &LogicalType) -> Cell {
    match logical {
        LogicalType::String => match cell {
            Cell::Text(_) => cell.clone(),
            _ => Cell::Text(String::new()),
        },
        LogicalType::Date => match cell {
            Cell::Timestamp(_) => cell.clone(),
            Cell::Text(text) if parses_as_date(text) => cell.clone(),
            _ => Cell::Null,
        },
        _ => cell.clone(),
    }
}

/// One row keyed by column name, serialized with keys in schema order.
struct EncodedRow<'a> {
    schema: &'a Schema,
    cells: &'a [Cell],
}

impl Serialize for EncodedRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (column, cell) in self.schema.columns.iter().zip(self.cells) {
            map.serialize_entry(&column.name, &coerce(cell, &column.logical_type))?;
        }
        map.end()
    }
}

struct EncodedBatch<'a> {
    schema: &'a Schema,
    rows: &'a [Vec<Cell>],
}

impl Serialize for EncodedBatch<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for cells in self.rows {
            seq.serialize_element(&EncodedRow {
                schema: self.schema,
                cells,
            })?;
        }
        seq.end()
    }
}

/// Compact JSON of a batch, before base64.
pub fn rows_to_json(rows: &[Vec<Cell>], schema: &Schema) -> Result<String> {
    for (i, row) in rows.iter().enumerate() {
        if row.len() != schema.len() {
            return Err(Error::RowShape {
                row: i as u64 + 1,
                expected: schema.len(),
                actual: row.len(),
            });
        }
    }
    Ok(serde_json::to_string(&EncodedBatch { schema, rows })?)
}

/// Encode a batch into the opaque `data` string of a table payload.
///
/// Pure and deterministic. Row numbers in errors count from 1 within the
/// batch.
pub fn encode_rows(rows: &[Vec<Cell>], schema: &Schema) -> Result<String> {
    let json = rows_to_json(rows, schema)?;
    Ok(STANDARD.encode(json.as_bytes()))
}

/// Inverse of [`encode_rows`], for diagnostics and tests.
pub fn decode_data(data: &str) -> Result<serde_json::Value> {
    let bytes = STANDARD
        .decode(data)
        .map_err(|e| Error::Transport(format!("payload is not base64: {}", e)))?;
    Ok(serde_json::from_slice(&bytes)?)
}
