//! JSON Lines row input for the `export` command.
//!
//! Each non-blank line is one row: either an array aligned with the schema
//! or an object keyed by column name (absent keys are null).

use std::io::BufRead;

use chrono::{DateTime, NaiveDateTime};

use cube_common::{Cell, Error, LogicalType, Result, Schema};

const DATETIME_LAYOUTS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Iterator of rows read from a JSON Lines stream.
pub struct RowReader<R> {
    reader: R,
    schema: Schema,
    line: u64,
    buf: String,
}

impl<R: BufRead> RowReader<R> {
    pub fn new(reader: R, schema: Schema) -> Self {
        RowReader {
            reader,
            schema,
            line: 0,
            buf: String::new(),
        }
    }

    /// Line number of the last line read.
    pub fn line(&self) -> u64 {
        self.line
    }

    fn next_row(&mut self) -> Result<Option<Vec<Cell>>> {
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                return Ok(None);
            }
            self.line += 1;
            let text = self.buf.trim();
            if text.is_empty() {
                continue;
            }
            let value: serde_json::Value =
                serde_json::from_str(text).map_err(|e| Error::RowParse {
                    line: self.line,
                    message: e.to_string(),
                })?;
            return parse_row(value, &self.schema, self.line).map(Some);
        }
    }
}

impl<R: BufRead> Iterator for RowReader<R> {
    type Item = Result<Vec<Cell>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

/// Align one JSON row with the schema.
pub fn parse_row(value: serde_json::Value, schema: &Schema, line: u64) -> Result<Vec<Cell>> {
    let values = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => schema
            .names()
            .map(|name| map.remove(name).unwrap_or(serde_json::Value::Null))
            .collect(),
        _ => {
            return Err(Error::RowShape {
                row: line,
                expected: schema.len(),
                actual: 1,
            })
        }
    };

    // Cells past the last column are kept for the exporter's arity check.
    let extra = LogicalType::String;
    let types = schema
        .columns
        .iter()
        .map(|c| &c.logical_type)
        .chain(std::iter::repeat(&extra));
    Ok(values
        .into_iter()
        .zip(types)
        .map(|(value, logical)| to_cell(value, logical))
        .collect())
}

/// Datetime strings in date columns become timestamps; date-only strings
/// stay text and are passed through by the encoder.
fn to_cell(value: serde_json::Value, logical: &LogicalType) -> Cell {
    if *logical == LogicalType::Date {
        if let Some(ts) = value.as_str().and_then(parse_datetime) {
            return Cell::Timestamp(ts);
        }
    }
    Cell::from(value)
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    DATETIME_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(text, layout).ok())
}
