//! Logical column types to the server's column model.
//!
//! Every schema column becomes a column header with a wire type, and either
//! an attribute (dimension) or a metric (numeric fact) of the dataset.

use serde::Serialize;

use cube_common::{ColumnRole, LogicalType, Schema, WireType};

/// Wire type for a logical type. Total: unknown types are sent as strings.
///
/// Integer families are widened to DOUBLE so that a dataset created from one
/// batch accepts every later batch.
pub fn map_type(logical: &LogicalType) -> WireType {
    match logical {
        LogicalType::Int
        | LogicalType::Bigint
        | LogicalType::Smallint
        | LogicalType::Tinyint
        | LogicalType::Float
        | LogicalType::Double => WireType::Double,
        LogicalType::Boolean => WireType::Bool,
        LogicalType::Date => WireType::Datetime,
        LogicalType::String
        | LogicalType::Object
        | LogicalType::Geopoint
        | LogicalType::Geometry
        | LogicalType::Array
        | LogicalType::Map
        | LogicalType::Other(_) => WireType::String,
    }
}

/// Numeric wire types are metrics; everything else is an attribute.
pub fn classify(wire: WireType) -> ColumnRole {
    match wire {
        WireType::Integer | WireType::Double => ColumnRole::Metric,
        WireType::String | WireType::Bool | WireType::Datetime => ColumnRole::Attribute,
    }
}

/// One schema column as the server sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappedColumn {
    pub name: String,
    pub logical_type: LogicalType,
    pub wire_type: WireType,
    pub role: ColumnRole,
}

/// `{name, dataType}` entry of a table definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnHeader {
    pub name: String,
    pub data_type: WireType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Expression {
    pub formula: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeForm {
    pub category: String,
    pub expressions: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeDefinition {
    pub name: String,
    pub attribute_forms: Vec<AttributeForm>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricDefinition {
    pub name: String,
    pub data_type: String,
    pub expressions: Vec<Expression>,
}

/// Column mapping of one export, computed once at `open`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    columns: Vec<MappedColumn>,
}

impl ColumnMapping {
    pub fn from_schema(schema: &Schema) -> Self {
        let columns = schema
            .columns
            .iter()
            .map(|column| {
                let wire_type = map_type(&column.logical_type);
                MappedColumn {
                    name: column.name.clone(),
                    logical_type: column.logical_type.clone(),
                    wire_type,
                    role: classify(wire_type),
                }
            })
            .collect();
        ColumnMapping { columns }
    }

    pub fn columns(&self) -> &[MappedColumn] {
        &self.columns
    }

    pub fn column_headers(&self) -> Vec<ColumnHeader> {
        self.columns
            .iter()
            .map(|c| ColumnHeader {
                name: c.name.clone(),
                data_type: c.wire_type,
            })
            .collect()
    }

    pub fn attributes(&self, table_name: &str) -> Vec<AttributeDefinition> {
        self.columns
            .iter()
            .filter(|c| c.role == ColumnRole::Attribute)
            .map(|c| AttributeDefinition {
                name: c.name.clone(),
                attribute_forms: vec![AttributeForm {
                    category: "ID".to_string(),
                    expressions: vec![formula(table_name, &c.name)],
                }],
            })
            .collect()
    }

    pub fn metrics(&self, table_name: &str) -> Vec<MetricDefinition> {
        self.columns
            .iter()
            .filter(|c| c.role == ColumnRole::Metric)
            .map(|c| MetricDefinition {
                name: c.name.clone(),
                data_type: "number".to_string(),
                expressions: vec![formula(table_name, &c.name)],
            })
            .collect()
    }
}

fn formula(table_name: &str, column: &str) -> Expression {
    Expression {
        formula: format!("{}.{}", table_name, column),
    }
}
