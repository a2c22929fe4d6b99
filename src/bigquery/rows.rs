//! Decoding of `f`/`v` JSON rows into Arrow record batches.
//!
//! Column types follow the result schema: integers, floats and booleans map
//! to their Arrow primitives, TIMESTAMP to UTC microseconds, DATE to days
//! since the epoch. Repeated and RECORD columns are kept as JSON text and
//! every other type (STRING, NUMERIC, BYTES, DATETIME, ...) as UTF-8.

use super::models::{FieldSchema, Row, TableSchema};
use crate::error::{GuardError, Result};
use arrow::array::{
    ArrayRef, BooleanBuilder, Date32Builder, Float64Builder, Int64Builder, StringBuilder,
    TimestampMicrosecondBuilder,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{Datelike, NaiveDate};
use serde_json::Value;
use std::sync::Arc;

const UTC: &str = "UTC";

/// `NaiveDate::num_days_from_ce` of 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

enum ColumnBuilder {
    Int64(Int64Builder),
    Float64(Float64Builder),
    Boolean(BooleanBuilder),
    Timestamp(TimestampMicrosecondBuilder),
    Date(Date32Builder),
    Utf8(StringBuilder),
    Json(StringBuilder),
}

impl ColumnBuilder {
    fn for_field(field: &FieldSchema) -> (DataType, Self) {
        if field.is_repeated() {
            return (DataType::Utf8, Self::Json(StringBuilder::new()));
        }

        match field.field_type.as_str() {
            "INTEGER" | "INT64" => (DataType::Int64, Self::Int64(Int64Builder::new())),
            "FLOAT" | "FLOAT64" => (DataType::Float64, Self::Float64(Float64Builder::new())),
            "BOOLEAN" | "BOOL" => (DataType::Boolean, Self::Boolean(BooleanBuilder::new())),
            "TIMESTAMP" => (
                DataType::Timestamp(TimeUnit::Microsecond, Some(UTC.into())),
                Self::Timestamp(TimestampMicrosecondBuilder::new().with_timezone(UTC)),
            ),
            "DATE" => (DataType::Date32, Self::Date(Date32Builder::new())),
            "RECORD" | "STRUCT" => (DataType::Utf8, Self::Json(StringBuilder::new())),
            _ => (DataType::Utf8, Self::Utf8(StringBuilder::new())),
        }
    }

    fn append(&mut self, field: &FieldSchema, value: &Value) -> Result<()> {
        if value.is_null() {
            self.append_null();
            return Ok(());
        }

        match self {
            Self::Json(b) => b.append_value(value.to_string()),
            Self::Utf8(b) => b.append_value(text(field, value)?),
            Self::Int64(b) => b.append_value(parse(field, value)?),
            Self::Float64(b) => b.append_value(parse(field, value)?),
            Self::Boolean(b) => b.append_value(parse(field, value)?),
            Self::Timestamp(b) => b.append_value(timestamp_micros(field, value)?),
            Self::Date(b) => b.append_value(days_since_epoch(field, value)?),
        }
        Ok(())
    }

    fn append_null(&mut self) {
        match self {
            Self::Int64(b) => b.append_null(),
            Self::Float64(b) => b.append_null(),
            Self::Boolean(b) => b.append_null(),
            Self::Timestamp(b) => b.append_null(),
            Self::Date(b) => b.append_null(),
            Self::Utf8(b) | Self::Json(b) => b.append_null(),
        }
    }

    fn finish(&mut self) -> ArrayRef {
        match self {
            Self::Int64(b) => Arc::new(b.finish()),
            Self::Float64(b) => Arc::new(b.finish()),
            Self::Boolean(b) => Arc::new(b.finish()),
            Self::Timestamp(b) => Arc::new(b.finish()),
            Self::Date(b) => Arc::new(b.finish()),
            Self::Utf8(b) | Self::Json(b) => Arc::new(b.finish()),
        }
    }
}

fn decode_error(field: &FieldSchema, value: &Value, reason: impl std::fmt::Display) -> GuardError {
    GuardError::RowDecode(format!(
        "column '{}' ({}): cannot decode {}: {}",
        field.name, field.field_type, value, reason
    ))
}

fn text<'a>(field: &FieldSchema, value: &'a Value) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| decode_error(field, value, "expected a string cell"))
}

fn parse<T>(field: &FieldSchema, value: &Value) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    text(field, value)?
        .parse::<T>()
        .map_err(|e| decode_error(field, value, e))
}

/// Int64 microseconds, or float seconds when int64 output was not requested.
fn timestamp_micros(field: &FieldSchema, value: &Value) -> Result<i64> {
    let raw = text(field, value)?;
    if let Ok(micros) = raw.parse::<i64>() {
        return Ok(micros);
    }
    raw.parse::<f64>()
        .map(|seconds| (seconds * 1_000_000.0).round() as i64)
        .map_err(|e| decode_error(field, value, e))
}

fn days_since_epoch(field: &FieldSchema, value: &Value) -> Result<i32> {
    let date = NaiveDate::parse_from_str(text(field, value)?, "%Y-%m-%d")
        .map_err(|e| decode_error(field, value, e))?;
    Ok(date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE)
}

/// Arrow schema for a result schema.
pub fn arrow_schema(schema: &TableSchema) -> Schema {
    Schema::new(
        schema
            .fields
            .iter()
            .map(|field| {
                let (data_type, _) = ColumnBuilder::for_field(field);
                Field::new(&field.name, data_type, !field.is_required())
            })
            .collect::<Vec<_>>(),
    )
}

/// Decode `rows` against `schema` into a single batch.
///
/// A missing schema (statements without a result set) yields an empty,
/// column-less batch.
pub fn decode_rows(schema: Option<&TableSchema>, rows: &[Row]) -> Result<RecordBatch> {
    let Some(schema) = schema.filter(|s| !s.fields.is_empty()) else {
        return Ok(RecordBatch::new_empty(Arc::new(Schema::empty())));
    };

    let mut builders: Vec<ColumnBuilder> = schema
        .fields
        .iter()
        .map(|field| ColumnBuilder::for_field(field).1)
        .collect();

    for (index, row) in rows.iter().enumerate() {
        if row.cells.len() != schema.fields.len() {
            return Err(GuardError::RowDecode(format!(
                "row {} has {} cells, schema has {} fields",
                index,
                row.cells.len(),
                schema.fields.len()
            )));
        }
        for ((builder, field), cell) in builders.iter_mut().zip(&schema.fields).zip(&row.cells) {
            builder.append(field, &cell.v)?;
        }
    }

    let columns = builders.iter_mut().map(ColumnBuilder::finish).collect();
    Ok(RecordBatch::try_new(Arc::new(arrow_schema(schema)), columns)?)
}
