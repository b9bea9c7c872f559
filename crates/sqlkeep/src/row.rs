//! Typed read access to one result row.

use chrono::{DateTime, FixedOffset};
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::errors::{Result, StoreError};
use crate::value::{SqlValue, parse_timestamp};

/// One decoded result row: column names mapped to scalars, in result order.
///
/// Getters return `Ok(None)` when the column is missing or holds `NULL`, and
/// a [`StoreError::Coercion`] when the stored value cannot be read as the
/// requested type. When a result has duplicate column names the last one
/// wins.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, SqlValue)>,
}

impl Row {
    /// Build a row from `(column, value)` pairs.
    pub fn new(columns: Vec<(String, SqlValue)>) -> Self {
        Self { columns }
    }

    /// Raw value of `column`.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .rev()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Column names in result order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// `(column, value)` pairs in result order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    fn present(&self, column: &str) -> Option<&SqlValue> {
        self.get(column).filter(|v| !v.is_null())
    }

    /// Read `column` as a 32-bit integer.
    pub fn get_int(&self, column: &str) -> Result<Option<i32>> {
        match self.get_long(column)? {
            None => Ok(None),
            Some(n) => i32::try_from(n)
                .map(Some)
                .map_err(|_| coercion(column, "i32", &SqlValue::Integer(n))),
        }
    }

    /// Read `column` as a 64-bit integer.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn get_long(&self, column: &str) -> Result<Option<i64>> {
        let Some(value) = self.present(column) else {
            return Ok(None);
        };
        match value {
            SqlValue::Integer(n) => Ok(Some(*n)),
            SqlValue::Real(r) if r.fract() == 0.0 && r.abs() < i64::MAX as f64 => {
                Ok(Some(*r as i64))
            }
            SqlValue::Text(s) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| coercion(column, "i64", value)),
            _ => Err(coercion(column, "i64", value)),
        }
    }

    /// Read `column` as a double.
    #[allow(clippy::cast_precision_loss)]
    pub fn get_double(&self, column: &str) -> Result<Option<f64>> {
        let Some(value) = self.present(column) else {
            return Ok(None);
        };
        match value {
            SqlValue::Integer(n) => Ok(Some(*n as f64)),
            SqlValue::Real(r) => Ok(Some(*r)),
            SqlValue::Text(s) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| coercion(column, "f64", value)),
            _ => Err(coercion(column, "f64", value)),
        }
    }

    /// Read `column` as text. Any non-null scalar has a textual form.
    pub fn get_string(&self, column: &str) -> Option<String> {
        self.present(column).map(ToString::to_string)
    }

    /// Read `column` as a boolean: `true`/`false` text or `1`/`0`.
    pub fn get_bool(&self, column: &str) -> Result<Option<bool>> {
        let Some(value) = self.present(column) else {
            return Ok(None);
        };
        match value {
            SqlValue::Integer(1) => Ok(Some(true)),
            SqlValue::Integer(0) => Ok(Some(false)),
            SqlValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Some(true)),
                "false" | "0" => Ok(Some(false)),
                _ => Err(coercion(column, "bool", value)),
            },
            _ => Err(coercion(column, "bool", value)),
        }
    }

    /// Read `column` as a timestamp written with the fixed timestamp format.
    pub fn get_date(&self, column: &str) -> Result<Option<DateTime<FixedOffset>>> {
        let Some(text) = self.get_string(column) else {
            return Ok(None);
        };
        parse_timestamp(&text)
            .map(Some)
            .map_err(|source| StoreError::DateParse {
                column: column.to_string(),
                value: text,
                source,
            })
    }
}

fn coercion(column: &str, target: &'static str, value: &SqlValue) -> StoreError {
    StoreError::Coercion {
        column: column.to_string(),
        target,
        value: value.to_string(),
    }
}

impl FromIterator<(String, SqlValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, SqlValue)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Serializes as a JSON-style object keyed by column name.
impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in &self.columns {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
