//! Values going into and coming out of SQL text.
//!
//! [`Param`] is what callers bind into a [`StatementText`] placeholder;
//! [`SqlValue`] is a scalar read back from a result row.

use std::fmt;

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone, Utc};
use rusqlite::types::ValueRef;
use serde::Serialize;

use crate::statement::StatementText;

/// Fixed timestamp format used both for binding and for reading temporal
/// values: date, time to milliseconds, and a numeric zone offset.
///
/// Example: `2024-03-01 14:05:09.250 +0100`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f %z";

/// Marker substituted for an unbound placeholder.
pub const NULL_LITERAL: &str = "NULL";

/// Format a timestamp with [`TIMESTAMP_FORMAT`].
pub fn format_timestamp<Tz: TimeZone>(ts: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse text written with [`TIMESTAMP_FORMAT`].
pub fn parse_timestamp(text: &str) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
    DateTime::parse_from_str(text.trim(), TIMESTAMP_FORMAT)
}

/// Quote `text` as an SQL string literal.
///
/// Single quotes are doubled. Everything else, including `?` and `\`, is
/// kept as is: substitution never re-reads bound text, and `SQLite` string
/// literals have no backslash escapes.
pub fn quote_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for ch in text.chars() {
        if ch == '\'' {
            out.push('\'');
        }
        out.push(ch);
    }
    out.push('\'');
    out
}

/// A value bound into a statement placeholder.
#[derive(Clone, Debug, PartialEq)]
pub enum Param {
    /// Leaves the placeholder unbound; it renders as `NULL`.
    Null,
    /// Text, rendered as a quoted literal.
    Text(String),
    /// Integer, rendered unquoted.
    Integer(i64),
    /// Floating point, rendered unquoted with a decimal point so `SQLite`
    /// stores a REAL. NaN and infinities render as `NULL`.
    Real(f64),
    /// Boolean, rendered as `'true'` or `'false'`.
    Bool(bool),
    /// Timestamp, rendered with [`TIMESTAMP_FORMAT`] and quoted.
    Timestamp(DateTime<FixedOffset>),
    /// Nested statement, rendered as its own SQL text, unquoted.
    Statement(StatementText),
    /// Pre-formatted SQL text spliced in verbatim.
    Literal(String),
}

impl Param {
    /// The SQL text that replaces the placeholder, or `None` for
    /// [`Param::Null`].
    pub fn to_sql_literal(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Text(s) => Some(quote_text(s)),
            Self::Integer(n) => Some(n.to_string()),
            Self::Real(f) if f.is_finite() => Some(format!("{f:?}")),
            Self::Real(_) => Some(NULL_LITERAL.to_string()),
            Self::Bool(true) => Some("'true'".to_string()),
            Self::Bool(false) => Some("'false'".to_string()),
            Self::Timestamp(ts) => Some(quote_text(&format_timestamp(ts))),
            Self::Statement(stmt) => Some(stmt.render()),
            Self::Literal(s) => Some(s.clone()),
        }
    }
}

impl From<&str> for Param {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Param {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&String> for Param {
    fn from(v: &String) -> Self {
        Self::Text(v.clone())
    }
}

impl From<i32> for Param {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<i64> for Param {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<u32> for Param {
    fn from(v: u32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<u64> for Param {
    fn from(v: u64) -> Self {
        i64::try_from(v).map_or_else(|_| Self::Literal(v.to_string()), Self::Integer)
    }
}

impl From<usize> for Param {
    fn from(v: usize) -> Self {
        i64::try_from(v).map_or_else(|_| Self::Literal(v.to_string()), Self::Integer)
    }
}

impl From<f64> for Param {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<f32> for Param {
    fn from(v: f32) -> Self {
        Self::Real(f64::from(v))
    }
}

impl From<bool> for Param {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<DateTime<FixedOffset>> for Param {
    fn from(v: DateTime<FixedOffset>) -> Self {
        Self::Timestamp(v)
    }
}

impl From<DateTime<Utc>> for Param {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v.fixed_offset())
    }
}

impl From<DateTime<Local>> for Param {
    fn from(v: DateTime<Local>) -> Self {
        Self::Timestamp(v.fixed_offset())
    }
}

/// Naive timestamps are taken to be UTC.
impl From<NaiveDateTime> for Param {
    fn from(v: NaiveDateTime) -> Self {
        Self::Timestamp(v.and_utc().fixed_offset())
    }
}

impl From<StatementText> for Param {
    fn from(v: StatementText) -> Self {
        Self::Statement(v)
    }
}

impl From<&StatementText> for Param {
    fn from(v: &StatementText) -> Self {
        Self::Statement(v.clone())
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// A scalar read from a result row.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    /// SQL `NULL`.
    Null,
    /// 64-bit integer.
    Integer(i64),
    /// 64-bit float.
    Real(f64),
    /// UTF-8 text (temporal values are stored as text too).
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Whether this is SQL `NULL`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str(NULL_LITERAL),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Real(r) => write!(f, "{r}"),
            Self::Text(s) => f.write_str(s),
            Self::Blob(b) => f.write_str(&String::from_utf8_lossy(b)),
        }
    }
}

impl From<ValueRef<'_>> for SqlValue {
    fn from(v: ValueRef<'_>) -> Self {
        match v {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(n) => Self::Integer(n),
            ValueRef::Real(r) => Self::Real(r),
            ValueRef::Text(t) => Self::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Self::Blob(b.to_vec()),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}
