//! Bound parameter values and how they are rendered as SQL literals.

use crate::format::{TokenKind, tokenize};
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::error::Error;
use std::fmt;
use tokio_postgres::Row;
use tokio_postgres::types::{FromSql, IsNull, ToSql, Type};

/// Pattern used for every date/time literal in SQL dumps.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Text shown in a result table for a value that could not be decoded.
pub const UNREAD_VALUE: &str = "[unread]";

/// A parameter or column value captured for display.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Uuid(uuid::Uuid),
    Json(serde_json::Value),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Decode column `idx` of `row` for display.
    ///
    /// Returns `None` for SQL `NULL`. Columns whose type has no mapping, or
    /// whose value fails to decode, become the `[unread]` marker.
    pub fn from_row(row: &Row, idx: usize) -> Option<SqlValue> {
        let ty = row.columns().get(idx)?.type_().clone();

        fn get<'a, T>(row: &'a Row, idx: usize, wrap: impl FnOnce(T) -> SqlValue) -> Option<SqlValue>
        where
            T: tokio_postgres::types::FromSql<'a>,
        {
            match row.try_get::<_, Option<T>>(idx) {
                Ok(v) => v.map(wrap),
                Err(_) => Some(SqlValue::Text(UNREAD_VALUE.to_string())),
            }
        }

        if ty == Type::BOOL {
            get(row, idx, SqlValue::Bool)
        } else if ty == Type::INT2 {
            get(row, idx, |v: i16| SqlValue::Int(v.into()))
        } else if ty == Type::INT4 {
            get(row, idx, |v: i32| SqlValue::Int(v.into()))
        } else if ty == Type::INT8 {
            get(row, idx, SqlValue::Int)
        } else if ty == Type::FLOAT4 {
            get(row, idx, |v: f32| SqlValue::Float(v.into()))
        } else if ty == Type::FLOAT8 {
            get(row, idx, SqlValue::Float)
        } else if ty == Type::TEXT
            || ty == Type::VARCHAR
            || ty == Type::BPCHAR
            || ty == Type::NAME
        {
            get(row, idx, SqlValue::Text)
        } else if ty == Type::BYTEA {
            get(row, idx, SqlValue::Bytes)
        } else if ty == Type::DATE {
            get(row, idx, SqlValue::Date)
        } else if ty == Type::TIMESTAMP {
            get(row, idx, SqlValue::Timestamp)
        } else if ty == Type::TIMESTAMPTZ {
            get(row, idx, SqlValue::TimestampTz)
        } else if ty == Type::UUID {
            get(row, idx, SqlValue::Uuid)
        } else if ty == Type::JSON || ty == Type::JSONB {
            get(row, idx, SqlValue::Json)
        } else {
            Some(SqlValue::Text(UNREAD_VALUE.to_string()))
        }
    }

    /// Recover the value behind a parameter of unknown concrete type.
    ///
    /// The parameter is encoded for each supported type in turn and the
    /// first encoding it accepts is decoded back. `None` when no supported
    /// type accepts it.
    pub fn from_param(param: &(dyn ToSql + Sync)) -> Option<SqlValue> {
        let mut buf = BytesMut::new();
        for ty in param_types() {
            buf.clear();
            match param.to_sql_checked(&ty, &mut buf) {
                Ok(IsNull::Yes) => return Some(SqlValue::Null),
                Ok(IsNull::No) => return decode_param(&ty, &buf).ok(),
                Err(_) => {}
            }
        }
        None
    }
}

/// Types tried by [`SqlValue::from_param`], in order.
fn param_types() -> [Type; 13] {
    [
        Type::BOOL,
        Type::INT2,
        Type::INT4,
        Type::INT8,
        Type::FLOAT4,
        Type::FLOAT8,
        Type::TEXT,
        Type::BYTEA,
        Type::DATE,
        Type::TIMESTAMP,
        Type::TIMESTAMPTZ,
        Type::UUID,
        Type::JSONB,
    ]
}

fn decode_param(ty: &Type, raw: &[u8]) -> Result<SqlValue, Box<dyn Error + Sync + Send>> {
    let value = if *ty == Type::BOOL {
        SqlValue::Bool(bool::from_sql(ty, raw)?)
    } else if *ty == Type::INT2 {
        SqlValue::Int(i16::from_sql(ty, raw)?.into())
    } else if *ty == Type::INT4 {
        SqlValue::Int(i32::from_sql(ty, raw)?.into())
    } else if *ty == Type::INT8 {
        SqlValue::Int(i64::from_sql(ty, raw)?)
    } else if *ty == Type::FLOAT4 {
        SqlValue::Float(f32::from_sql(ty, raw)?.into())
    } else if *ty == Type::FLOAT8 {
        SqlValue::Float(f64::from_sql(ty, raw)?)
    } else if *ty == Type::TEXT {
        SqlValue::Text(String::from_sql(ty, raw)?)
    } else if *ty == Type::BYTEA {
        SqlValue::Bytes(Vec::<u8>::from_sql(ty, raw)?)
    } else if *ty == Type::DATE {
        SqlValue::Date(NaiveDate::from_sql(ty, raw)?)
    } else if *ty == Type::TIMESTAMP {
        SqlValue::Timestamp(NaiveDateTime::from_sql(ty, raw)?)
    } else if *ty == Type::TIMESTAMPTZ {
        SqlValue::TimestampTz(DateTime::<Utc>::from_sql(ty, raw)?)
    } else if *ty == Type::UUID {
        SqlValue::Uuid(uuid::Uuid::from_sql(ty, raw)?)
    } else if *ty == Type::JSONB {
        SqlValue::Json(serde_json::Value::from_sql(ty, raw)?)
    } else {
        return Err(format!("no display mapping for type {ty}").into());
    };
    Ok(value)
}

/// Plain text form, as shown in result tables.
impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Bool(v) => write!(f, "{v}"),
            SqlValue::Int(v) => write!(f, "{v}"),
            SqlValue::Float(v) => write!(f, "{v}"),
            SqlValue::Text(v) => f.write_str(v),
            SqlValue::Bytes(v) => {
                f.write_str("\\x")?;
                for b in v {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
            SqlValue::Date(v) => write!(f, "{v}"),
            SqlValue::Timestamp(v) => write!(f, "{v}"),
            SqlValue::TimestampTz(v) => write!(f, "{v}"),
            SqlValue::Uuid(v) => write!(f, "{v}"),
            SqlValue::Json(v) => write!(f, "{v}"),
        }
    }
}

macro_rules! impl_from_for_sql_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for SqlValue {
                fn from(v: $ty) -> Self {
                    SqlValue::$variant(v.into())
                }
            }
        )*
    };
}

impl_from_for_sql_value!(
    bool => Bool,
    i16 => Int,
    i32 => Int,
    i64 => Int,
    f32 => Float,
    f64 => Float,
    String => Text,
    &str => Text,
    Vec<u8> => Bytes,
    NaiveDate => Date,
    NaiveDateTime => Timestamp,
    DateTime<Utc> => TimestampTz,
    uuid::Uuid => Uuid,
    serde_json::Value => Json,
);

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

type ToSqlResult = Result<IsNull, Box<dyn Error + Sync + Send>>;

impl ToSql for SqlValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> ToSqlResult {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(v) => v.to_sql(ty, out),
            SqlValue::Int(v) => {
                if *ty == Type::INT2 {
                    i16::try_from(*v)?.to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    i32::try_from(*v)?.to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            SqlValue::Float(v) => {
                if *ty == Type::FLOAT4 {
                    (*v as f32).to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            SqlValue::Text(v) => v.to_sql(ty, out),
            SqlValue::Bytes(v) => v.to_sql(ty, out),
            SqlValue::Date(v) => v.to_sql(ty, out),
            SqlValue::Timestamp(v) => v.to_sql(ty, out),
            SqlValue::TimestampTz(v) => v.to_sql(ty, out),
            SqlValue::Uuid(v) => v.to_sql(ty, out),
            SqlValue::Json(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn to_sql_checked(&self, ty: &Type, out: &mut BytesMut) -> ToSqlResult {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(v) => v.to_sql_checked(ty, out),
            SqlValue::Int(_) if *ty == Type::INT2 || *ty == Type::INT4 || *ty == Type::INT8 => {
                self.to_sql(ty, out)
            }
            SqlValue::Int(v) => v.to_sql_checked(ty, out),
            SqlValue::Float(_) if *ty == Type::FLOAT4 || *ty == Type::FLOAT8 => {
                self.to_sql(ty, out)
            }
            SqlValue::Float(v) => v.to_sql_checked(ty, out),
            SqlValue::Text(v) => v.to_sql_checked(ty, out),
            SqlValue::Bytes(v) => v.to_sql_checked(ty, out),
            SqlValue::Date(v) => v.to_sql_checked(ty, out),
            SqlValue::Timestamp(v) => v.to_sql_checked(ty, out),
            SqlValue::TimestampTz(v) => v.to_sql_checked(ty, out),
            SqlValue::Uuid(v) => v.to_sql_checked(ty, out),
            SqlValue::Json(v) => v.to_sql_checked(ty, out),
        }
    }
}

/// SQL literal conventions of one database.
///
/// The provided methods implement the default conventions; a dialect for a
/// specific database overrides what differs.
pub trait Dialect: Send + Sync {
    /// Whether booleans render as `true`/`false` rather than `1`/`0`.
    fn boolean_as_true_false(&self) -> bool {
        false
    }

    /// Render a bound value so the dumped statement can be re-run by hand.
    fn format_parameter(&self, value: &SqlValue) -> String {
        match value {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Text(s) => format!("'{}'", self.escape_string(s)),
            SqlValue::Date(d) => match d.and_hms_opt(0, 0, 0) {
                Some(dt) => format!("'{}'", dt.format(DATE_FORMAT)),
                None => format!("'{d}'"),
            },
            SqlValue::Timestamp(ts) => format!("'{}'", ts.format(DATE_FORMAT)),
            SqlValue::TimestampTz(ts) => format!("'{}'", ts.naive_utc().format(DATE_FORMAT)),
            SqlValue::Bool(b) => match (self.boolean_as_true_false(), b) {
                (true, true) => "true".to_string(),
                (true, false) => "false".to_string(),
                (false, true) => "1".to_string(),
                (false, false) => "0".to_string(),
            },
            other => other.to_string(),
        }
    }

    /// Render a parameter whose concrete type is unknown.
    ///
    /// Parameters of a supported type render like [`Dialect::format_parameter`];
    /// anything else falls back to its `Debug` text.
    fn format_opaque(&self, value: &(dyn ToSql + Sync)) -> String {
        match SqlValue::from_param(value) {
            Some(v) => self.format_parameter(&v),
            None => format!("{value:?}"),
        }
    }

    /// Escape a string for use inside single quotes: every `'` is doubled.
    fn escape_string(&self, s: &str) -> String {
        s.replace('\'', "''")
    }
}

/// The default dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDialect {
    pub boolean_as_true_false: bool,
}

impl DefaultDialect {
    pub fn new(boolean_as_true_false: bool) -> Self {
        Self {
            boolean_as_true_false,
        }
    }
}

impl Dialect for DefaultDialect {
    fn boolean_as_true_false(&self) -> bool {
        self.boolean_as_true_false
    }
}

/// Substitute `$1`, `$2`, ... in `sql` with already formatted parameters.
///
/// Placeholders inside quoted text, comments and dollar-quoted bodies, and
/// placeholders with no matching parameter, are left untouched.
pub fn dump_sql(sql: &str, params: &[String]) -> String {
    if params.is_empty() {
        return sql.to_string();
    }

    let mut out = String::with_capacity(sql.len() + params.len() * 8);
    let mut last = 0;

    for token in tokenize(sql) {
        if token.kind != TokenKind::Word {
            continue;
        }
        let replacement = placeholder_index(token.text).and_then(|n| params.get(n));
        if let Some(p) = replacement {
            out.push_str(&sql[last..token.start]);
            out.push_str(p);
            last = token.start + token.text.len();
        }
    }

    out.push_str(&sql[last..]);
    out
}

/// Zero-based parameter index of a `$n` placeholder.
fn placeholder_index(word: &str) -> Option<usize> {
    let digits = word.strip_prefix('$')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<usize>().ok()?.checked_sub(1)
}
