use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::types::{
    column::{Column, ColumnType},
    error::{Result, StorageError},
};

// NaiveDate::num_days_from_ce() of 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Double(f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    TinyInt(i8),
    Varchar(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Integer(_) => "INTEGER",
            Value::Double(_) => "DOUBLE",
            Value::Date(_) => "DATE",
            Value::DateTime(_) => "DATETIME",
            Value::TinyInt(_) => "TINYINT",
            Value::Varchar(_) => "VARCHAR",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::TinyInt(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Writes a fixed-width value into `out`, which is exactly the column's
    /// storage width. VARCHAR values are not stored inline and are rejected.
    pub fn encode_fixed(&self, column: &Column, out: &mut [u8]) -> Result<()> {
        debug_assert_eq!(out.len(), column.precision);
        let mismatch = || StorageError::TypeMismatch {
            column: column.name.clone(),
            expected: column.column_type.to_string(),
            actual: self.type_name().to_string(),
        };

        match (column.column_type, self) {
            (ColumnType::Integer, Value::Integer(v)) => write_int(*v, column, out),
            (ColumnType::Integer, Value::TinyInt(v)) => write_int(i64::from(*v), column, out),
            (ColumnType::TinyInt, Value::TinyInt(v)) => {
                out[0] = *v as u8;
                Ok(())
            }
            (ColumnType::TinyInt, Value::Integer(v)) => {
                let narrowed = i8::try_from(*v).map_err(|_| StorageError::ValueOutOfRange {
                    column: column.name.clone(),
                    width: 1,
                })?;
                out[0] = narrowed as u8;
                Ok(())
            }
            (ColumnType::Double, Value::Double(v)) => {
                write_float(*v, out);
                Ok(())
            }
            (ColumnType::Double, Value::Integer(v)) => {
                write_float(*v as f64, out);
                Ok(())
            }
            (ColumnType::Date, Value::Date(d)) => {
                let days = d.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE;
                out.copy_from_slice(&days.to_le_bytes());
                Ok(())
            }
            (ColumnType::DateTime, Value::DateTime(dt)) => {
                let millis = dt.and_utc().timestamp_millis();
                out.copy_from_slice(&millis.to_le_bytes());
                Ok(())
            }
            _ => Err(mismatch()),
        }
    }

    /// Reads a fixed-width value stored inline for `column`.
    pub fn decode_fixed(column: &Column, bytes: &[u8]) -> Value {
        match column.column_type {
            ColumnType::Integer => Value::Integer(read_int(bytes)),
            ColumnType::TinyInt => Value::TinyInt(bytes[0] as i8),
            ColumnType::Double => Value::Double(read_float(bytes)),
            ColumnType::Date => {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(&bytes[..4]);
                let days = i32::from_le_bytes(raw);
                let date = days
                    .checked_add(UNIX_EPOCH_DAYS_FROM_CE)
                    .and_then(NaiveDate::from_num_days_from_ce_opt)
                    .unwrap_or_default();
                Value::Date(date)
            }
            ColumnType::DateTime => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&bytes[..8]);
                let millis = i64::from_le_bytes(raw);
                let datetime = DateTime::from_timestamp_millis(millis)
                    .map(|dt| dt.naive_utc())
                    .unwrap_or_default();
                Value::DateTime(datetime)
            }
            ColumnType::Varchar => {
                unreachable!("VARCHAR values are resolved through the heap")
            }
        }
    }

    /// Decodes a VARCHAR heap buffer: the value ends at the first NUL.
    pub fn decode_varchar(buffer: &[u8]) -> Value {
        let end = buffer.iter().position(|&b| b == 0).unwrap_or(buffer.len());
        Value::Varchar(String::from_utf8_lossy(&buffer[..end]).into_owned())
    }
}

fn write_int(value: i64, column: &Column, out: &mut [u8]) -> Result<()> {
    let width = out.len();
    let bytes = value.to_le_bytes();
    if read_int(&bytes[..width]) != value {
        return Err(StorageError::ValueOutOfRange {
            column: column.name.clone(),
            width,
        });
    }
    out.copy_from_slice(&bytes[..width]);
    Ok(())
}

// Little-endian, sign-extended from the stored width.
fn read_int(bytes: &[u8]) -> i64 {
    let width = bytes.len().min(8);
    let negative = width > 0 && bytes[width - 1] & 0x80 != 0;
    let mut raw = if negative { [0xFF; 8] } else { [0u8; 8] };
    raw[..width].copy_from_slice(&bytes[..width]);
    i64::from_le_bytes(raw)
}

fn write_float(value: f64, out: &mut [u8]) {
    match out.len() {
        4 => out.copy_from_slice(&(value as f32).to_le_bytes()),
        _ => out.copy_from_slice(&value.to_le_bytes()),
    }
}

fn read_float(bytes: &[u8]) -> f64 {
    match bytes.len() {
        4 => {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(bytes);
            f64::from(f32::from_le_bytes(raw))
        }
        _ => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[..8]);
            f64::from_le_bytes(raw)
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::TinyInt(i8::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Varchar(value.to_string())
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::DateTime(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.3f")),
            Value::TinyInt(v) => write!(f, "{}", v),
            Value::Varchar(s) => write!(f, "{}", s),
        }
    }
}
