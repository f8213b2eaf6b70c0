use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{
    MAX_COLUMN_NAME_LEN, VAR_HANDLE_SIZE,
    error::{Result, StorageError},
    value::Value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Varchar,
    Integer,
    Double,
    Date,
    DateTime,
    /// Also used for BOOL.
    TinyInt,
}

impl ColumnType {
    /// Byte width used when a column is declared without an explicit precision.
    pub fn default_precision(&self) -> usize {
        match self {
            ColumnType::Varchar => 255,
            ColumnType::Integer => 8,
            ColumnType::Double => 8,
            ColumnType::Date => 4,
            ColumnType::DateTime => 8,
            ColumnType::TinyInt => 1,
        }
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, ColumnType::Varchar)
    }

    fn accepts_precision(&self, precision: usize) -> bool {
        match self {
            ColumnType::Varchar => precision > 0,
            ColumnType::Integer => matches!(precision, 1 | 2 | 4 | 8),
            ColumnType::Double => matches!(precision, 4 | 8),
            ColumnType::Date => precision == 4,
            ColumnType::DateTime => precision == 8,
            ColumnType::TinyInt => precision == 1,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "VARCHAR" | "TEXT" => Some(ColumnType::Varchar),
            "INTEGER" | "INT" => Some(ColumnType::Integer),
            "DOUBLE" | "REAL" => Some(ColumnType::Double),
            "DATE" => Some(ColumnType::Date),
            "DATETIME" | "TIMESTAMP" => Some(ColumnType::DateTime),
            "TINYINT" | "BOOL" | "BOOLEAN" => Some(ColumnType::TinyInt),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Varchar => "VARCHAR",
            ColumnType::Integer => "INTEGER",
            ColumnType::Double => "DOUBLE",
            ColumnType::Date => "DATE",
            ColumnType::DateTime => "DATETIME",
            ColumnType::TinyInt => "TINYINT",
        };
        write!(f, "{}", name)
    }
}

/// Represents a column definition in a table's catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    /// Inline byte width for fixed types, declared maximum length for VARCHAR.
    pub precision: usize,
    pub nullable: bool,
    pub unique: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub indexed: bool,
    pub default_value: Option<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            precision: column_type.default_precision(),
            nullable: true,
            unique: false,
            primary_key: false,
            auto_increment: false,
            indexed: false,
            default_value: None,
        }
    }

    pub fn varchar(name: impl Into<String>, length: usize) -> Self {
        Self::new(name, ColumnType::Varchar).with_precision(length)
    }

    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = precision;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, default_value: Value) -> Self {
        self.default_value = Some(default_value);
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false; // Primary keys are always NOT NULL
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn is_variable(&self) -> bool {
        self.column_type.is_variable()
    }

    /// Bytes the column occupies inside a row slot.
    pub fn storage_width(&self) -> usize {
        if self.is_variable() {
            VAR_HANDLE_SIZE
        } else {
            self.precision
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.name, MAX_COLUMN_NAME_LEN)?;
        if !self.column_type.accepts_precision(self.precision) {
            return Err(StorageError::InvalidPrecision {
                column: self.name.clone(),
                precision: self.precision,
            });
        }
        match &self.default_value {
            None => Ok(()),
            Some(Value::Null) if self.nullable => Ok(()),
            Some(Value::Null) => Err(StorageError::NullViolation {
                column: self.name.clone(),
            }),
            Some(Value::Varchar(_)) if self.is_variable() => Ok(()),
            Some(value) if self.is_variable() => Err(StorageError::TypeMismatch {
                column: self.name.clone(),
                expected: self.column_type.to_string(),
                actual: value.type_name().to_string(),
            }),
            Some(value) => {
                let mut scratch = vec![0u8; self.precision];
                value.encode_fixed(self, &mut scratch)
            }
        }
    }
}

/// Bytes `column` takes inside a row slot.
pub fn column_storage_width(column: &Column) -> usize {
    column.storage_width()
}

/// Accepts `[A-Za-z][A-Za-z0-9_]*` of at most `max_len` characters.
pub fn validate_identifier(name: &str, max_len: usize) -> Result<()> {
    let invalid = |reason| StorageError::InvalidIdentifier {
        name: name.to_string(),
        reason,
    };

    let mut chars = name.chars();
    match chars.next() {
        None => return Err(invalid("empty name")),
        Some(first) if !first.is_ascii_alphabetic() => {
            return Err(invalid("must start with a letter"));
        }
        Some(_) => {}
    }
    if name.len() > max_len {
        return Err(invalid("name too long"));
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid("only letters, digits and '_' are allowed"));
    }
    Ok(())
}
