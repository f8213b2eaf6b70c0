use std::collections::TryReserveError;

use thiserror::Error;

use crate::types::PageId;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid identifier '{name}': {reason}")]
    InvalidIdentifier { name: String, reason: &'static str },

    #[error("Invalid precision {precision} for column '{column}'")]
    InvalidPrecision { column: String, precision: usize },

    #[error("Column '{name}' already exists in table '{table}'")]
    DuplicateColumn { name: String, table: String },

    #[error("Column '{name}' not found in table '{table}'")]
    ColumnNotFound { name: String, table: String },

    #[error("Table '{table}' already has the maximum of {max} columns")]
    TooManyColumns { table: String, max: usize },

    #[error("Invalid row length: expected {expected} bytes, got {actual} bytes")]
    InvalidRowLength { expected: usize, actual: usize },

    #[error("Expected {expected} values, got {actual}")]
    ValueCountMismatch { expected: usize, actual: usize },

    #[error("Type mismatch for column '{column}': expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: String,
        actual: String,
    },

    #[error("Value for column '{column}' does not fit in {width} bytes")]
    ValueOutOfRange { column: String, width: usize },

    #[error("Column '{column}' is NOT NULL")]
    NullViolation { column: String },

    #[error("Page {page_id} is not part of this table")]
    PageNotFound { page_id: PageId },

    #[error("Invalid slot offset {offset} in page {page_id}")]
    InvalidSlot { page_id: PageId, offset: usize },

    #[error("Page budget exhausted ({max} pages)")]
    PageBudgetExhausted { max: usize },

    #[error("Variable-length heap exhausted: {requested} bytes requested, {available} available")]
    HeapExhausted { requested: usize, available: usize },

    #[error("Variable-length handle space exhausted")]
    HandlesExhausted,

    #[error("Allocation failed: {0}")]
    OutOfMemory(#[from] TryReserveError),
}

pub type Result<T> = std::result::Result<T, StorageError>;
