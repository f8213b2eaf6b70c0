pub mod config;
pub mod storage;
pub mod types;
pub mod utils;

pub use config::StoreConfig;
pub use storage::{
    codec::{RowImage, RowView, encode_row},
    table::{SlotRef, Table, TableHandle, TableStats, TableStore},
    vacuum::VacuumStats,
};
pub use types::{
    column::{Column, ColumnType},
    error::{Result, StorageError},
    page::SlotState,
    value::Value,
};
