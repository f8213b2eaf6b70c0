pub mod column;
pub mod error;
pub mod page;
pub mod value;

// Common type aliases
pub type PageId = u64;

pub const PAGE_SIZE: usize = 4096;
pub const MAX_COLUMNS: usize = 64;
pub const MAX_COLUMN_NAME_LEN: usize = 127;
pub const MAX_TABLE_NAME_LEN: usize = 127;

// Row header: empty flag (1) + deleted flag (1) + null bitmap
pub const ROW_FLAGS_SIZE: usize = 2;
pub const NULL_BITMAP_SIZE: usize = MAX_COLUMNS / 8;
pub const ROW_HEADER_SIZE: usize = ROW_FLAGS_SIZE + NULL_BITMAP_SIZE;

/// Width of the in-slot reference to a variable-length buffer.
pub const VAR_HANDLE_SIZE: usize = std::mem::size_of::<u64>();
