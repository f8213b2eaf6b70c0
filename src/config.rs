use serde::{Deserialize, Serialize};

/// Per-table resource limits and schema-change policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Upper bound on pages in the ring. `None` means unbounded.
    pub max_pages: Option<usize>,
    /// Upper bound on bytes held by variable-length buffers.
    pub max_heap_bytes: Option<usize>,
    /// When a nullable column without a default is added to a table that
    /// already holds rows, mark it NULL in those rows. When false the
    /// existing rows read the type's zero value instead.
    pub null_new_columns: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_pages: None,
            max_heap_bytes: None,
            null_new_columns: true,
        }
    }
}

impl StoreConfig {
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    pub fn with_max_heap_bytes(mut self, max_heap_bytes: usize) -> Self {
        self.max_heap_bytes = Some(max_heap_bytes);
        self
    }

    pub fn with_null_new_columns(mut self, enabled: bool) -> Self {
        self.null_new_columns = enabled;
        self
    }
}
