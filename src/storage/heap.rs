use std::{collections::HashMap, num::NonZeroU64};

use tracing::warn;

use crate::types::{
    VAR_HANDLE_SIZE,
    error::{Result, StorageError},
};

/// Reference to a variable-length buffer, stored in the row slot as
/// 8 little-endian bytes. Zero bytes mean "no buffer".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarHandle(NonZeroU64);

impl VarHandle {
    pub fn to_bytes(self) -> [u8; VAR_HANDLE_SIZE] {
        self.0.get().to_le_bytes()
    }

    pub fn from_slot_bytes(bytes: &[u8]) -> Option<Self> {
        let mut raw = [0u8; VAR_HANDLE_SIZE];
        raw.copy_from_slice(&bytes[..VAR_HANDLE_SIZE]);
        NonZeroU64::new(u64::from_le_bytes(raw)).map(VarHandle)
    }

    /// Reads the handle out of `bytes` and zeroes them, leaving the caller
    /// as the sole owner of the buffer.
    pub fn take_from_slot(bytes: &mut [u8]) -> Option<Self> {
        let handle = Self::from_slot_bytes(bytes);
        bytes[..VAR_HANDLE_SIZE].fill(0);
        handle
    }
}

/// Table-owned arena for VARCHAR buffers. Each buffer is owned by exactly one
/// row slot through its handle; handles are never reused.
#[derive(Debug)]
pub struct VarHeap {
    buffers: HashMap<NonZeroU64, Box<[u8]>>,
    next_handle: NonZeroU64,
    bytes_in_use: usize,
    max_bytes: Option<usize>,
}

impl VarHeap {
    pub fn new(max_bytes: Option<usize>) -> Self {
        Self {
            buffers: HashMap::new(),
            next_handle: NonZeroU64::MIN,
            bytes_in_use: 0,
            max_bytes,
        }
    }

    /// Allocates a `precision`-byte buffer holding `source`, truncated or
    /// NUL-padded to fit.
    pub fn allocate(&mut self, precision: usize, source: &[u8]) -> Result<VarHandle> {
        if let Some(max) = self.max_bytes {
            let available = max.saturating_sub(self.bytes_in_use);
            if precision > available {
                warn!(precision, available, "variable-length heap budget exhausted");
                return Err(StorageError::HeapExhausted {
                    requested: precision,
                    available,
                });
            }
        }

        let key = self.next_handle;
        let next = key.checked_add(1).ok_or_else(|| {
            warn!("variable-length handle space exhausted");
            StorageError::HandlesExhausted
        })?;

        let mut buffer = Vec::new();
        buffer.try_reserve_exact(precision)?;
        buffer.resize(precision, 0);
        copy_padded(&mut buffer, source);

        self.next_handle = next;
        self.buffers.insert(key, buffer.into_boxed_slice());
        self.bytes_in_use += precision;
        Ok(VarHandle(key))
    }

    pub fn get(&self, handle: VarHandle) -> &[u8] {
        match self.buffers.get(&handle.0) {
            Some(buffer) => buffer,
            None => panic!("dangling variable-length handle {}", handle.0),
        }
    }

    /// Copies `source` into the existing buffer; its size never changes.
    pub fn overwrite(&mut self, handle: VarHandle, source: &[u8]) {
        match self.buffers.get_mut(&handle.0) {
            Some(buffer) => copy_padded(buffer, source),
            None => panic!("dangling variable-length handle {}", handle.0),
        }
    }

    /// Hands the buffer back to the caller, ending the slot's ownership.
    pub fn release(&mut self, handle: VarHandle) -> Box<[u8]> {
        match self.buffers.remove(&handle.0) {
            Some(buffer) => {
                self.bytes_in_use -= buffer.len();
                buffer
            }
            None => panic!("variable-length handle {} released twice", handle.0),
        }
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn bytes_in_use(&self) -> usize {
        self.bytes_in_use
    }
}

fn copy_padded(buffer: &mut [u8], source: &[u8]) {
    let len = source.len().min(buffer.len());
    buffer[..len].copy_from_slice(&source[..len]);
    buffer[len..].fill(0);
}
