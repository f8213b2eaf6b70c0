use std::ops::Range;

use bitvec::prelude::*;

use crate::{
    storage::heap::{VarHandle, VarHeap},
    types::{
        NULL_BITMAP_SIZE, ROW_FLAGS_SIZE, ROW_HEADER_SIZE,
        column::Column,
        error::{Result, StorageError},
        page::SlotState,
        value::Value,
    },
};

/// One bit per column, LSB first within each byte.
pub type NullBitmap = BitArray<[u8; NULL_BITMAP_SIZE], Lsb0>;

const NULL_BITMAP_RANGE: Range<usize> = ROW_FLAGS_SIZE..ROW_HEADER_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLayout {
    /// Offset from the start of the slot.
    pub offset: usize,
    pub width: usize,
    pub variable: bool,
    pub precision: usize,
}

impl FieldLayout {
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.width
    }
}

/// Byte layout of a row for one catalog state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowLayout {
    fields: Vec<FieldLayout>,
    payload_width: usize,
}

impl RowLayout {
    pub fn new(columns: &[Column]) -> Self {
        let mut fields = Vec::with_capacity(columns.len());
        let mut offset = ROW_HEADER_SIZE;
        for column in columns {
            let width = column.storage_width();
            fields.push(FieldLayout {
                offset,
                width,
                variable: column.is_variable(),
                precision: column.precision,
            });
            offset += width;
        }
        Self {
            fields,
            payload_width: offset - ROW_HEADER_SIZE,
        }
    }

    pub fn row_size(&self) -> usize {
        ROW_HEADER_SIZE + self.payload_width
    }

    pub fn payload_width(&self) -> usize {
        self.payload_width
    }

    pub fn field(&self, index: usize) -> &FieldLayout {
        &self.fields[index]
    }

    pub fn fields(&self) -> &[FieldLayout] {
        &self.fields
    }

    pub fn column_count(&self) -> usize {
        self.fields.len()
    }

    pub fn variable_fields(&self) -> impl Iterator<Item = (usize, &FieldLayout)> {
        self.fields.iter().enumerate().filter(|(_, f)| f.variable)
    }
}

/// Payload bytes of a row under `columns`.
pub fn row_payload_width(columns: &[Column]) -> usize {
    columns.iter().map(Column::storage_width).sum()
}

/// Slot size of a row under `columns`.
pub fn row_size(columns: &[Column]) -> usize {
    ROW_HEADER_SIZE + row_payload_width(columns)
}

pub fn read_null_bitmap(slot: &[u8]) -> NullBitmap {
    let mut raw = [0u8; NULL_BITMAP_SIZE];
    raw.copy_from_slice(&slot[NULL_BITMAP_RANGE]);
    NullBitmap::new(raw)
}

pub fn write_null_bitmap(slot: &mut [u8], bitmap: &NullBitmap) {
    slot[NULL_BITMAP_RANGE].copy_from_slice(bitmap.as_raw_slice());
}

/// A row as handed to insert/update: `row_size` bytes in slot layout plus the
/// source bytes of every VARCHAR column, which live outside the slot until the
/// store copies them into buffers it owns.
#[derive(Debug, Clone, PartialEq)]
pub struct RowImage {
    bytes: Vec<u8>,
    varchars: Vec<Option<Vec<u8>>>,
}

impl RowImage {
    pub fn from_parts(bytes: Vec<u8>, varchars: Vec<Option<Vec<u8>>>) -> Self {
        Self { bytes, varchars }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn column_count(&self) -> usize {
        self.varchars.len()
    }

    pub fn null_bitmap(&self) -> NullBitmap {
        read_null_bitmap(&self.bytes)
    }

    pub fn varchar(&self, index: usize) -> Option<&[u8]> {
        self.varchars.get(index).and_then(|v| v.as_deref())
    }
}

/// Builds the image of a LIVE row. Missing trailing values take the column's
/// default, or NULL.
pub fn encode_row(columns: &[Column], values: &[Value]) -> Result<RowImage> {
    if values.len() > columns.len() {
        return Err(StorageError::ValueCountMismatch {
            expected: columns.len(),
            actual: values.len(),
        });
    }

    let layout = RowLayout::new(columns);
    let mut bytes = vec![0u8; layout.row_size()];
    let mut varchars = vec![None; columns.len()];
    let mut nulls = NullBitmap::new([0u8; NULL_BITMAP_SIZE]);

    for (index, column) in columns.iter().enumerate() {
        let value = match values.get(index) {
            Some(value) => value,
            None => column.default_value.as_ref().unwrap_or(&Value::Null),
        };
        let field = layout.field(index);

        match value {
            Value::Null => {
                if !column.nullable {
                    return Err(StorageError::NullViolation {
                        column: column.name.clone(),
                    });
                }
                nulls.set(index, true);
            }
            Value::Varchar(text) if column.is_variable() => {
                varchars[index] = Some(text.as_bytes().to_vec());
            }
            other if column.is_variable() => {
                return Err(StorageError::TypeMismatch {
                    column: column.name.clone(),
                    expected: column.column_type.to_string(),
                    actual: other.type_name().to_string(),
                });
            }
            other => other.encode_fixed(column, &mut bytes[field.range()])?,
        }
    }

    write_null_bitmap(&mut bytes, &nulls);
    Ok(RowImage { bytes, varchars })
}

/// Releases every VARCHAR buffer referenced by `slot`, zeroing the handles.
/// Returns the number of buffers released.
pub fn free_row_values(layout: &RowLayout, slot: &mut [u8], heap: &mut VarHeap) -> usize {
    let mut released = 0;
    for (_, field) in layout.variable_fields() {
        if let Some(handle) = VarHandle::take_from_slot(&mut slot[field.range()]) {
            drop(heap.release(handle));
            released += 1;
        }
    }
    released
}

/// Read access to one slot.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    columns: &'a [Column],
    layout: &'a RowLayout,
    slot: &'a [u8],
    heap: &'a VarHeap,
    state: SlotState,
}

impl<'a> RowView<'a> {
    pub fn new(
        columns: &'a [Column],
        layout: &'a RowLayout,
        slot: &'a [u8],
        heap: &'a VarHeap,
        state: SlotState,
    ) -> Self {
        Self {
            columns,
            layout,
            slot,
            heap,
            state,
        }
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn raw(&self) -> &'a [u8] {
        self.slot
    }

    pub fn null_bitmap(&self) -> NullBitmap {
        read_null_bitmap(self.slot)
    }

    pub fn is_null(&self, index: usize) -> bool {
        self.null_bitmap()[index]
    }

    /// Heap bytes of a VARCHAR column, `None` when NULL or never allocated.
    pub fn varchar_bytes(&self, index: usize) -> Option<&'a [u8]> {
        let field = self.layout.field(index);
        if !field.variable || self.is_null(index) {
            return None;
        }
        let heap: &'a VarHeap = self.heap;
        VarHandle::from_slot_bytes(&self.slot[field.range()]).map(|h| heap.get(h))
    }

    pub fn value(&self, index: usize) -> Value {
        if self.is_null(index) {
            return Value::Null;
        }
        let field = self.layout.field(index);
        if field.variable {
            match self.varchar_bytes(index) {
                Some(bytes) => Value::decode_varchar(bytes),
                None => Value::Varchar(String::new()),
            }
        } else {
            Value::decode_fixed(&self.columns[index], &self.slot[field.range()])
        }
    }

    pub fn values(&self) -> Vec<Value> {
        (0..self.columns.len()).map(|i| self.value(i)).collect()
    }
}
