use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::{
    config::StoreConfig,
    storage::{
        codec::{RowImage, RowLayout, RowView, encode_row, free_row_values, write_null_bitmap},
        heap::{VarHandle, VarHeap},
        vacuum::VacuumStats,
    },
    types::{
        MAX_TABLE_NAME_LEN, PAGE_SIZE, PageId,
        column::{Column, validate_identifier},
        error::{Result, StorageError},
        page::{Page, SlotState},
        value::Value,
    },
    utils::hash::calculate_ring_checksum,
};

/// Address of one row slot: the page id and the byte offset inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotRef {
    pub page_id: PageId,
    pub offset: usize,
}

impl SlotRef {
    pub fn new(page_id: PageId, offset: usize) -> Self {
        Self { page_id, offset }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    pub row_size: usize,
    pub slots_per_page: usize,
    pub pages: usize,
    pub free_offset: usize,
    pub live_rows: usize,
    pub tombstoned_rows: usize,
    pub heap_buffers: usize,
    pub heap_bytes: usize,
}

/// A table's catalog, page ring and variable-length heap.
///
/// Row mutations take `&mut self`; shared tables reach them through
/// [`Table::lock`], so a mutation cannot run without holding the table lock.
#[derive(Debug)]
pub struct TableStore {
    pub(super) name: String,
    pub(super) columns: Vec<Column>,
    pub(super) layout: RowLayout,
    /// Ring order: head is index 0, tail is the last page.
    pub(super) pages: Vec<Page>,
    /// First unused byte in the tail page.
    pub(super) free_offset: usize,
    pub(super) next_page_id: PageId,
    pub(super) heap: VarHeap,
    pub(super) config: StoreConfig,
}

impl TableStore {
    /// Empty table with no columns and no pages.
    pub fn new(name: &str) -> Result<Self> {
        Self::with_config(name, StoreConfig::default())
    }

    pub fn with_config(name: &str, config: StoreConfig) -> Result<Self> {
        validate_identifier(name, MAX_TABLE_NAME_LEN)?;
        debug!(table = name, ?config, "table initialized");
        Ok(Self {
            name: name.to_string(),
            columns: Vec::new(),
            layout: RowLayout::new(&[]),
            pages: Vec::new(),
            free_offset: 0,
            next_page_id: 1,
            heap: VarHeap::new(config.max_heap_bytes),
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn layout(&self) -> &RowLayout {
        &self.layout
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Slot size in bytes: row header plus payload.
    pub fn row_size(&self) -> usize {
        self.layout.row_size()
    }

    /// Payload bytes of a row, excluding the header.
    pub fn row_payload_width(&self) -> usize {
        self.layout.payload_width()
    }

    pub fn slots_per_page(&self) -> usize {
        Page::slot_capacity(self.row_size())
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn free_offset(&self) -> usize {
        self.free_offset
    }

    pub fn heap(&self) -> &VarHeap {
        &self.heap
    }

    /// Encodes `values` against the current catalog.
    pub fn encode(&self, values: &[Value]) -> Result<RowImage> {
        encode_row(&self.columns, values)
    }

    /// Stores a row at the tail of the ring. Either the whole row lands in a
    /// LIVE slot or the table is left untouched.
    pub fn insert_row(&mut self, image: &RowImage) -> Result<SlotRef> {
        self.check_image(image)?;
        let row_size = self.row_size();
        let nulls = image.null_bitmap();

        let mut handles: Vec<(usize, VarHandle)> = Vec::new();
        for (index, field) in self.layout.variable_fields() {
            if nulls[index] {
                continue;
            }
            let source = image.varchar(index).unwrap_or_default();
            match self.heap.allocate(field.precision, source) {
                Ok(handle) => handles.push((index, handle)),
                Err(err) => {
                    release_handles(&mut self.heap, handles);
                    return Err(err);
                }
            }
        }

        if self.pages.is_empty() || self.free_offset + row_size > PAGE_SIZE {
            if let Err(err) = self.append_page() {
                release_handles(&mut self.heap, handles);
                return Err(err);
            }
            self.free_offset = 0;
        }

        let offset = self.free_offset;
        let tail = self.pages.len() - 1;
        let layout = &self.layout;
        let page = &mut self.pages[tail];
        debug_assert_eq!(page.slot_state(offset), SlotState::Empty);

        let slot = page.slot_mut(offset, row_size);
        write_null_bitmap(slot, &nulls);
        for field in layout.fields().iter().filter(|f| !f.variable) {
            slot[field.range()].copy_from_slice(&image.as_bytes()[field.range()]);
        }
        for (index, handle) in handles {
            slot[layout.field(index).range()].copy_from_slice(&handle.to_bytes());
        }
        page.mark_live(offset);

        let page_id = page.page_id;
        self.free_offset += row_size;
        trace!(table = %self.name, page_id, offset, "row inserted");
        Ok(SlotRef::new(page_id, offset))
    }

    /// Marks a LIVE row deleted. Its buffers stay allocated until vacuum.
    pub fn delete_row(&mut self, slot: SlotRef) -> Result<()> {
        let index = self.locate(slot)?;
        let page = &mut self.pages[index];
        let state = page.slot_state(slot.offset);
        assert_eq!(
            state,
            SlotState::Live,
            "delete of non-live slot {:?} in table '{}'",
            slot,
            self.name
        );
        page.mark_deleted(slot.offset);
        trace!(table = %self.name, page_id = slot.page_id, offset = slot.offset, "row deleted");
        Ok(())
    }

    /// Rewrites a LIVE row in place. VARCHAR bytes are copied into the
    /// buffers the slot already owns.
    pub fn update_row(&mut self, slot: SlotRef, image: &RowImage) -> Result<()> {
        let index = self.locate(slot)?;
        let state = self.pages[index].slot_state(slot.offset);
        assert_eq!(
            state,
            SlotState::Live,
            "update of non-live slot {:?} in table '{}'",
            slot,
            self.name
        );
        self.check_image(image)?;

        let row_size = self.row_size();
        let nulls = image.null_bitmap();

        // Allocate for NULL -> value transitions before touching the slot.
        let mut fresh: Vec<(usize, VarHandle)> = Vec::new();
        for (column, field) in self.layout.variable_fields() {
            let current = &self.pages[index].slot(slot.offset, row_size)[field.range()];
            if nulls[column] || VarHandle::from_slot_bytes(current).is_some() {
                continue;
            }
            let source = image.varchar(column).unwrap_or_default();
            match self.heap.allocate(field.precision, source) {
                Ok(handle) => fresh.push((column, handle)),
                Err(err) => {
                    release_handles(&mut self.heap, fresh);
                    return Err(err);
                }
            }
        }

        let layout = &self.layout;
        let heap = &mut self.heap;
        let bytes = self.pages[index].slot_mut(slot.offset, row_size);
        write_null_bitmap(bytes, &nulls);
        for (column, field) in layout.fields().iter().enumerate() {
            let range = field.range();
            if !field.variable {
                bytes[range.clone()].copy_from_slice(&image.as_bytes()[range]);
                continue;
            }
            match VarHandle::from_slot_bytes(&bytes[range.clone()]) {
                Some(handle) if nulls[column] => {
                    VarHandle::take_from_slot(&mut bytes[range]);
                    drop(heap.release(handle));
                }
                Some(handle) => {
                    heap.overwrite(handle, image.varchar(column).unwrap_or_default());
                }
                None => {}
            }
        }
        for (column, handle) in fresh {
            bytes[layout.field(column).range()].copy_from_slice(&handle.to_bytes());
        }

        trace!(table = %self.name, page_id = slot.page_id, offset = slot.offset, "row updated");
        Ok(())
    }

    pub fn slot_state(&self, slot: SlotRef) -> Result<SlotState> {
        let index = self.locate(slot)?;
        Ok(self.pages[index].slot_state(slot.offset))
    }

    pub fn view(&self, slot: SlotRef) -> Result<RowView<'_>> {
        let index = self.locate(slot)?;
        Ok(self.view_at(&self.pages[index], slot.offset))
    }

    /// Decoded values of a LIVE row, `None` for EMPTY or tombstoned slots.
    pub fn read_row(&self, slot: SlotRef) -> Result<Option<Vec<Value>>> {
        let view = self.view(slot)?;
        Ok(match view.state() {
            SlotState::Live => Some(view.values()),
            _ => None,
        })
    }

    /// Every slot of every page in ring order, whatever its state.
    pub fn slots(&self) -> impl Iterator<Item = (SlotRef, RowView<'_>)> + '_ {
        let row_size = self.row_size();
        self.pages.iter().flat_map(move |page| {
            Page::slot_offsets(row_size).map(move |offset| {
                (
                    SlotRef::new(page.page_id, offset),
                    self.view_at(page, offset),
                )
            })
        })
    }

    /// LIVE rows in ring order.
    pub fn rows(&self) -> impl Iterator<Item = (SlotRef, RowView<'_>)> + '_ {
        self.slots()
            .filter(|(_, view)| view.state() == SlotState::Live)
    }

    pub fn stats(&self) -> TableStats {
        let mut live_rows = 0;
        let mut tombstoned_rows = 0;
        for (_, view) in self.slots() {
            match view.state() {
                SlotState::Live => live_rows += 1,
                SlotState::Tombstoned => tombstoned_rows += 1,
                SlotState::Empty => {}
            }
        }
        TableStats {
            row_size: self.row_size(),
            slots_per_page: self.slots_per_page(),
            pages: self.pages.len(),
            free_offset: self.free_offset,
            live_rows,
            tombstoned_rows,
            heap_buffers: self.heap.len(),
            heap_bytes: self.heap.bytes_in_use(),
        }
    }

    /// Checksum over every page in ring order.
    pub fn ring_checksum(&self) -> u32 {
        calculate_ring_checksum(self.pages.iter().map(Page::checksum))
    }

    /// Releases every heap buffer, then every page.
    /// Returns the number of pages released.
    pub fn destroy(&mut self) -> usize {
        let row_size = self.row_size();
        let mut released = 0;
        for page in &mut self.pages {
            for offset in Page::slot_offsets(row_size) {
                if page.slot_state(offset).is_occupied() {
                    released += free_row_values(
                        &self.layout,
                        page.slot_mut(offset, row_size),
                        &mut self.heap,
                    );
                }
            }
        }
        assert!(
            self.heap.is_empty(),
            "{} variable-length buffers not owned by any slot",
            self.heap.len()
        );

        let pages = self.pages.len();
        self.pages.clear();
        self.free_offset = 0;
        info!(table = %self.name, pages, buffers = released, "table destroyed");
        pages
    }

    fn check_image(&self, image: &RowImage) -> Result<()> {
        if image.len() != self.row_size() {
            return Err(StorageError::InvalidRowLength {
                expected: self.row_size(),
                actual: image.len(),
            });
        }
        if image.column_count() != self.columns.len() {
            return Err(StorageError::ValueCountMismatch {
                expected: self.columns.len(),
                actual: image.column_count(),
            });
        }
        Ok(())
    }

    /// Ring index of the page holding `slot`, after checking the offset
    /// lands on a slot boundary.
    pub(super) fn locate(&self, slot: SlotRef) -> Result<usize> {
        // Page ids increase along the ring.
        let index = self
            .pages
            .binary_search_by_key(&slot.page_id, |page| page.page_id)
            .map_err(|_| StorageError::PageNotFound {
                page_id: slot.page_id,
            })?;
        if !Page::is_slot_boundary(slot.offset, self.row_size()) {
            return Err(StorageError::InvalidSlot {
                page_id: slot.page_id,
                offset: slot.offset,
            });
        }
        Ok(index)
    }

    fn view_at<'a>(&'a self, page: &'a Page, offset: usize) -> RowView<'a> {
        let row_size = self.row_size();
        RowView::new(
            &self.columns,
            &self.layout,
            page.slot(offset, row_size),
            &self.heap,
            page.slot_state(offset),
        )
    }

    fn append_page(&mut self) -> Result<()> {
        let row_size = self.row_size();
        let page = allocate_page(
            &mut self.next_page_id,
            &self.config,
            self.pages.len(),
            row_size,
        )?;
        debug!(table = %self.name, page_id = page.page_id, "page appended to ring");
        self.pages.push(page);
        Ok(())
    }
}

fn release_handles(heap: &mut VarHeap, handles: Vec<(usize, VarHandle)>) {
    for (_, handle) in handles {
        drop(heap.release(handle));
    }
}

/// Allocates the next page of a ring currently holding `ring_len` pages.
pub(super) fn allocate_page(
    next_page_id: &mut PageId,
    config: &StoreConfig,
    ring_len: usize,
    row_size: usize,
) -> Result<Page> {
    if let Some(max) = config.max_pages {
        if ring_len >= max {
            warn!(max, "page budget exhausted");
            return Err(StorageError::PageBudgetExhausted { max });
        }
    }
    let page = Page::try_new(*next_page_id, row_size)?;
    *next_page_id += 1;
    Ok(page)
}

/// Guard over a locked table. Holding one is the only way to reach the row
/// mutation methods of a shared [`Table`].
pub type TableHandle<'a> = MutexGuard<'a, TableStore>;

/// A table shared between callers, guarded by one advisory lock.
#[derive(Debug)]
pub struct Table {
    inner: Mutex<TableStore>,
}

impl Table {
    pub fn new(name: &str) -> Result<Self> {
        Ok(Self::from_store(TableStore::new(name)?))
    }

    pub fn with_config(name: &str, config: StoreConfig) -> Result<Self> {
        Ok(Self::from_store(TableStore::with_config(name, config)?))
    }

    pub fn from_store(store: TableStore) -> Self {
        Self {
            inner: Mutex::new(store),
        }
    }

    pub fn lock(&self) -> TableHandle<'_> {
        self.inner.lock()
    }

    pub fn try_lock(&self) -> Option<TableHandle<'_>> {
        self.inner.try_lock()
    }

    /// Appends a column, holding the lock through the reorg.
    pub fn add_column(&self, column: Column) -> Result<()> {
        self.lock().add_column(column)
    }

    /// Drops a column, holding the lock through the reorg.
    pub fn remove_column(&self, name: &str) -> Result<Column> {
        self.lock().remove_column(name)
    }

    pub fn vacuum(&self) -> VacuumStats {
        self.lock().vacuum()
    }

    pub fn destroy(self) -> usize {
        self.inner.into_inner().destroy()
    }

    pub fn into_inner(self) -> TableStore {
        self.inner.into_inner()
    }
}
