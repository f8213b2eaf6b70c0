use tracing::{debug, info};

use crate::{
    storage::{
        codec::{RowLayout, read_null_bitmap, write_null_bitmap},
        heap::{VarHandle, VarHeap},
        table::{TableStore, allocate_page},
    },
    types::{
        MAX_COLUMNS, PAGE_SIZE,
        column::Column,
        error::{Result, StorageError},
        page::{Page, SlotState},
        value::Value,
    },
};

/// What pre-existing rows hold for a freshly appended column.
enum NewColumnFill {
    /// Storage left zeroed, null bit clear.
    Zero,
    Null,
    Fixed(Vec<u8>),
    Varchar(Vec<u8>),
}

impl NewColumnFill {
    fn for_column(column: &Column, null_new_columns: bool) -> Result<Self> {
        Ok(match &column.default_value {
            Some(Value::Null) => NewColumnFill::Null,
            Some(Value::Varchar(text)) if column.is_variable() => {
                NewColumnFill::Varchar(text.as_bytes().to_vec())
            }
            Some(value) => {
                let mut bytes = vec![0u8; column.storage_width()];
                value.encode_fixed(column, &mut bytes)?;
                NewColumnFill::Fixed(bytes)
            }
            None if column.nullable && null_new_columns => NewColumnFill::Null,
            None => NewColumnFill::Zero,
        })
    }
}

/// A rebuilt page ring that has not replaced the table's ring yet.
struct FreshRing {
    pages: Vec<Page>,
    free_offset: usize,
    /// Buffers allocated for the new column, released on abort.
    handles: Vec<VarHandle>,
}

impl FreshRing {
    fn abort(self, heap: &mut VarHeap) {
        for handle in self.handles {
            drop(heap.release(handle));
        }
    }
}

impl TableStore {
    /// Appends `column` to the catalog and widens every existing row.
    pub fn add_column(&mut self, column: Column) -> Result<()> {
        column.validate()?;
        if self.columns.len() >= MAX_COLUMNS {
            return Err(StorageError::TooManyColumns {
                table: self.name.clone(),
                max: MAX_COLUMNS,
            });
        }
        if self.column(&column.name).is_some() {
            return Err(StorageError::DuplicateColumn {
                name: column.name,
                table: self.name.clone(),
            });
        }

        let mut columns = self.columns.clone();
        columns.push(column);
        let new_layout = RowLayout::new(&columns);

        if !self.pages.is_empty() {
            let added = &columns[columns.len() - 1];
            let fill = NewColumnFill::for_column(added, self.config.null_new_columns)?;
            let mut fresh = FreshRing {
                pages: Vec::new(),
                free_offset: 0,
                handles: Vec::new(),
            };
            if let Err(err) = self.rebuild_ring(&new_layout, &fill, &mut fresh) {
                fresh.abort(&mut self.heap);
                return Err(err);
            }

            // Handles were copied with the row bytes, so the old pages are
            // dropped without releasing any buffer.
            let old_pages = std::mem::replace(&mut self.pages, fresh.pages);
            self.free_offset = fresh.free_offset;
            info!(
                table = %self.name,
                old_pages = old_pages.len(),
                new_pages = self.pages.len(),
                row_size = new_layout.row_size(),
                "ring rebuilt for added column"
            );
        }

        let added = &columns[columns.len() - 1];
        debug!(table = %self.name, column = %added.name, column_type = %added.column_type, "column added");
        self.columns = columns;
        self.layout = new_layout;
        Ok(())
    }

    /// Copies every row before each page's EMPTY frontier into `fresh`,
    /// widened to `new_layout`.
    fn rebuild_ring(
        &mut self,
        new_layout: &RowLayout,
        fill: &NewColumnFill,
        fresh: &mut FreshRing,
    ) -> Result<()> {
        let old_size = self.layout.row_size();
        let new_size = new_layout.row_size();
        let added_index = new_layout.column_count() - 1;
        let added = *new_layout.field(added_index);
        for page in &self.pages {
            for old_offset in Page::slot_offsets(old_size) {
                if page.slot_state(old_offset) == SlotState::Empty {
                    break;
                }
                if fresh.pages.is_empty() || fresh.free_offset + new_size > PAGE_SIZE {
                    let new_page = allocate_page(
                        &mut self.next_page_id,
                        &self.config,
                        fresh.pages.len(),
                        new_size,
                    )?;
                    fresh.pages.push(new_page);
                    fresh.free_offset = 0;
                }

                let offset = fresh.free_offset;
                let tail = fresh.pages.len() - 1;
                let slot = fresh.pages[tail].slot_mut(offset, new_size);
                slot[..old_size].copy_from_slice(page.slot(old_offset, old_size));

                match fill {
                    NewColumnFill::Zero => {}
                    NewColumnFill::Null => {
                        let mut nulls = read_null_bitmap(slot);
                        nulls.set(added_index, true);
                        write_null_bitmap(slot, &nulls);
                    }
                    NewColumnFill::Fixed(bytes) => {
                        slot[added.range()].copy_from_slice(bytes);
                    }
                    NewColumnFill::Varchar(source) => {
                        let handle = self.heap.allocate(added.precision, source)?;
                        fresh.handles.push(handle);
                        slot[added.range()].copy_from_slice(&handle.to_bytes());
                    }
                }
                fresh.free_offset += new_size;
            }
        }
        // A ring without rows keeps one EMPTY head page.
        if fresh.pages.is_empty() {
            let new_page = allocate_page(&mut self.next_page_id, &self.config, 0, new_size)?;
            fresh.pages.push(new_page);
            fresh.free_offset = 0;
        }
        Ok(())
    }

    /// Drops the named column from the catalog. Rows are repacked inside
    /// their own page only.
    pub fn remove_column(&mut self, name: &str) -> Result<Column> {
        let index = self
            .column_index(name)
            .ok_or_else(|| StorageError::ColumnNotFound {
                name: name.to_string(),
                table: self.name.clone(),
            })?;

        let old_layout = self.layout.clone();
        let removed = self.columns.remove(index);
        self.layout = RowLayout::new(&self.columns);

        if !self.pages.is_empty() {
            let released = self.repack_without(&old_layout, index);
            info!(
                table = %self.name,
                column = %removed.name,
                buffers_released = released,
                row_size = self.layout.row_size(),
                "pages repacked for removed column"
            );
        }

        debug!(table = %self.name, column = %removed.name, "column removed");
        Ok(removed)
    }

    fn repack_without(&mut self, old_layout: &RowLayout, index: usize) -> usize {
        let old_size = old_layout.row_size();
        let new_size = self.layout.row_size();
        let removed = *old_layout.field(index);
        let gap = removed.range();

        let mut released = 0;
        let mut packed_end = 0;
        let mut row = Vec::with_capacity(new_size);

        for page in &mut self.pages {
            let mut write = 0;
            for read in Page::slot_offsets(old_size) {
                if page.slot_state(read) == SlotState::Empty {
                    break;
                }
                let slot = page.slot_mut(read, old_size);
                if removed.variable {
                    if let Some(handle) = VarHandle::take_from_slot(&mut slot[gap.clone()]) {
                        drop(self.heap.release(handle));
                        released += 1;
                    }
                }

                let mut nulls = read_null_bitmap(slot);
                nulls[index..].shift_start(1);
                write_null_bitmap(slot, &nulls);

                row.clear();
                row.extend_from_slice(&slot[..gap.start]);
                row.extend_from_slice(&slot[gap.end..]);
                debug_assert_eq!(row.len(), new_size);

                page.data_mut()[write..write + new_size].copy_from_slice(&row);
                write += new_size;
            }
            page.init_empty_slots(write, new_size);
            packed_end = write;
        }

        self.free_offset = packed_end;
        released
    }
}
