use serde::{Deserialize, Serialize};

use crate::{
    types::{PAGE_SIZE, PageId, error::Result},
    utils::hash::{calculate_page_checksum, verify_page_checksum},
};

const EMPTY_FLAG: usize = 0;
const DELETED_FLAG: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotState {
    /// Never written, or reclaimed by vacuum.
    Empty,
    Live,
    /// Deleted but still occupying its slot until vacuum.
    Tombstoned,
}

impl SlotState {
    pub fn is_occupied(&self) -> bool {
        !matches!(self, SlotState::Empty)
    }
}

/*
 * Page (datablock) layout
 * ┌──────────────┬──────────────┬─────┬──────────────┬──────────┐
 * │   slot 0     │   slot 1     │ ... │ slot n-1     │ unused   │
 * │  row_size    │  row_size    │     │  row_size    │ (zeroed) │
 * └──────────────┴──────────────┴─────┴──────────────┴──────────┘
 * n = PAGE_SIZE / row_size
 *
 * Slot layout
 * ┌───────┬─────────┬──────────────────┬──────────────────────────┐
 * │ empty │ deleted │ null bitmap (8)  │ payload (catalog order)  │
 * └───────┴─────────┴──────────────────┴──────────────────────────┘
 */

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub page_id: PageId,
    data: Box<[u8]>,
}

impl Page {
    /// Allocates a page whose slots at `row_size` stride are all EMPTY.
    pub fn try_new(page_id: PageId, row_size: usize) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(PAGE_SIZE)?;
        data.resize(PAGE_SIZE, 0);

        let mut page = Self {
            page_id,
            data: data.into_boxed_slice(),
        };
        page.init_empty_slots(0, row_size);
        Ok(page)
    }

    pub fn slot_capacity(row_size: usize) -> usize {
        PAGE_SIZE / row_size
    }

    /// True when a whole slot of `row_size` bytes starts at `offset`.
    pub fn is_slot_boundary(offset: usize, row_size: usize) -> bool {
        offset % row_size == 0 && offset + row_size <= PAGE_SIZE
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn slot(&self, offset: usize, row_size: usize) -> &[u8] {
        &self.data[offset..offset + row_size]
    }

    pub(crate) fn slot_mut(&mut self, offset: usize, row_size: usize) -> &mut [u8] {
        &mut self.data[offset..offset + row_size]
    }

    pub fn slot_state(&self, offset: usize) -> SlotState {
        if self.data[offset + EMPTY_FLAG] != 0 {
            SlotState::Empty
        } else if self.data[offset + DELETED_FLAG] != 0 {
            SlotState::Tombstoned
        } else {
            SlotState::Live
        }
    }

    pub(crate) fn mark_live(&mut self, offset: usize) {
        self.data[offset + EMPTY_FLAG] = 0;
        self.data[offset + DELETED_FLAG] = 0;
    }

    pub(crate) fn mark_deleted(&mut self, offset: usize) {
        self.data[offset + DELETED_FLAG] = 1;
    }

    /// Zeroes one slot and flags it EMPTY. Does not touch heap buffers.
    pub(crate) fn clear_slot(&mut self, offset: usize, row_size: usize) {
        self.data[offset..offset + row_size].fill(0);
        self.data[offset + EMPTY_FLAG] = 1;
    }

    /// Re-initializes `from..PAGE_SIZE` as EMPTY slots at `row_size` stride.
    /// `from` must be a multiple of `row_size`.
    pub(crate) fn init_empty_slots(&mut self, from: usize, row_size: usize) {
        debug_assert_eq!(from % row_size, 0);
        self.data[from..].fill(0);
        let mut offset = from;
        while offset + row_size <= PAGE_SIZE {
            self.data[offset + EMPTY_FLAG] = 1;
            offset += row_size;
        }
    }

    /// Offsets of every whole slot in the page.
    pub fn slot_offsets(row_size: usize) -> impl Iterator<Item = usize> {
        (0..Self::slot_capacity(row_size)).map(move |i| i * row_size)
    }

    /// Offset of the first EMPTY slot, or the end of the last whole slot.
    pub fn frontier(&self, row_size: usize) -> usize {
        Self::slot_offsets(row_size)
            .find(|&offset| self.slot_state(offset) == SlotState::Empty)
            .unwrap_or(Self::slot_capacity(row_size) * row_size)
    }

    pub fn checksum(&self) -> u32 {
        calculate_page_checksum(self.page_id, &self.data)
    }

    pub fn verify_checksum(&self, expected: u32) -> bool {
        verify_page_checksum(self.page_id, &self.data, expected)
    }
}
