use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    storage::{codec::free_row_values, table::TableStore},
    types::{
        PAGE_SIZE,
        page::{Page, SlotState},
    },
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VacuumStats {
    pub rows_moved: usize,
    pub tombstones_reclaimed: usize,
    pub buffers_released: usize,
    pub pages_freed: usize,
}

/// Position in the ring: page index and byte offset inside that page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cursor {
    page: usize,
    offset: usize,
}

impl TableStore {
    /// Slides LIVE rows towards the ring head over EMPTY and
    /// tombstoned slots, then releases the pages left behind.
    pub fn vacuum(&mut self) -> VacuumStats {
        let mut stats = VacuumStats::default();
        if self.pages.is_empty() {
            return stats;
        }

        let row_size = self.row_size();
        let mut dst = Cursor { page: 0, offset: 0 };

        for src_page in 0..self.pages.len() {
            for src_offset in Page::slot_offsets(row_size) {
                if self.pages[src_page].slot_state(src_offset) != SlotState::Live {
                    continue;
                }
                if dst.offset + row_size > PAGE_SIZE {
                    dst = Cursor {
                        page: dst.page + 1,
                        offset: 0,
                    };
                }

                let src = Cursor {
                    page: src_page,
                    offset: src_offset,
                };
                if dst != src {
                    let target = &mut self.pages[dst.page];
                    let state = target.slot_state(dst.offset);
                    debug_assert_ne!(state, SlotState::Live);
                    if state == SlotState::Tombstoned {
                        stats.buffers_released += free_row_values(
                            &self.layout,
                            target.slot_mut(dst.offset, row_size),
                            &mut self.heap,
                        );
                        stats.tombstones_reclaimed += 1;
                    }
                    move_slot(&mut self.pages, src, dst, row_size);
                    stats.rows_moved += 1;
                }
                dst.offset += row_size;
            }
        }

        self.free_offset = dst.offset;

        // Tail of the final destination page.
        let tail = &mut self.pages[dst.page];
        let mut offset = dst.offset;
        while offset + row_size <= PAGE_SIZE {
            if tail.slot_state(offset) == SlotState::Tombstoned {
                stats.buffers_released +=
                    free_row_values(&self.layout, tail.slot_mut(offset, row_size), &mut self.heap);
                stats.tombstones_reclaimed += 1;
            }
            offset += row_size;
        }
        tail.init_empty_slots(dst.offset, row_size);

        for mut page in self.pages.drain(dst.page + 1..) {
            for offset in Page::slot_offsets(row_size) {
                if page.slot_state(offset) == SlotState::Tombstoned {
                    stats.buffers_released += free_row_values(
                        &self.layout,
                        page.slot_mut(offset, row_size),
                        &mut self.heap,
                    );
                    stats.tombstones_reclaimed += 1;
                }
            }
            debug!(table = %self.name, page_id = page.page_id, "page released by vacuum");
            stats.pages_freed += 1;
        }

        info!(
            table = %self.name,
            rows_moved = stats.rows_moved,
            tombstones = stats.tombstones_reclaimed,
            pages_freed = stats.pages_freed,
            free_offset = self.free_offset,
            "vacuum finished"
        );
        stats
    }
}

/// Byte-copies the row at `src` over `dst` and resets `src` to EMPTY. The
/// VARCHAR handles travel with the bytes, so no buffer changes owner count.
fn move_slot(pages: &mut [Page], src: Cursor, dst: Cursor, row_size: usize) {
    if src.page == dst.page {
        let page = &mut pages[src.page];
        page.data_mut()
            .copy_within(src.offset..src.offset + row_size, dst.offset);
        page.clear_slot(src.offset, row_size);
        return;
    }

    debug_assert!(dst.page < src.page);
    let (head, rest) = pages.split_at_mut(src.page);
    let source = &mut rest[0];
    head[dst.page]
        .slot_mut(dst.offset, row_size)
        .copy_from_slice(source.slot(src.offset, row_size));
    source.clear_slot(src.offset, row_size);
}
