//! # Heap Introspection
//!
//! Logging helpers for inspecting allocator state: a block-by-block walk of
//! every registered region and a summary of free-list occupancy. Output goes
//! through the `log` facade; in debug builds the consumer should keep its
//! sink unbuffered so a dump taken right before a crash is not lost.

use log::info;

use crate::NUM_LISTS;
use crate::block::{BlockState, right_neighbor};
use crate::heap::Heap;

/// Log every registered region's blocks and the per-class free-list counts.
///
/// Must run under the same lock as the entry points; the walk is read-only.
pub fn dump_heap<S>(heap: &Heap<S>) {
    info!(
        "heap base {:#x}, {} region(s) registered",
        heap.base.addr(),
        heap.region_count()
    );

    for (index, region) in heap.chunks.iter().enumerate() {
        info!("region {index} at {:#x}:", region.addr());
        unsafe {
            let mut block = right_neighbor(region);
            while (*block).state() != BlockState::Fencepost {
                info!(
                    "  {:#x}: {:?}, {} bytes, left neighbor {} bytes",
                    block.addr(),
                    (*block).state(),
                    (*block).size(),
                    (*block).left_size(),
                );
                block = right_neighbor(block);
            }
        }
    }

    for class in 0..NUM_LISTS {
        let head = heap.lists.sentinel_const(class);
        let mut count = 0_usize;
        unsafe {
            let mut node = (*head).next.cast_const();
            while node != head {
                count += 1;
                node = (*node).next;
            }
        }
        if count > 0 {
            info!("class {class}: {count} free block(s)");
        }
    }
}
