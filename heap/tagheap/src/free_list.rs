//! # Segregated Free-List Index
//!
//! Free blocks are indexed by size class in an array of [`NUM_LISTS`]
//! circular doubly-linked lists, each headed by a sentinel. Class `i` holds
//! blocks whose user-payload size is exactly `(i + 1) * 8` bytes; the final
//! class is a catch-all for every payload of `NUM_LISTS * 8` bytes or more.
//!
//! Insertion is LIFO (directly after the sentinel), so a block freed last is
//! found first. Removal uses the block's own links and needs no list lookup.
//!
//! ## Invariants
//! - Following `next` from a sentinel returns to the sentinel in finitely
//!   many steps, and matches the reverse traversal via `prev`.
//! - Every UNALLOCATED block is linked into exactly the class computed from
//!   its size; fenceposts are never linked.

use crate::NUM_LISTS;
use crate::block::{ALLOC_HEADER_SIZE, BlockHeader};

/// The array of sentinel-headed circular lists.
///
/// Sentinels are plain [`BlockHeader`]s whose size fields are unused. Their
/// `next`/`prev` links point at themselves once [`init`](Self::init) has
/// run, which makes insertion and removal branch-free.
///
/// # Invariants
/// - After `init`, the containing allocator must not move in memory: the
///   sentinel links are self-referential.
pub(crate) struct FreeLists {
    heads: [BlockHeader; NUM_LISTS],
}

impl FreeLists {
    /// Detached lists; [`init`](Self::init) must run before use.
    pub(crate) const fn new() -> Self {
        Self {
            heads: [const { BlockHeader::sentinel() }; NUM_LISTS],
        }
    }

    /// Point every sentinel at itself.
    ///
    /// # Safety
    /// Must be called before any insert/remove, and the containing allocator
    /// must be at its final address (the links are self-referential).
    pub(crate) unsafe fn init(&mut self) {
        for head in &mut self.heads {
            let head = core::ptr::from_mut(head);
            unsafe {
                (*head).next = head;
                (*head).prev = head;
            }
        }
    }

    /// The size class for a free block of total size `size` (header
    /// included).
    ///
    /// The class is derived from the user-payload size `size -
    /// ALLOC_HEADER_SIZE`; anything at or beyond `NUM_LISTS * 8` bytes of
    /// payload lands in the final catch-all class.
    #[must_use]
    pub(crate) const fn class_of(size: usize) -> usize {
        let payload_words = (size - ALLOC_HEADER_SIZE) / 8;
        let class = payload_words - 1;
        if class < NUM_LISTS - 1 {
            class
        } else {
            NUM_LISTS - 1
        }
    }

    /// The sentinel of `class`.
    pub(crate) const fn sentinel(&mut self, class: usize) -> *mut BlockHeader {
        &raw mut self.heads[class]
    }

    /// Read-only sentinel access for the verifier.
    pub(crate) const fn sentinel_const(&self, class: usize) -> *const BlockHeader {
        &raw const self.heads[class]
    }

    /// Whether `class` currently holds no blocks.
    #[must_use]
    pub(crate) fn is_empty(&self, class: usize) -> bool {
        core::ptr::eq(self.heads[class].next, &raw const self.heads[class])
    }

    /// Link `block` at the head of the class computed from its size.
    ///
    /// # Safety
    /// `block` must point to a live UNALLOCATED block that is not currently
    /// linked into any list, and `init` must have run.
    pub(crate) unsafe fn insert(&mut self, block: *mut BlockHeader) {
        let class = unsafe { Self::class_of((*block).size()) };
        let head = self.sentinel(class);
        unsafe {
            let first = (*head).next;
            (*block).next = first;
            (*block).prev = head;
            (*first).prev = block;
            (*head).next = block;
        }
    }

    /// Unlink `block` using its own links.
    ///
    /// # Safety
    /// `block` must currently be linked into one of the lists.
    pub(crate) unsafe fn remove(block: *mut BlockHeader) {
        unsafe {
            let next = (*block).next;
            let prev = (*block).prev;
            (*prev).next = next;
            (*next).prev = prev;
        }
    }

    /// Move `block` into the class computed from its (changed) size.
    ///
    /// # Safety
    /// As for [`remove`](Self::remove) and [`insert`](Self::insert).
    pub(crate) unsafe fn reclassify(&mut self, block: *mut BlockHeader) {
        unsafe {
            Self::remove(block);
            self.insert(block);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::block::{BlockState, UNALLOC_HEADER_SIZE};

    #[test]
    fn class_of_exact_and_catch_all() {
        // Smallest real free block: 32 bytes total, 16 bytes of payload.
        assert_eq!(FreeLists::class_of(UNALLOC_HEADER_SIZE), 1);
        assert_eq!(FreeLists::class_of(24), 0);
        assert_eq!(FreeLists::class_of(40), 2);

        // Last exact class holds payloads of (NUM_LISTS - 1) * 8 bytes.
        let last_exact = ALLOC_HEADER_SIZE + (NUM_LISTS - 1) * 8;
        assert_eq!(FreeLists::class_of(last_exact), NUM_LISTS - 2);

        // Everything at or past NUM_LISTS * 8 bytes of payload is catch-all.
        let first_catch_all = ALLOC_HEADER_SIZE + NUM_LISTS * 8;
        assert_eq!(FreeLists::class_of(first_catch_all), NUM_LISTS - 1);
        assert_eq!(FreeLists::class_of(4064), NUM_LISTS - 1);
    }

    #[test]
    fn insert_is_lifo_and_remove_relinks() {
        let mut lists = Box::new(FreeLists::new());
        unsafe {
            lists.init();
        }

        // Two detached blocks of the same class.
        let a = Box::leak(Box::new(BlockHeader::new(40, BlockState::Unallocated, 0)));
        let b = Box::leak(Box::new(BlockHeader::new(40, BlockState::Unallocated, 0)));
        let a = core::ptr::from_mut(a);
        let b = core::ptr::from_mut(b);

        unsafe {
            lists.insert(a);
            lists.insert(b);

            let head = lists.sentinel(2);
            // LIFO: b was inserted last and sits directly after the sentinel.
            assert_eq!((*head).next, b);
            assert_eq!((*b).next, a);
            assert_eq!((*a).next, head);
            assert_eq!((*head).prev, a);

            FreeLists::remove(b);
            assert_eq!((*head).next, a);
            assert_eq!((*a).prev, head);

            FreeLists::remove(a);
            assert!(lists.is_empty(2));
        }
    }

    #[test]
    fn reclassify_follows_size_change() {
        let mut lists = Box::new(FreeLists::new());
        unsafe {
            lists.init();
        }

        let block = Box::leak(Box::new(BlockHeader::new(40, BlockState::Unallocated, 0)));
        let block = core::ptr::from_mut(block);

        unsafe {
            lists.insert(block);
            assert!(!lists.is_empty(2));

            (*block).set_size(64);
            lists.reclassify(block);
            assert!(lists.is_empty(2));
            assert!(!lists.is_empty(FreeLists::class_of(64)));
        }
    }
}
