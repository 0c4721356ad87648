//! # Structural Verifier
//!
//! Answers one question: "is every structural invariant currently true?"
//! Three checks run over the whole heap:
//!
//! 1. **Cycle detection**: tortoise-and-hare from every free-list sentinel.
//! 2. **Pointer consistency**: `n.next.prev == n` and `n.prev.next == n`
//!    for every node of every list, sentinel included.
//! 3. **Boundary tags**: every registered region starts with a fencepost,
//!    and walking right, each block's size matches its right neighbor's
//!    `left_size` until the closing fencepost.
//!
//! The checks are read-only and must run outside of any mutation, i.e. under
//! the same lock as the entry points.

use crate::NUM_LISTS;
use crate::block::{BlockHeader, BlockState, right_neighbor};
use crate::heap::Heap;

/// A structural invariant found violated.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// A free list does not cycle back to its sentinel.
    #[error("free list class {class} contains a cycle")]
    Cycle {
        /// Index of the offending class.
        class: usize,
    },
    /// A node's neighbors do not point back at it.
    #[error("free list class {class} has inconsistent links at node {addr:#x}")]
    BadLink {
        /// Index of the offending class.
        class: usize,
        /// Address of the node with broken links.
        addr: usize,
    },
    /// A registered region does not begin with a fencepost.
    #[error("region at {region:#x} does not start with a fencepost")]
    MissingFencepost {
        /// Address of the registered region start.
        region: usize,
    },
    /// Adjacent blocks disagree about the left one's size.
    #[error("boundary tag mismatch at {addr:#x}: left neighbor spans {size} bytes but left_size records {left_size}")]
    BoundaryTag {
        /// Address of the block carrying the stale `left_size`.
        addr: usize,
        /// Actual size of its left neighbor.
        size: usize,
        /// The recorded `left_size`.
        left_size: usize,
    },
}

impl<S> Heap<S> {
    /// Whether every structural invariant currently holds.
    ///
    /// Logs the first violation via `log::error!` and returns `false`.
    #[must_use]
    pub fn verify(&self) -> bool {
        match self.check() {
            Ok(()) => true,
            Err(err) => {
                log::error!("heap verification failed: {err}");
                false
            }
        }
    }

    /// Run all structural checks, reporting the first violation.
    ///
    /// # Errors
    /// The first [`VerifyError`] encountered, if any.
    pub fn check(&self) -> Result<(), VerifyError> {
        for class in 0..NUM_LISTS {
            self.check_cycle(class)?;
            self.check_links(class)?;
        }
        self.check_boundary_tags()
    }

    /// Tortoise-and-hare over the `next` links of `class`.
    fn check_cycle(&self, class: usize) -> Result<(), VerifyError> {
        let head = self.lists.sentinel_const(class).cast_mut();
        unsafe {
            let mut slow = (*head).next;
            let mut fast = (*head).next;
            loop {
                if fast == head {
                    return Ok(());
                }
                fast = (*fast).next;
                if fast == head {
                    return Ok(());
                }
                fast = (*fast).next;
                slow = (*slow).next;
                if slow == fast {
                    return Err(VerifyError::Cycle { class });
                }
            }
        }
    }

    /// Back/forward pointer consistency for every node of `class`.
    ///
    /// Assumes [`check_cycle`](Self::check_cycle) passed, so the forward
    /// traversal terminates.
    fn check_links(&self, class: usize) -> Result<(), VerifyError> {
        let head = self.lists.sentinel_const(class).cast_mut();
        unsafe {
            let mut node: *mut BlockHeader = head;
            loop {
                let next = (*node).next;
                let prev = (*node).prev;
                if (*next).prev != node || (*prev).next != node {
                    return Err(VerifyError::BadLink {
                        class,
                        addr: node.addr(),
                    });
                }
                node = next;
                if node == head {
                    return Ok(());
                }
            }
        }
    }

    /// Walk every registered region left to right, matching each block's
    /// size against its right neighbor's `left_size`.
    fn check_boundary_tags(&self) -> Result<(), VerifyError> {
        for region in self.chunks.iter() {
            unsafe {
                if (*region).state() != BlockState::Fencepost {
                    return Err(VerifyError::MissingFencepost {
                        region: region.addr(),
                    });
                }
                let mut block = region;
                loop {
                    let right = right_neighbor(block);
                    if (*right).left_size() != (*block).size() {
                        return Err(VerifyError::BoundaryTag {
                            addr: right.addr(),
                            size: (*block).size(),
                            left_size: (*right).left_size(),
                        });
                    }
                    if (*right).state() == BlockState::Fencepost {
                        break;
                    }
                    block = right;
                }
            }
        }
        Ok(())
    }
}
