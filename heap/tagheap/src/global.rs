//! # Global Heap & Entry Points
//!
//! Process-wide allocator state: one [`Heap`] over a statically reserved
//! backing span, guarded by a single [`SpinMutex`]. Every public operation
//! acquires the mutex, so calls are totally ordered by lock acquisition; no
//! suspension, callbacks, or I/O (other than the diagnostic write on fatal
//! error) happen inside the critical section.

use core::cmp;
use core::ptr::{self, null_mut};
use core::sync::atomic::{AtomicBool, Ordering};

use tagheap_sync::SpinMutex;

use crate::ARENA_SIZE;
use crate::block::header_of;
use crate::heap::Heap;
use crate::region::BumpSource;

/// Number of regions the static backing span can provide before the
/// allocator reports exhaustion.
const BACKING_REGIONS: usize = 1024;

/// Total size of the statically reserved backing span.
const BACKING_SIZE: usize = BACKING_REGIONS * ARENA_SIZE;

/// Backing storage with a minimum alignment suitable for block headers.
#[repr(align(16))]
struct HeapMem([u8; BACKING_SIZE]);

static mut BACKING: HeapMem = HeapMem([0; BACKING_SIZE]);

/// Global allocator state protected by the process-wide mutex.
static HEAP: SpinMutex<Heap<BumpSource>> = SpinMutex::new(Heap::new(BumpSource::empty()));

/// One-time heap initialization flag.
static DID_INIT: AtomicBool = AtomicBool::new(false);

/// Ensure the allocator is initialized (idempotent).
///
/// Attaches the static backing span to the growth source and acquires the
/// first region, exactly once.
fn ensure_init() {
    if !DID_INIT.load(Ordering::Acquire) {
        HEAP.with_lock(|heap| {
            if !heap.is_initialized() {
                let start = unsafe { (&raw mut BACKING.0).cast::<u8>() };
                unsafe {
                    heap.source_mut().attach(start, BACKING_SIZE);
                    heap.init();
                }
                DID_INIT.store(true, Ordering::Release);
            }
        });
    }
}

/// Allocate at least `size` bytes of 8-byte-aligned writable memory.
///
/// Returns null when `size` is zero or the backing span is exhausted.
#[must_use]
pub fn alloc(size: usize) -> *mut u8 {
    ensure_init();
    HEAP.with_lock(|heap| unsafe { heap.allocate(size) })
}

/// Release a pointer previously returned by [`alloc`], [`calloc`], or
/// [`realloc`]. Passing null is a no-op.
///
/// # Panics
/// A detected double free writes a diagnostic line and panics; freestanding
/// builds configure panics to abort, terminating the process.
pub fn free(ptr: *mut u8) {
    if ptr.is_null() {
        return;
    }
    ensure_init();
    let released = HEAP.with_lock(|heap| unsafe { heap.deallocate(ptr) });
    if let Err(err) = released {
        log::error!("{err}");
        panic!("{err}");
    }
}

/// Allocate and zero-fill `count * size` bytes.
///
/// Returns null when the product overflows, is zero, or cannot be served.
#[must_use]
pub fn calloc(count: usize, size: usize) -> *mut u8 {
    let Some(total) = count.checked_mul(size) else {
        return null_mut();
    };
    let ptr = alloc(total);
    if !ptr.is_null() {
        unsafe {
            ptr::write_bytes(ptr, 0, total);
        }
    }
    ptr
}

/// Move the allocation behind `ptr` into a fresh block of `new_size` bytes.
///
/// Always allocates anew, copies `min(old payload, new_size)` bytes, and
/// frees the original. A null `ptr` behaves like [`alloc`]; a zero
/// `new_size` frees `ptr` and returns null. When the fresh allocation cannot
/// be served, the original is left untouched and null is returned.
///
/// # Panics
/// As for [`free`] when the original pointer was already free.
#[must_use]
pub fn realloc(ptr: *mut u8, new_size: usize) -> *mut u8 {
    if ptr.is_null() {
        return alloc(new_size);
    }
    ensure_init();
    let moved = HEAP.with_lock(|heap| unsafe {
        if new_size == 0 {
            return heap.deallocate(ptr).map(|()| null_mut());
        }
        let fresh = heap.allocate(new_size);
        if fresh.is_null() {
            return Ok(null_mut());
        }
        // The exact request size is not recorded, so copy at most the old
        // block's payload capacity.
        let copied = cmp::min((*header_of(ptr)).payload_size(), new_size);
        ptr::copy_nonoverlapping(ptr, fresh, copied);
        heap.deallocate(ptr).map(|()| fresh)
    });
    match moved {
        Ok(fresh) => fresh,
        Err(err) => {
            log::error!("{err}");
            panic!("{err}");
        }
    }
}

/// Whether every structural invariant of the process heap currently holds.
#[must_use]
pub fn verify() -> bool {
    ensure_init();
    HEAP.with_lock(|heap| heap.verify())
}

/// Log a structural walk of the process heap (see [`crate::debug`]).
pub fn dump() {
    ensure_init();
    HEAP.with_lock(|heap| crate::debug::dump_heap(heap));
}
