//! Tests of the mutex-guarded process-wide entry points.
//!
//! All tests in this binary share one global heap, so assertions here stay
//! coarse (address-identity scenarios live in the engine tests, which own
//! their heaps).

use std::thread;

use tagheap::{MIN_ALIGN, alloc, calloc, free, realloc, verify};

#[test]
fn entry_points_round_trip() {
    assert!(alloc(0).is_null());

    let p = alloc(100);
    assert!(!p.is_null());
    assert_eq!(p.addr() % MIN_ALIGN, 0);
    unsafe {
        core::ptr::write_bytes(p, 0xA5, 100);
    }
    assert!(verify());

    // calloc must zero-fill.
    let z = calloc(16, 8);
    assert!(!z.is_null());
    let zeroes = unsafe { core::slice::from_raw_parts(z, 128) };
    assert!(zeroes.iter().all(|&b| b == 0));

    // calloc rejects overflowing products.
    assert!(calloc(usize::MAX, 16).is_null());

    // realloc moves the payload into the fresh block.
    let grown = realloc(p, 400);
    assert!(!grown.is_null());
    let copied = unsafe { core::slice::from_raw_parts(grown, 100) };
    assert!(copied.iter().all(|&b| b == 0xA5));

    // realloc(null, n) allocates; realloc(p, 0) frees and returns null.
    let fresh = realloc(core::ptr::null_mut(), 24);
    assert!(!fresh.is_null());
    assert!(realloc(fresh, 0).is_null());

    free(grown);
    free(z);
    free(core::ptr::null_mut());
    assert!(verify());
}

#[test]
fn entry_points_serialize_across_threads() {
    let handles: Vec<_> = (0..8)
        .map(|seed: usize| {
            thread::spawn(move || {
                for round in 0..200 {
                    let size = 1 + (seed * 37 + round * 13) % 256;
                    let ptr = alloc(size);
                    assert!(!ptr.is_null());
                    let tag = (seed as u8).wrapping_add(round as u8);
                    unsafe {
                        core::ptr::write_bytes(ptr, tag, size);
                    }
                    let bytes = unsafe { core::slice::from_raw_parts(ptr, size) };
                    assert!(bytes.iter().all(|&b| b == tag));
                    free(ptr);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert!(verify());
}
