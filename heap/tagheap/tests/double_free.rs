//! The fatal double-free path of the public entry points.
//!
//! Kept in its own binary: the detection races against reuse if another
//! test of the same process allocates the block back between the two frees.

use tagheap::{alloc, free};

#[test]
#[should_panic(expected = "double free")]
fn double_free_terminates() {
    let p = alloc(16);
    assert!(!p.is_null());
    free(p);
    free(p);
}
