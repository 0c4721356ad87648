//! # Allocator synchronization primitives

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod spin_mutex;

pub use spin_mutex::{SpinMutex, SpinMutexGuard};
