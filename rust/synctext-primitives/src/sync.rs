//! Atomics for the SPSC ring, swappable for [loom] under `cfg(loom)`.
//!
//! [loom]: https://docs.rs/loom

#[cfg(not(loom))]
pub use core::sync::atomic::{AtomicUsize, Ordering};
#[cfg(loom)]
pub use loom::sync::atomic::{AtomicUsize, Ordering};
