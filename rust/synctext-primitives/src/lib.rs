#![doc = include_str!("../README.md")]

pub mod spsc;
pub mod sync;

pub use spsc::{PushResult, SpscConsumer, SpscProducer, SpscRing, spsc_channel};

// OS-level shared memory (unix only)
#[cfg(unix)]
pub mod shm;

#[cfg(unix)]
pub use shm::ShmRegion;
