//! Peer configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::registry::REGISTRY_SHM_NAME;

/// Tunables for one peer process.
///
/// The defaults are the protocol constants every peer is expected to run
/// with; tests override the registry name and document directory to stay
/// isolated.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Shared memory object the registry lives in.
    pub registry_name: String,
    /// Directory the `<user_id>_doc.txt` replica is kept in.
    pub doc_dir: PathBuf,
    /// Main loop polling cadence.
    pub poll_interval: Duration,
    /// Broadcast fires once this many operations are queued; exactly this
    /// many are sent and removed per broadcast.
    pub broadcast_batch: usize,
    /// Merge fires when at least this many local operations are queued
    /// (received operations trigger a merge on their own).
    pub merge_threshold: usize,
    /// Pause after a merge writeback, letting the file timestamp settle.
    pub settle_delay: Duration,
    /// Listener sleep after an empty receive.
    pub listener_idle_sleep: Duration,
    /// Listener sleep after a receive error.
    pub listener_error_sleep: Duration,
    /// Receive ring slot count (holds one less entry than this).
    pub ring_capacity: usize,
    /// Kernel queue depth for the peer's own receive queue.
    pub queue_depth: i64,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            registry_name: REGISTRY_SHM_NAME.to_string(),
            doc_dir: PathBuf::from("."),
            poll_interval: Duration::from_secs(2),
            broadcast_batch: 5,
            merge_threshold: 5,
            settle_delay: Duration::from_millis(200),
            listener_idle_sleep: Duration::from_millis(50),
            listener_error_sleep: Duration::from_millis(100),
            ring_capacity: 128,
            queue_depth: 10,
        }
    }
}

impl PeerConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.broadcast_batch == 0 {
            return Err("broadcast_batch must be > 0");
        }
        if self.merge_threshold == 0 {
            return Err("merge_threshold must be > 0");
        }
        if self.ring_capacity < 2 {
            return Err("ring_capacity must be at least 2");
        }
        if self.queue_depth <= 0 {
            return Err("queue_depth must be > 0");
        }
        if !self.registry_name.starts_with('/') {
            return Err("registry_name must start with '/'");
        }
        Ok(())
    }
}
