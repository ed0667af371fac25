//! Process-lifetime transport counters.
//!
//! Shared between the listener thread and the editor loop; counters are
//! relaxed atomics, the last-sender/target labels sit behind a mutex.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Stats {
    received: AtomicU64,
    sent: AtomicU64,
    last_sender: Mutex<Option<String>>,
    last_target: Mutex<Option<String>>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self, sender: &str) {
        self.received.fetch_add(1, Ordering::Relaxed);
        *self.last_sender.lock().unwrap() = Some(sender.to_string());
    }

    pub fn record_sent(&self, target: &str) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        *self.last_target.lock().unwrap() = Some(target.to_string());
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn last_sender(&self) -> Option<String> {
        self.last_sender.lock().unwrap().clone()
    }

    pub fn last_target(&self) -> Option<String> {
        self.last_target.lock().unwrap().clone()
    }
}
