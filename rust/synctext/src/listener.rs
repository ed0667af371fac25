//! The receive worker: drains the peer's own message queue into the ring.
//!
//! One dedicated thread, owned by the peer and joined on shutdown. Every
//! iteration does one non-blocking receive; an empty queue earns a short
//! sleep so the thread never spins. A full ring drops the record (the
//! transport's documented relaxation) and the loop keeps going.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use synctext_primitives::SpscProducer;

use crate::queue::{MessageQueue, RecvError};
use crate::stats::Stats;
use crate::wire::{OpRecord, WIRE_SIZE};

/// Handle to the running listener thread.
pub struct Listener {
    handle: JoinHandle<()>,
}

impl Listener {
    /// Start the worker. It exits within one sleep period of `shutdown`
    /// being raised.
    pub fn spawn(
        queue: MessageQueue,
        producer: SpscProducer<OpRecord>,
        shutdown: Arc<AtomicBool>,
        stats: Arc<Stats>,
        idle_sleep: Duration,
        error_sleep: Duration,
    ) -> Self {
        let handle = thread::Builder::new()
            .name("synctext-listener".to_string())
            .spawn(move || listen_loop(queue, producer, shutdown, stats, idle_sleep, error_sleep))
            .expect("failed to spawn listener thread");
        Self { handle }
    }

    /// Wait for the worker to exit. Call after raising the shutdown flag.
    pub fn join(self) {
        let _ = self.handle.join();
    }
}

fn listen_loop(
    queue: MessageQueue,
    mut producer: SpscProducer<OpRecord>,
    shutdown: Arc<AtomicBool>,
    stats: Arc<Stats>,
    idle_sleep: Duration,
    error_sleep: Duration,
) {
    // Size the buffer from the live queue attributes; a record-sized buffer
    // is the floor either way.
    let buf_size = queue
        .attrs()
        .map(|a| a.msg_size)
        .unwrap_or(WIRE_SIZE)
        .max(WIRE_SIZE);
    let mut buf = vec![0u8; buf_size];

    tracing::debug!(queue = queue.name(), "listener started");

    while !shutdown.load(Ordering::SeqCst) {
        match queue.recv(&mut buf) {
            Ok(n) => {
                let rec = OpRecord::from_bytes(&buf[..n]);
                let sender = String::from_utf8_lossy(rec.sender_bytes()).into_owned();
                stats.record_received(&sender);
                if producer.try_push(rec).is_would_block() {
                    tracing::warn!(%sender, "receive ring full; dropping operation");
                }
            }
            Err(RecvError::Empty) => thread::sleep(idle_sleep),
            Err(RecvError::Other(e)) => {
                tracing::warn!(error = %e, "queue receive failed");
                thread::sleep(error_sleep);
            }
        }
    }

    tracing::debug!(queue = queue.name(), "listener exiting");
}

// ── tests ─────────────────────────────────────────────────────────────────────
