//! The peer: one process's editor loop and everything it owns.
//!
//! All process state lives in this value: registry mapping, receive ring,
//! listener handle, document bookkeeping, operation buffers. The signal
//! handler owns nothing but the shared shutdown flag.
//!
//! Each loop iteration, in order: refresh the peer roster, drain received
//! operations, consume the post-merge guard, detect and synthesize local
//! changes, merge if triggered, re-drain and merge once more for late
//! arrivals, broadcast if the batch threshold is met.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::SystemTime;

use synctext_primitives::{SpscConsumer, spsc_channel};

use crate::clock::monotonic_ns;
use crate::config::PeerConfig;
use crate::diff::{self, LineEdit};
use crate::document::{self, Line};
use crate::listener::Listener;
use crate::merge;
use crate::queue::{self, MessageQueue, QueueError, SendQueue};
use crate::registry::{PeerInfo, RegistryError, SharedRegistry};
use crate::render::{DisplaySink, DocView};
use crate::stats::Stats;
use crate::userid::UserId;
use crate::wire::{Op, OpRecord, WIRE_SIZE};

/// Errors that end the process before the loop starts.
#[derive(Debug)]
pub enum StartupError {
    /// Configuration failed validation.
    Config(&'static str),
    /// Registry segment could not be opened, or had no free slot.
    Registry(RegistryError),
    /// The peer's own receive queue could not be created.
    Queue(QueueError),
    /// The document could not be created, stat'd, or read.
    Document(io::Error),
}

impl StartupError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            StartupError::Config(_) => 1,
            StartupError::Registry(RegistryError::Open(_)) => 2,
            StartupError::Registry(RegistryError::Full) => 3,
            StartupError::Queue(_) => 2,
            StartupError::Document(_) => 4,
        }
    }
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupError::Config(msg) => write!(f, "invalid configuration: {msg}"),
            StartupError::Registry(e) => write!(f, "{e}"),
            StartupError::Queue(e) => write!(f, "{e}"),
            StartupError::Document(e) => write!(f, "cannot access document: {e}"),
        }
    }
}

impl std::error::Error for StartupError {}

/// One peer process's context.
pub struct Peer {
    config: PeerConfig,
    user_id: UserId,
    registry: SharedRegistry,
    rx: SpscConsumer<OpRecord>,
    listener: Option<Listener>,
    shutdown: Arc<AtomicBool>,
    stats: Arc<Stats>,
    display: Box<dyn DisplaySink>,

    doc_path: PathBuf,
    doc_name: String,

    /// Last known file content.
    prev_lines: Vec<Line>,
    /// Line state the queued local operations were derived from.
    merge_baseline: Vec<Line>,
    last_mtime: SystemTime,

    /// Wire-form operations awaiting broadcast.
    local_ops: Vec<OpRecord>,
    /// Merge-form operations awaiting merge.
    local_unmerged: Vec<Op>,
    recv_unmerged: Vec<Op>,

    /// Set by the merge writeback; consumed once per iteration.
    just_merged: bool,

    /// Roster snapshot from the previous iteration, for change detection.
    roster: Vec<PeerInfo>,
    torn_down: bool,
}

impl Peer {
    /// Provision everything the loop needs: registry slot, receive queue,
    /// listener thread, seeded document.
    pub fn bootstrap(
        user_id: UserId,
        config: PeerConfig,
        shutdown: Arc<AtomicBool>,
        display: Box<dyn DisplaySink>,
    ) -> Result<Self, StartupError> {
        config.validate().map_err(StartupError::Config)?;

        let registry =
            SharedRegistry::open(&config.registry_name).map_err(StartupError::Registry)?;

        // The queue exists before the slot does, so a roster entry always
        // advertises an openable queue (modulo crashes).
        let queue_name = user_id.queue_name();
        let queue = MessageQueue::create(&queue_name, config.queue_depth, WIRE_SIZE)
            .map_err(StartupError::Queue)?;
        println!("Message queue created: {queue_name}");

        if let Err(e) = registry.registry().register(&user_id, &queue_name) {
            let _ = MessageQueue::unlink_name(&queue_name);
            return Err(StartupError::Registry(e));
        }
        println!("Registered as {user_id}");

        let doc_name = format!("{user_id}_doc.txt");
        let doc_path = config.doc_dir.join(&doc_name);
        document::ensure_initial(&doc_path).map_err(StartupError::Document)?;
        let last_mtime = document::mtime(&doc_path).map_err(StartupError::Document)?;
        let prev_lines = document::read_lines(&doc_path).map_err(StartupError::Document)?;

        let (tx_ring, rx_ring) = spsc_channel::<OpRecord>(config.ring_capacity);
        let stats = Arc::new(Stats::new());
        let listener = Listener::spawn(
            queue,
            tx_ring,
            shutdown.clone(),
            stats.clone(),
            config.listener_idle_sleep,
            config.listener_error_sleep,
        );

        let merge_baseline = prev_lines.clone();
        let mut peer = Self {
            config,
            user_id,
            registry,
            rx: rx_ring,
            listener: Some(listener),
            shutdown,
            stats,
            display,
            doc_path,
            doc_name,
            prev_lines,
            merge_baseline,
            last_mtime,
            local_ops: Vec::new(),
            local_unmerged: Vec::new(),
            recv_unmerged: Vec::new(),
            just_merged: false,
            roster: Vec::new(),
            torn_down: false,
        };
        peer.roster = peer.registry.registry().list();
        peer.render(None, false);
        Ok(peer)
    }

    /// Run the cooperative loop until the shutdown flag is raised, then
    /// clean up.
    pub fn run(mut self) {
        while !self.shutdown.load(Ordering::SeqCst) {
            self.poll_once();
            thread::sleep(self.config.poll_interval);
        }
        self.stop();
    }

    /// One loop iteration, without the trailing sleep.
    pub fn poll_once(&mut self) {
        let roster = self.registry.registry().list();
        let roster_changed = roster != self.roster;
        self.roster = roster;

        let got_remote = self.drain_ring();
        if got_remote {
            if let Some(sender) = self.stats.last_sender() {
                println!("Received update from {sender}");
            }
            self.render(None, true);
        } else if roster_changed {
            self.render(None, false);
        }

        // The stat failing is transient (editor mid-save); retry next tick.
        let mtime_now = match document::mtime(&self.doc_path) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "cannot stat document; skipping iteration");
                return;
            }
        };

        if self.just_merged {
            self.just_merged = false;
        }

        if mtime_now != self.last_mtime {
            self.last_mtime = mtime_now;
            self.synthesize_changes();
        }

        self.maybe_merge();

        // Late arrivals during the merge get absorbed right away instead of
        // waiting out a full poll interval.
        if self.drain_ring() {
            self.maybe_merge();
        }

        self.maybe_broadcast();
    }

    /// Diff the on-disk content against the last known lines and queue one
    /// operation per changed line, in both wire and merge form.
    fn synthesize_changes(&mut self) {
        let new_lines = match document::read_lines(&self.doc_path) {
            Ok(lines) => lines,
            Err(e) => {
                tracing::warn!(error = %e, "cannot read document; skipping change synthesis");
                return;
            }
        };

        let edits = diff::diff_lines(&self.prev_lines, &new_lines);
        self.prev_lines = new_lines;
        if edits.is_empty() {
            return;
        }

        let last = edits.last().cloned();
        for edit in edits {
            let op = edit.into_op(self.user_id.as_str(), monotonic_ns());
            self.local_ops.push(op.to_record());
            self.local_unmerged.push(op);
        }
        tracing::debug!(
            queued = self.local_ops.len(),
            "local changes detected and queued"
        );
        self.render(last.as_ref(), false);
    }

    /// Merge when something is waiting and the file is not mid-edit.
    fn maybe_merge(&mut self) {
        let triggered = !self.recv_unmerged.is_empty()
            || self.local_unmerged.len() >= self.config.merge_threshold;
        if !triggered {
            return;
        }

        // Dirty guard: a save newer than the last observed mtime means
        // changes we have not diffed yet; writing now would clobber them.
        let dirty = document::mtime(&self.doc_path)
            .map(|m| m != self.last_mtime)
            .unwrap_or(false);
        if dirty {
            tracing::debug!("merge deferred; document has undiffed changes");
            return;
        }

        let mut lines = self.merge_baseline.clone();
        let changed = merge::merge_into(&mut lines, &mut self.local_unmerged, &mut self.recv_unmerged);
        if !changed {
            return;
        }

        document::normalize(&mut lines);
        if let Err(e) = document::write_lines(&self.doc_path, &lines) {
            tracing::error!(error = %e, "merge writeback failed");
            return;
        }

        self.prev_lines = lines.clone();
        self.merge_baseline = lines;
        // Refresh after the write so the writeback is not re-detected as a
        // user edit.
        if let Ok(m) = document::mtime(&self.doc_path) {
            self.last_mtime = m;
        }

        println!("All updates merged successfully");
        self.render(None, false);
        self.just_merged = true;
        thread::sleep(self.config.settle_delay);
    }

    /// Send the first batch of queued operations to every live peer, then
    /// remove exactly that batch, sent or not, from the queue.
    fn maybe_broadcast(&mut self) {
        let batch = self.config.broadcast_batch;
        if self.local_ops.len() < batch {
            return;
        }
        println!("Broadcasting {batch} operations...");

        for peer in self.registry.registry().list() {
            if peer.user_id == self.user_id.as_str() || peer.queue_name.is_empty() {
                continue;
            }
            let tx = match SendQueue::open(&peer.queue_name) {
                Ok(tx) => tx,
                Err(e) => {
                    tracing::debug!(peer = %peer.user_id, error = %e, "peer queue not openable; skipping");
                    continue;
                }
            };
            for rec in self.local_ops.iter().take(batch) {
                match tx.send(rec.as_bytes()) {
                    Ok(()) => self.stats.record_sent(&peer.user_id),
                    Err(e) => {
                        tracing::debug!(peer = %peer.user_id, error = %e, "send failed; skipping record");
                    }
                }
            }
        }

        self.local_ops.drain(..batch);
    }

    /// Move everything the listener buffered into `recv_unmerged`,
    /// dropping our own broadcast echoes.
    fn drain_ring(&mut self) -> bool {
        let mut got = false;
        while let Some(rec) = self.rx.try_pop() {
            if rec.sender_bytes() == self.user_id.as_str().as_bytes() {
                continue;
            }
            self.recv_unmerged.push(Op::from_record(&rec));
            got = true;
        }
        got
    }

    fn render(&mut self, last_change: Option<&LineEdit>, show_sender: bool) {
        let peers: Vec<PeerInfo> = self
            .registry
            .registry()
            .list()
            .into_iter()
            .filter(|p| queue::probe(&p.queue_name))
            .collect();
        let sender = if show_sender {
            self.stats.last_sender()
        } else {
            None
        };
        let view = DocView {
            doc_name: &self.doc_name,
            lines: &self.prev_lines,
            peers: &peers,
            last_change,
            last_sender: sender.as_deref(),
        };
        self.display.render(&view);
    }

    /// Raise the flag, join the listener, release the slot, unlink the
    /// queue. Idempotent; cleanup failures are ignored.
    pub fn stop(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(listener) = self.listener.take() {
            listener.join();
        }
        self.registry.registry().unregister(&self.user_id);
        let _ = MessageQueue::unlink_name(&self.user_id.queue_name());
        tracing::info!(
            received = self.stats.received(),
            sent = self.stats.sent(),
            "peer shut down"
        );
    }

    // ── introspection ──────────────────────────────────────────────────────

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn doc_path(&self) -> &Path {
        &self.doc_path
    }

    /// Last known document content.
    pub fn document_lines(&self) -> &[Line] {
        &self.prev_lines
    }

    /// Wire-form operations still queued for broadcast.
    pub fn pending_broadcast(&self) -> usize {
        self.local_ops.len()
    }

    /// Merge-form local operations awaiting merge.
    pub fn unmerged_local(&self) -> &[Op] {
        &self.local_unmerged
    }

    /// Merge-form received operations awaiting merge.
    pub fn unmerged_received(&self) -> &[Op] {
        &self.recv_unmerged
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }
}

impl Drop for Peer {
    fn drop(&mut self) {
        self.teardown();
    }
}
