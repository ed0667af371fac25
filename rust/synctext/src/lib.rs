//! SyncText: a multi-process collaborative text editor.
//!
//! Every participant edits a private file-backed replica of the shared
//! document. Saves are detected by polling, diffed into line/column-ranged
//! operation records, broadcast to every other peer through POSIX message
//! queues, and reconciled with a last-writer-wins merge over per-line
//! column spans, so all replicas converge without coordination.
//!
//! # Architecture
//!
//! One process per participant, two execution contexts each:
//!
//! ```text
//!  ┌───────────────────────────── peer process ────────────────────────────┐
//!  │                                                                       │
//!  │  listener thread ──► SPSC ring ──► editor loop ──► document file      │
//!  │        ▲                               │  ▲                           │
//!  └────────┼───────────────────────────────┼──┼───────────────────────────┘
//!           │                               │  │
//!     own message queue          peer queues│  │shared registry
//!      (kernel FIFO)              (sends)   ▼  ▼  (discovery)
//! ```
//!
//! Peers discover each other through a lock-free slot table in a shared
//! memory segment ([`registry`]), exchange fixed-size records ([`wire`])
//! over per-peer message queues ([`queue`]), and converge through the
//! LWW merge engine ([`merge`]).

pub mod clock;
pub mod config;
pub mod diff;
pub mod document;
pub mod listener;
pub mod merge;
pub mod peer;
pub mod queue;
pub mod registry;
pub mod render;
pub mod stats;
pub mod userid;
pub mod wire;

pub use config::PeerConfig;
pub use diff::{LineEdit, diff_lines};
pub use merge::{apply_to_line, merge_into, newer_wins, overlaps};
pub use peer::{Peer, StartupError};
pub use registry::{
    MAX_USERS, PeerInfo, Registry, RegistryError, SEGMENT_SIZE, SharedRegistry,
};
pub use userid::{UserId, UserIdError};
pub use wire::{Op, OpKind, OpRecord, WIRE_SIZE};
