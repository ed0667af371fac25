//! End-to-end peer scenarios over real shared memory and message queues.
//!
//! Each test gets its own registry segment, queue names, and document
//! directory so parallel test execution stays isolated. `poll_once` drives
//! loop iterations directly instead of waiting out the polling cadence.

#![cfg(target_os = "linux")]

use std::fs;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread;
use std::time::Duration;

use synctext::config::PeerConfig;
use synctext::peer::Peer;
use synctext::queue::SendQueue;
use synctext::render::NullDisplay;
use synctext::userid::UserId;
use synctext::wire::{Op, OpKind};
use synctext_primitives::ShmRegion;

struct TestEnv {
    registry_name: String,
    dir: tempfile::TempDir,
}

impl TestEnv {
    fn new(tag: &str) -> Self {
        Self {
            registry_name: format!("/synctext_etest_{}_{}", tag, std::process::id()),
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn config(&self) -> PeerConfig {
        PeerConfig {
            registry_name: self.registry_name.clone(),
            doc_dir: self.dir.path().to_path_buf(),
            ..PeerConfig::default()
        }
    }

    fn spawn_peer(&self, uid: &str, config: PeerConfig) -> Peer {
        Peer::bootstrap(
            UserId::parse(uid).unwrap(),
            config,
            Arc::new(AtomicBool::new(false)),
            Box::new(NullDisplay::default()),
        )
        .unwrap()
    }
}

impl Drop for TestEnv {
    fn drop(&mut self) {
        let _ = ShmRegion::unlink(&self.registry_name);
    }
}

/// Unique-enough user id: queue names are system-global, so embed the pid.
fn test_uid(tag: &str) -> String {
    format!("{}_{}", tag, std::process::id())
}

/// Overwrite the peer's document and give the filesystem a beat so the
/// mtime definitely moves.
fn save_doc(peer: &Peer, content: &str) {
    thread::sleep(Duration::from_millis(20));
    fs::write(peer.doc_path(), content).unwrap();
}

/// Let the receiving peer's listener drain its kernel queue into the ring.
fn settle_listener() {
    thread::sleep(Duration::from_millis(300));
}

#[test]
fn solo_edit_queues_one_replace() {
    let env = TestEnv::new("solo");
    let uid = test_uid("solo");
    let mut peer = env.spawn_peer(&uid, env.config());

    save_doc(&peer, "int x = 42;\nint y = 20;\nint z = 30;\n");
    peer.poll_once();

    let unmerged = peer.unmerged_local();
    assert_eq!(unmerged.len(), 1);
    let op = &unmerged[0];
    assert_eq!(op.kind, OpKind::Replace);
    assert_eq!(op.line, 0);
    assert_eq!((op.cs, op.ce), (8, 9));
    assert_eq!(op.old, b"10");
    assert_eq!(op.new, b"42");
    assert_eq!(op.uid, uid);

    // One operation is far below the broadcast threshold.
    assert_eq!(peer.pending_broadcast(), 1);
    assert_eq!(peer.stats().sent(), 0);
}

#[test]
fn fifth_edit_triggers_broadcast_and_remote_merge() {
    let env = TestEnv::new("bcast");
    let uid_a = test_uid("bcast_a");
    let uid_b = test_uid("bcast_b");

    // Keep A's own merge out of the way so the broadcast bookkeeping is
    // observable on its own.
    let mut config_a = env.config();
    config_a.merge_threshold = 100;

    let mut a = env.spawn_peer(&uid_a, config_a);
    let mut b = env.spawn_peer(&uid_b, env.config());

    let mut content = "int x = 10;".to_string();
    for ch in ["a", "b", "c", "d", "e"] {
        content.push_str(ch);
        save_doc(&a, &format!("{content}\nint y = 20;\nint z = 30;\n"));
        a.poll_once();
    }

    // The fifth edit crossed the threshold: the batch went out and left
    // the merge-form copies behind.
    assert_eq!(a.pending_broadcast(), 0);
    assert_eq!(a.unmerged_local().len(), 5);
    assert_eq!(a.stats().sent(), 5);

    settle_listener();
    b.poll_once();

    assert_eq!(b.document_lines()[0], b"int x = 10;abcde");
    assert_eq!(
        fs::read(b.doc_path()).unwrap(),
        b"int x = 10;abcde\nint y = 20;\nint z = 30;\n"
    );

    a.stop();
    b.stop();
}

#[test]
fn edit_chain_coalesces_on_the_receiver() {
    let env = TestEnv::new("chain");
    let uid_a = test_uid("chain_a");
    let uid_b = test_uid("chain_b");

    let mut config_a = env.config();
    config_a.merge_threshold = 100;

    let mut a = env.spawn_peer(&uid_a, config_a);
    let mut b = env.spawn_peer(&uid_b, env.config());

    // 10 → 11 → 12 → 13 → 14 as five separate saves.
    for v in 11..=15 {
        save_doc(&a, &format!("int x = {v};\nint y = 20;\nint z = 30;\n"));
        a.poll_once();
    }

    settle_listener();
    b.poll_once();

    assert_eq!(b.document_lines()[0], b"int x = 15;");

    a.stop();
    b.stop();
}

#[test]
fn conflicting_replaces_converge_to_last_writer() {
    let env = TestEnv::new("lww");
    let uid_b = test_uid("lww_b");
    let mut b = env.spawn_peer(&uid_b, env.config());

    // Two remote authors fight over the same span; the newer timestamp
    // must win no matter the arrival order.
    let older = Op {
        ts: 1_000,
        uid: "user_2".to_string(),
        line: 0,
        cs: 8,
        ce: 9,
        kind: OpKind::Replace,
        old: b"10".to_vec(),
        new: b"11".to_vec(),
    };
    let newer = Op {
        ts: 2_000,
        uid: "user_1".to_string(),
        cs: 8,
        ce: 9,
        old: b"10".to_vec(),
        new: b"22".to_vec(),
        ..older.clone()
    };

    let tx = SendQueue::open(&UserId::parse(&uid_b).unwrap().queue_name()).unwrap();
    tx.send(newer.to_record().as_bytes()).unwrap();
    tx.send(older.to_record().as_bytes()).unwrap();

    settle_listener();
    b.poll_once();

    assert_eq!(b.document_lines()[0], b"int x = 22;");
    b.stop();
}

#[test]
fn equal_timestamps_tiebreak_on_author_id() {
    let env = TestEnv::new("tie");
    let uid_b = test_uid("tie_b");
    let mut b = env.spawn_peer(&uid_b, env.config());

    let mk = |uid: &str, new: &[u8]| Op {
        ts: 5_000,
        uid: uid.to_string(),
        line: 0,
        cs: 8,
        ce: 9,
        kind: OpKind::Replace,
        old: b"10".to_vec(),
        new: new.to_vec(),
    };

    let tx = SendQueue::open(&UserId::parse(&uid_b).unwrap().queue_name()).unwrap();
    tx.send(mk("user_2", b"22").to_record().as_bytes()).unwrap();
    tx.send(mk("user_1", b"11").to_record().as_bytes()).unwrap();

    settle_listener();
    b.poll_once();

    assert_eq!(b.document_lines()[0], b"int x = 11;");
    b.stop();
}

#[test]
fn disjoint_edits_from_both_sides_merge() {
    let env = TestEnv::new("disjoint");
    let uid_b = test_uid("disjoint_b");
    let mut b = env.spawn_peer(&uid_b, env.config());

    // B appends "!" to line 0 locally...
    save_doc(&b, "int x = 10;!\nint y = 20;\nint z = 30;\n");
    b.poll_once();

    // ...while a remote peer prepends "?" on line 1.
    let remote = Op {
        ts: synctext::clock::monotonic_ns(),
        uid: "remote".to_string(),
        line: 1,
        cs: 0,
        ce: -1,
        kind: OpKind::Insert,
        old: Vec::new(),
        new: b"?".to_vec(),
    };
    let tx = SendQueue::open(&UserId::parse(&uid_b).unwrap().queue_name()).unwrap();
    tx.send(remote.to_record().as_bytes()).unwrap();

    settle_listener();
    b.poll_once();

    assert_eq!(b.document_lines()[0], b"int x = 10;!");
    assert_eq!(b.document_lines()[1], b"?int y = 20;");
    b.stop();
}

#[test]
fn own_broadcast_echo_is_filtered() {
    let env = TestEnv::new("echo");
    let uid_b = test_uid("echo_b");
    let mut b = env.spawn_peer(&uid_b, env.config());

    // A record claiming to be from this very peer must be discarded at the
    // drain, not merged.
    let echo = Op {
        ts: 1,
        uid: uid_b.clone(),
        line: 0,
        cs: 8,
        ce: 9,
        kind: OpKind::Replace,
        old: b"10".to_vec(),
        new: b"99".to_vec(),
    };
    let tx = SendQueue::open(&UserId::parse(&uid_b).unwrap().queue_name()).unwrap();
    tx.send(echo.to_record().as_bytes()).unwrap();

    settle_listener();
    b.poll_once();

    assert_eq!(b.document_lines()[0], b"int x = 10;");
    assert!(b.unmerged_received().is_empty());
    b.stop();
}

#[test]
fn remote_update_merges_into_document_and_baseline() {
    let env = TestEnv::new("writeback");
    let uid_b = test_uid("writeback_b");
    let mut b = env.spawn_peer(&uid_b, env.config());

    let remote = Op {
        ts: 1_000,
        uid: "remote".to_string(),
        line: 2,
        cs: 8,
        ce: 9,
        kind: OpKind::Replace,
        old: b"30".to_vec(),
        new: b"33".to_vec(),
    };
    let tx = SendQueue::open(&UserId::parse(&uid_b).unwrap().queue_name()).unwrap();
    tx.send(remote.to_record().as_bytes()).unwrap();

    settle_listener();
    b.poll_once();

    assert_eq!(b.document_lines()[2], b"int z = 33;");
    assert_eq!(
        fs::read(b.doc_path()).unwrap(),
        b"int x = 10;\nint y = 20;\nint z = 33;\n"
    );
    assert!(b.unmerged_received().is_empty());

    // The writeback is not re-detected as a user edit on the next tick.
    b.poll_once();
    assert!(b.unmerged_local().is_empty());
    assert_eq!(b.pending_broadcast(), 0);

    b.stop();
}

#[test]
fn registered_peers_discover_each_other() {
    let env = TestEnv::new("discover");
    let uid_a = test_uid("disc_a");
    let uid_b = test_uid("disc_b");

    let a = env.spawn_peer(&uid_a, env.config());
    let b = env.spawn_peer(&uid_b, env.config());

    let reg = synctext::registry::SharedRegistry::open(&env.registry_name).unwrap();
    let mut names: Vec<String> = reg
        .registry()
        .list()
        .into_iter()
        .map(|p| p.user_id)
        .collect();
    names.sort();
    let mut expected = vec![uid_a.clone(), uid_b.clone()];
    expected.sort();
    assert_eq!(names, expected);

    // Stopping a peer releases its slot and unlinks its queue.
    b.stop();
    let names: Vec<String> = reg
        .registry()
        .list()
        .into_iter()
        .map(|p| p.user_id)
        .collect();
    assert_eq!(names, vec![uid_a.clone()]);
    assert!(!synctext::queue::probe(
        &UserId::parse(&uid_b).unwrap().queue_name()
    ));

    a.stop();
}
