//! Cross-process participant registry in POSIX shared memory.
//!
//! A fixed table of [`MAX_USERS`] slots behind a magic/version header.
//! Claim and release go through a single compare-and-swap on each slot's
//! `active` word; the string payloads race with observers by design, so
//! readers treat [`Registry::list`] as an advisory snapshot and verify
//! liveness externally by probing the advertised queue.

use core::mem::{align_of, size_of};
use core::ptr;
use core::sync::atomic::{AtomicU32, Ordering};
use std::fmt;
use std::io;

#[cfg(unix)]
use synctext_primitives::ShmRegion;

use crate::userid::UserId;

/// Shared memory object name all peers rendezvous on.
pub const REGISTRY_SHM_NAME: &str = "/synctext_registry";

/// Magic sentinel, "SYXT".
pub const REGISTRY_MAGIC: u32 = 0x5359_5854;

/// Segment format version.
pub const REGISTRY_VERSION: u32 = 1;

/// Maximum number of concurrently registered peers.
pub const MAX_USERS: usize = 5;

/// Capacity of the slot `user_id` field (31 payload bytes + NUL).
pub const USER_ID_CAP: usize = 32;

/// Capacity of the slot `queue_name` field (63 payload bytes + NUL).
pub const QUEUE_NAME_CAP: usize = 64;

/// Slot claim states.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Free = 0,
    Taken = 1,
}

/// Header at the start of the registry segment.
#[repr(C)]
pub struct RegistryHeader {
    pub magic: u32,
    pub version: u32,
}

/// One participant slot.
///
/// The layout is part of the cross-process contract: every peer maps the
/// same bytes, so field order and sizes are frozen.
#[repr(C)]
pub struct UserSlot {
    /// Claim word; Free=0, Taken=1. The only synchronized field.
    active: AtomicU32,
    user_id: [u8; USER_ID_CAP],
    queue_name: [u8; QUEUE_NAME_CAP],
}

const _: () = assert!(size_of::<RegistryHeader>() == 8);
const _: () = assert!(size_of::<UserSlot>() == 100);

/// Total registry segment size.
pub const SEGMENT_SIZE: usize = size_of::<RegistryHeader>() + MAX_USERS * size_of::<UserSlot>();

const _: () = assert!(SEGMENT_SIZE == 508);

/// Advisory snapshot of one active peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub user_id: String,
    pub queue_name: String,
}

/// Registry errors.
#[derive(Debug)]
pub enum RegistryError {
    /// The shared memory object could not be opened, sized, or mapped.
    Open(io::Error),
    /// All slots are taken.
    Full,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::Open(e) => write!(f, "cannot open registry segment: {e}"),
            RegistryError::Full => write!(f, "registry is full ({MAX_USERS} peers)"),
        }
    }
}

impl std::error::Error for RegistryError {}

/// In-process view of the registry table.
pub struct Registry {
    header: *mut RegistryHeader,
    slots: *mut UserSlot,
}

unsafe impl Send for Registry {}
unsafe impl Sync for Registry {}

impl Registry {
    /// Attach to a registry segment, initializing it if the magic does not
    /// match (first peer in, or a wiped segment).
    ///
    /// # Safety
    ///
    /// `base` must point to at least `len` bytes of memory, aligned for the
    /// header, that stays mapped for the lifetime of this value. Other
    /// processes may hold the same mapping.
    pub unsafe fn open_or_init(base: *mut u8, len: usize) -> Self {
        assert!(len >= SEGMENT_SIZE, "registry segment too small");
        assert!(
            (base as usize).is_multiple_of(align_of::<RegistryHeader>()),
            "registry segment misaligned"
        );
        let header = base as *mut RegistryHeader;
        let slots = unsafe { base.add(size_of::<RegistryHeader>()) } as *mut UserSlot;
        let this = Self { header, slots };

        let head = unsafe { &*this.header };
        if head.magic != REGISTRY_MAGIC {
            unsafe { this.initialize() };
        }
        this
    }

    /// Write initial values: magic, version, all slots free and empty.
    ///
    /// Two peers may both observe a missing magic and initialize
    /// concurrently; the writes are identical, so the race is benign.
    unsafe fn initialize(&self) {
        for i in 0..MAX_USERS {
            let slot = self.slot_ptr(i);
            unsafe {
                clear_field(ptr::addr_of_mut!((*slot).user_id) as *mut u8, USER_ID_CAP);
                clear_field(ptr::addr_of_mut!((*slot).queue_name) as *mut u8, QUEUE_NAME_CAP);
                (*slot).active.store(SlotState::Free as u32, Ordering::Release);
            }
        }
        unsafe {
            (*self.header).version = REGISTRY_VERSION;
            (*self.header).magic = REGISTRY_MAGIC;
        }
    }

    #[inline]
    fn slot_ptr(&self, i: usize) -> *mut UserSlot {
        assert!(i < MAX_USERS);
        unsafe { self.slots.add(i) }
    }

    #[inline]
    fn active(&self, i: usize) -> &AtomicU32 {
        unsafe { &(*self.slot_ptr(i)).active }
    }

    /// Copy a slot's id payload out of shared memory (up to the first NUL).
    fn id_payload(&self, i: usize) -> Vec<u8> {
        let slot = self.slot_ptr(i);
        let mut buf = [0u8; USER_ID_CAP];
        unsafe {
            ptr::copy_nonoverlapping(
                ptr::addr_of!((*slot).user_id) as *const u8,
                buf.as_mut_ptr(),
                USER_ID_CAP,
            );
        }
        field_payload(&buf).to_vec()
    }

    /// Copy a slot's queue name payload out of shared memory.
    fn queue_payload(&self, i: usize) -> Vec<u8> {
        let slot = self.slot_ptr(i);
        let mut buf = [0u8; QUEUE_NAME_CAP];
        unsafe {
            ptr::copy_nonoverlapping(
                ptr::addr_of!((*slot).queue_name) as *const u8,
                buf.as_mut_ptr(),
                QUEUE_NAME_CAP,
            );
        }
        field_payload(&buf).to_vec()
    }

    /// Claim a slot for `user_id`, advertising `queue_name`.
    ///
    /// If an active slot already carries this id (a previous incarnation,
    /// possibly crashed), its queue name is overwritten and the same slot
    /// index is returned. Otherwise the first slot whose `active` word
    /// CASes Free→Taken is claimed.
    pub fn register(&self, user_id: &UserId, queue_name: &str) -> Result<usize, RegistryError> {
        for i in 0..MAX_USERS {
            let slot = self.slot_ptr(i);
            if self.active(i).load(Ordering::Acquire) == SlotState::Taken as u32
                && self.id_payload(i) == user_id.as_str().as_bytes()
            {
                unsafe {
                    store_field(
                        ptr::addr_of_mut!((*slot).queue_name) as *mut u8,
                        QUEUE_NAME_CAP,
                        queue_name.as_bytes(),
                    );
                }
                return Ok(i);
            }
        }

        for i in 0..MAX_USERS {
            let slot = self.slot_ptr(i);
            if self
                .active(i)
                .compare_exchange(
                    SlotState::Free as u32,
                    SlotState::Taken as u32,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                unsafe {
                    store_field(
                        ptr::addr_of_mut!((*slot).user_id) as *mut u8,
                        USER_ID_CAP,
                        user_id.as_str().as_bytes(),
                    );
                    store_field(
                        ptr::addr_of_mut!((*slot).queue_name) as *mut u8,
                        QUEUE_NAME_CAP,
                        queue_name.as_bytes(),
                    );
                }
                return Ok(i);
            }
        }

        Err(RegistryError::Full)
    }

    /// Release the slot owned by `user_id`.
    ///
    /// Strings are cleared before the release store on `active`, so an
    /// observer never sees a taken slot with a stale id. Returns false if
    /// no active slot carried the id.
    pub fn unregister(&self, user_id: &UserId) -> bool {
        for i in 0..MAX_USERS {
            let slot = self.slot_ptr(i);
            if self.active(i).load(Ordering::Acquire) == SlotState::Taken as u32
                && self.id_payload(i) == user_id.as_str().as_bytes()
            {
                unsafe {
                    clear_field(ptr::addr_of_mut!((*slot).user_id) as *mut u8, USER_ID_CAP);
                    clear_field(ptr::addr_of_mut!((*slot).queue_name) as *mut u8, QUEUE_NAME_CAP);
                }
                self.active(i).store(SlotState::Free as u32, Ordering::Release);
                return true;
            }
        }
        false
    }

    /// Advisory snapshot of active peers.
    ///
    /// Slots observed mid-claim (taken but id not yet written) are skipped.
    pub fn list(&self) -> Vec<PeerInfo> {
        let mut out = Vec::with_capacity(MAX_USERS);
        for i in 0..MAX_USERS {
            if self.active(i).load(Ordering::Acquire) != SlotState::Taken as u32 {
                continue;
            }
            let id = self.id_payload(i);
            if id.is_empty() {
                continue;
            }
            out.push(PeerInfo {
                user_id: String::from_utf8_lossy(&id).into_owned(),
                queue_name: String::from_utf8_lossy(&self.queue_payload(i)).into_owned(),
            });
        }
        out
    }
}

/// Registry backed by the named shared memory object.
#[cfg(unix)]
pub struct SharedRegistry {
    registry: Registry,
    // Keeps the mapping alive; dropped (unmapped) after the registry view.
    _shm: ShmRegion,
}

#[cfg(unix)]
impl SharedRegistry {
    /// Open or create the named registry segment and attach to it.
    pub fn open(name: &str) -> Result<Self, RegistryError> {
        let shm = ShmRegion::open_or_create(name, SEGMENT_SIZE).map_err(RegistryError::Open)?;
        // SAFETY: the mapping is SEGMENT_SIZE bytes, page-aligned, and owned
        // by `shm` which lives as long as the registry view.
        let registry = unsafe { Registry::open_or_init(shm.as_ptr(), shm.len()) };
        Ok(Self {
            registry,
            _shm: shm,
        })
    }

    #[inline]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Copy `src` into a NUL-terminated fixed field, zero-padding the rest.
unsafe fn store_field(dst: *mut u8, cap: usize, src: &[u8]) {
    let n = src.len().min(cap - 1);
    unsafe {
        ptr::copy_nonoverlapping(src.as_ptr(), dst, n);
        ptr::write_bytes(dst.add(n), 0, cap - n);
    }
}

unsafe fn clear_field(dst: *mut u8, cap: usize) {
    unsafe { ptr::write_bytes(dst, 0, cap) };
}

/// Field bytes up to the first NUL, copied out of the (racy) shared slot.
fn field_payload(field: &[u8]) -> &[u8] {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    &field[..end]
}

// ── tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Zeroed word buffer standing in for the shared mapping; u64 words
    /// keep the header and the atomic claim fields aligned.
    fn segment_buf() -> Vec<u64> {
        vec![0u64; SEGMENT_SIZE.div_ceil(size_of::<u64>())]
    }

    fn make_registry() -> (Vec<u64>, Registry) {
        let mut mem = segment_buf();
        let reg = unsafe { Registry::open_or_init(mem.as_mut_ptr() as *mut u8, SEGMENT_SIZE) };
        (mem, reg)
    }

    fn uid(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    #[test]
    fn fresh_segment_is_initialized() {
        let (_mem, reg) = make_registry();
        assert!(reg.list().is_empty());
    }

    #[test]
    fn reopen_preserves_registrations() {
        let mut mem = segment_buf();
        let base = mem.as_mut_ptr() as *mut u8;
        let reg = unsafe { Registry::open_or_init(base, SEGMENT_SIZE) };
        reg.register(&uid("alice"), "/queue_alice").unwrap();

        // A second attach must see the magic and keep the slots.
        let reg2 = unsafe { Registry::open_or_init(base, SEGMENT_SIZE) };
        let peers = reg2.list();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].user_id, "alice");
        assert_eq!(peers[0].queue_name, "/queue_alice");
    }

    #[test]
    fn distinct_ids_get_distinct_slots() {
        let (_mem, reg) = make_registry();
        let a = reg.register(&uid("a"), "/queue_a").unwrap();
        let b = reg.register(&uid("b"), "/queue_b").unwrap();
        assert_ne!(a, b);
        assert_eq!(reg.list().len(), 2);
    }

    #[test]
    fn same_id_reclaims_slot_and_updates_queue() {
        let (_mem, reg) = make_registry();
        let first = reg.register(&uid("a"), "/queue_old").unwrap();
        let second = reg.register(&uid("a"), "/queue_new").unwrap();
        assert_eq!(first, second);
        let peers = reg.list();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].queue_name, "/queue_new");
    }

    #[test]
    fn unregister_frees_the_slot() {
        let (_mem, reg) = make_registry();
        reg.register(&uid("a"), "/queue_a").unwrap();
        assert!(reg.unregister(&uid("a")));
        assert!(reg.list().is_empty());
        // Slot is reusable
        assert_eq!(reg.register(&uid("b"), "/queue_b").unwrap(), 0);
    }

    #[test]
    fn unregister_unknown_id_is_a_noop() {
        let (_mem, reg) = make_registry();
        assert!(!reg.unregister(&uid("ghost")));
    }

    #[test]
    fn full_registry_rejects() {
        let (_mem, reg) = make_registry();
        for i in 0..MAX_USERS {
            reg.register(&uid(&format!("u{i}")), "/q").unwrap();
        }
        assert!(matches!(
            reg.register(&uid("one_more"), "/q"),
            Err(RegistryError::Full)
        ));
    }

    /// Concurrent registration of distinct ids yields distinct slots and
    /// exactly one taken slot per peer.
    #[test]
    fn concurrent_claims_are_mutually_exclusive() {
        let (_mem, reg) = make_registry();
        let ids: Vec<UserId> = (0..MAX_USERS).map(|i| uid(&format!("peer{i}"))).collect();

        let mut slots: Vec<usize> = std::thread::scope(|s| {
            let handles: Vec<_> = ids
                .iter()
                .map(|id| {
                    let reg = &reg;
                    s.spawn(move || reg.register(id, "/q").unwrap())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        slots.sort_unstable();
        slots.dedup();
        assert_eq!(slots.len(), MAX_USERS, "duplicate slot assignment");
        assert_eq!(reg.list().len(), MAX_USERS);
    }
}
