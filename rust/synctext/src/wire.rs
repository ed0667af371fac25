//! The fixed-size operation record carried through message queues.
//!
//! One record is exactly one queue message. The layout is `#[repr(C)]` in
//! host byte order (peers share one machine), and every string field is
//! NUL-terminated with zero padding, so a record can be memcpy'd in and out
//! of a receive buffer.

use core::mem::size_of;

/// Capacity of the `sender` field (31 payload bytes + NUL).
pub const SENDER_CAP: usize = 32;

/// Capacity of each text segment field (255 payload bytes + NUL).
pub const TEXT_SEG_CAP: usize = 256;

/// Operation kinds, as carried on the wire.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Insert = 1,
    Delete = 2,
    Replace = 3,
}

impl OpKind {
    #[inline]
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(OpKind::Insert),
            2 => Some(OpKind::Delete),
            3 => Some(OpKind::Replace),
            _ => None,
        }
    }

    /// Kind name for display.
    pub const fn name(self) -> &'static str {
        match self {
            OpKind::Insert => "insert",
            OpKind::Delete => "delete",
            OpKind::Replace => "replace",
        }
    }
}

/// Wire form of one operation.
///
/// `col_start`/`col_end` are inclusive byte columns on `line`:
/// `col_end = col_start + len(old_text) - 1`, which for a pure insertion
/// (empty `old_text`) is `col_start - 1`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct OpRecord {
    pub sender: [u8; SENDER_CAP],
    pub timestamp_ns: u64,
    pub line: u32,
    pub col_start: i32,
    pub col_end: i32,
    pub kind: u8,
    pub old_text: [u8; TEXT_SEG_CAP],
    pub new_text: [u8; TEXT_SEG_CAP],
}

/// Exact size of one wire record; also the queue message size.
pub const WIRE_SIZE: usize = size_of::<OpRecord>();

const _: () = assert!(size_of::<OpRecord>() == 568);

impl OpRecord {
    /// An all-zero record (empty strings, kind 0).
    pub fn zeroed() -> Self {
        // SAFETY: OpRecord is plain-old-data; all-zero is a valid value.
        unsafe { core::mem::zeroed() }
    }

    /// Sender id payload (bytes up to the first NUL).
    #[inline]
    pub fn sender_bytes(&self) -> &[u8] {
        cstr_payload(&self.sender)
    }

    /// Reconstruct a record from a receive buffer.
    ///
    /// Short buffers zero-fill the tail, mirroring a partial memcpy.
    pub fn from_bytes(buf: &[u8]) -> Self {
        let mut rec = Self::zeroed();
        let n = buf.len().min(WIRE_SIZE);
        // SAFETY: OpRecord is plain-old-data and n <= size_of::<OpRecord>().
        unsafe {
            core::ptr::copy_nonoverlapping(buf.as_ptr(), &mut rec as *mut Self as *mut u8, n);
        }
        rec
    }

    /// View the record as raw bytes for a queue send.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: OpRecord is repr(C) plain-old-data of size WIRE_SIZE.
        unsafe { core::slice::from_raw_parts(self as *const Self as *const u8, WIRE_SIZE) }
    }
}

/// Growable form of one operation, used during merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Op {
    pub ts: u64,
    pub uid: String,
    pub line: u32,
    pub cs: i32,
    pub ce: i32,
    pub kind: OpKind,
    pub old: Vec<u8>,
    pub new: Vec<u8>,
}

impl Op {
    /// Decode a wire record into merge form.
    pub fn from_record(rec: &OpRecord) -> Self {
        Self {
            ts: rec.timestamp_ns,
            uid: String::from_utf8_lossy(rec.sender_bytes()).into_owned(),
            line: rec.line,
            cs: rec.col_start,
            ce: rec.col_end,
            kind: OpKind::from_u8(rec.kind).unwrap_or(OpKind::Replace),
            old: cstr_payload(&rec.old_text).to_vec(),
            new: cstr_payload(&rec.new_text).to_vec(),
        }
    }

    /// Encode into wire form.
    ///
    /// Text segments longer than the wire capacity are truncated with the
    /// NUL terminator preserved; a warning names the affected line.
    pub fn to_record(&self) -> OpRecord {
        let mut rec = OpRecord::zeroed();
        write_bounded(&mut rec.sender, self.uid.as_bytes());
        rec.timestamp_ns = self.ts;
        rec.line = self.line;
        rec.col_start = self.cs;
        rec.col_end = self.ce;
        rec.kind = self.kind as u8;
        let old_truncated = write_bounded(&mut rec.old_text, &self.old);
        let new_truncated = write_bounded(&mut rec.new_text, &self.new);
        if old_truncated || new_truncated {
            tracing::warn!(
                line = self.line,
                "operation text segment exceeds wire capacity; truncated"
            );
        }
        rec
    }
}

/// Copy `src` into a NUL-terminated fixed field, zero-padding the rest.
///
/// Returns true if `src` was truncated to fit.
fn write_bounded(dst: &mut [u8], src: &[u8]) -> bool {
    let n = src.len().min(dst.len() - 1);
    dst[..n].copy_from_slice(&src[..n]);
    dst[n..].fill(0);
    n < src.len()
}

/// Bytes of a fixed field up to the first NUL.
fn cstr_payload(field: &[u8]) -> &[u8] {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    &field[..end]
}

// ── tests ─────────────────────────────────────────────────────────────────────
