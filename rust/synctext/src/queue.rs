//! POSIX message queue endpoints.
//!
//! Each peer owns one receive queue named `/queue_<user_id>` and opens every
//! other peer's queue write-only at broadcast time. All endpoints are
//! non-blocking: an empty receive and a full send are ordinary outcomes,
//! not errors worth propagating.

use std::ffi::CString;
use std::fmt;
use std::io;

/// Messages a freshly created queue can hold before sends start failing.
pub const DEFAULT_QUEUE_DEPTH: i64 = 10;

fn queue_cstring(name: &str) -> io::Result<CString> {
    if !name.starts_with('/') || name[1..].contains('/') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "queue name must be /name with no interior slashes",
        ));
    }
    CString::new(name)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "queue name contains NUL"))
}

/// Failure to provision the peer's own receive queue. Fatal at startup.
#[derive(Debug)]
pub enum QueueError {
    Open(io::Error),
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::Open(e) => write!(f, "cannot open message queue: {e}"),
        }
    }
}

impl std::error::Error for QueueError {}

/// Outcome classification for a non-blocking receive.
#[derive(Debug)]
pub enum RecvError {
    /// No messages available right now.
    Empty,
    /// Anything else (bad descriptor, interrupted, ...).
    Other(io::Error),
}

/// Queue attributes snapshot.
#[derive(Debug, Clone, Copy)]
pub struct QueueAttrs {
    pub depth: i64,
    pub msg_size: usize,
    pub current: i64,
}

/// A peer's own receive endpoint (read-only, non-blocking).
pub struct MessageQueue {
    mqd: libc::mqd_t,
    name: String,
}

unsafe impl Send for MessageQueue {}

impl MessageQueue {
    /// Create a fresh receive queue, unlinking any stale one first.
    ///
    /// A prior incarnation of this peer may have crashed without cleanup;
    /// starting from an empty queue also discards operations from a session
    /// this peer was not part of.
    pub fn create(name: &str, depth: i64, msg_size: usize) -> Result<Self, QueueError> {
        let c_name = queue_cstring(name).map_err(QueueError::Open)?;

        unsafe { libc::mq_unlink(c_name.as_ptr()) };

        let mut attr: libc::mq_attr = unsafe { std::mem::zeroed() };
        attr.mq_maxmsg = depth as _;
        attr.mq_msgsize = msg_size as _;

        let mqd = unsafe {
            libc::mq_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_RDONLY | libc::O_NONBLOCK,
                0o666 as libc::c_int,
                &attr as *const libc::mq_attr,
            )
        };
        if mqd == -1 {
            return Err(QueueError::Open(io::Error::last_os_error()));
        }

        Ok(Self {
            mqd,
            name: name.to_string(),
        })
    }

    /// Queue attributes (used to size receive buffers).
    pub fn attrs(&self) -> io::Result<QueueAttrs> {
        let mut attr: libc::mq_attr = unsafe { std::mem::zeroed() };
        if unsafe { libc::mq_getattr(self.mqd, &mut attr) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(QueueAttrs {
            depth: attr.mq_maxmsg as i64,
            msg_size: attr.mq_msgsize as usize,
            current: attr.mq_curmsgs as i64,
        })
    }

    /// One non-blocking receive into `buf`; returns the message length.
    ///
    /// `buf` must be at least the queue's message size or the kernel
    /// rejects the receive.
    pub fn recv(&self, buf: &mut [u8]) -> Result<usize, RecvError> {
        let r = unsafe {
            libc::mq_receive(
                self.mqd,
                buf.as_mut_ptr() as *mut libc::c_char,
                buf.len(),
                std::ptr::null_mut(),
            )
        };
        if r < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EAGAIN) {
                return Err(RecvError::Empty);
            }
            return Err(RecvError::Other(err));
        }
        Ok(r as usize)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Remove the queue name from the system.
    ///
    /// Called during shutdown after the descriptor is closed; failure (the
    /// name is already gone) is not actionable.
    pub fn unlink_name(name: &str) -> io::Result<()> {
        let c_name = queue_cstring(name)?;
        if unsafe { libc::mq_unlink(c_name.as_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Drop for MessageQueue {
    fn drop(&mut self) {
        unsafe { libc::mq_close(self.mqd) };
    }
}

/// A write-only, non-blocking handle to another peer's queue.
pub struct SendQueue {
    mqd: libc::mqd_t,
    name: String,
}

unsafe impl Send for SendQueue {}

impl SendQueue {
    /// Open a peer's queue for sending. Fails if the queue does not exist.
    pub fn open(name: &str) -> io::Result<Self> {
        let c_name = queue_cstring(name)?;
        let mqd = unsafe { libc::mq_open(c_name.as_ptr(), libc::O_WRONLY | libc::O_NONBLOCK) };
        if mqd == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            mqd,
            name: name.to_string(),
        })
    }

    /// Non-blocking send of one message. A full queue surfaces as `EAGAIN`;
    /// callers skip and move on.
    pub fn send(&self, msg: &[u8]) -> io::Result<()> {
        let r = unsafe {
            libc::mq_send(self.mqd, msg.as_ptr() as *const libc::c_char, msg.len(), 0)
        };
        if r != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for SendQueue {
    fn drop(&mut self) {
        unsafe { libc::mq_close(self.mqd) };
    }
}

/// Does a queue with this name currently exist?
///
/// Opens write-only and immediately closes. Used to filter registry entries
/// whose owner crashed without unregistering.
pub fn probe(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    SendQueue::open(name).is_ok()
}

// ── tests ─────────────────────────────────────────────────────────────────────
