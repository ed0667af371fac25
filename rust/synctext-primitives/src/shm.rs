//! POSIX shared memory objects mapped for cross-process use.
//!
//! This module provides `ShmRegion`, a named shared memory object
//! (`shm_open`) sized with `ftruncate` and mapped with `MAP_SHARED`.

use std::ffi::CString;
use std::io;
use std::os::unix::io::RawFd;

/// A named POSIX shared memory object mapped into the address space.
///
/// Dropping an `ShmRegion` unmaps and closes the descriptor but never
/// unlinks the object: the segment is a rendezvous point that outlives any
/// one process. Use [`ShmRegion::unlink`] to remove it explicitly.
pub struct ShmRegion {
    /// Pointer to the mapped memory
    ptr: *mut u8,
    /// Length of the mapping in bytes
    len: usize,
    /// The underlying descriptor (kept open to maintain the mapping)
    fd: RawFd,
    /// Object name (for diagnostics)
    name: String,
}

impl ShmRegion {
    /// Open or create a shared memory object and map it read-write.
    ///
    /// The object is created with permissions 0666 so unrelated peer
    /// processes of the same user session can attach, and is always sized
    /// to `size` (`ftruncate` is idempotent on an existing object of the
    /// same size).
    pub fn open_or_create(name: &str, size: usize) -> io::Result<Self> {
        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "size must be > 0",
            ));
        }
        if !name.starts_with('/') || name[1..].contains('/') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "shm name must be /name with no interior slashes",
            ));
        }
        let c_name = CString::new(name)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "shm name contains NUL"))?;

        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR | libc::O_CREAT, 0o666) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        if unsafe { libc::ftruncate(fd, size as libc::off_t) } != 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err);
        }

        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err);
        }

        Ok(Self {
            ptr: ptr as *mut u8,
            len: size,
            fd,
            name: name.to_string(),
        })
    }

    /// Remove a shared memory object by name.
    ///
    /// Existing mappings stay valid until unmapped.
    pub fn unlink(name: &str) -> io::Result<()> {
        let c_name = CString::new(name)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "shm name contains NUL"))?;
        if unsafe { libc::shm_unlink(c_name.as_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Base pointer of the mapping.
    ///
    /// Valid for [`len`](Self::len) bytes as long as this value lives.
    /// Structures laid over it synchronize themselves; the mapping is
    /// shared with other processes by construction.
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr
    }

    /// Size of the mapping in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the mapping is empty (zero bytes).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Name of the underlying object.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ShmRegion {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.len);
            libc::close(self.fd);
        }
    }
}

// SAFETY: the mapping is valid for the lifetime of ShmRegion and the
// underlying memory is already shared between processes.
unsafe impl Send for ShmRegion {}
unsafe impl Sync for ShmRegion {}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        format!("/synctext_test_{}_{}", tag, std::process::id())
    }

    #[test]
    fn create_and_reopen_shares_data() {
        let name = unique_name("share");
        let a = ShmRegion::open_or_create(&name, 4096).unwrap();
        unsafe {
            std::ptr::write(a.as_ptr(), 0x42);
        }

        let b = ShmRegion::open_or_create(&name, 4096).unwrap();
        unsafe {
            assert_eq!(std::ptr::read(b.as_ptr()), 0x42);
        }

        drop(a);
        drop(b);
        ShmRegion::unlink(&name).unwrap();
    }

    #[test]
    fn drop_does_not_unlink() {
        let name = unique_name("keep");
        {
            let r = ShmRegion::open_or_create(&name, 1024).unwrap();
            unsafe { std::ptr::write(r.as_ptr(), 7) };
        }
        // The object survives the drop; a reopen sees the prior byte.
        let r = ShmRegion::open_or_create(&name, 1024).unwrap();
        unsafe {
            assert_eq!(std::ptr::read(r.as_ptr()), 7);
        }
        drop(r);
        ShmRegion::unlink(&name).unwrap();
    }

    #[test]
    fn zero_size_rejected() {
        assert!(ShmRegion::open_or_create("/synctext_test_zero", 0).is_err());
    }

    #[test]
    fn bad_names_rejected() {
        assert!(ShmRegion::open_or_create("noslash", 64).is_err());
        assert!(ShmRegion::open_or_create("/a/b", 64).is_err());
    }
}
