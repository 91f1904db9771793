//! The intermediate kernel pipe a splice relay moves pages through

use ferrosplice_types::PipeSize;
use nix::fcntl::OFlag;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use tracing::debug;

/// A private pipe used as the relay between source and destination
///
/// Both ends are closed when the pipe is dropped.
#[derive(Debug)]
pub(crate) struct RelayPipe {
    read: OwnedFd,
    write: OwnedFd,
    capacity: usize,
}

impl RelayPipe {
    /// Create a pipe, resizing it first when a size is requested
    ///
    /// A refused resize is not fatal: the pipe keeps its default capacity and
    /// [`RelayPipe::capacity`] reports what the kernel actually granted.
    pub(crate) fn new(requested: Option<PipeSize>) -> io::Result<Self> {
        let (read, write) = nix::unistd::pipe2(OFlag::O_CLOEXEC)?;

        if let Some(size) = requested {
            if let Err(e) = set_capacity(write.as_fd(), size.get()) {
                debug!(requested = size.get(), error = %e, "pipe resize refused");
            }
        }
        let capacity = capacity(write.as_fd())?;

        Ok(Self {
            read,
            write,
            capacity,
        })
    }

    pub(crate) fn read_end(&self) -> BorrowedFd<'_> {
        self.read.as_fd()
    }

    pub(crate) fn write_end(&self) -> BorrowedFd<'_> {
        self.write.as_fd()
    }

    /// Bytes the pipe can hold before a writer would block
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Capacity of a fresh relay pipe created with the given size request
pub fn probe_capacity(requested: Option<PipeSize>) -> io::Result<usize> {
    RelayPipe::new(requested).map(|pipe| pipe.capacity())
}

fn capacity(fd: BorrowedFd<'_>) -> io::Result<usize> {
    // SAFETY: F_GETPIPE_SZ only reads the pipe's metadata.
    let size = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETPIPE_SZ) };
    if size < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(size as usize)
    }
}

fn set_capacity(fd: BorrowedFd<'_>, size: usize) -> io::Result<usize> {
    let size = libc::c_int::try_from(size)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pipe size out of range"))?;
    // SAFETY: F_SETPIPE_SZ takes an int argument and touches no user memory.
    let granted = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETPIPE_SZ, size) };
    if granted < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(granted as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity_is_at_least_a_page() {
        let pipe = RelayPipe::new(None).unwrap();
        assert!(pipe.capacity() >= 4096);
        assert_ne!(pipe.read_end().as_raw_fd(), pipe.write_end().as_raw_fd());
    }

    #[test]
    fn test_requested_capacity_is_granted() {
        let requested = PipeSize::new(128 * 1024).unwrap();
        let pipe = RelayPipe::new(Some(requested)).unwrap();
        // The kernel rounds up to a power-of-two number of pages
        assert!(pipe.capacity() >= 128 * 1024);
    }

    #[test]
    fn test_probe_matches_new_pipe() {
        assert_eq!(
            probe_capacity(None).unwrap(),
            RelayPipe::new(None).unwrap().capacity()
        );
    }
}
