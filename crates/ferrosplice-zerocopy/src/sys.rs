//! Thin wrapper around the Linux `splice(2)` system call

use std::io;
use std::os::fd::{AsRawFd, BorrowedFd};

/// Outcome of a single splice call
#[derive(Debug)]
pub(crate) enum SpliceStatus {
    /// Bytes moved; zero means the input reached end-of-stream
    Progress(usize),
    /// Nothing could move without blocking
    WouldBlock,
    /// Any other failure, terminal for the transfer
    Fatal(io::Error),
}

impl From<io::Result<usize>> for SpliceStatus {
    fn from(result: io::Result<usize>) -> Self {
        match result {
            Ok(n) => Self::Progress(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Self::WouldBlock,
            Err(e) => Self::Fatal(e),
        }
    }
}

/// Pipe-side calls never block: a pipe short of slots reports `EAGAIN`
/// instead of parking the task that is supposed to drain it.
const BASE_FLAGS: libc::c_uint = libc::SPLICE_F_MOVE | libc::SPLICE_F_NONBLOCK;

/// Flags for a splice call, hinting whether more data will follow
pub(crate) fn flags(more: bool) -> libc::c_uint {
    if more {
        BASE_FLAGS | libc::SPLICE_F_MORE
    } else {
        BASE_FLAGS
    }
}

/// Move up to `len` bytes from `fd_in` to `fd_out` at their current offsets
///
/// One of the two descriptors must be a pipe. `EINTR` is retried.
pub(crate) fn splice(
    fd_in: BorrowedFd<'_>,
    fd_out: BorrowedFd<'_>,
    len: usize,
    flags: libc::c_uint,
) -> io::Result<usize> {
    loop {
        // SAFETY: both descriptors are borrowed for the duration of the call,
        // and null offsets make the kernel use and advance the file positions.
        let n = unsafe {
            libc::splice(
                fd_in.as_raw_fd(),
                std::ptr::null_mut(),
                fd_out.as_raw_fd(),
                std::ptr::null_mut(),
                len,
                flags,
            )
        };
        if n >= 0 {
            return Ok(n as usize);
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::fcntl::OFlag;
    use rstest::rstest;
    use std::io::{Read, Seek, Write};
    use std::os::fd::AsFd;

    #[derive(Debug)]
    enum Expected {
        Progress(usize),
        WouldBlock,
        Fatal,
    }

    #[rstest]
    #[case::progress(Ok(7), Expected::Progress(7))]
    #[case::end_of_stream(Ok(0), Expected::Progress(0))]
    #[case::eagain(Err(libc::EAGAIN), Expected::WouldBlock)]
    #[case::einval(Err(libc::EINVAL), Expected::Fatal)]
    #[case::epipe(Err(libc::EPIPE), Expected::Fatal)]
    fn test_status_mapping(#[case] result: Result<usize, i32>, #[case] expected: Expected) {
        let status = SpliceStatus::from(result.map_err(io::Error::from_raw_os_error));
        match (status, expected) {
            (SpliceStatus::Progress(n), Expected::Progress(m)) => assert_eq!(n, m),
            (SpliceStatus::WouldBlock, Expected::WouldBlock)
            | (SpliceStatus::Fatal(_), Expected::Fatal) => {}
            (status, expected) => panic!("{status:?} does not map to {expected:?}"),
        }
    }

    #[test]
    fn test_flags_hint_more_data() {
        assert_ne!(flags(true) & libc::SPLICE_F_MORE, 0);
        assert_eq!(flags(false) & libc::SPLICE_F_MORE, 0);
        assert_ne!(flags(false) & libc::SPLICE_F_NONBLOCK, 0);
    }

    #[test]
    fn test_splice_file_through_pipe() {
        let mut source = tempfile::tempfile().unwrap();
        source.write_all(b"spliced bytes").unwrap();
        source.rewind().unwrap();

        let (read_end, write_end) = nix::unistd::pipe2(OFlag::O_CLOEXEC).unwrap();
        let moved = splice(source.as_fd(), write_end.as_fd(), 64, flags(false)).unwrap();
        assert_eq!(moved, 13);

        let mut sink = tempfile::tempfile().unwrap();
        let drained = splice(read_end.as_fd(), sink.as_fd(), moved, flags(false)).unwrap();
        assert_eq!(drained, 13);

        sink.rewind().unwrap();
        let mut contents = String::new();
        sink.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "spliced bytes");
    }

    #[test]
    fn test_empty_pipe_would_block() {
        let (read_end, _write_end) = nix::unistd::pipe2(OFlag::O_CLOEXEC).unwrap();
        let sink = tempfile::tempfile().unwrap();

        let status = SpliceStatus::from(splice(read_end.as_fd(), sink.as_fd(), 16, flags(false)));
        assert!(matches!(status, SpliceStatus::WouldBlock));
    }
}
