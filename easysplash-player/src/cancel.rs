//! Cancellation of a running event loop
//!
//! A [`CancelToken`] wraps a descriptor that becomes readable once
//! cancellation is requested, so the event loop can wait on it together
//! with the control channel.

use crate::Result;
use log::debug;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::ptr;

enum Source {
    /// `signalfd` for SIGINT, with the signal mask to restore
    Interrupt { previous_mask: libc::sigset_t },
    Pipe,
}

pub struct CancelToken {
    fd: OwnedFd,
    source: Source,
}

/// Write end of a pipe-backed [`CancelToken`]
///
/// Dropping the trigger also cancels the token.
pub struct CancelTrigger {
    fd: OwnedFd,
}

impl CancelToken {
    /// Creates a token that fires when the process receives SIGINT
    ///
    /// SIGINT is blocked for the calling thread and delivered through a
    /// `signalfd` instead; the previous mask is restored on drop. Call this
    /// before spawning threads so they inherit the mask.
    pub fn sigint() -> Result<Self> {
        unsafe {
            let mut mask: libc::sigset_t = mem::zeroed();
            libc::sigemptyset(&mut mask);
            libc::sigaddset(&mut mask, libc::SIGINT);

            let mut previous_mask: libc::sigset_t = mem::zeroed();
            let ret = libc::pthread_sigmask(libc::SIG_BLOCK, &mask, &mut previous_mask);
            if ret != 0 {
                return Err(io::Error::from_raw_os_error(ret).into());
            }

            let fd = libc::signalfd(-1, &mask, libc::SFD_NONBLOCK | libc::SFD_CLOEXEC);
            if fd == -1 {
                let err = io::Error::last_os_error();
                libc::pthread_sigmask(libc::SIG_SETMASK, &previous_mask, ptr::null_mut());
                return Err(err.into());
            }

            debug!("SIGINT redirected to signalfd {}", fd);

            Ok(Self {
                fd: OwnedFd::from_raw_fd(fd),
                source: Source::Interrupt { previous_mask },
            })
        }
    }

    /// Creates a token fired programmatically through the returned trigger
    pub fn pipe() -> Result<(Self, CancelTrigger)> {
        let mut fds = [0 as RawFd; 2];
        if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_NONBLOCK | libc::O_CLOEXEC) } == -1 {
            return Err(io::Error::last_os_error().into());
        }

        let (read_end, write_end) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };

        Ok((
            Self {
                fd: read_end,
                source: Source::Pipe,
            },
            CancelTrigger { fd: write_end },
        ))
    }

    /// Discards pending cancellation notifications
    fn drain(&self) {
        // large enough for one signalfd_siginfo
        let mut buf = [0u8; 128];
        loop {
            let n = unsafe { libc::read(self.fd.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
            if n <= 0 {
                break;
            }
        }
    }
}

impl AsRawFd for CancelToken {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl Drop for CancelToken {
    fn drop(&mut self) {
        if let Source::Interrupt { previous_mask } = &self.source {
            // a consumed SIGINT must not be delivered again once unblocked
            self.drain();
            unsafe {
                libc::pthread_sigmask(libc::SIG_SETMASK, previous_mask, ptr::null_mut());
            }
        }
    }
}

impl CancelTrigger {
    /// Requests cancellation; repeated calls are harmless
    pub fn cancel(&self) -> Result<()> {
        let n = unsafe { libc::write(self.fd.as_raw_fd(), b"1".as_ptr().cast(), 1) };
        if n == -1 {
            let err = io::Error::last_os_error();
            // a full pipe already reads as cancelled
            if err.kind() != io::ErrorKind::WouldBlock {
                return Err(err.into());
            }
        }
        Ok(())
    }
}
