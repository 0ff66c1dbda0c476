//! Control channel reporting boot progress
//!
//! Each message is a single byte holding the boot progress in percent.
//! Progress 100 requests the animation to stop.

use crate::{Error, Result};
use log::{debug, warn};
use std::ffi::CString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Read};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

pub struct ControlChannel {
    source: File,
    /// FIFO created by this channel, removed again on drop
    fifo_path: Option<PathBuf>,
}

impl ControlChannel {
    /// Creates a FIFO at `path` and opens it for reading
    ///
    /// A leftover file at `path` is removed first. The FIFO is opened
    /// read-write so it never reports end of file once a writer is gone.
    pub fn create_fifo(path: &Path) -> Result<Self> {
        match fs::remove_file(path) {
            Ok(()) => debug!("removed leftover {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("could not remove leftover {}: {}", path.display(), e),
        }

        let fifo_error = |source| Error::Fifo {
            path: path.to_path_buf(),
            source,
        };

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| fifo_error(io::Error::new(ErrorKind::InvalidInput, e)))?;
        if unsafe { libc::mkfifo(c_path.as_ptr(), 0o666) } == -1 {
            return Err(fifo_error(io::Error::last_os_error()));
        }

        let source = match OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
        {
            Ok(file) => file,
            Err(e) => {
                let _ = fs::remove_file(path);
                return Err(fifo_error(e));
            }
        };

        debug!("listening for progress on {}", path.display());

        Ok(Self {
            source,
            fifo_path: Some(path.to_path_buf()),
        })
    }

    /// Wraps an already open descriptor, e.g. one end of a socket pair
    ///
    /// The descriptor is switched to non-blocking mode.
    pub fn from_fd(fd: OwnedFd) -> Result<Self> {
        let flags = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFL) };
        if flags == -1 || unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFL, flags | libc::O_NONBLOCK) } == -1 {
            return Err(io::Error::last_os_error().into());
        }

        Ok(Self {
            source: File::from(fd),
            fifo_path: None,
        })
    }

    /// Reads the next progress message, if one is pending
    ///
    /// Values above 100 are clamped to 100. Returns `Ok(None)` when nothing
    /// can be read right now and `Error::ControlClosed` once every writer is
    /// gone, which cannot happen for a FIFO created by this channel.
    pub fn read_progress(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.source.read(&mut byte) {
            Ok(0) => Err(Error::ControlClosed),
            Ok(_) => {
                let progress = byte[0];
                if progress > 100 {
                    warn!("progress {} out of range, using 100", progress);
                    Ok(Some(100))
                } else {
                    Ok(Some(progress))
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn fifo_path(&self) -> Option<&Path> {
        self.fifo_path.as_deref()
    }
}

impl AsRawFd for ControlChannel {
    fn as_raw_fd(&self) -> RawFd {
        self.source.as_raw_fd()
    }
}

impl Drop for ControlChannel {
    fn drop(&mut self) {
        if let Some(path) = &self.fifo_path {
            if let Err(e) = fs::remove_file(path) {
                warn!("could not remove {}: {}", path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::FileTypeExt;
    use std::os::unix::net::UnixStream;

    #[test]
    fn test_fifo_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("easysplash_fifo");
        fs::write(&path, b"leftover").unwrap();

        let mut channel = ControlChannel::create_fifo(&path).unwrap();
        assert!(fs::metadata(&path).unwrap().file_type().is_fifo());
        assert_eq!(channel.read_progress().unwrap(), None);

        let mut writer = OpenOptions::new().write(true).open(&path).unwrap();
        writer.write_all(&[42]).unwrap();
        drop(writer);

        assert_eq!(channel.read_progress().unwrap(), Some(42));
        assert_eq!(channel.read_progress().unwrap(), None);

        drop(channel);
        assert!(!path.exists());
    }

    #[test]
    fn test_progress_is_clamped() {
        let (reader, mut writer) = UnixStream::pair().unwrap();
        let mut channel = ControlChannel::from_fd(OwnedFd::from(reader)).unwrap();

        writer.write_all(&[100, 200]).unwrap();
        assert_eq!(channel.read_progress().unwrap(), Some(100));
        assert_eq!(channel.read_progress().unwrap(), Some(100));
        assert_eq!(channel.read_progress().unwrap(), None);
        assert!(channel.fifo_path().is_none());
    }

    #[test]
    fn test_closed_writer() {
        let (reader, writer) = UnixStream::pair().unwrap();
        let mut channel = ControlChannel::from_fd(OwnedFd::from(reader)).unwrap();
        drop(writer);

        assert!(matches!(channel.read_progress(), Err(Error::ControlClosed)));
    }

    #[test]
    fn test_fifo_in_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("fifo");

        assert!(matches!(
            ControlChannel::create_fifo(&path),
            Err(Error::Fifo { .. })
        ));
    }
}
