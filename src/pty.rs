//! Pseudo-terminal front end
//!
//! The daemon exposes the bridge as the slave side of a pty. Bytes the
//! peer sends are written to the master; bytes applications write to the
//! slave are read from the master and sent to the peer.

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::pty::openpty;
use nix::sys::termios::{self, FlushArg, SetArg};
use spitty_core::{LineHandle, LineInterface};
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Pty setup errors
#[derive(Debug, Error)]
pub enum PtyError {
    /// openpty(3) failed
    #[error("Failed to allocate pty: {0}")]
    Open(#[source] nix::Error),

    /// The master could not be made non-blocking
    #[error("Failed to configure pty master: {0}")]
    Fcntl(#[source] nix::Error),

    /// Terminal attributes could not be applied
    #[error("Failed to set raw mode: {0}")]
    RawMode(#[source] nix::Error),

    /// The slave has no resolvable path
    #[error("Failed to resolve pty slave path: {0}")]
    SlavePath(#[source] io::Error),

    /// The symlink could not be created
    #[error("Failed to create link {path}: {source}")]
    Link {
        /// Requested link path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Existing file at the link path is not a symlink
    #[error("Refusing to replace {0}: not a symlink")]
    LinkOccupied(PathBuf),
}

/// Master side of a pty, fed by the bridge
pub struct PtyLine {
    master: Mutex<File>,
    // Held open so the master never sees a hangup between clients.
    slave: OwnedFd,
    path: PathBuf,
}

impl PtyLine {
    /// Allocate a pty and put it in raw mode
    pub fn open() -> Result<Self, PtyError> {
        let pty = openpty(None, None).map_err(PtyError::Open)?;

        let mut attrs = termios::tcgetattr(&pty.slave).map_err(PtyError::RawMode)?;
        termios::cfmakeraw(&mut attrs);
        termios::tcsetattr(&pty.slave, SetArg::TCSANOW, &attrs).map_err(PtyError::RawMode)?;

        // A client that stops reading must not stall the poller.
        let flags = fcntl(pty.master.as_raw_fd(), FcntlArg::F_GETFL).map_err(PtyError::Fcntl)?;
        fcntl(
            pty.master.as_raw_fd(),
            FcntlArg::F_SETFL(OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK),
        )
        .map_err(PtyError::Fcntl)?;

        let path = std::fs::read_link(format!("/proc/self/fd/{}", pty.slave.as_raw_fd()))
            .map_err(PtyError::SlavePath)?;

        log::debug!("pty: allocated {}", path.display());

        Ok(Self {
            master: Mutex::new(File::from(pty.master)),
            slave: pty.slave,
            path,
        })
    }

    /// Path of the slave device
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Independent handle on the master for the reader thread
    fn reader(&self) -> io::Result<File> {
        self.master
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .try_clone()
    }
}

impl LineInterface for PtyLine {
    fn deliver_bytes(&self, bytes: &[u8]) {
        let mut master = self
            .master
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Err(e) = master.write_all(bytes) {
            log::warn!("pty: dropped {} bytes: {}", bytes.len(), e);
        }
    }

    fn flush(&self) {
        if let Err(e) = termios::tcflush(&self.slave, FlushArg::TCIFLUSH) {
            log::debug!("pty: flush failed: {}", e);
        }
    }
}

/// Forward bytes written to the slave until the session ends
///
/// Each chunk is at most the handle's write room; partial sends are
/// retried with the remainder.
pub fn pump(line: &PtyLine, handle: &LineHandle) -> Result<(), Box<dyn std::error::Error>> {
    let mut master = line.reader()?;
    let mut buf = vec![0u8; handle.write_room()];

    loop {
        {
            let mut fds = [PollFd::new(master.as_fd(), PollFlags::POLLIN)];
            match poll(&mut fds, PollTimeout::NONE) {
                Ok(_) | Err(nix::errno::Errno::EINTR) => {}
                Err(e) => return Err(e.into()),
            }
        }

        let n = match master.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
                ) =>
            {
                continue
            }
            Err(e) => return Err(e.into()),
        };

        let mut pending = &buf[..n];
        while !pending.is_empty() {
            let sent = handle.write(pending)?;
            log::trace!("pty: sent {} of {} bytes", sent, pending.len());
            if sent == 0 {
                break;
            }
            pending = &pending[sent..];
        }
    }
}

/// Symlink pointing at the pty slave, removed on drop
pub struct PtyLink {
    path: PathBuf,
}

impl PtyLink {
    /// Create `path` pointing at `target`, replacing a stale symlink
    pub fn create(path: &Path, target: &Path) -> Result<Self, PtyError> {
        match std::fs::symlink_metadata(path) {
            Ok(meta) if meta.file_type().is_symlink() => {
                std::fs::remove_file(path).map_err(|source| PtyError::Link {
                    path: path.to_path_buf(),
                    source,
                })?;
            }
            Ok(_) => return Err(PtyError::LinkOccupied(path.to_path_buf())),
            Err(_) => {}
        }

        std::os::unix::fs::symlink(target, path).map_err(|source| PtyError::Link {
            path: path.to_path_buf(),
            source,
        })?;

        log::info!("Linked {} -> {}", path.display(), target.display());
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for PtyLink {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            log::debug!("pty: failed to remove {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;

    #[test]
    fn test_delivered_bytes_reach_slave() {
        let line = PtyLine::open().unwrap();
        let mut slave = OpenOptions::new()
            .read(true)
            .write(true)
            .open(line.path())
            .unwrap();

        line.deliver_bytes(b"hi\n");

        let mut buf = [0u8; 3];
        slave.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hi\n");
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_slave_writes_reach_peer_in_chunks() {
        use spitty_core::protocol::MSG_LEN;
        use spitty_core::{BridgeConfig, DeviceManager, NoInterrupt, Peer};
        use spitty_dummy::DummyPeer;
        use std::sync::Arc;
        use std::time::{Duration, Instant};

        let peer = DummyPeer::new_default();
        let manager = DeviceManager::new(BridgeConfig::new()).unwrap();
        let device = manager
            .probe(Peer::new(
                "atmega32u4",
                Box::new(peer.clone()),
                Box::new(NoInterrupt),
            ))
            .unwrap();
        let line = Arc::new(PtyLine::open().unwrap());
        let handle = device.open(line.clone()).unwrap();

        let pump_line = Arc::clone(&line);
        std::thread::spawn(move || {
            let _ = pump(&pump_line, &handle);
        });

        let msg: Vec<u8> = (0..150u32).map(|i| b'a' + (i % 26) as u8).collect();
        let mut slave = OpenOptions::new()
            .read(true)
            .write(true)
            .open(line.path())
            .unwrap();
        slave.write_all(&msg).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while peer.received().len() < msg.len() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(peer.received(), msg);

        let writes: Vec<_> = peer
            .transfers()
            .into_iter()
            .filter(|t| !t.is_poll())
            .collect();
        assert!(writes.len() >= 3);
        assert!(writes.iter().all(|t| t.tx.len() <= MSG_LEN));
    }

    #[test]
    fn test_link_replaces_stale_symlink() {
        let dir = std::env::temp_dir().join(format!("spitty-link-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let link = dir.join("tty");
        std::os::unix::fs::symlink("/nonexistent", &link).unwrap();

        {
            let _link = PtyLink::create(&link, Path::new("/dev/null")).unwrap();
            assert_eq!(std::fs::read_link(&link).unwrap(), Path::new("/dev/null"));
        }
        assert!(std::fs::symlink_metadata(&link).is_err());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_link_refuses_regular_file() {
        let dir = std::env::temp_dir().join(format!("spitty-file-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tty");
        std::fs::write(&path, b"keep").unwrap();

        let err = PtyLink::create(&path, Path::new("/dev/null")).err().unwrap();
        assert!(matches!(err, PtyError::LinkOccupied(_)));
        assert_eq!(std::fs::read(&path).unwrap(), b"keep");

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
