//! Line side of the bridge
//!
//! A [`LineInterface`] is whatever presents the byte stream to client
//! programs (a pty, an in-memory buffer). It is bound to a device's minor
//! index while a client holds the port open. The [`LinePort`] enforces the
//! single-opener admission policy and the flush-on-close semantics.

use crate::bridge::Bridge;
use crate::error::{Error, Result};
use crate::protocol::MSG_LEN;

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Sink for bytes received from the peer
pub trait LineInterface: Send + Sync {
    /// Push bytes to readers of the line
    fn deliver_bytes(&self, bytes: &[u8]);

    /// Drop inbound bytes that readers have not consumed yet
    fn flush(&self) {}
}

/// Mapping from minor index to the line currently attached to it
#[derive(Clone, Default)]
pub struct LineBindings {
    inner: Arc<RwLock<HashMap<u32, Arc<dyn LineInterface>>>>,
}

impl LineBindings {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Line attached to `minor`, if any
    pub fn get(&self, minor: u32) -> Option<Arc<dyn LineInterface>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&minor)
            .cloned()
    }

    /// Attach `line` to `minor`; fails if one is already attached
    pub fn bind(&self, minor: u32, line: Arc<dyn LineInterface>) -> Result<()> {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if map.contains_key(&minor) {
            return Err(Error::Busy("line already bound"));
        }
        map.insert(minor, line);
        Ok(())
    }

    /// Detach the line from `minor`, returning it
    pub fn unbind(&self, minor: u32) -> Option<Arc<dyn LineInterface>> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&minor)
    }
}

#[derive(Debug, Default)]
struct PortState {
    open: bool,
    /// Bumped on every open so a stale handle cannot close a newer session
    session: u64,
    removed: bool,
}

/// Line port of one device
pub struct LinePort {
    minor: u32,
    bridge: Arc<Bridge>,
    lines: LineBindings,
    state: Mutex<PortState>,
    wait: Condvar,
}

impl LinePort {
    pub(crate) fn new(minor: u32, bridge: Arc<Bridge>, lines: LineBindings) -> Self {
        Self {
            minor,
            bridge,
            lines,
            state: Mutex::new(PortState::default()),
            wait: Condvar::new(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, PortState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Minor index of this port
    pub fn minor(&self) -> u32 {
        self.minor
    }

    /// Whether a client currently holds the port
    pub fn is_open(&self) -> bool {
        self.lock_state().open
    }

    /// Open the port, attaching `line` as the receiver of peer data
    ///
    /// Fails with [`Error::Busy`] if another client holds it.
    pub fn open(self: &Arc<Self>, line: Arc<dyn LineInterface>) -> Result<LineHandle> {
        let mut state = self.lock_state();
        self.open_locked(&mut state, line)
    }

    /// Open the port, waiting up to `timeout` for the current holder to close
    pub fn open_wait(
        self: &Arc<Self>,
        line: Arc<dyn LineInterface>,
        timeout: Duration,
    ) -> Result<LineHandle> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock_state();
        while state.open && !state.removed {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .ok_or(Error::Busy("line already open"))?;
            state = self
                .wait
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        self.open_locked(&mut state, line)
    }

    fn open_locked(
        self: &Arc<Self>,
        state: &mut PortState,
        line: Arc<dyn LineInterface>,
    ) -> Result<LineHandle> {
        if state.removed {
            return Err(Error::Removed);
        }
        if state.open {
            return Err(Error::Busy("line already open"));
        }
        self.lines.bind(self.minor, line)?;
        state.open = true;
        state.session += 1;
        log::debug!("line: opened minor {} (session {})", self.minor, state.session);
        Ok(LineHandle {
            port: Arc::clone(self),
            session: state.session,
        })
    }

    fn release(&self, session: u64) {
        let mut state = self.lock_state();
        if !state.open || state.session != session {
            return;
        }
        if let Some(line) = self.lines.unbind(self.minor) {
            // Wait out a poll that may still be delivering to this line.
            self.bridge.quiesce();
            line.flush();
        }
        state.open = false;
        log::debug!("line: closed minor {} (session {})", self.minor, session);
        drop(state);
        self.wait.notify_all();
    }

    /// Detach any line and refuse further opens
    pub(crate) fn shut_down(&self) {
        let mut state = self.lock_state();
        state.removed = true;
        if state.open {
            self.lines.unbind(self.minor);
            state.open = false;
        }
        drop(state);
        self.wait.notify_all();
    }
}

/// An open session on a [`LinePort`]
///
/// Dropping the handle closes the session.
pub struct LineHandle {
    port: Arc<LinePort>,
    session: u64,
}

impl LineHandle {
    /// Send bytes to the peer
    ///
    /// At most [`MSG_LEN`] bytes go out per call; the return value is the
    /// number actually clocked. A failed exchange still reports its length.
    pub fn write(&self, bytes: &[u8]) -> Result<usize> {
        Ok(self.port.bridge.write(bytes)?.len())
    }

    /// Advertised write capacity
    ///
    /// A constant, not a live high-water mark.
    pub fn write_room(&self) -> usize {
        MSG_LEN
    }

    /// Modem control lines; the link has none
    pub fn dtr_rts(&self, on: bool) {
        log::trace!("line: dtr_rts({}) ignored", on);
    }

    /// Minor index of the port
    pub fn minor(&self) -> u32 {
        self.port.minor
    }

    /// Close the session, flushing undelivered inbound data
    pub fn close(self) {}
}

impl Drop for LineHandle {
    fn drop(&mut self) {
        self.port.release(self.session);
    }
}
