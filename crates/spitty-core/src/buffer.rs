//! In-memory line with a blocking reader

use crate::line::LineInterface;

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A [`LineInterface`] that queues delivered bytes for a reader
#[derive(Debug, Default)]
pub struct BufferedLine {
    queue: Mutex<VecDeque<u8>>,
    ready: Condvar,
}

impl BufferedLine {
    /// Create an empty line
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<u8>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of queued bytes
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Take everything queued so far
    pub fn take(&self) -> Vec<u8> {
        self.lock().drain(..).collect()
    }

    /// Read into `buf`, waiting up to `timeout` for at least one byte
    ///
    /// Returns the number of bytes read, 0 on timeout.
    pub fn read(&self, buf: &mut [u8], timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut queue = self.lock();
        while queue.is_empty() {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return 0;
            };
            queue = self
                .ready
                .wait_timeout(queue, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        let n = buf.len().min(queue.len());
        for (slot, byte) in buf.iter_mut().zip(queue.drain(..n)) {
            *slot = byte;
        }
        n
    }
}

impl LineInterface for BufferedLine {
    fn deliver_bytes(&self, bytes: &[u8]) {
        self.lock().extend(bytes.iter().copied());
        self.ready.notify_all();
    }

    fn flush(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_delivered() {
        let line = BufferedLine::new();
        line.deliver_bytes(b"hello");
        let mut buf = [0u8; 3];
        assert_eq!(line.read(&mut buf, Duration::from_millis(10)), 3);
        assert_eq!(&buf, b"hel");
        assert_eq!(line.take(), b"lo".to_vec());
    }

    #[test]
    fn test_read_timeout() {
        let line = BufferedLine::new();
        let mut buf = [0u8; 4];
        assert_eq!(line.read(&mut buf, Duration::from_millis(5)), 0);
    }

    #[test]
    fn test_flush_clears() {
        let line = BufferedLine::new();
        line.deliver_bytes(b"stale");
        line.flush();
        assert!(line.is_empty());
    }

    #[test]
    fn test_reader_woken_by_delivery() {
        let line = std::sync::Arc::new(BufferedLine::new());
        let writer = std::sync::Arc::clone(&line);
        let t = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            writer.deliver_bytes(b"x");
        });
        let mut buf = [0u8; 1];
        assert_eq!(line.read(&mut buf, Duration::from_secs(5)), 1);
        assert_eq!(buf[0], b'x');
        t.join().unwrap();
    }
}
