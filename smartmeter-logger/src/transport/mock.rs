//! Mock transport for testing

use super::Transport;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Scripted byte source
///
/// Each injected chunk is returned by exactly one `read` (split further only
/// if the caller's buffer is smaller). With nothing queued a read times out
/// (`Ok(0)`), or fails with [`Error::Disconnected`] once closed.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

struct MockTransportInner {
    chunks: VecDeque<Vec<u8>>,
    closed: bool,
    reads: usize,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        MockTransport {
            inner: Arc::new(Mutex::new(MockTransportInner {
                chunks: VecDeque::new(),
                closed: false,
                reads: 0,
            })),
        }
    }

    /// Queue one chunk to be read
    pub fn inject_read(&self, data: &[u8]) {
        self.inner.lock().chunks.push_back(data.to_vec());
    }

    /// Report end of stream after the queued chunks
    pub fn close(&self) {
        self.inner.lock().closed = true;
    }

    /// Number of chunks not yet read
    pub fn pending(&self) -> usize {
        self.inner.lock().chunks.len()
    }

    /// Number of `read` calls made so far
    pub fn reads(&self) -> usize {
        self.inner.lock().reads
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        inner.reads += 1;

        let Some(mut chunk) = inner.chunks.pop_front() else {
            return if inner.closed {
                Err(Error::Disconnected)
            } else {
                Ok(0)
            };
        };

        let n = chunk.len().min(buffer.len());
        buffer[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            inner.chunks.push_front(chunk.split_off(n));
        }
        Ok(n)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}
