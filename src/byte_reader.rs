//! Byte-level reads over a sequence of byte chunks.
//!
//! A [`ByteReader`] pulls chunks from its upstream only when a read needs more
//! data than it has buffered. Buffered chunks are kept as they arrived; a
//! read concatenates only when its boundary spans chunks, and a chunk cut by a
//! boundary is split (without copying) so its tail stays buffered.
//!
//! Chunks handed out are [`Bytes`]: immutable and owned by the caller, so the
//! reader can never change them afterwards.
//!
//! # Ends and failures
//!
//! Exhaustion is not an error: reads report it as `Ok(None)` (nothing left) or
//! as a result shorter than requested. Reading an exhausted reader again gives
//! the same answer as the read that found it exhausted. An upstream failure
//! is returned to the read that hit it and then to every later read, even one
//! the buffer could satisfy: the reader is poisoned. Only
//! [`remainder`](ByteReader::remainder) still drains what was buffered.
//!
//! A reader serves one caller at a time; every read takes `&mut self`.

use crate::error::{Error, Result};
use crate::ids::Ids;
use crate::sequence::Sequence;
use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, trace};

static IDS: Ids = Ids::new();

pub struct ByteReader<S> {
    upstream: S,
    saved: VecDeque<Bytes>,
    size: usize,
    ended: bool,
    bytes_read: i64,
    failed: Option<Error>,
    id: u64,
}

impl<S> ByteReader<S>
where
    S: Sequence<Item = Bytes>,
{
    pub fn new(upstream: S) -> Self {
        Self {
            upstream,
            saved: VecDeque::new(),
            size: 0,
            ended: false,
            bytes_read: 0,
            failed: None,
            id: IDS.next_id(),
        }
    }

    /// Total bytes handed to callers, minus bytes pushed back with [`unread`](Self::unread).
    ///
    /// Goes negative when more is unread than was ever read, so an `unread`
    /// followed by a read of the same length always nets out to zero.
    pub fn bytes_read(&self) -> i64 {
        self.bytes_read
    }

    /// Bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.size
    }

    /// Whether the upstream has reported its end. Buffered bytes may remain.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Returns the upstream, discarding anything still buffered.
    pub fn into_inner(self) -> S {
        self.upstream
    }

    /// Reads `n` bytes, waiting for more data if needed.
    ///
    /// Returns fewer than `n` bytes if the upstream ended first, and `None`
    /// once nothing at all is left. A short result is how the end of data
    /// shows up; callers that need exact frames must treat it as an error
    /// themselves. `read(0)` never waits.
    pub async fn read(&mut self, n: usize) -> Result<Option<Bytes>> {
        self.check()?;
        self.fill_to(n).await?;
        if self.size == 0 {
            return Ok(None);
        }
        Ok(Some(self.split_off(n)))
    }

    /// Reads through the next occurrence of `byte`, inclusive.
    ///
    /// Returns `None` if the upstream ends before `byte` shows up; the data
    /// buffered so far stays available to [`remainder`](Self::remainder).
    pub async fn read_until(&mut self, byte: u8) -> Result<Option<Bytes>> {
        self.check()?;
        if let Some(index) = self.find(byte) {
            return Ok(Some(self.split_off(index + 1)));
        }

        loop {
            let before = self.size;
            if !self.fill().await? {
                return Ok(None);
            }
            // Earlier chunks were already searched.
            let found = self
                .saved
                .back()
                .filter(|_| self.size > before)
                .and_then(|chunk| chunk.iter().position(|b| *b == byte));
            if let Some(index) = found {
                return Ok(Some(self.split_off(before + index + 1)));
            }
        }
    }

    /// Reads through the end of a match found by `matcher`.
    ///
    /// `matcher` sees everything buffered, once up front and again each time
    /// a chunk arrives. It returns `None` for "no match yet" or the index just
    /// past the end of the match; everything before that index is returned and
    /// the rest stays buffered. Returns `None` if the upstream ends without a
    /// match.
    pub async fn read_until_match<F>(&mut self, mut matcher: F) -> Result<Option<Bytes>>
    where
        F: FnMut(&[u8]) -> Option<usize>,
    {
        self.check()?;
        loop {
            let buffer = self.coalesce();
            if let Some(end) = matcher(&buffer) {
                return Ok(Some(self.split_off(end.min(buffer.len()))));
            }
            if !self.fill().await? {
                return Ok(None);
            }
        }
    }

    /// Pushes `bytes` back onto the front of the buffer.
    ///
    /// The next read sees them first. `bytes_read` goes down by their length.
    pub fn unread(&mut self, bytes: Bytes) {
        if bytes.is_empty() {
            return;
        }
        self.size += bytes.len();
        self.bytes_read -= bytes.len() as i64;
        self.saved.push_front(bytes);
    }

    /// Drains whatever is buffered without waiting for more.
    ///
    /// `None` only means the buffer is empty, not that the upstream ended.
    pub fn remainder(&mut self) -> Option<Bytes> {
        if self.size == 0 {
            return None;
        }
        let n = self.size;
        Some(self.split_off(n))
    }

    /// Re-reports the failure that poisoned the reader, if any.
    fn check(&self) -> Result<()> {
        match &self.failed {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    /// Pulls one chunk. Returns false once the upstream has ended.
    async fn fill(&mut self) -> Result<bool> {
        self.check()?;
        if self.ended {
            return Ok(false);
        }

        let next = self.upstream.pull().await;
        match next {
            Ok(Some(chunk)) => {
                self.size += chunk.len();
                if !chunk.is_empty() {
                    self.saved.push_back(chunk);
                }
                trace!(reader = self.id, buffered = self.size, "buffered chunk");
                Ok(true)
            }
            Ok(None) => {
                trace!(reader = self.id, buffered = self.size, "upstream ended");
                self.ended = true;
                Ok(false)
            }
            Err(e) => {
                debug!(reader = self.id, error = %e, "upstream failed; reader poisoned");
                self.failed = Some(e.clone());
                Err(e)
            }
        }
    }

    async fn fill_to(&mut self, n: usize) -> Result<()> {
        while self.size < n {
            if !self.fill().await? {
                break;
            }
        }
        Ok(())
    }
}

impl<S> ByteReader<S> {
    /// Takes the first `n` buffered bytes (or all of them, if fewer).
    fn split_off(&mut self, n: usize) -> Bytes {
        let n = n.min(self.size);
        let out = match self.saved.front_mut() {
            Some(first) if first.len() > n => first.split_to(n),
            Some(first) if first.len() == n => {
                let whole = std::mem::take(first);
                self.saved.pop_front();
                whole
            }
            Some(_) => {
                let mut out = BytesMut::with_capacity(n);
                while out.len() < n {
                    let Some(chunk) = self.saved.front_mut() else {
                        break;
                    };
                    let wanted = n - out.len();
                    if chunk.len() <= wanted {
                        out.extend_from_slice(chunk);
                        self.saved.pop_front();
                    } else {
                        out.extend_from_slice(&chunk.split_to(wanted));
                    }
                }
                out.freeze()
            }
            None => Bytes::new(),
        };
        self.size -= out.len();
        self.bytes_read += out.len() as i64;
        out
    }

    /// Offset of the first `byte` across all buffered chunks.
    fn find(&self, byte: u8) -> Option<usize> {
        let mut offset = 0;
        for chunk in &self.saved {
            if let Some(index) = chunk.iter().position(|b| *b == byte) {
                return Some(offset + index);
            }
            offset += chunk.len();
        }
        None
    }

    /// Merges the buffer into one chunk and returns a handle to it.
    fn coalesce(&mut self) -> Bytes {
        if self.saved.len() > 1 {
            let mut merged = BytesMut::with_capacity(self.size);
            for chunk in self.saved.drain(..) {
                merged.extend_from_slice(&chunk);
            }
            self.saved.push_back(merged.freeze());
        }
        self.saved.front().cloned().unwrap_or_default()
    }
}

/// A byte reader is itself a chunk sequence: each pull hands out everything
/// buffered, or else the next upstream chunk.
impl<S> Sequence for ByteReader<S>
where
    S: Sequence<Item = Bytes>,
{
    type Item = Bytes;

    fn pull(&mut self) -> BoxFuture<'_, Result<Option<Bytes>>> {
        Box::pin(async move {
            self.check()?;
            loop {
                if let Some(buffered) = self.remainder() {
                    return Ok(Some(buffered));
                }
                if !self.fill().await? {
                    return Ok(None);
                }
            }
        })
    }
}

impl<S> fmt::Display for ByteReader<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ByteReader[{}](buffered={})", self.id, self.size)
    }
}

impl<S> fmt::Debug for ByteReader<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteReader")
            .field("id", &self.id)
            .field("chunks", &self.saved.len())
            .field("size", &self.size)
            .field("ended", &self.ended)
            .field("bytes_read", &self.bytes_read)
            .field("failed", &self.failed.is_some())
            .finish()
    }
}
