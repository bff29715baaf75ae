//! Adapters from tokio I/O to sequences.

use crate::byte_reader::ByteReader;
use crate::error::{Error, Result};
use crate::sequence::Sequence;
use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

/// Read size used by [`ReadChunks::new`].
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// A sequence of byte chunks read from an `AsyncRead`.
///
/// Each pull performs one read of up to `chunk_size` bytes; the chunk is as
/// large as that read returned. End of file ends the sequence. A read error is
/// reported as [`Error::Io`] and repeated on every later pull.
#[derive(Debug)]
pub struct ReadChunks<R> {
    reader: R,
    chunk_size: usize,
    eof: bool,
    failed: Option<Error>,
}

impl<R> ReadChunks<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self::with_chunk_size(reader, DEFAULT_CHUNK_SIZE)
    }

    /// # Panics
    ///
    /// Panics if `chunk_size` is zero.
    pub fn with_chunk_size(reader: R, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        Self {
            reader,
            chunk_size,
            eof: false,
            failed: None,
        }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R> Sequence for ReadChunks<R>
where
    R: AsyncRead + Unpin + Send,
{
    type Item = Bytes;

    fn pull(&mut self) -> BoxFuture<'_, Result<Option<Bytes>>> {
        Box::pin(async move {
            if let Some(e) = &self.failed {
                return Err(e.clone());
            }
            if self.eof {
                return Ok(None);
            }

            let mut buf = BytesMut::with_capacity(self.chunk_size);
            match self.reader.read_buf(&mut buf).await {
                Ok(0) => {
                    trace!("transport reached eof");
                    self.eof = true;
                    Ok(None)
                }
                Ok(n) => {
                    trace!(bytes = n, "transport read");
                    Ok(Some(buf.freeze()))
                }
                Err(e) => {
                    debug!(error = %e, "transport read failed");
                    let e = Error::from(e);
                    self.failed = Some(e.clone());
                    Err(e)
                }
            }
        })
    }
}

/// Builds a [`ByteReader`] directly over an `AsyncRead`.
pub fn byte_reader<R>(reader: R) -> ByteReader<ReadChunks<R>>
where
    R: AsyncRead + Unpin + Send,
{
    ByteReader::new(ReadChunks::new(reader))
}
