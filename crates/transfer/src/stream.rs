use std::future::Future;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use uplink_protocol::BodySource;

use crate::{ChunkReader, DEFAULT_CHUNK_SIZE, TransferError};

/// An opened content handle, read chunk by chunk.
pub struct ContentStream {
    inner: Inner,
}

enum Inner {
    /// The reader is moved into a blocking task for every read; `None` only
    /// while such a read is in flight or after a failed one.
    File {
        reader: Option<ChunkReader>,
        size: u64,
    },
    Memory {
        data: Bytes,
        offset: usize,
        chunk_size: usize,
    },
}

impl ContentStream {
    pub(crate) fn from_file(reader: ChunkReader) -> Self {
        let size = reader.file_size();
        Self {
            inner: Inner::File {
                reader: Some(reader),
                size,
            },
        }
    }

    /// Streams an in-memory region in `chunk_size` slices (0 = default).
    pub fn from_bytes(data: Bytes, chunk_size: usize) -> Self {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Self {
            inner: Inner::Memory {
                data,
                offset: 0,
                chunk_size,
            },
        }
    }

    /// Total size of the content.
    pub fn size(&self) -> u64 {
        match &self.inner {
            Inner::File { size, .. } => *size,
            Inner::Memory { data, .. } => data.len() as u64,
        }
    }

    /// Bytes not yet returned by [`next_chunk`](Self::next_chunk).
    pub fn remaining(&self) -> u64 {
        match &self.inner {
            Inner::File { reader, .. } => reader.as_ref().map_or(0, ChunkReader::remaining),
            Inner::Memory { data, offset, .. } => (data.len() - offset) as u64,
        }
    }

    /// Repositions the stream so the next chunk starts at `offset`.
    pub async fn seek_to(&mut self, offset: u64) -> Result<(), TransferError> {
        match &mut self.inner {
            Inner::File { reader, .. } => {
                let mut r = reader.take().ok_or(TransferError::Closed)?;
                let (r, result) = tokio::task::spawn_blocking(move || {
                    let result = r.seek_to(offset);
                    (r, result)
                })
                .await?;
                *reader = Some(r);
                result
            }
            Inner::Memory {
                data,
                offset: current,
                ..
            } => {
                *current = std::cmp::min(offset as usize, data.len());
                Ok(())
            }
        }
    }

    /// Returns the next chunk, or `None` at the end of the content.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, TransferError> {
        match &mut self.inner {
            Inner::File { reader, .. } => {
                let mut r = reader.take().ok_or(TransferError::Closed)?;
                let (r, result) = tokio::task::spawn_blocking(move || {
                    let result = r.next_chunk();
                    (r, result)
                })
                .await?;
                *reader = Some(r);
                result
            }
            Inner::Memory {
                data,
                offset,
                chunk_size,
            } => {
                if *offset >= data.len() {
                    return Ok(None);
                }
                let end = std::cmp::min(*offset + *chunk_size, data.len());
                let chunk = data.slice(*offset..end);
                *offset = end;
                Ok(Some(chunk))
            }
        }
    }

    /// Drains the rest of the stream into one buffer.
    pub async fn read_to_end(&mut self) -> Result<Bytes, TransferError> {
        let mut buf = BytesMut::with_capacity(self.remaining() as usize);
        while let Some(chunk) = self.next_chunk().await? {
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }
}

impl BodySource for ContentStream {
    fn size(&self) -> u64 {
        ContentStream::size(self)
    }

    fn next_chunk(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = std::io::Result<Option<Bytes>>> + Send + '_>> {
        Box::pin(async move { ContentStream::next_chunk(self).await.map_err(Into::into) })
    }
}
