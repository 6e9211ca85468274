use std::cell::{Cell, RefCell};
use std::io::{self, Read, Write};
use std::rc::Rc;

use shmrpc_memory::{Blob, BufferPool, ConstBlob, ConstBuffer, MemoryError, SharedMemory};

use crate::error::{CodecError, Result};

/// Chunk size used for inline writes when no larger threshold is configured.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Writer that assembles a [`ConstBuffer`] from pooled blobs.
///
/// Byte ranges that already live in the pool's segment and are at least
/// `min_blob_size` long are appended by reference. Everything else is copied
/// into chunks of `max(min_blob_size, 4096)` bytes.
pub struct OutputStream<'a> {
    pool: &'a BufferPool,
    min_blob_size: usize,
    chunk_size: usize,
    current: Option<Blob>,
    buffer: ConstBuffer,
    error: Option<MemoryError>,
}

impl<'a> OutputStream<'a> {
    pub fn new(pool: &'a BufferPool, min_blob_size: usize) -> Self {
        Self {
            pool,
            min_blob_size,
            chunk_size: min_blob_size.max(DEFAULT_CHUNK_SIZE),
            current: None,
            buffer: ConstBuffer::new(),
            error: None,
        }
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buffer.len() + self.current.as_ref().map_or(0, |blob| blob.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocation failure recorded by a previous write, if any.
    pub fn take_error(&mut self) -> Option<MemoryError> {
        self.error.take()
    }

    /// Seal the stream and return the assembled buffer.
    pub fn finish(mut self) -> ConstBuffer {
        self.seal_current();
        self.buffer
    }

    fn seal_current(&mut self) {
        if let Some(blob) = self.current.take() {
            self.buffer.push(blob.freeze());
        }
    }

    fn writable_blob(&mut self) -> io::Result<&mut Blob> {
        let blob = match self.current.take() {
            Some(blob) if blob.remaining() > 0 => blob,
            full => {
                if let Some(full) = full {
                    self.buffer.push(full.freeze());
                }
                self.take_chunk()?
            }
        };
        Ok(self.current.insert(blob))
    }

    fn take_chunk(&mut self) -> io::Result<Blob> {
        self.pool.take_blob(self.chunk_size).map_err(|err| {
            let io_err = io::Error::new(io::ErrorKind::OutOfMemory, err.to_string());
            self.error = Some(err);
            io_err
        })
    }
}

impl Write for OutputStream<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if buf.len() >= self.min_blob_size {
            if let Some(view) = self.pool.memory().locate(buf) {
                self.seal_current();
                self.buffer.push(view);
                return Ok(buf.len());
            }
        }

        let mut written = 0;
        while written < buf.len() {
            written += self.writable_blob()?.append(&buf[written..]);
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

thread_local! {
    static ACTIVE_INPUT: RefCell<Option<Rc<InputSource>>> = const { RefCell::new(None) };
}

/// Blobs of the buffer being read and the absolute read position.
struct InputSource {
    blobs: Vec<ConstBlob>,
    position: Cell<usize>,
}

impl InputSource {
    /// View of the `len` bytes that end at the read position, if they lie
    /// within a single blob.
    fn view_before(&self, len: usize) -> Option<ConstBlob> {
        let end = self.position.get();
        let start = end.checked_sub(len)?;
        if len == 0 {
            return None;
        }

        let mut blob_start = 0;
        for blob in &self.blobs {
            let blob_end = blob_start + blob.len();
            if start >= blob_start && end <= blob_end {
                return Some(blob.slice(start - blob_start..end - blob_start));
            }
            if blob_end > start {
                return None;
            }
            blob_start = blob_end;
        }
        None
    }
}

/// Reader over the blobs of a [`ConstBuffer`].
///
/// While [activated](Self::activate), byte strings read into
/// [`Blob`](crate::Blob) fields that lie within one blob of the buffer are
/// returned as views sharing that blob's lease. Ranges spanning blobs are
/// copied.
pub struct InputStream {
    source: Rc<InputSource>,
    index: usize,
    offset: usize,
}

impl InputStream {
    /// Open a stream over `buffer`.
    ///
    /// Fails if any leased blob of the buffer belongs to a segment other
    /// than `memory`. Detached blobs are accepted.
    pub fn new(buffer: &ConstBuffer, memory: &SharedMemory) -> Result<Self> {
        if let Some(index) = buffer
            .blobs()
            .iter()
            .position(|blob| !blob.is_detached() && !blob.is_in(memory))
        {
            return Err(CodecError::ForeignBlob { index });
        }

        Ok(Self {
            source: Rc::new(InputSource {
                blobs: buffer.blobs().to_vec(),
                position: Cell::new(0),
            }),
            index: 0,
            offset: 0,
        })
    }

    /// Bytes read so far.
    pub fn position(&self) -> usize {
        self.source.position.get()
    }

    /// Resolve `Blob` fields decoded on this thread against this stream
    /// until the returned guard is dropped.
    #[must_use = "blob fields resolve against the stream only while the guard lives"]
    pub fn activate(&self) -> ActiveInput {
        let previous = ACTIVE_INPUT.with(|slot| slot.replace(Some(self.source.clone())));
        ActiveInput { previous }
    }
}

impl Read for InputStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut read = 0;
        while read < buf.len() {
            let Some(blob) = self.source.blobs.get(self.index) else {
                break;
            };
            let available = &blob[self.offset..];
            let n = available.len().min(buf.len() - read);
            buf[read..read + n].copy_from_slice(&available[..n]);
            read += n;
            self.offset += n;
            if self.offset == blob.len() {
                self.index += 1;
                self.offset = 0;
            }
        }
        self.source.position.set(self.source.position.get() + read);
        Ok(read)
    }
}

/// Guard returned by [`InputStream::activate`]; restores the previously
/// active stream when dropped.
pub struct ActiveInput {
    previous: Option<Rc<InputSource>>,
}

impl Drop for ActiveInput {
    fn drop(&mut self) {
        let previous = self.previous.take();
        ACTIVE_INPUT.with(|slot| *slot.borrow_mut() = previous);
    }
}

/// View of the `len` bytes the active input stream just produced.
pub(crate) fn view_of_last_read(len: usize) -> Option<ConstBlob> {
    ACTIVE_INPUT.with(|slot| {
        slot.borrow()
            .as_ref()
            .and_then(|source| source.view_before(len))
    })
}
