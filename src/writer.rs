//! Buffer writer and the sink contract it writes through.
//!
//! A [`BufferWriter`] keeps a local window of uncommitted bytes. Writes land in the window and
//! only become visible to the sink on [`BufferWriter::commit`]. When a request does not fit the
//! current window, the writer commits what it has and asks the sink for a fresh one.

use crate::pool::{SegmentPool, DEFAULT_SEGMENT_SIZE};
use crate::scalar::{self, Endian, Scalar, MAX_SCALAR_SIZE};
use crate::tags::COUNT_LENGTH;
use crate::{CapacityError, Result};
use bytes::buf::UninitSlice;
use bytes::{BufMut, Bytes, BytesMut};

/// A growable destination for encoded bytes.
///
/// Until `commit` is called, repeated calls to `writable_window` must return windows that start
/// at the same position, and must not discard bytes written into an earlier window.
pub trait ByteSink {
    /// Returns a window of at least `min_size` writable bytes.
    ///
    /// Returning a smaller or empty window is a bug in the sink. The writer reports it as a
    /// [`CapacityError`] instead of looping.
    fn writable_window(&mut self, min_size: usize) -> &mut UninitSlice;

    /// Marks the first `count` bytes of the current window as written.
    ///
    /// # Safety
    /// The caller must have initialized those `count` bytes.
    unsafe fn commit(&mut self, count: usize) -> Result<()>;
}

impl ByteSink for BytesMut {
    fn writable_window(&mut self, min_size: usize) -> &mut UninitSlice {
        if self.capacity() - self.len() < min_size {
            self.reserve(min_size);
        }
        self.chunk_mut()
    }

    unsafe fn commit(&mut self, count: usize) -> Result<()> {
        let available = self.capacity() - self.len();
        if count > available {
            return Err(CapacityError::CommitPastWindow { count, available }.into());
        }
        self.advance_mut(count);
        Ok(())
    }
}

impl ByteSink for Vec<u8> {
    fn writable_window(&mut self, min_size: usize) -> &mut UninitSlice {
        if self.capacity() - self.len() < min_size {
            self.reserve(min_size);
        }
        self.chunk_mut()
    }

    unsafe fn commit(&mut self, count: usize) -> Result<()> {
        let available = self.capacity() - self.len();
        if count > available {
            return Err(CapacityError::CommitPastWindow { count, available }.into());
        }
        self.advance_mut(count);
        Ok(())
    }
}

/// A chain of segments rented from the thread-local [`SegmentPool`].
///
/// Used when the caller wants the encoded value back as one buffer instead of supplying a sink.
/// Every segment goes back to the pool exactly once, when the chain is frozen or dropped.
#[derive(Debug)]
pub struct SegmentChain {
    segments: Vec<BytesMut>,
    segment_size: usize,
}

impl SegmentChain {
    pub fn new() -> Self {
        Self::with_segment_size(DEFAULT_SEGMENT_SIZE)
    }

    pub fn with_segment_size(segment_size: usize) -> Self {
        Self {
            segments: Vec::new(),
            segment_size: segment_size.max(1),
        }
    }

    /// Committed bytes across all segments.
    pub fn len(&self) -> usize {
        self.segments.iter().map(|segment| segment.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Copies the committed bytes to `destination`.
    pub fn copy_to(&self, destination: &mut impl BufMut) {
        for segment in &self.segments {
            destination.put_slice(segment);
        }
    }

    /// Concatenates the committed bytes into one exact-size buffer and releases the segments.
    pub fn freeze(mut self) -> Bytes {
        let segments = std::mem::take(&mut self.segments);
        let mut output = BytesMut::with_capacity(segments.iter().map(|s| s.len()).sum());
        for segment in segments {
            output.extend_from_slice(&segment);
            SegmentPool::release(segment);
        }
        output.freeze()
    }
}

impl Default for SegmentChain {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SegmentChain {
    fn drop(&mut self) {
        for segment in self.segments.drain(..) {
            SegmentPool::release(segment);
        }
    }
}

impl ByteSink for SegmentChain {
    fn writable_window(&mut self, min_size: usize) -> &mut UninitSlice {
        let needed = min_size.max(1);
        let has_room = self
            .segments
            .last()
            .map_or(false, |last| last.capacity() - last.len() >= needed);
        if !has_room {
            let segment = SegmentPool::rent(needed.max(self.segment_size));
            self.segments.push(segment);
        }
        match self.segments.last_mut() {
            Some(last) => last.chunk_mut(),
            None => UninitSlice::new(&mut []),
        }
    }

    unsafe fn commit(&mut self, count: usize) -> Result<()> {
        let available = self
            .segments
            .last()
            .map_or(0, |last| last.capacity() - last.len());
        if count > available {
            return Err(CapacityError::CommitPastWindow { count, available }.into());
        }
        if let Some(last) = self.segments.last_mut() {
            last.advance_mut(count);
        }
        Ok(())
    }
}

enum Output<'a> {
    Sink(&'a mut dyn ByteSink),
    Owned(SegmentChain),
}

/// Single-use cursor over a sink. Not shared across threads and not kept past the call that
/// created it.
pub struct BufferWriter<'a> {
    output: Output<'a>,
    /// Bytes written into the current window but not yet committed.
    buffered: usize,
    /// Size of the current window, counted from its start.
    window_len: usize,
    committed: usize,
}

impl<'a> BufferWriter<'a> {
    /// Writes into a caller-supplied sink.
    pub fn new(sink: &'a mut dyn ByteSink) -> Self {
        Self {
            output: Output::Sink(sink),
            buffered: 0,
            window_len: 0,
            committed: 0,
        }
    }

    /// Writes into segments rented from the thread-local pool.
    pub fn pooled() -> BufferWriter<'static> {
        BufferWriter::with_segment_size(DEFAULT_SEGMENT_SIZE)
    }

    pub fn with_segment_size(segment_size: usize) -> BufferWriter<'static> {
        BufferWriter {
            output: Output::Owned(SegmentChain::with_segment_size(segment_size)),
            buffered: 0,
            window_len: 0,
            committed: 0,
        }
    }

    fn sink(&mut self) -> &mut dyn ByteSink {
        match &mut self.output {
            Output::Sink(sink) => &mut **sink,
            Output::Owned(chain) => chain,
        }
    }

    /// Returns a window of at least `min_size` bytes that starts at the write cursor.
    ///
    /// Write into it, then call [`BufferWriter::advance`] with the number of bytes written.
    pub fn get_writable_window(&mut self, min_size: usize) -> Result<&mut UninitSlice> {
        let min_size = min_size.max(1);
        if self.buffered + min_size > self.window_len {
            self.commit()?;
            let available = self.sink().writable_window(min_size).len();
            if available == 0 {
                return Err(CapacityError::EmptyWindow.into());
            }
            if available < min_size {
                return Err(CapacityError::WindowTooSmall {
                    requested: min_size,
                    available,
                }
                .into());
            }
            self.window_len = available;
        }
        let buffered = self.buffered;
        let window = self.sink().writable_window(buffered + min_size);
        Ok(&mut window[buffered..])
    }

    /// Moves the cursor past `count` bytes of the current window.
    ///
    /// # Safety
    /// The caller must have written those `count` bytes through
    /// [`BufferWriter::get_writable_window`].
    pub unsafe fn advance(&mut self, count: usize) -> Result<()> {
        let available = self.window_len - self.buffered;
        if count > available {
            return Err(CapacityError::AdvancePastWindow { count, available }.into());
        }
        self.buffered += count;
        Ok(())
    }

    /// Flushes pending local writes into the sink and resets the local window.
    pub fn commit(&mut self) -> Result<()> {
        if self.buffered == 0 {
            return Ok(());
        }
        let count = self.buffered;
        // SAFETY: `buffered` only grows through `advance`, whose callers initialized the bytes.
        unsafe { self.sink().commit(count)? };
        self.committed += count;
        self.window_len -= count;
        self.buffered = 0;
        Ok(())
    }

    /// Total bytes written through this writer, committed or not.
    pub fn written(&self) -> usize {
        self.committed + self.buffered
    }

    /// Bytes written into the local window but not yet visible to the sink.
    pub fn pending(&self) -> usize {
        self.buffered
    }

    pub fn write_bytes(&mut self, mut bytes: &[u8]) -> Result<()> {
        while !bytes.is_empty() {
            let window = self.get_writable_window(1)?;
            let n = window.len().min(bytes.len());
            window[..n].copy_from_slice(&bytes[..n]);
            // SAFETY: the first `n` bytes of the window were just written.
            unsafe { self.advance(n)? };
            bytes = &bytes[n..];
        }
        Ok(())
    }

    pub fn write_u8(&mut self, byte: u8) -> Result<()> {
        let window = self.get_writable_window(1)?;
        window.write_byte(0, byte);
        // SAFETY: one byte written above.
        unsafe { self.advance(1) }
    }

    /// Writes a fixed-width value in big-endian order.
    pub fn write_scalar<T: Scalar>(&mut self, value: T) -> Result<()> {
        self.write_scalar_with(value, Endian::Big)
    }

    pub fn write_scalar_with<T: Scalar>(&mut self, value: T, endian: Endian) -> Result<()> {
        let mut raw = [0u8; MAX_SCALAR_SIZE];
        scalar::encode(value, endian, &mut raw);
        let window = self.get_writable_window(T::SIZE)?;
        window[..T::SIZE].copy_from_slice(&raw[..T::SIZE]);
        // SAFETY: `T::SIZE` bytes written above.
        unsafe { self.advance(T::SIZE) }
    }

    /// Writes a 32-bit element count.
    pub fn write_count(&mut self, count: usize) -> Result<()> {
        let count = u32::try_from(count).map_err(|_| CapacityError::CountOverflow(count))?;
        self.write_scalar(count)
    }

    /// Writes a structural header: tag byte then count.
    pub fn write_header(&mut self, tag: u8, count: usize) -> Result<()> {
        let count = u32::try_from(count).map_err(|_| CapacityError::CountOverflow(count))?;
        let mut raw = [0u8; 1 + COUNT_LENGTH];
        raw[0] = tag;
        scalar::encode(count, Endian::Big, &mut raw[1..]);
        self.write_bytes(&raw)
    }

    /// Commits and returns everything written, releasing the pooled segments.
    ///
    /// Fails with [`CapacityError::ExternalSink`] when writing into a caller-supplied sink.
    pub fn flush_to_array(mut self) -> Result<Bytes> {
        self.commit()?;
        match self.output {
            Output::Owned(chain) => Ok(chain.freeze()),
            Output::Sink(_) => Err(CapacityError::ExternalSink.into()),
        }
    }

    /// Commits and copies everything written so far to `destination`.
    pub fn copy_to(&mut self, destination: &mut impl BufMut) -> Result<()> {
        self.commit()?;
        match &self.output {
            Output::Owned(chain) => {
                chain.copy_to(destination);
                Ok(())
            }
            Output::Sink(_) => Err(CapacityError::ExternalSink.into()),
        }
    }
}

impl std::fmt::Debug for BufferWriter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let output = match self.output {
            Output::Sink(_) => "sink",
            Output::Owned(_) => "pooled",
        };
        f.debug_struct("BufferWriter")
            .field("output", &output)
            .field("buffered", &self.buffered)
            .field("window_len", &self.window_len)
            .field("committed", &self.committed)
            .finish()
    }
}
