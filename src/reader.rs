//! Forward-only, transactional cursor over encoded bytes.
//!
//! Every read either succeeds and moves the cursor, or fails and leaves it where it was.

use crate::scalar::{self, Endian, Scalar};
use crate::tags::{self, NIL};
use crate::{CapacityError, CodecError, Result, ShapeError};
use bytes::{Bytes, BytesMut};

#[derive(Debug, Clone)]
pub struct BufferReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BufferReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn remaining_slice(&self) -> &'a [u8] {
        &self.data[self.position..]
    }

    fn insufficient(&self, needed: usize) -> CodecError {
        CodecError::InsufficientData {
            needed,
            remaining: self.remaining(),
        }
    }

    /// Reads a big-endian `T` without moving the cursor.
    pub fn try_peek<T: Scalar>(&self) -> Option<T> {
        let bytes = self.remaining_slice().get(..T::SIZE)?;
        Some(scalar::decode(bytes, Endian::Big))
    }

    /// Reads a big-endian `T`, or returns `None` and leaves the cursor alone.
    pub fn try_read<T: Scalar>(&mut self) -> Option<T> {
        let value = self.try_peek::<T>()?;
        self.position += T::SIZE;
        Some(value)
    }

    pub fn peek_u8(&self) -> Option<u8> {
        self.remaining_slice().first().copied()
    }

    /// Copies up to `destination.len()` bytes and returns how many were copied.
    pub fn read(&mut self, destination: &mut [u8]) -> usize {
        let count = destination.len().min(self.remaining());
        destination[..count].copy_from_slice(&self.data[self.position..self.position + count]);
        self.position += count;
        count
    }

    pub fn advance(&mut self, count: usize) -> Result<()> {
        let remaining = self.remaining();
        if count > remaining {
            return Err(CapacityError::AdvancePastEnd { count, remaining }.into());
        }
        self.position += count;
        Ok(())
    }

    /// Moves the cursor back by `count` bytes.
    pub fn rewind(&mut self, count: usize) -> Result<()> {
        if count > self.position {
            return Err(CapacityError::RewindPastStart {
                count,
                position: self.position,
            }
            .into());
        }
        self.position -= count;
        Ok(())
    }

    pub fn read_scalar<T: Scalar>(&mut self) -> Result<T> {
        self.read_scalar_with(Endian::Big)
    }

    pub fn read_scalar_with<T: Scalar>(&mut self, endian: Endian) -> Result<T> {
        let bytes = self
            .remaining_slice()
            .get(..T::SIZE)
            .ok_or_else(|| self.insufficient(T::SIZE))?;
        let value = scalar::decode(bytes, endian);
        self.position += T::SIZE;
        Ok(value)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let byte = self.peek_u8().ok_or_else(|| self.insufficient(1))?;
        self.position += 1;
        Ok(byte)
    }

    /// Borrows the next `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let data = self.data;
        let bytes = data[self.position..]
            .get(..len)
            .ok_or_else(|| self.insufficient(len))?;
        self.position += len;
        Ok(bytes)
    }

    /// Consumes `tag` if it is next. Otherwise fails with [`ShapeError::UnexpectedTag`].
    pub fn expect_tag(&mut self, tag: u8) -> Result<()> {
        let actual = self.peek_u8().ok_or_else(|| self.insufficient(1))?;
        if actual != tag {
            return Err(ShapeError::UnexpectedTag {
                expected: tag,
                actual,
            }
            .into());
        }
        self.position += 1;
        Ok(())
    }

    /// Consumes a `Nil` tag if one is next.
    pub fn try_read_nil(&mut self) -> bool {
        if self.peek_u8() == Some(NIL) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    pub fn read_count(&mut self) -> Result<usize> {
        Ok(self.read_scalar::<u32>()? as usize)
    }

    /// Reads a structural header and returns its count.
    ///
    /// The count is checked against the bytes left after the header. On any failure the cursor is
    /// back where it started.
    pub fn read_header(&mut self, tag: u8) -> Result<usize> {
        let start = self.position;
        self.expect_tag(tag)?;
        let count = match self.read_count() {
            Ok(count) => count,
            Err(err) => {
                self.position = start;
                return Err(err);
            }
        };
        let remaining = self.remaining();
        if count > remaining {
            self.position = start;
            return Err(ShapeError::CountExceedsRemaining { count, remaining }.into());
        }
        Ok(count)
    }
}

/// A source of encoded bytes delivered in chunks.
pub trait ByteSource {
    /// The next readable chunk, or `None` when the source is exhausted.
    fn next_chunk(&mut self) -> Option<Bytes>;
}

impl<I> ByteSource for I
where
    I: Iterator<Item = Bytes>,
{
    fn next_chunk(&mut self) -> Option<Bytes> {
        self.next()
    }
}

/// Collects every chunk into one contiguous buffer. A single chunk is returned without copying.
pub fn gather(source: &mut dyn ByteSource) -> Bytes {
    let first = match source.next_chunk() {
        Some(chunk) => chunk,
        None => return Bytes::new(),
    };
    let second = match source.next_chunk() {
        Some(chunk) => chunk,
        None => return first,
    };
    let mut joined = BytesMut::with_capacity(first.len() + second.len());
    joined.extend_from_slice(&first);
    joined.extend_from_slice(&second);
    while let Some(chunk) = source.next_chunk() {
        joined.extend_from_slice(&chunk);
    }
    joined.freeze()
}

impl std::fmt::Display for BufferReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.peek_u8() {
            Some(tag) => write!(
                f,
                "offset {} of {}, next 0x{:02X} ({})",
                self.position,
                self.data.len(),
                tag,
                tags::tag_name(tag)
            ),
            None => write!(f, "offset {} of {}, at end", self.position, self.data.len()),
        }
    }
}
