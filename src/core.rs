//! Primitive formatters.
//!
//! Fixed-width scalars are written bare in big-endian order: the call site already knows the type.
//! `bool` and `String` always carry their tag.

use crate::depth;
use crate::formatter::{Formattable, Formatter, Framing, TypeKind};
use crate::object;
use crate::reader::BufferReader;
use crate::resolver::Resolver;
use crate::scalar::Scalar;
use crate::tags::{WireScalar, FALSE, HEADER_LENGTH, NIL, STRING, TRUE, UINT32};
use crate::writer::BufferWriter;
use crate::{CodecError, Result, ShapeError};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

// --- fixed-width scalars ---

/// Formatter for `u8`..`u64`, `i8`..`i64`, `f32` and `f64`.
pub struct ScalarFormatter<T>(PhantomData<fn() -> T>);

impl<T> ScalarFormatter<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for ScalarFormatter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Formatter<T> for ScalarFormatter<T>
where
    T: Scalar + WireScalar + 'static,
{
    fn serialize(&self, writer: &mut BufferWriter<'_>, value: &T) -> Result<()> {
        writer.write_scalar(*value)
    }

    fn deserialize(&self, reader: &mut BufferReader<'_>) -> Result<T> {
        reader.read_scalar()
    }

    fn length(&self, _value: &T) -> Result<usize> {
        Ok(T::SIZE)
    }

    fn default_length(&self) -> usize {
        T::SIZE
    }

    fn framing(&self) -> Framing {
        Framing::Scalar(T::KIND.tag())
    }
}

macro_rules! formattable_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Formattable for $ty {
                const KIND: TypeKind = TypeKind::Scalar;

                fn build_formatter(_resolver: &Resolver) -> Result<Arc<dyn Formatter<Self>>> {
                    Ok(Arc::new(ScalarFormatter::<$ty>::new()))
                }
            }
        )*
    };
}

formattable_scalar!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

// --- usize / isize ---

/// `usize` and `isize` use the 64-bit layout so the wire does not depend on the host.
pub struct SizeFormatter<T, Wire>(PhantomData<fn() -> (T, Wire)>);

impl<T, Wire> SizeFormatter<T, Wire> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T, Wire> Default for SizeFormatter<T, Wire> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, Wire> Formatter<T> for SizeFormatter<T, Wire>
where
    T: Copy + TryFrom<Wire> + 'static,
    Wire: Scalar + WireScalar + TryFrom<T> + 'static,
{
    fn serialize(&self, writer: &mut BufferWriter<'_>, value: &T) -> Result<()> {
        let wire = Wire::try_from(*value).map_err(|_| {
            CodecError::Encode(format!(
                "{} does not fit 64 bits",
                std::any::type_name::<T>()
            ))
        })?;
        writer.write_scalar(wire)
    }

    fn deserialize(&self, reader: &mut BufferReader<'_>) -> Result<T> {
        let wire: Wire = reader.read_scalar()?;
        match T::try_from(wire) {
            Ok(value) => Ok(value),
            Err(_) => {
                reader.rewind(Wire::SIZE)?;
                Err(ShapeError::InvalidValue {
                    type_name: std::any::type_name::<T>(),
                    reason: "out of range for this platform".to_string(),
                }
                .into())
            }
        }
    }

    fn length(&self, _value: &T) -> Result<usize> {
        Ok(Wire::SIZE)
    }

    fn default_length(&self) -> usize {
        Wire::SIZE
    }

    fn framing(&self) -> Framing {
        Framing::Scalar(Wire::KIND.tag())
    }
}

impl Formattable for usize {
    const KIND: TypeKind = TypeKind::Scalar;

    fn build_formatter(_resolver: &Resolver) -> Result<Arc<dyn Formatter<Self>>> {
        Ok(Arc::new(SizeFormatter::<usize, u64>::new()))
    }
}

impl Formattable for isize {
    const KIND: TypeKind = TypeKind::Scalar;

    fn build_formatter(_resolver: &Resolver) -> Result<Arc<dyn Formatter<Self>>> {
        Ok(Arc::new(SizeFormatter::<isize, i64>::new()))
    }
}

// --- bool ---

/// Encodes a `bool` as a single tag byte: `FALSE` or `TRUE`.
pub struct BoolFormatter;

impl Formatter<bool> for BoolFormatter {
    fn serialize(&self, writer: &mut BufferWriter<'_>, value: &bool) -> Result<()> {
        writer.write_u8(if *value { TRUE } else { FALSE })
    }

    /// # Errors
    /// Returns a shape error if the tag is neither `FALSE` nor `TRUE`.
    fn deserialize(&self, reader: &mut BufferReader<'_>) -> Result<bool> {
        let tag = reader.read_u8()?;
        match tag {
            FALSE => Ok(false),
            TRUE => Ok(true),
            actual => {
                reader.rewind(1)?;
                Err(ShapeError::UnexpectedTag {
                    expected: TRUE,
                    actual,
                }
                .into())
            }
        }
    }

    fn length(&self, _value: &bool) -> Result<usize> {
        Ok(1)
    }

    fn default_length(&self) -> usize {
        1
    }
}

impl Formattable for bool {
    const KIND: TypeKind = TypeKind::Scalar;

    fn build_formatter(_resolver: &Resolver) -> Result<Arc<dyn Formatter<Self>>> {
        Ok(Arc::new(BoolFormatter))
    }
}

// --- char ---

/// Encodes a `char` as its scalar value in the 32-bit layout.
pub struct CharFormatter;

impl Formatter<char> for CharFormatter {
    fn serialize(&self, writer: &mut BufferWriter<'_>, value: &char) -> Result<()> {
        writer.write_scalar(*value as u32)
    }

    fn deserialize(&self, reader: &mut BufferReader<'_>) -> Result<char> {
        let raw: u32 = reader.read_scalar()?;
        match char::from_u32(raw) {
            Some(c) => Ok(c),
            None => {
                reader.rewind(4)?;
                Err(ShapeError::InvalidChar(raw).into())
            }
        }
    }

    fn length(&self, _value: &char) -> Result<usize> {
        Ok(4)
    }

    fn default_length(&self) -> usize {
        4
    }

    fn framing(&self) -> Framing {
        Framing::Scalar(UINT32)
    }
}

impl Formattable for char {
    const KIND: TypeKind = TypeKind::Scalar;

    fn build_formatter(_resolver: &Resolver) -> Result<Arc<dyn Formatter<Self>>> {
        Ok(Arc::new(CharFormatter))
    }
}

// --- String ---

/// Writes `[STRING, byte count, utf8]`.
pub fn write_str(writer: &mut BufferWriter<'_>, value: &str) -> Result<()> {
    writer.write_header(STRING, value.len())?;
    writer.write_bytes(value.as_bytes())
}

/// Reads a string payload. Returns `None` for `Nil`.
///
/// The returned slice borrows the input. Invalid UTF-8 leaves the cursor at the tag.
pub fn read_str<'a>(reader: &mut BufferReader<'a>) -> Result<Option<&'a str>> {
    if reader.try_read_nil() {
        return Ok(None);
    }
    let start = reader.position();
    let len = reader.read_header(STRING)?;
    let bytes = reader.read_bytes(len)?;
    match std::str::from_utf8(bytes) {
        Ok(s) => Ok(Some(s)),
        Err(err) => {
            reader.rewind(reader.position() - start)?;
            Err(ShapeError::InvalidUtf8(err).into())
        }
    }
}

pub fn str_length(value: &str) -> usize {
    HEADER_LENGTH + value.len()
}

/// A `Nil` payload decodes to the empty string.
pub struct StringFormatter;

impl Formatter<String> for StringFormatter {
    fn serialize(&self, writer: &mut BufferWriter<'_>, value: &String) -> Result<()> {
        write_str(writer, value)
    }

    fn deserialize(&self, reader: &mut BufferReader<'_>) -> Result<String> {
        Ok(read_str(reader)?.map(str::to_owned).unwrap_or_default())
    }

    fn length(&self, value: &String) -> Result<usize> {
        Ok(str_length(value))
    }

    fn default_length(&self) -> usize {
        HEADER_LENGTH
    }
}

impl Formattable for String {
    const KIND: TypeKind = TypeKind::Scalar;

    fn build_formatter(_resolver: &Resolver) -> Result<Arc<dyn Formatter<Self>>> {
        Ok(Arc::new(StringFormatter))
    }
}

// --- Duration ---

/// Time span as `[ArrayHeader, 2, seconds u64, nanoseconds u32]`.
pub struct DurationFormatter;

const DURATION_LENGTH: usize = HEADER_LENGTH + 8 + 4;

impl Formatter<Duration> for DurationFormatter {
    fn serialize(&self, writer: &mut BufferWriter<'_>, value: &Duration) -> Result<()> {
        object::write_header(writer, 2)?;
        writer.write_scalar(value.as_secs())?;
        writer.write_scalar(value.subsec_nanos())
    }

    fn deserialize(&self, reader: &mut BufferReader<'_>) -> Result<Duration> {
        let start = reader.position();
        object::read_header(reader, 2, "Duration")?;
        let secs: u64 = reader.read_scalar()?;
        let nanos: u32 = reader.read_scalar()?;
        if nanos >= 1_000_000_000 {
            reader.rewind(reader.position() - start)?;
            return Err(ShapeError::InvalidValue {
                type_name: "Duration",
                reason: format!("{} nanoseconds is not below one second", nanos),
            }
            .into());
        }
        Ok(Duration::new(secs, nanos))
    }

    fn length(&self, _value: &Duration) -> Result<usize> {
        Ok(DURATION_LENGTH)
    }

    fn default_length(&self) -> usize {
        DURATION_LENGTH
    }
}

impl Formattable for Duration {
    const KIND: TypeKind = TypeKind::Scalar;

    fn build_formatter(_resolver: &Resolver) -> Result<Arc<dyn Formatter<Self>>> {
        Ok(Arc::new(DurationFormatter))
    }
}

// --- () ---

/// The zero-member tuple: `[ArrayHeader, 0]`.
pub struct UnitFormatter;

impl Formatter<()> for UnitFormatter {
    fn serialize(&self, writer: &mut BufferWriter<'_>, _value: &()) -> Result<()> {
        object::write_header(writer, 0)
    }

    fn deserialize(&self, reader: &mut BufferReader<'_>) -> Result<()> {
        object::read_header(reader, 0, "()")
    }

    fn length(&self, _value: &()) -> Result<usize> {
        Ok(HEADER_LENGTH)
    }

    fn default_length(&self) -> usize {
        HEADER_LENGTH
    }
}

impl Formattable for () {
    const KIND: TypeKind = TypeKind::Generic(crate::GenericShape::Tuple);

    fn build_formatter(_resolver: &Resolver) -> Result<Arc<dyn Formatter<Self>>> {
        Ok(Arc::new(UnitFormatter))
    }
}

/// Reads a `Nil` tag if one is next, entering one depth level otherwise.
///
/// Shared by the composite formatters: returns `None` for `Nil` and the held guard for a present
/// value.
pub(crate) fn enter_unless_nil(reader: &mut BufferReader<'_>) -> Result<Option<depth::DepthGuard>> {
    if reader.peek_u8() == Some(NIL) {
        reader.advance(1)?;
        return Ok(None);
    }
    depth::enter().map(Some)
}
