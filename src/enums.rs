//! Width-selected enum formatter.
//!
//! The discriminant width comes from the enum's `#[repr]`. [`EnumFormatter::new`] picks the
//! matching encode/decode pair once and stores it, so `serialize` and `deserialize` do not branch
//! on the width.

use crate::formatter::{Formatter, Framing};
use crate::reader::BufferReader;
use crate::tags::ScalarKind;
use crate::writer::BufferWriter;
use crate::{Result, ShapeError};
use std::marker::PhantomData;

/// Underlying integer type of a fieldless enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumRepr {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
}

impl EnumRepr {
    pub const fn kind(self) -> ScalarKind {
        match self {
            EnumRepr::U8 => ScalarKind::U8,
            EnumRepr::U16 => ScalarKind::U16,
            EnumRepr::U32 => ScalarKind::U32,
            EnumRepr::U64 => ScalarKind::U64,
            EnumRepr::I8 => ScalarKind::I8,
            EnumRepr::I16 => ScalarKind::I16,
            EnumRepr::I32 => ScalarKind::I32,
            EnumRepr::I64 => ScalarKind::I64,
        }
    }

    pub const fn width(self) -> usize {
        self.kind().width()
    }
}

/// A fieldless enum with a known discriminant width.
///
/// Implemented by `#[derive(Formattable)]`. Discriminants travel as `u64` bit patterns: signed
/// values are sign-extended, so `-1i8` is `0xFFFF_FFFF_FFFF_FFFF`.
pub trait WireEnum: Sized + Send + Sync + 'static {
    const REPR: EnumRepr;
    const NAME: &'static str;

    fn to_bits(&self) -> u64;

    fn from_bits(bits: u64) -> Option<Self>;
}

type WriteFn = fn(&mut BufferWriter<'_>, u64) -> Result<()>;
type ReadFn = fn(&mut BufferReader<'_>) -> Result<u64>;

macro_rules! width_codec {
    ($write:ident, $read:ident, $ty:ty) => {
        fn $write(writer: &mut BufferWriter<'_>, bits: u64) -> Result<()> {
            writer.write_scalar(bits as $ty)
        }

        fn $read(reader: &mut BufferReader<'_>) -> Result<u64> {
            Ok(reader.read_scalar::<$ty>()? as u64)
        }
    };
}

width_codec!(write_u8, read_u8, u8);
width_codec!(write_u16, read_u16, u16);
width_codec!(write_u32, read_u32, u32);
width_codec!(write_u64, read_u64, u64);

// Signed reads sign-extend through i64 so the bits match `to_bits` of a negative discriminant.
macro_rules! signed_width_codec {
    ($write:ident, $read:ident, $ty:ty) => {
        fn $write(writer: &mut BufferWriter<'_>, bits: u64) -> Result<()> {
            writer.write_scalar(bits as i64 as $ty)
        }

        fn $read(reader: &mut BufferReader<'_>) -> Result<u64> {
            Ok(reader.read_scalar::<$ty>()? as i64 as u64)
        }
    };
}

signed_width_codec!(write_i8, read_i8, i8);
signed_width_codec!(write_i16, read_i16, i16);
signed_width_codec!(write_i32, read_i32, i32);
signed_width_codec!(write_i64, read_i64, i64);

fn select(repr: EnumRepr) -> (WriteFn, ReadFn) {
    match repr {
        EnumRepr::U8 => (write_u8, read_u8),
        EnumRepr::U16 => (write_u16, read_u16),
        EnumRepr::U32 => (write_u32, read_u32),
        EnumRepr::U64 => (write_u64, read_u64),
        EnumRepr::I8 => (write_i8, read_i8),
        EnumRepr::I16 => (write_i16, read_i16),
        EnumRepr::I32 => (write_i32, read_i32),
        EnumRepr::I64 => (write_i64, read_i64),
    }
}

pub struct EnumFormatter<E> {
    write: WriteFn,
    read: ReadFn,
    repr: EnumRepr,
    _marker: PhantomData<fn() -> E>,
}

impl<E: WireEnum> EnumFormatter<E> {
    pub fn new() -> Self {
        let (write, read) = select(E::REPR);
        Self {
            write,
            read,
            repr: E::REPR,
            _marker: PhantomData,
        }
    }

    pub fn repr(&self) -> EnumRepr {
        self.repr
    }
}

impl<E: WireEnum> Default for EnumFormatter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: WireEnum> Formatter<E> for EnumFormatter<E> {
    fn serialize(&self, writer: &mut BufferWriter<'_>, value: &E) -> Result<()> {
        (self.write)(writer, value.to_bits())
    }

    fn deserialize(&self, reader: &mut BufferReader<'_>) -> Result<E> {
        let bits = (self.read)(reader)?;
        match E::from_bits(bits) {
            Some(value) => Ok(value),
            None => {
                reader.rewind(self.repr.width())?;
                Err(ShapeError::UnknownDiscriminant {
                    enum_name: E::NAME,
                    bits,
                }
                .into())
            }
        }
    }

    fn length(&self, _value: &E) -> Result<usize> {
        Ok(self.repr.width())
    }

    fn default_length(&self) -> usize {
        self.repr.width()
    }

    fn framing(&self) -> Framing {
        Framing::Scalar(self.repr.kind().tag())
    }
}
