//! Wire tags used in the wirepack binary format.
//!
//! Tags are single reserved bytes that identify the shape of the payload that
//! follows. They are stable and part of the wire format.
//!
//! - `NIL`, `FALSE`/`TRUE`, `STRING`, `ARRAY_HEADER` and `MAP_HEADER` are always
//!   written by the formatters that own them.
//! - Fixed-width scalar tags are only written when a generic wrapper has to
//!   self-describe a scalar payload (see [`crate::Framing`]). A statically typed
//!   scalar formatter writes the bare big-endian value.

/// Absent value (`None`, missing collection).
pub const NIL: u8 = 0xC0;
pub const FALSE: u8 = 0xC2;
pub const TRUE: u8 = 0xC3;
pub const FLOAT32: u8 = 0xCA;
pub const FLOAT64: u8 = 0xCB;
pub const UINT8: u8 = 0xCC;
pub const UINT16: u8 = 0xCD;
pub const UINT32: u8 = 0xCE;
pub const UINT64: u8 = 0xCF;
pub const INT8: u8 = 0xD0;
pub const INT16: u8 = 0xD1;
pub const INT32: u8 = 0xD2;
pub const INT64: u8 = 0xD3;
/// String: followed by a u32 byte count and UTF-8 bytes.
pub const STRING: u8 = 0xD9;
/// Array/sequence/object: followed by a u32 element count.
pub const ARRAY_HEADER: u8 = 0xDD;
/// Map: followed by a u32 pair count.
pub const MAP_HEADER: u8 = 0xDE;

/// Width of the count field that follows `STRING`, `ARRAY_HEADER` and `MAP_HEADER`.
pub const COUNT_LENGTH: usize = 4;
/// Tag byte plus count field.
pub const HEADER_LENGTH: usize = 1 + COUNT_LENGTH;
/// Length of a lone tag such as `NIL`.
pub const TAG_LENGTH: usize = 1;

/// Fixed-width scalar shapes that have a tag of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl ScalarKind {
    /// The tag byte that self-describes a payload of this kind.
    pub const fn tag(self) -> u8 {
        match self {
            ScalarKind::U8 => UINT8,
            ScalarKind::U16 => UINT16,
            ScalarKind::U32 => UINT32,
            ScalarKind::U64 => UINT64,
            ScalarKind::I8 => INT8,
            ScalarKind::I16 => INT16,
            ScalarKind::I32 => INT32,
            ScalarKind::I64 => INT64,
            ScalarKind::F32 => FLOAT32,
            ScalarKind::F64 => FLOAT64,
        }
    }

    /// Payload width in bytes, excluding the tag.
    pub const fn width(self) -> usize {
        match self {
            ScalarKind::U8 | ScalarKind::I8 => 1,
            ScalarKind::U16 | ScalarKind::I16 => 2,
            ScalarKind::U32 | ScalarKind::I32 | ScalarKind::F32 => 4,
            ScalarKind::U64 | ScalarKind::I64 | ScalarKind::F64 => 8,
        }
    }

    pub const fn from_tag(tag: u8) -> Option<ScalarKind> {
        match tag {
            UINT8 => Some(ScalarKind::U8),
            UINT16 => Some(ScalarKind::U16),
            UINT32 => Some(ScalarKind::U32),
            UINT64 => Some(ScalarKind::U64),
            INT8 => Some(ScalarKind::I8),
            INT16 => Some(ScalarKind::I16),
            INT32 => Some(ScalarKind::I32),
            INT64 => Some(ScalarKind::I64),
            FLOAT32 => Some(ScalarKind::F32),
            FLOAT64 => Some(ScalarKind::F64),
            _ => None,
        }
    }
}

/// Maps a Rust scalar type to its [`ScalarKind`].
pub trait WireScalar {
    const KIND: ScalarKind;
}

macro_rules! impl_wire_scalar {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl WireScalar for $ty {
                const KIND: ScalarKind = ScalarKind::$kind;
            }
        )*
    };
}

impl_wire_scalar!(
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
);

/// Tag for the scalar type `T`.
pub const fn tag_of<T: WireScalar>() -> u8 {
    T::KIND.tag()
}

/// Human-readable tag name for error messages.
pub fn tag_name(tag: u8) -> &'static str {
    match tag {
        NIL => "Nil",
        FALSE => "False",
        TRUE => "True",
        FLOAT32 => "Float32",
        FLOAT64 => "Float64",
        UINT8 => "UInt8",
        UINT16 => "UInt16",
        UINT32 => "UInt32",
        UINT64 => "UInt64",
        INT8 => "Int8",
        INT16 => "Int16",
        INT32 => "Int32",
        INT64 => "Int64",
        STRING => "String",
        ARRAY_HEADER => "ArrayHeader",
        MAP_HEADER => "MapHeader",
        _ => "untagged",
    }
}
