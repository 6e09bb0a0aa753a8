//! # wirepack
//!
//! A type-driven binary serialization engine.
//!
//! - A [`Resolver`] maps each Rust type to exactly one [`Formatter`], synthesizing and caching
//!   formatters for collections, maps, options, tuples, enums and plain objects on first use
//! - Statically typed scalars are written as bare big-endian values; nil, bool, string, array and
//!   map payloads always carry a one-byte tag (see [`tags`])
//! - [`BufferWriter`] writes through a local window into any [`ByteSink`] or into pooled segments,
//!   and [`BufferReader`] is a transactional cursor over a byte slice
//! - A thread-local depth guard aborts cyclic or pathologically deep graphs with
//!   [`CodecError::DepthExceeded`] instead of overflowing the stack
//! - [`VersionedFormatter`] prefixes payloads with a schema version and dispatches to per-version
//!   codecs or migrations
//!
//! ## Derive
//!
//! `#[derive(Formattable)]` generates a plain-object formatter for structs (members in declaration
//! order) and a width-selected formatter for fieldless enums (width taken from `#[repr(..)]`).
//!
//! - `#[wire(skip)]` — The member is not written. On decode it is set to `Default::default()`.
//!
//! ## Feature Flags
//!
//! - `chrono` (default) — `chrono::DateTime<Utc>`, `NaiveDate` and `NaiveTime`.
//! - `uuid` (default) — `uuid::Uuid`.
//! - `ulid` — `ulid::Ulid`.
//! - `rust_decimal` — `rust_decimal::Decimal`.
//! - `indexmap` — `IndexMap` and `IndexSet` (order preserving).
//! - `smol_str` — `smol_str::SmolStr`.
//! - `serde_json` — `serde_json::Value`, written fully self-described with the tag table.

mod codec;
pub mod composite;
pub mod core;
pub mod depth;
pub mod enums;
mod features;
mod formatter;
pub mod object;
pub mod pool;
pub mod reader;
mod resolver;
pub mod scalar;
pub mod tags;
pub mod versioned;
pub mod writer;

use bytes::Bytes;
use std::sync::Arc;

pub use codec::{Codec, CodecOptions};
pub use composite::{write_sequence, MapLike, Sequence};
pub use enums::{EnumFormatter, EnumRepr, WireEnum};
pub use formatter::{Formattable, Formatter, Framing, GenericShape, TypeKind};
pub use reader::{BufferReader, ByteSource};
pub use resolver::{ErasedFormatter, Resolver, ResolverBuilder};
pub use versioned::{Migration, SchemaVersion, VersionRoute, VersionedFormatter};
pub use wirepack_derive::Formattable;
pub use writer::{BufferWriter, ByteSink, SegmentChain};

/// Errors that can occur while resolving formatters, serializing or deserializing.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The value could not be encoded.
    #[error("Encode error: {0}")]
    Encode(String),
    /// The buffer did not contain enough data to complete the operation.
    #[error("Insufficient data in buffer: needed {needed} bytes, {remaining} remaining")]
    InsufficientData { needed: usize, remaining: usize },
    /// The object graph nested deeper than the configured maximum.
    #[error("Maximum object graph depth of {max} exceeded")]
    DepthExceeded { max: usize },
    /// A versioned payload carried a version with no codec or migration.
    #[error("Unsupported schema version {version} for {type_name}")]
    UnsupportedVersion {
        type_name: &'static str,
        version: u32,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error(transparent)]
    Capacity(#[from] CapacityError),
}

/// The result type used throughout this crate.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Wiring mistakes detected while resolving formatters.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No formatter for abstract type {type_name}; register a concrete formatter for it")]
    AbstractType { type_name: &'static str },
    #[error("Formatter for {type_name} registered more than once")]
    DuplicateRegistration { type_name: &'static str },
    #[error("No formatter has been resolved or registered for {type_name}")]
    Unresolved { type_name: String },
    #[error("Formatter for {expected} received a value of another type")]
    TypeMismatch { expected: &'static str },
    #[error("Resolver was dropped before the deferred formatter for {type_name} was used")]
    ResolverDropped { type_name: &'static str },
}

/// The bytes do not have the shape the formatter expects.
#[derive(Debug, thiserror::Error)]
pub enum ShapeError {
    #[error("Expected tag 0x{expected:02X}, got 0x{actual:02X}")]
    UnexpectedTag { expected: u8, actual: u8 },
    #[error("Count {count} exceeds the {remaining} bytes remaining")]
    CountExceedsRemaining { count: usize, remaining: usize },
    #[error("Expected {expected} elements for {type_name}, got {actual}")]
    CountMismatch {
        type_name: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("Invalid UTF-8 in string payload: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("Invalid char scalar value 0x{0:08X}")]
    InvalidChar(u32),
    #[error("Unknown discriminant 0x{bits:016X} for enum {enum_name}")]
    UnknownDiscriminant { enum_name: &'static str, bits: u64 },
    #[error("Invalid {type_name} value: {reason}")]
    InvalidValue {
        type_name: &'static str,
        reason: String,
    },
    #[error("{remaining} trailing bytes after the decoded value")]
    TrailingBytes { remaining: usize },
}

/// Capacity and range violations. These indicate a programming error in a sink or caller.
#[derive(Debug, thiserror::Error)]
pub enum CapacityError {
    #[error("Sink returned an empty writable window")]
    EmptyWindow,
    #[error("Sink returned a window of {available} bytes for a request of {requested}")]
    WindowTooSmall { requested: usize, available: usize },
    #[error("Cannot advance {count} bytes; only {available} available in the window")]
    AdvancePastWindow { count: usize, available: usize },
    #[error("Cannot commit {count} bytes; only {available} reserved")]
    CommitPastWindow { count: usize, available: usize },
    #[error("Cannot rewind {count} bytes from position {position}")]
    RewindPastStart { count: usize, position: usize },
    #[error("Cannot advance {count} bytes; only {remaining} remaining")]
    AdvancePastEnd { count: usize, remaining: usize },
    #[error("Count {0} does not fit the 32-bit count field")]
    CountOverflow(usize),
    #[error("Writer does not own its output; read it from the sink instead")]
    ExternalSink,
}

/// Convenience function to serialize a value with the global codec.
///
/// # Example
/// ```rust
/// use wirepack::{deserialize, serialize, Formattable};
///
/// #[derive(Formattable, PartialEq, Debug)]
/// struct MyStruct {
///     id: u32,
///     name: String,
/// }
///
/// let value = MyStruct { id: 42, name: "hello".to_string() };
/// let bytes = serialize(&value).unwrap();
/// let decoded: MyStruct = deserialize(&bytes).unwrap();
/// assert_eq!(value, decoded);
/// ```
pub fn serialize<T: Formattable>(value: &T) -> Result<Bytes> {
    Codec::global().serialize(value)
}

/// Convenience function to deserialize a value with the global codec.
///
/// The whole slice must be consumed.
pub fn deserialize<T: Formattable>(bytes: &[u8]) -> Result<T> {
    Codec::global().deserialize(bytes)
}

/// Exact number of bytes [`serialize`] will produce for `value`.
pub fn length<T: Formattable>(value: &T) -> Result<usize> {
    Codec::global().length(value)
}

/// The global resolver's formatter for `T`.
pub fn formatter<T: Formattable>() -> Result<Arc<dyn Formatter<T>>> {
    Resolver::global().get_formatter::<T>()
}
