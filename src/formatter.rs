use crate::reader::BufferReader;
use crate::resolver::Resolver;
use crate::writer::BufferWriter;
use crate::Result;
use std::sync::Arc;

/// How a formatter's payload begins on the wire.
///
/// Wrappers that must tell "absent" apart from "present" (see the nullable formatter) use this to
/// decide what, if anything, to write before the inner payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Starts with a tag that is never `Nil`.
    SelfDescribing,
    /// Untagged fixed-width scalar. Carries the tag a wrapper writes to self-describe it.
    Scalar(u8),
    /// Untagged bytes with no entry in the tag table.
    Raw,
    /// May itself start with `Nil`.
    Nullable,
}

/// Serialize, deserialize and length for exactly one type.
///
/// Formatters are built once per type by the [`Resolver`] and shared for the life of the process,
/// so they must be immutable after construction.
pub trait Formatter<T>: Send + Sync + 'static {
    fn serialize(&self, writer: &mut BufferWriter<'_>, value: &T) -> Result<()>;

    fn deserialize(&self, reader: &mut BufferReader<'_>) -> Result<T>;

    /// Exact number of bytes the next `serialize` of `value` writes.
    fn length(&self, value: &T) -> Result<usize>;

    /// Typical-case size hint, used to presize buffers.
    fn default_length(&self) -> usize;

    fn framing(&self) -> Framing {
        Framing::SelfDescribing
    }
}

/// Which built-in generic shape a type is, as reported by [`TypeKind::Generic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenericShape {
    List,
    Queue,
    Set,
    Heap,
    Map,
    Nullable,
    Pointer,
    Tuple,
    Result,
    Memory,
}

/// Shape of a type, reported by [`Formattable::KIND`].
///
/// Formatters are built by each type's [`Formattable::build_formatter`], not by switching on the
/// kind. The resolver reads it only to reject [`TypeKind::Abstract`] types and to label its logs;
/// the other variants are descriptive metadata for callers that inspect types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Scalar,
    Enum,
    Array,
    Generic(GenericShape),
    /// A plain object, usually produced by `#[derive(Formattable)]`.
    Object,
    /// Cannot be materialized on decode without a registered formatter.
    Abstract,
}

/// A type the resolver can build a formatter for.
pub trait Formattable: Sized + 'static {
    const KIND: TypeKind;

    /// Builds the formatter for `Self`, resolving any formatters it depends on through
    /// `resolver`. Called at most once per resolver and type.
    fn build_formatter(resolver: &Resolver) -> Result<Arc<dyn Formatter<Self>>>;
}

/// Marks a type as abstract.
///
/// Resolving it fails with [`crate::ConfigError::AbstractType`] unless a concrete formatter was
/// registered for it through [`crate::ResolverBuilder`].
///
/// ```rust
/// use wirepack::{formattable_abstract, Resolver};
///
/// pub trait Shape: Send + Sync {}
/// formattable_abstract!(Box<dyn Shape>);
///
/// assert!(Resolver::new().get_formatter::<Box<dyn Shape>>().is_err());
/// ```
#[macro_export]
macro_rules! formattable_abstract {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::Formattable for $ty {
                const KIND: $crate::TypeKind = $crate::TypeKind::Abstract;

                fn build_formatter(
                    _resolver: &$crate::Resolver,
                ) -> $crate::Result<::std::sync::Arc<dyn $crate::Formatter<Self>>> {
                    ::std::result::Result::Err($crate::ConfigError::AbstractType {
                        type_name: ::std::any::type_name::<Self>(),
                    }
                    .into())
                }
            }
        )+
    };
}
