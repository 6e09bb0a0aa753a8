//! Composite formatters: collections, maps, nullable values, pointers, tuples, fixed arrays,
//! result-like values and byte buffers.
//!
//! Each composite resolves the formatters of its parts once, when it is built, and reuses them for
//! every call.

use crate::core::enter_unless_nil;
use crate::depth;
use crate::formatter::{Formattable, Formatter, Framing, GenericShape, TypeKind};
use crate::object;
use crate::reader::BufferReader;
use crate::resolver::Resolver;
use crate::tags::{ARRAY_HEADER, FALSE, HEADER_LENGTH, MAP_HEADER, NIL, TAG_LENGTH, TRUE};
use crate::writer::BufferWriter;
use crate::{CodecError, Result, ShapeError};
use bytes::Bytes;
use std::borrow::Borrow;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap, HashSet, LinkedList, VecDeque};
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;

/// Most memory reserved from a decoded count before any item has been read.
const MAX_PREALLOC_BYTES: usize = 1 << 20;

/// Capacity to reserve for `count` decoded items of type `T`.
///
/// The count is only checked against the bytes left, so it is capped here; larger collections
/// grow as their items arrive.
pub(crate) fn prealloc_capacity<T>(count: usize) -> usize {
    count.min(MAX_PREALLOC_BYTES / std::mem::size_of::<T>().max(1))
}

// --- sequences ---

/// A collection written as `[ArrayHeader, count, items...]`.
///
/// Implement this for a collection type of your own and pass it to [`formattable_sequence!`] to
/// give it a formatter without writing one.
pub trait Sequence: Sized + 'static {
    type Item: Formattable;
    const SHAPE: GenericShape;

    fn seq_len(&self) -> usize;

    /// Visits items in the order they should be written.
    fn for_each_item<F>(&self, f: F) -> Result<()>
    where
        F: FnMut(&Self::Item) -> Result<()>;

    fn with_capacity(capacity: usize) -> Self;

    /// Adds an item in read order.
    fn push_item(&mut self, item: Self::Item);
}

macro_rules! impl_sequence {
    ($ty:ident<T $(, $s:ident)?>, $shape:ident, $push:ident, |$cap:ident| $new:expr $(, $($bound:tt)+)?) => {
        impl<T $(, $s)?> Sequence for $ty<T $(, $s)?>
        where
            T: Formattable $(+ $($bound)+)?,
            $($s: BuildHasher + Default + 'static,)?
        {
            type Item = T;
            const SHAPE: GenericShape = GenericShape::$shape;

            fn seq_len(&self) -> usize {
                self.len()
            }

            fn for_each_item<F>(&self, f: F) -> Result<()>
            where
                F: FnMut(&T) -> Result<()>,
            {
                self.iter().try_for_each(f)
            }

            fn with_capacity($cap: usize) -> Self {
                $new
            }

            fn push_item(&mut self, item: T) {
                self.$push(item);
            }
        }

        impl<T $(, $s)?> Formattable for $ty<T $(, $s)?>
        where
            T: Formattable $(+ $($bound)+)?,
            $($s: BuildHasher + Default + 'static,)?
        {
            const KIND: TypeKind = TypeKind::Generic(GenericShape::$shape);

            fn build_formatter(resolver: &Resolver) -> Result<Arc<dyn Formatter<Self>>> {
                CollectionFormatter::<Self>::build(resolver)
            }
        }
    };
}

impl_sequence!(Vec<T>, List, push, |capacity| Vec::with_capacity(capacity));
impl_sequence!(VecDeque<T>, Queue, push_back, |capacity| VecDeque::with_capacity(capacity));
impl_sequence!(LinkedList<T>, List, push_back, |_capacity| LinkedList::new());
impl_sequence!(BinaryHeap<T>, Heap, push, |capacity| BinaryHeap::with_capacity(capacity), Ord);
impl_sequence!(BTreeSet<T>, Set, insert_item, |_capacity| BTreeSet::new(), Ord);
impl_sequence!(
    HashSet<T, S>,
    Set,
    insert_item,
    |capacity| HashSet::with_capacity_and_hasher(capacity, S::default()),
    Eq + Hash
);

/// Set insertion that discards the "was new" flag.
trait InsertItem<T> {
    fn insert_item(&mut self, item: T);
}

impl<T: Ord> InsertItem<T> for BTreeSet<T> {
    fn insert_item(&mut self, item: T) {
        self.insert(item);
    }
}

impl<T: Eq + Hash, S: BuildHasher> InsertItem<T> for HashSet<T, S> {
    fn insert_item(&mut self, item: T) {
        self.insert(item);
    }
}

/// Formatter for any [`Sequence`]. A `Nil` payload decodes to an empty collection.
pub struct CollectionFormatter<C: Sequence> {
    item: Arc<dyn Formatter<C::Item>>,
}

impl<C: Sequence> CollectionFormatter<C> {
    pub fn new(item: Arc<dyn Formatter<C::Item>>) -> Self {
        Self { item }
    }

    pub fn build(resolver: &Resolver) -> Result<Arc<dyn Formatter<C>>> {
        Ok(Arc::new(Self::new(resolver.get_formatter::<C::Item>()?)))
    }
}

impl<C: Sequence> Formatter<C> for CollectionFormatter<C> {
    fn serialize(&self, writer: &mut BufferWriter<'_>, value: &C) -> Result<()> {
        let _guard = depth::enter()?;
        writer.write_header(ARRAY_HEADER, value.seq_len())?;
        value.for_each_item(|item| self.item.serialize(writer, item))
    }

    fn deserialize(&self, reader: &mut BufferReader<'_>) -> Result<C> {
        let _guard = match enter_unless_nil(reader)? {
            Some(guard) => guard,
            None => return Ok(C::with_capacity(0)),
        };
        let count = reader.read_header(ARRAY_HEADER)?;
        let mut collection = C::with_capacity(prealloc_capacity::<C::Item>(count));
        for _ in 0..count {
            collection.push_item(self.item.deserialize(reader)?);
        }
        Ok(collection)
    }

    fn length(&self, value: &C) -> Result<usize> {
        let _guard = depth::enter()?;
        let mut total = HEADER_LENGTH;
        value.for_each_item(|item| {
            total += self.item.length(item)?;
            Ok(())
        })?;
        Ok(total)
    }

    fn default_length(&self) -> usize {
        HEADER_LENGTH
    }
}

/// Writes an iterator of unknown length as a counted sequence.
///
/// The count precedes the items on the wire, so the items are collected first. Returns the
/// number of items written.
pub fn write_sequence<T, I>(
    writer: &mut BufferWriter<'_>,
    formatter: &dyn Formatter<T>,
    items: I,
) -> Result<usize>
where
    T: 'static,
    I: IntoIterator,
    I::Item: Borrow<T>,
{
    let items: Vec<I::Item> = items.into_iter().collect();
    writer.write_header(ARRAY_HEADER, items.len())?;
    for item in &items {
        formatter.serialize(writer, item.borrow())?;
    }
    Ok(items.len())
}

// --- maps ---

/// A dictionary written as `[MapHeader, count, key, value, ...]`.
pub trait MapLike: Sized + 'static {
    type Key: Formattable;
    type Value: Formattable;

    fn map_len(&self) -> usize;

    fn for_each_entry<F>(&self, f: F) -> Result<()>
    where
        F: FnMut(&Self::Key, &Self::Value) -> Result<()>;

    fn with_capacity(capacity: usize) -> Self;

    fn insert_entry(&mut self, key: Self::Key, value: Self::Value);
}

impl<K, V, S> MapLike for HashMap<K, V, S>
where
    K: Formattable + Eq + Hash,
    V: Formattable,
    S: BuildHasher + Default + 'static,
{
    type Key = K;
    type Value = V;

    fn map_len(&self) -> usize {
        self.len()
    }

    fn for_each_entry<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&K, &V) -> Result<()>,
    {
        self.iter().try_for_each(|(k, v)| f(k, v))
    }

    fn with_capacity(capacity: usize) -> Self {
        HashMap::with_capacity_and_hasher(capacity, S::default())
    }

    fn insert_entry(&mut self, key: K, value: V) {
        self.insert(key, value);
    }
}

impl<K, V> MapLike for BTreeMap<K, V>
where
    K: Formattable + Ord,
    V: Formattable,
{
    type Key = K;
    type Value = V;

    fn map_len(&self) -> usize {
        self.len()
    }

    fn for_each_entry<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&K, &V) -> Result<()>,
    {
        self.iter().try_for_each(|(k, v)| f(k, v))
    }

    fn with_capacity(_capacity: usize) -> Self {
        BTreeMap::new()
    }

    fn insert_entry(&mut self, key: K, value: V) {
        self.insert(key, value);
    }
}

impl<K, V, S> Formattable for HashMap<K, V, S>
where
    K: Formattable + Eq + Hash,
    V: Formattable,
    S: BuildHasher + Default + 'static,
{
    const KIND: TypeKind = TypeKind::Generic(GenericShape::Map);

    fn build_formatter(resolver: &Resolver) -> Result<Arc<dyn Formatter<Self>>> {
        MapFormatter::<Self>::build(resolver)
    }
}

impl<K, V> Formattable for BTreeMap<K, V>
where
    K: Formattable + Ord,
    V: Formattable,
{
    const KIND: TypeKind = TypeKind::Generic(GenericShape::Map);

    fn build_formatter(resolver: &Resolver) -> Result<Arc<dyn Formatter<Self>>> {
        MapFormatter::<Self>::build(resolver)
    }
}

/// Formatter for any [`MapLike`]. A `Nil` payload decodes to an empty map.
pub struct MapFormatter<M: MapLike> {
    key: Arc<dyn Formatter<M::Key>>,
    value: Arc<dyn Formatter<M::Value>>,
}

impl<M: MapLike> MapFormatter<M> {
    pub fn new(key: Arc<dyn Formatter<M::Key>>, value: Arc<dyn Formatter<M::Value>>) -> Self {
        Self { key, value }
    }

    pub fn build(resolver: &Resolver) -> Result<Arc<dyn Formatter<M>>> {
        Ok(Arc::new(Self::new(
            resolver.get_formatter::<M::Key>()?,
            resolver.get_formatter::<M::Value>()?,
        )))
    }
}

impl<M: MapLike> Formatter<M> for MapFormatter<M> {
    fn serialize(&self, writer: &mut BufferWriter<'_>, value: &M) -> Result<()> {
        let _guard = depth::enter()?;
        writer.write_header(MAP_HEADER, value.map_len())?;
        value.for_each_entry(|k, v| {
            self.key.serialize(writer, k)?;
            self.value.serialize(writer, v)
        })
    }

    fn deserialize(&self, reader: &mut BufferReader<'_>) -> Result<M> {
        let _guard = match enter_unless_nil(reader)? {
            Some(guard) => guard,
            None => return Ok(M::with_capacity(0)),
        };
        let count = reader.read_header(MAP_HEADER)?;
        let mut map = M::with_capacity(prealloc_capacity::<(M::Key, M::Value)>(count));
        for _ in 0..count {
            let key = self.key.deserialize(reader)?;
            let value = self.value.deserialize(reader)?;
            map.insert_entry(key, value);
        }
        Ok(map)
    }

    fn length(&self, value: &M) -> Result<usize> {
        let _guard = depth::enter()?;
        let mut total = HEADER_LENGTH;
        value.for_each_entry(|k, v| {
            total += self.key.length(k)? + self.value.length(v)?;
            Ok(())
        })?;
        Ok(total)
    }

    fn default_length(&self) -> usize {
        HEADER_LENGTH
    }
}

/// Implements `Formattable` for a collection type that implements [`Sequence`].
///
/// ```rust
/// use wirepack::{formattable_sequence, GenericShape, Result, Sequence};
///
/// #[derive(Debug, PartialEq)]
/// pub struct Tags(Vec<String>);
///
/// impl Sequence for Tags {
///     type Item = String;
///     const SHAPE: GenericShape = GenericShape::List;
///
///     fn seq_len(&self) -> usize {
///         self.0.len()
///     }
///
///     fn for_each_item<F>(&self, f: F) -> Result<()>
///     where
///         F: FnMut(&String) -> Result<()>,
///     {
///         self.0.iter().try_for_each(f)
///     }
///
///     fn with_capacity(capacity: usize) -> Self {
///         Tags(Vec::with_capacity(capacity))
///     }
///
///     fn push_item(&mut self, item: String) {
///         self.0.push(item);
///     }
/// }
///
/// formattable_sequence!(Tags);
///
/// let tags = Tags(vec!["a".into(), "b".into()]);
/// let bytes = wirepack::serialize(&tags).unwrap();
/// assert_eq!(bytes, wirepack::serialize(&vec!["a".to_string(), "b".to_string()]).unwrap());
/// ```
#[macro_export]
macro_rules! formattable_sequence {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::Formattable for $ty {
                const KIND: $crate::TypeKind =
                    $crate::TypeKind::Generic(<$ty as $crate::Sequence>::SHAPE);

                fn build_formatter(
                    resolver: &$crate::Resolver,
                ) -> $crate::Result<::std::sync::Arc<dyn $crate::Formatter<Self>>> {
                    $crate::composite::CollectionFormatter::<Self>::build(resolver)
                }
            }
        )+
    };
}

/// Implements `Formattable` for a dictionary type that implements [`MapLike`].
#[macro_export]
macro_rules! formattable_map {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::Formattable for $ty {
                const KIND: $crate::TypeKind =
                    $crate::TypeKind::Generic($crate::GenericShape::Map);

                fn build_formatter(
                    resolver: &$crate::Resolver,
                ) -> $crate::Result<::std::sync::Arc<dyn $crate::Formatter<Self>>> {
                    $crate::composite::MapFormatter::<Self>::build(resolver)
                }
            }
        )+
    };
}

// --- Option ---

/// `None` is `Nil`. `Some` is framed according to the inner formatter's [`Framing`].
pub struct NullableFormatter<T> {
    inner: Arc<dyn Formatter<T>>,
}

impl<T: 'static> NullableFormatter<T> {
    pub fn new(inner: Arc<dyn Formatter<T>>) -> Self {
        Self { inner }
    }

    fn prefix_length(&self) -> usize {
        match self.inner.framing() {
            Framing::SelfDescribing => 0,
            Framing::Scalar(_) | Framing::Raw | Framing::Nullable => TAG_LENGTH,
        }
    }
}

impl<T: 'static> Formatter<Option<T>> for NullableFormatter<T> {
    fn serialize(&self, writer: &mut BufferWriter<'_>, value: &Option<T>) -> Result<()> {
        let Some(value) = value else {
            return writer.write_u8(NIL);
        };
        match self.inner.framing() {
            Framing::SelfDescribing => {}
            Framing::Scalar(tag) => writer.write_u8(tag)?,
            Framing::Raw | Framing::Nullable => writer.write_u8(TRUE)?,
        }
        self.inner.serialize(writer, value)
    }

    fn deserialize(&self, reader: &mut BufferReader<'_>) -> Result<Option<T>> {
        if reader.try_read_nil() {
            return Ok(None);
        }
        match self.inner.framing() {
            Framing::SelfDescribing => {}
            Framing::Scalar(tag) => reader.expect_tag(tag)?,
            Framing::Raw | Framing::Nullable => reader.expect_tag(TRUE)?,
        }
        self.inner.deserialize(reader).map(Some)
    }

    fn length(&self, value: &Option<T>) -> Result<usize> {
        match value {
            None => Ok(TAG_LENGTH),
            Some(value) => Ok(self.prefix_length() + self.inner.length(value)?),
        }
    }

    fn default_length(&self) -> usize {
        TAG_LENGTH
    }

    fn framing(&self) -> Framing {
        Framing::Nullable
    }
}

impl<T: Formattable> Formattable for Option<T> {
    const KIND: TypeKind = TypeKind::Generic(GenericShape::Nullable);

    fn build_formatter(resolver: &Resolver) -> Result<Arc<dyn Formatter<Self>>> {
        Ok(Arc::new(NullableFormatter::new(resolver.get_formatter::<T>()?)))
    }
}

// --- pointers ---

/// An owning pointer written exactly like its target.
pub trait Pointer: Sized + 'static {
    type Target: Formattable;

    fn from_target(target: Self::Target) -> Self;

    fn target(&self) -> &Self::Target;
}

macro_rules! impl_pointer {
    ($($ptr:ident),*) => {
        $(
            impl<T: Formattable> Pointer for $ptr<T> {
                type Target = T;

                fn from_target(target: T) -> Self {
                    $ptr::new(target)
                }

                fn target(&self) -> &T {
                    self
                }
            }

            impl<T: Formattable> Formattable for $ptr<T> {
                const KIND: TypeKind = TypeKind::Generic(GenericShape::Pointer);

                fn build_formatter(resolver: &Resolver) -> Result<Arc<dyn Formatter<Self>>> {
                    Ok(Arc::new(PointerFormatter::<Self>::new(
                        resolver.get_formatter::<T>()?,
                    )))
                }
            }
        )*
    };
}

impl_pointer!(Box, Rc, Arc);

pub struct PointerFormatter<P: Pointer> {
    target: Arc<dyn Formatter<P::Target>>,
    _marker: PhantomData<fn() -> P>,
}

impl<P: Pointer> PointerFormatter<P> {
    pub fn new(target: Arc<dyn Formatter<P::Target>>) -> Self {
        Self {
            target,
            _marker: PhantomData,
        }
    }
}

impl<P: Pointer> Formatter<P> for PointerFormatter<P> {
    fn serialize(&self, writer: &mut BufferWriter<'_>, value: &P) -> Result<()> {
        self.target.serialize(writer, value.target())
    }

    fn deserialize(&self, reader: &mut BufferReader<'_>) -> Result<P> {
        self.target.deserialize(reader).map(P::from_target)
    }

    fn length(&self, value: &P) -> Result<usize> {
        self.target.length(value.target())
    }

    fn default_length(&self) -> usize {
        self.target.default_length()
    }

    fn framing(&self) -> Framing {
        self.target.framing()
    }
}

/// Serializing a `RefCell` that is mutably borrowed fails instead of panicking.
pub struct RefCellFormatter<T> {
    inner: Arc<dyn Formatter<T>>,
}

impl<T: 'static> Formatter<RefCell<T>> for RefCellFormatter<T> {
    fn serialize(&self, writer: &mut BufferWriter<'_>, value: &RefCell<T>) -> Result<()> {
        let value = value.try_borrow().map_err(|_| {
            CodecError::Encode(format!(
                "RefCell<{}> is mutably borrowed",
                std::any::type_name::<T>()
            ))
        })?;
        self.inner.serialize(writer, &value)
    }

    fn deserialize(&self, reader: &mut BufferReader<'_>) -> Result<RefCell<T>> {
        self.inner.deserialize(reader).map(RefCell::new)
    }

    fn length(&self, value: &RefCell<T>) -> Result<usize> {
        let value = value.try_borrow().map_err(|_| {
            CodecError::Encode(format!(
                "RefCell<{}> is mutably borrowed",
                std::any::type_name::<T>()
            ))
        })?;
        self.inner.length(&value)
    }

    fn default_length(&self) -> usize {
        self.inner.default_length()
    }

    fn framing(&self) -> Framing {
        self.inner.framing()
    }
}

impl<T: Formattable> Formattable for RefCell<T> {
    const KIND: TypeKind = TypeKind::Generic(GenericShape::Pointer);

    fn build_formatter(resolver: &Resolver) -> Result<Arc<dyn Formatter<Self>>> {
        Ok(Arc::new(RefCellFormatter {
            inner: resolver.get_formatter::<T>()?,
        }))
    }
}

// --- tuples ---

macro_rules! tuple_formatter {
    ($name:ident, $len:expr; $($T:ident $field:ident $idx:tt),+) => {
        pub struct $name<$($T),+> {
            $($field: Arc<dyn Formatter<$T>>,)+
        }

        impl<$($T: Formattable),+> Formatter<($($T,)+)> for $name<$($T),+> {
            fn serialize(&self, writer: &mut BufferWriter<'_>, value: &($($T,)+)) -> Result<()> {
                object::write_header(writer, $len)?;
                $(self.$field.serialize(writer, &value.$idx)?;)+
                Ok(())
            }

            fn deserialize(&self, reader: &mut BufferReader<'_>) -> Result<($($T,)+)> {
                object::read_header(reader, $len, std::any::type_name::<($($T,)+)>())?;
                Ok(($(self.$field.deserialize(reader)?,)+))
            }

            fn length(&self, value: &($($T,)+)) -> Result<usize> {
                Ok(HEADER_LENGTH $(+ self.$field.length(&value.$idx)?)+)
            }

            fn default_length(&self) -> usize {
                HEADER_LENGTH $(+ self.$field.default_length())+
            }
        }

        impl<$($T: Formattable),+> Formattable for ($($T,)+) {
            const KIND: TypeKind = TypeKind::Generic(GenericShape::Tuple);

            fn build_formatter(resolver: &Resolver) -> Result<Arc<dyn Formatter<Self>>> {
                Ok(Arc::new($name {
                    $($field: resolver.get_formatter::<$T>()?,)+
                }))
            }
        }
    };
}

tuple_formatter!(Tuple1Formatter, 1; A a 0);
tuple_formatter!(Tuple2Formatter, 2; A a 0, B b 1);
tuple_formatter!(Tuple3Formatter, 3; A a 0, B b 1, C c 2);
tuple_formatter!(Tuple4Formatter, 4; A a 0, B b 1, C c 2, D d 3);
tuple_formatter!(Tuple5Formatter, 5; A a 0, B b 1, C c 2, D d 3, E e 4);
tuple_formatter!(Tuple6Formatter, 6; A a 0, B b 1, C c 2, D d 3, E e 4, F f 5);
tuple_formatter!(Tuple7Formatter, 7; A a 0, B b 1, C c 2, D d 3, E e 4, F f 5, G g 6);
tuple_formatter!(Tuple8Formatter, 8; A a 0, B b 1, C c 2, D d 3, E e 4, F f 5, G g 6, H h 7);

// --- Result ---

/// `[ArrayHeader, 2, True, ok]` or `[ArrayHeader, 2, False, err]`.
pub struct ResultFormatter<T, E> {
    ok: Arc<dyn Formatter<T>>,
    err: Arc<dyn Formatter<E>>,
}

impl<T: 'static, E: 'static> Formatter<std::result::Result<T, E>> for ResultFormatter<T, E> {
    fn serialize(
        &self,
        writer: &mut BufferWriter<'_>,
        value: &std::result::Result<T, E>,
    ) -> Result<()> {
        object::write_header(writer, 2)?;
        match value {
            Ok(ok) => {
                writer.write_u8(TRUE)?;
                self.ok.serialize(writer, ok)
            }
            Err(err) => {
                writer.write_u8(FALSE)?;
                self.err.serialize(writer, err)
            }
        }
    }

    fn deserialize(&self, reader: &mut BufferReader<'_>) -> Result<std::result::Result<T, E>> {
        object::read_header(reader, 2, "Result")?;
        match reader.read_u8()? {
            TRUE => self.ok.deserialize(reader).map(Ok),
            FALSE => self.err.deserialize(reader).map(Err),
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

    fn length(&self, value: &std::result::Result<T, E>) -> Result<usize> {
        let payload = match value {
            Ok(ok) => self.ok.length(ok)?,
            Err(err) => self.err.length(err)?,
        };
        Ok(HEADER_LENGTH + TAG_LENGTH + payload)
    }

    fn default_length(&self) -> usize {
        HEADER_LENGTH + TAG_LENGTH
    }
}

impl<T: Formattable, E: Formattable> Formattable for std::result::Result<T, E> {
    const KIND: TypeKind = TypeKind::Generic(GenericShape::Result);

    fn build_formatter(resolver: &Resolver) -> Result<Arc<dyn Formatter<Self>>> {
        Ok(Arc::new(ResultFormatter {
            ok: resolver.get_formatter::<T>()?,
            err: resolver.get_formatter::<E>()?,
        }))
    }
}

// --- fixed arrays and boxed slices ---

/// `[T; N]`: a sequence whose count must be exactly `N`.
pub struct ArrayFormatter<T, const N: usize> {
    item: Arc<dyn Formatter<T>>,
}

impl<T: 'static, const N: usize> Formatter<[T; N]> for ArrayFormatter<T, N> {
    fn serialize(&self, writer: &mut BufferWriter<'_>, value: &[T; N]) -> Result<()> {
        let _guard = depth::enter()?;
        writer.write_header(ARRAY_HEADER, N)?;
        value
            .iter()
            .try_for_each(|item| self.item.serialize(writer, item))
    }

    fn deserialize(&self, reader: &mut BufferReader<'_>) -> Result<[T; N]> {
        let _guard = depth::enter()?;
        object::read_header(reader, N, std::any::type_name::<[T; N]>())?;
        let mut items = Vec::with_capacity(N);
        for _ in 0..N {
            items.push(self.item.deserialize(reader)?);
        }
        items.try_into().map_err(|items: Vec<T>| {
            CodecError::from(ShapeError::CountMismatch {
                type_name: std::any::type_name::<[T; N]>(),
                expected: N,
                actual: items.len(),
            })
        })
    }

    fn length(&self, value: &[T; N]) -> Result<usize> {
        let _guard = depth::enter()?;
        let mut total = HEADER_LENGTH;
        for item in value {
            total += self.item.length(item)?;
        }
        Ok(total)
    }

    fn default_length(&self) -> usize {
        HEADER_LENGTH + N * self.item.default_length()
    }
}

impl<T: Formattable, const N: usize> Formattable for [T; N] {
    const KIND: TypeKind = TypeKind::Array;

    fn build_formatter(resolver: &Resolver) -> Result<Arc<dyn Formatter<Self>>> {
        Ok(Arc::new(ArrayFormatter::<T, N> {
            item: resolver.get_formatter::<T>()?,
        }))
    }
}

/// `Box<[T]>` shares the wire layout of `Vec<T>`.
pub struct BoxedSliceFormatter<T: Formattable> {
    vec: CollectionFormatter<Vec<T>>,
}

impl<T: Formattable> Formatter<Box<[T]>> for BoxedSliceFormatter<T> {
    fn serialize(&self, writer: &mut BufferWriter<'_>, value: &Box<[T]>) -> Result<()> {
        let _guard = depth::enter()?;
        writer.write_header(ARRAY_HEADER, value.len())?;
        value
            .iter()
            .try_for_each(|item| self.vec.item.serialize(writer, item))
    }

    fn deserialize(&self, reader: &mut BufferReader<'_>) -> Result<Box<[T]>> {
        self.vec.deserialize(reader).map(Vec::into_boxed_slice)
    }

    fn length(&self, value: &Box<[T]>) -> Result<usize> {
        let _guard = depth::enter()?;
        let mut total = HEADER_LENGTH;
        for item in value.iter() {
            total += self.vec.item.length(item)?;
        }
        Ok(total)
    }

    fn default_length(&self) -> usize {
        HEADER_LENGTH
    }
}

impl<T: Formattable> Formattable for Box<[T]> {
    const KIND: TypeKind = TypeKind::Array;

    fn build_formatter(resolver: &Resolver) -> Result<Arc<dyn Formatter<Self>>> {
        Ok(Arc::new(BoxedSliceFormatter {
            vec: CollectionFormatter::new(resolver.get_formatter::<T>()?),
        }))
    }
}

// --- Bytes ---

/// Raw byte buffer, wire compatible with `Vec<u8>`.
pub struct BytesFormatter;

impl Formatter<Bytes> for BytesFormatter {
    fn serialize(&self, writer: &mut BufferWriter<'_>, value: &Bytes) -> Result<()> {
        writer.write_header(ARRAY_HEADER, value.len())?;
        writer.write_bytes(value)
    }

    fn deserialize(&self, reader: &mut BufferReader<'_>) -> Result<Bytes> {
        if reader.try_read_nil() {
            return Ok(Bytes::new());
        }
        let len = reader.read_header(ARRAY_HEADER)?;
        Ok(Bytes::copy_from_slice(reader.read_bytes(len)?))
    }

    fn length(&self, value: &Bytes) -> Result<usize> {
        Ok(HEADER_LENGTH + value.len())
    }

    fn default_length(&self) -> usize {
        HEADER_LENGTH
    }
}

impl Formattable for Bytes {
    const KIND: TypeKind = TypeKind::Generic(GenericShape::Memory);

    fn build_formatter(_resolver: &Resolver) -> Result<Arc<dyn Formatter<Self>>> {
        Ok(Arc::new(BytesFormatter))
    }
}
