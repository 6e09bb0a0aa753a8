//! Formatter resolver.
//!
//! Maps each type to exactly one formatter instance. Formatters come from the registration table
//! first, then from the cache, and are otherwise built through [`Formattable::build_formatter`]
//! and memoized. Building happens outside the cache lock because building a composite resolves
//! its parts through the same resolver.

use crate::formatter::{Formattable, Formatter, Framing, TypeKind};
use crate::reader::BufferReader;
use crate::writer::BufferWriter;
use crate::{CodecError, ConfigError, Result};
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::RwLock;
use std::any::{type_name, Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::debug;

/// A formatter used through `dyn Any`, for call sites that only know the type at runtime.
pub trait ErasedFormatter: Send + Sync {
    fn value_type_id(&self) -> TypeId;

    fn type_name(&self) -> &'static str;

    /// Fails with [`ConfigError::TypeMismatch`] if `value` is not of this formatter's type.
    fn serialize_dyn(&self, writer: &mut BufferWriter<'_>, value: &dyn Any) -> Result<()>;

    fn deserialize_dyn(&self, reader: &mut BufferReader<'_>) -> Result<Box<dyn Any>>;

    fn length_dyn(&self, value: &dyn Any) -> Result<usize>;
}

struct ErasedAdapter<T: 'static> {
    inner: Arc<dyn Formatter<T>>,
}

impl<T: 'static> ErasedAdapter<T> {
    fn downcast<'v>(&self, value: &'v dyn Any) -> Result<&'v T> {
        value.downcast_ref::<T>().ok_or_else(|| {
            CodecError::from(ConfigError::TypeMismatch {
                expected: type_name::<T>(),
            })
        })
    }
}

impl<T: 'static> ErasedFormatter for ErasedAdapter<T> {
    fn value_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn serialize_dyn(&self, writer: &mut BufferWriter<'_>, value: &dyn Any) -> Result<()> {
        self.inner.serialize(writer, self.downcast(value)?)
    }

    fn deserialize_dyn(&self, reader: &mut BufferReader<'_>) -> Result<Box<dyn Any>> {
        Ok(Box::new(self.inner.deserialize(reader)?))
    }

    fn length_dyn(&self, value: &dyn Any) -> Result<usize> {
        self.inner.length(self.downcast(value)?)
    }
}

/// One memoization slot.
struct Entry {
    /// Holds an `Arc<dyn Formatter<T>>`.
    typed: Arc<dyn Any + Send + Sync>,
    erased: Arc<dyn ErasedFormatter>,
}

impl Entry {
    fn new<T: 'static>(formatter: Arc<dyn Formatter<T>>) -> Self {
        Self {
            erased: Arc::new(ErasedAdapter {
                inner: formatter.clone(),
            }),
            typed: Arc::new(formatter),
        }
    }

    fn typed<T: 'static>(&self) -> Result<Arc<dyn Formatter<T>>> {
        (*self.typed)
            .downcast_ref::<Arc<dyn Formatter<T>>>()
            .cloned()
            .ok_or_else(|| {
                CodecError::from(ConfigError::TypeMismatch {
                    expected: type_name::<T>(),
                })
            })
    }
}

struct ResolverInner {
    registered: HashMap<TypeId, Entry>,
    cache: RwLock<HashMap<TypeId, Entry>>,
}

thread_local! {
    /// Types whose formatter is being built on this thread, keyed by resolver.
    static BUILDING: RefCell<Vec<(usize, TypeId)>> = const { RefCell::new(Vec::new()) };
}

struct BuildingGuard;

impl BuildingGuard {
    fn push(key: (usize, TypeId)) -> Self {
        BUILDING.with(|building| building.borrow_mut().push(key));
        BuildingGuard
    }
}

impl Drop for BuildingGuard {
    fn drop(&mut self) {
        BUILDING.with(|building| {
            building.borrow_mut().pop();
        });
    }
}

static GLOBAL: Lazy<Resolver> = Lazy::new(Resolver::new);

/// Type to formatter registry. Cheap to clone; clones share one cache.
#[derive(Clone)]
pub struct Resolver {
    inner: Arc<ResolverInner>,
}

impl Resolver {
    /// A resolver with no registrations.
    pub fn new() -> Self {
        Self::from_registered(HashMap::new())
    }

    pub fn builder() -> ResolverBuilder {
        ResolverBuilder::default()
    }

    /// The process-wide resolver used by [`crate::serialize`] and friends.
    pub fn global() -> &'static Resolver {
        &GLOBAL
    }

    fn from_registered(registered: HashMap<TypeId, Entry>) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                registered,
                cache: RwLock::new(HashMap::new()),
            }),
        }
    }

    fn key(&self, id: TypeId) -> (usize, TypeId) {
        (Arc::as_ptr(&self.inner) as usize, id)
    }

    fn is_building(&self, id: TypeId) -> bool {
        let key = self.key(id);
        BUILDING.with(|building| building.borrow().contains(&key))
    }

    /// Returns the formatter for `T`, building and caching it on first use.
    ///
    /// Every call for the same `T` returns the same instance.
    ///
    /// # Errors
    /// [`ConfigError::AbstractType`] if `T` is abstract and nothing was registered for it, or any
    /// error raised while building the formatters `T` depends on.
    pub fn get_formatter<T: Formattable>(&self) -> Result<Arc<dyn Formatter<T>>> {
        let id = TypeId::of::<T>();
        if let Some(entry) = self.inner.registered.get(&id) {
            return entry.typed::<T>();
        }
        if let Some(entry) = self.inner.cache.read().get(&id) {
            return entry.typed::<T>();
        }
        if matches!(T::KIND, TypeKind::Abstract) {
            return Err(ConfigError::AbstractType {
                type_name: type_name::<T>(),
            }
            .into());
        }
        if self.is_building(id) {
            // Recursive type: hand out a placeholder that looks the finished formatter up later.
            return Ok(Arc::new(DeferredFormatter::<T>::new(self)));
        }

        let formatter = {
            let _building = BuildingGuard::push(self.key(id));
            debug!(type_name = type_name::<T>(), kind = ?T::KIND, "building formatter");
            T::build_formatter(self)?
        };

        let mut cache = self.inner.cache.write();
        cache
            .entry(id)
            .or_insert_with(|| Entry::new(formatter))
            .typed::<T>()
    }

    /// Untyped lookup for call sites that only have a `TypeId`.
    ///
    /// Only types that were registered, preloaded with [`ResolverBuilder::resolve`], or already
    /// resolved through [`Resolver::get_formatter`] are known here; there is no way to build a
    /// formatter from a `TypeId` alone.
    pub fn get_formatter_dyn(&self, id: TypeId) -> Result<Arc<dyn ErasedFormatter>> {
        if let Some(entry) = self.inner.registered.get(&id) {
            return Ok(entry.erased.clone());
        }
        match self.inner.cache.read().get(&id) {
            Some(entry) => Ok(entry.erased.clone()),
            None => Err(ConfigError::Unresolved {
                type_name: format!("{:?}", id),
            }
            .into()),
        }
    }

    /// Resolves `T` and returns its erased form.
    pub fn erased<T: Formattable>(&self) -> Result<Arc<dyn ErasedFormatter>> {
        self.get_formatter::<T>()?;
        self.get_formatter_dyn(TypeId::of::<T>())
    }

    /// The formatter registered for `T`, if any. `T` need not be [`Formattable`].
    pub fn registered<T: 'static>(&self) -> Option<Arc<dyn Formatter<T>>> {
        self.inner
            .registered
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.typed::<T>().ok())
    }

    pub fn is_cached<T: 'static>(&self) -> bool {
        self.inner.cache.read().contains_key(&TypeId::of::<T>())
    }

    /// Number of formatters built and memoized so far.
    pub fn cached_count(&self) -> usize {
        self.inner.cache.read().len()
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("registered", &self.inner.registered.len())
            .field("cached", &self.cached_count())
            .finish()
    }
}

/// Stands in for the formatter of a type that is still being built, so a type can contain
/// itself through a pointer or collection.
struct DeferredFormatter<T: 'static> {
    resolver: Weak<ResolverInner>,
    slot: OnceCell<Arc<dyn Formatter<T>>>,
}

impl<T: Formattable> DeferredFormatter<T> {
    fn new(resolver: &Resolver) -> Self {
        Self {
            resolver: Arc::downgrade(&resolver.inner),
            slot: OnceCell::new(),
        }
    }

    fn target(&self) -> Result<&Arc<dyn Formatter<T>>> {
        self.slot.get_or_try_init(|| -> Result<Arc<dyn Formatter<T>>> {
            let inner = self.resolver.upgrade().ok_or(ConfigError::ResolverDropped {
                type_name: type_name::<T>(),
            })?;
            let resolver = Resolver { inner };
            if resolver.is_building(TypeId::of::<T>()) {
                return Err(ConfigError::Unresolved {
                    type_name: type_name::<T>().to_string(),
                }
                .into());
            }
            resolver.get_formatter::<T>()
        })
    }
}

impl<T: Formattable> Formatter<T> for DeferredFormatter<T> {
    fn serialize(&self, writer: &mut BufferWriter<'_>, value: &T) -> Result<()> {
        self.target()?.serialize(writer, value)
    }

    fn deserialize(&self, reader: &mut BufferReader<'_>) -> Result<T> {
        self.target()?.deserialize(reader)
    }

    fn length(&self, value: &T) -> Result<usize> {
        self.target()?.length(value)
    }

    fn default_length(&self) -> usize {
        self.target().map_or(0, |target| target.default_length())
    }

    fn framing(&self) -> Framing {
        self.target()
            .map_or(Framing::SelfDescribing, |target| target.framing())
    }
}

type Preload = fn(&Resolver) -> Result<()>;

fn preload<T: Formattable>(resolver: &Resolver) -> Result<()> {
    resolver.get_formatter::<T>().map(drop)
}

/// Startup registration: a table from type to formatter instance.
///
/// Registered formatters win over anything the resolver would build, including for abstract
/// types.
#[derive(Default)]
pub struct ResolverBuilder {
    registered: HashMap<TypeId, Entry>,
    duplicates: Vec<&'static str>,
    preloads: Vec<Preload>,
}

impl ResolverBuilder {
    pub fn register<T, F>(self, formatter: F) -> Self
    where
        T: 'static,
        F: Formatter<T>,
    {
        self.register_shared::<T>(Arc::new(formatter))
    }

    pub fn register_shared<T: 'static>(mut self, formatter: Arc<dyn Formatter<T>>) -> Self {
        let id = TypeId::of::<T>();
        if self.registered.contains_key(&id) {
            self.duplicates.push(type_name::<T>());
        } else {
            debug!(type_name = type_name::<T>(), "registered formatter");
            self.registered.insert(id, Entry::new(formatter));
        }
        self
    }

    /// Builds the formatter for `T` when the resolver is built, so untyped lookups through
    /// [`Resolver::get_formatter_dyn`] find it without a typed call first.
    pub fn resolve<T: Formattable>(mut self) -> Self {
        self.preloads.push(preload::<T>);
        self
    }

    /// # Errors
    /// [`ConfigError::DuplicateRegistration`] if any type was registered twice, or the error of
    /// a type passed to [`ResolverBuilder::resolve`] that cannot be resolved.
    pub fn build(self) -> Result<Resolver> {
        if let Some(&type_name) = self.duplicates.first() {
            return Err(ConfigError::DuplicateRegistration { type_name }.into());
        }
        let resolver = Resolver::from_registered(self.registered);
        for preload in &self.preloads {
            preload(&resolver)?;
        }
        Ok(resolver)
    }
}

impl std::fmt::Debug for ResolverBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverBuilder")
            .field("registered", &self.registered.len())
            .field("duplicates", &self.duplicates)
            .field("preloads", &self.preloads.len())
            .finish()
    }
}
