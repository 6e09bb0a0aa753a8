//! Schema-versioned payloads.
//!
//! A versioned value is written as `[UInt32, version, body length, body]`. The envelope, the
//! per-version codecs and the version dispatch are separate pieces:
//!
//! - [`write_envelope_header`] / [`read_envelope_header`] handle the prefix only.
//! - Each version is decoded by an ordinary [`Formatter`] or by a [`Migration`] that reads an
//!   older shape and upgrades it.
//! - [`VersionedFormatter::route`] picks one of them for a recorded version.
//!
//! The body is length-prefixed, so a payload with an unknown version is skipped as a whole before
//! the error is returned and the reader stays aligned on whatever follows it.

use crate::formatter::{Formattable, Formatter};
use crate::reader::BufferReader;
use crate::resolver::Resolver;
use crate::tags::{COUNT_LENGTH, TAG_LENGTH, UINT32};
use crate::writer::BufferWriter;
use crate::{CodecError, Result, ShapeError};
use std::any::type_name;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

pub type SchemaVersion = u32;

/// Tag, version and body length.
pub const ENVELOPE_LENGTH: usize = TAG_LENGTH + 4 + COUNT_LENGTH;

pub fn write_envelope_header(
    writer: &mut BufferWriter<'_>,
    version: SchemaVersion,
    body_len: usize,
) -> Result<()> {
    writer.write_u8(UINT32)?;
    writer.write_scalar(version)?;
    writer.write_count(body_len)
}

/// Reads the envelope prefix and returns `(version, body length)`.
///
/// The body length is checked against the remaining bytes. On failure the cursor does not move.
pub fn read_envelope_header(reader: &mut BufferReader<'_>) -> Result<(SchemaVersion, usize)> {
    let start = reader.position();
    let header = read_envelope_fields(reader);
    if header.is_err() {
        reader.rewind(reader.position() - start)?;
    }
    header
}

fn read_envelope_fields(reader: &mut BufferReader<'_>) -> Result<(SchemaVersion, usize)> {
    reader.expect_tag(UINT32)?;
    let version: SchemaVersion = reader.read_scalar()?;
    let body_len = reader.read_count()?;
    let remaining = reader.remaining();
    if body_len > remaining {
        return Err(ShapeError::CountExceedsRemaining {
            count: body_len,
            remaining,
        }
        .into());
    }
    Ok((version, body_len))
}

type Upgrade<T> = Box<dyn Fn(&mut BufferReader<'_>) -> Result<T> + Send + Sync>;

fn boxed_upgrade<T, F>(upgrade: F) -> Upgrade<T>
where
    F: Fn(&mut BufferReader<'_>) -> Result<T> + Send + Sync + 'static,
{
    Box::new(upgrade)
}

/// Decodes a body recorded under an older version and upgrades it to `T`.
pub struct Migration<T> {
    source: &'static str,
    upgrade: Upgrade<T>,
}

impl<T: 'static> Migration<T> {
    /// Reads the body with `old` and converts the result with `upgrade`.
    pub fn new<Old, F>(old: Arc<dyn Formatter<Old>>, upgrade: F) -> Self
    where
        Old: 'static,
        F: Fn(Old) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            source: type_name::<Old>(),
            upgrade: boxed_upgrade(move |reader| upgrade(old.deserialize(reader)?)),
        }
    }

    /// Like [`Migration::new`], resolving the old shape's formatter through `resolver`.
    pub fn from_formattable<Old, F>(resolver: &Resolver, upgrade: F) -> Result<Self>
    where
        Old: Formattable,
        F: Fn(Old) -> Result<T> + Send + Sync + 'static,
    {
        Ok(Self::new(resolver.get_formatter::<Old>()?, upgrade))
    }

    /// Name of the type the old body is decoded as.
    pub fn source(&self) -> &'static str {
        self.source
    }

    pub fn upgrade(&self, reader: &mut BufferReader<'_>) -> Result<T> {
        (self.upgrade)(reader)
    }
}

/// How a recorded version will be decoded.
pub enum VersionRoute<'a, T> {
    Codec(&'a Arc<dyn Formatter<T>>),
    Migration(&'a Migration<T>),
}

/// Writes the current version and reads any version it has a codec or migration for.
pub struct VersionedFormatter<T> {
    current: SchemaVersion,
    codecs: BTreeMap<SchemaVersion, Arc<dyn Formatter<T>>>,
    migrations: BTreeMap<SchemaVersion, Migration<T>>,
}

impl<T: 'static> VersionedFormatter<T> {
    /// `codec` writes and reads version `current`.
    pub fn new(current: SchemaVersion, codec: Arc<dyn Formatter<T>>) -> Self {
        let mut codecs = BTreeMap::new();
        codecs.insert(current, codec);
        Self {
            current,
            codecs,
            migrations: BTreeMap::new(),
        }
    }

    /// Adds a codec that reads `version` directly into `T`.
    pub fn with_codec(mut self, version: SchemaVersion, codec: Arc<dyn Formatter<T>>) -> Self {
        self.codecs.insert(version, codec);
        self
    }

    pub fn with_migration(mut self, version: SchemaVersion, migration: Migration<T>) -> Self {
        self.migrations.insert(version, migration);
        self
    }

    pub fn current_version(&self) -> SchemaVersion {
        self.current
    }

    /// A codec for `version` wins over a migration for it.
    pub fn route(&self, version: SchemaVersion) -> Option<VersionRoute<'_, T>> {
        if let Some(codec) = self.codecs.get(&version) {
            return Some(VersionRoute::Codec(codec));
        }
        self.migrations.get(&version).map(VersionRoute::Migration)
    }

    /// Every version this formatter can read, ascending.
    pub fn supported_versions(&self) -> Vec<SchemaVersion> {
        let mut versions: Vec<_> = self
            .codecs
            .keys()
            .chain(self.migrations.keys())
            .copied()
            .collect();
        versions.sort_unstable();
        versions.dedup();
        versions
    }

    fn current_codec(&self) -> Result<&Arc<dyn Formatter<T>>> {
        self.codecs.get(&self.current).ok_or(CodecError::UnsupportedVersion {
            type_name: type_name::<T>(),
            version: self.current,
        })
    }
}

impl<T: 'static> Formatter<T> for VersionedFormatter<T> {
    fn serialize(&self, writer: &mut BufferWriter<'_>, value: &T) -> Result<()> {
        let codec = self.current_codec()?;
        let body_len = codec.length(value)?;
        write_envelope_header(writer, self.current, body_len)?;
        let before = writer.written();
        codec.serialize(writer, value)?;
        let written = writer.written() - before;
        if written != body_len {
            return Err(CodecError::Encode(format!(
                "{} reported a length of {} but wrote {} bytes",
                type_name::<T>(),
                body_len,
                written
            )));
        }
        Ok(())
    }

    fn deserialize(&self, reader: &mut BufferReader<'_>) -> Result<T> {
        let (version, body_len) = read_envelope_header(reader)?;
        let body = reader.read_bytes(body_len)?;
        let mut body_reader = BufferReader::new(body);
        let value = match self.route(version) {
            Some(VersionRoute::Codec(codec)) => codec.deserialize(&mut body_reader)?,
            Some(VersionRoute::Migration(migration)) => migration.upgrade(&mut body_reader)?,
            None => {
                warn!(
                    type_name = type_name::<T>(),
                    version,
                    skipped = body_len,
                    "skipped payload with unsupported schema version"
                );
                return Err(CodecError::UnsupportedVersion {
                    type_name: type_name::<T>(),
                    version,
                });
            }
        };
        if !body_reader.is_empty() {
            return Err(ShapeError::TrailingBytes {
                remaining: body_reader.remaining(),
            }
            .into());
        }
        Ok(value)
    }

    fn length(&self, value: &T) -> Result<usize> {
        Ok(ENVELOPE_LENGTH + self.current_codec()?.length(value)?)
    }

    fn default_length(&self) -> usize {
        ENVELOPE_LENGTH
            + self
                .codecs
                .get(&self.current)
                .map_or(0, |codec| codec.default_length())
    }
}
