use crate::depth::{self, DEFAULT_MAX_DEPTH};
use crate::formatter::{Formattable, Formatter};
use crate::pool::DEFAULT_SEGMENT_SIZE;
use crate::reader::{self, BufferReader, ByteSource};
use crate::resolver::Resolver;
use crate::writer::{BufferWriter, ByteSink};
use crate::{Result, ShapeError};
use bytes::Bytes;
use once_cell::sync::Lazy;
use std::any::Any;
use std::sync::Arc;

/// Runtime settings for a [`Codec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecOptions {
    /// Deepest nesting allowed before [`crate::CodecError::DepthExceeded`].
    pub max_depth: usize,
    /// Capacity of each pooled segment when the codec owns the output.
    pub segment_size: usize,
    /// Whether [`Codec::deserialize`] fails when bytes are left after the value.
    pub reject_trailing_bytes: bool,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            segment_size: DEFAULT_SEGMENT_SIZE,
            reject_trailing_bytes: true,
        }
    }
}

impl CodecOptions {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_segment_size(mut self, segment_size: usize) -> Self {
        self.segment_size = segment_size;
        self
    }

    pub fn with_reject_trailing_bytes(mut self, reject: bool) -> Self {
        self.reject_trailing_bytes = reject;
        self
    }
}

static GLOBAL: Lazy<Codec> = Lazy::new(|| Codec::new(Resolver::global().clone()));

/// Entry point for whole-value serialize and deserialize calls.
///
/// Each call sets up the depth limit, creates the writer or reader for that call only, and looks
/// the formatter up through the resolver.
#[derive(Debug, Clone)]
pub struct Codec {
    resolver: Resolver,
    options: CodecOptions,
}

impl Codec {
    pub fn new(resolver: Resolver) -> Self {
        Self::with_options(resolver, CodecOptions::default())
    }

    pub fn with_options(resolver: Resolver, options: CodecOptions) -> Self {
        Self { resolver, options }
    }

    /// Codec over the global resolver with default options.
    pub fn global() -> &'static Codec {
        &GLOBAL
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    pub fn formatter<T: Formattable>(&self) -> Result<Arc<dyn Formatter<T>>> {
        self.resolver.get_formatter::<T>()
    }

    /// Serializes into pooled segments and returns the bytes.
    pub fn serialize<T: Formattable>(&self, value: &T) -> Result<Bytes> {
        let formatter = self.formatter::<T>()?;
        let _scope = depth::scope(self.options.max_depth);
        let mut writer = BufferWriter::with_segment_size(self.options.segment_size);
        formatter.serialize(&mut writer, value)?;
        writer.flush_to_array()
    }

    /// Serializes into a caller-supplied sink and returns the number of bytes written.
    pub fn serialize_into<T: Formattable>(&self, value: &T, sink: &mut dyn ByteSink) -> Result<usize> {
        let formatter = self.formatter::<T>()?;
        let _scope = depth::scope(self.options.max_depth);
        let mut writer = BufferWriter::new(sink);
        formatter.serialize(&mut writer, value)?;
        writer.commit()?;
        Ok(writer.written())
    }

    pub fn serialize_to_vec<T: Formattable>(&self, value: &T) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(self.formatter::<T>()?.default_length());
        self.serialize_into(value, &mut output)?;
        Ok(output)
    }

    /// Serializes a value whose type is only known at runtime.
    ///
    /// The type must have been registered or resolved before.
    pub fn serialize_dyn(&self, value: &dyn Any) -> Result<Bytes> {
        let formatter = self.resolver.get_formatter_dyn(value.type_id())?;
        let _scope = depth::scope(self.options.max_depth);
        let mut writer = BufferWriter::with_segment_size(self.options.segment_size);
        formatter.serialize_dyn(&mut writer, value)?;
        writer.flush_to_array()
    }

    /// Decodes one value from `bytes`.
    ///
    /// With `reject_trailing_bytes` set, the value must use the whole slice.
    pub fn deserialize<T: Formattable>(&self, bytes: &[u8]) -> Result<T> {
        let mut reader = BufferReader::new(bytes);
        let value = self.deserialize_from(&mut reader)?;
        if self.options.reject_trailing_bytes && !reader.is_empty() {
            return Err(ShapeError::TrailingBytes {
                remaining: reader.remaining(),
            }
            .into());
        }
        Ok(value)
    }

    /// Decodes one value at the reader's cursor, leaving the cursor after it.
    pub fn deserialize_from<T: Formattable>(&self, reader: &mut BufferReader<'_>) -> Result<T> {
        let formatter = self.formatter::<T>()?;
        let _scope = depth::scope(self.options.max_depth);
        formatter.deserialize(reader)
    }

    /// Gathers a chunked source and decodes one value from it.
    pub fn deserialize_source<T: Formattable>(&self, source: &mut dyn ByteSource) -> Result<T> {
        let bytes = reader::gather(source);
        self.deserialize(&bytes)
    }

    /// Exact encoded size of `value`.
    pub fn length<T: Formattable>(&self, value: &T) -> Result<usize> {
        let formatter = self.formatter::<T>()?;
        let _scope = depth::scope(self.options.max_depth);
        formatter.length(value)
    }
}
