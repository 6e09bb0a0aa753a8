#[cfg(feature = "chrono")]
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Timelike, Utc};
#[cfg(feature = "indexmap")]
use indexmap::{IndexMap, IndexSet};
#[cfg(feature = "rust_decimal")]
use rust_decimal::Decimal;
#[cfg(feature = "serde_json")]
use serde_json::{Map, Number, Value};
#[cfg(feature = "smol_str")]
use smol_str::SmolStr;
#[cfg(feature = "ulid")]
use ulid::Ulid;
#[cfg(feature = "uuid")]
use uuid::Uuid;

#[allow(unused_imports)]
use crate::formatter::{Formattable, Formatter, Framing, GenericShape, TypeKind};
#[allow(unused_imports)]
use crate::reader::BufferReader;
#[allow(unused_imports)]
use crate::resolver::Resolver;
#[allow(unused_imports)]
use crate::writer::BufferWriter;
#[allow(unused_imports)]
use crate::{Result, ShapeError};
#[allow(unused_imports)]
use std::sync::Arc;

// --- 16-byte identifiers ---

/// A value with a fixed 16-byte representation, written raw.
#[allow(dead_code)]
trait Bytes16: Sized {
    fn to_wire(&self) -> [u8; 16];
    fn from_wire(bytes: [u8; 16]) -> Result<Self>;
}

#[allow(dead_code)]
struct Bytes16Formatter<T>(std::marker::PhantomData<fn() -> T>);

impl<T: Bytes16 + 'static> Formatter<T> for Bytes16Formatter<T> {
    fn serialize(&self, writer: &mut BufferWriter<'_>, value: &T) -> Result<()> {
        writer.write_bytes(&value.to_wire())
    }

    fn deserialize(&self, reader: &mut BufferReader<'_>) -> Result<T> {
        let mut raw = [0u8; 16];
        raw.copy_from_slice(reader.read_bytes(16)?);
        match T::from_wire(raw) {
            Ok(value) => Ok(value),
            Err(err) => {
                reader.rewind(16)?;
                Err(err)
            }
        }
    }

    fn length(&self, _value: &T) -> Result<usize> {
        Ok(16)
    }

    fn default_length(&self) -> usize {
        16
    }

    fn framing(&self) -> Framing {
        Framing::Raw
    }
}

#[allow(unused_macros)]
macro_rules! formattable_bytes16 {
    ($ty:ty) => {
        impl Formattable for $ty {
            const KIND: TypeKind = TypeKind::Scalar;

            fn build_formatter(_resolver: &Resolver) -> Result<Arc<dyn Formatter<Self>>> {
                Ok(Arc::new(Bytes16Formatter::<$ty>(std::marker::PhantomData)))
            }
        }
    };
}

// --- Uuid ---
#[cfg(feature = "uuid")]
impl Bytes16 for Uuid {
    fn to_wire(&self) -> [u8; 16] {
        *self.as_bytes()
    }

    fn from_wire(bytes: [u8; 16]) -> Result<Self> {
        Ok(Uuid::from_bytes(bytes))
    }
}

#[cfg(feature = "uuid")]
formattable_bytes16!(Uuid);

// --- Ulid ---
#[cfg(feature = "ulid")]
impl Bytes16 for Ulid {
    fn to_wire(&self) -> [u8; 16] {
        self.to_bytes()
    }

    fn from_wire(bytes: [u8; 16]) -> Result<Self> {
        Ok(Ulid::from_bytes(bytes))
    }
}

#[cfg(feature = "ulid")]
formattable_bytes16!(Ulid);

// --- Decimal ---
/// `Decimal::serialize` layout: flags, then the 96-bit mantissa.
#[cfg(feature = "rust_decimal")]
impl Bytes16 for Decimal {
    fn to_wire(&self) -> [u8; 16] {
        self.serialize()
    }

    fn from_wire(bytes: [u8; 16]) -> Result<Self> {
        // Scale lives in bits 16..24 of the flags word and cannot exceed 28.
        let scale = bytes[2];
        if scale > 28 {
            return Err(ShapeError::InvalidValue {
                type_name: "Decimal",
                reason: format!("scale {} exceeds 28", scale),
            }
            .into());
        }
        Ok(Decimal::deserialize(bytes))
    }
}

#[cfg(feature = "rust_decimal")]
formattable_bytes16!(Decimal);

// --- DateTime<Utc> ---
/// Seconds since the Unix epoch (i64) and subsecond nanoseconds (u32), written raw.
#[cfg(feature = "chrono")]
pub struct DateTimeFormatter;

#[cfg(feature = "chrono")]
impl Formatter<DateTime<Utc>> for DateTimeFormatter {
    fn serialize(&self, writer: &mut BufferWriter<'_>, value: &DateTime<Utc>) -> Result<()> {
        writer.write_scalar(value.timestamp())?;
        writer.write_scalar(value.timestamp_subsec_nanos())
    }

    fn deserialize(&self, reader: &mut BufferReader<'_>) -> Result<DateTime<Utc>> {
        let secs: i64 = reader.read_scalar()?;
        let nanos: u32 = reader.read_scalar()?;
        match DateTime::from_timestamp(secs, nanos) {
            Some(value) => Ok(value),
            None => {
                reader.rewind(12)?;
                Err(ShapeError::InvalidValue {
                    type_name: "DateTime<Utc>",
                    reason: format!("{} seconds, {} nanos is out of range", secs, nanos),
                }
                .into())
            }
        }
    }

    fn length(&self, _value: &DateTime<Utc>) -> Result<usize> {
        Ok(12)
    }

    fn default_length(&self) -> usize {
        12
    }

    fn framing(&self) -> Framing {
        Framing::Raw
    }
}

#[cfg(feature = "chrono")]
impl Formattable for DateTime<Utc> {
    const KIND: TypeKind = TypeKind::Scalar;

    fn build_formatter(_resolver: &Resolver) -> Result<Arc<dyn Formatter<Self>>> {
        Ok(Arc::new(DateTimeFormatter))
    }
}

// --- NaiveDate ---
/// Days from 0001-01-01 (day 1) in the 32-bit signed layout.
#[cfg(feature = "chrono")]
pub struct NaiveDateFormatter;

#[cfg(feature = "chrono")]
impl Formatter<NaiveDate> for NaiveDateFormatter {
    fn serialize(&self, writer: &mut BufferWriter<'_>, value: &NaiveDate) -> Result<()> {
        writer.write_scalar(value.num_days_from_ce())
    }

    fn deserialize(&self, reader: &mut BufferReader<'_>) -> Result<NaiveDate> {
        let days: i32 = reader.read_scalar()?;
        match NaiveDate::from_num_days_from_ce_opt(days) {
            Some(date) => Ok(date),
            None => {
                reader.rewind(4)?;
                Err(ShapeError::InvalidValue {
                    type_name: "NaiveDate",
                    reason: format!("{} days from CE is out of range", days),
                }
                .into())
            }
        }
    }

    fn length(&self, _value: &NaiveDate) -> Result<usize> {
        Ok(4)
    }

    fn default_length(&self) -> usize {
        4
    }

    fn framing(&self) -> Framing {
        Framing::Scalar(crate::tags::INT32)
    }
}

#[cfg(feature = "chrono")]
impl Formattable for NaiveDate {
    const KIND: TypeKind = TypeKind::Scalar;

    fn build_formatter(_resolver: &Resolver) -> Result<Arc<dyn Formatter<Self>>> {
        Ok(Arc::new(NaiveDateFormatter))
    }
}

// --- NaiveTime ---
/// Seconds from midnight and nanoseconds, both u32, written raw. Nanoseconds may reach
/// 1_999_999_999 during a leap second.
#[cfg(feature = "chrono")]
pub struct NaiveTimeFormatter;

#[cfg(feature = "chrono")]
impl Formatter<NaiveTime> for NaiveTimeFormatter {
    fn serialize(&self, writer: &mut BufferWriter<'_>, value: &NaiveTime) -> Result<()> {
        writer.write_scalar(value.num_seconds_from_midnight())?;
        writer.write_scalar(value.nanosecond())
    }

    fn deserialize(&self, reader: &mut BufferReader<'_>) -> Result<NaiveTime> {
        let secs: u32 = reader.read_scalar()?;
        let nanos: u32 = reader.read_scalar()?;
        match NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos) {
            Some(time) => Ok(time),
            None => {
                reader.rewind(8)?;
                Err(ShapeError::InvalidValue {
                    type_name: "NaiveTime",
                    reason: format!("{} seconds, {} nanos from midnight", secs, nanos),
                }
                .into())
            }
        }
    }

    fn length(&self, _value: &NaiveTime) -> Result<usize> {
        Ok(8)
    }

    fn default_length(&self) -> usize {
        8
    }

    fn framing(&self) -> Framing {
        Framing::Raw
    }
}

#[cfg(feature = "chrono")]
impl Formattable for NaiveTime {
    const KIND: TypeKind = TypeKind::Scalar;

    fn build_formatter(_resolver: &Resolver) -> Result<Arc<dyn Formatter<Self>>> {
        Ok(Arc::new(NaiveTimeFormatter))
    }
}

// --- IndexSet ---
#[cfg(feature = "indexmap")]
impl<T, S> crate::Sequence for IndexSet<T, S>
where
    T: Formattable + Eq + std::hash::Hash,
    S: std::hash::BuildHasher + Default + 'static,
{
    type Item = T;
    const SHAPE: GenericShape = GenericShape::Set;

    fn seq_len(&self) -> usize {
        self.len()
    }

    fn for_each_item<F>(&self, f: F) -> Result<()>
    where
        F: FnMut(&T) -> Result<()>,
    {
        self.iter().try_for_each(f)
    }

    fn with_capacity(capacity: usize) -> Self {
        IndexSet::with_capacity_and_hasher(capacity, S::default())
    }

    fn push_item(&mut self, item: T) {
        self.insert(item);
    }
}

#[cfg(feature = "indexmap")]
impl<T, S> Formattable for IndexSet<T, S>
where
    T: Formattable + Eq + std::hash::Hash,
    S: std::hash::BuildHasher + Default + 'static,
{
    const KIND: TypeKind = TypeKind::Generic(GenericShape::Set);

    fn build_formatter(resolver: &Resolver) -> Result<Arc<dyn Formatter<Self>>> {
        crate::composite::CollectionFormatter::<Self>::build(resolver)
    }
}

// --- IndexMap ---
#[cfg(feature = "indexmap")]
impl<K, V, S> crate::MapLike for IndexMap<K, V, S>
where
    K: Formattable + Eq + std::hash::Hash,
    V: Formattable,
    S: std::hash::BuildHasher + Default + 'static,
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
        IndexMap::with_capacity_and_hasher(capacity, S::default())
    }

    fn insert_entry(&mut self, key: K, value: V) {
        self.insert(key, value);
    }
}

#[cfg(feature = "indexmap")]
impl<K, V, S> Formattable for IndexMap<K, V, S>
where
    K: Formattable + Eq + std::hash::Hash,
    V: Formattable,
    S: std::hash::BuildHasher + Default + 'static,
{
    const KIND: TypeKind = TypeKind::Generic(GenericShape::Map);

    fn build_formatter(resolver: &Resolver) -> Result<Arc<dyn Formatter<Self>>> {
        crate::composite::MapFormatter::<Self>::build(resolver)
    }
}

// --- SmolStr ---
/// Same wire layout as `String`.
#[cfg(feature = "smol_str")]
pub struct SmolStrFormatter;

#[cfg(feature = "smol_str")]
impl Formatter<SmolStr> for SmolStrFormatter {
    fn serialize(&self, writer: &mut BufferWriter<'_>, value: &SmolStr) -> Result<()> {
        crate::core::write_str(writer, value)
    }

    fn deserialize(&self, reader: &mut BufferReader<'_>) -> Result<SmolStr> {
        Ok(crate::core::read_str(reader)?
            .map(SmolStr::new)
            .unwrap_or_default())
    }

    fn length(&self, value: &SmolStr) -> Result<usize> {
        Ok(crate::core::str_length(value))
    }

    fn default_length(&self) -> usize {
        crate::tags::HEADER_LENGTH
    }
}

#[cfg(feature = "smol_str")]
impl Formattable for SmolStr {
    const KIND: TypeKind = TypeKind::Scalar;

    fn build_formatter(_resolver: &Resolver) -> Result<Arc<dyn Formatter<Self>>> {
        Ok(Arc::new(SmolStrFormatter))
    }
}

// --- serde_json::Value ---
/// Fully self-describing: every node carries a tag from the tag table, so a `Value` can be
/// decoded without knowing its shape. Numbers are written as `UInt64`, `Int64` or `Float64`;
/// any scalar tag is accepted on decode.
#[cfg(feature = "serde_json")]
pub struct JsonValueFormatter;

#[cfg(feature = "serde_json")]
mod json {
    use super::*;
    use crate::depth;
    use crate::tags::{
        ScalarKind, ARRAY_HEADER, FALSE, FLOAT64, HEADER_LENGTH, INT64, MAP_HEADER, NIL, STRING,
        TRUE, UINT64,
    };

    pub(super) fn write_value(writer: &mut BufferWriter<'_>, value: &Value) -> Result<()> {
        match value {
            Value::Null => writer.write_u8(NIL),
            Value::Bool(b) => writer.write_u8(if *b { TRUE } else { FALSE }),
            Value::Number(n) => write_number(writer, n),
            Value::String(s) => crate::core::write_str(writer, s),
            Value::Array(items) => {
                let _guard = depth::enter()?;
                writer.write_header(ARRAY_HEADER, items.len())?;
                items.iter().try_for_each(|item| write_value(writer, item))
            }
            Value::Object(entries) => {
                let _guard = depth::enter()?;
                writer.write_header(MAP_HEADER, entries.len())?;
                entries.iter().try_for_each(|(key, item)| {
                    crate::core::write_str(writer, key)?;
                    write_value(writer, item)
                })
            }
        }
    }

    fn write_number(writer: &mut BufferWriter<'_>, n: &Number) -> Result<()> {
        if let Some(u) = n.as_u64() {
            writer.write_u8(UINT64)?;
            writer.write_scalar(u)
        } else if let Some(i) = n.as_i64() {
            writer.write_u8(INT64)?;
            writer.write_scalar(i)
        } else {
            let f = n.as_f64().ok_or_else(|| {
                crate::CodecError::Encode(format!("JSON number {} has no f64 form", n))
            })?;
            writer.write_u8(FLOAT64)?;
            writer.write_scalar(f)
        }
    }

    pub(super) fn value_length(value: &Value) -> Result<usize> {
        Ok(match value {
            Value::Null | Value::Bool(_) => 1,
            Value::Number(_) => 1 + 8,
            Value::String(s) => crate::core::str_length(s),
            Value::Array(items) => {
                let _guard = depth::enter()?;
                let mut total = HEADER_LENGTH;
                for item in items {
                    total += value_length(item)?;
                }
                total
            }
            Value::Object(entries) => {
                let _guard = depth::enter()?;
                let mut total = HEADER_LENGTH;
                for (key, item) in entries {
                    total += crate::core::str_length(key) + value_length(item)?;
                }
                total
            }
        })
    }

    pub(super) fn read_value(reader: &mut BufferReader<'_>) -> Result<Value> {
        let tag = reader
            .peek_u8()
            .ok_or(crate::CodecError::InsufficientData {
                needed: 1,
                remaining: 0,
            })?;
        match tag {
            NIL => {
                reader.advance(1)?;
                Ok(Value::Null)
            }
            FALSE | TRUE => {
                reader.advance(1)?;
                Ok(Value::Bool(tag == TRUE))
            }
            STRING => Ok(Value::String(
                crate::core::read_str(reader)?.unwrap_or_default().to_owned(),
            )),
            ARRAY_HEADER => {
                let _guard = depth::enter()?;
                let count = reader.read_header(ARRAY_HEADER)?;
                let mut items =
                    Vec::with_capacity(crate::composite::prealloc_capacity::<Value>(count));
                for _ in 0..count {
                    items.push(read_value(reader)?);
                }
                Ok(Value::Array(items))
            }
            MAP_HEADER => {
                let _guard = depth::enter()?;
                let count = reader.read_header(MAP_HEADER)?;
                let mut entries = Map::new();
                for _ in 0..count {
                    let key = crate::core::read_str(reader)?
                        .unwrap_or_default()
                        .to_owned();
                    entries.insert(key, read_value(reader)?);
                }
                Ok(Value::Object(entries))
            }
            other => match ScalarKind::from_tag(other) {
                Some(kind) => {
                    reader.advance(1)?;
                    read_number(reader, kind).map(Value::Number)
                }
                None => Err(ShapeError::InvalidValue {
                    type_name: "serde_json::Value",
                    reason: format!("tag 0x{:02X} does not start a value", other),
                }
                .into()),
            },
        }
    }

    fn read_number(reader: &mut BufferReader<'_>, kind: ScalarKind) -> Result<Number> {
        let number = match kind {
            ScalarKind::U8 => Number::from(reader.read_scalar::<u8>()?),
            ScalarKind::U16 => Number::from(reader.read_scalar::<u16>()?),
            ScalarKind::U32 => Number::from(reader.read_scalar::<u32>()?),
            ScalarKind::U64 => Number::from(reader.read_scalar::<u64>()?),
            ScalarKind::I8 => Number::from(reader.read_scalar::<i8>()?),
            ScalarKind::I16 => Number::from(reader.read_scalar::<i16>()?),
            ScalarKind::I32 => Number::from(reader.read_scalar::<i32>()?),
            ScalarKind::I64 => Number::from(reader.read_scalar::<i64>()?),
            ScalarKind::F32 => float(reader.read_scalar::<f32>()? as f64)?,
            ScalarKind::F64 => float(reader.read_scalar::<f64>()?)?,
        };
        Ok(number)
    }

    fn float(f: f64) -> Result<Number> {
        Number::from_f64(f).ok_or_else(|| {
            crate::CodecError::from(ShapeError::InvalidValue {
                type_name: "serde_json::Number",
                reason: format!("{} is not a finite number", f),
            })
        })
    }
}

#[cfg(feature = "serde_json")]
impl Formatter<Value> for JsonValueFormatter {
    fn serialize(&self, writer: &mut BufferWriter<'_>, value: &Value) -> Result<()> {
        json::write_value(writer, value)
    }

    fn deserialize(&self, reader: &mut BufferReader<'_>) -> Result<Value> {
        json::read_value(reader)
    }

    fn length(&self, value: &Value) -> Result<usize> {
        json::value_length(value)
    }

    fn default_length(&self) -> usize {
        1
    }

    fn framing(&self) -> Framing {
        Framing::Nullable
    }
}

#[cfg(feature = "serde_json")]
impl Formattable for Value {
    const KIND: TypeKind = TypeKind::Generic(GenericShape::Nullable);

    fn build_formatter(_resolver: &Resolver) -> Result<Arc<dyn Formatter<Self>>> {
        Ok(Arc::new(JsonValueFormatter))
    }
}
