//! Support for plain-object formatters generated by `#[derive(Formattable)]`.
//!
//! An object is written as `[ArrayHeader, member count, members...]` with members in declaration
//! order. Tuples and other fixed-arity composites share the same header.

use crate::reader::BufferReader;
use crate::tags::{ARRAY_HEADER, HEADER_LENGTH};
use crate::writer::BufferWriter;
use crate::{Result, ShapeError};

/// Writes the object header for `count` members.
pub fn write_header(writer: &mut BufferWriter<'_>, count: usize) -> Result<()> {
    writer.write_header(ARRAY_HEADER, count)
}

/// Reads an object header and checks it announces exactly `expected` members.
///
/// On mismatch the cursor is left at the header.
pub fn read_header(
    reader: &mut BufferReader<'_>,
    expected: usize,
    type_name: &'static str,
) -> Result<()> {
    let start = reader.position();
    let actual = reader.read_header(ARRAY_HEADER)?;
    if actual != expected {
        reader.rewind(reader.position() - start)?;
        return Err(ShapeError::CountMismatch {
            type_name,
            expected,
            actual,
        }
        .into());
    }
    Ok(())
}

/// Length of the object header.
pub const fn header_length() -> usize {
    HEADER_LENGTH
}
