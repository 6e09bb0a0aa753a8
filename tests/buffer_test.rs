use bytes::buf::UninitSlice;
use bytes::{Bytes, BytesMut};
use wirepack::pool::SegmentPool;
use wirepack::scalar::Endian;
use wirepack::tags::{ARRAY_HEADER, STRING};
use wirepack::{
    BufferReader, BufferWriter, ByteSink, CapacityError, Codec, CodecError, SegmentChain,
    ShapeError,
};

#[test]
fn test_writes_reach_the_sink_on_commit() {
    let mut out: Vec<u8> = Vec::new();
    {
        let mut writer = BufferWriter::new(&mut out);
        writer.write_u8(1).unwrap();
        writer.write_scalar(0x0203u16).unwrap();
        assert_eq!(writer.pending(), 3);
        writer.commit().unwrap();
        assert_eq!(writer.pending(), 0);
        assert_eq!(writer.written(), 3);
    }
    assert_eq!(out, vec![1, 2, 3]);
}

#[test]
fn test_uncommitted_writes_are_not_visible() {
    let mut out = BytesMut::new();
    {
        let mut writer = BufferWriter::new(&mut out);
        writer.write_bytes(b"abc").unwrap();
        assert_eq!(writer.written(), 3);
    }
    assert!(out.is_empty());
}

#[test]
fn test_writable_window_and_advance() {
    let mut out: Vec<u8> = Vec::new();
    {
        let mut writer = BufferWriter::new(&mut out);
        let window = writer.get_writable_window(4).unwrap();
        assert!(window.len() >= 4);
        window[..4].copy_from_slice(&[9, 8, 7, 6]);
        // SAFETY: four bytes were written into the window above.
        unsafe { writer.advance(4) }.unwrap();
        writer.commit().unwrap();
    }
    assert_eq!(out, vec![9, 8, 7, 6]);
}

#[test]
fn test_advance_past_window_fails() {
    let mut out: Vec<u8> = Vec::new();
    let mut writer = BufferWriter::new(&mut out);
    // SAFETY: the call is rejected before any byte is assumed written.
    let result = unsafe { writer.advance(1) };
    assert!(matches!(
        result,
        Err(CodecError::Capacity(CapacityError::AdvancePastWindow {
            count: 1,
            available: 0
        }))
    ));
}

/// A sink that never has room.
struct EmptySink {
    buf: Vec<u8>,
}

impl ByteSink for EmptySink {
    fn writable_window(&mut self, _min_size: usize) -> &mut UninitSlice {
        UninitSlice::new(&mut self.buf[..0])
    }

    unsafe fn commit(&mut self, _count: usize) -> wirepack::Result<()> {
        Ok(())
    }
}

/// A sink whose window is always two bytes long.
struct TinySink {
    buf: [u8; 2],
    committed: Vec<u8>,
}

impl ByteSink for TinySink {
    fn writable_window(&mut self, _min_size: usize) -> &mut UninitSlice {
        UninitSlice::new(&mut self.buf[..])
    }

    unsafe fn commit(&mut self, count: usize) -> wirepack::Result<()> {
        self.committed.extend_from_slice(&self.buf[..count]);
        Ok(())
    }
}

#[test]
fn test_misbehaving_sinks_are_reported() {
    let mut empty = EmptySink { buf: Vec::new() };
    let mut writer = BufferWriter::new(&mut empty);
    assert!(matches!(
        writer.write_u8(1),
        Err(CodecError::Capacity(CapacityError::EmptyWindow))
    ));

    let mut tiny = TinySink {
        buf: [0; 2],
        committed: Vec::new(),
    };
    {
        let mut writer = BufferWriter::new(&mut tiny);
        assert!(matches!(
            writer.write_scalar(1u32),
            Err(CodecError::Capacity(CapacityError::WindowTooSmall {
                requested: 4,
                available: 2
            }))
        ));
        // Byte-wise writes still fit.
        writer.write_bytes(b"hello").unwrap();
        writer.commit().unwrap();
    }
    assert_eq!(tiny.committed, b"hello".to_vec());
}

#[test]
fn test_pooled_output_spans_segments() {
    SegmentPool::clear();
    let data: Vec<u8> = (0..100).collect();

    let mut chain = SegmentChain::with_segment_size(8);
    {
        let mut writer = BufferWriter::new(&mut chain);
        writer.write_bytes(&data).unwrap();
        writer.write_scalar(0xABCD_EF01u32).unwrap();
        writer.commit().unwrap();
    }
    assert_eq!(chain.len(), 104);
    assert!(chain.segment_count() > 1);

    let mut copy = BytesMut::new();
    chain.copy_to(&mut copy);
    let frozen = chain.freeze();
    assert_eq!(frozen, copy.freeze());
    assert_eq!(&frozen[..100], &data[..]);
    assert_eq!(&frozen[100..], &[0xAB, 0xCD, 0xEF, 0x01]);
    assert!(SegmentPool::pooled_count() > 0);
}

#[test]
fn test_owned_writer_flushes_to_one_buffer() {
    let mut writer = BufferWriter::with_segment_size(4);
    writer.write_header(ARRAY_HEADER, 2).unwrap();
    writer.write_scalar(-1i16).unwrap();
    writer.write_scalar(2i16).unwrap();
    let mut copy = BytesMut::new();
    writer.copy_to(&mut copy).unwrap();
    let bytes = writer.flush_to_array().unwrap();
    assert_eq!(&bytes[..], &[ARRAY_HEADER, 0, 0, 0, 2, 0xFF, 0xFF, 0, 2]);
    assert_eq!(bytes, copy.freeze());
}

#[test]
fn test_flush_requires_owned_output() {
    let mut out: Vec<u8> = Vec::new();
    let writer = BufferWriter::new(&mut out);
    assert!(matches!(
        writer.flush_to_array(),
        Err(CodecError::Capacity(CapacityError::ExternalSink))
    ));
}

#[cfg(target_pointer_width = "64")]
#[test]
fn test_count_must_fit_32_bits() {
    let mut writer = BufferWriter::pooled();
    let too_many = u32::MAX as usize + 1;
    assert!(matches!(
        writer.write_count(too_many),
        Err(CodecError::Capacity(CapacityError::CountOverflow(n))) if n == too_many
    ));
}

#[test]
fn test_explicit_endianness() {
    let mut writer = BufferWriter::pooled();
    writer
        .write_scalar_with(0x0102_0304u32, Endian::Little)
        .unwrap();
    writer.write_scalar(0x0102_0304u32).unwrap();
    let bytes = writer.flush_to_array().unwrap();
    assert_eq!(&bytes[..], &[4, 3, 2, 1, 1, 2, 3, 4]);

    let mut reader = BufferReader::new(&bytes);
    assert_eq!(
        reader.read_scalar_with::<u32>(Endian::Little).unwrap(),
        0x0102_0304
    );
    assert_eq!(reader.read_scalar::<u32>().unwrap(), 0x0102_0304);
    assert!(reader.is_empty());
}

#[test]
fn test_reader_failures_leave_the_cursor_alone() {
    let data = [ARRAY_HEADER, 0, 0, 0, 9, 1];
    let mut reader = BufferReader::new(&data);

    assert!(matches!(
        reader.read_header(ARRAY_HEADER),
        Err(CodecError::Shape(ShapeError::CountExceedsRemaining {
            count: 9,
            remaining: 1
        }))
    ));
    assert_eq!(reader.position(), 0);

    assert!(matches!(
        reader.expect_tag(STRING),
        Err(CodecError::Shape(ShapeError::UnexpectedTag {
            expected: STRING,
            actual: ARRAY_HEADER
        }))
    ));
    assert_eq!(reader.position(), 0);

    assert_eq!(reader.try_peek::<u16>(), Some(0xDD00));
    reader.advance(4).unwrap();
    assert_eq!(reader.try_read::<u32>(), None);
    assert_eq!(reader.position(), 4);

    assert!(matches!(
        reader.advance(3),
        Err(CodecError::Capacity(CapacityError::AdvancePastEnd {
            count: 3,
            remaining: 2
        }))
    ));
    assert!(matches!(
        reader.rewind(5),
        Err(CodecError::Capacity(CapacityError::RewindPastStart {
            count: 5,
            position: 4
        }))
    ));
    reader.rewind(4).unwrap();
    assert_eq!(reader.position(), 0);
}

#[test]
fn test_reader_borrows_and_copies() {
    let data = [1u8, 2, 3, 4, 5];
    let mut reader = BufferReader::new(&data);
    let head = reader.read_bytes(2).unwrap();
    assert_eq!(head, &[1, 2]);

    let mut buf = [0u8; 8];
    assert_eq!(reader.read(&mut buf), 3);
    assert_eq!(&buf[..3], &[3, 4, 5]);
    assert!(reader.is_empty());
    assert!(reader.read_u8().is_err());
}

#[test]
fn test_reader_display_names_the_next_tag() {
    let data = [ARRAY_HEADER, 0, 0, 0, 0];
    let reader = BufferReader::new(&data);
    assert_eq!(
        reader.to_string(),
        "offset 0 of 5, next 0xDD (ArrayHeader)"
    );
}

#[test]
fn test_chunked_source_is_gathered() {
    let mut chunks = vec![
        Bytes::from_static(&[0x12, 0x34]),
        Bytes::from_static(&[0x56]),
        Bytes::from_static(&[0x78]),
    ]
    .into_iter();
    let value: u32 = Codec::global().deserialize_source(&mut chunks).unwrap();
    assert_eq!(value, 0x1234_5678);
}

#[test]
fn test_codec_sink_variants_agree() {
    let codec = Codec::global();
    let value = vec!["x".to_string(), "yz".to_string()];
    let owned = codec.serialize(&value).unwrap();

    let mut out = BytesMut::new();
    let written = codec.serialize_into(&value, &mut out).unwrap();
    assert_eq!(written, owned.len());
    assert_eq!(out.freeze(), owned);

    assert_eq!(codec.serialize_to_vec(&value).unwrap(), owned.to_vec());
}
