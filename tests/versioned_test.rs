use bytes::Bytes;
use std::sync::Arc;
use wirepack::tags::UINT32;
use wirepack::versioned::{read_envelope_header, write_envelope_header, ENVELOPE_LENGTH};
use wirepack::{
    BufferReader, BufferWriter, Codec, CodecError, Formattable, Formatter, Migration, Resolver,
    ShapeError, VersionRoute, VersionedFormatter,
};

#[derive(Formattable, Debug, PartialEq)]
struct ProfileV1 {
    name: String,
}

#[derive(Formattable, Debug, PartialEq)]
struct Profile {
    name: String,
    age: u32,
}

fn encode_with<T, F>(formatter: &F, value: &T) -> Bytes
where
    F: Formatter<T> + ?Sized,
{
    let mut writer = BufferWriter::pooled();
    formatter.serialize(&mut writer, value).unwrap();
    writer.flush_to_array().unwrap()
}

fn current_only(plain: &Resolver) -> VersionedFormatter<Profile> {
    VersionedFormatter::new(2, plain.get_formatter::<Profile>().unwrap())
}

fn with_v1_migration(plain: &Resolver) -> VersionedFormatter<Profile> {
    let migration = Migration::from_formattable::<ProfileV1, _>(plain, |old| {
        Ok(Profile {
            name: old.name,
            age: 0,
        })
    })
    .unwrap();
    current_only(plain).with_migration(1, migration)
}

fn v1_payload(plain: &Resolver, name: &str) -> Bytes {
    let v1 = VersionedFormatter::new(1, plain.get_formatter::<ProfileV1>().unwrap());
    encode_with(
        &v1,
        &ProfileV1 {
            name: name.to_string(),
        },
    )
}

#[test]
fn test_envelope_prefixes_current_version_and_body_length() {
    let plain = Resolver::new();
    let formatter = current_only(&plain);
    let value = Profile {
        name: "ann".into(),
        age: 3,
    };
    let bytes = encode_with(&formatter, &value);

    // Object header 5, string 5 + 3, u32 4.
    assert_eq!(&bytes[..ENVELOPE_LENGTH], &[UINT32, 0, 0, 0, 2, 0, 0, 0, 17]);
    assert_eq!(bytes.len(), ENVELOPE_LENGTH + 17);
    assert_eq!(formatter.length(&value).unwrap(), bytes.len());
    assert_eq!(
        formatter.deserialize(&mut BufferReader::new(&bytes)).unwrap(),
        value
    );
}

#[test]
fn test_old_version_is_upgraded_through_migration() {
    let plain = Resolver::new();
    let resolver = Resolver::builder()
        .register::<Profile, _>(with_v1_migration(&plain))
        .build()
        .unwrap();
    let codec = Codec::new(resolver);

    let decoded: Profile = codec.deserialize(&v1_payload(&plain, "bo")).unwrap();
    assert_eq!(
        decoded,
        Profile {
            name: "bo".into(),
            age: 0
        }
    );

    // Writes always use the current version, also inside composites.
    let list = vec![Profile {
        name: "cy".into(),
        age: 40,
    }];
    let bytes = codec.serialize(&list).unwrap();
    assert_eq!(&bytes[5..10], &[UINT32, 0, 0, 0, 2]);
    assert_eq!(codec.deserialize::<Vec<Profile>>(&bytes).unwrap(), list);
}

#[test]
fn test_unknown_version_fails_without_migration() {
    let plain = Resolver::new();
    let formatter = current_only(&plain);
    let payload = v1_payload(&plain, "dee");
    assert!(matches!(
        formatter.deserialize(&mut BufferReader::new(&payload)),
        Err(CodecError::UnsupportedVersion { version: 1, .. })
    ));
}

#[test]
fn test_unsupported_payload_is_skipped_as_a_whole() {
    let plain = Resolver::new();
    let formatter = current_only(&plain);
    let old = v1_payload(&plain, "eve");
    let new = encode_with(
        &formatter,
        &Profile {
            name: "fay".into(),
            age: 9,
        },
    );
    let stream = [&old[..], &new[..]].concat();

    let mut reader = BufferReader::new(&stream);
    assert!(formatter.deserialize(&mut reader).is_err());
    assert_eq!(reader.position(), old.len());
    let next = formatter.deserialize(&mut reader).unwrap();
    assert_eq!(next.name, "fay");
    assert!(reader.is_empty());
}

#[test]
fn test_route_prefers_codec_over_migration() {
    let plain = Resolver::new();
    let migration =
        Migration::from_formattable::<ProfileV1, _>(&plain, |old| {
            Ok(Profile {
                name: old.name,
                age: 1,
            })
        })
        .unwrap();
    assert!(migration.source().ends_with("ProfileV1"));

    let formatter = current_only(&plain).with_migration(2, migration);
    assert!(matches!(formatter.route(2), Some(VersionRoute::Codec(_))));
    assert!(formatter.route(3).is_none());

    let formatter = with_v1_migration(&plain);
    assert!(matches!(formatter.route(1), Some(VersionRoute::Migration(_))));
    assert_eq!(formatter.supported_versions(), vec![1, 2]);
    assert_eq!(formatter.current_version(), 2);
}

#[test]
fn test_extra_codec_reads_another_version_directly() {
    let plain = Resolver::new();
    let legacy = VersionedFormatter::new(7, plain.get_formatter::<Profile>().unwrap());
    let value = Profile {
        name: "gil".into(),
        age: 5,
    };
    let payload = encode_with(&legacy, &value);

    let formatter =
        current_only(&plain).with_codec(7, plain.get_formatter::<Profile>().unwrap());
    assert_eq!(
        formatter.deserialize(&mut BufferReader::new(&payload)).unwrap(),
        value
    );
}

#[test]
fn test_envelope_header_is_transactional() {
    let mut writer = BufferWriter::pooled();
    write_envelope_header(&mut writer, 4, 100).unwrap();
    writer.write_u8(0).unwrap();
    let bytes = writer.flush_to_array().unwrap();

    let mut reader = BufferReader::new(&bytes);
    assert!(matches!(
        read_envelope_header(&mut reader),
        Err(CodecError::Shape(ShapeError::CountExceedsRemaining {
            count: 100,
            remaining: 1
        }))
    ));
    assert_eq!(reader.position(), 0);
}

#[test]
fn test_unread_body_bytes_are_rejected() {
    let plain = Resolver::new();
    let body = encode_with(
        &*plain.get_formatter::<Profile>().unwrap(),
        &Profile {
            name: "hal".into(),
            age: 2,
        },
    );
    let mut writer = BufferWriter::pooled();
    write_envelope_header(&mut writer, 2, body.len() + 1).unwrap();
    writer.write_bytes(&body).unwrap();
    writer.write_u8(0).unwrap();
    let payload = writer.flush_to_array().unwrap();

    let formatter: Arc<dyn Formatter<Profile>> = Arc::new(current_only(&plain));
    assert!(matches!(
        formatter.deserialize(&mut BufferReader::new(&payload)),
        Err(CodecError::Shape(ShapeError::TrailingBytes { remaining: 1 }))
    ));
}
