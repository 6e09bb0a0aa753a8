use std::collections::HashMap;
use wirepack::tags::{ARRAY_HEADER, INT32, INT64, NIL, UINT8};
use wirepack::{
    deserialize, formatter, length, serialize, CodecError, EnumRepr, Formattable, Framing,
    ShapeError, TypeKind, WireEnum,
};

#[derive(Formattable, PartialEq, Debug)]
struct Point {
    x: i16,
    y: i16,
}

#[derive(Formattable, PartialEq, Debug)]
struct Wrapper(u32, String);

#[derive(Formattable, PartialEq, Debug)]
struct Marker;

#[derive(Formattable, PartialEq, Debug, Default)]
struct Session {
    id: u32,
    #[wire(skip)]
    cache: Vec<u8>,
    user: String,
}

#[derive(Formattable, PartialEq, Debug)]
struct Pair<T> {
    left: T,
    right: T,
}

#[derive(Formattable, PartialEq, Debug, Clone, Copy)]
enum Color {
    Red,
    Green,
    Blue = 7,
}

#[derive(Formattable, PartialEq, Debug, Clone, Copy)]
#[repr(u8)]
enum Small {
    A = 1,
    B = 200,
}

#[derive(Formattable, PartialEq, Debug, Clone, Copy)]
#[repr(i16)]
enum Signed {
    Neg = -2,
    Pos = 3,
}

#[derive(Formattable, PartialEq, Debug, Clone, Copy)]
enum Offset {
    Back = -3,
    Forward = 3,
}

#[cfg(target_pointer_width = "64")]
#[derive(Formattable, PartialEq, Debug, Clone, Copy)]
enum Wide {
    Low = 0,
    High = 4_294_967_296,
    Lowest = -4_294_967_296,
}

#[derive(Formattable, PartialEq, Debug)]
struct Canvas {
    name: String,
    points: Vec<Point>,
    palette: HashMap<String, Color>,
    background: Option<Color>,
}

#[test]
fn test_named_struct_layout() {
    let bytes = serialize(&Point { x: 1, y: -1 }).unwrap();
    assert_eq!(&bytes[..], &[ARRAY_HEADER, 0, 0, 0, 2, 0, 1, 0xFF, 0xFF]);
    assert_eq!(deserialize::<Point>(&bytes).unwrap(), Point { x: 1, y: -1 });
}

#[test]
fn test_tuple_and_unit_structs() {
    let value = Wrapper(9, "w".into());
    let bytes = serialize(&value).unwrap();
    assert_eq!(bytes, serialize(&(9u32, "w".to_string())).unwrap());
    assert_eq!(deserialize::<Wrapper>(&bytes).unwrap(), value);

    let bytes = serialize(&Marker).unwrap();
    assert_eq!(&bytes[..], &[ARRAY_HEADER, 0, 0, 0, 0]);
    assert_eq!(deserialize::<Marker>(&bytes).unwrap(), Marker);
}

#[test]
fn test_skipped_member_is_not_written() {
    let session = Session {
        id: 4,
        cache: vec![1, 2, 3],
        user: "kim".into(),
    };
    let bytes = serialize(&session).unwrap();
    assert_eq!(&bytes[..9], &[ARRAY_HEADER, 0, 0, 0, 2, 0, 0, 0, 4]);
    assert_eq!(length(&session).unwrap(), bytes.len());

    let decoded: Session = deserialize(&bytes).unwrap();
    assert_eq!(
        decoded,
        Session {
            id: 4,
            cache: Vec::new(),
            user: "kim".into(),
        }
    );
}

#[test]
fn test_generic_struct() {
    let numbers = Pair { left: 1u8, right: 2u8 };
    assert_eq!(
        &serialize(&numbers).unwrap()[..],
        &[ARRAY_HEADER, 0, 0, 0, 2, 1, 2]
    );
    let words = Pair {
        left: "l".to_string(),
        right: "r".to_string(),
    };
    assert_eq!(
        deserialize::<Pair<String>>(&serialize(&words).unwrap()).unwrap(),
        words
    );
}

#[test]
fn test_member_count_must_match() {
    let three = serialize(&(1i16, 2i16, 3i16)).unwrap();
    assert!(matches!(
        deserialize::<Point>(&three),
        Err(CodecError::Shape(ShapeError::CountMismatch {
            type_name: "Point",
            expected: 2,
            actual: 3
        }))
    ));
}

#[test]
fn test_enum_uses_repr_width() {
    assert_eq!(&serialize(&Color::Blue).unwrap()[..], &[0, 0, 0, 7]);
    assert_eq!(&serialize(&Color::Green).unwrap()[..], &[0, 0, 0, 1]);
    assert_eq!(&serialize(&Small::B).unwrap()[..], &[200]);
    assert_eq!(&serialize(&Signed::Neg).unwrap()[..], &[0xFF, 0xFE]);

    assert_eq!(deserialize::<Small>(&[1]).unwrap(), Small::A);
    assert_eq!(deserialize::<Signed>(&[0xFF, 0xFE]).unwrap(), Signed::Neg);
    assert_eq!(deserialize::<Color>(&[0, 0, 0, 7]).unwrap(), Color::Blue);
}

#[test]
fn test_enum_metadata() {
    assert_eq!(Color::REPR, EnumRepr::I32);
    assert_eq!(Small::REPR, EnumRepr::U8);
    assert_eq!(Signed::NAME, "Signed");
    assert_eq!(Signed::Neg.to_bits(), (-2i64) as u64);
    assert_eq!(Signed::from_bits(3), Some(Signed::Pos));
    assert_eq!(<Color as Formattable>::KIND, TypeKind::Enum);
    assert_eq!(<Point as Formattable>::KIND, TypeKind::Object);
    assert_eq!(formatter::<Small>().unwrap().framing(), Framing::Scalar(UINT8));
}

#[test]
fn test_unknown_discriminant_is_rejected() {
    assert!(matches!(
        deserialize::<Small>(&[5]),
        Err(CodecError::Shape(ShapeError::UnknownDiscriminant {
            enum_name: "Small",
            bits: 5
        }))
    ));
}

#[test]
fn test_optional_enum_is_tagged() {
    assert_eq!(&serialize(&Some(Color::Red)).unwrap()[..], &[INT32, 0, 0, 0, 0]);
    assert_eq!(&serialize(&None::<Color>).unwrap()[..], &[NIL]);
    assert_eq!(
        deserialize::<Option<Color>>(&[INT32, 0, 0, 0, 7]).unwrap(),
        Some(Color::Blue)
    );
}

#[test]
fn test_nested_objects() {
    let mut palette = HashMap::new();
    palette.insert("sky".to_string(), Color::Blue);
    let canvas = Canvas {
        name: "c".into(),
        points: vec![Point { x: 0, y: 0 }, Point { x: 3, y: 4 }],
        palette,
        background: None,
    };
    let bytes = serialize(&canvas).unwrap();
    assert_eq!(length(&canvas).unwrap(), bytes.len());
    assert_eq!(deserialize::<Canvas>(&bytes).unwrap(), canvas);
}

#[test]
fn test_enum_without_repr_keeps_sign() {
    assert_eq!(Offset::REPR, EnumRepr::I32);
    let bytes = serialize(&Offset::Back).unwrap();
    assert_eq!(&bytes[..], &[0xFF, 0xFF, 0xFF, 0xFD]);
    assert_eq!(deserialize::<Offset>(&bytes).unwrap(), Offset::Back);
    assert_eq!(length(&Offset::Forward).unwrap(), 4);
}

#[cfg(target_pointer_width = "64")]
#[test]
fn test_enum_without_repr_widens_when_a_discriminant_needs_it() {
    assert_eq!(Wide::REPR, EnumRepr::I64);
    assert_eq!(formatter::<Wide>().unwrap().framing(), Framing::Scalar(INT64));

    let low = serialize(&Wide::Low).unwrap();
    let high = serialize(&Wide::High).unwrap();
    assert_eq!(&low[..], &[0; 8]);
    assert_eq!(&high[..], &[0, 0, 0, 1, 0, 0, 0, 0]);
    assert_eq!(length(&Wide::High).unwrap(), high.len());

    for variant in [Wide::Low, Wide::High, Wide::Lowest] {
        let bytes = serialize(&variant).unwrap();
        assert_eq!(deserialize::<Wide>(&bytes).unwrap(), variant);
    }
}

#[test]
fn test_enum_length_is_repr_width() {
    for (value, width) in [(Small::A, 1), (Small::B, 1)] {
        assert_eq!(length(&value).unwrap(), width);
        assert_eq!(serialize(&value).unwrap().len(), width);
    }
    assert_eq!(length(&Signed::Pos).unwrap(), serialize(&Signed::Pos).unwrap().len());
    assert_eq!(length(&Some(Color::Red)).unwrap(), 5);
}
