use bytes::Bytes;
use proptest::prelude::*;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap, HashSet, LinkedList, VecDeque};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use wirepack::tags::{ARRAY_HEADER, FALSE, MAP_HEADER, NIL, STRING, TRUE};
use wirepack::{
    deserialize, formatter, length, serialize, write_sequence, BufferWriter, CodecError,
    Formattable, ShapeError,
};

#[test]
fn test_empty_vec_is_header_with_zero_count() {
    let bytes = serialize(&Vec::<i32>::new()).unwrap();
    assert_eq!(&bytes[..], &[0xDD, 0x00, 0x00, 0x00, 0x00]);
    assert!(deserialize::<Vec<i32>>(&bytes).unwrap().is_empty());
}

#[test]
fn test_vec_items_follow_the_count() {
    let bytes = serialize(&vec![1i32, 2]).unwrap();
    assert_eq!(
        &bytes[..],
        &[ARRAY_HEADER, 0, 0, 0, 2, 0, 0, 0, 1, 0, 0, 0, 2]
    );
}

#[test]
fn test_nil_and_empty_collections_stay_distinct() {
    assert!(deserialize::<Vec<u8>>(&[NIL]).unwrap().is_empty());
    assert!(deserialize::<HashMap<String, u8>>(&[NIL]).unwrap().is_empty());

    let none: Option<Vec<u8>> = None;
    let empty: Option<Vec<u8>> = Some(Vec::new());
    assert_eq!(&serialize(&none).unwrap()[..], &[NIL]);
    let bytes = serialize(&empty).unwrap();
    assert_eq!(&bytes[..], &[ARRAY_HEADER, 0, 0, 0, 0]);
    assert_eq!(deserialize::<Option<Vec<u8>>>(&bytes).unwrap(), Some(Vec::new()));
}

#[test]
fn test_sequences_keep_order() {
    let queue: VecDeque<u16> = [3, 1, 2].into_iter().collect();
    let decoded: VecDeque<u16> = deserialize(&serialize(&queue).unwrap()).unwrap();
    assert_eq!(decoded, queue);

    let list: LinkedList<String> = ["b", "a"].iter().map(|s| s.to_string()).collect();
    let decoded: LinkedList<String> = deserialize(&serialize(&list).unwrap()).unwrap();
    assert_eq!(decoded, list);

    // Lists and queues share one layout.
    assert_eq!(
        serialize(&queue).unwrap(),
        serialize(&vec![3u16, 1, 2]).unwrap()
    );
}

#[test]
fn test_sets_and_heaps() {
    let ordered: BTreeSet<u32> = [5, 1, 3].into_iter().collect();
    let bytes = serialize(&ordered).unwrap();
    assert_eq!(bytes, serialize(&vec![1u32, 3, 5]).unwrap());
    assert_eq!(deserialize::<BTreeSet<u32>>(&bytes).unwrap(), ordered);

    let hashed: HashSet<String> = ["x", "y", "z"].iter().map(|s| s.to_string()).collect();
    let decoded: HashSet<String> = deserialize(&serialize(&hashed).unwrap()).unwrap();
    assert_eq!(decoded, hashed);

    let heap: BinaryHeap<i8> = [4, -1, 9].into_iter().collect();
    let decoded: BinaryHeap<i8> = deserialize(&serialize(&heap).unwrap()).unwrap();
    assert_eq!(decoded.into_sorted_vec(), vec![-1, 4, 9]);
}

#[test]
fn test_map_layout() {
    let mut map = BTreeMap::new();
    map.insert("k".to_string(), 2u8);
    let bytes = serialize(&map).unwrap();
    assert_eq!(
        &bytes[..],
        &[MAP_HEADER, 0, 0, 0, 1, STRING, 0, 0, 0, 1, b'k', 2]
    );
    assert_eq!(deserialize::<BTreeMap<String, u8>>(&bytes).unwrap(), map);

    let mut hashed = HashMap::new();
    hashed.insert(1u64, vec![true, false]);
    hashed.insert(2u64, Vec::new());
    let decoded: HashMap<u64, Vec<bool>> = deserialize(&serialize(&hashed).unwrap()).unwrap();
    assert_eq!(decoded, hashed);
}

#[test]
fn test_tuple_is_fixed_arity_object() {
    let bytes = serialize(&(7u8, "a".to_string())).unwrap();
    assert_eq!(
        &bytes[..],
        &[ARRAY_HEADER, 0, 0, 0, 2, 7, STRING, 0, 0, 0, 1, b'a']
    );

    let triple = serialize(&(1u8, 2u8, 3u8)).unwrap();
    assert!(matches!(
        deserialize::<(u8, u8)>(&triple),
        Err(CodecError::Shape(ShapeError::CountMismatch {
            expected: 2,
            actual: 3,
            ..
        }))
    ));
}

#[test]
fn test_result_layout() {
    let ok: Result<u32, String> = Ok(5);
    let bytes = serialize(&ok).unwrap();
    assert_eq!(&bytes[..], &[ARRAY_HEADER, 0, 0, 0, 2, TRUE, 0, 0, 0, 5]);
    assert_eq!(deserialize::<Result<u32, String>>(&bytes).unwrap(), ok);

    let err: Result<u32, String> = Err("no".to_string());
    let bytes = serialize(&err).unwrap();
    assert_eq!(bytes[5], FALSE);
    assert_eq!(deserialize::<Result<u32, String>>(&bytes).unwrap(), err);
}

#[test]
fn test_fixed_arrays_check_their_count() {
    let array = [1u16, 2, 3];
    let bytes = serialize(&array).unwrap();
    assert_eq!(bytes, serialize(&vec![1u16, 2, 3]).unwrap());
    assert_eq!(deserialize::<[u16; 3]>(&bytes).unwrap(), array);
    assert!(matches!(
        deserialize::<[u16; 2]>(&bytes),
        Err(CodecError::Shape(ShapeError::CountMismatch {
            expected: 2,
            actual: 3,
            ..
        }))
    ));
}

#[test]
fn test_byte_buffers_share_the_list_layout() {
    let expected = serialize(&vec![b'a', b'b']).unwrap();
    assert_eq!(serialize(&Bytes::from_static(b"ab")).unwrap(), expected);
    assert_eq!(deserialize::<Bytes>(&expected).unwrap(), Bytes::from_static(b"ab"));

    let boxed: Box<[u8]> = vec![b'a', b'b'].into_boxed_slice();
    assert_eq!(serialize(&boxed).unwrap(), expected);
    assert_eq!(deserialize::<Box<[u8]>>(&expected).unwrap(), boxed);
}

#[test]
fn test_pointers_are_transparent() {
    let plain = serialize(&"p".to_string()).unwrap();
    assert_eq!(serialize(&Box::new("p".to_string())).unwrap(), plain);
    assert_eq!(serialize(&Rc::new("p".to_string())).unwrap(), plain);
    assert_eq!(serialize(&Arc::new("p".to_string())).unwrap(), plain);

    // The pointer keeps the target's framing inside an Option.
    assert_eq!(
        serialize(&Some(Box::new(1u8))).unwrap(),
        serialize(&Some(1u8)).unwrap()
    );
    let decoded: Arc<String> = deserialize(&plain).unwrap();
    assert_eq!(decoded.as_str(), "p");
}

#[test]
fn test_mutably_borrowed_refcell_fails_to_encode() {
    let cell = RefCell::new(vec![1u8]);
    let guard = cell.borrow_mut();
    assert!(matches!(serialize(&cell), Err(CodecError::Encode(_))));
    drop(guard);
    assert_eq!(serialize(&cell).unwrap(), serialize(&vec![1u8]).unwrap());
}

#[test]
fn test_count_larger_than_input_is_rejected() {
    assert!(matches!(
        deserialize::<Vec<u8>>(&[ARRAY_HEADER, 0, 0, 0, 5, 1]),
        Err(CodecError::Shape(ShapeError::CountExceedsRemaining {
            count: 5,
            remaining: 1
        }))
    ));
    assert!(matches!(
        deserialize::<Vec<u8>>(&[MAP_HEADER, 0, 0, 0, 0]),
        Err(CodecError::Shape(ShapeError::UnexpectedTag {
            expected: ARRAY_HEADER,
            actual: MAP_HEADER
        }))
    ));
}

#[test]
fn test_write_sequence_counts_before_items() {
    let item = formatter::<u32>().unwrap();
    let mut writer = BufferWriter::pooled();
    let written = write_sequence(&mut writer, &*item, (1u32..=3).filter(|n| n % 2 == 1)).unwrap();
    assert_eq!(written, 2);
    let bytes = writer.flush_to_array().unwrap();
    assert_eq!(bytes, serialize(&vec![1u32, 3]).unwrap());
}

#[test]
fn test_length_matches_composite_output() {
    let mut value: BTreeMap<String, Vec<Option<i16>>> = BTreeMap::new();
    value.insert("a".into(), vec![Some(1), None, Some(-3)]);
    value.insert("bc".into(), Vec::new());
    assert_eq!(length(&value).unwrap(), serialize(&value).unwrap().len());
}

/// A header whose count fits the input but whose items would need far more memory than the input.
fn oversized_header(tag: u8, count: u32) -> Vec<u8> {
    let mut bytes = vec![tag];
    bytes.extend_from_slice(&count.to_be_bytes());
    bytes.resize(5 + count as usize, 0);
    bytes
}

#[test]
fn test_large_count_of_large_items_fails_cleanly() {
    let bytes = oversized_header(ARRAY_HEADER, 4_000_000);
    assert!(matches!(
        deserialize::<Vec<[u64; 4096]>>(&bytes),
        Err(CodecError::Shape(ShapeError::UnexpectedTag {
            expected: ARRAY_HEADER,
            actual: 0
        }))
    ));
    assert!(deserialize::<VecDeque<[u64; 4096]>>(&bytes).is_err());

    let bytes = oversized_header(MAP_HEADER, 4_000_000);
    assert!(matches!(
        deserialize::<HashMap<u64, [u64; 4096]>>(&bytes),
        Err(CodecError::Shape(ShapeError::UnexpectedTag {
            expected: ARRAY_HEADER,
            actual: 0
        }))
    ));
}

#[test]
fn test_collections_grow_past_the_initial_reservation() {
    let value: Vec<[u64; 64]> = (0..300).map(|n| [n as u64; 64]).collect();
    let bytes = serialize(&value).unwrap();
    assert_eq!(deserialize::<Vec<[u64; 64]>>(&bytes).unwrap(), value);
}

fn assert_exact_length<T: Formattable>(value: &T) {
    let bytes = serialize(value).unwrap();
    assert_eq!(
        length(value).unwrap(),
        bytes.len(),
        "{}",
        std::any::type_name::<T>()
    );
}

#[test]
fn test_length_is_exact_for_every_builtin_shape() {
    assert_exact_length(&());
    assert_exact_length(&(7u8,));
    assert_exact_length(&(1u8, "ab".to_string(), -3i64));
    assert_exact_length(&(1u8, 2u16, 3u32, 4u64, 5i8, 6i16, 7i32, "eight".to_string()));
    assert_exact_length(&Ok::<u32, String>(5));
    assert_exact_length(&Err::<u32, String>("bad".into()));
    assert_exact_length(&Duration::new(5, 7));
    assert_exact_length(&[1u16, 2, 3]);
    assert_exact_length(&["x".to_string(), String::new()]);
    assert_exact_length(&vec![1u32, 2].into_boxed_slice());
    assert_exact_length(&Bytes::from_static(b"abc"));
    assert_exact_length(&[3u8, 1].into_iter().collect::<HashSet<_>>());
    assert_exact_length(&[3i32, 9, 1].into_iter().collect::<BinaryHeap<_>>());
    assert_exact_length(&["b", "a"].map(String::from).into_iter().collect::<BTreeSet<_>>());
    assert_exact_length(&VecDeque::from(vec![1.5f32, -0.0]));
    assert_exact_length(&LinkedList::from(['a', 'é']));
    assert_exact_length(&None::<Vec<u8>>);
    assert_exact_length(&Some(Vec::<u8>::new()));
    assert_exact_length(&Some(Some(3u64)));
    assert_exact_length(&Box::new(9u32));
    assert_exact_length(&Rc::new("rc".to_string()));
    assert_exact_length(&Arc::new(vec![true, false]));
    assert_exact_length(&RefCell::new(usize::MAX));
    assert_exact_length(&Option::<bool>::None);
    assert_exact_length(&-1isize);

    let mut map: HashMap<String, Vec<Option<i8>>> = HashMap::new();
    map.insert("k".into(), vec![Some(1), None]);
    map.insert("empty".into(), Vec::new());
    assert_exact_length(&map);
}

proptest! {
    #[test]
    fn prop_vec_round_trips(value in prop::collection::vec(any::<u32>(), 0..32)) {
        let bytes = serialize(&value).unwrap();
        prop_assert_eq!(bytes.len(), length(&value).unwrap());
        prop_assert_eq!(bytes.len(), 5 + 4 * value.len());
        prop_assert_eq!(deserialize::<Vec<u32>>(&bytes).unwrap(), value);
    }

    #[test]
    fn prop_map_round_trips(value in prop::collection::hash_map(".{0,8}", any::<i64>(), 0..16)) {
        let bytes = serialize(&value).unwrap();
        prop_assert_eq!(bytes.len(), length(&value).unwrap());
        prop_assert_eq!(deserialize::<HashMap<String, i64>>(&bytes).unwrap(), value);
    }

    #[test]
    fn prop_tuple_round_trips(value in (any::<u8>(), ".{0,8}", any::<Option<i16>>())) {
        let bytes = serialize(&value).unwrap();
        prop_assert_eq!(bytes.len(), length(&value).unwrap());
        prop_assert_eq!(deserialize::<(u8, String, Option<i16>)>(&bytes).unwrap(), value);
    }

    #[test]
    fn prop_result_round_trips(value in any::<std::result::Result<u16, String>>()) {
        let bytes = serialize(&value).unwrap();
        prop_assert_eq!(bytes.len(), length(&value).unwrap());
        prop_assert_eq!(
            deserialize::<std::result::Result<u16, String>>(&bytes).unwrap(),
            value
        );
    }

    #[test]
    fn prop_optional_vec_round_trips(
        value in proptest::option::of(prop::collection::vec(any::<i8>(), 0..16))
    ) {
        let bytes = serialize(&value).unwrap();
        prop_assert_eq!(bytes.len(), length(&value).unwrap());
        prop_assert_eq!(deserialize::<Option<Vec<i8>>>(&bytes).unwrap(), value);
    }
}
