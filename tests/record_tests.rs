use event_trace::record::{append, decode_next, decode_prev, find_last_of_kind, EventKind, RecordCursor, OVERHEAD};
use event_trace::RecordError;
use proptest::collection::vec;
use proptest::prelude::*;
use proptest::sample::Index;

fn encode_all(records: &[(u8, Vec<u8>)]) -> Vec<u8> {
    let mut buf = Vec::new();
    for (tag, payload) in records {
        let kind = EventKind::from_u8(*tag).unwrap();
        buf.extend_from_slice(append(kind, payload).unwrap().as_bytes());
    }
    buf
}

fn record_list() -> impl Strategy<Value = Vec<(u8, Vec<u8>)>> {
    vec((0u8..=8, vec(any::<u8>(), 0..48)), 0..24)
}

proptest! {
    #[test]
    fn round_trip(tag in 0u8..=8, payload in vec(any::<u8>(), 0..=255)) {
        let kind = EventKind::from_u8(tag).unwrap();
        let encoded = append(kind, &payload).unwrap();
        prop_assert_eq!(encoded.len(), payload.len() + OVERHEAD);

        let (record, rest) = decode_next(encoded.as_bytes()).unwrap();
        prop_assert_eq!(record.kind(), Some(kind));
        prop_assert_eq!(record.payload(), &payload[..]);
        prop_assert!(rest.is_empty());

        let (prev, start) = decode_prev(encoded.as_bytes(), encoded.len()).unwrap();
        prop_assert_eq!(start, 0);
        prop_assert_eq!(prev, record);
    }

    #[test]
    fn forward_backward_symmetry(records in record_list()) {
        let buf = encode_all(&records);

        let mut cursor = RecordCursor::front(&buf);
        for _ in 0..records.len() {
            cursor = cursor.next().unwrap();
        }
        prop_assert_eq!(cursor.offset(), buf.len());

        let mut cursor = RecordCursor::back(&buf);
        for (tag, payload) in records.iter().rev() {
            cursor = cursor.prev().unwrap();
            let record = cursor.record().unwrap();
            prop_assert_eq!(record.tag(), *tag);
            prop_assert_eq!(record.payload(), &payload[..]);
        }
        prop_assert_eq!(cursor.offset(), 0);
    }

    #[test]
    fn truncated_buffers_never_overrun(records in record_list(), cut in any::<Index>()) {
        let buf = encode_all(&records);
        let cut = cut.index(buf.len() + 1);
        let span = &buf[..cut];

        let mut cursor = RecordCursor::front(span);
        while cursor.offset() < span.len() {
            match cursor.next() {
                Ok(next) => {
                    prop_assert!(next.offset() <= span.len());
                    cursor = next;
                }
                Err(err) => {
                    let is_truncated = matches!(err, RecordError::Truncated { .. });
                    prop_assert!(is_truncated);
                    break;
                }
            }
        }

        let mut cursor = RecordCursor::back(span);
        while cursor.offset() > 0 {
            match cursor.prev() {
                Ok(prev) => {
                    prop_assert!(prev.offset() < cursor.offset());
                    cursor = prev;
                }
                Err(_) => break,
            }
        }
    }

    #[test]
    fn arbitrary_bytes_never_panic(bytes in vec(any::<u8>(), 0..512), kind in 0u8..=8) {
        let kind = EventKind::from_u8(kind).unwrap();
        let found = find_last_of_kind(&bytes, 0, bytes.len(), kind);
        if let Some(offset) = found {
            prop_assert!(offset < bytes.len());
            prop_assert_eq!(bytes[offset], kind as u8);
        }
        let _ = decode_next(&bytes);
    }
}

#[test]
fn test_find_last_stops_at_corruption() {
    let mut buf = encode_all(&[(7, b"fmt".to_vec()), (8, Vec::new())]);
    let tail = encode_all(&[(1, b"abc".to_vec())]);
    buf.extend_from_slice(&tail);

    assert_eq!(find_last_of_kind(&buf, 0, buf.len(), EventKind::StartFormat), Some(0));

    // leading length of the StartFormat record no longer matches its trailer
    buf[1] = 9;
    assert_eq!(find_last_of_kind(&buf, 0, buf.len(), EventKind::StartFormat), None);
    assert_eq!(find_last_of_kind(&buf, 0, buf.len(), EventKind::EndFormat), Some(6));
}

#[test]
fn test_payload_too_long() {
    assert_eq!(
        append(EventKind::String, &[0u8; 256]).err(),
        Some(RecordError::PayloadTooLong(256))
    );
}
