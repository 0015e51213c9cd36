//! Frame codec tests across payload sizes and buffer splits.

use girder_websocket::{CloseCode, Frame, FrameDecoder, FrameError, OpCode, accept_key};

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[test]
fn test_round_trip_at_length_boundaries() {
    for len in [0usize, 10, 200, 70_000] {
        let frame = Frame::binary(payload(len));
        let bytes = frame.encode();
        assert_eq!(bytes.len(), frame.encoded_len());

        let (decoded, used) = Frame::decode(&bytes).unwrap();
        assert_eq!(used, bytes.len(), "length {}", len);
        assert_eq!(decoded, frame);
    }
}

#[test]
fn test_masked_round_trip() {
    let key = [0xde, 0xad, 0xbe, 0xef];
    for len in [0usize, 10, 200, 70_000] {
        let frame = Frame::binary(payload(len)).with_mask(key);
        let bytes = frame.encode();
        assert_eq!(bytes[1] & 0x80, 0x80);
        if len > 0 {
            assert_ne!(&bytes[bytes.len() - len..], &frame.payload[..]);
        }

        let (decoded, used) = Frame::decode(&bytes).unwrap();
        assert_eq!(used, bytes.len());
        assert_eq!(decoded.payload, frame.payload);
        assert_eq!(decoded.mask, Some(key));
    }
}

#[test]
fn test_decode_consumes_exactly_one_frame() {
    let mut bytes = Frame::text("one").encode();
    let first_len = bytes.len();
    bytes.extend(Frame::text("two").encode());

    let (frame, used) = Frame::decode(&bytes).unwrap();
    assert_eq!(frame.payload, b"one");
    assert_eq!(used, first_len);

    let (frame, _) = Frame::decode(&bytes[used..]).unwrap();
    assert_eq!(frame.payload, b"two");
}

#[test]
fn test_non_minimal_length_accepted() {
    // 5-byte payload announced through the 16-bit length form
    let bytes = [0x82, 126, 0x00, 0x05, 1, 2, 3, 4, 5];
    let (frame, used) = Frame::decode(&bytes).unwrap();
    assert_eq!(used, 9);
    assert_eq!(frame.payload, vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_high_bit_length_rejected() {
    let mut bytes = vec![0x82, 127];
    bytes.extend_from_slice(&(1u64 << 63).to_be_bytes());
    assert!(matches!(
        Frame::decode(&bytes),
        Err(FrameError::Malformed(_))
    ));
}

#[test]
fn test_every_split_point_decodes() {
    let wire = Frame::text("split across reads").with_mask([9, 8, 7, 6]).encode();
    for split in 0..=wire.len() {
        let mut decoder = FrameDecoder::new(1024);
        decoder.extend(&wire[..split]);
        let early = decoder.next_frame().unwrap();
        if split < wire.len() {
            assert!(early.is_none(), "split {}", split);
            decoder.extend(&wire[split..]);
            let frame = decoder.next_frame().unwrap().unwrap();
            assert_eq!(frame.payload, b"split across reads");
        } else {
            assert_eq!(early.unwrap().opcode, OpCode::Text);
        }
    }
}

#[test]
fn test_close_frame_layout() {
    let bytes = Frame::close(CloseCode::Normal, "ok").encode();
    assert_eq!(bytes, vec![0x88, 0x04, 0x03, 0xE8, b'o', b'k']);
}

#[test]
fn test_rfc_accept_key_example() {
    assert_eq!(
        accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
        "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
    );
}
