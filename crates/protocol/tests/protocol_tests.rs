//! Integration tests for the scanner wire protocol
//!
//! Covers the path a bulk endpoint byte stream takes: length-prefixed frames, arbitrary USB
//! transfer boundaries, and JSON scan payloads.

use proptest::prelude::*;
use protocol::{
    AccessoryIdentification, AccessoryString, AoaVersion, FrameDecoder, ProtocolError, Scan,
    decode_scan, encode_frame, encode_scan, read_frame,
};
use std::io::Cursor;

/// Build a wire stream of frames for the given scans
fn wire_stream(scans: &[Scan]) -> Vec<u8> {
    let mut stream = Vec::new();
    for scan in scans {
        let payload = encode_scan(scan).unwrap();
        stream.extend(encode_frame(&payload).unwrap());
    }
    stream
}

/// Feed a stream in fixed-size chunks and collect decoded scans
fn decode_chunked(stream: &[u8], chunk_size: usize) -> Vec<Scan> {
    let mut decoder = FrameDecoder::new();
    let mut scans = Vec::new();
    for chunk in stream.chunks(chunk_size) {
        decoder.extend(chunk);
        while let Some(frame) = decoder.next_frame() {
            scans.push(decode_scan(&frame).unwrap());
        }
    }
    assert!(decoder.finish().is_ok());
    scans
}

mod wire_format {
    use super::*;

    #[test]
    fn test_scanner_app_frame() {
        // {"rawUTF8":"ABC123"} is 20 bytes
        let mut wire = vec![0x00, 0x14];
        wire.extend_from_slice(br#"{"rawUTF8":"ABC123"}"#);

        let mut cursor = Cursor::new(wire);
        let payload = read_frame(&mut cursor).unwrap();
        let scan = decode_scan(&payload).unwrap();

        assert_eq!(scan.text.as_deref(), Some("ABC123"));
        assert_eq!(scan.raw_bytes, None);
    }

    #[test]
    fn test_binary_barcode_frame() {
        let payload = br#"{"rawBase64":"AQIDBA==","rawUTF8":"\u0001\u0002\u0003\u0004"}"#;
        let frame = encode_frame(payload).unwrap();

        let mut decoder = FrameDecoder::new();
        decoder.extend(&frame);
        let scan = decode_scan(&decoder.next_frame().unwrap()).unwrap();

        assert_eq!(scan.raw_bytes, Some(vec![1, 2, 3, 4]));
        assert_eq!(scan.text.as_deref(), Some("\u{1}\u{2}\u{3}\u{4}"));
    }

    #[test]
    fn test_corrupt_frame_is_reported() {
        let frame = encode_frame(b"{\"rawUTF8\":\"ABC").unwrap();
        let mut decoder = FrameDecoder::new();
        decoder.extend(&frame);
        let payload = decoder.next_frame().unwrap();
        assert!(matches!(decode_scan(&payload), Err(ProtocolError::Json(_))));
    }

    #[test]
    fn test_stream_cut_inside_frame() {
        let mut stream = wire_stream(&[Scan {
            raw_bytes: None,
            text: Some("complete".to_string()),
        }]);
        let partial = encode_frame(b"{\"rawUTF8\":\"cut off\"}").unwrap();
        stream.extend_from_slice(&partial[..6]);

        let mut decoder = FrameDecoder::new();
        decoder.extend(&stream);
        assert!(decoder.next_frame().is_some());
        assert!(decoder.next_frame().is_none());
        assert!(matches!(
            decoder.finish(),
            Err(ProtocolError::IncompleteFrame { actual: 6, .. })
        ));
    }
}

mod accessory {
    use super::*;

    #[test]
    fn test_identification_custom_values() {
        let ident = AccessoryIdentification {
            manufacturer: "Acme".to_string(),
            model: "Scanner".to_string(),
            description: "Test".to_string(),
            version: "2".to_string(),
            uri: "https://example.com".to_string(),
            serial: "0001".to_string(),
        };
        let indexed: Vec<(u16, &str)> = ident.strings().map(|(s, v)| (s.index(), v)).collect();
        assert_eq!(
            indexed,
            vec![
                (0, "Acme"),
                (1, "Scanner"),
                (2, "Test"),
                (3, "2"),
                (4, "https://example.com"),
                (5, "0001"),
            ]
        );
        assert_eq!(ident.get(AccessoryString::Serial), "0001");
    }

    #[test]
    fn test_protocol_versions() {
        assert!(AoaVersion::from_response(&[2, 0]).is_supported());
        assert_eq!(AoaVersion::from_response(&[2, 0]).to_string(), "2");
    }
}

fn arb_scan() -> impl Strategy<Value = Scan> {
    (
        proptest::option::of(proptest::collection::vec(any::<u8>(), 0..64)),
        proptest::option::of(".{0,32}"),
    )
        .prop_map(|(raw_bytes, text)| Scan { raw_bytes, text })
}

proptest! {
    #[test]
    fn prop_single_frame_yields_matching_scan(scan in arb_scan()) {
        let stream = wire_stream(std::slice::from_ref(&scan));
        let decoded = decode_chunked(&stream, stream.len());
        prop_assert_eq!(decoded, vec![scan]);
    }

    #[test]
    fn prop_transfer_boundaries_do_not_matter(
        scans in proptest::collection::vec(arb_scan(), 0..8),
        chunk_size in 1usize..80,
    ) {
        let stream = wire_stream(&scans);
        let decoded = decode_chunked(&stream, chunk_size);
        prop_assert_eq!(decoded, scans);
    }
}
