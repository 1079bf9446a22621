//! Property-based tests for record encoding.
//!
//! Random texts mixing line breaks and multi-byte characters are encoded
//! through small staging and output buffers and compared with a one-shot
//! encoding of the sanitised text.

use logship::{
    EntryEncoder, LINE_SEPARATOR, ShippingBuffer, encoded_len, sanitize,
    test_utils::RecordingTransport,
};
use proptest::prelude::*;

fn text_strategy() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![
            Just("\n".to_owned()),
            Just("\r".to_owned()),
            Just("\r\n".to_owned()),
            Just("😀".to_owned()),
            Just("é".to_owned()),
            Just("\u{2028}".to_owned()),
            "[a-z ]{0,12}",
        ],
        0..40,
    )
    .prop_map(|parts| parts.concat())
}

fn split_lines(text: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut rest = text;
    while let Some(pos) = rest.find(['\r', '\n']) {
        lines.push(&rest[..pos]);
        let skip = if rest[pos..].starts_with("\r\n") { 2 } else { 1 };
        rest = &rest[pos + skip..];
    }
    lines.push(rest);
    lines
}

proptest! {
    #[test]
    fn sanitize_removes_breaks_and_keeps_lines(text in text_strategy()) {
        let sanitized = sanitize(&text);
        prop_assert!(!sanitized.contains('\n'));
        prop_assert!(!sanitized.contains('\r'));
        let rejoined = split_lines(&text).join(&LINE_SEPARATOR.to_string());
        prop_assert_eq!(sanitized, rejoined);
    }

    #[test]
    fn streaming_matches_whole_string_encoding(
        token in "[a-z0-9]{0,8}",
        text in text_strategy(),
        staging in 1_usize..16,
        capacity in 16_usize..64,
    ) {
        let mut transport = RecordingTransport::default();
        let mut buffer = ShippingBuffer::new(capacity);
        let mut encoder = EntryEncoder::new(staging);
        encoder
            .encode(token.as_bytes(), &text, &mut buffer, &mut transport)
            .expect("recording transport accepts writes");
        buffer.flush(&mut transport).expect("final flush");

        let expected = format!("{token}{}\n", sanitize(&text)).into_bytes();
        prop_assert_eq!(transport.concat(), expected.clone());
        prop_assert_eq!(encoded_len(token.as_bytes(), &text), expected.len());
        prop_assert!(transport.writes.iter().all(|write| write.len() <= capacity));
        for write in &transport.writes {
            prop_assert!(std::str::from_utf8(write).is_ok(), "write split a code point");
        }
    }
}
