//! Record encoding: `token || UTF-8(sanitize(text)) || '\n'`.
//!
//! The collector treats a bare `\n` as the record delimiter, so every line
//! break inside the text (`\r\n`, `\n` or `\r`) is replaced by U+2028 LINE
//! SEPARATOR and a multi-line message arrives as one record.
//!
//! Entries may be arbitrarily long while memory stays bounded: the text is
//! sanitised into a fixed-size staging buffer and each chunk is encoded into
//! the [`ShippingBuffer`] with an incremental [`encoding_rs::Encoder`], which
//! never splits a code point across two writes. The buffer is flushed to the
//! transport whenever it fills up.

use encoding_rs::{CoderResult, Encoder, UTF_8};

use crate::{buffer::ShippingBuffer, error::TransportError, transport::Transport};

/// Replacement for line breaks inside a record.
pub const LINE_SEPARATOR: char = '\u{2028}';
/// Byte terminating every record on the wire.
pub const RECORD_DELIMITER: u8 = b'\n';

/// Replace every line break in `text` with [`LINE_SEPARATOR`].
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    while pos < text.len() {
        pos = sanitize_into(text, pos, &mut out, usize::MAX);
    }
    out
}

/// Exact number of bytes [`EntryEncoder::encode`] produces for a record.
pub fn encoded_len(token: &[u8], text: &str) -> usize {
    let bytes = text.as_bytes();
    let separator_len = LINE_SEPARATOR.len_utf8();
    let mut len = token.len() + 1;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\r' => {
                len += separator_len;
                if bytes.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
            }
            b'\n' => len += separator_len,
            _ => len += 1,
        }
        i += 1;
    }
    len
}

// Sanitise characters of `text` starting at byte `pos` into `out`, stopping
// after `max_chars` characters. Returns the byte offset to resume from. The
// `\r\n` lookahead reads `text` itself, so a pair straddling two chunks still
// collapses into one separator.
fn sanitize_into(text: &str, pos: usize, out: &mut String, max_chars: usize) -> usize {
    let rest = &text[pos..];
    let mut consumed = 0;
    let mut written = 0;
    let mut chars = rest.chars().peekable();
    while written < max_chars {
        let Some(c) = chars.next() else {
            break;
        };
        consumed += c.len_utf8();
        match c {
            '\r' => {
                out.push(LINE_SEPARATOR);
                if chars.peek() == Some(&'\n') {
                    chars.next();
                    consumed += 1;
                }
            }
            '\n' => out.push(LINE_SEPARATOR),
            _ => out.push(c),
        }
        written += 1;
    }
    pos + consumed
}

/// Streaming encoder owned by one worker.
///
/// Holds the staging buffer and the incremental UTF-8 encoder state between
/// chunks of the same entry. Not shared across threads.
pub struct EntryEncoder {
    staging: String,
    staging_chars: usize,
    encoder: Encoder,
}

impl EntryEncoder {
    /// Create an encoder sanitising at most `staging_chars` characters per
    /// chunk.
    pub fn new(staging_chars: usize) -> Self {
        let staging_chars = staging_chars.max(1);
        Self {
            staging: String::with_capacity(staging_chars * LINE_SEPARATOR.len_utf8()),
            staging_chars,
            encoder: UTF_8.new_encoder(),
        }
    }

    /// Append one record to `buffer`, flushing to `transport` as needed.
    ///
    /// When the record does not fit in the remaining space the pending bytes
    /// are flushed first; a record larger than the whole buffer then streams
    /// through it in chunks. On error the partially appended record is
    /// discarded while bytes of earlier records stay buffered.
    ///
    /// Fails with [`TransportError::BufferTooSmall`] when the buffer cannot
    /// hold a single character even after a flush.
    pub fn encode<T: Transport + ?Sized>(
        &mut self,
        token: &[u8],
        text: &str,
        buffer: &mut ShippingBuffer,
        transport: &mut T,
    ) -> Result<(), TransportError> {
        if encoded_len(token, text) > buffer.remaining() {
            buffer.flush(transport)?;
        }
        buffer.begin_record();
        match self.stream_record(token, text, buffer, transport) {
            Ok(()) => {
                buffer.commit_record();
                Ok(())
            }
            Err(err) => {
                buffer.abandon_record();
                Err(err)
            }
        }
    }

    fn stream_record<T: Transport + ?Sized>(
        &mut self,
        token: &[u8],
        text: &str,
        buffer: &mut ShippingBuffer,
        transport: &mut T,
    ) -> Result<(), TransportError> {
        self.encoder = UTF_8.new_encoder();
        write_raw(token, buffer, transport)?;
        let mut pos = 0;
        while pos < text.len() {
            self.staging.clear();
            pos = sanitize_into(text, pos, &mut self.staging, self.staging_chars);
            self.encode_staging(false, buffer, transport)?;
        }
        self.staging.clear();
        self.encode_staging(true, buffer, transport)?;
        write_raw(&[RECORD_DELIMITER], buffer, transport)
    }

    fn encode_staging<T: Transport + ?Sized>(
        &mut self,
        last: bool,
        buffer: &mut ShippingBuffer,
        transport: &mut T,
    ) -> Result<(), TransportError> {
        let mut src = self.staging.as_str();
        loop {
            let (result, read, written, _) =
                self.encoder.encode_from_utf8(src, buffer.spare_mut(), last);
            buffer.advance(written);
            src = &src[read..];
            match result {
                CoderResult::InputEmpty => return Ok(()),
                CoderResult::OutputFull if buffer.is_empty() => {
                    return Err(TransportError::BufferTooSmall(buffer.capacity()));
                }
                CoderResult::OutputFull => buffer.flush(transport)?,
            }
        }
    }
}

impl Default for EntryEncoder {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_STAGING_CHARS)
    }
}

fn write_raw<T: Transport + ?Sized>(
    mut bytes: &[u8],
    buffer: &mut ShippingBuffer,
    transport: &mut T,
) -> Result<(), TransportError> {
    while !bytes.is_empty() {
        if buffer.remaining() == 0 {
            buffer.flush(transport)?;
            if buffer.remaining() == 0 {
                return Err(TransportError::BufferTooSmall(buffer.capacity()));
            }
        }
        let taken = buffer.fill(bytes);
        bytes = &bytes[taken..];
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::test_utils::RecordingTransport;

    fn encode_all(token: &str, text: &str, staging: usize, capacity: usize) -> RecordingTransport {
        let mut transport = RecordingTransport::default();
        let mut buffer = ShippingBuffer::new(capacity);
        let mut encoder = EntryEncoder::new(staging);
        encoder
            .encode(token.as_bytes(), text, &mut buffer, &mut transport)
            .expect("encode succeeds");
        buffer.flush(&mut transport).expect("final flush");
        transport
    }

    #[rstest]
    #[case("line1\r\nline2", "line1\u{2028}line2")]
    #[case("a\nb\rc\r\nd", "a\u{2028}b\u{2028}c\u{2028}d")]
    #[case("\r\r\n\n", "\u{2028}\u{2028}\u{2028}")]
    #[case("\n\r", "\u{2028}\u{2028}")]
    #[case("no breaks", "no breaks")]
    #[case("", "")]
    fn sanitize_replaces_every_break(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(sanitize(input), expected);
    }

    #[rstest]
    fn encodes_token_text_and_delimiter() {
        let transport = encode_all("abc", "line1\r\nline2", 8192, 8192);
        let mut expected = b"abc".to_vec();
        expected.extend_from_slice("line1\u{2028}line2".as_bytes());
        expected.push(b'\n');
        assert_eq!(transport.concat(), expected);
        assert_eq!(transport.writes.len(), 1);
    }

    #[rstest]
    #[case(1, 16)]
    #[case(2, 16)]
    #[case(3, 17)]
    #[case(7, 19)]
    fn emoji_straddling_chunks_survives(#[case] staging: usize, #[case] capacity: usize) {
        let text = "ab😀c😀\r\n😀";
        let transport = encode_all("tok", text, staging, capacity);
        let wire = transport.concat();
        let decoded = std::str::from_utf8(&wire).expect("output is valid UTF-8");
        assert_eq!(decoded, format!("tok{}\n", sanitize(text)));
        for write in &transport.writes {
            assert!(write.len() <= capacity);
        }
    }

    #[rstest]
    fn crlf_split_across_staging_chunks_is_one_break() {
        // Staging of one character puts '\r' and '\n' in different chunks.
        let transport = encode_all("", "a\r\nb", 1, 16);
        assert_eq!(transport.concat(), "a\u{2028}b\n".as_bytes());
    }

    #[rstest]
    fn delimiter_goes_to_fresh_buffer_when_full() {
        // "tok" + "abcde" fills the 8-byte buffer exactly.
        let transport = encode_all("tok", "abcde", 4, 8);
        assert_eq!(transport.writes, vec![b"tokabcde".to_vec(), b"\n".to_vec()]);
    }

    #[rstest]
    #[case("abc", "line1\r\nline2")]
    #[case("", "😀\u{2028}é")]
    #[case("t", "\r\n\r\n")]
    fn encoded_len_matches_output(#[case] token: &str, #[case] text: &str) {
        let transport = encode_all(token, text, 3, 16);
        assert_eq!(encoded_len(token.as_bytes(), text), transport.concat().len());
    }

    #[rstest]
    fn small_records_coalesce_and_large_record_flushes_alone() {
        let mut transport = RecordingTransport::default();
        let mut buffer = ShippingBuffer::new(8192);
        let mut encoder = EntryEncoder::default();
        for size in [100, 100, 8000] {
            let text = "x".repeat(size);
            encoder
                .encode(b"abc", &text, &mut buffer, &mut transport)
                .expect("encode succeeds");
        }
        buffer.flush(&mut transport).expect("final flush");
        let sizes: Vec<usize> = transport.writes.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![208, 8004]);
    }

    #[rstest]
    fn record_larger_than_buffer_streams_in_chunks() {
        let mut transport = RecordingTransport::default();
        let mut buffer = ShippingBuffer::new(16);
        let mut encoder = EntryEncoder::new(5);
        encoder
            .encode(b"t", "small", &mut buffer, &mut transport)
            .expect("small record buffered");
        assert!(transport.writes.is_empty());
        let long = "y".repeat(40);
        encoder
            .encode(b"t", &long, &mut buffer, &mut transport)
            .expect("long record streamed");
        buffer.flush(&mut transport).expect("final flush");
        assert_eq!(transport.writes[0], b"tsmall\n");
        assert!(transport.writes.iter().all(|w| w.len() <= 16));
        assert_eq!(transport.concat(), format!("tsmall\nt{long}\n").as_bytes());
    }

    #[rstest]
    fn failure_mid_record_discards_partial_bytes() {
        let mut transport = RecordingTransport::failing_after(1);
        let mut buffer = ShippingBuffer::new(16);
        let mut encoder = EntryEncoder::new(4);
        let long = "z".repeat(64);
        encoder
            .encode(b"t", &long, &mut buffer, &mut transport)
            .expect_err("second chunk write fails");
        assert!(buffer.is_empty(), "partial record must not linger");
    }

    #[rstest]
    fn failed_preflush_keeps_earlier_records() {
        let mut transport = RecordingTransport::failing_after(0);
        let mut buffer = ShippingBuffer::new(16);
        let mut encoder = EntryEncoder::new(4);
        encoder
            .encode(b"t", "first", &mut buffer, &mut transport)
            .expect("first record buffered");
        encoder
            .encode(b"t", "second record", &mut buffer, &mut transport)
            .expect_err("flush of first record fails");
        assert_eq!(buffer.as_slice(), b"tfirst\n");
    }

    #[rstest]
    #[case(0, "x")]
    #[case(2, "😀")]
    #[case(3, "😀")]
    fn buffer_too_small_for_a_character_fails_instead_of_spinning(
        #[case] capacity: usize,
        #[case] text: &str,
    ) {
        let mut transport = RecordingTransport::default();
        let mut buffer = ShippingBuffer::new(capacity);
        let mut encoder = EntryEncoder::new(4);
        let err = encoder
            .encode(b"", text, &mut buffer, &mut transport)
            .expect_err("no room for the character");
        assert!(matches!(err, TransportError::BufferTooSmall(c) if c == capacity));
        assert!(buffer.is_empty());
        assert_eq!(buffer.records(), 0);
    }

    #[rstest]
    fn encoded_records_are_counted_in_the_buffer() {
        let mut transport = RecordingTransport::default();
        let mut buffer = ShippingBuffer::new(64);
        let mut encoder = EntryEncoder::default();
        for text in ["a", "b", "poison"] {
            encoder
                .encode(b"tok", text, &mut buffer, &mut transport)
                .expect("record buffered");
        }
        assert_eq!(buffer.records(), 3);
        assert!(buffer.drop_last_record());
        assert_eq!(buffer.as_slice(), b"toka\ntokb\n");
    }
}
