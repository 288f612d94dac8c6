//! Stream framing.
//!
//! FIX frames are self-delimiting: `8=<ver><SOH>9=<len><SOH>` followed by
//! `len` bytes of body and a fixed-width `10=NNN<SOH>` trailer.

use crate::error::{EngineError, ParseError};
use crate::message::SOH;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Longest BeginString + BodyLength prefix tolerated before giving up.
const MAX_HEADER_PREFIX: usize = 64;

/// Length of the `10=NNN<SOH>` trailer.
const TRAILER_LEN: usize = 7;

const READ_CHUNK: usize = 8 * 1024;

/// Determine whether `buf` starts with a complete frame.
///
/// Returns `Ok(Some(len))` with the frame length, `Ok(None)` if more bytes
/// are needed, or an error if the prefix can never form a valid frame.
pub fn frame_len(buf: &[u8]) -> Result<Option<usize>, ParseError> {
    if buf.len() < 2 {
        return Ok(None);
    }
    if &buf[..2] != b"8=" {
        return Err(ParseError::MissingBeginString);
    }

    let Some(first_soh) = memchr::memchr(SOH, buf) else {
        return prefix_pending(buf.len());
    };

    let rest = &buf[first_soh + 1..];
    if rest.len() < 2 {
        return prefix_pending(buf.len());
    }
    if &rest[..2] != b"9=" {
        return Err(ParseError::MissingBodyLength);
    }

    let Some(len_soh) = memchr::memchr(SOH, rest) else {
        return prefix_pending(buf.len());
    };
    let digits = &rest[2..len_soh];
    let body_len = std::str::from_utf8(digits)
        .ok()
        .filter(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| ParseError::InvalidBodyLength(String::from_utf8_lossy(digits).into_owned()))?;

    let body_start = first_soh + 1 + len_soh + 1;
    let total = body_start + body_len + TRAILER_LEN;
    if buf.len() < total {
        return Ok(None);
    }

    let trailer = &buf[total - TRAILER_LEN..total];
    if &trailer[..3] != b"10=" || trailer[TRAILER_LEN - 1] != SOH {
        return Err(ParseError::MissingCheckSum);
    }
    Ok(Some(total))
}

fn prefix_pending(len: usize) -> Result<Option<usize>, ParseError> {
    if len > MAX_HEADER_PREFIX {
        Err(ParseError::HeaderTooLong(MAX_HEADER_PREFIX))
    } else {
        Ok(None)
    }
}

/// Reads complete frames from an async byte stream.
pub struct FrameReader<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(READ_CHUNK),
        }
    }

    /// Read the next frame. Returns `Ok(None)` on a clean end of stream.
    ///
    /// Cancel-safe: bytes already read stay buffered across calls.
    pub async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, EngineError> {
        loop {
            if let Some(len) = frame_len(&self.buf)? {
                let rest = self.buf.split_off(len);
                let frame = std::mem::replace(&mut self.buf, rest);
                return Ok(Some(frame));
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = self.reader.read(&mut chunk).await?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(EngineError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("stream closed with {} unframed bytes", self.buf.len()),
                )));
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::tags;

    fn frame(seq: u64) -> Vec<u8> {
        Message::new("0")
            .with_field(tags::MSG_SEQ_NUM, seq)
            .encode()
    }

    #[test]
    fn frame_len_detects_complete_frame() {
        let raw = frame(1);
        assert_eq!(frame_len(&raw).unwrap(), Some(raw.len()));
    }

    #[test]
    fn frame_len_waits_for_partial_frame() {
        let raw = frame(1);
        for cut in 0..raw.len() {
            assert_eq!(frame_len(&raw[..cut]).unwrap(), None, "cut at {cut}");
        }
    }

    #[test]
    fn frame_len_ignores_trailing_bytes() {
        let mut raw = frame(1);
        let first = raw.len();
        raw.extend_from_slice(&frame(2));
        assert_eq!(frame_len(&raw).unwrap(), Some(first));
    }

    #[test]
    fn frame_len_rejects_garbage_prefix() {
        assert_eq!(
            frame_len(b"GET / HTTP/1.1").unwrap_err(),
            ParseError::MissingBeginString
        );
        assert_eq!(
            frame_len(b"8=FIX.4.2\x0135=0\x01").unwrap_err(),
            ParseError::MissingBodyLength
        );
        assert!(matches!(
            frame_len(b"8=FIX.4.2\x019=x\x01").unwrap_err(),
            ParseError::InvalidBodyLength(_)
        ));
    }

    #[test]
    fn frame_len_rejects_runaway_header() {
        let mut raw = b"8=".to_vec();
        raw.extend(std::iter::repeat_n(b'X', 100));
        assert_eq!(
            frame_len(&raw).unwrap_err(),
            ParseError::HeaderTooLong(MAX_HEADER_PREFIX)
        );
    }

    #[tokio::test]
    async fn reader_splits_coalesced_frames() {
        let mut wire = frame(1);
        wire.extend_from_slice(&frame(2));
        let mut reader = FrameReader::new(wire.as_slice());

        let a = reader.next_frame().await.unwrap().unwrap();
        let b = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(a, frame(1));
        assert_eq!(b, frame(2));
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    proptest::proptest! {
        #[test]
        fn any_encoded_message_is_one_frame(
            symbol in "[A-Z0-9.]{1,12}",
            text in "[ -~]{0,80}",
            seq in 1u64..1_000_000,
        ) {
            let raw = Message::new("8")
                .with_field(tags::MSG_SEQ_NUM, seq)
                .with_field(tags::SYMBOL, &symbol)
                .with_field(tags::TEXT, &text)
                .encode();
            proptest::prop_assert_eq!(frame_len(&raw).unwrap(), Some(raw.len()));
            for cut in [0, 1, raw.len() / 2, raw.len() - 1] {
                proptest::prop_assert_eq!(frame_len(&raw[..cut]).unwrap(), None);
            }
        }
    }

    #[tokio::test]
    async fn reader_reports_truncated_stream() {
        let wire = frame(1);
        let truncated = &wire[..wire.len() - 3];
        let mut reader = FrameReader::new(truncated);
        let err = reader.next_frame().await.unwrap_err();
        assert!(matches!(err, EngineError::Io(_)));
    }
}
