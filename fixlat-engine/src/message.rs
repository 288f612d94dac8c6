//! FIX tag=value message representation.
//!
//! A [`Message`] keeps its fields in wire order, split into the standard
//! header and the body. Inbound messages additionally carry the raw bytes they
//! were parsed from and the [`Instant`] at which the engine finished reading
//! the frame; that instant is what latency capture measures against.

use crate::error::ParseError;
use crate::tags::{self, HEADER_TAGS};
use std::fmt;
use std::time::Instant;

/// Field separator (SOH).
pub const SOH: u8 = 0x01;

/// Default protocol version for messages built locally.
pub const DEFAULT_BEGIN_STRING: &str = "FIX.4.2";

/// A single tag=value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub tag: u32,
    pub value: String,
}

/// A FIX message.
#[derive(Debug, Clone)]
pub struct Message {
    begin_string: String,
    msg_type: String,
    header: Vec<Field>,
    body: Vec<Field>,
    raw: Option<Vec<u8>>,
    receive_time: Option<Instant>,
}

impl Message {
    /// Create an empty message of the given type.
    pub fn new(msg_type: impl Into<String>) -> Self {
        Self {
            begin_string: DEFAULT_BEGIN_STRING.to_string(),
            msg_type: msg_type.into(),
            header: Vec::new(),
            body: Vec::new(),
            raw: None,
            receive_time: None,
        }
    }

    /// Builder form of [`Message::set_field`].
    pub fn with_field(mut self, tag: u32, value: impl ToString) -> Self {
        self.set_field(tag, value);
        self
    }

    /// Override the BeginString (defaults to FIX.4.2).
    pub fn with_begin_string(mut self, begin_string: impl Into<String>) -> Self {
        self.begin_string = begin_string.into();
        self
    }

    /// Set a field, replacing any existing value for the same tag.
    ///
    /// Any cached raw bytes are discarded since they no longer describe the
    /// message.
    pub fn set_field(&mut self, tag: u32, value: impl ToString) {
        let value = value.to_string();
        self.raw = None;
        match tag {
            tags::BEGIN_STRING => self.begin_string = value,
            tags::MSG_TYPE => self.msg_type = value,
            // Computed on encode.
            tags::BODY_LENGTH | tags::CHECK_SUM => {}
            _ => {
                let section = if HEADER_TAGS.contains(&tag) {
                    &mut self.header
                } else {
                    &mut self.body
                };
                match section.iter_mut().find(|f| f.tag == tag) {
                    Some(existing) => existing.value = value,
                    None => section.push(Field { tag, value }),
                }
            }
        }
    }

    /// Look up a field in the header or body.
    pub fn get_field(&self, tag: u32) -> Option<&str> {
        match tag {
            tags::BEGIN_STRING => Some(&self.begin_string),
            tags::MSG_TYPE => Some(&self.msg_type),
            _ => self
                .header
                .iter()
                .chain(&self.body)
                .find(|f| f.tag == tag)
                .map(|f| f.value.as_str()),
        }
    }

    /// Look up a field and parse it as an unsigned integer.
    pub fn get_u64(&self, tag: u32) -> Option<u64> {
        self.get_field(tag).and_then(|v| v.parse().ok())
    }

    pub fn begin_string(&self) -> &str {
        &self.begin_string
    }

    pub fn msg_type(&self) -> &str {
        &self.msg_type
    }

    /// MsgSeqNum (34), if present and numeric.
    pub fn seq_num(&self) -> Option<u64> {
        self.get_u64(tags::MSG_SEQ_NUM)
    }

    /// Whether PossDupFlag (43) is set.
    pub fn is_poss_dup(&self) -> bool {
        self.get_field(tags::POSS_DUP_FLAG) == Some("Y")
    }

    /// Whether this is a session-level message.
    pub fn is_admin(&self) -> bool {
        tags::msg_type::is_admin(&self.msg_type)
    }

    pub fn header_fields(&self) -> &[Field] {
        &self.header
    }

    pub fn body_fields(&self) -> &[Field] {
        &self.body
    }

    /// Raw bytes for messages produced by [`Message::parse`].
    pub fn bytes(&self) -> Option<&[u8]> {
        self.raw.as_deref()
    }

    /// The instant the engine finished reading this message off the wire.
    pub fn receive_time(&self) -> Option<Instant> {
        self.receive_time
    }

    /// Serialize to wire format, computing BodyLength and CheckSum.
    ///
    /// Returns the original bytes unchanged for an unmodified inbound message.
    pub fn encode(&self) -> Vec<u8> {
        if let Some(raw) = &self.raw {
            return raw.clone();
        }

        let mut body = Vec::with_capacity(128);
        push_field(&mut body, tags::MSG_TYPE, &self.msg_type);
        for field in self.header.iter().chain(&self.body) {
            push_field(&mut body, field.tag, &field.value);
        }

        let mut out = Vec::with_capacity(body.len() + 32);
        push_field(&mut out, tags::BEGIN_STRING, &self.begin_string);
        push_field(&mut out, tags::BODY_LENGTH, &body.len().to_string());
        out.extend_from_slice(&body);
        let sum = checksum(&out);
        push_field(&mut out, tags::CHECK_SUM, &format!("{sum:03}"));
        out
    }

    /// Parse one complete frame, validating BodyLength and CheckSum.
    pub fn parse(raw: Vec<u8>, receive_time: Instant) -> Result<Self, ParseError> {
        let fields = split_fields(&raw)?;

        let mut iter = fields.iter();
        let begin = match iter.next() {
            Some(f) if f.tag == tags::BEGIN_STRING => f,
            _ => return Err(ParseError::MissingBeginString),
        };
        let body_len_field = match iter.next() {
            Some(f) if f.tag == tags::BODY_LENGTH => f,
            _ => return Err(ParseError::MissingBodyLength),
        };
        let declared: usize = field_str(&raw, body_len_field)?
            .parse()
            .map_err(|_| {
                ParseError::InvalidBodyLength(
                    String::from_utf8_lossy(body_len_field.value(&raw)).into_owned(),
                )
            })?;

        let trailer = match fields.last() {
            Some(f) if f.tag == tags::CHECK_SUM && fields.len() > 3 => f,
            _ => return Err(ParseError::MissingCheckSum),
        };

        let actual = trailer.start - body_len_field.end;
        if declared != actual {
            return Err(ParseError::BodyLengthMismatch { declared, actual });
        }

        let declared_sum: u32 = field_str(&raw, trailer)?
            .parse()
            .map_err(|_| ParseError::MissingCheckSum)?;
        let computed = checksum(&raw[..trailer.start]);
        if declared_sum != computed {
            return Err(ParseError::CheckSumMismatch {
                declared: declared_sum,
                computed,
            });
        }

        let msg_type_field = match iter.next() {
            Some(f) if f.tag == tags::MSG_TYPE => f,
            _ => return Err(ParseError::MissingMsgType),
        };

        let mut message = Message::new(field_str(&raw, msg_type_field)?);
        message.begin_string = field_str(&raw, begin)?.to_string();
        for span in &fields[3..fields.len() - 1] {
            let field = Field {
                tag: span.tag,
                value: field_str(&raw, span)?.to_string(),
            };
            if HEADER_TAGS.contains(&span.tag) {
                message.header.push(field);
            } else {
                message.body.push(field);
            }
        }
        message.raw = Some(raw);
        message.receive_time = Some(receive_time);
        Ok(message)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.encode()))
    }
}

/// FIX checksum: byte sum modulo 256.
pub fn checksum(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, b| acc.wrapping_add(u32::from(*b))) % 256
}

fn push_field(buf: &mut Vec<u8>, tag: u32, value: &str) {
    buf.extend_from_slice(tag.to_string().as_bytes());
    buf.push(b'=');
    buf.extend_from_slice(value.as_bytes());
    buf.push(SOH);
}

/// Byte span of one field inside a raw frame. `start` is the first byte of
/// the tag, `end` is one past the trailing SOH.
#[derive(Debug, Clone, Copy)]
struct FieldSpan {
    tag: u32,
    value_start: usize,
    start: usize,
    end: usize,
}

impl FieldSpan {
    fn value<'a>(&self, raw: &'a [u8]) -> &'a [u8] {
        &raw[self.value_start..self.end - 1]
    }
}

fn field_str<'a>(raw: &'a [u8], span: &FieldSpan) -> Result<&'a str, ParseError> {
    std::str::from_utf8(span.value(raw)).map_err(|_| ParseError::InvalidUtf8 { tag: span.tag })
}

fn split_fields(raw: &[u8]) -> Result<Vec<FieldSpan>, ParseError> {
    let mut spans = Vec::with_capacity(16);
    let mut start = 0;
    for soh in memchr::memchr_iter(SOH, raw) {
        let chunk = &raw[start..soh];
        let eq = memchr::memchr(b'=', chunk).ok_or(ParseError::MalformedField { offset: start })?;
        let tag = parse_tag(&chunk[..eq]).ok_or(ParseError::MalformedField { offset: start })?;
        spans.push(FieldSpan {
            tag,
            value_start: start + eq + 1,
            start,
            end: soh + 1,
        });
        start = soh + 1;
    }
    if start != raw.len() {
        return Err(ParseError::MissingCheckSum);
    }
    Ok(spans)
}

fn parse_tag(digits: &[u8]) -> Option<u32> {
    if digits.is_empty() || digits.len() > 9 || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    Some(
        digits
            .iter()
            .fold(0u32, |acc, d| acc * 10 + u32::from(d - b'0')),
    )
}
