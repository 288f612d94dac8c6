//! Human-readable rendering of FIX messages for logs.

use fixlat_engine::{Message, SOH};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("message bytes are not valid UTF-8 (valid up to byte {valid_up_to})")]
    NotUtf8 { valid_up_to: usize },
}

/// Inputs the renderer accepts.
#[derive(Debug, Clone, Copy)]
pub enum Renderable<'a> {
    /// A structured message, rendered from its encoded form.
    Message(&'a Message),
    /// Raw wire text.
    Text(&'a str),
    /// Raw wire bytes.
    Bytes(&'a [u8]),
}

impl<'a> From<&'a Message> for Renderable<'a> {
    fn from(message: &'a Message) -> Self {
        Self::Message(message)
    }
}

impl<'a> From<&'a str> for Renderable<'a> {
    fn from(text: &'a str) -> Self {
        Self::Text(text)
    }
}

impl<'a> From<&'a [u8]> for Renderable<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Self::Bytes(bytes)
    }
}

/// Render `input` with every SOH replaced by `|`.
///
/// Inbound messages render from the bytes that arrived on the wire; outbound
/// ones are encoded first.
pub fn render<'a>(input: impl Into<Renderable<'a>>) -> Result<String, RenderError> {
    match input.into() {
        Renderable::Text(text) => Ok(replace_soh(text)),
        Renderable::Bytes(bytes) => render_bytes(bytes),
        Renderable::Message(message) => match message.bytes() {
            Some(raw) => render_bytes(raw),
            None => render_bytes(&message.encode()),
        },
    }
}

fn render_bytes(bytes: &[u8]) -> Result<String, RenderError> {
    std::str::from_utf8(bytes)
        .map(replace_soh)
        .map_err(|e| RenderError::NotUtf8 {
            valid_up_to: e.valid_up_to(),
        })
}

fn replace_soh(text: &str) -> String {
    text.replace(char::from(SOH), "|")
}
