//! Encoding of characteristic payloads.
//!
//! The fan controller exchanges ASCII text. Depending on the [`PayloadEncoding`] that text is
//! base64 encoded on the wire or sent as is. Decoded bytes are mapped to characters one byte per
//! code point, so utf-8 sequences from the peripheral show up as their latin-1 pieces (`°` becomes
//! `Â°`). [`sanitize_message`] strips the leftover artifact.

use data_encoding::BASE64;

use crate::config::types::PayloadEncoding;
use crate::device::constants::ENCODING_ARTIFACT;
use crate::error::DeviceError;

fn to_wire(text: &str, encoding: PayloadEncoding) -> Vec<u8> {
    match encoding {
        PayloadEncoding::Base64 => BASE64.encode(text.as_bytes()).into_bytes(),
        PayloadEncoding::Plain => text.as_bytes().to_vec(),
    }
}

fn from_wire(payload: &[u8], encoding: PayloadEncoding) -> Result<String, DeviceError> {
    let bytes = match encoding {
        PayloadEncoding::Base64 => {
            // some stacks pad or terminate the value with whitespace / NUL
            let trimmed: Vec<u8> = payload
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace() && *b != 0)
                .collect();

            BASE64.decode(&trimmed).map_err(|err| DeviceError::Decode { reason: err.to_string() })?
        },
        PayloadEncoding::Plain => payload.to_vec(),
    };

    Ok(bytes.into_iter().map(char::from).collect())
}

pub fn sanitize_message(text: &str) -> String {
    text.replace(ENCODING_ARTIFACT, "")
}

/// Decodes a status message payload, without sanitizing it.
pub fn decode_text(payload: &[u8], encoding: PayloadEncoding) -> Result<String, DeviceError> {
    from_wire(payload, encoding)
}

/// Decodes and sanitizes a status message payload.
pub fn decode_message(payload: &[u8], encoding: PayloadEncoding) -> Result<String, DeviceError> {
    Ok(sanitize_message(&decode_text(payload, encoding)?))
}

pub fn encode_rpm(value: u16, encoding: PayloadEncoding) -> Vec<u8> {
    to_wire(&value.to_string(), encoding)
}

/// Parses the leading decimal integer of `text`, ignoring surrounding whitespace and whatever
/// follows the digits ("750 rpm" is 750).
fn parse_leading_integer(text: &str) -> Option<i64> {
    let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    let end = digits.find(|c: char| !c.is_ascii_digit()).unwrap_or(digits.len());
    if end == 0 {
        return None;
    }

    let value: i64 = digits[..end].parse().ok()?;
    Some(if negative { -value } else { value })
}

/// Decodes an RPM payload. Returns `None` when the payload does not hold an integer that fits
/// an RPM value; callers keep their previous value in that case.
pub fn decode_rpm(payload: &[u8], encoding: PayloadEncoding) -> Option<u16> {
    let text = from_wire(payload, encoding).ok()?;
    let value = parse_leading_integer(&text)?;
    u16::try_from(value).ok()
}
