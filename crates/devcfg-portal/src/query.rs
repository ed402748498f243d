//! Query string access and URL decoding.

use thiserror::Error;
use tracing::warn;

/// URL decoding failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// `%` not followed by two hex digits.
    #[error("invalid percent escape at byte {0}")]
    InvalidEscape(usize),

    /// The decoded bytes are not UTF-8.
    #[error("decoded value is not valid UTF-8")]
    InvalidUtf8,
}

/// Cut `query` to at most `max_len` bytes on a character boundary.
pub fn truncate_query(query: &str, max_len: usize) -> &str {
    if query.len() <= max_len {
        return query;
    }
    let mut end = max_len;
    while !query.is_char_boundary(end) {
        end -= 1;
    }
    warn!(
        "Query string truncated from {} to {} bytes",
        query.len(),
        end
    );
    &query[..end]
}

/// Raw (still encoded) value of the first parameter named `name`.
///
/// A parameter without `=` has an empty value.
pub fn query_value<'a>(query: &'a str, name: &str) -> Option<&'a str> {
    query
        .split('&')
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// Whether a parameter named `name` is present.
pub fn has_param(query: &str, name: &str) -> bool {
    query_value(query, name).is_some()
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Decode `application/x-www-form-urlencoded` text: `+` is a space and
/// `%XX` is the byte `XX`.
pub fn url_decode(input: &str) -> Result<String, DecodeError> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                let high = bytes.get(i + 1).copied().and_then(hex_value);
                let low = bytes.get(i + 2).copied().and_then(hex_value);
                match (high, low) {
                    (Some(high), Some(low)) => out.push(high << 4 | low),
                    _ => return Err(DecodeError::InvalidEscape(i)),
                }
                i += 3;
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8(out).map_err(|_| DecodeError::InvalidUtf8)
}
