//! Fixed-capacity text buffer for composing responses.

use std::borrow::Cow;
use std::fmt;

use thiserror::Error;

/// Appending would exceed the buffer capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("buffer full: {needed} bytes needed, {remaining} remaining")]
pub struct WriteError {
    pub needed: usize,
    pub remaining: usize,
}

/// A string buffer that refuses to grow past its capacity.
///
/// A write that does not fit is rejected whole; the buffer keeps what was
/// written before it.
#[derive(Debug, Clone)]
pub struct BoundedWriter {
    buf: String,
    capacity: usize,
}

impl BoundedWriter {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: String::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.buf.len()
    }

    pub fn push_str(&mut self, s: &str) -> Result<(), WriteError> {
        if s.len() > self.remaining() {
            return Err(WriteError {
                needed: s.len(),
                remaining: self.remaining(),
            });
        }
        self.buf.push_str(s);
        Ok(())
    }

    /// Append `s` with HTML special characters escaped.
    pub fn push_escaped(&mut self, s: &str) -> Result<(), WriteError> {
        self.push_str(&escape_html(s))
    }

    /// Append formatted text, all or nothing.
    pub fn push_fmt(&mut self, args: fmt::Arguments<'_>) -> Result<(), WriteError> {
        match args.as_str() {
            Some(s) => self.push_str(s),
            None => self.push_str(&args.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn into_string(self) -> String {
        self.buf
    }
}

impl fmt::Write for BoundedWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push_str(s).map_err(|_| fmt::Error)
    }
}

/// Escape `&`, `<`, `>`, `"` and `'` for use in HTML text and attributes.
pub fn escape_html(s: &str) -> Cow<'_, str> {
    if !s.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}
