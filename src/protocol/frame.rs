//! Frame type and the tags understood by the pooler.
//!
//! A frame is `tag: u8`, `len: u32` (big endian, payload only), then
//! `len` payload bytes. Payloads are opaque except where noted below.

use std::collections::HashMap;
use bytes::Bytes;

use crate::error::{PoolerError, PoolerResult};

/// Frame tags.
pub mod tag {
    /// Client startup: NUL separated `key\0value\0` pairs.
    pub const STARTUP: u8 = b'S';
    /// Query with an opaque payload.
    pub const QUERY: u8 = b'Q';
    /// No-op round trip, answered with `READY`.
    pub const SYNC: u8 = b'Y';
    /// Pairing policy change, intercepted by the pooler.
    pub const PAIRING: u8 = b'M';
    /// Client terminate.
    pub const TERMINATE: u8 = b'X';
    /// Explicit transaction control (tagged dialect).
    pub const BEGIN: u8 = b'b';
    pub const COMMIT: u8 = b'c';
    pub const ROLLBACK: u8 = b'r';
    /// Backend responses.
    pub const DATA_ROW: u8 = b'D';
    pub const COMMAND_COMPLETE: u8 = b'C';
    pub const ERROR: u8 = b'E';
    pub const READY: u8 = b'Z';
}

/// Size of the fixed frame header.
pub const HEADER_LEN: usize = 5;

/// A single protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub tag: u8,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(tag: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            tag,
            payload: payload.into(),
        }
    }

    pub fn empty(tag: u8) -> Self {
        Self::new(tag, Bytes::new())
    }

    pub fn query(sql: &str) -> Self {
        Self::new(tag::QUERY, Bytes::copy_from_slice(sql.as_bytes()))
    }

    pub fn sync() -> Self {
        Self::empty(tag::SYNC)
    }

    pub fn ready() -> Self {
        Self::empty(tag::READY)
    }

    pub fn terminate() -> Self {
        Self::empty(tag::TERMINATE)
    }

    /// Build a startup frame from key/value parameters.
    pub fn startup<'a>(params: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut buf = Vec::new();
        for (key, value) in params {
            buf.extend_from_slice(key.as_bytes());
            buf.push(0);
            buf.extend_from_slice(value.as_bytes());
            buf.push(0);
        }
        Self::new(tag::STARTUP, buf)
    }

    /// Build an error frame as sent by the pooler: `code\0message`.
    pub fn error(code: &str, message: &str) -> Self {
        let mut buf = Vec::with_capacity(code.len() + message.len() + 1);
        buf.extend_from_slice(code.as_bytes());
        buf.push(0);
        buf.extend_from_slice(message.as_bytes());
        Self::new(tag::ERROR, buf)
    }

    /// Error frame for a pooler-side failure: `code\0message\0retryable`,
    /// where `retryable` is `1` when the same request may be sent again.
    pub fn from_error(err: &PoolerError) -> Self {
        let message = format!("{}\0{}", err, u8::from(err.is_retryable()));
        Self::error(err.code(), &message)
    }

    /// Whether a pooler error frame invites a retry. Backend errors and
    /// frames without the flag report `false`.
    pub fn is_retryable_error(&self) -> bool {
        self.tag == tag::ERROR && self.payload.split(|b| *b == 0).nth(2) == Some(&b"1"[..])
    }

    /// Split an error payload into `(code, message)`.
    ///
    /// Backends are not required to follow the pooler's layout; a payload
    /// without a NUL is reported with an empty code.
    pub fn error_parts(&self) -> Option<(String, String)> {
        if self.tag != tag::ERROR {
            return None;
        }
        let text = String::from_utf8_lossy(&self.payload);
        let mut parts = text.split('\0');
        match (parts.next(), parts.next()) {
            (Some(code), Some(message)) => Some((code.to_string(), message.to_string())),
            _ => Some((String::new(), text.into_owned())),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.tag == tag::READY
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}'({} bytes)", self.tag as char, self.payload.len())
    }
}

/// Parse a startup payload into its parameters.
pub fn parse_startup(frame: &Frame) -> PoolerResult<HashMap<String, String>> {
    if frame.tag != tag::STARTUP {
        return Err(PoolerError::Protocol(format!(
            "expected startup frame, got {}",
            frame
        )));
    }

    let text = std::str::from_utf8(&frame.payload)
        .map_err(|_| PoolerError::Protocol("startup payload is not UTF-8".into()))?;

    let mut parts = text.split('\0').filter(|s| !s.is_empty());
    let mut params = HashMap::new();
    while let Some(key) = parts.next() {
        let value = parts
            .next()
            .ok_or_else(|| PoolerError::Protocol(format!("startup key '{}' has no value", key)))?;
        params.insert(key.to_string(), value.to_string());
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_params_parse() {
        let frame = Frame::startup([("database", "app"), ("pairing", "statement")]);
        let params = parse_startup(&frame).unwrap();
        assert_eq!(params.get("database").map(String::as_str), Some("app"));
        assert_eq!(params.get("pairing").map(String::as_str), Some("statement"));
    }

    #[test]
    fn startup_dangling_key_rejected() {
        let frame = Frame::new(tag::STARTUP, &b"database\0"[..]);
        assert!(parse_startup(&frame).is_err());
    }

    #[test]
    fn startup_wrong_tag_rejected() {
        assert!(parse_startup(&Frame::query("select 1")).is_err());
    }

    #[test]
    fn error_parts_split_code() {
        let frame = Frame::error("pool_exhausted", "try later");
        let (code, message) = frame.error_parts().unwrap();
        assert_eq!(code, "pool_exhausted");
        assert_eq!(message, "try later");
    }

    #[test]
    fn pooler_errors_carry_retry_flag() {
        let exhausted = Frame::from_error(&PoolerError::PoolExhausted {
            pool: "app".into(),
            timeout: std::time::Duration::from_millis(10),
        });
        let (code, message) = exhausted.error_parts().unwrap();
        assert_eq!(code, "pool_exhausted");
        assert!(message.contains("app"));
        assert!(exhausted.is_retryable_error());

        let violation = Frame::from_error(&PoolerError::PolicyViolation("no".into()));
        assert!(!violation.is_retryable_error());
        assert!(!Frame::error("42000", "backend said no").is_retryable_error());
    }

    #[test]
    fn error_parts_without_code() {
        let frame = Frame::new(tag::ERROR, &b"syntax error"[..]);
        let (code, message) = frame.error_parts().unwrap();
        assert!(code.is_empty());
        assert_eq!(message, "syntax error");
        assert!(Frame::ready().error_parts().is_none());
    }
}
