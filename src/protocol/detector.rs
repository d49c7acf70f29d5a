//! Transaction-boundary detection.
//!
//! The coordinator never looks inside payloads itself; it asks a
//! [`BoundaryDetector`] what a frame means for transaction state. Each
//! dialect of the minimal framing contract gets its own implementation.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::protocol::frame::{tag, Frame};

/// What a client request does to transaction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMarker {
    Begin,
    Commit,
    Rollback,
    /// Anything else: forwarded as-is.
    Statement,
}

/// What a backend response frame means to the pooler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMarker {
    /// The backend reported an error for the current request.
    Error,
    /// The response is complete.
    Ready,
    /// Opaque payload to relay.
    Other,
}

/// Protocol-specific view of transaction boundaries.
pub trait BoundaryDetector: Send + Sync + std::fmt::Debug {
    /// Short name for logs and the admin API.
    fn name(&self) -> &'static str;

    fn classify_request(&self, frame: &Frame) -> RequestMarker;

    fn classify_response(&self, frame: &Frame) -> ResponseMarker {
        match frame.tag {
            tag::ERROR => ResponseMarker::Error,
            tag::READY => ResponseMarker::Ready,
            _ => ResponseMarker::Other,
        }
    }

    /// Frame that aborts the open transaction on a backend connection.
    fn rollback_frame(&self) -> Frame;

    /// Lightweight no-op used by health probes.
    fn probe_frame(&self) -> Frame {
        Frame::sync()
    }
}

/// Detector selection in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    /// Transaction keywords at the start of `Q` payloads.
    #[default]
    Keyword,
    /// Dedicated `b` / `c` / `r` frames.
    Tagged,
}

impl DetectorKind {
    pub fn build(self) -> Arc<dyn BoundaryDetector> {
        match self {
            DetectorKind::Keyword => Arc::new(KeywordDetector),
            DetectorKind::Tagged => Arc::new(TaggedDetector),
        }
    }
}

/// Recognizes `BEGIN`, `START TRANSACTION`, `COMMIT`, `END`, `ROLLBACK`
/// and `ABORT` at the start of a query payload, case-insensitively.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordDetector;

impl KeywordDetector {
    fn starts_with_word(text: &[u8], word: &str) -> bool {
        if text.len() < word.len() || !text[..word.len()].eq_ignore_ascii_case(word.as_bytes()) {
            return false;
        }
        // Whole word only: "ENDPOINT" is not "END".
        text.get(word.len())
            .map(|b| !b.is_ascii_alphanumeric() && *b != b'_')
            .unwrap_or(true)
    }

    fn skip_whitespace(text: &[u8]) -> &[u8] {
        let start = text
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(text.len());
        &text[start..]
    }
}

impl BoundaryDetector for KeywordDetector {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn classify_request(&self, frame: &Frame) -> RequestMarker {
        if frame.tag != tag::QUERY {
            return RequestMarker::Statement;
        }
        let text = Self::skip_whitespace(&frame.payload);

        if Self::starts_with_word(text, "BEGIN") {
            return RequestMarker::Begin;
        }
        if Self::starts_with_word(text, "START") {
            let rest = Self::skip_whitespace(&text[5..]);
            if Self::starts_with_word(rest, "TRANSACTION") {
                return RequestMarker::Begin;
            }
            return RequestMarker::Statement;
        }
        if Self::starts_with_word(text, "COMMIT") || Self::starts_with_word(text, "END") {
            return RequestMarker::Commit;
        }
        if Self::starts_with_word(text, "ROLLBACK") {
            // ROLLBACK TO SAVEPOINT keeps the transaction open.
            let rest = Self::skip_whitespace(&text[8..]);
            if Self::starts_with_word(rest, "TO") {
                return RequestMarker::Statement;
            }
            return RequestMarker::Rollback;
        }
        if Self::starts_with_word(text, "ABORT") {
            return RequestMarker::Rollback;
        }
        RequestMarker::Statement
    }

    fn rollback_frame(&self) -> Frame {
        Frame::query("ROLLBACK")
    }
}

/// Transaction control carried in the frame tag itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct TaggedDetector;

impl BoundaryDetector for TaggedDetector {
    fn name(&self) -> &'static str {
        "tagged"
    }

    fn classify_request(&self, frame: &Frame) -> RequestMarker {
        match frame.tag {
            tag::BEGIN => RequestMarker::Begin,
            tag::COMMIT => RequestMarker::Commit,
            tag::ROLLBACK => RequestMarker::Rollback,
            _ => RequestMarker::Statement,
        }
    }

    fn rollback_frame(&self) -> Frame {
        Frame::empty(tag::ROLLBACK)
    }
}
