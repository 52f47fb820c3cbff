//! Content-encoding negotiation.
//!
//! # Design Decisions
//! - Substring match against the raw header, case-insensitive; q-values are
//!   not interpreted
//! - Deflate is checked before gzip (less framing overhead)
//! - Anything unrecognized falls back to no compression, never an error

use tracing::trace;

/// Compression codec chosen for a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    None,
    Deflate,
    Gzip,
}

impl Codec {
    /// Wire name for the `Content-Encoding` header, if any.
    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            Codec::None => None,
            Codec::Deflate => Some("deflate"),
            Codec::Gzip => Some("gzip"),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Codec::None)
    }
}

/// Pick a codec from the request's `Accept-Encoding` value.
pub fn select_codec(accept_encoding: Option<&str>, compression_enabled: bool) -> Codec {
    if !compression_enabled {
        return Codec::None;
    }

    let accept = match accept_encoding {
        Some(value) if !value.trim().is_empty() => value.to_ascii_lowercase(),
        _ => return Codec::None,
    };

    let codec = if accept.contains("deflate") {
        Codec::Deflate
    } else if accept.contains("gzip") {
        Codec::Gzip
    } else {
        Codec::None
    };

    trace!(accept_encoding = %accept, selected = ?codec, "Negotiated content encoding");
    codec
}
