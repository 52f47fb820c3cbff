//! Stream transform chain.
//!
//! # Data Flow
//! ```text
//! application bytes
//!     → ResourceRewriter (optional, cleartext)
//!     → Encoder (identity / deflate / gzip)
//!     → sink (wire)
//! ```
//!
//! # Design Decisions
//! - The chain is a typed composition fixed at install time, never a
//!   swappable "current filter"
//! - `finish()` closes innermost first: the rewriter releases held bytes,
//!   then the encoder writes its trailer, then the sink is flushed
//! - Every error surfaces as `io::Error`; nothing is dropped silently

use std::io::{self, Write};

use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;

use crate::pipeline::negotiate::Codec;
use crate::pipeline::rewrite::{ResourceRewriter, RewriteContext};

/// Ordered description of the stages to install for one response.
#[derive(Debug, Clone)]
pub struct TransformPlan {
    /// Stage closest to the wire.
    pub codec: Codec,
    /// Stage closest to the application.
    pub rewrite: Option<RewriteContext>,
}

impl TransformPlan {
    pub fn is_empty(&self) -> bool {
        self.codec.is_none() && self.rewrite.is_none()
    }

    /// Stage names, wire side first.
    pub fn stages(&self) -> Vec<&'static str> {
        let mut stages = Vec::with_capacity(2);
        if let Some(name) = self.codec.as_str() {
            stages.push(name);
        }
        if self.rewrite.is_some() {
            stages.push("rewrite");
        }
        stages
    }
}

/// Compression stage.
pub enum Encoder<W: Write> {
    Identity(W),
    Deflate(ZlibEncoder<W>),
    Gzip(GzEncoder<W>),
}

impl<W: Write> Encoder<W> {
    pub fn new(inner: W, codec: Codec) -> Self {
        match codec {
            Codec::None => Encoder::Identity(inner),
            Codec::Deflate => Encoder::Deflate(ZlibEncoder::new(inner, Compression::default())),
            Codec::Gzip => Encoder::Gzip(GzEncoder::new(inner, Compression::default())),
        }
    }

    pub fn get_ref(&self) -> &W {
        match self {
            Encoder::Identity(w) => w,
            Encoder::Deflate(e) => e.get_ref(),
            Encoder::Gzip(e) => e.get_ref(),
        }
    }

    /// Access to the sink. Only take bytes out of it; writing would corrupt
    /// the compressed stream.
    pub fn get_mut(&mut self) -> &mut W {
        match self {
            Encoder::Identity(w) => w,
            Encoder::Deflate(e) => e.get_mut(),
            Encoder::Gzip(e) => e.get_mut(),
        }
    }

    /// Write the codec trailer, flush the sink and return it.
    pub fn finish(self) -> io::Result<W> {
        let mut inner = match self {
            Encoder::Identity(w) => w,
            Encoder::Deflate(e) => e.finish()?,
            Encoder::Gzip(e) => e.finish()?,
        };
        inner.flush()?;
        Ok(inner)
    }
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Encoder::Identity(w) => w.write(buf),
            Encoder::Deflate(e) => e.write(buf),
            Encoder::Gzip(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Encoder::Identity(w) => w.flush(),
            Encoder::Deflate(e) => e.flush(),
            Encoder::Gzip(e) => e.flush(),
        }
    }
}

/// Installed chain for one response body.
pub enum TransformChain<W: Write> {
    Plain(Encoder<W>),
    Rewriting(ResourceRewriter<Encoder<W>>),
}

impl<W: Write> TransformChain<W> {
    /// Build the chain described by `plan` on top of `sink`.
    pub fn install(plan: TransformPlan, sink: W) -> Self {
        let encoder = Encoder::new(sink, plan.codec);
        match plan.rewrite {
            Some(context) => TransformChain::Rewriting(ResourceRewriter::new(encoder, context)),
            None => TransformChain::Plain(encoder),
        }
    }

    pub fn sink_mut(&mut self) -> &mut W {
        match self {
            TransformChain::Plain(e) => e.get_mut(),
            TransformChain::Rewriting(r) => r.get_mut().get_mut(),
        }
    }

    pub fn sink_ref(&self) -> &W {
        match self {
            TransformChain::Plain(e) => e.get_ref(),
            TransformChain::Rewriting(r) => r.get_ref().get_ref(),
        }
    }

    pub fn rewrites(&self) -> usize {
        match self {
            TransformChain::Plain(_) => 0,
            TransformChain::Rewriting(r) => r.rewrites(),
        }
    }

    /// Close every stage, innermost first, and return the sink.
    pub fn finish(self) -> io::Result<W> {
        match self {
            TransformChain::Plain(encoder) => encoder.finish(),
            TransformChain::Rewriting(rewriter) => rewriter.finish()?.finish(),
        }
    }
}

impl<W: Write> Write for TransformChain<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            TransformChain::Plain(e) => e.write(buf),
            TransformChain::Rewriting(r) => r.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            TransformChain::Plain(e) => e.flush(),
            TransformChain::Rewriting(r) => r.flush(),
        }
    }
}
