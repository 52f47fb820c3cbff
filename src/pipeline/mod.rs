//! Response transformation pipeline.
//!
//! # Data Flow
//! ```text
//! response from handler (headers ready, body not yet polled)
//!     → controller.rs (decide once per response)
//!         → conditional.rs (validator, maybe 304)
//!         → negotiate.rs (codec from Accept-Encoding)
//!     → chain.rs (install encoder + rewriter around the body)
//!         → rewrite.rs (resource references → proxy route)
//!     → Send to client
//! ```

pub mod chain;
pub mod conditional;
pub mod controller;
pub mod negotiate;
pub mod rewrite;

use std::io;

use axum::http::HeaderName;
use thiserror::Error;

pub use chain::{TransformChain, TransformPlan};
pub use conditional::{evaluate, Evaluation};
pub use controller::{
    Action, Decision, PipelineController, RenderedPage, RequestInfo, ResourceVersion,
    ResponseInfo,
};
pub use negotiate::{select_codec, Codec};
pub use rewrite::{ResourceRewriter, RewriteContext, RewriteRules};

/// Errors raised while transforming a response.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A computed header value was not a legal header value.
    #[error("Invalid value for {0} header")]
    Header(HeaderName),

    /// The rewrite or device pattern failed to compile.
    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    /// An encoder or sink failed while the body was streaming.
    #[error("Transform failed: {0}")]
    Transform(#[from] io::Error),

    /// The handler's body stream failed.
    #[error("Response body error: {0}")]
    Body(#[from] axum::Error),
}
