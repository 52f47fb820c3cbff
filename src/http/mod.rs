//! HTTP integration subsystem.
//!
//! # Data Flow
//! ```text
//! request
//!     → server.rs (Axum setup, tracing, request ID, timeout)
//!     → middleware.rs (capture request info, run handler)
//!     → handler (tags responses via response.rs)
//!     → middleware.rs (controller decision, headers)
//!     → body.rs (stream body through the transform chain)
//!     → Send to client
//! ```

pub mod body;
pub mod middleware;
pub mod response;
pub mod server;

pub use response::{Page, Versioned};
pub use server::HttpServer;
