//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! pipeline decisions and body transforms produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```

pub mod logging;
pub mod metrics;
