//! Outbound response pipeline: conditional GET, content-encoding negotiation,
//! streaming compression and resource-reference rewriting for Axum services.

pub mod config;
pub mod http;
pub mod observability;
pub mod pipeline;
pub mod site;

pub use config::schema::PipelineConfig;
pub use http::HttpServer;
pub use pipeline::PipelineController;
