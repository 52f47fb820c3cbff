//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges and address formats
//! - Check the rewrite route and web root are usable for URL construction
//! - Check the device detection pattern compiles
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: PipelineConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::PipelineConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    BindAddress(String),

    #[error("observability.metrics_address '{0}' is not a socket address")]
    MetricsAddress(String),

    #[error("rewrite.marker must not be empty")]
    EmptyMarker,

    #[error("rewrite.proxy_route '{0}' must be a non-empty relative path without '?'")]
    ProxyRoute(String),

    #[error("site.virtual_path '{0}' must start with '/'")]
    VirtualPath(String),

    #[error("site.alternate_feed_url '{0}' is not an absolute URL")]
    FeedUrl(String),

    #[error("site.mobile_devices is not a valid pattern: {0}")]
    MobileDevices(String),
}

/// Validate a parsed configuration, collecting every error.
pub fn validate_config(config: &PipelineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if config.rewrite.marker.trim().is_empty() {
        errors.push(ValidationError::EmptyMarker);
    }

    let route = &config.rewrite.proxy_route;
    if route.is_empty() || route.starts_with('/') || route.contains('?') {
        errors.push(ValidationError::ProxyRoute(route.clone()));
    }

    if !config.site.virtual_path.starts_with('/') {
        errors.push(ValidationError::VirtualPath(config.site.virtual_path.clone()));
    }

    if let Some(feed) = &config.site.alternate_feed_url {
        if !feed.is_empty() && url::Url::parse(feed).is_err() {
            errors.push(ValidationError::FeedUrl(feed.clone()));
        }
    }

    if let Err(e) = regex::Regex::new(&config.site.mobile_devices) {
        errors.push(ValidationError::MobileDevices(e.to_string()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
