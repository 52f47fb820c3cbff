//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the pipeline.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the response pipeline.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Compression feature flags.
    pub compression: CompressionConfig,

    /// Resource-reference rewriting settings.
    pub rewrite: RewriteConfig,

    /// Site settings (web root, feed URL).
    pub site: SiteConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Compression feature flags.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Compress page responses with deflate/gzip when the client accepts it.
    pub enable_http_compression: bool,

    /// Rewrite script references to the internal resource endpoint so they
    /// are served through the resource proxy route.
    pub compress_web_resource: bool,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enable_http_compression: true,
            compress_web_resource: true,
        }
    }
}

/// Resource-reference rewriting settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Substring identifying the internal resource endpoint (case-insensitive).
    pub marker: String,

    /// Route (relative to the web root) that proxies rewritten references.
    pub proxy_route: String,

    /// Cache lifetime for resource responses when rewriting is disabled.
    pub resource_cache_days: u64,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            marker: "webresource.axd".to_string(),
            proxy_route: "resource-proxy".to_string(),
            resource_cache_days: 30,
        }
    }
}

/// Site settings consumed by the pipeline.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Virtual application root, e.g. "/" or "/blog/".
    pub virtual_path: String,

    /// Replaces the built-in syndication feed URL when set.
    pub alternate_feed_url: Option<String>,

    /// User-Agent pattern (case-insensitive) identifying mobile devices.
    /// Empty disables detection.
    pub mobile_devices: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            virtual_path: "/".to_string(),
            alternate_feed_url: None,
            mobile_devices: default_mobile_devices(),
        }
    }
}

fn default_mobile_devices() -> String {
    r"(nokia|sonyericsson|blackberry|samsung|sec-|windows ce|motorola|mot-|up\.b|midp-|iphone|ipod|android.+mobile|opera mini)".to_string()
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert!(config.compression.enable_http_compression);
        assert!(config.compression.compress_web_resource);
        assert_eq!(config.rewrite.marker, "webresource.axd");
        assert_eq!(config.rewrite.proxy_route, "resource-proxy");
        assert_eq!(config.rewrite.resource_cache_days, 30);
        assert_eq!(config.site.virtual_path, "/");
        assert!(config.site.mobile_devices.contains("blackberry"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: PipelineConfig = toml::from_str(
            r#"
            [compression]
            enable_http_compression = false

            [site]
            virtual_path = "/blog/"
            "#,
        )
        .unwrap();

        assert!(!config.compression.enable_http_compression);
        assert!(config.compression.compress_web_resource);
        assert_eq!(config.site.virtual_path, "/blog/");
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
    }
}
