//! Site settings and URL resolution.
//!
//! The pipeline only needs the virtual web root (to build the resource proxy
//! route) and the request's scheme+authority (to make references absolute).
//! The absolute web root is computed once per request by the controller and
//! carried on [`RequestInfo`](crate::pipeline::RequestInfo), never in global
//! state.

use url::Url;

use crate::config::SiteConfig;

const SYNDICATION_PATH: &str = "syndication.axd";

/// Read-only view of the site configuration.
#[derive(Debug, Clone)]
pub struct SiteSettings {
    relative_web_root: String,
    alternate_feed_url: Option<String>,
}

impl SiteSettings {
    pub fn new(config: &SiteConfig) -> Self {
        Self {
            relative_web_root: normalize_root(&config.virtual_path),
            alternate_feed_url: config
                .alternate_feed_url
                .clone()
                .filter(|url| !url.trim().is_empty()),
        }
    }

    /// Relative root of the site; always starts and ends with '/'.
    pub fn relative_web_root(&self) -> &str {
        &self.relative_web_root
    }

    /// Absolute root for a request origin such as `https://example.com`.
    pub fn absolute_web_root(&self, origin: &str) -> Option<Url> {
        Url::parse(origin).ok()?.join(&self.relative_web_root).ok()
    }

    /// Feed URL, preferring the configured alternate.
    pub fn feed_url(&self, absolute_root: &Url) -> String {
        match &self.alternate_feed_url {
            Some(url) => url.clone(),
            None => format!("{}{}", absolute_root, SYNDICATION_PATH),
        }
    }

    /// Resolve a site-relative path against an absolute root.
    ///
    /// Paths that already start with the relative root are not prefixed twice.
    pub fn convert_to_absolute(&self, absolute_root: &Url, relative: &str) -> Option<Url> {
        if relative.is_empty() {
            return None;
        }
        let root = absolute_root.as_str();
        let base = root
            .strip_suffix(self.relative_web_root.as_str())
            .unwrap_or(root);
        let joined = if relative.starts_with('/') {
            format!("{}{}", base, relative)
        } else {
            format!("{}{}", root, relative)
        };
        Url::parse(&joined).ok()
    }
}

fn normalize_root(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}
