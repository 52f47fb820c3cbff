//! Per-response pipeline decisions.
//!
//! # State Machine
//! ```text
//! Start → CacheCheck ─┬─ validator matched ──────────→ ShortCircuited (304)
//!                     └─ Proceeding ─┬─ page ────────→ ChainInstalled → Completed
//!                                    ├─ resource ────→ far-future caching
//!                                    └─ otherwise ───→ pass through
//! ```
//!
//! # Design Decisions
//! - Decisions are pure: request and response summaries in, `Decision` out
//! - Configuration and the compiled rewrite and device patterns are fixed at
//!   construction
//! - Only rendered pages from non-background requests are transformed

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use axum::http::header::{self, AsHeaderName};
use axum::http::{HeaderMap, Request, Response, StatusCode};
use regex::{Regex, RegexBuilder};
use tracing::debug;
use url::Url;

use crate::config::PipelineConfig;
use crate::pipeline::chain::TransformPlan;
use crate::pipeline::conditional::{self, Evaluation};
use crate::pipeline::negotiate::select_codec;
use crate::pipeline::rewrite::RewriteRules;
use crate::pipeline::PipelineError;
use crate::site::SiteSettings;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Response extension marking output of a page-rendering handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderedPage;

/// Response extension carrying the resource's last-modified instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceVersion(pub SystemTime);

/// What the pipeline needs to know about a request.
///
/// The middleware also places it in the request extensions so handlers can
/// read the per-request values.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    pub path: String,
    /// `scheme://authority` the client used, if known.
    pub origin: Option<String>,
    pub accept_encoding: Option<String>,
    pub if_none_match: Option<String>,
    pub user_agent: Option<String>,
    /// Script-initiated background call (partial page update, XHR).
    pub background: bool,
    /// User-Agent matched the configured device pattern.
    pub mobile: bool,
    /// Site root as seen by this client, e.g. `https://example.com/blog/`.
    pub absolute_root: Option<Url>,
}

impl RequestInfo {
    /// Header-derived values only; see [`PipelineController::request_info`].
    pub fn from_request<B>(request: &Request<B>) -> Self {
        let headers = request.headers();
        let uri = request.uri();

        let origin = match (uri.scheme_str(), uri.authority()) {
            (Some(scheme), Some(authority)) => Some(format!("{}://{}", scheme, authority)),
            _ => header_str(headers, header::HOST).map(|host| format!("http://{}", host)),
        };

        let background = headers.contains_key("x-microsoftajax")
            || header_str(headers, "x-requested-with")
                .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"));

        Self {
            path: uri.path().to_string(),
            origin,
            accept_encoding: header_str(headers, header::ACCEPT_ENCODING),
            if_none_match: header_str(headers, header::IF_NONE_MATCH),
            user_agent: header_str(headers, header::USER_AGENT),
            background,
            mobile: false,
            absolute_root: None,
        }
    }
}

/// What the pipeline needs to know about a response before its body is read.
#[derive(Debug, Clone)]
pub struct ResponseInfo {
    pub status: StatusCode,
    pub is_page: bool,
    pub version: Option<SystemTime>,
    pub already_encoded: bool,
}

impl ResponseInfo {
    pub fn from_response<B>(response: &Response<B>) -> Self {
        Self {
            status: response.status(),
            is_page: response.extensions().get::<RenderedPage>().is_some(),
            version: response.extensions().get::<ResourceVersion>().map(|v| v.0),
            already_encoded: response.headers().contains_key(header::CONTENT_ENCODING),
        }
    }
}

/// Action taken on a response.
#[derive(Debug, Clone)]
pub enum Action {
    /// Validator matched: respond 304 with no body.
    ShortCircuit,
    /// Install the transform chain around the body.
    Transform(TransformPlan),
    /// Let browsers cache the resource for this long.
    CacheResource(Duration),
    PassThrough,
}

impl Action {
    pub fn label(&self) -> &'static str {
        match self {
            Action::ShortCircuit => "not_modified",
            Action::Transform(_) => "transformed",
            Action::CacheResource(_) => "cached_resource",
            Action::PassThrough => "pass_through",
        }
    }
}

/// Outcome of the controller for one response.
#[derive(Debug, Clone)]
pub struct Decision {
    /// Validator headers to set, present whenever a version was known.
    pub validation: Option<Evaluation>,
    pub action: Action,
}

/// Decides caching, compression and rewriting for each response.
pub struct PipelineController {
    config: Arc<PipelineConfig>,
    site: SiteSettings,
    rules: RewriteRules,
    devices: Option<Regex>,
}

impl PipelineController {
    pub fn new(config: Arc<PipelineConfig>) -> Result<Self, PipelineError> {
        let site = SiteSettings::new(&config.site);
        let rules = RewriteRules::new(
            &config.rewrite.marker,
            site.relative_web_root(),
            &config.rewrite.proxy_route,
        )?;

        let pattern = config.site.mobile_devices.trim();
        let devices = if pattern.is_empty() {
            None
        } else {
            Some(RegexBuilder::new(pattern).case_insensitive(true).build()?)
        };

        Ok(Self {
            config,
            site,
            rules,
            devices,
        })
    }

    /// Summarize a request, adding the values that depend on configuration.
    pub fn request_info<B>(&self, request: &Request<B>) -> RequestInfo {
        let mut info = RequestInfo::from_request(request);
        info.mobile = info
            .user_agent
            .as_deref()
            .is_some_and(|agent| self.is_mobile(agent));
        info.absolute_root = info
            .origin
            .as_deref()
            .and_then(|origin| self.site.absolute_web_root(origin));
        info
    }

    /// Whether a User-Agent belongs to a mobile device.
    pub fn is_mobile(&self, user_agent: &str) -> bool {
        self.devices
            .as_ref()
            .is_some_and(|devices| devices.is_match(user_agent))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn site(&self) -> &SiteSettings {
        &self.site
    }

    /// Whether `path` targets the internal resource endpoint.
    pub fn is_resource_request(&self, path: &str) -> bool {
        let marker = self.config.rewrite.marker.trim();
        !marker.is_empty() && path.to_ascii_lowercase().contains(&marker.to_ascii_lowercase())
    }

    pub fn decide(&self, request: &RequestInfo, response: &ResponseInfo) -> Decision {
        let validation = response
            .version
            .filter(|_| response.status.is_success())
            .map(|modified| conditional::evaluate(modified, request.if_none_match.as_deref()));

        if validation.as_ref().is_some_and(|v| v.not_modified) {
            debug!(path = %request.path, "Validator matched, short-circuiting");
            return Decision {
                validation,
                action: Action::ShortCircuit,
            };
        }

        let action = self.proceed(request, response);
        debug!(path = %request.path, action = action.label(), "Pipeline decision");
        Decision { validation, action }
    }

    fn proceed(&self, request: &RequestInfo, response: &ResponseInfo) -> Action {
        let flags = &self.config.compression;

        if !response.is_page || request.background {
            if !flags.compress_web_resource && self.is_resource_request(&request.path) {
                let days = self.config.rewrite.resource_cache_days;
                return Action::CacheResource(Duration::from_secs(days * SECONDS_PER_DAY));
            }
            return Action::PassThrough;
        }

        if response.already_encoded {
            return Action::PassThrough;
        }

        let codec = select_codec(request.accept_encoding.as_deref(), flags.enable_http_compression);
        let rewrite = if flags.compress_web_resource {
            request
                .origin
                .as_deref()
                .and_then(|origin| self.rules.for_origin(origin))
        } else {
            None
        };

        let plan = TransformPlan { codec, rewrite };
        if plan.is_empty() {
            Action::PassThrough
        } else {
            Action::Transform(plan)
        }
    }
}

fn header_str<K: AsHeaderName>(headers: &HeaderMap, name: K) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
