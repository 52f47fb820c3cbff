//! Conditional GET support.
//!
//! The validator is the modification instant expressed in 100 ns ticks since
//! the Unix epoch, quoted. It is compared to `If-None-Match` as an opaque
//! string: no trimming, no weak comparison, no date parsing.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::{header, HeaderMap, HeaderValue};

use crate::pipeline::PipelineError;

const NANOS_PER_TICK: i128 = 100;

/// Outcome of evaluating a conditional request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub validator: String,
    pub last_modified: SystemTime,
    pub not_modified: bool,
}

impl Evaluation {
    /// Write `ETag` and `Last-Modified`. Applies to 200 and 304 alike.
    pub fn apply_headers(&self, headers: &mut HeaderMap) -> Result<(), PipelineError> {
        let etag = HeaderValue::from_str(&self.validator)
            .map_err(|_| PipelineError::Header(header::ETAG))?;
        let last_modified = HeaderValue::from_str(&httpdate::fmt_http_date(self.last_modified))
            .map_err(|_| PipelineError::Header(header::LAST_MODIFIED))?;
        headers.insert(header::ETAG, etag);
        headers.insert(header::LAST_MODIFIED, last_modified);
        Ok(())
    }
}

/// Compute the validator for a modification instant.
pub fn validator(last_modified: SystemTime) -> String {
    let nanos = match last_modified.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_nanos() as i128,
        Err(before) => -(before.duration().as_nanos() as i128),
    };
    // Floor division keeps every tick exactly one tick wide around the epoch.
    let ticks = nanos.div_euclid(NANOS_PER_TICK);
    format!("\"{}\"", ticks)
}

/// Compare the incoming `If-None-Match` value with the resource's validator.
pub fn evaluate(last_modified: SystemTime, incoming: Option<&str>) -> Evaluation {
    let validator = validator(last_modified);
    let not_modified = incoming.is_some_and(|tag| tag == validator);
    Evaluation {
        validator,
        last_modified,
        not_modified,
    }
}
