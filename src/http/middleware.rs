//! Pipeline middleware.
//!
//! Runs the controller once per response, after the handler has produced
//! headers and before any body byte is read, then applies the decision.
//! The request summary is handed to the handler as an extension.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, error};

use crate::http::body::transform_body;
use crate::observability::metrics;
use crate::pipeline::{
    Action, Decision, PipelineController, PipelineError, ResponseInfo, TransformChain,
};

/// Axum middleware entry point; mount with `from_fn_with_state`.
pub async fn response_pipeline(
    State(controller): State<Arc<PipelineController>>,
    mut request: Request,
    next: Next,
) -> Response {
    let info = controller.request_info(&request);
    request.extensions_mut().insert(info.clone());
    let response = next.run(request).await;

    let decision = controller.decide(&info, &ResponseInfo::from_response(&response));
    metrics::record_action(decision.action.label());

    match apply_decision(decision, response) {
        Ok(response) => response,
        Err(e) => {
            error!(path = %info.path, error = %e, "Failed to apply pipeline decision");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Rewrite response headers and body according to `decision`.
pub fn apply_decision(decision: Decision, response: Response) -> Result<Response, PipelineError> {
    let (mut parts, body) = response.into_parts();

    if let Some(validation) = &decision.validation {
        validation.apply_headers(&mut parts.headers)?;
    }

    let body = match decision.action {
        Action::PassThrough => body,
        Action::ShortCircuit => {
            parts.status = StatusCode::NOT_MODIFIED;
            parts.headers.remove(header::CONTENT_LENGTH);
            Body::empty()
        }
        Action::CacheResource(max_age) => {
            set_far_future_expiry(&mut parts.headers, max_age)?;
            body
        }
        Action::Transform(plan) => {
            debug!(stages = ?plan.stages(), "Installing transform chain");
            if let Some(encoding) = plan.codec.as_str() {
                parts
                    .headers
                    .insert(header::CONTENT_ENCODING, HeaderValue::from_static(encoding));
                parts
                    .headers
                    .append(header::VARY, HeaderValue::from_static("accept-encoding"));
            }
            parts.headers.remove(header::CONTENT_LENGTH);
            transform_body(body, TransformChain::install(plan, Vec::new()))
        }
    };

    Ok(Response::from_parts(parts, body))
}

fn set_far_future_expiry(
    headers: &mut axum::http::HeaderMap,
    max_age: Duration,
) -> Result<(), PipelineError> {
    let cache_control = HeaderValue::from_str(&format!("public, max-age={}", max_age.as_secs()))
        .map_err(|_| PipelineError::Header(header::CACHE_CONTROL))?;
    let expires = HeaderValue::from_str(&httpdate::fmt_http_date(SystemTime::now() + max_age))
        .map_err(|_| PipelineError::Header(header::EXPIRES))?;
    headers.insert(header::CACHE_CONTROL, cache_control);
    headers.insert(header::EXPIRES, expires);
    Ok(())
}
