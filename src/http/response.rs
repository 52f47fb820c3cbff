//! Response helpers for handlers.
//!
//! Handlers opt into the pipeline by tagging their responses:
//! - [`Page`] marks rendered HTML, which may be compressed and rewritten
//! - [`Versioned`] attaches a last-modified instant for conditional GET

use std::time::SystemTime;

use axum::response::{Html, IntoResponse, Response};

use crate::pipeline::{RenderedPage, ResourceVersion};

/// Rendered HTML page.
#[derive(Debug, Clone)]
pub struct Page<T>(pub T);

impl<T> IntoResponse for Page<T>
where
    Html<T>: IntoResponse,
{
    fn into_response(self) -> Response {
        let mut response = Html(self.0).into_response();
        response.extensions_mut().insert(RenderedPage);
        response
    }
}

/// Any response plus the instant its content last changed.
#[derive(Debug, Clone)]
pub struct Versioned<R>(pub SystemTime, pub R);

impl<R: IntoResponse> IntoResponse for Versioned<R> {
    fn into_response(self) -> Response {
        let mut response = self.1.into_response();
        response.extensions_mut().insert(ResourceVersion(self.0));
        response
    }
}
