//! Shared utilities for integration tests.

use std::io::Read;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime};

use axum::{
    body::Body,
    extract::Extension,
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use bytes::Bytes;
use flate2::read::{GzDecoder, ZlibDecoder};
use futures_util::stream;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use response_pipeline::config::PipelineConfig;
use response_pipeline::http::{HttpServer, Page, Versioned};
use response_pipeline::pipeline::{RenderedPage, RequestInfo};

/// Fixed modification instant of the test pages.
#[allow(dead_code)]
pub fn published() -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(1_445_412_480)
}

pub const SCRIPT_SRC: &str = "/WebResource.axd?d=abc";

/// Application used by the integration tests.
pub fn test_app() -> Router {
    Router::new()
        .route("/", get(home))
        .route("/split", get(split_page))
        .route("/large", get(large_page))
        .route("/WebResource.axd", get(resource))
        .route("/api/status", get(|| async { "ok" }))
        .route("/device", get(device))
}

/// Reports what the pipeline learned about the client.
async fn device(Extension(request): Extension<RequestInfo>) -> String {
    let kind = if request.mobile { "mobile" } else { "desktop" };
    match request.absolute_root {
        Some(root) => format!("{kind} {root}"),
        None => kind.to_string(),
    }
}

async fn home() -> impl IntoResponse {
    let html = format!(
        r#"<html><head><script src="{SCRIPT_SRC}" type="text/javascript"></script></head><body><p>{SCRIPT_SRC}</p></body></html>"#
    );
    Versioned(published(), Page(html))
}

/// Page whose script tag arrives split over several body chunks.
async fn split_page() -> Response {
    let chunks: Vec<Result<Bytes, std::io::Error>> = [
        "<html><head><script src=\"/WebRes",
        "ource.axd?d=split\" type=\"text/javascript\"></scr",
        "ipt></head></html>",
    ]
    .into_iter()
    .map(|chunk| Ok(Bytes::from_static(chunk.as_bytes())))
    .collect();

    let mut response = Response::new(Body::from_stream(stream::iter(chunks)));
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, "text/html".parse().unwrap());
    response.extensions_mut().insert(RenderedPage);
    response
}

async fn large_page() -> impl IntoResponse {
    Page(large_html())
}

async fn resource() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/javascript")], "var loaded = true;")
}

#[allow(dead_code)]
pub fn large_html() -> String {
    let mut html = String::from("<html><body>");
    for i in 0..4_000 {
        html.push_str(&format!("<p>Paragraph {i}: the quick brown fox.</p>\n"));
    }
    html.push_str("</body></html>");
    html
}

/// Start a server on an ephemeral port. Drop or send on the returned sender
/// to stop it.
#[allow(dead_code)]
pub async fn start_server(config: PipelineConfig) -> (SocketAddr, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();

    let server = HttpServer::new(config, test_app()).unwrap();
    tokio::spawn(async move {
        let _ = server
            .run_until(listener, async move {
                let _ = rx.await;
            })
            .await;
    });

    (addr, tx)
}

#[allow(dead_code)]
pub fn gunzip(bytes: &[u8]) -> String {
    let mut out = String::new();
    GzDecoder::new(bytes).read_to_string(&mut out).unwrap();
    out
}

#[allow(dead_code)]
pub fn inflate(bytes: &[u8]) -> String {
    let mut out = String::new();
    ZlibDecoder::new(bytes).read_to_string(&mut out).unwrap();
    out
}

/// Proxy route a script reference on `origin` is rewritten to.
#[allow(dead_code)]
pub fn proxied(origin: &str, src: &str) -> String {
    format!(
        "/resource-proxy?path={}",
        urlencoding::encode(&format!("{origin}{src}"))
    )
}
