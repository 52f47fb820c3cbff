//! Response pipeline demo server.
//!
//! Serves a small page that references the internal resource endpoint, so
//! conditional GET, compression and reference rewriting can be observed with
//! any HTTP client:
//!
//! ```text
//! curl -si -H 'Accept-Encoding: gzip' http://localhost:8080/ | head
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use axum::{
    extract::{Extension, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};
use clap::Parser;
use tokio::net::TcpListener;

use response_pipeline::config::{load_config, PipelineConfig};
use response_pipeline::http::{HttpServer, Page, Versioned};
use response_pipeline::observability::{logging, metrics};
use response_pipeline::pipeline::RequestInfo;
use response_pipeline::site::SiteSettings;

#[derive(Parser)]
#[command(name = "response-pipeline")]
#[command(about = "Demo server for the outbound response pipeline", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[derive(Clone)]
struct DemoState {
    site: SiteSettings,
    published: SystemTime,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init(&config.observability.log_level);
    tracing::info!("response-pipeline v0.1.0 starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        compression = config.compression.enable_http_compression,
        rewrite = config.compression.compress_web_resource,
        virtual_path = %config.site.virtual_path,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let state = Arc::new(DemoState {
        site: SiteSettings::new(&config.site),
        published: SystemTime::now(),
    });
    let server = HttpServer::new(config, demo_app(state))?;
    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn demo_app(state: Arc<DemoState>) -> Router {
    let root = state.site.relative_web_root().to_string();
    let mut app = Router::new().route("/WebResource.axd", get(resource));
    app = if root == "/" {
        app.route("/", get(home))
    } else {
        app.route(&root, get(home))
            .route(&format!("{root}WebResource.axd"), get(resource))
    };
    app.with_state(state)
}

async fn home(
    State(state): State<Arc<DemoState>>,
    Extension(request): Extension<RequestInfo>,
) -> impl IntoResponse {
    let root = state.site.relative_web_root();
    let absolute = request.absolute_root.as_ref();
    let feed = absolute
        .map(|absolute| state.site.feed_url(absolute))
        .unwrap_or_default();
    let canonical = absolute
        .and_then(|absolute| state.site.convert_to_absolute(absolute, root))
        .map(|url| url.to_string())
        .unwrap_or_default();
    let device = if request.mobile { "mobile" } else { "desktop" };

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
<title>Response pipeline</title>
<link rel="canonical" href="{canonical}" />
<link rel="alternate" type="application/rss+xml" href="{feed}" />
<script src="{root}WebResource.axd?d=demo&amp;t=1" type="text/javascript"></script>
</head>
<body><p>Served through the response pipeline to a {device} client.</p></body>
</html>
"#
    );

    Versioned(state.published, Page(html))
}

async fn resource() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        "console.log('resource loaded');\n",
    )
}
