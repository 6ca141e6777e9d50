//! Axum-based HTTP server for snapshot delivery on desktop.
//!
//! Serves the same single route as the ESP32 server:
//! - GET `/image.jpg` - Capture, store and stream a fresh image (path follows
//!   the configured file stem and pixel format)
//!
//! [`SnapshotService::serve`] is blocking, so each request runs it on the
//! blocking pool. Its [`Responder`] is a pair of channels: a oneshot for
//! the status line and a bounded mpsc for body chunks, which becomes the
//! streamed response body.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use bytes::Bytes;
use log::{error, info};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::delivery::SnapshotService;
use crate::traits::{CameraDevice, ChunkSink, ImageStore, Responder};

/// Body chunks buffered between the blocking worker and the socket.
const BODY_CHANNEL_DEPTH: usize = 4;

type BodyItem = Result<Bytes, io::Error>;

// ============================================================================
// Channel Responder
// ============================================================================

/// [`Responder`] that hands the response to an async task.
pub struct ChannelResponder {
    head: oneshot::Sender<(u16, String)>,
    body: mpsc::Sender<BodyItem>,
}

/// Body half of a [`ChannelResponder`].
pub struct ChannelBody {
    body: mpsc::Sender<BodyItem>,
}

/// Receiving ends of a [`ChannelResponder`].
pub struct ChannelReceivers {
    /// Status and content type, sent once by `begin`
    pub head: oneshot::Receiver<(u16, String)>,
    /// Body chunks; closed by `finish`
    pub body: mpsc::Receiver<BodyItem>,
}

impl ChannelResponder {
    /// Create a responder and the receivers for its head and body.
    pub fn new() -> (Self, ChannelReceivers) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::channel(BODY_CHANNEL_DEPTH);
        (
            Self {
                head: head_tx,
                body: body_tx,
            },
            ChannelReceivers {
                head: head_rx,
                body: body_rx,
            },
        )
    }
}

fn client_gone() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected")
}

impl Responder for ChannelResponder {
    type Error = io::Error;
    type Body = ChannelBody;

    fn begin(self, status: u16, content_type: &str) -> Result<ChannelBody, io::Error> {
        self.head
            .send((status, content_type.to_string()))
            .map_err(|_| client_gone())?;
        Ok(ChannelBody { body: self.body })
    }
}

impl ChunkSink for ChannelBody {
    type Error = io::Error;

    fn send_chunk(&mut self, chunk: &[u8]) -> Result<(), io::Error> {
        self.body
            .blocking_send(Ok(Bytes::copy_from_slice(chunk)))
            .map_err(|_| client_gone())
    }

    fn finish(self) -> Result<(), io::Error> {
        // Dropping the sender ends the stream
        Ok(())
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

/// GET /image.<ext> - Capture and stream a fresh image
async fn snapshot<C, S>(State(service): State<Arc<SnapshotService<C, S>>>) -> Response
where
    C: CameraDevice + Send + 'static,
    S: ImageStore + Send + 'static,
{
    let (responder, receivers) = ChannelResponder::new();
    let worker = tokio::task::spawn_blocking(move || service.serve(responder));

    match receivers.head.await {
        Ok((status, content_type)) => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (
                status,
                [(CONTENT_TYPE, content_type)],
                Body::from_stream(ReceiverStream::new(receivers.body)),
            )
                .into_response()
        }
        Err(_) => {
            // Worker ended without starting a response
            match worker.await {
                Ok(Err(e)) => error!("Snapshot handler failed: {}", e),
                Err(e) => error!("Snapshot worker panicked: {}", e),
                Ok(Ok(outcome)) => error!("Snapshot finished without a response: {:?}", outcome),
            }
            (StatusCode::INTERNAL_SERVER_ERROR, "Snapshot failed").into_response()
        }
    }
}

/// Fallback handler for 404
async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not found")
}

// ============================================================================
// Server Builder
// ============================================================================

/// Configuration for the web server
#[derive(Debug, Clone)]
pub struct WebServerConfig {
    /// Address to bind to
    pub addr: SocketAddr,
    /// Route serving the image
    pub route: String,
    /// Whether to enable CORS for all origins
    pub cors_permissive: bool,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self::from_config(&Config::default().with_web(crate::config::WebConfig::default().with_port(8080)))
    }
}

impl WebServerConfig {
    /// Create a new config with the given address
    pub fn new(addr: impl Into<SocketAddr>) -> Self {
        Self {
            addr: addr.into(),
            ..Default::default()
        }
    }

    /// Set the image route
    pub fn route(mut self, route: &str) -> Self {
        self.route = route.to_string();
        self
    }

    /// Set whether CORS should be permissive
    pub fn cors(mut self, permissive: bool) -> Self {
        self.cors_permissive = permissive;
        self
    }

    /// Create from the shared Config
    pub fn from_config(config: &Config) -> Self {
        Self {
            addr: ([0, 0, 0, 0], config.web.port).into(),
            route: config.image_route().to_string(),
            cors_permissive: config.web.cors_permissive,
        }
    }
}

/// Build the Axum router with the snapshot route
pub fn build_router<C, S>(service: Arc<SnapshotService<C, S>>, config: &WebServerConfig) -> Router
where
    C: CameraDevice + Send + 'static,
    S: ImageStore + Send + 'static,
{
    let mut router = Router::new()
        .route(&config.route, get(snapshot::<C, S>))
        .fallback(not_found)
        .with_state(service);

    // Add CORS if requested
    if config.cors_permissive {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router
}

/// Start the web server
///
/// This function blocks until the server is shut down.
pub async fn run_server<C, S>(
    service: Arc<SnapshotService<C, S>>,
    config: WebServerConfig,
) -> Result<(), std::io::Error>
where
    C: CameraDevice + Send + 'static,
    S: ImageStore + Send + 'static,
{
    let router = build_router(service, &config);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!("Web server listening on http://{}{}", config.addr, config.route);

    axum::serve(listener, router).await
}
