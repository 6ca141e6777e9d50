//! HTTP server for ESP32 snapshot delivery.
//!
//! Registers a single GET route that runs
//! [`SnapshotService::serve`](crate::delivery::SnapshotService::serve) on
//! the server task. The body is written without a content length, so
//! esp-idf sends it with chunked transfer encoding and ends it with the
//! zero-length chunk when the handler returns.
//!
//! # Endpoints
//!
//! - `GET /image.jpg` - Capture, store and return a fresh image (path follows
//!   the configured file stem and pixel format)
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use camsnap::config::Config;
//! use camsnap::delivery::SnapshotService;
//! use camsnap::hal::esp32::Esp32HttpServer;
//!
//! let service = Arc::new(SnapshotService::new(camera, store, config.web.chunk_size));
//! let server = Esp32HttpServer::new(&config.web, &config.image_route(), service)?;
//! ```

use std::sync::Arc;

use esp_idf_hal::io::Write;
use esp_idf_svc::http::server::{Configuration, EspHttpConnection, EspHttpServer, Request, Response};
use esp_idf_svc::http::Method;
use esp_idf_svc::io::EspIOError;
use log::{debug, info};

use super::camera::Esp32Camera;
use crate::config::WebConfig;
use crate::delivery::SnapshotService;
use crate::persistence::FsImageStore;
use crate::traits::{ChunkSink, Responder};

/// Snapshot pipeline as wired on the device.
pub type EspSnapshotService = SnapshotService<Esp32Camera, FsImageStore>;

/// Running HTTP server. Stops when dropped.
pub struct Esp32HttpServer {
    _server: EspHttpServer<'static>,
}

impl Esp32HttpServer {
    /// Start the server and register the snapshot route.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP server fails to start or the handler
    /// cannot be registered.
    pub fn new(config: &WebConfig, route: &str, service: Arc<EspSnapshotService>) -> anyhow::Result<Self> {
        let server_config = Configuration {
            http_port: config.port,
            stack_size: config.stack_size,
            ..Default::default()
        };

        let mut server = EspHttpServer::new(&server_config)?;

        server.fn_handler(route, Method::Get, move |req| {
            debug!("[HTTP] GET {}", req.uri());
            let outcome = service.serve(req)?;
            debug!("[HTTP] {:?}", outcome);
            Ok::<_, EspIOError>(())
        })?;

        info!("[HTTP] Server started on port {}, serving {}", config.port, route);

        Ok(Self { _server: server })
    }
}

impl<'r, 'c> Responder for Request<&'r mut EspHttpConnection<'c>> {
    type Error = EspIOError;
    type Body = Response<&'r mut EspHttpConnection<'c>>;

    fn begin(self, status: u16, content_type: &str) -> Result<Self::Body, EspIOError> {
        self.into_response(status, None, &[("Content-Type", content_type)])
    }
}

impl ChunkSink for Response<&mut EspHttpConnection<'_>> {
    type Error = EspIOError;

    fn send_chunk(&mut self, chunk: &[u8]) -> Result<(), EspIOError> {
        self.write_all(chunk)
    }

    fn finish(mut self) -> Result<(), EspIOError> {
        // Terminating chunk goes out when the connection completes
        self.flush()
    }
}
