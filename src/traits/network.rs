//! Network abstraction traits for WiFi bring-up and HTTP delivery.
//!
//! # Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`WifiDriver`] | Issues station connect requests |
//! | [`Responder`] | Starts an HTTP response with a status and content type |
//! | [`ChunkSink`] | Streams the response body in chunks |
//!
//! # Connection Events
//!
//! The driver reports progress asynchronously. Platform glue translates its
//! callbacks into [`NetEvent`]s and sends them down a channel; the
//! [`ConnectionSupervisor`](crate::network::ConnectionSupervisor) consumes
//! them on its own thread and calls back into the [`WifiDriver`]:
//!
//! ```text
//! event loop ──NetEvent──▶ channel ──▶ ConnectionSupervisor ──connect()──▶ WifiDriver
//! ```
//!
//! # Chunked Responses
//!
//! The snapshot route streams the stored file without knowing its length up
//! front:
//!
//! ```text
//! responder.begin(200, "image/jpeg") ─▶ sink.send_chunk(..) × N ─▶ sink.finish()
//! ```
//!
//! `finish` ends the body, which for HTTP/1.1 chunked encoding means the
//! zero-length terminating chunk.

use std::net::Ipv4Addr;

use crate::error::NetworkError;

/// Station-mode WiFi driver.
///
/// Only the operation the supervisor needs. Starting the driver and wiring
/// its event callbacks is platform glue.
pub trait WifiDriver {
    /// Begin an association attempt (non-blocking).
    ///
    /// Success or failure is reported later as a [`NetEvent`].
    fn connect(&mut self) -> Result<(), NetworkError>;
}

/// Connection event delivered by the WiFi stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetEvent {
    /// Station interface started.
    StaStarted,
    /// Association lost or failed (any reason).
    StaDisconnected,
    /// DHCP assigned an address.
    GotIp(Ipv4Addr),
    /// The DHCP lease was lost.
    LostIp,
}

/// Start of an HTTP response.
///
/// Consumed by [`begin`](Self::begin), which mirrors request/response
/// frameworks where the request turns into the response.
pub trait Responder {
    /// Transport error type.
    type Error;

    /// Body writer returned once headers are committed.
    type Body: ChunkSink<Error = Self::Error>;

    /// Commit the status line and content type.
    fn begin(self, status: u16, content_type: &str) -> Result<Self::Body, Self::Error>;
}

/// Body half of a chunked HTTP response.
pub trait ChunkSink {
    /// Transport error type.
    type Error;

    /// Send one body chunk.
    fn send_chunk(&mut self, chunk: &[u8]) -> Result<(), Self::Error>;

    /// End the body.
    fn finish(self) -> Result<(), Self::Error>;
}

/// Send a short plain-text response.
///
/// Used for the 404 and 500 paths of the snapshot route.
pub fn respond_text<R: Responder>(responder: R, status: u16, message: &str) -> Result<(), R::Error> {
    let mut body = responder.begin(status, "text/plain")?;
    body.send_chunk(message.as_bytes())?;
    body.finish()
}
