//! Trait definitions for hardware abstraction, storage and networking.
//!
//! This module defines the core abstractions that allow camsnap to:
//! - Run on different hardware (ESP32, desktop mock)
//! - Persist images on different filesystems
//! - Serve responses through different HTTP stacks
//!
//! # Submodules
//!
//! - `hardware`: Camera device, framebuffers, capture configuration types
//! - `storage`: Single-image store
//! - `network`: WiFi driver, connection events, chunked responder
//!
//! # Hardware Abstraction
//!
//! - [`CameraDevice`]: Sensor with a fixed-size framebuffer pool
//! - [`FrameBuffer`]: One borrowed frame
//! - [`ImageStore`]: The "latest image" file
//! - [`WifiDriver`]: Station connect requests
//! - [`Responder`] / [`ChunkSink`]: Chunked HTTP response

pub mod hardware;
pub mod network;
pub mod storage;

pub use hardware::*;
pub use network::*;
pub use storage::*;
