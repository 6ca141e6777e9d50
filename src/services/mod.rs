//! Network services for desktop delivery.
//!
//! - `web` feature: Axum-based HTTP server exposing the snapshot route
//!
//! The server wraps the platform-agnostic
//! [`SnapshotService`](crate::delivery::SnapshotService) in an `Arc`, the
//! same way the ESP32 HTTP server does:
//!
//! ```ignore
//! use std::sync::Arc;
//! use camsnap::services::{build_router, WebServerConfig};
//!
//! let service = Arc::new(SnapshotService::new(camera, store, config.web.chunk_size));
//! let router = build_router(Arc::clone(&service), &WebServerConfig::from_config(&config));
//! ```

#[cfg(feature = "web")]
pub mod web;

#[cfg(feature = "web")]
pub use web::*;
