//! # camsnap
//!
//! On-demand camera snapshots served over WiFi from an ESP32 camera board.
//!
//! ## Features
//!
//! - **Hardware abstraction**: Traits for the camera, the image store and the WiFi driver
//! - **Fresh capture per request**: Every GET triggers a physical capture, no caching
//! - **Viewable files**: JPEG as-is, grayscale as PGM, RGB565 as BMP
//! - **Event-driven WiFi**: Connection events feed a state machine with bounded retry
//! - **Scoped framebuffers**: Frames return to the driver pool on every path
//!
//! ## Architecture
//!
//! The crate is structured to allow testing on desktop without hardware:
//!
//! - `traits` - Camera, storage and network abstractions
//! - `capture` - Releasing framebuffer guard
//! - `persistence` - Frame encoding and the single-file image store
//! - `network` - Connection state machine and supervisor
//! - `delivery` - The snapshot request pipeline
//! - `startup` - Retried bring-up and device health
//! - `hal` - Concrete implementations (mock for testing, esp32 for hardware)
//!
//! ## Example
//!
//! ```rust
//! use camsnap::{
//!     SnapshotService, ServeOutcome,
//!     hal::{MemoryImageStore, MockCamera, MockResponder},
//!     traits::{FrameSize, PixelFormat},
//! };
//!
//! // Wire a mock camera to an in-memory store
//! let camera = MockCamera::new(PixelFormat::Jpeg, FrameSize::Qvga);
//! let service = SnapshotService::new(camera, MemoryImageStore::new(), 1024);
//!
//! // Handle one request
//! let mut responder = MockResponder::new();
//! let outcome = service.serve(&mut responder).unwrap();
//!
//! assert!(matches!(outcome, ServeOutcome::Served { .. }));
//! assert_eq!(responder.content_type(), Some("image/jpeg"));
//! ```

#![warn(missing_docs)]

/// Scoped framebuffer acquisition.
pub mod capture;
/// Shared configuration system for desktop and ESP32.
pub mod config;
/// Platform-agnostic snapshot request handler.
pub mod delivery;
/// Error types for each pipeline stage.
pub mod error;
/// Hardware abstraction layer with mock implementations for testing.
pub mod hal;
/// WiFi connection state machine and supervisor.
pub mod network;
/// Frame encoding and image file storage.
pub mod persistence;
/// Startup bring-up with retries and health reporting.
pub mod startup;
/// Core traits for camera, storage and network abstraction.
pub mod traits;

/// Network services for desktop HTTP delivery (feature-gated).
#[cfg(feature = "web")]
pub mod services;

// Re-exports for convenience
pub use capture::{capture, CapturedFrame};
pub use delivery::{ServeOutcome, SnapshotService};
pub use error::{CaptureError, DeviceError, NetworkError, StorageError};
pub use network::{
    ConnectionManager, ConnectionState, ConnectionSupervisor, NetAction, NetworkMonitor,
    NetworkSnapshot,
};
pub use persistence::{store_frame, FsImageStore, StoredImage};
pub use startup::{bring_up, Health, HealthMonitor};
pub use traits::{
    // Hardware
    CameraDevice,
    FrameBuffer,
    FrameBufferLocation,
    FrameSize,
    GrabMode,
    PixelFormat,
    // Storage
    ImageStore,
    // Network
    ChunkSink,
    NetEvent,
    Responder,
    WifiDriver,
};

// Config re-exports
pub use config::{
    CameraConfig, CameraPins, Config, ReplaceStrategy, RetryPolicy, StorageConfig, WebConfig,
    WifiConfig,
};
