//! ESP32-CAM hardware abstraction layer for on-demand snapshots.
//!
//! This module provides hardware implementations for an ESP32 camera board
//! (WROVER class, external PSRAM) with a parallel-bus OV2640 sensor.
//!
//! # Hardware Configuration
//!
//! - **MCU**: ESP32 (Xtensa dual core 240MHz, 4MB Flash, 4MB PSRAM)
//! - **Sensor**: OV2640 on the DVP bus, SCCB for configuration
//! - **Storage**: SPIFFS partition mounted through the VFS
//!
//! # Pin Assignments
//!
//! GPIO assignments live in [`CameraPins`](crate::config::CameraPins); its
//! default is the ESP32-CAM wiring.

mod camera;
mod memory;
mod storage;

pub use camera::{Esp32Camera, Esp32Frame};
pub use memory::{log_psram, psram_free_bytes};
pub use storage::Esp32Spiffs;

#[cfg(feature = "wifi")]
mod wifi;
#[cfg(feature = "wifi")]
pub use wifi::Esp32Wifi;

#[cfg(feature = "esp32-http")]
mod http;
#[cfg(feature = "esp32-http")]
pub use http::{Esp32HttpServer, EspSnapshotService};
