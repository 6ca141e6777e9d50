//! Error taxonomy for the capture-and-serve pipeline.
//!
//! | Error | Raised by | Handling |
//! |-------|-----------|----------|
//! | [`DeviceError`] | camera init, filesystem mount | retried at startup, then Degraded |
//! | [`CaptureError`] | [`CameraDevice::capture`] | request answered with 500 |
//! | [`StorageError`] | [`ImageStore`] | request answered with 500 |
//! | [`NetworkError`] | connection supervisor | terminal Failed state |
//!
//! [`CameraDevice::capture`]: crate::traits::CameraDevice::capture
//! [`ImageStore`]: crate::traits::ImageStore

use std::io;

use thiserror::Error;

/// Peripheral initialization or configuration failure.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The peripheral did not acknowledge its configuration.
    #[error("{component} init failed (code {code:#x})")]
    InitFailed {
        /// Which peripheral failed.
        component: &'static str,
        /// Driver error code (`esp_err_t` on ESP32).
        code: i32,
    },

    /// Startup retries for a component were used up.
    #[error("{component} still failing after {attempts} attempts: {last_error}")]
    GaveUp {
        /// Which peripheral failed.
        component: &'static str,
        /// Number of attempts made.
        attempts: u32,
        /// Display form of the last error seen.
        last_error: String,
    },
}

/// Failure to obtain a frame from the camera.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CaptureError {
    /// The driver timed out waiting for a frame.
    #[error("no frame available")]
    NoFrameAvailable,

    /// Every framebuffer in the pool is held by the caller.
    #[error("framebuffer pool exhausted ({in_use} of {capacity} in use)")]
    PoolExhausted {
        /// Buffers currently checked out.
        in_use: usize,
        /// Total pool size.
        capacity: usize,
    },
}

/// Failure to persist or read back the stored image.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The filesystem is not mounted.
    #[error("filesystem not mounted at {0}")]
    Unavailable(String),

    /// No space left for the image.
    #[error("filesystem full")]
    Full,

    /// The image file could not be opened.
    #[error("failed to open image file: {0}")]
    Open(#[source] io::Error),

    /// Writing or replacing the image file failed.
    #[error("failed to write image file: {0}")]
    Write(#[source] io::Error),

    /// The frame does not match its declared geometry.
    #[error("frame has {actual} bytes, expected {expected}")]
    InvalidFrame {
        /// Bytes implied by width, height and pixel format.
        expected: usize,
        /// Bytes the driver returned.
        actual: usize,
    },

    /// A frame labelled JPEG does not start with the SOI marker.
    #[error("frame labelled JPEG has no SOI marker")]
    NotJpeg,
}

impl StorageError {
    /// Classify a write-side I/O error, separating out a full filesystem.
    pub fn from_write(err: io::Error) -> Self {
        if is_no_space(&err) {
            StorageError::Full
        } else {
            StorageError::Write(err)
        }
    }
}

// ENOSPC is 28 on both Linux and newlib.
fn is_no_space(err: &io::Error) -> bool {
    err.raw_os_error() == Some(28)
}

/// WiFi station failure.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NetworkError {
    /// The retry policy gave up after repeated disconnects.
    #[error("gave up after {attempts} failed connection attempts")]
    RetriesExhausted {
        /// Consecutive failures counted.
        attempts: u32,
    },

    /// The WiFi driver rejected a request.
    #[error("wifi driver error: {0}")]
    Driver(String),

    /// The SSID does not fit the 802.11 limit.
    #[error("SSID is {len} bytes, at most {max} allowed")]
    SsidTooLong {
        /// Configured SSID length in bytes.
        len: usize,
        /// Longest accepted SSID.
        max: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enospc_maps_to_full() {
        let err = io::Error::from_raw_os_error(28);
        assert!(matches!(StorageError::from_write(err), StorageError::Full));
    }

    #[test]
    fn other_write_errors_are_kept() {
        let err = io::Error::new(io::ErrorKind::PermissionDenied, "ro");
        assert!(matches!(
            StorageError::from_write(err),
            StorageError::Write(_)
        ));
    }

    #[test]
    fn messages_name_the_component() {
        let err = DeviceError::InitFailed {
            component: "camera",
            code: 0x105,
        };
        assert_eq!(err.to_string(), "camera init failed (code 0x105)");
    }
}
