//! Camera abstraction traits and the fixed capture configuration types.
//!
//! # Key Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`CameraDevice`] | Owns the sensor and its framebuffer pool |
//! | [`FrameBuffer`] | One captured frame, borrowed from the pool |
//!
//! # Buffer Ownership
//!
//! The driver's pool holds `fb_count` buffers. Every frame returned by
//! [`CameraDevice::capture`] must go back through [`CameraDevice::release`],
//! or capture stalls once the pool is empty. Use [`crate::capture::capture`],
//! which returns a guard that releases on drop.
//!
//! # Example
//!
//! ```rust
//! use camsnap::hal::MockCamera;
//! use camsnap::traits::{CameraDevice, FrameBuffer, FrameSize, PixelFormat};
//!
//! let mut camera = MockCamera::new(PixelFormat::Grayscale, FrameSize::R96x96);
//! let frame = camera.capture().unwrap();
//! assert_eq!(frame.len(), 96 * 96);
//! camera.release(frame);
//! assert_eq!(camera.free_buffers(), 1);
//! ```

use crate::error::CaptureError;

/// Pixel format the sensor is configured to produce.
///
/// Each format maps to one stored file type:
///
/// | Format | File | Content-Type |
/// |--------|------|--------------|
/// | `Jpeg` | `.jpg` | `image/jpeg` |
/// | `Grayscale` | `.pgm` | `image/x-portable-graymap` |
/// | `Rgb565` | `.bmp` | `image/bmp` |
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PixelFormat {
    /// Sensor-side JPEG compression.
    #[default]
    Jpeg,
    /// 8-bit luminance.
    Grayscale,
    /// 16-bit RGB, big-endian byte order from the sensor.
    Rgb565,
}

impl PixelFormat {
    /// Bytes per pixel for raw formats, `None` for compressed ones.
    #[inline]
    pub const fn bytes_per_pixel(&self) -> Option<usize> {
        match self {
            PixelFormat::Jpeg => None,
            PixelFormat::Grayscale => Some(1),
            PixelFormat::Rgb565 => Some(2),
        }
    }

    /// Extension of the stored image file.
    #[inline]
    pub const fn file_extension(&self) -> &'static str {
        match self {
            PixelFormat::Jpeg => "jpg",
            PixelFormat::Grayscale => "pgm",
            PixelFormat::Rgb565 => "bmp",
        }
    }

    /// HTTP content type of the stored image file.
    #[inline]
    pub const fn content_type(&self) -> &'static str {
        match self {
            PixelFormat::Jpeg => "image/jpeg",
            PixelFormat::Grayscale => "image/x-portable-graymap",
            PixelFormat::Rgb565 => "image/bmp",
        }
    }
}

/// Sensor output resolution.
///
/// Named after the esp32-camera `framesize_t` values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FrameSize {
    /// 96x96
    R96x96,
    /// 160x120
    Qqvga,
    /// 176x144
    Qcif,
    /// 240x176
    Hqvga,
    /// 240x240
    R240x240,
    /// 320x240
    #[default]
    Qvga,
    /// 400x296
    Cif,
    /// 480x320
    Hvga,
    /// 640x480
    Vga,
    /// 800x600
    Svga,
    /// 1024x768
    Xga,
    /// 1280x720
    Hd,
    /// 1280x1024
    Sxga,
    /// 1600x1200
    Uxga,
}

impl FrameSize {
    /// Width and height in pixels.
    pub const fn dimensions(&self) -> (u16, u16) {
        match self {
            FrameSize::R96x96 => (96, 96),
            FrameSize::Qqvga => (160, 120),
            FrameSize::Qcif => (176, 144),
            FrameSize::Hqvga => (240, 176),
            FrameSize::R240x240 => (240, 240),
            FrameSize::Qvga => (320, 240),
            FrameSize::Cif => (400, 296),
            FrameSize::Hvga => (480, 320),
            FrameSize::Vga => (640, 480),
            FrameSize::Svga => (800, 600),
            FrameSize::Xga => (1024, 768),
            FrameSize::Hd => (1280, 720),
            FrameSize::Sxga => (1280, 1024),
            FrameSize::Uxga => (1600, 1200),
        }
    }

    /// Pixel count.
    pub const fn pixels(&self) -> usize {
        let (w, h) = self.dimensions();
        w as usize * h as usize
    }
}

/// Where the driver allocates framebuffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FrameBufferLocation {
    /// External PSRAM (needed for anything above QQVGA).
    #[default]
    Psram,
    /// Internal DRAM.
    Dram,
}

/// When the driver fills a framebuffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GrabMode {
    /// Fill only when a buffer is free (may return a stale frame).
    #[default]
    WhenEmpty,
    /// Keep overwriting so `capture` returns the newest frame.
    Latest,
}

/// A captured frame, still owned by the driver's pool.
pub trait FrameBuffer {
    /// Raw frame bytes as produced by the sensor.
    fn data(&self) -> &[u8];

    /// Frame width in pixels.
    fn width(&self) -> u16;

    /// Frame height in pixels.
    fn height(&self) -> u16;

    /// Format of [`data`](Self::data).
    fn format(&self) -> PixelFormat;

    /// Length of the frame in bytes.
    fn len(&self) -> usize {
        self.data().len()
    }

    /// True for a zero-length frame.
    fn is_empty(&self) -> bool {
        self.data().is_empty()
    }
}

/// Camera peripheral with a fixed configuration and a framebuffer pool.
///
/// Initialization is implementation-specific (the ESP32 driver takes its
/// whole configuration in the constructor), so the trait covers only the
/// capture/release contract.
///
/// # Implementation Notes
///
/// - `capture` blocks until a frame is ready or a bounded timeout passes
/// - A frame must be handed back through `release` exactly once
/// - `capture` must not consume a pool slot when it fails
pub trait CameraDevice {
    /// Frame handle type.
    type Frame: FrameBuffer;

    /// Take one frame from the pool.
    fn capture(&mut self) -> Result<Self::Frame, CaptureError>;

    /// Return a frame to the pool.
    fn release(&mut self, frame: Self::Frame);

    /// Number of framebuffers the driver was configured with.
    fn pool_size(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_format_default_is_jpeg() {
        assert_eq!(PixelFormat::default(), PixelFormat::Jpeg);
    }

    #[test]
    fn pixel_format_file_metadata() {
        assert_eq!(PixelFormat::Jpeg.file_extension(), "jpg");
        assert_eq!(PixelFormat::Grayscale.file_extension(), "pgm");
        assert_eq!(PixelFormat::Rgb565.file_extension(), "bmp");
        assert_eq!(PixelFormat::Jpeg.content_type(), "image/jpeg");
        assert_eq!(PixelFormat::Rgb565.content_type(), "image/bmp");
    }

    #[test]
    fn bytes_per_pixel_only_for_raw_formats() {
        assert_eq!(PixelFormat::Jpeg.bytes_per_pixel(), None);
        assert_eq!(PixelFormat::Grayscale.bytes_per_pixel(), Some(1));
        assert_eq!(PixelFormat::Rgb565.bytes_per_pixel(), Some(2));
    }

    #[test]
    fn frame_size_dimensions() {
        assert_eq!(FrameSize::R96x96.dimensions(), (96, 96));
        assert_eq!(FrameSize::Qvga.dimensions(), (320, 240));
        assert_eq!(FrameSize::Uxga.dimensions(), (1600, 1200));
        assert_eq!(FrameSize::R96x96.pixels(), 9216);
    }

    struct SliceFrame(&'static [u8]);

    impl FrameBuffer for SliceFrame {
        fn data(&self) -> &[u8] {
            self.0
        }
        fn width(&self) -> u16 {
            self.0.len() as u16
        }
        fn height(&self) -> u16 {
            1
        }
        fn format(&self) -> PixelFormat {
            PixelFormat::Grayscale
        }
    }

    #[test]
    fn frame_buffer_len_default_impl() {
        let frame = SliceFrame(&[1, 2, 3]);
        assert_eq!(frame.len(), 3);
        assert!(!frame.is_empty());
        assert!(SliceFrame(&[]).is_empty());
    }
}
