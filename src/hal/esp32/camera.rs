//! OV2640 camera driver via the esp32-camera component.
//!
//! The whole [`CameraConfig`] is applied in [`Esp32Camera::new`]. The driver
//! keeps `fb_count` framebuffers; [`Esp32Frame`] is a handle to one of them
//! and must go back through `release` (see [`crate::capture::capture`]).
//!
//! # Example
//!
//! ```ignore
//! use camsnap::capture::capture;
//! use camsnap::config::CameraConfig;
//! use camsnap::hal::esp32::Esp32Camera;
//!
//! let mut camera = Esp32Camera::new(&CameraConfig::default())?;
//! let frame = capture(&mut camera)?;
//! log::info!("{}x{} frame, {} bytes", frame.width(), frame.height(), frame.len());
//! ```

use core::ptr::NonNull;

use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::{AnyOutputPin, Output, PinDriver};
use esp_idf_sys::camera;
use esp_idf_sys::{ledc_channel_t_LEDC_CHANNEL_0, ledc_timer_t_LEDC_TIMER_0, ESP_OK};
use log::{info, warn};

use super::memory::psram_free_bytes;
use crate::config::CameraConfig;
use crate::error::{CaptureError, DeviceError};
use crate::traits::{CameraDevice, FrameBuffer, FrameBufferLocation, FrameSize, GrabMode, PixelFormat};

/// Camera peripheral, deinitialized on drop.
pub struct Esp32Camera {
    fb_count: usize,
    pixel_format: PixelFormat,
    _power: Option<PinDriver<'static, AnyOutputPin, Output>>,
}

/// Handle to a driver-owned framebuffer.
pub struct Esp32Frame {
    fb: NonNull<camera::camera_fb_t>,
    configured: PixelFormat,
}

impl Esp32Camera {
    /// Power up the sensor and initialize the driver.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::InitFailed`] with the `esp_err_t` from
    /// `esp_camera_init` or from the power pin setup.
    pub fn new(config: &CameraConfig) -> Result<Self, DeviceError> {
        let power = power_up(config)?;

        if config.fb_location == FrameBufferLocation::Psram && psram_free_bytes() == 0 {
            warn!("Framebuffers placed in PSRAM but no PSRAM found");
        }

        let driver_config = driver_config(config);
        // SAFETY: config is fully initialized and outlives the call
        let err = unsafe { camera::esp_camera_init(&driver_config) };
        if err != ESP_OK as i32 {
            return Err(DeviceError::InitFailed {
                component: "camera",
                code: err,
            });
        }

        let (w, h) = config.frame_size.dimensions();
        info!(
            "Camera ready: {}x{} {:?}, {} framebuffer(s)",
            w, h, config.pixel_format, config.fb_count
        );

        Ok(Self {
            fb_count: usize::from(config.fb_count),
            pixel_format: config.pixel_format,
            _power: power,
        })
    }
}

fn power_up(config: &CameraConfig) -> Result<Option<PinDriver<'static, AnyOutputPin, Output>>, DeviceError> {
    if !config.pins.has_power_pin() {
        return Ok(None);
    }

    let gpio_err = |e: esp_idf_sys::EspError| DeviceError::InitFailed {
        component: "camera power pin",
        code: e.code(),
    };

    // SAFETY: the pin number comes from the board map and is not claimed elsewhere
    let pin = unsafe { AnyOutputPin::new(config.pins.power) };
    let mut driver = PinDriver::output(pin).map_err(gpio_err)?;
    driver.set_high().map_err(gpio_err)?;
    FreeRtos::delay_ms(config.power_up_delay_ms);
    Ok(Some(driver))
}

fn driver_config(config: &CameraConfig) -> camera::camera_config_t {
    let pins = &config.pins;
    camera::camera_config_t {
        pin_pwdn: pins.pwdn,
        pin_reset: pins.reset,
        pin_xclk: pins.xclk,
        __bindgen_anon_1: camera::camera_config_t__bindgen_ty_1 {
            pin_sccb_sda: pins.sccb_sda,
        },
        __bindgen_anon_2: camera::camera_config_t__bindgen_ty_2 {
            pin_sccb_scl: pins.sccb_scl,
        },
        pin_d0: pins.data[0],
        pin_d1: pins.data[1],
        pin_d2: pins.data[2],
        pin_d3: pins.data[3],
        pin_d4: pins.data[4],
        pin_d5: pins.data[5],
        pin_d6: pins.data[6],
        pin_d7: pins.data[7],
        pin_vsync: pins.vsync,
        pin_href: pins.href,
        pin_pclk: pins.pclk,
        xclk_freq_hz: config.xclk_freq_hz as i32,
        ledc_timer: ledc_timer_t_LEDC_TIMER_0,
        ledc_channel: ledc_channel_t_LEDC_CHANNEL_0,
        pixel_format: pixformat(config.pixel_format),
        frame_size: framesize(config.frame_size),
        jpeg_quality: i32::from(config.jpeg_quality),
        fb_count: usize::from(config.fb_count),
        fb_location: match config.fb_location {
            FrameBufferLocation::Psram => camera::camera_fb_location_t_CAMERA_FB_IN_PSRAM,
            FrameBufferLocation::Dram => camera::camera_fb_location_t_CAMERA_FB_IN_DRAM,
        },
        grab_mode: match config.grab_mode {
            GrabMode::WhenEmpty => camera::camera_grab_mode_t_CAMERA_GRAB_WHEN_EMPTY,
            GrabMode::Latest => camera::camera_grab_mode_t_CAMERA_GRAB_LATEST,
        },
        ..Default::default()
    }
}

fn pixformat(format: PixelFormat) -> camera::pixformat_t {
    match format {
        PixelFormat::Jpeg => camera::pixformat_t_PIXFORMAT_JPEG,
        PixelFormat::Grayscale => camera::pixformat_t_PIXFORMAT_GRAYSCALE,
        PixelFormat::Rgb565 => camera::pixformat_t_PIXFORMAT_RGB565,
    }
}

fn framesize(size: FrameSize) -> camera::framesize_t {
    match size {
        FrameSize::R96x96 => camera::framesize_t_FRAMESIZE_96X96,
        FrameSize::Qqvga => camera::framesize_t_FRAMESIZE_QQVGA,
        FrameSize::Qcif => camera::framesize_t_FRAMESIZE_QCIF,
        FrameSize::Hqvga => camera::framesize_t_FRAMESIZE_HQVGA,
        FrameSize::R240x240 => camera::framesize_t_FRAMESIZE_240X240,
        FrameSize::Qvga => camera::framesize_t_FRAMESIZE_QVGA,
        FrameSize::Cif => camera::framesize_t_FRAMESIZE_CIF,
        FrameSize::Hvga => camera::framesize_t_FRAMESIZE_HVGA,
        FrameSize::Vga => camera::framesize_t_FRAMESIZE_VGA,
        FrameSize::Svga => camera::framesize_t_FRAMESIZE_SVGA,
        FrameSize::Xga => camera::framesize_t_FRAMESIZE_XGA,
        FrameSize::Hd => camera::framesize_t_FRAMESIZE_HD,
        FrameSize::Sxga => camera::framesize_t_FRAMESIZE_SXGA,
        FrameSize::Uxga => camera::framesize_t_FRAMESIZE_UXGA,
    }
}

impl CameraDevice for Esp32Camera {
    type Frame = Esp32Frame;

    fn capture(&mut self) -> Result<Esp32Frame, CaptureError> {
        // SAFETY: driver is initialized for the lifetime of self
        let fb = unsafe { camera::esp_camera_fb_get() };
        NonNull::new(fb)
            .map(|fb| Esp32Frame {
                fb,
                configured: self.pixel_format,
            })
            .ok_or(CaptureError::NoFrameAvailable)
    }

    fn release(&mut self, frame: Esp32Frame) {
        // SAFETY: the pointer came from esp_camera_fb_get and is returned once
        unsafe { camera::esp_camera_fb_return(frame.fb.as_ptr()) };
    }

    fn pool_size(&self) -> usize {
        self.fb_count
    }
}

impl Drop for Esp32Camera {
    fn drop(&mut self) {
        // SAFETY: no frames outlive the camera (they borrow it through the guard)
        let err = unsafe { camera::esp_camera_deinit() };
        if err != ESP_OK as i32 {
            warn!("esp_camera_deinit failed: {:#x}", err);
        }
    }
}

impl Esp32Frame {
    fn fb(&self) -> &camera::camera_fb_t {
        // SAFETY: valid until returned to the driver, which consumes self
        unsafe { self.fb.as_ref() }
    }
}

impl FrameBuffer for Esp32Frame {
    fn data(&self) -> &[u8] {
        let fb = self.fb();
        if fb.buf.is_null() {
            return &[];
        }
        // SAFETY: driver guarantees `len` readable bytes at `buf`
        unsafe { core::slice::from_raw_parts(fb.buf, fb.len) }
    }

    fn width(&self) -> u16 {
        self.fb().width as u16
    }

    fn height(&self) -> u16 {
        self.fb().height as u16
    }

    fn format(&self) -> PixelFormat {
        // Formats we never configure fall back to what init asked for
        match self.fb().format {
            camera::pixformat_t_PIXFORMAT_JPEG => PixelFormat::Jpeg,
            camera::pixformat_t_PIXFORMAT_GRAYSCALE => PixelFormat::Grayscale,
            camera::pixformat_t_PIXFORMAT_RGB565 => PixelFormat::Rgb565,
            _ => self.configured,
        }
    }
}
