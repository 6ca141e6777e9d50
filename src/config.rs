//! Application configuration for desktop and ESP32.
//!
//! Uses `heapless::String` so the same structs work on the device without
//! extra allocation, while remaining ergonomic on desktop.
//!
//! # Example
//!
//! ```rust
//! use camsnap::config::{CameraConfig, Config, WebConfig, WifiConfig};
//! use camsnap::traits::{FrameSize, PixelFormat};
//!
//! let config = Config::default()
//!     .with_wifi(WifiConfig::default().with_ssid("Room").with_password("secret"))
//!     .with_camera(
//!         CameraConfig::default()
//!             .with_pixel_format(PixelFormat::Grayscale)
//!             .with_frame_size(FrameSize::R96x96),
//!     )
//!     .with_web(WebConfig::default().with_port(8080));
//!
//! assert_eq!(config.image_route().as_str(), "/image.pgm");
//! assert_eq!(config.image_path().as_str(), "/storage/image.pgm");
//! ```

use core::fmt::Write as _;
use core::time::Duration;

use heapless::String as HString;

use crate::error::NetworkError;
use crate::traits::{FrameBufferLocation, FrameSize, GrabMode, PixelFormat};

/// Maximum length for short config strings (SSIDs, labels)
pub const MAX_SHORT_STRING: usize = 64;

/// Maximum length for longer config strings (paths, routes)
pub const MAX_LONG_STRING: usize = 128;

/// Type alias for short config strings
pub type ShortString = HString<MAX_SHORT_STRING>;

/// Type alias for longer config strings
pub type LongString = HString<MAX_LONG_STRING>;

/// Longest SSID the WiFi driver accepts, in bytes.
pub const MAX_SSID_LEN: usize = 32;

/// GPIO number meaning "not connected" in the esp32-camera pin map.
pub const PIN_UNUSED: i32 = -1;

// ============================================================================
// Helper for creating heapless strings
// ============================================================================

fn bounded<const N: usize>(s: &str) -> HString<N> {
    let mut hs = HString::new();
    // Cut at the last char boundary that fits
    let valid_end = s
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take_while(|end| *end <= N)
        .last()
        .unwrap_or(0);
    let _ = hs.push_str(&s[..valid_end]);
    hs
}

/// Create a ShortString from a &str, truncating if too long
pub fn short_string(s: &str) -> ShortString {
    bounded(s)
}

/// Create a LongString from a &str, truncating if too long
pub fn long_string(s: &str) -> LongString {
    bounded(s)
}

// ============================================================================
// Main Config
// ============================================================================

/// Complete application configuration
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// WiFi connection configuration
    pub wifi: WifiConfig,
    /// Camera configuration
    pub camera: CameraConfig,
    /// Image storage configuration
    pub storage: StorageConfig,
    /// Web server configuration
    pub web: WebConfig,
}

impl Config {
    /// Set WiFi configuration
    pub fn with_wifi(mut self, wifi: WifiConfig) -> Self {
        self.wifi = wifi;
        self
    }

    /// Set camera configuration
    pub fn with_camera(mut self, camera: CameraConfig) -> Self {
        self.camera = camera;
        self
    }

    /// Set storage configuration
    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }

    /// Set web configuration
    pub fn with_web(mut self, web: WebConfig) -> Self {
        self.web = web;
        self
    }

    /// File name of the stored image, e.g. `image.jpg`.
    pub fn image_file_name(&self) -> ShortString {
        let mut name = ShortString::new();
        let _ = write!(
            name,
            "{}.{}",
            self.storage.file_stem,
            self.camera.pixel_format.file_extension()
        );
        name
    }

    /// Absolute path of the stored image, e.g. `/storage/image.jpg`.
    pub fn image_path(&self) -> LongString {
        let mut path = LongString::new();
        let base = self.storage.base_path.trim_end_matches('/');
        let _ = write!(path, "{}/{}", base, self.image_file_name());
        path
    }

    /// HTTP route serving the image, e.g. `/image.jpg`.
    pub fn image_route(&self) -> LongString {
        let mut route = LongString::new();
        let _ = write!(route, "/{}", self.image_file_name());
        route
    }
}

// ============================================================================
// Retry Policy
// ============================================================================

/// Bounded retry with exponential backoff.
///
/// Used for WiFi reconnects and for startup bring-up of the camera and
/// filesystem.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RetryPolicy {
    /// Maximum consecutive failures before giving up (0 = unlimited)
    pub max_retries: u8,
    /// Delay after the first failure in milliseconds
    pub initial_backoff_ms: u32,
    /// Upper bound for the doubled delay in milliseconds
    pub max_backoff_ms: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Retry forever without delay.
    pub const fn unbounded() -> Self {
        Self {
            max_retries: 0,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    /// Set the retry limit
    pub fn with_max_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the backoff bounds
    pub fn with_backoff_ms(mut self, initial: u32, max: u32) -> Self {
        self.initial_backoff_ms = initial;
        self.max_backoff_ms = max.max(initial);
        self
    }

    /// True once `failures` consecutive failures exceed the limit.
    pub fn is_exhausted(&self, failures: u32) -> bool {
        self.max_retries != 0 && failures > u32::from(self.max_retries)
    }

    /// Delay before the retry that follows failure number `failures` (1-based).
    ///
    /// ```
    /// use camsnap::config::RetryPolicy;
    /// use core::time::Duration;
    ///
    /// let policy = RetryPolicy::default().with_backoff_ms(100, 1000);
    /// assert_eq!(policy.backoff(1), Duration::from_millis(100));
    /// assert_eq!(policy.backoff(2), Duration::from_millis(200));
    /// assert_eq!(policy.backoff(3), Duration::from_millis(400));
    /// assert_eq!(policy.backoff(10), Duration::from_millis(1000));
    /// ```
    pub fn backoff(&self, failures: u32) -> Duration {
        let shift = failures.saturating_sub(1).min(16);
        let ms = u64::from(self.initial_backoff_ms)
            .saturating_mul(1 << shift)
            .min(u64::from(self.max_backoff_ms));
        Duration::from_millis(ms)
    }
}

// ============================================================================
// WiFi Config
// ============================================================================

/// WiFi connection configuration
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WifiConfig {
    /// WiFi network SSID
    pub ssid: ShortString,
    /// WiFi password (empty = open network)
    pub password: ShortString,
    /// Reconnect policy
    pub retry: RetryPolicy,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            ssid: ShortString::new(),
            password: ShortString::new(),
            retry: RetryPolicy::default(),
        }
    }
}

impl WifiConfig {
    /// Set the SSID
    pub fn with_ssid(mut self, ssid: &str) -> Self {
        self.ssid = short_string(ssid);
        self
    }

    /// Set the password
    pub fn with_password(mut self, password: &str) -> Self {
        self.password = short_string(password);
        self
    }

    /// Set the reconnect policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Check if WiFi credentials are configured
    pub fn is_configured(&self) -> bool {
        !self.ssid.is_empty()
    }

    /// Reject credentials the driver would not accept as given.
    pub fn validate(&self) -> Result<(), NetworkError> {
        if self.ssid.len() > MAX_SSID_LEN {
            return Err(NetworkError::SsidTooLong {
                len: self.ssid.len(),
                max: MAX_SSID_LEN,
            });
        }
        Ok(())
    }
}

// ============================================================================
// Camera Config
// ============================================================================

/// Camera GPIO assignments.
///
/// Defaults match the ESP32-CAM (AI-Thinker style) wiring. Use
/// [`PIN_UNUSED`] for lines that are not connected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CameraPins {
    /// Sensor power-down line
    pub pwdn: i32,
    /// Sensor reset line (software reset when unused)
    pub reset: i32,
    /// Master clock output
    pub xclk: i32,
    /// SCCB (I2C) data
    pub sccb_sda: i32,
    /// SCCB (I2C) clock
    pub sccb_scl: i32,
    /// Parallel data lines D0..D7
    pub data: [i32; 8],
    /// Vertical sync
    pub vsync: i32,
    /// Horizontal reference
    pub href: i32,
    /// Pixel clock
    pub pclk: i32,
    /// Board-level power enable driven high before init
    pub power: i32,
}

impl Default for CameraPins {
    fn default() -> Self {
        Self {
            pwdn: PIN_UNUSED,
            reset: PIN_UNUSED,
            xclk: 21,
            sccb_sda: 26,
            sccb_scl: 27,
            data: [4, 5, 18, 19, 36, 39, 34, 35],
            vsync: 25,
            href: 23,
            pclk: 22,
            power: 32,
        }
    }
}

impl CameraPins {
    /// True if a board power-enable pin is configured
    pub fn has_power_pin(&self) -> bool {
        self.power != PIN_UNUSED
    }
}

/// Camera configuration, applied once at init
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CameraConfig {
    /// GPIO map
    pub pins: CameraPins,
    /// XCLK frequency in Hz
    pub xclk_freq_hz: u32,
    /// Output pixel format
    pub pixel_format: PixelFormat,
    /// Output resolution
    pub frame_size: FrameSize,
    /// JPEG quality (0-63, lower is better)
    pub jpeg_quality: u8,
    /// Number of framebuffers in the pool (1 or 2)
    pub fb_count: u8,
    /// Framebuffer placement
    pub fb_location: FrameBufferLocation,
    /// Driver grab mode
    pub grab_mode: GrabMode,
    /// Settle time after raising the power pin in milliseconds
    pub power_up_delay_ms: u32,
    /// Startup bring-up policy for the sensor
    pub init_retry: RetryPolicy,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            pins: CameraPins::default(),
            xclk_freq_hz: 20_000_000,
            pixel_format: PixelFormat::Jpeg,
            frame_size: FrameSize::Qvga,
            jpeg_quality: 12,
            fb_count: 1,
            fb_location: FrameBufferLocation::Psram,
            grab_mode: GrabMode::WhenEmpty,
            power_up_delay_ms: 100,
            init_retry: RetryPolicy::default().with_max_retries(3),
        }
    }
}

impl CameraConfig {
    /// Set the pin map
    pub fn with_pins(mut self, pins: CameraPins) -> Self {
        self.pins = pins;
        self
    }

    /// Set the XCLK frequency
    pub fn with_xclk_freq_hz(mut self, hz: u32) -> Self {
        self.xclk_freq_hz = hz;
        self
    }

    /// Set the pixel format
    pub fn with_pixel_format(mut self, format: PixelFormat) -> Self {
        self.pixel_format = format;
        self
    }

    /// Set the frame size
    pub fn with_frame_size(mut self, size: FrameSize) -> Self {
        self.frame_size = size;
        self
    }

    /// Set the JPEG quality (clamped to 0-63)
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.min(63);
        self
    }

    /// Set the framebuffer count (clamped to 1-2)
    pub fn with_fb_count(mut self, count: u8) -> Self {
        self.fb_count = count.clamp(1, 2);
        self
    }

    /// Set framebuffer placement
    pub fn with_fb_location(mut self, location: FrameBufferLocation) -> Self {
        self.fb_location = location;
        self
    }

    /// Set the grab mode
    pub fn with_grab_mode(mut self, mode: GrabMode) -> Self {
        self.grab_mode = mode;
        self
    }

    /// Set the power-up settle delay
    pub fn with_power_up_delay_ms(mut self, ms: u32) -> Self {
        self.power_up_delay_ms = ms;
        self
    }

    /// Set the startup bring-up policy
    pub fn with_init_retry(mut self, retry: RetryPolicy) -> Self {
        self.init_retry = retry;
        self
    }
}

// ============================================================================
// Storage Config
// ============================================================================

/// How the stored image is replaced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReplaceStrategy {
    /// Open the target with truncation and write in place.
    ///
    /// A failure mid-write leaves a torn file.
    Truncate,
    /// Write a temp file, then rename it over the target.
    #[default]
    Rename,
}

/// Image storage configuration
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StorageConfig {
    /// Mount point of the flash filesystem
    pub base_path: LongString,
    /// Partition label (empty = first SPIFFS partition)
    pub partition_label: ShortString,
    /// Maximum simultaneously open files
    pub max_files: u8,
    /// Format the partition if mounting fails
    pub format_if_mount_failed: bool,
    /// Image file name without extension
    pub file_stem: ShortString,
    /// Replace strategy
    pub replace: ReplaceStrategy,
    /// Startup bring-up policy for the mount
    pub mount_retry: RetryPolicy,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: long_string("/storage"),
            partition_label: ShortString::new(),
            max_files: 5,
            format_if_mount_failed: true,
            file_stem: short_string("image"),
            replace: ReplaceStrategy::Rename,
            mount_retry: RetryPolicy::default().with_max_retries(3),
        }
    }
}

impl StorageConfig {
    /// Set the mount point
    pub fn with_base_path(mut self, path: &str) -> Self {
        self.base_path = long_string(path);
        self
    }

    /// Set the partition label
    pub fn with_partition_label(mut self, label: &str) -> Self {
        self.partition_label = short_string(label);
        self
    }

    /// Set the open file limit
    pub fn with_max_files(mut self, max: u8) -> Self {
        self.max_files = max;
        self
    }

    /// Set whether to format on mount failure
    pub fn with_format_if_mount_failed(mut self, format: bool) -> Self {
        self.format_if_mount_failed = format;
        self
    }

    /// Set the image file stem
    pub fn with_file_stem(mut self, stem: &str) -> Self {
        self.file_stem = short_string(stem);
        self
    }

    /// Set the replace strategy
    pub fn with_replace(mut self, replace: ReplaceStrategy) -> Self {
        self.replace = replace;
        self
    }

    /// Set the startup bring-up policy
    pub fn with_mount_retry(mut self, retry: RetryPolicy) -> Self {
        self.mount_retry = retry;
        self
    }
}

// ============================================================================
// Web Config
// ============================================================================

/// Web server configuration
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WebConfig {
    /// Port to listen on
    pub port: u16,
    /// Response chunk size in bytes
    pub chunk_size: usize,
    /// Whether to enable CORS for all origins (desktop server)
    pub cors_permissive: bool,
    /// HTTP server task stack size in bytes (ESP32)
    pub stack_size: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            port: 80,
            chunk_size: 1024,
            cors_permissive: true,
            stack_size: 10_240,
        }
    }
}

impl WebConfig {
    /// Set the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the chunk size (at least 1 byte)
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Set CORS mode
    pub fn with_cors(mut self, permissive: bool) -> Self {
        self.cors_permissive = permissive;
        self
    }

    /// Set the server task stack size
    pub fn with_stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.web.port, 80);
        assert_eq!(config.web.chunk_size, 1024);
        assert_eq!(config.camera.pixel_format, PixelFormat::Jpeg);
        assert_eq!(config.storage.base_path.as_str(), "/storage");
    }

    #[test]
    fn image_locations_follow_format() {
        let config = Config::default();
        assert_eq!(config.image_file_name().as_str(), "image.jpg");
        assert_eq!(config.image_path().as_str(), "/storage/image.jpg");
        assert_eq!(config.image_route().as_str(), "/image.jpg");

        let config = config.with_camera(CameraConfig::default().with_pixel_format(PixelFormat::Rgb565));
        assert_eq!(config.image_route().as_str(), "/image.bmp");
    }

    #[test]
    fn image_path_tolerates_trailing_slash() {
        let config = Config::default()
            .with_storage(StorageConfig::default().with_base_path("/spiffs/").with_file_stem("snap"));
        assert_eq!(config.image_path().as_str(), "/spiffs/snap.jpg");
    }

    #[test]
    fn short_string_truncation() {
        let long_input = "a".repeat(100);
        let s = short_string(&long_input);
        assert_eq!(s.len(), MAX_SHORT_STRING);
    }

    #[test]
    fn long_string_truncation() {
        let long_input = "b".repeat(200);
        let s = long_string(&long_input);
        assert_eq!(s.len(), MAX_LONG_STRING);
    }

    #[test]
    fn string_helpers_utf8_boundary() {
        // 3-byte chars: 22 of them fill 66 bytes, only 21 fit
        let input = "€".repeat(22);
        let s = short_string(&input);
        assert_eq!(s.len(), 63);
        assert!(core::str::from_utf8(s.as_bytes()).is_ok());
    }

    // =========================================================================
    // RetryPolicy Tests
    // =========================================================================

    #[test]
    fn retry_policy_limit() {
        let policy = RetryPolicy::default().with_max_retries(3);
        assert!(!policy.is_exhausted(1));
        assert!(!policy.is_exhausted(3));
        assert!(policy.is_exhausted(4));
    }

    #[test]
    fn retry_policy_zero_means_unlimited() {
        let policy = RetryPolicy::unbounded();
        assert!(!policy.is_exhausted(u32::MAX));
        assert_eq!(policy.backoff(5), Duration::ZERO);
    }

    #[test]
    fn retry_policy_backoff_caps() {
        let policy = RetryPolicy::default().with_backoff_ms(500, 30_000);
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(4), Duration::from_millis(4000));
        assert_eq!(policy.backoff(100), Duration::from_millis(30_000));
    }

    #[test]
    fn retry_policy_max_not_below_initial() {
        let policy = RetryPolicy::default().with_backoff_ms(2000, 100);
        assert_eq!(policy.max_backoff_ms, 2000);
    }

    // =========================================================================
    // WifiConfig Tests
    // =========================================================================

    #[test]
    fn wifi_config_default() {
        let wifi = WifiConfig::default();
        assert!(wifi.ssid.is_empty());
        assert!(wifi.password.is_empty());
        assert_eq!(wifi.retry, RetryPolicy::default());
    }

    #[test]
    fn wifi_config_is_configured() {
        assert!(!WifiConfig::default().is_configured());
        assert!(WifiConfig::default().with_ssid("Room").is_configured());
        assert!(!WifiConfig::default().with_ssid("").is_configured());
    }

    #[test]
    fn wifi_config_builder() {
        let wifi = WifiConfig::default()
            .with_ssid("TestNetwork")
            .with_password("secret123")
            .with_retry(RetryPolicy::default().with_max_retries(2));

        assert_eq!(wifi.ssid.as_str(), "TestNetwork");
        assert_eq!(wifi.password.as_str(), "secret123");
        assert_eq!(wifi.retry.max_retries, 2);
    }

    #[test]
    fn wifi_config_rejects_long_ssid() {
        assert!(WifiConfig::default().with_ssid(&"a".repeat(32)).validate().is_ok());

        let wifi = WifiConfig::default().with_ssid(&"a".repeat(40));
        assert_eq!(wifi.ssid.len(), 40);
        assert_eq!(
            wifi.validate(),
            Err(NetworkError::SsidTooLong { len: 40, max: 32 })
        );
    }

    // =========================================================================
    // CameraConfig Tests
    // =========================================================================

    #[test]
    fn camera_config_default_matches_board_wiring() {
        let camera = CameraConfig::default();
        assert_eq!(camera.pins.xclk, 21);
        assert_eq!(camera.pins.sccb_sda, 26);
        assert_eq!(camera.pins.sccb_scl, 27);
        assert_eq!(camera.pins.data, [4, 5, 18, 19, 36, 39, 34, 35]);
        assert_eq!(camera.pins.pwdn, PIN_UNUSED);
        assert!(camera.pins.has_power_pin());
        assert_eq!(camera.xclk_freq_hz, 20_000_000);
        assert_eq!(camera.fb_count, 1);
        assert_eq!(camera.fb_location, FrameBufferLocation::Psram);
        assert_eq!(camera.power_up_delay_ms, 100);
    }

    #[test]
    fn camera_config_clamps() {
        let camera = CameraConfig::default().with_fb_count(5).with_jpeg_quality(99);
        assert_eq!(camera.fb_count, 2);
        assert_eq!(camera.jpeg_quality, 63);

        let camera = CameraConfig::default().with_fb_count(0);
        assert_eq!(camera.fb_count, 1);
    }

    // =========================================================================
    // StorageConfig / WebConfig Tests
    // =========================================================================

    #[test]
    fn storage_config_builder() {
        let storage = StorageConfig::default()
            .with_base_path("/data")
            .with_partition_label("images")
            .with_max_files(2)
            .with_format_if_mount_failed(false)
            .with_replace(ReplaceStrategy::Truncate);

        assert_eq!(storage.base_path.as_str(), "/data");
        assert_eq!(storage.partition_label.as_str(), "images");
        assert_eq!(storage.max_files, 2);
        assert!(!storage.format_if_mount_failed);
        assert_eq!(storage.replace, ReplaceStrategy::Truncate);
    }

    #[test]
    fn web_config_builder() {
        let web = WebConfig::default()
            .with_port(3000)
            .with_chunk_size(0)
            .with_cors(false);

        assert_eq!(web.port, 3000);
        assert_eq!(web.chunk_size, 1);
        assert!(!web.cors_permissive);
    }
}
