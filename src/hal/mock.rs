//! Mock implementations for testing without hardware.
//!
//! This module provides test doubles for the camera, storage and network
//! traits, enabling development and testing on desktop without an ESP32.
//!
//! # Available Mocks
//!
//! | Mock | Trait | Purpose |
//! |------|-------|---------|
//! | [`MockCamera`] | [`CameraDevice`] | Finite framebuffer pool, failure injection, counters |
//! | [`MemoryImageStore`] | [`ImageStore`] | In-memory image with failure injection |
//! | [`MockWifi`] | [`WifiDriver`] | Connect counter, optional auto-association |
//! | [`MockResponder`] | [`Responder`] | Records status, content type and chunks |
//!
//! # Example
//!
//! ```rust
//! use camsnap::delivery::SnapshotService;
//! use camsnap::hal::{MemoryImageStore, MockCamera, MockResponder};
//! use camsnap::traits::{FrameSize, PixelFormat};
//!
//! let service = SnapshotService::new(
//!     MockCamera::new(PixelFormat::Jpeg, FrameSize::Qvga),
//!     MemoryImageStore::new(),
//!     1024,
//! );
//!
//! let mut responder = MockResponder::new();
//! service.serve(&mut responder).unwrap();
//!
//! // The body is what the camera produced
//! let captured = service.with_camera(|c| c.last_frame().unwrap().to_vec());
//! assert_eq!(responder.body(), captured);
//! ```
//!
//! [`CameraDevice`]: crate::traits::CameraDevice
//! [`ImageStore`]: crate::traits::ImageStore
//! [`WifiDriver`]: crate::traits::WifiDriver
//! [`Responder`]: crate::traits::Responder

use std::io::{self, Cursor};
use std::net::Ipv4Addr;
use std::sync::mpsc::Sender;

use crate::error::{CaptureError, NetworkError, StorageError};
use crate::traits::{
    CameraDevice, ChunkSink, FrameBuffer, FrameSize, ImageStore, NetEvent, PixelFormat, Responder,
    WifiDriver,
};

// ============================================================================
// Camera Mocks
// ============================================================================

/// Frame handed out by [`MockCamera`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockFrame {
    data: Vec<u8>,
    width: u16,
    height: u16,
    format: PixelFormat,
}

impl FrameBuffer for MockFrame {
    fn data(&self) -> &[u8] {
        &self.data
    }

    fn width(&self) -> u16 {
        self.width
    }

    fn height(&self) -> u16 {
        self.height
    }

    fn format(&self) -> PixelFormat {
        self.format
    }
}

/// Mock camera with a finite framebuffer pool.
///
/// Frames are synthetic but deterministic: JPEG frames start with the SOI
/// marker and end with EOI, raw frames are gradients of the right size.
/// Each capture shifts the pattern so consecutive frames differ.
///
/// # Example
///
/// ```rust
/// use camsnap::hal::MockCamera;
/// use camsnap::error::CaptureError;
/// use camsnap::traits::{CameraDevice, FrameSize, PixelFormat};
///
/// let mut camera = MockCamera::new(PixelFormat::Jpeg, FrameSize::Qvga);
///
/// let frame = camera.capture().unwrap();
/// // Single buffer is now held
/// assert!(matches!(camera.capture(), Err(CaptureError::PoolExhausted { .. })));
/// camera.release(frame);
///
/// camera.fail_next(1);
/// assert_eq!(camera.capture().err(), Some(CaptureError::NoFrameAvailable));
/// assert_eq!(camera.captures(), 1);
/// ```
#[derive(Debug)]
pub struct MockCamera {
    format: PixelFormat,
    size: FrameSize,
    pool_size: usize,
    in_use: usize,
    fail_remaining: u32,
    captures: usize,
    releases: usize,
    last_frame: Option<Vec<u8>>,
}

impl MockCamera {
    /// Creates a mock camera with a single framebuffer.
    pub fn new(format: PixelFormat, size: FrameSize) -> Self {
        Self {
            format,
            size,
            pool_size: 1,
            in_use: 0,
            fail_remaining: 0,
            captures: 0,
            releases: 0,
            last_frame: None,
        }
    }

    /// Set the number of framebuffers.
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size.max(1);
        self
    }

    /// Make the next `n` captures time out.
    pub fn fail_next(&mut self, n: u32) {
        self.fail_remaining = n;
    }

    /// Successful captures so far.
    pub fn captures(&self) -> usize {
        self.captures
    }

    /// Frames released so far.
    pub fn releases(&self) -> usize {
        self.releases
    }

    /// Buffers currently held by callers.
    pub fn in_use(&self) -> usize {
        self.in_use
    }

    /// Buffers available for capture.
    pub fn free_buffers(&self) -> usize {
        self.pool_size - self.in_use
    }

    /// Bytes of the most recent successful capture.
    pub fn last_frame(&self) -> Option<&[u8]> {
        self.last_frame.as_deref()
    }

    fn synthesize(&self) -> Vec<u8> {
        let (w, h) = self.size.dimensions();
        let seed = self.captures as u8;
        match self.format.bytes_per_pixel() {
            None => {
                // Rough 10:1 compression
                let len = (self.size.pixels() / 10).max(8);
                let mut data = Vec::with_capacity(len);
                data.extend_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0]);
                data.extend((4..len - 2).map(|i| (i as u8).wrapping_add(seed) & 0x7F));
                data.extend_from_slice(&[0xFF, 0xD9]);
                data
            }
            Some(bpp) => {
                let mut data = Vec::with_capacity(self.size.pixels() * bpp);
                for y in 0..h {
                    for x in 0..w {
                        let v = (x as u8).wrapping_add(y as u8).wrapping_add(seed);
                        data.extend(core::iter::repeat(v).take(bpp));
                    }
                }
                data
            }
        }
    }
}

impl CameraDevice for MockCamera {
    type Frame = MockFrame;

    fn capture(&mut self) -> Result<MockFrame, CaptureError> {
        if self.fail_remaining > 0 {
            self.fail_remaining -= 1;
            return Err(CaptureError::NoFrameAvailable);
        }
        if self.in_use >= self.pool_size {
            return Err(CaptureError::PoolExhausted {
                in_use: self.in_use,
                capacity: self.pool_size,
            });
        }

        let data = self.synthesize();
        let (width, height) = self.size.dimensions();
        self.in_use += 1;
        self.captures += 1;
        self.last_frame = Some(data.clone());

        Ok(MockFrame {
            data,
            width,
            height,
            format: self.format,
        })
    }

    fn release(&mut self, _frame: MockFrame) {
        self.in_use = self.in_use.saturating_sub(1);
        self.releases += 1;
    }

    fn pool_size(&self) -> usize {
        self.pool_size
    }
}

// ============================================================================
// Storage Mock
// ============================================================================

/// In-memory [`ImageStore`].
///
/// `fail_writes` simulates a full filesystem and leaves the previous image
/// untouched. `drop_writes` accepts writes but keeps nothing, so the next
/// `open` finds no image.
#[derive(Debug, Default)]
pub struct MemoryImageStore {
    contents: Option<Vec<u8>>,
    fail_writes: bool,
    drop_writes: bool,
    writes: usize,
}

impl MemoryImageStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store already holding `contents`.
    pub fn with_contents(contents: Vec<u8>) -> Self {
        Self {
            contents: Some(contents),
            ..Self::default()
        }
    }

    /// Make every write fail with [`StorageError::Full`].
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Accept writes without storing them.
    pub fn set_drop_writes(&mut self, drop_writes: bool) {
        self.drop_writes = drop_writes;
    }

    /// Successful `replace` calls.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Current image bytes.
    pub fn contents(&self) -> Option<&[u8]> {
        self.contents.as_deref()
    }
}

impl ImageStore for MemoryImageStore {
    type Reader = Cursor<Vec<u8>>;

    fn replace(&mut self, header: &[u8], payload: &[u8]) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::Full);
        }
        self.writes += 1;
        if !self.drop_writes {
            let mut image = Vec::with_capacity(header.len() + payload.len());
            image.extend_from_slice(header);
            image.extend_from_slice(payload);
            self.contents = Some(image);
        }
        Ok(())
    }

    fn open(&self) -> Result<Option<Self::Reader>, StorageError> {
        Ok(self.contents.clone().map(Cursor::new))
    }

    fn exists(&self) -> bool {
        self.contents.is_some()
    }
}

// ============================================================================
// Network Mocks
// ============================================================================

/// Mock WiFi driver.
///
/// Counts connect requests. With auto-association, every successful connect
/// immediately reports `GotIp` on the event channel, like a driver that
/// joins on the first try.
///
/// # Example
///
/// ```rust
/// use std::net::Ipv4Addr;
/// use std::sync::mpsc;
/// use camsnap::hal::MockWifi;
/// use camsnap::traits::{NetEvent, WifiDriver};
///
/// let (tx, rx) = mpsc::channel();
/// let ip = Ipv4Addr::new(192, 168, 4, 2);
/// let mut wifi = MockWifi::new().with_auto_associate(tx, ip);
///
/// wifi.connect().unwrap();
/// assert_eq!(rx.try_recv().unwrap(), NetEvent::GotIp(ip));
/// assert_eq!(wifi.connects(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MockWifi {
    connects: usize,
    fail_remaining: u32,
    auto_associate: Option<(Sender<NetEvent>, Ipv4Addr)>,
}

impl MockWifi {
    /// Creates a mock driver that never associates on its own.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `GotIp(ip)` on `events` after each successful connect.
    pub fn with_auto_associate(mut self, events: Sender<NetEvent>, ip: Ipv4Addr) -> Self {
        self.auto_associate = Some((events, ip));
        self
    }

    /// Reject the next `n` connect requests.
    pub fn fail_connects(&mut self, n: u32) {
        self.fail_remaining = n;
    }

    /// Connect requests received, including rejected ones.
    pub fn connects(&self) -> usize {
        self.connects
    }
}

impl WifiDriver for MockWifi {
    fn connect(&mut self) -> Result<(), NetworkError> {
        self.connects += 1;
        if self.fail_remaining > 0 {
            self.fail_remaining -= 1;
            return Err(NetworkError::Driver("simulated connect failure".into()));
        }
        if let Some((events, ip)) = &self.auto_associate {
            let _ = events.send(NetEvent::GotIp(*ip));
        }
        Ok(())
    }
}

/// Records one HTTP response.
///
/// `Responder` is implemented for `&mut MockResponder` so the recording
/// survives the response being consumed.
#[derive(Debug, Default)]
pub struct MockResponder {
    status: Option<u16>,
    content_type: Option<String>,
    chunks: Vec<Vec<u8>>,
    finished: bool,
    fail_after_chunks: Option<usize>,
}

impl MockResponder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the client hanging up after `n` chunks.
    pub fn with_fail_after_chunks(mut self, n: usize) -> Self {
        self.fail_after_chunks = Some(n);
        self
    }

    /// Status passed to `begin`.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Content type passed to `begin`.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Chunks in send order.
    pub fn chunks(&self) -> &[Vec<u8>] {
        &self.chunks
    }

    /// All chunks concatenated.
    pub fn body(&self) -> Vec<u8> {
        self.chunks.concat()
    }

    /// Whether the body was ended.
    pub fn finished(&self) -> bool {
        self.finished
    }
}

/// Body half of a [`MockResponder`].
#[derive(Debug)]
pub struct MockBody<'a> {
    responder: &'a mut MockResponder,
}

impl<'a> Responder for &'a mut MockResponder {
    type Error = io::Error;
    type Body = MockBody<'a>;

    fn begin(self, status: u16, content_type: &str) -> Result<MockBody<'a>, io::Error> {
        self.status = Some(status);
        self.content_type = Some(content_type.to_string());
        Ok(MockBody { responder: self })
    }
}

impl ChunkSink for MockBody<'_> {
    type Error = io::Error;

    fn send_chunk(&mut self, chunk: &[u8]) -> Result<(), io::Error> {
        if self.responder.fail_after_chunks == Some(self.responder.chunks.len()) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away"));
        }
        self.responder.chunks.push(chunk.to_vec());
        Ok(())
    }

    fn finish(self) -> Result<(), io::Error> {
        self.responder.finished = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::sync::mpsc;

    // =========================================================================
    // MockCamera Tests
    // =========================================================================

    #[test]
    fn mock_camera_jpeg_markers() {
        let mut camera = MockCamera::new(PixelFormat::Jpeg, FrameSize::Qvga);
        let frame = camera.capture().unwrap();
        assert_eq!(&frame.data()[..2], &[0xFF, 0xD8]);
        assert_eq!(&frame.data()[frame.len() - 2..], &[0xFF, 0xD9]);
        assert_eq!((frame.width(), frame.height()), (320, 240));
        camera.release(frame);
    }

    #[test]
    fn mock_camera_raw_sizes() {
        let mut camera = MockCamera::new(PixelFormat::Rgb565, FrameSize::Qqvga);
        let frame = camera.capture().unwrap();
        assert_eq!(frame.len(), 160 * 120 * 2);
        camera.release(frame);
    }

    #[test]
    fn mock_camera_frames_differ() {
        let mut camera = MockCamera::new(PixelFormat::Grayscale, FrameSize::R96x96);
        let a = camera.capture().unwrap();
        camera.release(a.clone());
        let b = camera.capture().unwrap();
        assert_ne!(a.data(), b.data());
        camera.release(b);
    }

    #[test]
    fn mock_camera_pool_accounting() {
        let mut camera = MockCamera::new(PixelFormat::Jpeg, FrameSize::Qvga).with_pool_size(2);
        let a = camera.capture().unwrap();
        let b = camera.capture().unwrap();
        assert_eq!(camera.free_buffers(), 0);
        assert_eq!(
            camera.capture().err(),
            Some(CaptureError::PoolExhausted {
                in_use: 2,
                capacity: 2
            })
        );
        camera.release(a);
        camera.release(b);
        assert_eq!(camera.free_buffers(), 2);
        assert_eq!(camera.releases(), 2);
    }

    // =========================================================================
    // MemoryImageStore Tests
    // =========================================================================

    #[test]
    fn memory_store_roundtrip() {
        let mut store = MemoryImageStore::new();
        assert!(store.open().unwrap().is_none());

        store.replace(b"H", b"body").unwrap();
        let mut buf = Vec::new();
        store.open().unwrap().unwrap().read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"Hbody");
        assert_eq!(store.writes(), 1);
    }

    #[test]
    fn memory_store_fail_keeps_previous() {
        let mut store = MemoryImageStore::with_contents(b"old".to_vec());
        store.set_fail_writes(true);
        assert!(matches!(store.replace(&[], b"new"), Err(StorageError::Full)));
        assert_eq!(store.contents(), Some(&b"old"[..]));
        assert_eq!(store.writes(), 0);
    }

    // =========================================================================
    // Network Mock Tests
    // =========================================================================

    #[test]
    fn mock_wifi_without_auto_associate_is_silent() {
        let mut wifi = MockWifi::new();
        wifi.connect().unwrap();
        assert_eq!(wifi.connects(), 1);
    }

    #[test]
    fn mock_wifi_failures_skip_association() {
        let (tx, rx) = mpsc::channel();
        let mut wifi = MockWifi::new().with_auto_associate(tx, Ipv4Addr::LOCALHOST);
        wifi.fail_connects(1);
        assert!(wifi.connect().is_err());
        assert!(rx.try_recv().is_err());
        wifi.connect().unwrap();
        assert_eq!(rx.try_recv().unwrap(), NetEvent::GotIp(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn mock_responder_records() {
        let mut responder = MockResponder::new();
        let mut body = (&mut responder).begin(200, "image/jpeg").unwrap();
        body.send_chunk(b"ab").unwrap();
        body.send_chunk(b"c").unwrap();
        body.finish().unwrap();

        assert_eq!(responder.status(), Some(200));
        assert_eq!(responder.content_type(), Some("image/jpeg"));
        assert_eq!(responder.chunks().len(), 2);
        assert_eq!(responder.body(), b"abc");
        assert!(responder.finished());
    }

    #[test]
    fn mock_responder_hang_up() {
        let mut responder = MockResponder::new().with_fail_after_chunks(1);
        let mut body = (&mut responder).begin(200, "image/jpeg").unwrap();
        body.send_chunk(b"a").unwrap();
        let err = body.send_chunk(b"b").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
