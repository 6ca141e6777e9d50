//! Persisting the latest frame as a viewable image file.
//!
//! # File Layout
//!
//! | Format | Header | Payload |
//! |--------|--------|---------|
//! | JPEG | none | frame bytes as-is |
//! | Grayscale | `P5\n{w} {h}\n255\n` | `w*h` luminance bytes |
//! | RGB565 | 66-byte BMP (BI_BITFIELDS, top-down) | little-endian pixels, rows padded to 4 bytes |
//!
//! Raw formats are checked against `w*h*bytes_per_pixel` and JPEG frames
//! for the SOI marker before anything is written, so a short or mislabelled
//! frame never replaces a good image.
//!
//! # Replace Strategies
//!
//! [`FsImageStore`] supports both strategies from
//! [`ReplaceStrategy`](crate::config::ReplaceStrategy):
//!
//! - `Truncate` rewrites the file in place.
//! - `Rename` writes `<path>.tmp` and renames it over the target. If the
//!   filesystem refuses to rename onto an existing file (SPIFFS does), the
//!   target is removed first.

use std::borrow::Cow;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::config::{Config, ReplaceStrategy};
use crate::error::StorageError;
use crate::traits::{FrameBuffer, ImageStore, PixelFormat};

/// Size of the RGB565 BMP header: file header, info header, three masks.
pub const BMP_HEADER_LEN: usize = 14 + 40 + 12;

/// Start-of-image marker every JPEG frame begins with.
const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// Summary of a successful [`store_frame`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoredImage {
    /// Format of the stored image
    pub format: PixelFormat,
    /// Width in pixels
    pub width: u16,
    /// Height in pixels
    pub height: u16,
    /// Total file size in bytes, header included
    pub bytes: usize,
}

impl StoredImage {
    /// HTTP content type of the stored file.
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }
}

/// Encoded file contents: header bytes plus the (possibly converted) payload.
#[derive(Debug)]
pub struct EncodedImage<'a> {
    /// Format-specific header, empty for JPEG
    pub header: Vec<u8>,
    /// Pixel data in file order
    pub payload: Cow<'a, [u8]>,
}

impl EncodedImage<'_> {
    /// Total file length
    pub fn len(&self) -> usize {
        self.header.len() + self.payload.len()
    }

    /// True when there is nothing to write
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build the file contents for a frame.
///
/// ```
/// use camsnap::persistence::encode_frame;
/// use camsnap::traits::PixelFormat;
///
/// let pixels = [0u8; 4 * 2];
/// let image = encode_frame(PixelFormat::Grayscale, 4, 2, &pixels).unwrap();
/// assert_eq!(image.header, b"P5\n4 2\n255\n");
/// assert_eq!(image.payload.len(), 8);
/// ```
pub fn encode_frame(
    format: PixelFormat,
    width: u16,
    height: u16,
    data: &[u8],
) -> Result<EncodedImage<'_>, StorageError> {
    match format.bytes_per_pixel() {
        Some(bpp) => {
            let expected = usize::from(width) * usize::from(height) * bpp;
            if data.len() != expected {
                return Err(StorageError::InvalidFrame {
                    expected,
                    actual: data.len(),
                });
            }
        }
        None if !data.starts_with(&JPEG_SOI) => return Err(StorageError::NotJpeg),
        None => {}
    }

    Ok(match format {
        PixelFormat::Jpeg => EncodedImage {
            header: Vec::new(),
            payload: Cow::Borrowed(data),
        },
        PixelFormat::Grayscale => EncodedImage {
            header: pgm_header(width, height),
            payload: Cow::Borrowed(data),
        },
        PixelFormat::Rgb565 => EncodedImage {
            header: bmp_header(width, height),
            payload: Cow::Owned(rgb565_rows(width, height, data)),
        },
    })
}

fn pgm_header(width: u16, height: u16) -> Vec<u8> {
    format!("P5\n{} {}\n255\n", width, height).into_bytes()
}

fn bmp_row_stride(width: u16) -> usize {
    (usize::from(width) * 2 + 3) & !3
}

fn bmp_header(width: u16, height: u16) -> Vec<u8> {
    let image_size = (bmp_row_stride(width) * usize::from(height)) as u32;
    let file_size = BMP_HEADER_LEN as u32 + image_size;

    let mut h = Vec::with_capacity(BMP_HEADER_LEN);
    // BITMAPFILEHEADER
    h.extend_from_slice(b"BM");
    h.extend_from_slice(&file_size.to_le_bytes());
    h.extend_from_slice(&0u32.to_le_bytes());
    h.extend_from_slice(&(BMP_HEADER_LEN as u32).to_le_bytes());
    // BITMAPINFOHEADER, negative height = top-down rows
    h.extend_from_slice(&40u32.to_le_bytes());
    h.extend_from_slice(&i32::from(width).to_le_bytes());
    h.extend_from_slice(&(-i32::from(height)).to_le_bytes());
    h.extend_from_slice(&1u16.to_le_bytes());
    h.extend_from_slice(&16u16.to_le_bytes());
    h.extend_from_slice(&3u32.to_le_bytes()); // BI_BITFIELDS
    h.extend_from_slice(&image_size.to_le_bytes());
    h.extend_from_slice(&2835u32.to_le_bytes());
    h.extend_from_slice(&2835u32.to_le_bytes());
    h.extend_from_slice(&0u32.to_le_bytes());
    h.extend_from_slice(&0u32.to_le_bytes());
    // R, G, B masks
    h.extend_from_slice(&0xF800u32.to_le_bytes());
    h.extend_from_slice(&0x07E0u32.to_le_bytes());
    h.extend_from_slice(&0x001Fu32.to_le_bytes());
    h
}

// Sensor emits big-endian RGB565; BMP wants little-endian.
fn rgb565_rows(width: u16, height: u16, data: &[u8]) -> Vec<u8> {
    let row_bytes = usize::from(width) * 2;
    let stride = bmp_row_stride(width);
    let mut out = Vec::with_capacity(stride * usize::from(height));
    for row in data.chunks_exact(row_bytes.max(1)).take(usize::from(height)) {
        for px in row.chunks_exact(2) {
            out.push(px[1]);
            out.push(px[0]);
        }
        out.resize(out.len() + (stride - row_bytes), 0);
    }
    out
}

/// Encode a frame and replace the stored image with it.
///
/// The frame is only read; releasing it stays with the caller's guard.
pub fn store_frame<S, F>(store: &mut S, frame: &F) -> Result<StoredImage, StorageError>
where
    S: ImageStore,
    F: FrameBuffer + ?Sized,
{
    let format = frame.format();
    let (width, height) = (frame.width(), frame.height());
    let image = encode_frame(format, width, height, frame.data())?;
    store.replace(&image.header, &image.payload)?;

    let stored = StoredImage {
        format,
        width,
        height,
        bytes: image.len(),
    };
    debug!("Stored {}x{} {:?} image ({} bytes)", width, height, format, stored.bytes);
    Ok(stored)
}

// ============================================================================
// Filesystem store
// ============================================================================

/// Rename primitive used to commit a `Rename` replace.
pub type RenameFn = fn(&Path, &Path) -> io::Result<()>;

fn std_rename(from: &Path, to: &Path) -> io::Result<()> {
    fs::rename(from, to)
}

/// [`ImageStore`] backed by one file on a `std::fs` filesystem.
///
/// On ESP32 the SPIFFS partition is reachable through the VFS, so the same
/// type serves both targets.
///
/// If a `Rename` commit fails after the old image was removed, the new image
/// stays at `<path>.tmp` and [`open`](ImageStore::open) serves it from there
/// until the next successful replace.
#[derive(Clone, Debug)]
pub struct FsImageStore {
    path: PathBuf,
    strategy: ReplaceStrategy,
    rename: RenameFn,
}

impl FsImageStore {
    /// Store at `path` using `strategy`.
    pub fn new(path: impl Into<PathBuf>, strategy: ReplaceStrategy) -> Self {
        Self {
            path: path.into(),
            strategy,
            rename: std_rename,
        }
    }

    /// Commit with `rename` instead of `std::fs::rename`.
    ///
    /// Lets a host filesystem behave like one that refuses to rename onto an
    /// existing file.
    pub fn with_rename(mut self, rename: RenameFn) -> Self {
        self.rename = rename;
        self
    }

    /// Store at the configured image path.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.image_path().as_str(), config.storage.replace)
    }

    /// Path of the image file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace strategy in use.
    pub fn strategy(&self) -> ReplaceStrategy {
        self.strategy
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn ensure_mounted(&self) -> Result<(), StorageError> {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() && !dir.is_dir() => {
                Err(StorageError::Unavailable(dir.display().to_string()))
            }
            _ => Ok(()),
        }
    }

    fn write_file(path: &Path, header: &[u8], payload: &[u8]) -> Result<(), StorageError> {
        let mut file = File::create(path).map_err(|e| match StorageError::from_write(e) {
            StorageError::Write(e) => StorageError::Open(e),
            other => other,
        })?;
        file.write_all(header).map_err(StorageError::from_write)?;
        file.write_all(payload).map_err(StorageError::from_write)?;
        file.flush().map_err(StorageError::from_write)?;
        Ok(())
    }

    fn replace_via_rename(&self, header: &[u8], payload: &[u8]) -> Result<(), StorageError> {
        let tmp = self.temp_path();
        if let Err(e) = Self::write_file(&tmp, header, payload) {
            discard(&tmp);
            return Err(e);
        }
        self.commit(&tmp)
    }

    // Until the target is removed a failure leaves the previous image in
    // place. After that the temp file is the only copy and must survive.
    fn commit(&self, tmp: &Path) -> Result<(), StorageError> {
        let first = match (self.rename)(tmp, &self.path) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        if !self.path.exists() {
            discard(tmp);
            return Err(StorageError::Write(first));
        }

        debug!("rename over existing file failed ({}), removing target", first);
        if let Err(e) = fs::remove_file(&self.path) {
            discard(tmp);
            return Err(StorageError::Write(e));
        }
        (self.rename)(tmp, &self.path).map_err(|e| {
            warn!("New image left at {}: {}", tmp.display(), e);
            StorageError::Write(e)
        })
    }
}

impl ImageStore for FsImageStore {
    type Reader = File;

    fn replace(&mut self, header: &[u8], payload: &[u8]) -> Result<(), StorageError> {
        self.ensure_mounted()?;
        let result = match self.strategy {
            ReplaceStrategy::Truncate => Self::write_file(&self.path, header, payload),
            ReplaceStrategy::Rename => self.replace_via_rename(header, payload),
        };
        if let Err(e) = &result {
            warn!("Failed to replace {}: {}", self.path.display(), e);
        }
        result
    }

    fn open(&self) -> Result<Option<File>, StorageError> {
        match open_existing(&self.path)? {
            Some(file) => Ok(Some(file)),
            None => open_existing(&self.temp_path()),
        }
    }

    fn exists(&self) -> bool {
        self.path.is_file() || self.temp_path().is_file()
    }
}

fn open_existing(path: &Path) -> Result<Option<File>, StorageError> {
    match File::open(path) {
        Ok(file) => Ok(Some(file)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::Open(e)),
    }
}

fn discard(tmp: &Path) {
    if let Err(e) = fs::remove_file(tmp) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("Could not remove {}: {}", tmp.display(), e);
        }
    }
}

/// Log whether an image from a previous boot is present.
pub fn log_existing<S: ImageStore>(store: &S, label: &str) {
    if store.exists() {
        info!("Found stored image at {}", label);
    } else {
        info!("No stored image at {} yet", label);
    }
}
