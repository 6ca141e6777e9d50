//! The snapshot request handler, independent of any HTTP stack.
//!
//! [`SnapshotService::serve`] runs the whole per-request pipeline:
//!
//! ```text
//! capture ──▶ store ──▶ release frame ──▶ open file ──▶ 200 + chunks ──▶ finish
//!    │          │                            │
//!    └─ 500     └─ 500                       └─ 404 (absent) / 500 (error)
//! ```
//!
//! The camera and the store sit behind one mutex, so concurrent requests
//! run the sequence one at a time. Each request captures a fresh frame.
//!
//! # Example
//!
//! ```rust
//! use camsnap::delivery::{ServeOutcome, SnapshotService};
//! use camsnap::hal::{MemoryImageStore, MockCamera, MockResponder};
//! use camsnap::traits::{FrameSize, PixelFormat};
//!
//! let camera = MockCamera::new(PixelFormat::Grayscale, FrameSize::R96x96);
//! let service = SnapshotService::new(camera, MemoryImageStore::new(), 1024);
//!
//! let mut responder = MockResponder::new();
//! let outcome = service.serve(&mut responder).unwrap();
//!
//! assert_eq!(outcome, ServeOutcome::Served { bytes: 13 + 9216, chunks: 10 });
//! assert_eq!(responder.status(), Some(200));
//! assert!(responder.finished());
//! ```

use std::io::{ErrorKind, Read};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, error, info, warn};

use crate::capture::capture;
use crate::persistence::store_frame;
use crate::traits::{respond_text, CameraDevice, ChunkSink, ImageStore, Responder};

/// Default response chunk size.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// How a request ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServeOutcome {
    /// Image streamed with status 200.
    Served {
        /// Body bytes sent
        bytes: usize,
        /// Non-empty chunks sent
        chunks: usize,
    },
    /// Capture failed, answered 500.
    CaptureFailed,
    /// Storing the frame failed, answered 500.
    StoreFailed,
    /// No stored image, answered 404.
    NotFound,
    /// Opening or reading the stored image failed, answered 500 if headers
    /// were not yet sent.
    ReadFailed,
}

impl ServeOutcome {
    /// HTTP status the request was answered with.
    pub fn status(&self) -> u16 {
        match self {
            ServeOutcome::Served { .. } => 200,
            ServeOutcome::NotFound => 404,
            _ => 500,
        }
    }
}

struct Pipeline<C, S> {
    camera: C,
    store: S,
}

/// Capture, persist and stream, one request at a time.
pub struct SnapshotService<C, S> {
    pipeline: Mutex<Pipeline<C, S>>,
    chunk_size: usize,
}

impl<C, S> SnapshotService<C, S>
where
    C: CameraDevice,
    S: ImageStore,
{
    /// Wrap a camera and a store.
    pub fn new(camera: C, store: S, chunk_size: usize) -> Self {
        Self {
            pipeline: Mutex::new(Pipeline { camera, store }),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Configured chunk size.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Run `f` with the camera, holding the pipeline lock.
    pub fn with_camera<R>(&self, f: impl FnOnce(&mut C) -> R) -> R {
        f(&mut self.lock().camera)
    }

    /// Run `f` with the store, holding the pipeline lock.
    pub fn with_store<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.lock().store)
    }

    fn lock(&self) -> MutexGuard<'_, Pipeline<C, S>> {
        self.pipeline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle one snapshot request.
    ///
    /// Pipeline failures are answered on `responder` and reported in the
    /// returned [`ServeOutcome`]. Only transport errors come back as `Err`.
    pub fn serve<R: Responder>(&self, responder: R) -> Result<ServeOutcome, R::Error> {
        let mut guard = self.lock();
        let Pipeline { camera, store } = &mut *guard;

        let content_type = {
            let frame = match capture(camera) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Camera capture failed: {}", e);
                    respond_text(responder, 500, "Camera capture failed")?;
                    return Ok(ServeOutcome::CaptureFailed);
                }
            };

            match store_frame(store, &*frame) {
                Ok(stored) => stored.content_type(),
                Err(e) => {
                    error!("Failed to store image: {}", e);
                    drop(frame);
                    respond_text(responder, 500, "Failed to store image")?;
                    return Ok(ServeOutcome::StoreFailed);
                }
            }
        };

        let mut reader = match store.open() {
            Ok(Some(reader)) => reader,
            Ok(None) => {
                warn!("Stored image not found");
                respond_text(responder, 404, "Image not found")?;
                return Ok(ServeOutcome::NotFound);
            }
            Err(e) => {
                error!("Failed to open stored image: {}", e);
                respond_text(responder, 500, "Failed to open image")?;
                return Ok(ServeOutcome::ReadFailed);
            }
        };

        let mut body = responder.begin(200, content_type)?;
        let mut buf = vec![0u8; self.chunk_size];
        let mut bytes = 0;
        let mut chunks = 0;
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    // Headers are out; all we can do is end the body early
                    error!("Read failed after {} bytes: {}", bytes, e);
                    body.finish()?;
                    return Ok(ServeOutcome::ReadFailed);
                }
            };
            body.send_chunk(&buf[..n])?;
            bytes += n;
            chunks += 1;
            debug!("Sent chunk {} ({} bytes)", chunks, n);
        }
        body.finish()?;

        info!("Served image: {} bytes in {} chunks", bytes, chunks);
        Ok(ServeOutcome::Served { bytes, chunks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::{MemoryImageStore, MockCamera, MockResponder};
    use crate::traits::{FrameSize, PixelFormat};

    fn service(format: PixelFormat, size: FrameSize) -> SnapshotService<MockCamera, MemoryImageStore> {
        SnapshotService::new(MockCamera::new(format, size), MemoryImageStore::new(), DEFAULT_CHUNK_SIZE)
    }

    #[test]
    fn serves_jpeg_in_chunks() {
        let service = service(PixelFormat::Jpeg, FrameSize::Qvga);
        let mut responder = MockResponder::new();
        let outcome = service.serve(&mut responder).unwrap();

        let ServeOutcome::Served { bytes, chunks } = outcome else {
            panic!("expected Served, got {:?}", outcome);
        };
        assert_eq!(responder.content_type(), Some("image/jpeg"));
        assert_eq!(responder.body().len(), bytes);
        assert_eq!(chunks, bytes.div_ceil(1024));
        assert!(responder.chunks().iter().all(|c| c.len() <= 1024));
        assert_eq!(&responder.body()[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn capture_failure_is_500_and_pool_intact() {
        let service = service(PixelFormat::Jpeg, FrameSize::Qvga);
        service.with_camera(|c| c.fail_next(1));

        let mut responder = MockResponder::new();
        assert_eq!(service.serve(&mut responder).unwrap(), ServeOutcome::CaptureFailed);
        assert_eq!(responder.status(), Some(500));
        assert!(responder.finished());
        service.with_camera(|c| assert_eq!(c.free_buffers(), c.pool_size()));
    }

    #[test]
    fn store_failure_releases_frame() {
        let service = service(PixelFormat::Jpeg, FrameSize::Qvga);
        service.with_store(|s| s.set_fail_writes(true));

        let mut responder = MockResponder::new();
        assert_eq!(service.serve(&mut responder).unwrap(), ServeOutcome::StoreFailed);
        assert_eq!(responder.status(), Some(500));
        service.with_camera(|c| {
            assert_eq!(c.captures(), 1);
            assert_eq!(c.releases(), 1);
        });
    }

    #[test]
    fn missing_image_is_404() {
        let service = service(PixelFormat::Jpeg, FrameSize::Qvga);
        service.with_store(|s| s.set_drop_writes(true));

        let mut responder = MockResponder::new();
        assert_eq!(service.serve(&mut responder).unwrap(), ServeOutcome::NotFound);
        assert_eq!(responder.status(), Some(404));
    }

    #[test]
    fn rgb565_served_as_bmp() {
        let service = service(PixelFormat::Rgb565, FrameSize::R96x96);
        let mut responder = MockResponder::new();
        service.serve(&mut responder).unwrap();
        assert_eq!(responder.content_type(), Some("image/bmp"));
        assert_eq!(&responder.body()[..2], b"BM");
    }

    #[test]
    fn outcome_status_codes() {
        assert_eq!(ServeOutcome::Served { bytes: 1, chunks: 1 }.status(), 200);
        assert_eq!(ServeOutcome::NotFound.status(), 404);
        assert_eq!(ServeOutcome::CaptureFailed.status(), 500);
        assert_eq!(ServeOutcome::ReadFailed.status(), 500);
    }
}
