//! Scoped framebuffer acquisition.
//!
//! [`capture`] wraps [`CameraDevice::capture`] in a guard that hands the
//! frame back to the pool when it goes out of scope, whatever path the
//! caller takes out of the block.
//!
//! ```rust
//! use camsnap::capture::capture;
//! use camsnap::hal::MockCamera;
//! use camsnap::traits::{FrameBuffer, FrameSize, PixelFormat};
//!
//! let mut camera = MockCamera::new(PixelFormat::Jpeg, FrameSize::Qvga);
//! {
//!     let frame = capture(&mut camera).unwrap();
//!     assert!(!frame.is_empty());
//!     assert_eq!(frame.width(), 320);
//! }
//! assert_eq!(camera.captures(), 1);
//! assert_eq!(camera.releases(), 1);
//! ```

use core::mem::ManuallyDrop;
use core::ops::Deref;

use log::debug;

use crate::error::CaptureError;
use crate::traits::CameraDevice;

/// A frame on loan from a [`CameraDevice`].
///
/// Dereferences to the device's frame type. Dropping the guard releases the
/// frame exactly once.
pub struct CapturedFrame<'a, C: CameraDevice> {
    camera: &'a mut C,
    frame: ManuallyDrop<C::Frame>,
}

impl<C: CameraDevice> Deref for CapturedFrame<'_, C> {
    type Target = C::Frame;

    fn deref(&self) -> &Self::Target {
        &self.frame
    }
}

impl<C: CameraDevice> Drop for CapturedFrame<'_, C> {
    fn drop(&mut self) {
        // SAFETY: the frame is taken once, here, and the guard is gone after
        let frame = unsafe { ManuallyDrop::take(&mut self.frame) };
        self.camera.release(frame);
    }
}

/// Capture one frame and return it as a releasing guard.
///
/// A failed capture holds no buffer, so there is nothing to release.
pub fn capture<C: CameraDevice>(camera: &mut C) -> Result<CapturedFrame<'_, C>, CaptureError> {
    let frame = camera.capture()?;
    debug!("Captured frame");
    Ok(CapturedFrame {
        camera,
        frame: ManuallyDrop::new(frame),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::MockCamera;
    use crate::traits::{FrameBuffer, FrameSize, PixelFormat};

    #[test]
    fn guard_releases_on_drop() {
        let mut camera = MockCamera::new(PixelFormat::Grayscale, FrameSize::R96x96);
        let frame = capture(&mut camera).unwrap();
        assert_eq!(frame.len(), 96 * 96);
        drop(frame);
        assert_eq!(camera.releases(), 1);
        assert_eq!(camera.free_buffers(), camera.pool_size());
    }

    #[test]
    fn guard_releases_on_early_return() {
        fn use_frame(camera: &mut MockCamera) -> Result<usize, &'static str> {
            let frame = capture(camera).map_err(|_| "capture")?;
            if frame.len() > 10 {
                return Err("too big");
            }
            Ok(frame.len())
        }

        let mut camera = MockCamera::new(PixelFormat::Grayscale, FrameSize::R96x96);
        assert_eq!(use_frame(&mut camera), Err("too big"));
        assert_eq!(camera.captures(), 1);
        assert_eq!(camera.releases(), 1);
    }

    #[test]
    fn guard_releases_when_caller_panics() {
        let mut camera = MockCamera::new(PixelFormat::Jpeg, FrameSize::Qvga);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let frame = capture(&mut camera).unwrap();
            let first = frame.data()[0];
            assert_eq!(frame.data()[0], first);
            panic!("handler failed mid-frame");
        }));

        assert!(result.is_err());
        assert_eq!(camera.releases(), 1);
        assert_eq!(camera.free_buffers(), 1);
        assert!(capture(&mut camera).is_ok());
    }

    #[test]
    fn failed_capture_does_not_release() {
        let mut camera = MockCamera::new(PixelFormat::Jpeg, FrameSize::Qvga);
        camera.fail_next(1);
        assert_eq!(
            capture(&mut camera).err(),
            Some(CaptureError::NoFrameAvailable)
        );
        assert_eq!(camera.releases(), 0);
        assert_eq!(camera.free_buffers(), 1);
    }

    #[test]
    fn repeated_captures_reuse_single_buffer() {
        let mut camera = MockCamera::new(PixelFormat::Jpeg, FrameSize::Qvga);
        for _ in 0..5 {
            let _frame = capture(&mut camera).unwrap();
        }
        assert_eq!(camera.captures(), 5);
        assert_eq!(camera.releases(), 5);
    }
}
