//! Camera source — scoped video stream plus the capture surface around it.
//!
//! A `CameraSession` owns the open stream and stops it when dropped, so a
//! stream can never outlive the surface that opened it, whichever way the
//! surface goes away (snapshot, cancel, error, or simply being dropped).

use super::{CaptureError, CapturedImage};
use image::DynamicImage;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// An open video stream.
pub trait CameraStream: Send {
    /// True once the stream is delivering real frames.
    fn is_active(&self) -> bool;
    /// Current frame, if one is available.
    fn grab_frame(&mut self) -> Option<DynamicImage>;
    /// Stop the stream and release the device. Must be idempotent.
    fn stop(&mut self);
}

/// Something that can open a video stream.
pub trait CameraDevice: Send {
    fn open(&mut self) -> Result<Box<dyn CameraStream>, CaptureError>;
}

/// Guaranteed-release wrapper around an open stream.
pub struct CameraSession {
    stream: Option<Box<dyn CameraStream>>,
}

impl CameraSession {
    pub fn acquire(device: &mut dyn CameraDevice) -> Result<Self, CaptureError> {
        let stream = device.open()?;
        log::info!("[CAPTURE] Camera stream acquired");
        Ok(Self {
            stream: Some(stream),
        })
    }

    pub fn is_active(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| s.is_active())
    }

    pub fn grab_frame(&mut self) -> Option<DynamicImage> {
        self.stream.as_mut()?.grab_frame()
    }

    pub fn is_released(&self) -> bool {
        self.stream.is_none()
    }

    /// Stop the stream now. Safe to call more than once.
    pub fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            log::info!("[CAPTURE] Camera stream released");
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.release();
    }
}

/// Receives the result of a capture surface.
pub trait CaptureHost {
    fn on_capture(&mut self, image: CapturedImage);
    fn on_close(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    /// Stream open, no active frame yet. The capture control is disabled.
    Starting,
    Ready,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    Captured,
    /// Trigger ignored: no active frame to snapshot.
    NotReady,
}

/// The camera capture surface: open stream, readiness signal, snapshot.
pub struct CaptureSurface<H: CaptureHost> {
    session: CameraSession,
    host: H,
    state: SurfaceState,
}

impl<H: CaptureHost> CaptureSurface<H> {
    /// Open the surface. The stream is acquired here and lives exactly as
    /// long as the surface stays open.
    pub fn open(device: &mut dyn CameraDevice, host: H) -> Result<Self, CaptureError> {
        let session = CameraSession::acquire(device)?;
        Ok(Self {
            session,
            host,
            state: SurfaceState::Starting,
        })
    }

    pub fn state(&self) -> SurfaceState {
        self.state
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn session(&self) -> &CameraSession {
        &self.session
    }

    /// Re-check the stream and update the readiness signal.
    pub fn poll_ready(&mut self) -> bool {
        if self.state == SurfaceState::Closed {
            return false;
        }
        self.state = if self.session.is_active() {
            SurfaceState::Ready
        } else {
            SurfaceState::Starting
        };
        self.state == SurfaceState::Ready
    }

    pub fn is_ready(&self) -> bool {
        self.state == SurfaceState::Ready
    }

    /// Wait for the first active frame, polling the stream.
    ///
    /// Gives up with `CameraUnavailable` after `timeout`. The surface stays
    /// open on timeout; the caller decides whether to keep waiting or close.
    pub async fn wait_until_ready(&mut self, timeout: Duration) -> Result<(), CaptureError> {
        let start = Instant::now();
        loop {
            if self.poll_ready() {
                log::info!(
                    "[CAPTURE] Camera ready after {}ms",
                    start.elapsed().as_millis()
                );
                return Ok(());
            }
            if self.state == SurfaceState::Closed {
                return Err(CaptureError::CameraUnavailable(
                    "capture surface is closed".to_string(),
                ));
            }
            if start.elapsed() >= timeout {
                return Err(CaptureError::CameraUnavailable(format!(
                    "no active frame after {}ms",
                    timeout.as_millis()
                )));
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Snapshot the current frame.
    ///
    /// Refused with `NotReady` (and nothing else happens) while the stream
    /// has no active frame. On success the stream is released and the
    /// surface dismissed before the host sees the image.
    pub fn capture(&mut self) -> Result<CaptureOutcome, CaptureError> {
        if !self.poll_ready() {
            log::debug!("[CAPTURE] Snapshot ignored — camera not ready");
            return Ok(CaptureOutcome::NotReady);
        }
        let frame = match self.session.grab_frame() {
            Some(frame) => frame,
            None => {
                log::debug!("[CAPTURE] Snapshot ignored — stream returned no frame");
                return Ok(CaptureOutcome::NotReady);
            }
        };

        let encoded = CapturedImage::from_frame(frame);
        self.shutdown();
        let image = encoded?;
        let (w, h) = image.dimensions();
        log::info!("[CAPTURE] Snapshot taken: {}x{}", w, h);
        self.host.on_capture(image);
        Ok(CaptureOutcome::Captured)
    }

    /// Close the surface without (further) capture and hand back the host.
    pub fn close(mut self) -> H {
        self.shutdown();
        self.host
    }

    fn shutdown(&mut self) {
        if self.state == SurfaceState::Closed {
            return;
        }
        self.session.release();
        self.state = SurfaceState::Closed;
        self.host.on_close();
    }
}

/// A camera that serves one fixed frame.
///
/// Stands in for a video device on headless hosts and in tests. The stream
/// reports itself active once `warmup` has elapsed since it was opened, the
/// way a real sensor delivers black frames for a moment after start-up.
#[derive(Clone)]
pub struct StillFrameCamera {
    frame: DynamicImage,
    warmup: Duration,
    open_streams: Arc<AtomicUsize>,
}

impl StillFrameCamera {
    pub fn new(frame: DynamicImage) -> Self {
        Self {
            frame,
            warmup: Duration::ZERO,
            open_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    /// Number of streams opened from this device and not yet stopped.
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }
}

impl CameraDevice for StillFrameCamera {
    fn open(&mut self) -> Result<Box<dyn CameraStream>, CaptureError> {
        self.open_streams.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StillFrameStream {
            frame: self.frame.clone(),
            active_at: Instant::now() + self.warmup,
            open_streams: Arc::clone(&self.open_streams),
            stopped: false,
        }))
    }
}

struct StillFrameStream {
    frame: DynamicImage,
    active_at: Instant,
    open_streams: Arc<AtomicUsize>,
    stopped: bool,
}

impl CameraStream for StillFrameStream {
    fn is_active(&self) -> bool {
        !self.stopped && Instant::now() >= self.active_at
    }

    fn grab_frame(&mut self) -> Option<DynamicImage> {
        self.is_active().then(|| self.frame.clone())
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.open_streams.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for StillFrameStream {
    fn drop(&mut self) {
        self.stop();
    }
}
