//! Scan pipeline orchestration.
//!
//! capture (camera or file) → crop editor → rasterize → recognize.
//!
//! Stages run strictly in order. The editor lives behind a mutex that is
//! never held across an await, so a host may call `cancel` from another
//! task while recognition is pending; the pending result is then dropped
//! instead of being applied to a pipeline that has moved on.

use crate::capture::{
    read_image_file, CameraDevice, CaptureError, CaptureHost, CaptureOutcome, CaptureSurface,
    CapturedImage,
};
use crate::crop::{
    CropEditor, CropError, DisplayedImage, EditorState, NormalizedRegion, PixelRegion,
    ScaleFactors,
};
use crate::ocr::{RecognitionBackend, RecognitionError, RecognitionSubmitter};
use crate::raster::{self, RasterOptions, RasterizationError};
use crate::settings::SettingsError;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Capturing,
    Cropping,
    Recognizing,
    Done,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Crop(#[from] CropError),
    #[error(transparent)]
    Rasterization(#[from] RasterizationError),
    #[error(transparent)]
    Recognition(#[from] RecognitionError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("cannot {action} while the scan is {stage:?}")]
    WrongStage { action: &'static str, stage: Stage },
    #[error("scan was cancelled before the result arrived")]
    Discarded,
    #[error("pipeline state lock poisoned")]
    Poisoned,
}

/// A finished scan.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub text: String,
    /// Selection in displayed pixels, as confirmed.
    pub region: PixelRegion,
    pub scale: ScaleFactors,
    /// Size of the bitmap that was sent, in native pixels.
    pub dimensions: (u32, u32),
    /// Confirmation to result.
    pub elapsed: Duration,
}

struct State {
    stage: Stage,
    editor: CropEditor,
    /// Bumped by `cancel`; async work started under an older generation is
    /// discarded when it completes.
    generation: u64,
}

pub struct ScanPipeline<B> {
    state: Mutex<State>,
    submitter: RecognitionSubmitter<B>,
    options: RasterOptions,
}

/// Collects the snapshot from a capture surface.
#[derive(Default)]
struct Snapshot {
    image: Option<CapturedImage>,
}

impl CaptureHost for Snapshot {
    fn on_capture(&mut self, image: CapturedImage) {
        self.image = Some(image);
    }

    fn on_close(&mut self) {}
}

impl<B: RecognitionBackend> ScanPipeline<B> {
    pub fn new(backend: B, options: RasterOptions) -> Self {
        Self {
            state: Mutex::new(State {
                stage: Stage::Idle,
                editor: CropEditor::new(),
                generation: 0,
            }),
            submitter: RecognitionSubmitter::new(backend),
            options,
        }
    }

    pub fn submitter(&self) -> &RecognitionSubmitter<B> {
        &self.submitter
    }

    pub fn stage(&self) -> Result<Stage, PipelineError> {
        Ok(self.lock()?.stage)
    }

    pub fn editor_state(&self) -> Result<EditorState, PipelineError> {
        Ok(self.lock()?.editor.state())
    }

    pub fn completed_region(&self) -> Result<Option<NormalizedRegion>, PipelineError> {
        Ok(self.lock()?.editor.completed_region())
    }

    /// Native size of the image open in the editor.
    pub fn image_dimensions(&self) -> Result<Option<(u32, u32)>, PipelineError> {
        Ok(self.lock()?.editor.image().map(CapturedImage::dimensions))
    }

    // ── Capture ────────────────────────────────────────────────────

    /// Read an image file and open it in the crop editor.
    pub async fn load_file(&self, path: &Path) -> Result<(), PipelineError> {
        let generation = self.begin_capture("load a file")?;
        let result = read_image_file(path).await;
        self.finish_capture(generation, result)
    }

    /// Use an image the host already holds (e.g. a data URL it received).
    pub fn load_image(&self, image: CapturedImage) -> Result<(), PipelineError> {
        let generation = self.begin_capture("load an image")?;
        self.finish_capture(generation, Ok(image))
    }

    /// Open the camera, wait for a live frame, snapshot it, and open it in
    /// the crop editor. The stream is released before this returns, on
    /// every path.
    pub async fn capture_from_camera(
        &self,
        device: &mut dyn CameraDevice,
        ready_timeout: Duration,
    ) -> Result<(), PipelineError> {
        let generation = self.begin_capture("open the camera")?;
        let result = Self::snapshot(device, ready_timeout).await;
        self.finish_capture(generation, result)
    }

    async fn snapshot(
        device: &mut dyn CameraDevice,
        ready_timeout: Duration,
    ) -> Result<CapturedImage, CaptureError> {
        let mut surface = CaptureSurface::open(device, Snapshot::default())?;
        if let Err(e) = surface.wait_until_ready(ready_timeout).await {
            surface.close();
            return Err(e);
        }
        let outcome = surface.capture();
        let host = surface.close();
        match outcome? {
            CaptureOutcome::Captured => host.image.ok_or_else(|| {
                CaptureError::CameraUnavailable("snapshot produced no image".to_string())
            }),
            CaptureOutcome::NotReady => Err(CaptureError::CameraUnavailable(
                "stream went inactive before the snapshot".to_string(),
            )),
        }
    }

    fn begin_capture(&self, action: &'static str) -> Result<u64, PipelineError> {
        let mut state = self.lock()?;
        match state.stage {
            Stage::Idle | Stage::Cropping | Stage::Done => {
                state.editor.cancel();
                state.stage = Stage::Capturing;
                Ok(state.generation)
            }
            stage => Err(PipelineError::WrongStage { action, stage }),
        }
    }

    fn finish_capture(
        &self,
        generation: u64,
        result: Result<CapturedImage, CaptureError>,
    ) -> Result<(), PipelineError> {
        let mut state = self.lock()?;
        if state.generation != generation {
            log::info!("[PIPELINE] Capture finished after cancel — discarding");
            return Err(PipelineError::Discarded);
        }
        match result {
            Ok(image) => {
                state.editor.open(image);
                state.stage = Stage::Cropping;
                Ok(())
            }
            Err(e) => {
                log::warn!("[PIPELINE] Capture failed: {}", e);
                state.stage = Stage::Idle;
                Err(e.into())
            }
        }
    }

    // ── Crop ───────────────────────────────────────────────────────

    /// The host laid out the image; seeds the default selection.
    pub fn on_image_load(
        &self,
        display: DisplayedImage,
    ) -> Result<NormalizedRegion, PipelineError> {
        let mut state = self.cropping("lay out the image")?;
        Ok(state.editor.on_image_load(display)?)
    }

    pub fn relayout(&self, display: DisplayedImage) -> Result<(), PipelineError> {
        let mut state = self.cropping("re-layout the image")?;
        Ok(state.editor.relayout(display)?)
    }

    pub fn update_crop(&self, region: NormalizedRegion) -> Result<(), PipelineError> {
        let mut state = self.cropping("adjust the selection")?;
        Ok(state.editor.on_change(region)?)
    }

    pub fn complete_crop(&self, region: NormalizedRegion) -> Result<(), PipelineError> {
        let mut state = self.cropping("adjust the selection")?;
        Ok(state.editor.on_complete(region)?)
    }

    /// Confirm the selection: rasterize it and run recognition.
    ///
    /// `Ok(None)` means the confirmation was ignored (no usable selection)
    /// and nothing changed. On a rasterization or recognition error the
    /// editor stays confirmed so the user can confirm again or re-crop.
    pub async fn confirm_crop(&self) -> Result<Option<ScanOutcome>, PipelineError> {
        let start = Instant::now();
        let (rasterized, region, scale, generation) = {
            let mut state = self.cropping("confirm the crop")?;
            let confirmation = match state.editor.confirm() {
                Some(c) => c,
                None => return Ok(None),
            };
            let rasterized = raster::rasterize(
                &confirmation.image,
                &confirmation.region,
                confirmation.scale,
                &self.options,
            )?;
            state.stage = Stage::Recognizing;
            (
                rasterized,
                confirmation.region,
                confirmation.scale,
                state.generation,
            )
        };
        let dimensions = rasterized.dimensions();

        let result = self.submitter.submit(&rasterized).await;
        drop(rasterized);

        let mut state = self.lock()?;
        if state.generation != generation {
            log::info!("[PIPELINE] Recognition finished after cancel — discarding result");
            return Err(PipelineError::Discarded);
        }
        match result {
            Ok(text) => {
                state.editor.cancel();
                state.stage = Stage::Done;
                let elapsed = start.elapsed();
                log::info!(
                    "[PIPELINE] Total (confirm to text): {}ms",
                    elapsed.as_millis()
                );
                Ok(Some(ScanOutcome {
                    text,
                    region,
                    scale,
                    dimensions,
                    elapsed,
                }))
            }
            Err(e) => {
                state.stage = Stage::Cropping;
                Err(e.into())
            }
        }
    }

    /// Abandon the scan from any stage. Camera streams are already scoped to
    /// the capture call; this drops the image and any pending result.
    pub fn cancel(&self) -> Result<(), PipelineError> {
        let mut state = self.lock()?;
        state.editor.cancel();
        state.stage = Stage::Idle;
        state.generation += 1;
        log::debug!("[PIPELINE] Cancelled (generation {})", state.generation);
        Ok(())
    }

    fn cropping(&self, action: &'static str) -> Result<MutexGuard<'_, State>, PipelineError> {
        let state = self.lock()?;
        if state.stage != Stage::Cropping {
            return Err(PipelineError::WrongStage {
                action,
                stage: state.stage,
            });
        }
        Ok(state)
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, PipelineError> {
        self.state.lock().map_err(|_| PipelineError::Poisoned)
    }
}
