//! Crop editor state machine.
//!
//! ```text
//! Idle ──on_image_load──▶ ImageLoaded ──on_change/on_complete──▶ Selecting ─┐
//!                                                                  ▲  │     │
//!                                                                  └──┘     │
//!                              Confirmed ◀──────────confirm─────────────────┘
//! cancel: any state ──▶ Idle (image discarded)
//! ```
//!
//! Live drag values are kept apart from the region latched when an
//! interaction ends; only the latched one is ever confirmed.

use super::region::{DisplayedImage, NormalizedRegion, PixelRegion, ScaleFactors};
use super::CropError;
use crate::capture::CapturedImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorState {
    Idle,
    ImageLoaded,
    Selecting,
    Confirmed,
}

/// Everything the rasterizer needs, captured at the instant of confirmation.
#[derive(Debug, Clone)]
pub struct CropConfirmation {
    pub image: CapturedImage,
    pub region: PixelRegion,
    pub scale: ScaleFactors,
}

/// Receives the outcome of the crop surface.
pub trait CropHost {
    fn on_confirm(&mut self, region: PixelRegion, scale: ScaleFactors);
    fn on_close(&mut self);
}

#[derive(Debug)]
pub struct CropEditor {
    state: EditorState,
    image: Option<CapturedImage>,
    display: Option<DisplayedImage>,
    live: Option<NormalizedRegion>,
    completed: Option<NormalizedRegion>,
    /// Fixed selection aspect (width / height). `None` = free-form, with the
    /// default selection following the image's own aspect.
    aspect: Option<f64>,
}

impl Default for CropEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl CropEditor {
    pub fn new() -> Self {
        Self {
            state: EditorState::Idle,
            image: None,
            display: None,
            live: None,
            completed: None,
            aspect: None,
        }
    }

    pub fn with_aspect(mut self, aspect: f64) -> Self {
        self.aspect = Some(aspect);
        self
    }

    pub fn state(&self) -> EditorState {
        self.state
    }

    pub fn image(&self) -> Option<&CapturedImage> {
        self.image.as_ref()
    }

    pub fn display(&self) -> Option<&DisplayedImage> {
        self.display.as_ref()
    }

    pub fn live_region(&self) -> Option<NormalizedRegion> {
        self.live
    }

    pub fn completed_region(&self) -> Option<NormalizedRegion> {
        self.completed
    }

    /// Hand the editor a new image. Any previous selection is dropped; the
    /// editor stays `Idle` until the image has been laid out.
    pub fn open(&mut self, image: CapturedImage) {
        self.reset();
        self.image = Some(image);
    }

    /// The image has been laid out: record its geometry and seed the default
    /// selection (centered, 90% of the displayed width).
    pub fn on_image_load(
        &mut self,
        display: DisplayedImage,
    ) -> Result<NormalizedRegion, CropError> {
        let image = self.image.as_ref().ok_or(CropError::NoImage)?;
        check_natural_size(image, &display)?;

        let aspect = self.aspect.unwrap_or_else(|| display.intrinsic_aspect());
        let initial = NormalizedRegion::centered(&display, aspect)?;
        log::debug!(
            "[CROP] Image loaded {}x{} shown at {:.0}x{:.0}; default selection {:?}",
            display.natural_width,
            display.natural_height,
            display.displayed_width,
            display.displayed_height,
            initial
        );

        self.display = Some(display);
        self.live = Some(initial);
        self.completed = Some(initial);
        self.state = EditorState::ImageLoaded;
        Ok(initial)
    }

    /// Layout changed (window resize, zoom). Normalized selections are
    /// unaffected; the new geometry is used at the next confirmation.
    pub fn relayout(&mut self, display: DisplayedImage) -> Result<(), CropError> {
        let image = self.image.as_ref().ok_or(CropError::NoImage)?;
        check_natural_size(image, &display)?;
        display.validate()?;
        self.display = Some(display);
        Ok(())
    }

    /// Continuous update while the user drags.
    ///
    /// Regions are kept as given. One that leaves the image is refused at
    /// confirmation rather than moved back inside it.
    pub fn on_change(&mut self, region: NormalizedRegion) -> Result<(), CropError> {
        self.require_loaded()?;
        self.live = Some(region);
        self.state = EditorState::Selecting;
        Ok(())
    }

    /// The drag ended; latch the region.
    pub fn on_complete(&mut self, region: NormalizedRegion) -> Result<(), CropError> {
        self.require_loaded()?;
        self.live = Some(region);
        self.completed = Some(region);
        self.state = EditorState::Selecting;
        Ok(())
    }

    /// Shift the selection by `dx`, `dy` percent, staying inside the image.
    pub fn move_by(&mut self, dx: f64, dy: f64) -> Result<NormalizedRegion, CropError> {
        let current = self.current_region()?;
        let moved = NormalizedRegion::new(
            current.x + dx,
            current.y + dy,
            current.width,
            current.height,
        )
        .clamped();
        self.on_complete(moved)?;
        Ok(moved)
    }

    /// Resize the selection about its origin, shrinking to fit the image.
    ///
    /// With a fixed aspect the height follows the width and `height` is
    /// ignored; if the result would overflow, both sides shrink together.
    pub fn resize_to(&mut self, width: f64, height: f64) -> Result<NormalizedRegion, CropError> {
        let current = self.current_region()?;
        let max_width = (100.0 - current.x).max(0.0);
        let max_height = (100.0 - current.y).max(0.0);
        let (width, height) = match (self.aspect, self.display) {
            (Some(aspect), Some(display)) => {
                // Percent of height per percent of width at this aspect.
                let k = display.displayed_width / aspect / display.displayed_height;
                let width = width.max(0.0).min(max_width).min(max_height / k);
                (width, width * k)
            }
            _ => (width.clamp(0.0, max_width), height.clamp(0.0, max_height)),
        };
        let resized = NormalizedRegion::new(current.x, current.y, width, height);
        self.on_complete(resized)?;
        Ok(resized)
    }

    /// Convert the latched selection to pixels with the scale factors of
    /// the current layout.
    ///
    /// Returns `None` and changes nothing when there is no latched selection,
    /// it covers less than a pixel on either axis, or it leaves the image.
    pub fn confirm(&mut self) -> Option<CropConfirmation> {
        let (image, display, completed) = match (&self.image, &self.display, self.completed) {
            (Some(image), Some(display), Some(completed)) => (image, display, completed),
            _ => {
                log::debug!("[CROP] Confirm ignored — no completed selection");
                return None;
            }
        };

        let region = completed.to_pixels(display);
        if let Err(e) = region.validate(display) {
            log::debug!("[CROP] Confirm ignored — {}", e);
            return None;
        }
        let scale = match display.scale_factors() {
            Ok(scale) => scale,
            Err(e) => {
                log::debug!("[CROP] Confirm ignored — {}", e);
                return None;
            }
        };

        let confirmation = CropConfirmation {
            image: image.clone(),
            region,
            scale,
        };
        self.state = EditorState::Confirmed;
        log::info!(
            "[CROP] Confirmed {:.0}x{:.0} at ({:.0},{:.0}), scale {:.3}x{:.3}",
            region.width,
            region.height,
            region.x,
            region.y,
            scale.scale_x,
            scale.scale_y
        );
        Some(confirmation)
    }

    /// `confirm`, reporting to a host. Returns the confirmation so the caller
    /// can go on to rasterize it.
    pub fn confirm_with(&mut self, host: &mut dyn CropHost) -> Option<CropConfirmation> {
        let confirmation = self.confirm()?;
        host.on_confirm(confirmation.region, confirmation.scale);
        Some(confirmation)
    }

    /// Back to `Idle`, discarding the image and any selection.
    pub fn cancel(&mut self) {
        if self.image.is_some() {
            log::debug!("[CROP] Cancelled from {:?}", self.state);
        }
        self.reset();
    }

    pub fn close_with(&mut self, host: &mut dyn CropHost) {
        self.cancel();
        host.on_close();
    }

    fn require_loaded(&self) -> Result<(), CropError> {
        if self.state == EditorState::Idle || self.display.is_none() {
            return Err(CropError::NotLoaded);
        }
        Ok(())
    }

    fn current_region(&self) -> Result<NormalizedRegion, CropError> {
        self.require_loaded()?;
        self.completed.or(self.live).ok_or(CropError::NoSelection)
    }

    fn reset(&mut self) {
        self.state = EditorState::Idle;
        self.image = None;
        self.display = None;
        self.live = None;
        self.completed = None;
    }
}

fn check_natural_size(image: &CapturedImage, display: &DisplayedImage) -> Result<(), CropError> {
    let natural = (display.natural_width, display.natural_height);
    if natural != image.dimensions() {
        return Err(CropError::SizeMismatch {
            image: image.dimensions(),
            layout: natural,
        });
    }
    Ok(())
}
