//! Crop geometry — normalized and pixel rectangles, scale factors.
//!
//! Normalized regions are percentages (0–100) of the displayed image, so the
//! selection survives zoom and re-layout. Pixel regions are in displayed
//! pixels; `ScaleFactors` map those onto the native bitmap.

use super::CropError;
use serde::{Deserialize, Serialize};

/// Fraction of the displayed width the default selection covers.
pub const DEFAULT_CROP_WIDTH_PERCENT: f64 = 90.0;

/// Selection rectangle as percentages of the displayed image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl NormalizedRegion {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Pull the rectangle inside `[0, 100]` on both axes.
    ///
    /// Size is clamped first, then the origin, so an oversized drag keeps as
    /// much of its area as fits.
    pub fn clamped(self) -> Self {
        let width = finite_or_zero(self.width).clamp(0.0, 100.0);
        let height = finite_or_zero(self.height).clamp(0.0, 100.0);
        let x = finite_or_zero(self.x).clamp(0.0, 100.0 - width);
        let y = finite_or_zero(self.y).clamp(0.0, 100.0 - height);
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Convert to displayed-pixel units.
    pub fn to_pixels(&self, display: &DisplayedImage) -> PixelRegion {
        PixelRegion {
            x: self.x * display.displayed_width / 100.0,
            y: self.y * display.displayed_height / 100.0,
            width: self.width * display.displayed_width / 100.0,
            height: self.height * display.displayed_height / 100.0,
        }
    }

    /// Centered selection covering 90% of the displayed width with the given
    /// aspect ratio (width / height), shrunk to fit if it would overflow
    /// vertically.
    pub fn centered(display: &DisplayedImage, aspect: f64) -> Result<Self, CropError> {
        display.validate()?;
        if !(aspect.is_finite() && aspect > 0.0) {
            return Err(CropError::InvalidAspect(aspect));
        }

        let mut width_px = display.displayed_width * DEFAULT_CROP_WIDTH_PERCENT / 100.0;
        let mut height_px = width_px / aspect;
        if height_px > display.displayed_height {
            height_px = display.displayed_height;
            width_px = height_px * aspect;
        }

        let width = width_px / display.displayed_width * 100.0;
        let height = height_px / display.displayed_height * 100.0;
        Ok(Self {
            x: (100.0 - width) / 2.0,
            y: (100.0 - height) / 2.0,
            width,
            height,
        })
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Selection rectangle in displayed-pixel units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PixelRegion {
    /// A region whose width or height rounds to zero pixels.
    pub fn is_empty(&self) -> bool {
        self.width.round() < 1.0 || self.height.round() < 1.0
    }

    /// Check the region invariants against the displayed bounds.
    ///
    /// Half a pixel of slack absorbs percentage round-off at the far edges.
    pub fn validate(&self, display: &DisplayedImage) -> Result<(), CropError> {
        const SLACK: f64 = 0.5;
        let finite = [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.is_empty() {
            return Err(CropError::InvalidCropRegion(*self));
        }
        if self.x < 0.0
            || self.y < 0.0
            || self.x + self.width > display.displayed_width + SLACK
            || self.y + self.height > display.displayed_height + SLACK
        {
            return Err(CropError::InvalidCropRegion(*self));
        }
        Ok(())
    }
}

/// Native / displayed ratio on each axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleFactors {
    pub scale_x: f64,
    pub scale_y: f64,
}

impl ScaleFactors {
    pub const IDENTITY: ScaleFactors = ScaleFactors {
        scale_x: 1.0,
        scale_y: 1.0,
    };
}

/// How the image is currently laid out on screen.
///
/// Must be re-read whenever the image is resized or reloaded; scale factors
/// derived from a stale layout crop the wrong pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayedImage {
    pub natural_width: u32,
    pub natural_height: u32,
    pub displayed_width: f64,
    pub displayed_height: f64,
}

impl DisplayedImage {
    pub fn new(natural: (u32, u32), displayed: (f64, f64)) -> Self {
        Self {
            natural_width: natural.0,
            natural_height: natural.1,
            displayed_width: displayed.0,
            displayed_height: displayed.1,
        }
    }

    /// Image shown at its native size.
    pub fn native(natural: (u32, u32)) -> Self {
        Self::new(natural, (natural.0 as f64, natural.1 as f64))
    }

    pub fn validate(&self) -> Result<(), CropError> {
        let ok = self.natural_width > 0
            && self.natural_height > 0
            && self.displayed_width.is_finite()
            && self.displayed_height.is_finite()
            && self.displayed_width > 0.0
            && self.displayed_height > 0.0;
        if ok {
            Ok(())
        } else {
            Err(CropError::InvalidDisplay(*self))
        }
    }

    /// Intrinsic aspect ratio (native width / native height).
    pub fn intrinsic_aspect(&self) -> f64 {
        self.natural_width as f64 / self.natural_height as f64
    }

    pub fn scale_factors(&self) -> Result<ScaleFactors, CropError> {
        self.validate()?;
        Ok(ScaleFactors {
            scale_x: self.natural_width as f64 / self.displayed_width,
            scale_y: self.natural_height as f64 / self.displayed_height,
        })
    }
}
