//! Crop domain — selection geometry and the interactive editor.
//!
//! External code should only use the types exported here.

mod editor;
mod region;

pub use editor::{CropConfirmation, CropEditor, CropHost, EditorState};
pub use region::{
    DisplayedImage, NormalizedRegion, PixelRegion, ScaleFactors, DEFAULT_CROP_WIDTH_PERCENT,
};

#[derive(Debug, thiserror::Error)]
pub enum CropError {
    #[error("no image is open in the crop editor")]
    NoImage,
    #[error("image has not been laid out yet")]
    NotLoaded,
    #[error("no selection to work with")]
    NoSelection,
    /// Zero-area or out-of-bounds selection.
    #[error("invalid crop region {0:?}")]
    InvalidCropRegion(PixelRegion),
    #[error("invalid display geometry {0:?}")]
    InvalidDisplay(DisplayedImage),
    #[error("invalid aspect ratio {0}")]
    InvalidAspect(f64),
    #[error("layout is for a {layout:?} image but the open image is {image:?}")]
    SizeMismatch {
        image: (u32, u32),
        layout: (u32, u32),
    },
}
