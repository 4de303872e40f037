//! Capture domain — public API.
//!
//! This module owns everything that produces the image a scan starts from:
//! a live camera frame or a file the user picked. Both paths end in the same
//! `CapturedImage`, so nothing downstream cares where the pixels came from.

mod camera;
mod data_url;
mod file;

pub use camera::{
    CameraDevice, CameraSession, CameraStream, CaptureHost, CaptureOutcome, CaptureSurface,
    StillFrameCamera, SurfaceState,
};
pub use data_url::{decode_data_url, encode_data_url};
pub use file::read_image_file;

use image::{DynamicImage, ImageFormat};
use std::sync::Arc;

/// Errors raised while acquiring or decoding a captured image.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The camera stream never reported an active frame.
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),
    #[error("failed to read image file {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("not a valid data URL: {0}")]
    InvalidDataUrl(String),
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("failed to decode base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// An image ready for cropping.
///
/// Holds the encoded payload (as a data URL, the form a browser host hands
/// around) alongside the decoded bitmap so the rasterizer never has to
/// decode twice. Cloning is cheap; the bitmap is shared.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    data_url: String,
    bitmap: Arc<DynamicImage>,
}

impl CapturedImage {
    /// Build from raw encoded bytes (JPEG, PNG, WebP, ...).
    pub fn from_encoded(bytes: &[u8]) -> Result<Self, CaptureError> {
        let format = image::guess_format(bytes)?;
        let bitmap = image::load_from_memory_with_format(bytes, format)?;
        Ok(Self {
            data_url: encode_data_url(format.to_mime_type(), bytes),
            bitmap: Arc::new(bitmap),
        })
    }

    /// Build from a `data:image/...;base64,` URL.
    pub fn from_data_url(data_url: &str) -> Result<Self, CaptureError> {
        let (_mime, bytes) = decode_data_url(data_url)?;
        let bitmap = image::load_from_memory(&bytes)?;
        Ok(Self {
            data_url: data_url.to_string(),
            bitmap: Arc::new(bitmap),
        })
    }

    /// Encode a raw camera frame as JPEG and wrap it.
    pub fn from_frame(frame: DynamicImage) -> Result<Self, CaptureError> {
        let mut jpeg = Vec::new();
        DynamicImage::ImageRgb8(frame.to_rgb8())
            .write_to(&mut std::io::Cursor::new(&mut jpeg), ImageFormat::Jpeg)?;
        Ok(Self {
            data_url: encode_data_url(ImageFormat::Jpeg.to_mime_type(), &jpeg),
            bitmap: Arc::new(frame),
        })
    }

    pub fn data_url(&self) -> &str {
        &self.data_url
    }

    pub fn bitmap(&self) -> &DynamicImage {
        &self.bitmap
    }

    /// Native (intrinsic) pixel dimensions.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.bitmap.width(), self.bitmap.height())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn sample_png() -> Vec<u8> {
        let img = RgbImage::from_pixel(12, 8, Rgb([10, 20, 30]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn from_encoded_keeps_dimensions_and_mime() {
        let captured = CapturedImage::from_encoded(&sample_png()).unwrap();
        assert_eq!(captured.dimensions(), (12, 8));
        assert!(captured.data_url().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn data_url_reloads_to_same_bitmap() {
        let captured = CapturedImage::from_encoded(&sample_png()).unwrap();
        let reloaded = CapturedImage::from_data_url(captured.data_url()).unwrap();
        assert_eq!(reloaded.dimensions(), (12, 8));
        assert_eq!(reloaded.bitmap().to_rgb8().get_pixel(3, 3), &Rgb([10, 20, 30]));
    }

    #[test]
    fn frame_is_encoded_as_jpeg() {
        let frame = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([200, 200, 200])));
        let captured = CapturedImage::from_frame(frame).unwrap();
        assert!(captured.data_url().starts_with("data:image/jpeg;base64,"));
        assert_eq!(captured.dimensions(), (16, 16));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(CapturedImage::from_encoded(b"definitely not an image").is_err());
    }
}
