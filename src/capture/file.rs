//! File source — a user-chosen image on disk.

use super::{CaptureError, CapturedImage};
use std::path::Path;

/// Read an image file asynchronously and normalize it into a `CapturedImage`.
///
/// The caller opens the crop editor with the result straight away; there is
/// no intermediate preview step for files.
pub async fn read_image_file(path: &Path) -> Result<CapturedImage, CaptureError> {
    let start = std::time::Instant::now();
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| CaptureError::FileRead {
            path: path.display().to_string(),
            source,
        })?;
    let image = CapturedImage::from_encoded(&bytes)?;
    let (w, h) = image.dimensions();
    log::info!(
        "[CAPTURE] Loaded {} ({}x{}, {} bytes) in {}ms",
        path.display(),
        w,
        h,
        bytes.len(),
        start.elapsed().as_millis()
    );
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

    #[tokio::test]
    async fn reads_png_from_disk() {
        let path = std::env::temp_dir().join("lyric-scan-file-source-test.png");
        DynamicImage::ImageRgb8(RgbImage::from_pixel(30, 20, Rgb([1, 2, 3])))
            .save_with_format(&path, ImageFormat::Png)
            .unwrap();

        let image = read_image_file(&path).await.unwrap();
        assert_eq!(image.dimensions(), (30, 20));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn missing_file_reports_path() {
        let err = read_image_file(Path::new("/nonexistent/lyrics.jpg"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/lyrics.jpg"));
    }
}
