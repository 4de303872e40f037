//! Region rasterizer — cut the confirmed selection out of the native bitmap.
//!
//! The selection arrives in displayed pixels; it is mapped through the scale
//! factors so the crop is taken at full source resolution. Recognition
//! accuracy depends on that: a crop at display resolution throws away most
//! of the detail on a phone photo.

use crate::capture::CapturedImage;
use crate::crop::{PixelRegion, ScaleFactors};
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgba, RgbaImage, RgbImage};

pub const DEFAULT_JPEG_QUALITY: u8 = 92;

/// Largest surface we will allocate on either side.
pub const MAX_CANVAS_SIDE: u32 = 16_384;
/// Largest surface area we will allocate (16384 × 16384).
pub const MAX_CANVAS_AREA: u64 = 268_435_456;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

#[derive(Debug, thiserror::Error)]
pub enum RasterizationError {
    #[error("cannot allocate a {width}x{height} drawing surface")]
    CanvasUnavailable { width: u32, height: u32 },
    #[error("failed to encode region: {0}")]
    Encode(#[from] image::ImageError),
}

#[derive(Debug, Clone, Copy)]
pub struct RasterOptions {
    /// JPEG quality, 1–100.
    pub jpeg_quality: u8,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// The selection mapped onto the native bitmap, in whole pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeRect {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

impl NativeRect {
    pub fn from_region(region: &PixelRegion, scale: ScaleFactors) -> Self {
        Self {
            x: (region.x * scale.scale_x).round() as i64,
            y: (region.y * scale.scale_y).round() as i64,
            width: to_side(region.width * scale.scale_x),
            height: to_side(region.height * scale.scale_y),
        }
    }
}

fn to_side(v: f64) -> u32 {
    if v.is_finite() && v > 0.0 {
        v.round().min(u32::MAX as f64) as u32
    } else {
        0
    }
}

/// JPEG bytes of a cropped, full-resolution region.
#[derive(Debug, Clone)]
pub struct RasterizedRegion {
    jpeg: Vec<u8>,
    width: u32,
    height: u32,
}

impl RasterizedRegion {
    pub fn bytes(&self) -> &[u8] {
        &self.jpeg
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.jpeg
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Standard base64 of the JPEG bytes, no `data:` prefix.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.jpeg)
    }
}

/// Allocate an opaque white surface.
pub fn allocate_canvas(width: u32, height: u32) -> Result<RgbaImage, RasterizationError> {
    let area = width as u64 * height as u64;
    if width == 0
        || height == 0
        || width > MAX_CANVAS_SIDE
        || height > MAX_CANVAS_SIDE
        || area > MAX_CANVAS_AREA
    {
        return Err(RasterizationError::CanvasUnavailable { width, height });
    }
    Ok(RgbaImage::from_pixel(width, height, WHITE))
}

/// Draw the part of `source` under `rect` onto `canvas` at the origin.
///
/// Source pixels are alpha-blended over the canvas; any part of `rect` that
/// falls outside the source leaves the canvas untouched.
pub fn composite(canvas: &mut RgbaImage, source: &DynamicImage, rect: NativeRect) {
    let (sw, sh) = (source.width() as i64, source.height() as i64);
    let x0 = rect.x.max(0);
    let y0 = rect.y.max(0);
    let x1 = (rect.x + rect.width as i64).min(sw);
    let y1 = (rect.y + rect.height as i64).min(sh);
    if x1 <= x0 || y1 <= y0 {
        log::warn!("[RASTER] Selection {:?} lies outside the {}x{} source", rect, sw, sh);
        return;
    }

    let patch = source
        .crop_imm(x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32)
        .to_rgba8();
    image::imageops::overlay(canvas, &patch, x0 - rect.x, y0 - rect.y);
}

/// Steps 1–3: allocate, fill white, composite. No encoding.
pub fn render_region(
    image: &CapturedImage,
    region: &PixelRegion,
    scale: ScaleFactors,
) -> Result<RgbImage, RasterizationError> {
    let rect = NativeRect::from_region(region, scale);
    let mut canvas = allocate_canvas(rect.width, rect.height)?;
    composite(&mut canvas, image.bitmap(), rect);
    Ok(DynamicImage::ImageRgba8(canvas).to_rgb8())
}

pub fn encode_jpeg(canvas: &RgbImage, quality: u8) -> Result<Vec<u8>, RasterizationError> {
    let mut jpeg = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100));
    canvas.write_with_encoder(encoder)?;
    Ok(jpeg)
}

/// Rasterize the confirmed selection into a JPEG at native resolution.
pub fn rasterize(
    image: &CapturedImage,
    region: &PixelRegion,
    scale: ScaleFactors,
    options: &RasterOptions,
) -> Result<RasterizedRegion, RasterizationError> {
    let start = std::time::Instant::now();
    let canvas = render_region(image, region, scale)?;
    let (width, height) = canvas.dimensions();
    let jpeg = encode_jpeg(&canvas, options.jpeg_quality)?;
    log::info!(
        "[RASTER] {}x{} region encoded in {}ms — {} bytes (q={})",
        width,
        height,
        start.elapsed().as_millis(),
        jpeg.len(),
        options.jpeg_quality
    );
    Ok(RasterizedRegion {
        jpeg,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// 1000x2000 image: red above y=1000, blue below; a green square at
    /// native (200..600, 200..600).
    fn portrait() -> CapturedImage {
        let img = RgbImage::from_fn(1000, 2000, |x, y| {
            if (200..600).contains(&x) && (200..600).contains(&y) {
                Rgb([0, 255, 0])
            } else if y < 1000 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        });
        CapturedImage::from_frame(DynamicImage::ImageRgb8(img)).unwrap()
    }

    fn half_scale() -> ScaleFactors {
        ScaleFactors {
            scale_x: 2.0,
            scale_y: 2.0,
        }
    }

    fn px(x: f64, y: f64, width: f64, height: f64) -> PixelRegion {
        PixelRegion {
            x,
            y,
            width,
            height,
        }
    }

    #[test]
    fn bitmap_is_sized_at_native_resolution() {
        let region = px(100.0, 100.0, 200.0, 200.0);
        let out = rasterize(
            &portrait(),
            &region,
            half_scale(),
            &RasterOptions::default(),
        )
        .unwrap();
        assert_eq!(out.dimensions(), (400, 400));

        let decoded = image::load_from_memory(out.bytes()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (400, 400));
    }

    #[test]
    fn region_is_taken_from_native_pixels() {
        let region = px(100.0, 100.0, 200.0, 200.0);
        let canvas = render_region(&portrait(), &region, half_scale()).unwrap();
        // The selection maps exactly onto the green square.
        for &(x, y) in &[(0, 0), (399, 0), (0, 399), (399, 399), (200, 200)] {
            let p = canvas.get_pixel(x, y);
            assert!(
                p[1] > 200 && p[0] < 50 && p[2] < 50,
                "pixel {},{} = {:?}",
                x,
                y,
                p
            );
        }
    }

    /// True if `color` is at (x, y) or one of its neighbours.
    fn color_near(img: &RgbImage, x: u32, y: u32, color: Rgb<u8>) -> bool {
        let (w, h) = img.dimensions();
        (x.saturating_sub(1)..=(x + 1).min(w - 1)).any(|nx| {
            (y.saturating_sub(1)..=(y + 1).min(h - 1)).any(|ny| *img.get_pixel(nx, ny) == color)
        })
    }

    #[test]
    fn downscaled_output_matches_on_screen_selection() {
        let image = portrait();
        let source = image.bitmap().to_rgb8();
        // 1000x2000 shown at 333x667: non-integer scale on both axes.
        let scale = ScaleFactors {
            scale_x: 1000.0 / 333.0,
            scale_y: 2000.0 / 667.0,
        };
        for region in [
            px(17.3, 41.9, 123.4, 56.7),
            px(0.0, 0.0, 333.0, 667.0),
            px(200.5, 300.25, 1.6, 99.9),
        ] {
            let canvas = render_region(&image, &region, scale).unwrap();
            let (w, h) = canvas.dimensions();
            assert!((w as f64 / scale.scale_x - region.width).abs() <= 1.0);
            assert!((h as f64 / scale.scale_y - region.height).abs() <= 1.0);

            let origin = NativeRect::from_region(&region, scale);
            let small_w = ((w as f64 / scale.scale_x).round() as u32).max(1);
            let small_h = ((h as f64 / scale.scale_y).round() as u32).max(1);
            let small = image::imageops::resize(
                &canvas,
                small_w,
                small_h,
                image::imageops::FilterType::Nearest,
            );

            for fx in [0.25, 0.5, 0.75] {
                for fy in [0.25, 0.5, 0.75] {
                    // A point of the on-screen selection and its native pixel.
                    let dx = region.x + fx * region.width;
                    let dy = region.y + fy * region.height;
                    let nx = (dx * scale.scale_x).floor() as u32;
                    let ny = (dy * scale.scale_y).floor() as u32;
                    let expected = *source.get_pixel(nx, ny);

                    // Native crop holds that exact pixel.
                    let cx = (nx as i64 - origin.x) as u32;
                    let cy = (ny as i64 - origin.y) as u32;
                    assert_eq!(canvas.get_pixel(cx, cy), &expected, "native {},{}", nx, ny);

                    // Downscaled crop shows it within a pixel of the screen spot.
                    let sx = ((fx * small_w as f64) as u32).min(small_w - 1);
                    let sy = ((fy * small_h as f64) as u32).min(small_h - 1);
                    assert!(
                        color_near(&small, sx, sy, expected),
                        "screen point {:.1},{:.1} in {:?}",
                        dx,
                        dy,
                        region
                    );
                }
            }
        }
    }

    #[test]
    fn fresh_canvas_corners_are_opaque_white() {
        let canvas = allocate_canvas(37, 11).unwrap();
        for &(x, y) in &[(0, 0), (36, 0), (0, 10), (36, 10)] {
            assert_eq!(canvas.get_pixel(x, y), &WHITE);
        }
    }

    #[test]
    fn transparent_source_shows_white_background() {
        let rgba = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 0]));
        let mut png = Vec::new();
        DynamicImage::ImageRgba8(rgba)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let image = CapturedImage::from_encoded(&png).unwrap();

        let region = px(0.0, 0.0, 10.0, 10.0);
        let canvas = render_region(&image, &region, ScaleFactors::IDENTITY).unwrap();
        assert_eq!(canvas.get_pixel(5, 5), &Rgb([255, 255, 255]));
    }

    #[test]
    fn selection_past_the_edge_leaves_white() {
        let region = px(450.0, 0.0, 100.0, 10.0);
        let canvas = render_region(&portrait(), &region, half_scale()).unwrap();
        assert_eq!(canvas.dimensions(), (200, 20));
        assert_eq!(canvas.get_pixel(199, 5), &Rgb([255, 255, 255]));
        assert_eq!(canvas.get_pixel(0, 5), &Rgb([255, 0, 0]));
    }

    #[test]
    fn empty_or_huge_surfaces_are_refused() {
        assert!(matches!(
            allocate_canvas(0, 10),
            Err(RasterizationError::CanvasUnavailable { .. })
        ));
        assert!(matches!(
            allocate_canvas(MAX_CANVAS_SIDE + 1, 1),
            Err(RasterizationError::CanvasUnavailable { .. })
        ));

        let region = px(0.0, 0.0, 0.2, 10.0);
        let result = rasterize(
            &portrait(),
            &region,
            ScaleFactors::IDENTITY,
            &RasterOptions::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn base64_payload_has_no_data_url_prefix() {
        let region = px(0.0, 0.0, 8.0, 8.0);
        let out = rasterize(
            &portrait(),
            &region,
            ScaleFactors::IDENTITY,
            &RasterOptions::default(),
        )
        .unwrap();
        let b64 = out.to_base64();
        assert!(!b64.starts_with("data:"));
        assert!(b64.starts_with("/9j/"));
    }
}
