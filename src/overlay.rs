//! Brand logo overlay.

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::path::Path;
use tracing::warn;

/// Logo width relative to the composed image width.
pub const LOGO_WIDTH_FRACTION: f64 = 0.1;
/// Offset from the top and right edges, in pixels.
pub const LOGO_PADDING: u32 = 20;

/// Place `logo` top-right on a transparent layer and composite it over `base`.
pub fn overlay_logo(base: &RgbaImage, logo: &RgbaImage) -> RgbaImage {
    let (width, height) = base.dimensions();
    let logo_width = (width as f64 * LOGO_WIDTH_FRACTION) as u32;
    if logo_width == 0 || logo.width() == 0 || logo.height() == 0 {
        return base.clone();
    }
    let scale = logo_width as f64 / logo.width() as f64;
    let logo_height = ((logo.height() as f64 * scale) as u32).max(1);
    let resized = imageops::resize(logo, logo_width, logo_height, FilterType::Lanczos3);

    let mut layer = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));
    let x = width as i64 - logo_width as i64 - LOGO_PADDING as i64;
    imageops::replace(&mut layer, &resized, x, LOGO_PADDING as i64);

    let mut composed = base.clone();
    imageops::overlay(&mut composed, &layer, 0, 0);
    composed
}

/// Drop alpha by blending over white.
pub fn flatten(img: &RgbaImage) -> image::RgbImage {
    image::RgbImage::from_fn(img.width(), img.height(), |x, y| {
        let Rgba([r, g, b, a]) = *img.get_pixel(x, y);
        let alpha = a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        image::Rgb([blend(r), blend(g), blend(b)])
    })
}

fn lacks_alpha(path: &Path) -> bool {
    matches!(
        ImageFormat::from_path(path),
        Ok(ImageFormat::Jpeg) | Ok(ImageFormat::Bmp)
    )
}

/// Overlay the logo at `logo_path` and write to `output`. An unreadable logo
/// is logged and the composed image is written without it.
pub fn write_with_logo(
    composed: &DynamicImage,
    logo_path: &Path,
    output: &Path,
) -> image::ImageResult<()> {
    let base = composed.to_rgba8();
    let final_image = match image::open(logo_path) {
        Ok(logo) => overlay_logo(&base, &logo.to_rgba8()),
        Err(e) => {
            warn!(logo = %logo_path.display(), error = %e, "Error adding logo overlay");
            base
        }
    };

    if lacks_alpha(output) {
        flatten(&final_image).save(output)
    } else {
        final_image.save(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logo_placed_top_right_at_tenth_width() {
        let base = RgbaImage::from_pixel(400, 300, Rgba([0, 0, 255, 255]));
        let logo = RgbaImage::from_pixel(100, 50, Rgba([255, 0, 0, 255]));
        let out = overlay_logo(&base, &logo);

        // 40x20 logo at x = 400 - 40 - 20 = 340, y = 20.
        assert_eq!(out.get_pixel(350, 30), &Rgba([255, 0, 0, 255]));
        assert_eq!(out.get_pixel(339, 30), &Rgba([0, 0, 255, 255]));
        assert_eq!(out.get_pixel(350, 41), &Rgba([0, 0, 255, 255]));
        assert_eq!(out.get_pixel(385, 30), &Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_transparent_logo_pixels_keep_base() {
        let base = RgbaImage::from_pixel(400, 300, Rgba([0, 255, 0, 255]));
        let logo = RgbaImage::from_pixel(40, 40, Rgba([255, 0, 0, 0]));
        let out = overlay_logo(&base, &logo);
        assert_eq!(out.get_pixel(350, 30), &Rgba([0, 255, 0, 255]));
    }

    #[test]
    fn test_tiny_base_is_returned_unchanged() {
        let base = RgbaImage::from_pixel(5, 5, Rgba([1, 2, 3, 255]));
        let logo = RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255]));
        assert_eq!(overlay_logo(&base, &logo), base);
    }

    #[test]
    fn test_flatten_blends_over_white() {
        let img = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 0]));
        assert_eq!(flatten(&img).get_pixel(0, 0), &image::Rgb([255, 255, 255]));
        let img = RgbaImage::from_pixel(1, 1, Rgba([10, 20, 30, 255]));
        assert_eq!(flatten(&img).get_pixel(0, 0), &image::Rgb([10, 20, 30]));
    }

    #[test]
    fn test_missing_logo_still_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("1x1.jpg");
        let composed =
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(50, 50, Rgba([9, 9, 9, 255])));
        write_with_logo(&composed, &dir.path().join("nope.png"), &out).unwrap();
        assert!(out.is_file());
        assert_eq!(image::open(&out).unwrap().color(), image::ColorType::Rgb8);
    }
}
