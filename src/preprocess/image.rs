//! Image preprocessing for the classifier.
//!
//! Uploaded bytes are decoded (PNG/JPEG/BMP/GIF, detected from the bytes),
//! converted to 8-bit RGB, and resized to the model's fixed input size with
//! bilinear interpolation. Aspect ratio is not preserved: the model needs the
//! exact dimensions.

use image::{imageops::FilterType, DynamicImage, RgbImage};
use log::debug;

use crate::error::PreprocessError;

/// Content type assumed for an upload that declares none.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// An RGB image at the model's input size, ready for inference.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedImage {
    pixels: RgbImage,
}

impl NormalizedImage {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn channels(&self) -> usize {
        3
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    /// Flattens row-major as R, G, B, R, G, B, ... normalized to [0, 1].
    ///
    /// Length is `width * height * 3`.
    pub fn to_input_vector(&self) -> Vec<f64> {
        self.pixels.as_raw().iter().map(|&c| c as f64 / 255.0).collect()
    }
}

/// Fixed output geometry of the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageNormalizer {
    pub width: u32,
    pub height: u32,
}

impl ImageNormalizer {
    pub fn new(width: u32, height: u32) -> Self {
        ImageNormalizer { width, height }
    }

    /// Length of the vector produced by [`NormalizedImage::to_input_vector`].
    pub fn input_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Validates the declared type, then decodes and resizes.
    pub fn normalize(&self, bytes: &[u8], content_type: &str) -> Result<NormalizedImage, PreprocessError> {
        check_content_type(content_type)?;
        self.decode(bytes)
    }

    /// Decodes and resizes without looking at any declared type.
    pub fn decode(&self, bytes: &[u8]) -> Result<NormalizedImage, PreprocessError> {
        let img = image::load_from_memory(bytes)?;
        Ok(self.normalize_image(img))
    }

    /// Converts an already-decoded image.
    pub fn normalize_image(&self, img: DynamicImage) -> NormalizedImage {
        debug!("original image size: ({}, {}) pixels", img.width(), img.height());
        let rgb = img.to_rgb8();
        let pixels = if rgb.dimensions() == (self.width, self.height) {
            rgb
        } else {
            image::imageops::resize(&rgb, self.width, self.height, FilterType::Triangle)
        };
        debug!("resized image size: ({}, {}) pixels", pixels.width(), pixels.height());
        NormalizedImage { pixels }
    }
}

/// Accepts any `image/*` media type, ignoring parameters and case.
pub fn check_content_type(content_type: &str) -> Result<(), PreprocessError> {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    let is_image = essence
        .get(..6)
        .map_or(false, |prefix| prefix.eq_ignore_ascii_case("image/"));
    if is_image {
        Ok(())
    } else {
        Err(PreprocessError::NotAnImage(content_type.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageOutputFormat, Luma, Rgb, Rgba, RgbaImage};
    use std::io::Cursor;

    fn encode(img: DynamicImage, format: ImageOutputFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    fn gradient(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
            Rgb([(x * 255 / w.max(1)) as u8, (y * 255 / h.max(1)) as u8, 128])
        }))
    }

    #[test]
    fn content_type_must_be_image_family() {
        assert!(check_content_type("image/jpeg").is_ok());
        assert!(check_content_type("IMAGE/PNG; charset=binary").is_ok());
        assert!(matches!(check_content_type("text/plain"), Err(PreprocessError::NotAnImage(_))));
        assert!(check_content_type("").is_err());
        assert!(check_content_type(DEFAULT_CONTENT_TYPE).is_err());
    }

    #[test]
    fn output_has_fixed_size_for_any_input_size() {
        let norm = ImageNormalizer::new(224, 224);
        for (w, h) in [(1, 1), (640, 480), (31, 997), (224, 224)] {
            let bytes = encode(gradient(w, h), ImageOutputFormat::Png);
            let out = norm.normalize(&bytes, "image/png").unwrap();
            assert_eq!((out.width(), out.height(), out.channels()), (224, 224, 3));
            assert_eq!(out.to_input_vector().len(), norm.input_len());
        }
    }

    #[test]
    fn converts_grayscale_and_rgba_to_rgb() {
        let norm = ImageNormalizer::new(8, 4);

        let gray = DynamicImage::ImageLuma8(GrayImage::from_pixel(5, 5, Luma([200])));
        let out = norm.normalize(&encode(gray, ImageOutputFormat::Png), "image/png").unwrap();
        assert!(out.pixels().pixels().all(|p| p.0 == [200, 200, 200]));

        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 9, Rgba([10, 20, 30, 0])));
        let out = norm.normalize(&encode(rgba, ImageOutputFormat::Png), "image/png").unwrap();
        assert_eq!((out.width(), out.height()), (8, 4));
        assert!(out.pixels().pixels().all(|p| p.0 == [10, 20, 30]));
    }

    #[test]
    fn same_bytes_give_identical_pixels() {
        let norm = ImageNormalizer::new(224, 224);
        let bytes = encode(gradient(300, 200), ImageOutputFormat::Jpeg(90));
        let a = norm.normalize(&bytes, "image/jpeg").unwrap();
        let b = norm.normalize(&bytes, "image/jpeg").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn format_is_detected_from_bytes_not_declared_type() {
        let norm = ImageNormalizer::new(16, 16);
        let png = encode(gradient(20, 20), ImageOutputFormat::Png);
        assert!(norm.normalize(&png, "image/jpeg").is_ok());
    }

    #[test]
    fn corrupted_bytes_fail_to_decode() {
        let norm = ImageNormalizer::new(16, 16);
        let mut bytes = encode(gradient(20, 20), ImageOutputFormat::Jpeg(80));
        bytes.truncate(10);
        assert!(matches!(norm.normalize(&bytes, "image/jpeg"), Err(PreprocessError::Decode(_))));
        assert!(matches!(norm.normalize(b"hello", "image/png"), Err(PreprocessError::Decode(_))));
    }

    #[test]
    fn input_vector_is_scaled_rgb_interleaved() {
        let norm = ImageNormalizer::new(1, 1);
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(1, 1, Rgb([255, 0, 51])));
        let v = norm.normalize_image(img).to_input_vector();
        assert_eq!(v, vec![1.0, 0.0, 0.2]);
    }
}
