use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;

use crate::error::CompressError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionOptions {
    pub max_width: u32,
    pub max_height: u32,
    /// JPEG quality, 1-100.
    pub quality: u8,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            max_width: 1200,
            max_height: 1200,
            quality: 80,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Compressed {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
    pub original_size: usize,
    pub compressed_size: usize,
}

/// Decode any supported image, fit it inside the bounding box keeping the
/// aspect ratio, and re-encode it as JPEG.
pub fn compress_image(input: &[u8], options: &CompressionOptions) -> Result<Compressed, CompressError> {
    let img = image::load_from_memory(input).map_err(CompressError::Decode)?;

    let img = if img.width() > options.max_width || img.height() > options.max_height {
        img.resize(options.max_width, options.max_height, FilterType::Lanczos3)
    } else {
        img
    };

    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());

    let mut out = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut out, options.quality.clamp(1, 100));
    rgb.write_with_encoder(encoder).map_err(CompressError::Encode)?;

    let bytes = out.into_inner();
    Ok(Compressed {
        original_size: input.len(),
        compressed_size: bytes.len(),
        bytes,
        mime: "image/jpeg",
    })
}

/// Human-readable size, e.g. `1.5 KB`.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }

    const UNITS: [&str; 3] = ["B", "KB", "MB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};

    fn png_bytes(img: DynamicImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_wide_image_is_scaled_to_max_width() {
        let input = png_bytes(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            2400,
            1200,
            Rgb([200, 40, 40]),
        )));

        let result = compress_image(&input, &CompressionOptions::default()).unwrap();
        let decoded = image::load_from_memory(&result.bytes).unwrap();

        assert_eq!(decoded.dimensions(), (1200, 600));
        assert_eq!(result.mime, "image/jpeg");
        assert_eq!(result.original_size, input.len());
        assert_eq!(result.compressed_size, result.bytes.len());
    }

    #[test]
    fn test_tall_image_is_scaled_to_max_height() {
        let input = png_bytes(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            300,
            600,
            Rgb([10, 10, 10]),
        )));
        let options = CompressionOptions {
            max_width: 200,
            max_height: 200,
            quality: 70,
        };

        let result = compress_image(&input, &options).unwrap();
        let decoded = image::load_from_memory(&result.bytes).unwrap();

        assert_eq!(decoded.dimensions(), (100, 200));
    }

    #[test]
    fn test_small_image_keeps_dimensions() {
        let input = png_bytes(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            64,
            48,
            Rgb([0, 128, 255]),
        )));

        let result = compress_image(&input, &CompressionOptions::default()).unwrap();
        let decoded = image::load_from_memory(&result.bytes).unwrap();

        assert_eq!(decoded.dimensions(), (64, 48));
    }

    #[test]
    fn test_alpha_channel_is_dropped() {
        let input = png_bytes(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            32,
            32,
            Rgba([0, 0, 0, 10]),
        )));

        let result = compress_image(&input, &CompressionOptions::default()).unwrap();
        let format = image::guess_format(&result.bytes).unwrap();
        assert_eq!(format, ImageFormat::Jpeg);
    }

    #[test]
    fn test_garbage_input_fails_to_decode() {
        let result = compress_image(b"definitely not an image", &CompressionOptions::default());
        assert!(matches!(result, Err(CompressError::Decode(_))));
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(1024 * 1024), "1 MB");
        assert_eq!(format_file_size(5 * 1024 * 1024 + 1024 * 300), "5.29 MB");
    }
}
