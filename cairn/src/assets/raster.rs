use super::transform::{plan_resize, OutputFormat, TransformOptions, MAX_OUTPUT_PIXELS};
use super::{ImageProcessor, TransformedImage};
use crate::error::{CairnError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader, Rgba, RgbaImage};
use std::io::Cursor;

const DEFAULT_QUALITY: u8 = 80;

/// [`ImageProcessor`] backed by the `image` crate. Decodes JPEG, PNG, GIF and WebP.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterImageProcessor;

impl ImageProcessor for RasterImageProcessor {
    fn dimensions(&self, bytes: &[u8]) -> Result<(u32, u32)> {
        ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()?
            .into_dimensions()
            .map_err(image_error)
    }

    fn transform(&self, bytes: &[u8], options: &TransformOptions) -> Result<TransformedImage> {
        let source_format = image::guess_format(bytes).map_err(image_error)?;
        let image = image::load_from_memory_with_format(bytes, source_format).map_err(image_error)?;

        let plan = plan_resize((image.width(), image.height()), options);
        if plan.pixel_count() > MAX_OUTPUT_PIXELS {
            let (width, height) = plan.resize;
            return Err(CairnError::Image(format!(
                "derivative of {width}x{height} exceeds {MAX_OUTPUT_PIXELS} pixels"
            )));
        }
        let mut output = if plan.resize == (image.width(), image.height()) {
            image
        } else {
            image.resize_exact(plan.resize.0, plan.resize.1, FilterType::Lanczos3)
        };

        if let Some(crop) = plan.crop {
            output = output.crop_imm(crop.x, crop.y, crop.width, crop.height);
        }
        if let Some(pad) = plan.pad {
            let background = parse_background(options.background.as_deref());
            let mut canvas = RgbaImage::from_pixel(pad.width, pad.height, background);
            image::imageops::overlay(
                &mut canvas,
                &output.to_rgba8(),
                i64::from(pad.x),
                i64::from(pad.y),
            );
            output = DynamicImage::ImageRgba8(canvas);
        }

        let format = match options.format {
            Some(format) => image_format(format),
            None => source_format,
        };
        let quality = options.quality.unwrap_or(DEFAULT_QUALITY).clamp(1, 100);

        Ok(TransformedImage {
            width: output.width(),
            height: output.height(),
            bytes: encode(&output, format, quality)?,
        })
    }
}

fn image_format(format: OutputFormat) -> ImageFormat {
    match format {
        OutputFormat::Jpeg => ImageFormat::Jpeg,
        OutputFormat::Png => ImageFormat::Png,
        OutputFormat::Webp => ImageFormat::WebP,
        OutputFormat::Gif => ImageFormat::Gif,
    }
}

fn encode(image: &DynamicImage, format: ImageFormat, quality: u8) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    match format {
        ImageFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut bytes, quality);
            DynamicImage::ImageRgb8(image.to_rgb8())
                .write_with_encoder(encoder)
                .map_err(image_error)?;
        }
        ImageFormat::WebP | ImageFormat::Gif => {
            DynamicImage::ImageRgba8(image.to_rgba8())
                .write_to(&mut Cursor::new(&mut bytes), format)
                .map_err(image_error)?;
        }
        other => {
            image
                .write_to(&mut Cursor::new(&mut bytes), other)
                .map_err(image_error)?;
        }
    }
    Ok(bytes)
}

/// Parse `#rgb`, `#rrggbb` or `#rrggbbaa`. Anything else is opaque black.
fn parse_background(value: Option<&str>) -> Rgba<u8> {
    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
    let Some(hex) = value.map(|v| v.trim_start_matches('#')) else {
        return BLACK;
    };
    let expanded: String = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect(),
        6 | 8 => hex.to_string(),
        _ => return BLACK,
    };
    let channel = |i: usize| {
        expanded
            .get(i..i + 2)
            .and_then(|pair| u8::from_str_radix(pair, 16).ok())
    };
    match (channel(0), channel(2), channel(4)) {
        (Some(r), Some(g), Some(b)) => Rgba([r, g, b, channel(6).unwrap_or(255)]),
        _ => BLACK,
    }
}

fn image_error(e: image::ImageError) -> CairnError {
    CairnError::Image(e.to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::assets::transform::Fit;
    use image::Rgb;

    /// Encode a solid test image in the given format.
    pub fn sample_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let image = image::RgbImage::from_pixel(width, height, Rgb([200, 40, 40]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), format)
            .unwrap();
        bytes
    }

    #[test]
    fn test_dimensions() {
        let processor = RasterImageProcessor;
        let png = sample_image(40, 30, ImageFormat::Png);
        assert_eq!(processor.dimensions(&png).unwrap(), (40, 30));
        assert!(processor.dimensions(b"not an image").is_err());
    }

    #[test]
    fn test_resize_keeps_source_format() {
        let processor = RasterImageProcessor;
        let jpeg = sample_image(400, 300, ImageFormat::Jpeg);
        let out = processor
            .transform(&jpeg, &TransformOptions::default().width(100))
            .unwrap();
        assert_eq!((out.width, out.height), (100, 75));
        assert_eq!(image::guess_format(&out.bytes).unwrap(), ImageFormat::Jpeg);
        assert_eq!(processor.dimensions(&out.bytes).unwrap(), (100, 75));
    }

    #[test]
    fn test_contain_and_reformat() {
        let processor = RasterImageProcessor;
        let png = sample_image(40, 20, ImageFormat::Png);
        let mut options = TransformOptions::default()
            .width(30)
            .height(30)
            .fit(Fit::Contain)
            .format(OutputFormat::Webp);
        options.background = Some("#fff".to_string());

        let out = processor.transform(&png, &options).unwrap();
        assert_eq!((out.width, out.height), (30, 30));
        assert_eq!(image::guess_format(&out.bytes).unwrap(), ImageFormat::WebP);
    }

    #[test]
    fn test_oversized_derivative_is_an_error() {
        let processor = RasterImageProcessor;
        let jpeg = sample_image(400, 300, ImageFormat::Jpeg);
        let err = processor
            .transform(&jpeg, &TransformOptions::default().width(200_000))
            .unwrap_err();
        assert!(matches!(err, CairnError::Image(msg) if msg.contains("200000x150000")));
    }

    #[test]
    fn test_parse_background() {
        assert_eq!(parse_background(Some("#fff")), Rgba([255, 255, 255, 255]));
        assert_eq!(parse_background(Some("#10203080")), Rgba([16, 32, 48, 128]));
        assert_eq!(parse_background(Some("nope")), Rgba([0, 0, 0, 255]));
        assert_eq!(parse_background(None), Rgba([0, 0, 0, 255]));
    }
}
