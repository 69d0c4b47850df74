use std::{io::Cursor, ops::Deref};

use image::{
    codecs::{jpeg::JpegEncoder, png::PngEncoder},
    imageops::{self, FilterType},
    ColorType, DynamicImage, ImageEncoder, RgbaImage,
};

use super::{
    error::{Result, ThumbnailError},
    options::{Fit, ImageFormat},
};

/// Draws `frame` onto a `width` x `height` canvas.
pub fn rasterize(frame: &RgbaImage, width: u32, height: u32, fit: Fit) -> RgbaImage {
    if frame.width() == width && frame.height() == height {
        return frame.clone();
    }

    match fit {
        Fit::Stretch => imageops::resize(frame, width, height, FilterType::Triangle),
        Fit::Cover => {
            let scale = f64::max(
                width as f64 / frame.width().max(1) as f64,
                height as f64 / frame.height().max(1) as f64,
            );
            let scaled_width = ((frame.width() as f64 * scale).ceil() as u32).max(width);
            let scaled_height = ((frame.height() as f64 * scale).ceil() as u32).max(height);
            let scaled = imageops::resize(frame, scaled_width, scaled_height, FilterType::Triangle);

            let x = (scaled_width - width) / 2;
            let y = (scaled_height - height) / 2;
            imageops::crop_imm(&scaled, x, y, width, height).to_image()
        }
    }
}

/// Encodes `image` in `format`. `quality` in `[0, 1]` applies to jpeg and webp.
pub fn encode(image: &RgbaImage, format: ImageFormat, quality: f32) -> Result<Vec<u8>> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(ThumbnailError::EncodeFailure(format!(
            "cannot encode an empty {width}x{height} canvas"
        )));
    }

    let mut buffer = Cursor::new(Vec::new());

    match format {
        ImageFormat::Jpeg => {
            // jpeg has no alpha channel
            let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut buffer, percent(quality));
            encoder.encode(rgb.as_raw(), width, height, ColorType::Rgb8)?;
        }
        ImageFormat::Png => {
            PngEncoder::new(&mut buffer).write_image(image.as_raw(), width, height, ColorType::Rgba8)?;
        }
        ImageFormat::Webp => {
            let encoded = webp::Encoder::from_rgba(image.as_raw(), width, height)
                .encode(percent(quality) as f32);
            return Ok(encoded.deref().to_vec());
        }
    }

    Ok(buffer.into_inner())
}

fn percent(quality: f32) -> u8 {
    ((quality.clamp(0.0, 1.0) * 100.0).round() as u8).clamp(1, 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn two_tone(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        })
    }

    #[test]
    fn test_stretch_hits_exact_box() {
        let frame = two_tone(64, 48);
        let out = rasterize(&frame, 160, 90, Fit::Stretch);
        assert_eq!(out.dimensions(), (160, 90));
    }

    #[test]
    fn test_cover_crops_to_box() {
        let frame = two_tone(200, 100);
        let out = rasterize(&frame, 50, 50, Fit::Cover);
        assert_eq!(out.dimensions(), (50, 50));
        // the centre crop keeps both halves, red on the left and blue on the right
        assert_eq!(out.get_pixel(2, 25)[0], 255);
        assert_eq!(out.get_pixel(47, 25)[2], 255);
    }

    #[test]
    fn test_png_roundtrip_dimensions() {
        let frame = two_tone(33, 17);
        let bytes = encode(&frame, ImageFormat::Png, 1.0).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_jpeg_and_webp_encode() {
        let frame = two_tone(32, 16);

        let jpeg = encode(&frame, ImageFormat::Jpeg, 0.8).unwrap();
        assert_eq!(&jpeg[..2], &[0xff, 0xd8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 16));

        let webp = encode(&frame, ImageFormat::Webp, 0.5).unwrap();
        assert_eq!(&webp[..4], b"RIFF");
        assert_eq!(&webp[8..12], b"WEBP");
    }

    #[test]
    fn test_empty_canvas_fails() {
        let err = encode(&RgbaImage::new(0, 10), ImageFormat::Png, 1.0).unwrap_err();
        assert!(matches!(err, ThumbnailError::EncodeFailure(_)));
    }

    #[test]
    fn test_quality_percent() {
        assert_eq!(percent(0.0), 1);
        assert_eq!(percent(0.8), 80);
        assert_eq!(percent(2.0), 100);
    }
}
