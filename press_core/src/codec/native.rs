//! Built-in raster formats through the `image` crate

use crate::error::{PressError, Result};
use image::codecs::avif::AvifEncoder;
use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Frame, ImageError, ImageFormat, ImageReader, Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;
use tiff::encoder::{colortype, compression::Lzw, TiffEncoder};

/// ICO directory entries cannot describe anything larger.
pub const ICO_MAX_DIMENSION: u32 = 256;

/// ravif speed, 1 (slowest) to 10
const AVIF_SPEED: u8 = 6;

pub fn decode(format: ImageFormat, path: &Path) -> Result<DynamicImage> {
    let mut reader = ImageReader::open(path).map_err(|source| PressError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    // Extension said `format`; let the magic bytes win if they disagree.
    reader.set_format(format);
    let reader = reader.with_guessed_format().map_err(|source| PressError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    reader.decode().map_err(|e| match e {
        ImageError::IoError(source) => PressError::Read {
            path: path.to_path_buf(),
            source,
        },
        other => PressError::decode(path, other),
    })
}

pub fn encode(format: ImageFormat, image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let name = format!("{:?}", format).to_lowercase();
    let mut buf = Vec::new();

    let result = match format {
        ImageFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
            DynamicImage::ImageRgb8(flatten_onto_white(image)).write_with_encoder(encoder)
        }
        ImageFormat::Png => {
            let encoder =
                PngEncoder::new_with_quality(&mut buf, CompressionType::Best, PngFilter::Adaptive);
            image.write_with_encoder(encoder)
        }
        ImageFormat::WebP => {
            let encoder = WebPEncoder::new_lossless(&mut buf);
            to_rgb_or_rgba(image).write_with_encoder(encoder)
        }
        ImageFormat::Avif => {
            let encoder = AvifEncoder::new_with_speed_quality(&mut buf, AVIF_SPEED, quality);
            to_rgb_or_rgba(image).write_with_encoder(encoder)
        }
        ImageFormat::Gif => {
            let mut encoder = GifEncoder::new(&mut buf);
            encoder.encode_frame(Frame::new(image.to_rgba8()))
        }
        ImageFormat::Ico => fit_ico(image).write_to(&mut Cursor::new(&mut buf), ImageFormat::Ico),
        ImageFormat::Pnm => DynamicImage::ImageRgb8(image.to_rgb8())
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Pnm),
        ImageFormat::Tiff => {
            encode_tiff_lzw(image, &mut buf).map_err(|e| PressError::encode(name, e))?;
            return Ok(buf);
        }
        other => to_rgb_or_rgba(image).write_to(&mut Cursor::new(&mut buf), other),
    };

    result.map_err(|e| PressError::encode(name, e))?;
    Ok(buf)
}

/// JPEG has no alpha; transparent areas become white instead of black.
fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let a = a as u32;
        let blend = |c: u8| ((c as u32 * a + 255 * (255 - a) + 127) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

/// LZW-compressed TIFF; `image`'s own TIFF writer stores strips uncompressed.
fn encode_tiff_lzw(image: &DynamicImage, buf: &mut Vec<u8>) -> tiff::TiffResult<()> {
    let mut encoder = TiffEncoder::new(Cursor::new(buf))?;
    let (width, height) = (image.width(), image.height());
    if image.color().has_alpha() {
        let rgba = image.to_rgba8();
        encoder.write_image_with_compression::<colortype::RGBA8, _>(
            width,
            height,
            Lzw::default(),
            rgba.as_raw(),
        )
    } else {
        let rgb = image.to_rgb8();
        encoder.write_image_with_compression::<colortype::RGB8, _>(
            width,
            height,
            Lzw::default(),
            rgb.as_raw(),
        )
    }
}

/// Most encoders only accept 8-bit RGB(A).
fn to_rgb_or_rgba(image: &DynamicImage) -> DynamicImage {
    if image.color().has_alpha() {
        DynamicImage::ImageRgba8(image.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(image.to_rgb8())
    }
}

fn fit_ico(image: &DynamicImage) -> DynamicImage {
    let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
    if rgba.width() <= ICO_MAX_DIMENSION && rgba.height() <= ICO_MAX_DIMENSION {
        return rgba;
    }
    tracing::debug!(
        width = rgba.width(),
        height = rgba.height(),
        "Downscaling image to fit ICO limits"
    );
    rgba.resize(ICO_MAX_DIMENSION, ICO_MAX_DIMENSION, FilterType::Lanczos3)
}
