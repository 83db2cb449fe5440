//! HEIC/HEIF through libheif-rs

use crate::error::{PressError, Result};
use image::DynamicImage;
use libheif_rs::{
    Channel, ColorSpace, CompressionFormat, EncoderQuality, HeifContext, Image, LibHeif,
    RgbChroma,
};
use std::path::Path;

/// True when libheif has an HEVC encoder registered.
pub fn is_available() -> bool {
    let lib_heif = LibHeif::new();
    lib_heif.encoder_for_format(CompressionFormat::Hevc).is_ok()
}

pub fn decode(path: &Path) -> Result<DynamicImage> {
    let lib_heif = LibHeif::new();

    let ctx = HeifContext::read_from_file(path.to_string_lossy().as_ref()).map_err(|e| {
        let message = e.to_string();
        if message.contains("SecurityLimitExceeded") || message.contains("ipco") {
            tracing::warn!(path = %path.display(), "HEIC security limit exceeded");
        }
        PressError::decode(path, format!("failed to read HEIC: {}", message))
    })?;

    let handle = ctx
        .primary_image_handle()
        .map_err(|e| PressError::decode(path, format!("no primary image: {}", e)))?;

    let width = handle.width();
    let height = handle.height();
    let has_alpha = handle.has_alpha_channel();
    let chroma = if has_alpha {
        RgbChroma::Rgba
    } else {
        RgbChroma::Rgb
    };

    let decoded = lib_heif
        .decode(&handle, ColorSpace::Rgb(chroma), None)
        .map_err(|e| PressError::decode(path, e))?;

    let planes = decoded.planes();
    let plane = planes
        .interleaved
        .ok_or_else(|| PressError::decode(path, "no interleaved plane"))?;

    let channels = if has_alpha { 4 } else { 3 };
    let row_len = width as usize * channels;
    let mut pixels = Vec::with_capacity(row_len * height as usize);
    for row in plane.data.chunks(plane.stride).take(height as usize) {
        pixels.extend_from_slice(&row[..row_len]);
    }

    let img = if has_alpha {
        image::RgbaImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgba8)
    } else {
        image::RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8)
    };
    img.ok_or_else(|| PressError::decode(path, "pixel buffer size mismatch"))
}

pub fn encode(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let err = |e: libheif_rs::HeifError| PressError::encode("heic", e);

    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut heif_image = Image::new(width, height, ColorSpace::Rgb(RgbChroma::Rgb)).map_err(err)?;
    heif_image
        .create_plane(Channel::Interleaved, width, height, 8)
        .map_err(err)?;

    {
        let planes = heif_image.planes_mut();
        let plane = planes
            .interleaved
            .ok_or_else(|| PressError::encode("heic", "no interleaved plane"))?;
        let row_len = width as usize * 3;
        for (y, src) in rgb.as_raw().chunks(row_len).enumerate() {
            let start = y * plane.stride;
            plane.data[start..start + row_len].copy_from_slice(src);
        }
    }

    let lib_heif = LibHeif::new();
    let mut context = HeifContext::new().map_err(err)?;
    let mut encoder = lib_heif
        .encoder_for_format(CompressionFormat::Hevc)
        .map_err(err)?;
    encoder
        .set_quality(EncoderQuality::Lossy(quality))
        .map_err(err)?;
    context
        .encode_image(&heif_image, &mut encoder, None)
        .map_err(err)?;
    context.write_to_bytes().map_err(err)
}
