//! Codec seam
//!
//! The pipeline never talks to a codec library directly. It hands a
//! [`FormatDescriptor`] to a [`Codec`], and [`DefaultCodec`] routes the call
//! to the `image` crate, libheif or ImageMagick according to the descriptor's
//! backend.

#[cfg(feature = "heif")]
pub mod heif;
pub mod magick;
pub mod native;

use crate::error::{PressError, Result};
use crate::formats::{Backend, FormatDescriptor};
use image::DynamicImage;
use std::path::Path;

pub const MIN_QUALITY: u8 = 1;
pub const MAX_QUALITY: u8 = 100;

pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_QUALITY, MAX_QUALITY)
}

pub trait Codec {
    /// Decode the first frame/page of `path` into pixels.
    fn decode(&self, format: &FormatDescriptor, path: &Path) -> Result<DynamicImage>;

    /// Encode `image` into an in-memory file of `format`.
    ///
    /// `quality` is ignored by formats without a quality setting.
    fn encode(&self, format: &FormatDescriptor, image: &DynamicImage, quality: u8)
        -> Result<Vec<u8>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCodec;

impl Codec for DefaultCodec {
    fn decode(&self, format: &FormatDescriptor, path: &Path) -> Result<DynamicImage> {
        if !format.supports_read {
            return Err(PressError::unsupported(format.identifier, "read"));
        }
        match format.backend {
            Backend::Image(image_format) => native::decode(image_format, path),
            Backend::Heif => decode_heif(path),
            Backend::Magick(coder) => magick::decode(coder, path),
        }
    }

    fn encode(
        &self,
        format: &FormatDescriptor,
        image: &DynamicImage,
        quality: u8,
    ) -> Result<Vec<u8>> {
        if !format.supports_write {
            return Err(PressError::unsupported(format.identifier, "written"));
        }
        let quality = clamp_quality(quality);
        match format.backend {
            Backend::Image(image_format) => native::encode(image_format, image, quality),
            Backend::Heif => encode_heif(image, quality),
            Backend::Magick(coder) => magick::encode(coder, image, quality, format.lossy),
        }
    }
}

#[cfg(feature = "heif")]
fn decode_heif(path: &Path) -> Result<DynamicImage> {
    heif::decode(path)
}

#[cfg(not(feature = "heif"))]
fn decode_heif(_path: &Path) -> Result<DynamicImage> {
    Err(PressError::DependencyMissing {
        format: "heic".to_string(),
        dependency: crate::formats::Dependency::Libheif,
    })
}

#[cfg(feature = "heif")]
fn encode_heif(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    heif::encode(image, quality)
}

#[cfg(not(feature = "heif"))]
fn encode_heif(_image: &DynamicImage, _quality: u8) -> Result<Vec<u8>> {
    Err(PressError::DependencyMissing {
        format: "heic".to_string(),
        dependency: crate::formats::Dependency::Libheif,
    })
}
