//! Resize policy and target-dimension arithmetic
//!
//! Images are only ever made smaller. A policy bounds width and height; with
//! `preserve_aspect` both sides shrink by the same factor, otherwise each
//! side is capped independently.

use image::imageops::FilterType;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizePolicy {
    pub max_width: u32,
    pub max_height: u32,
    pub preserve_aspect: bool,
}

impl ResizePolicy {
    pub fn new(max_width: u32, max_height: u32, preserve_aspect: bool) -> Self {
        Self {
            max_width,
            max_height,
            preserve_aspect,
        }
    }

    /// Build a policy from optional CLI/config bounds; a missing side is unbounded.
    pub fn from_bounds(
        max_width: Option<u32>,
        max_height: Option<u32>,
        preserve_aspect: bool,
    ) -> Option<Self> {
        if max_width.is_none() && max_height.is_none() {
            return None;
        }
        Some(Self::new(
            max_width.unwrap_or(u32::MAX),
            max_height.unwrap_or(u32::MAX),
            preserve_aspect,
        ))
    }

    pub fn target_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        target_dimensions(width, height, self)
    }
}

/// Dimensions `width`×`height` should be scaled to under `policy`.
///
/// Never upscales and never returns a side below 1px.
pub fn target_dimensions(width: u32, height: u32, policy: &ResizePolicy) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width, height);
    }
    let max_w = policy.max_width.max(1);
    let max_h = policy.max_height.max(1);

    if !policy.preserve_aspect {
        return (width.min(max_w), height.min(max_h));
    }

    if width <= max_w && height <= max_h {
        return (width, height);
    }

    // Integer cross-multiplication: the binding side lands exactly on its bound.
    let (w, h) = (width as u64, height as u64);
    let (mw, mh) = (max_w as u64, max_h as u64);
    if mw * h <= mh * w {
        let new_h = (h * mw / w).clamp(1, h) as u32;
        (max_w, new_h)
    } else {
        let new_w = (w * mh / h).clamp(1, w) as u32;
        (new_w, max_h)
    }
}

/// Apply `policy` to `image`, returning it untouched when it already fits.
pub fn apply(image: DynamicImage, policy: Option<&ResizePolicy>) -> DynamicImage {
    let Some(policy) = policy else {
        return image;
    };
    let (width, height) = (image.width(), image.height());
    let (new_w, new_h) = target_dimensions(width, height, policy);
    if (new_w, new_h) == (width, height) {
        return image;
    }
    tracing::debug!(width, height, new_w, new_h, "Resizing image");
    image.resize_exact(new_w, new_h, FilterType::Lanczos3)
}
