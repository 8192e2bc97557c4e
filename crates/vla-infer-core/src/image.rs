//! Image acquisition for inference inputs

use crate::error::Result;
use image::{Rgb, RgbImage};
use std::path::Path;

/// Side length of the placeholder image used in mock mode
pub const PLACEHOLDER_SIZE: u32 = 224;

/// Color of the placeholder image used in mock mode (pure red)
pub const PLACEHOLDER_COLOR: [u8; 3] = [255, 0, 0];

/// Open an image file and convert it to 8-bit RGB
pub fn load_rgb(path: impl AsRef<Path>) -> Result<RgbImage> {
    let path = path.as_ref();
    tracing::debug!("Reading image from {}", path.display());

    let image = image::open(path)?.to_rgb8();
    tracing::debug!("Decoded {}x{} image", image.width(), image.height());

    Ok(image)
}

/// Build a uniform-color RGB image
pub fn solid_rgb(width: u32, height: u32, color: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb(color))
}

/// The 224x224 red stand-in used when no image is supplied in mock mode
pub fn placeholder() -> RgbImage {
    solid_rgb(PLACEHOLDER_SIZE, PLACEHOLDER_SIZE, PLACEHOLDER_COLOR)
}
