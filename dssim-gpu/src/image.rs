//! Image buffer types for the DSSIM pipeline.
//!
//! Two representations exist: the decoded 8-bit RGBA input and the
//! premultiplied linear-light float image uploaded to the GPU. The 8-bit
//! channels are interpreted as already-premultiplied linear values and only
//! normalized to `[0, 1]`; the inverse conversion (used when re-encoding
//! downsampled levels for debug dumps) un-premultiplies and applies the
//! forward sRGB transfer function.

use bytemuck::{Pod, Zeroable};

use crate::error::DssimError;

/// Decoded 8-bit RGBA image, row-major, 4 bytes per pixel.
#[derive(Debug, Clone)]
pub struct ImageRgba8 {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl ImageRgba8 {
    /// Wraps decoded RGBA bytes.
    ///
    /// # Errors
    /// Returns [`DssimError::InvalidInput`] if the dimensions are zero or
    /// the byte count is not exactly `4 * width * height`.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, DssimError> {
        if width == 0 || height == 0 {
            return Err(DssimError::InvalidInput(format!(
                "image dimensions must be nonzero, got {width}x{height}"
            )));
        }
        if pixels.len() % 4 != 0 {
            return Err(DssimError::InvalidInput(format!(
                "rgba8 byte count {} is not divisible by 4",
                pixels.len()
            )));
        }
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(DssimError::InvalidInput(format!(
                "rgba8 byte count {} does not match {width}x{height} (expected {expected})",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Image width in pixels.
    #[inline]
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels.
    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGBA bytes, row-major.
    #[inline]
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Channel count of the decoded representation (always 4).
    #[inline]
    #[must_use]
    pub fn channels(&self) -> u32 {
        4
    }

    /// Verifies that two inputs can be compared.
    ///
    /// # Errors
    /// Returns [`DssimError::InvalidInput`] on any dimension mismatch.
    pub fn ensure_same_dimensions(a: &Self, b: &Self) -> Result<(), DssimError> {
        if a.width != b.width || a.height != b.height {
            return Err(DssimError::InvalidInput(format!(
                "image dimensions don't match: {}x{} vs {}x{}",
                a.width, a.height, b.width, b.height
            )));
        }
        Ok(())
    }

    /// Normalizes to the premultiplied linear float representation.
    ///
    /// Every channel, alpha included, is divided by 255; no transfer
    /// function is applied on input.
    #[must_use]
    pub fn to_linear(&self) -> LinearImage {
        let pixels = self
            .pixels
            .chunks_exact(4)
            .map(|px| LinearRgba {
                r: f32::from(px[0]) / 255.0,
                g: f32::from(px[1]) / 255.0,
                b: f32::from(px[2]) / 255.0,
                a: f32::from(px[3]) / 255.0,
            })
            .collect();
        LinearImage {
            width: self.width,
            height: self.height,
            pixels,
        }
    }
}

/// One premultiplied linear-light RGBA pixel as uploaded to the GPU.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LinearRgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

/// Premultiplied linear-light RGBA float image.
#[derive(Debug, Clone)]
pub struct LinearImage {
    width: u32,
    height: u32,
    pixels: Vec<LinearRgba>,
}

impl LinearImage {
    /// Wraps a pixel buffer produced by a GPU readback.
    ///
    /// # Panics
    /// Panics if the pixel count doesn't match the dimensions; readbacks
    /// are sized from the same dimensions, so a mismatch is a logic error.
    #[must_use]
    pub fn from_pixels(width: u32, height: u32, pixels: Vec<LinearRgba>) -> Self {
        assert_eq!(pixels.len(), width as usize * height as usize);
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Image width in pixels.
    #[inline]
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels.
    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel data, row-major.
    #[inline]
    #[must_use]
    pub fn pixels(&self) -> &[LinearRgba] {
        &self.pixels
    }

    /// Re-encodes to 8-bit RGBA: un-premultiplies, clamps to `[0, 1]`,
    /// applies the forward sRGB transfer function and rounds.
    ///
    /// Fully transparent pixels encode as RGB zero.
    #[must_use]
    pub fn to_rgba8(&self) -> ImageRgba8 {
        let mut out = Vec::with_capacity(self.pixels.len() * 4);
        for px in &self.pixels {
            let a = px.a.clamp(0.0, 1.0);
            let inv_a = if a > 1.0e-8 { 1.0 / a } else { 0.0 };
            let r = (px.r * inv_a).clamp(0.0, 1.0);
            let g = (px.g * inv_a).clamp(0.0, 1.0);
            let b = (px.b * inv_a).clamp(0.0, 1.0);
            out.push(to_unorm8(linear_to_srgb(r)));
            out.push(to_unorm8(linear_to_srgb(g)));
            out.push(to_unorm8(linear_to_srgb(b)));
            out.push(to_unorm8(a));
        }
        ImageRgba8 {
            width: self.width,
            height: self.height,
            pixels: out,
        }
    }
}

/// Forward sRGB transfer function for a linear value in `[0, 1]`.
#[must_use]
pub fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

fn to_unorm8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_dimensions() {
        assert!(matches!(
            ImageRgba8::new(0, 4, vec![]),
            Err(DssimError::InvalidInput(_))
        ));
    }

    #[test]
    fn rejects_non_multiple_of_four() {
        assert!(matches!(
            ImageRgba8::new(1, 1, vec![0, 0, 0]),
            Err(DssimError::InvalidInput(_))
        ));
    }

    #[test]
    fn rejects_wrong_byte_count() {
        assert!(matches!(
            ImageRgba8::new(2, 2, vec![0; 12]),
            Err(DssimError::InvalidInput(_))
        ));
    }

    #[test]
    fn dimension_mismatch_is_invalid_input() {
        let a = ImageRgba8::new(2, 2, vec![0; 16]).unwrap();
        let b = ImageRgba8::new(2, 3, vec![0; 24]).unwrap();
        assert!(ImageRgba8::ensure_same_dimensions(&a, &a).is_ok());
        assert!(matches!(
            ImageRgba8::ensure_same_dimensions(&a, &b),
            Err(DssimError::InvalidInput(_))
        ));
    }

    #[test]
    fn to_linear_normalizes_all_channels() {
        let img = ImageRgba8::new(1, 1, vec![255, 0, 51, 128]).unwrap();
        let linear = img.to_linear();
        let px = linear.pixels()[0];
        assert!((px.r - 1.0).abs() < 1e-6);
        assert!((px.g - 0.0).abs() < 1e-6);
        assert!((px.b - 0.2).abs() < 1e-6);
        assert!((px.a - 128.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn srgb_transfer_endpoints() {
        assert_eq!(linear_to_srgb(0.0), 0.0);
        assert!((linear_to_srgb(1.0) - 1.0).abs() < 1e-6);
        // Below the linear-segment knee.
        assert!((linear_to_srgb(0.002) - 0.02584).abs() < 1e-5);
    }

    #[test]
    fn to_rgba8_unpremultiplies() {
        // Half-coverage premultiplied red: r = 0.5, a = 0.5.
        let linear = LinearImage::from_pixels(
            1,
            1,
            vec![LinearRgba {
                r: 0.5,
                g: 0.0,
                b: 0.0,
                a: 0.5,
            }],
        );
        let rgba = linear.to_rgba8();
        // 0.5 / 0.5 = 1.0 linear -> 255 after the transfer function.
        assert_eq!(rgba.pixels()[0], 255);
        assert_eq!(rgba.pixels()[1], 0);
        assert_eq!(rgba.pixels()[3], 128);
    }

    #[test]
    fn to_rgba8_zero_alpha_is_black() {
        let linear = LinearImage::from_pixels(
            1,
            1,
            vec![LinearRgba {
                r: 0.3,
                g: 0.3,
                b: 0.3,
                a: 0.0,
            }],
        );
        let rgba = linear.to_rgba8();
        assert_eq!(&rgba.pixels()[..4], &[0, 0, 0, 0]);
    }
}
