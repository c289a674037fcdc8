//! Video frames handed to the pipeline by a frame source.

use std::borrow::Cow;

use image::{GrayImage, Luma, RgbImage};

/// Pixel storage of one frame.
#[derive(Debug, Clone)]
pub enum FramePixels {
    /// Single-channel 8-bit image.
    Gray(GrayImage),
    /// Three-channel 8-bit RGB image.
    Rgb(RgbImage),
}

/// An immutable image tagged with its monotonically increasing index.
#[derive(Debug, Clone)]
pub struct Frame {
    index: u64,
    pixels: FramePixels,
}

/// ITU-R BT.601 luma (`0.299 R + 0.587 G + 0.114 B`), truncated.
#[inline]
pub fn luma_601(rgb: [u8; 3]) -> u8 {
    let weighted = 299 * rgb[0] as u32 + 587 * rgb[1] as u32 + 114 * rgb[2] as u32;
    (weighted / 1000) as u8
}

impl Frame {
    pub fn gray(index: u64, image: GrayImage) -> Self {
        Self {
            index,
            pixels: FramePixels::Gray(image),
        }
    }

    pub fn rgb(index: u64, image: RgbImage) -> Self {
        Self {
            index,
            pixels: FramePixels::Rgb(image),
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn pixels(&self) -> &FramePixels {
        &self.pixels
    }

    /// `(width, height)` in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        match &self.pixels {
            FramePixels::Gray(img) => img.dimensions(),
            FramePixels::Rgb(img) => img.dimensions(),
        }
    }

    /// Luma at an in-bounds pixel.
    #[inline]
    pub fn luma(&self, x: u32, y: u32) -> u8 {
        match &self.pixels {
            FramePixels::Gray(img) => img.get_pixel(x, y)[0],
            FramePixels::Rgb(img) => luma_601(img.get_pixel(x, y).0),
        }
    }

    /// Luma at a signed coordinate, or `None` outside the frame.
    #[inline]
    pub fn luma_checked(&self, x: i64, y: i64) -> Option<u8> {
        let (w, h) = self.dimensions();
        if x < 0 || y < 0 || x >= w as i64 || y >= h as i64 {
            return None;
        }
        Some(self.luma(x as u32, y as u32))
    }

    /// Grayscale view; borrows single-channel frames without copying.
    pub fn to_gray(&self) -> Cow<'_, GrayImage> {
        match &self.pixels {
            FramePixels::Gray(img) => Cow::Borrowed(img),
            FramePixels::Rgb(img) => {
                let (w, h) = img.dimensions();
                Cow::Owned(GrayImage::from_fn(w, h, |x, y| {
                    Luma([luma_601(img.get_pixel(x, y).0)])
                }))
            }
        }
    }
}
