// Bitmap module
// Immutable in-memory image shared between the editor state and the transforms

use crate::error::{EditorError, Result};
use image::{DynamicImage, GrayImage, RgbaImage};
use std::rc::Rc;

/// Pixel layout of a bitmap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    /// 4 bytes per pixel, R G B A
    Rgba,
    /// 1 byte per pixel, luma
    Grayscale,
}

impl ColorMode {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            ColorMode::Rgba => 4,
            ColorMode::Grayscale => 1,
        }
    }
}

/// Decoded image with a tightly packed pixel buffer.
///
/// The buffer is reference counted, so cloning a `Bitmap` never copies pixels.
/// There is no way to mutate a bitmap after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    mode: ColorMode,
    data: Rc<[u8]>,
}

impl Bitmap {
    /// Create a bitmap, checking that the buffer matches the dimensions
    pub fn new(width: u32, height: u32, mode: ColorMode, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * mode.bytes_per_pixel();
        if width == 0 || height == 0 || data.len() != expected {
            return Err(EditorError::InvalidBitmap {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            width,
            height,
            mode,
            data: data.into(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn mode(&self) -> ColorMode {
        self.mode
    }

    pub fn is_grayscale(&self) -> bool {
        self.mode == ColorMode::Grayscale
    }

    /// Raw pixel bytes, row-major with no padding
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Copy the pixels into an `image` buffer of the matching variant
    pub fn to_dynamic(&self) -> DynamicImage {
        let data = self.data.to_vec();
        match self.mode {
            ColorMode::Rgba => DynamicImage::ImageRgba8(
                RgbaImage::from_raw(self.width, self.height, data)
                    .expect("bitmap length is validated in Bitmap::new"),
            ),
            ColorMode::Grayscale => DynamicImage::ImageLuma8(
                GrayImage::from_raw(self.width, self.height, data)
                    .expect("bitmap length is validated in Bitmap::new"),
            ),
        }
    }

    /// Build a bitmap from a decoded image.
    ///
    /// Luma8 images stay grayscale; every other layout is normalized to RGBA.
    pub fn from_dynamic(image: DynamicImage) -> Result<Self> {
        match image {
            DynamicImage::ImageLuma8(gray) => {
                let (width, height) = gray.dimensions();
                Self::new(width, height, ColorMode::Grayscale, gray.into_raw())
            }
            other => Self::from_rgba(other.to_rgba8()),
        }
    }

    pub fn from_rgba(rgba: RgbaImage) -> Result<Self> {
        let (width, height) = rgba.dimensions();
        Self::new(width, height, ColorMode::Rgba, rgba.into_raw())
    }
}
