// Display buffer module
// Packs bitmaps into display buffers and composites them onto window canvases

use crate::bitmap::{Bitmap, ColorMode};

/// Pixel format tag of a display buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 1 byte per pixel
    Grayscale8,
    /// 4 bytes per pixel in R G B A order
    Rgba8888,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Grayscale8 => 1,
            PixelFormat::Rgba8888 => 4,
        }
    }
}

/// Pixels ready to be shown, owning their own copy of the bytes
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayBuffer {
    pub width: u32,
    pub height: u32,
    /// Bytes per row
    pub stride: usize,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

/// Pack a bitmap for display.
///
/// The result never aliases the bitmap's storage.
pub fn to_display_buffer(bitmap: &Bitmap) -> DisplayBuffer {
    let format = match bitmap.mode() {
        ColorMode::Grayscale => PixelFormat::Grayscale8,
        ColorMode::Rgba => PixelFormat::Rgba8888,
    };
    let stride = bitmap.width() as usize * format.bytes_per_pixel();

    debug_assert_eq!(bitmap.as_bytes().len(), stride * bitmap.height() as usize);

    DisplayBuffer {
        width: bitmap.width(),
        height: bitmap.height(),
        stride,
        format,
        data: bitmap.as_bytes().to_vec(),
    }
}

impl DisplayBuffer {
    /// Read one pixel expanded to RGBA
    pub fn rgba_at(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = y as usize * self.stride + x as usize * self.format.bytes_per_pixel();
        match self.format {
            PixelFormat::Grayscale8 => {
                let v = self.data[idx];
                [v, v, v, 255]
            }
            PixelFormat::Rgba8888 => [
                self.data[idx],
                self.data[idx + 1],
                self.data[idx + 2],
                self.data[idx + 3],
            ],
        }
    }

    /// Expand the whole buffer to tightly packed RGBA (texture upload)
    pub fn to_rgba8(&self) -> Vec<u8> {
        match self.format {
            PixelFormat::Rgba8888 => self.data.clone(),
            PixelFormat::Grayscale8 => self
                .data
                .iter()
                .flat_map(|&v| [v, v, v, 255])
                .collect(),
        }
    }

    /// Composite onto an ARGB8888 canvas (B G R A bytes in little-endian).
    ///
    /// `origin` is the top-left corner of the buffer in canvas coordinates.
    /// Source alpha is blended over the canvas; anything outside is clipped.
    pub fn blit_bgra(
        &self,
        canvas: &mut [u8],
        canvas_width: u32,
        canvas_height: u32,
        origin: (i32, i32),
    ) {
        let (ox, oy) = origin;

        // Visible range of the buffer, in buffer coordinates
        let x_start = (-ox).max(0) as u32;
        let y_start = (-oy).max(0) as u32;
        let x_end = (canvas_width as i64 - ox as i64).clamp(0, self.width as i64) as u32;
        let y_end = (canvas_height as i64 - oy as i64).clamp(0, self.height as i64) as u32;

        for y in y_start..y_end {
            let dst_row = ((oy + y as i32) as u32 * canvas_width) as usize * 4;
            for x in x_start..x_end {
                let dst_idx = dst_row + (ox + x as i32) as usize * 4;
                if dst_idx + 3 >= canvas.len() {
                    continue;
                }

                let [r, g, b, a] = self.rgba_at(x, y);
                let pixel = &mut canvas[dst_idx..dst_idx + 4];
                if a == 255 {
                    pixel.copy_from_slice(&[b, g, r, 255]);
                } else {
                    let alpha = a as u32;
                    let inv = 255 - alpha;
                    pixel[0] = ((b as u32 * alpha + pixel[0] as u32 * inv) / 255) as u8;
                    pixel[1] = ((g as u32 * alpha + pixel[1] as u32 * inv) / 255) as u8;
                    pixel[2] = ((r as u32 * alpha + pixel[2] as u32 * inv) / 255) as u8;
                    pixel[3] = (alpha + pixel[3] as u32 * inv / 255) as u8;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgba_bitmap() -> Bitmap {
        // 2x2: red, green / blue, half-transparent white
        Bitmap::new(
            2,
            2,
            ColorMode::Rgba,
            vec![
                255, 0, 0, 255, 0, 255, 0, 255, //
                0, 0, 255, 255, 255, 255, 255, 0,
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_rgba_packing() {
        let buffer = to_display_buffer(&rgba_bitmap());
        assert_eq!(buffer.format, PixelFormat::Rgba8888);
        assert_eq!(buffer.stride, 8);
        assert_eq!(buffer.data.len(), 16);
        assert_eq!(buffer.rgba_at(1, 0), [0, 255, 0, 255]);
    }

    #[test]
    fn test_grayscale_packing() {
        let bitmap = Bitmap::new(3, 2, ColorMode::Grayscale, vec![1, 2, 3, 4, 5, 6]).unwrap();
        let buffer = to_display_buffer(&bitmap);
        assert_eq!(buffer.format, PixelFormat::Grayscale8);
        assert_eq!(buffer.stride, 3);
        assert_eq!(buffer.rgba_at(2, 1), [6, 6, 6, 255]);
        assert_eq!(buffer.to_rgba8().len(), 3 * 2 * 4);
    }

    #[test]
    fn test_buffer_does_not_alias_bitmap() {
        let bitmap = rgba_bitmap();
        let buffer = to_display_buffer(&bitmap);
        assert_ne!(bitmap.as_bytes().as_ptr(), buffer.data.as_ptr());

        drop(bitmap);
        assert_eq!(buffer.rgba_at(0, 0), [255, 0, 0, 255]);
    }

    #[test]
    fn test_blit_swaps_to_bgra_and_offsets() {
        let buffer = to_display_buffer(&rgba_bitmap());
        let mut canvas = vec![0u8; 4 * 4 * 4];

        buffer.blit_bgra(&mut canvas, 4, 4, (1, 1));

        // Red pixel lands at (1, 1) as B G R A
        let idx = (4 + 1) * 4;
        assert_eq!(&canvas[idx..idx + 4], &[0, 0, 255, 255]);
        // Fully transparent source keeps the canvas
        let idx = (2 * 4 + 2) * 4;
        assert_eq!(&canvas[idx..idx + 4], &[0, 0, 0, 0]);
        // Untouched corner
        assert_eq!(&canvas[0..4], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_blit_clips_negative_origin() {
        let buffer = to_display_buffer(&rgba_bitmap());
        let mut canvas = vec![9u8; 2 * 2 * 4];

        buffer.blit_bgra(&mut canvas, 2, 2, (-1, -1));

        // Only the bottom-right source pixel (transparent) maps to (0, 0)
        assert_eq!(&canvas[0..4], &[9, 9, 9, 9]);
        assert_eq!(&canvas[4..], &[9u8; 12][..]);
    }

    #[test]
    fn test_blit_outside_canvas_is_noop() {
        let buffer = to_display_buffer(&rgba_bitmap());
        let mut canvas = vec![0u8; 2 * 2 * 4];

        buffer.blit_bgra(&mut canvas, 2, 2, (5, 5));
        buffer.blit_bgra(&mut canvas, 2, 2, (-5, 0));

        assert!(canvas.iter().all(|&b| b == 0));
    }
}
