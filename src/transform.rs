// Transform module
// Pure image operations: each takes a bitmap and returns a new one

use crate::bitmap::{Bitmap, ColorMode};
use image::DynamicImage;
use log::debug;

/// Blur radius used by the "Gaussian Blur" command
pub const DEFAULT_BLUR_RADIUS: f32 = 2.0;

/// ITU-R BT.601 luma weights in 16.16 fixed point (0.299, 0.587, 0.114)
const LUMA_R: u32 = 19595;
const LUMA_G: u32 = 38470;
const LUMA_B: u32 = 7471;

/// Quarter turn direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    /// +90 degrees, counter-clockwise
    Left,
    /// -90 degrees, clockwise
    Right,
}

impl Rotation {
    pub fn degrees(self) -> i32 {
        match self {
            Rotation::Left => 90,
            Rotation::Right => -90,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipAxis {
    /// Mirror left and right
    Horizontal,
    /// Mirror top and bottom
    Vertical,
}

/// The transforms offered in the image menu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    Grayscale,
    GaussianBlur,
    RotateLeft,
    RotateRight,
    FlipHorizontal,
    FlipVertical,
}

impl TransformKind {
    pub fn apply(self, bitmap: &Bitmap) -> Bitmap {
        debug!(
            "Applying {:?} to {}x{} bitmap",
            self,
            bitmap.width(),
            bitmap.height()
        );
        match self {
            TransformKind::Grayscale => to_grayscale(bitmap),
            TransformKind::GaussianBlur => gaussian_blur(bitmap, DEFAULT_BLUR_RADIUS),
            TransformKind::RotateLeft => rotate(bitmap, Rotation::Left),
            TransformKind::RotateRight => rotate(bitmap, Rotation::Right),
            TransformKind::FlipHorizontal => flip(bitmap, FlipAxis::Horizontal),
            TransformKind::FlipVertical => flip(bitmap, FlipAxis::Vertical),
        }
    }
}

/// Luma of one RGB pixel, rounded
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((LUMA_R * r as u32 + LUMA_G * g as u32 + LUMA_B * b as u32 + 0x8000) >> 16) as u8
}

/// Convert to single-channel grayscale. Alpha is discarded.
pub fn to_grayscale(bitmap: &Bitmap) -> Bitmap {
    if bitmap.is_grayscale() {
        return bitmap.clone();
    }

    let gray: Vec<u8> = bitmap
        .as_bytes()
        .chunks_exact(4)
        .map(|px| luma(px[0], px[1], px[2]))
        .collect();

    Bitmap::new(bitmap.width(), bitmap.height(), ColorMode::Grayscale, gray)
        .expect("one luma byte per source pixel")
}

/// Separable Gaussian blur with standard deviation `radius`; keeps the color mode
pub fn gaussian_blur(bitmap: &Bitmap, radius: f32) -> Bitmap {
    map_image(bitmap, |img| img.blur(radius))
}

/// Rotate by a quarter turn; width and height swap
pub fn rotate(bitmap: &Bitmap, rotation: Rotation) -> Bitmap {
    debug!("Rotating by {} degrees", rotation.degrees());
    map_image(bitmap, |img| match rotation {
        Rotation::Left => img.rotate270(),
        Rotation::Right => img.rotate90(),
    })
}

pub fn flip(bitmap: &Bitmap, axis: FlipAxis) -> Bitmap {
    map_image(bitmap, |img| match axis {
        FlipAxis::Horizontal => img.fliph(),
        FlipAxis::Vertical => img.flipv(),
    })
}

/// Run an `image` operation that preserves the pixel layout
fn map_image(bitmap: &Bitmap, op: impl FnOnce(&DynamicImage) -> DynamicImage) -> Bitmap {
    let out = op(&bitmap.to_dynamic());
    // Blur, rotate and flip keep the variant and the pixel count
    Bitmap::from_dynamic(out).expect("image operation preserved the pixel layout")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// 2 wide x 3 tall, pixel value encodes its position
    fn numbered_rgba() -> Bitmap {
        let data = (0..6u8).flat_map(|i| [i, i * 10, i * 20, 255]).collect();
        Bitmap::new(2, 3, ColorMode::Rgba, data).unwrap()
    }

    fn red_at(bitmap: &Bitmap, x: u32, y: u32) -> u8 {
        bitmap.as_bytes()[((y * bitmap.width() + x) * 4) as usize]
    }

    fn arb_bitmap() -> impl Strategy<Value = Bitmap> {
        (1u32..7, 1u32..7, any::<bool>()).prop_flat_map(|(w, h, gray)| {
            let mode = if gray { ColorMode::Grayscale } else { ColorMode::Rgba };
            let len = (w * h) as usize * mode.bytes_per_pixel();
            prop::collection::vec(any::<u8>(), len)
                .prop_map(move |data| Bitmap::new(w, h, mode, data).unwrap())
        })
    }

    #[test]
    fn test_red_square_to_grayscale() {
        let red = Bitmap::new(4, 4, ColorMode::Rgba, [255, 0, 0, 255].repeat(16)).unwrap();
        let gray = to_grayscale(&red);

        assert_eq!(gray.mode(), ColorMode::Grayscale);
        assert_eq!(gray.dimensions(), (4, 4));
        assert_eq!(gray.as_bytes().len(), 16);
        assert!(gray.as_bytes().iter().all(|&v| v == 76));
    }

    #[test]
    fn test_luma_extremes() {
        assert_eq!(luma(0, 0, 0), 0);
        assert_eq!(luma(255, 255, 255), 255);
        assert_eq!(luma(0, 255, 0), 150);
        assert_eq!(luma(0, 0, 255), 29);
    }

    #[test]
    fn test_grayscale_of_grayscale_is_unchanged() {
        let gray = Bitmap::new(2, 1, ColorMode::Grayscale, vec![3, 4]).unwrap();
        assert_eq!(to_grayscale(&gray), gray);
    }

    #[test]
    fn test_rotate_left_swaps_dimensions() {
        let rotated = rotate(&numbered_rgba(), Rotation::Left);
        assert_eq!(rotated.dimensions(), (3, 2));
        // Counter-clockwise: the source top-right pixel (index 1) becomes top-left
        assert_eq!(red_at(&rotated, 0, 0), 1);
        // and the source top-left pixel (index 0) becomes bottom-left
        assert_eq!(red_at(&rotated, 0, 1), 0);
    }

    #[test]
    fn test_rotate_right_moves_bottom_left_to_top_left() {
        let rotated = rotate(&numbered_rgba(), Rotation::Right);
        assert_eq!(rotated.dimensions(), (3, 2));
        assert_eq!(red_at(&rotated, 0, 0), 4);
        assert_eq!(red_at(&rotated, 2, 0), 0);
    }

    #[test]
    fn test_flip_horizontal_mirrors_rows() {
        let flipped = flip(&numbered_rgba(), FlipAxis::Horizontal);
        assert_eq!(flipped.dimensions(), (2, 3));
        assert_eq!(red_at(&flipped, 0, 0), 1);
        assert_eq!(red_at(&flipped, 1, 0), 0);
    }

    #[test]
    fn test_flip_vertical_mirrors_columns() {
        let flipped = flip(&numbered_rgba(), FlipAxis::Vertical);
        assert_eq!(red_at(&flipped, 0, 0), 4);
        assert_eq!(red_at(&flipped, 0, 2), 0);
    }

    #[test]
    fn test_blur_keeps_shape_and_mode() {
        let gray = Bitmap::new(5, 4, ColorMode::Grayscale, vec![128; 20]).unwrap();
        let blurred = gaussian_blur(&gray, DEFAULT_BLUR_RADIUS);
        assert_eq!(blurred.mode(), ColorMode::Grayscale);
        assert_eq!(blurred.dimensions(), (5, 4));

        let blurred = gaussian_blur(&numbered_rgba(), DEFAULT_BLUR_RADIUS);
        assert_eq!(blurred.mode(), ColorMode::Rgba);
        assert_eq!(blurred.dimensions(), (2, 3));
    }

    #[test]
    fn test_blur_smooths_a_single_spike() {
        let mut data = vec![0u8; 9 * 9];
        data[4 * 9 + 4] = 255;
        let spike = Bitmap::new(9, 9, ColorMode::Grayscale, data).unwrap();

        let blurred = gaussian_blur(&spike, DEFAULT_BLUR_RADIUS);
        let center = blurred.as_bytes()[4 * 9 + 4];
        let neighbor = blurred.as_bytes()[4 * 9 + 5];
        assert!(center < 255);
        assert!(neighbor > 0);
    }

    #[test]
    fn test_transforms_do_not_touch_input() {
        let source = numbered_rgba();
        let before = source.as_bytes().to_vec();
        for kind in [
            TransformKind::Grayscale,
            TransformKind::GaussianBlur,
            TransformKind::RotateLeft,
            TransformKind::RotateRight,
            TransformKind::FlipHorizontal,
            TransformKind::FlipVertical,
        ] {
            let _ = kind.apply(&source);
        }
        assert_eq!(source.as_bytes(), &before[..]);
    }

    proptest! {
        #[test]
        fn prop_double_flip_is_identity(bitmap in arb_bitmap(), horizontal in any::<bool>()) {
            let axis = if horizontal { FlipAxis::Horizontal } else { FlipAxis::Vertical };
            prop_assert_eq!(flip(&flip(&bitmap, axis), axis), bitmap);
        }

        #[test]
        fn prop_opposite_rotations_cancel(bitmap in arb_bitmap()) {
            let there = rotate(&bitmap, Rotation::Left);
            prop_assert_eq!(there.dimensions(), (bitmap.height(), bitmap.width()));
            prop_assert_eq!(rotate(&there, Rotation::Right), bitmap);
        }

        #[test]
        fn prop_grayscale_is_one_byte_per_pixel(bitmap in arb_bitmap()) {
            let gray = to_grayscale(&bitmap);
            prop_assert_eq!(gray.mode(), ColorMode::Grayscale);
            prop_assert_eq!(gray.as_bytes().len(), (bitmap.width() * bitmap.height()) as usize);
        }

        #[test]
        fn prop_transforms_keep_mode(bitmap in arb_bitmap()) {
            for kind in [
                TransformKind::GaussianBlur,
                TransformKind::RotateLeft,
                TransformKind::RotateRight,
                TransformKind::FlipHorizontal,
                TransformKind::FlipVertical,
            ] {
                prop_assert_eq!(kind.apply(&bitmap).mode(), bitmap.mode());
            }
        }
    }
}
