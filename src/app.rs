// Application state module
// Owns the editor state and maps each user action to a handler

use crate::bitmap::Bitmap;
use crate::codec::{self, SaveFormat};
use crate::display::{self, DisplayBuffer};
use crate::error::{EditorError, Result};
use crate::transform::TransformKind;
use log::info;
use std::path::{Path, PathBuf};

/// Something the user asked the editor to do
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Load(PathBuf),
    SaveAs { path: PathBuf, format: SaveFormat },
    Transform(TransformKind),
    ResetRotation,
}

/// Editor state: the loaded image, the latest edit and the grayscale flag.
///
/// Handlers never mutate in place; `dispatch` returns the next state so a
/// failed action leaves the current one untouched.
#[derive(Debug, Clone, Default)]
pub struct AppState {
    /// The image as loaded from disk
    pub original: Option<Bitmap>,
    /// Result of the last transform, if any
    pub current: Option<Bitmap>,
    /// Set once a grayscale conversion ran; selects the display packing
    pub is_grayscale: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State for a freshly loaded image
    pub fn with_image(image: Bitmap) -> Self {
        Self {
            original: Some(image),
            current: None,
            is_grayscale: false,
        }
    }

    /// The bitmap the next transform or save applies to
    pub fn working(&self) -> Option<&Bitmap> {
        self.current.as_ref().or(self.original.as_ref())
    }

    pub fn has_image(&self) -> bool {
        self.original.is_some()
    }

    /// Pack the working bitmap for display
    pub fn render(&self) -> Option<DisplayBuffer> {
        let bitmap = self.working()?;
        debug_assert_eq!(bitmap.is_grayscale(), self.is_grayscale);
        Some(display::to_display_buffer(bitmap))
    }

    /// Run `action` against this state and return the resulting state
    pub fn dispatch(&self, action: &Action) -> Result<AppState> {
        match action {
            Action::Load(path) => load(path),
            Action::SaveAs { path, format } => self.save_as(path, *format),
            Action::Transform(kind) => self.transform(*kind),
            Action::ResetRotation => Err(EditorError::Unimplemented("rotation reset")),
        }
    }

    fn save_as(&self, path: &Path, format: SaveFormat) -> Result<AppState> {
        let bitmap = self.working().ok_or(EditorError::NoImageLoaded)?;
        codec::save(bitmap, path, format)?;
        Ok(self.clone())
    }

    fn transform(&self, kind: TransformKind) -> Result<AppState> {
        let bitmap = self.working().ok_or(EditorError::NoImageLoaded)?;
        let result = kind.apply(bitmap);
        info!(
            "{:?}: {}x{} -> {}x{}",
            kind,
            bitmap.width(),
            bitmap.height(),
            result.width(),
            result.height()
        );

        Ok(AppState {
            original: self.original.clone(),
            is_grayscale: self.is_grayscale || kind == TransformKind::Grayscale,
            current: Some(result),
        })
    }
}

fn load(path: &Path) -> Result<AppState> {
    codec::load(path).map(AppState::with_image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::ColorMode;
    use crate::display::PixelFormat;

    fn red_square() -> Bitmap {
        Bitmap::new(4, 4, ColorMode::Rgba, [255, 0, 0, 255].repeat(16)).unwrap()
    }

    fn two_by_three() -> Bitmap {
        Bitmap::new(2, 3, ColorMode::Rgba, vec![200; 24]).unwrap()
    }

    fn apply(state: &AppState, kind: TransformKind) -> AppState {
        state.dispatch(&Action::Transform(kind)).unwrap()
    }

    #[test]
    fn test_transform_without_image_fails() {
        let state = AppState::new();
        let result = state.dispatch(&Action::Transform(TransformKind::RotateLeft));
        assert!(matches!(result, Err(EditorError::NoImageLoaded)));
        assert!(state.render().is_none());
    }

    #[test]
    fn test_save_without_image_fails_and_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new();
        let result = state.dispatch(&Action::SaveAs {
            path: dir.path().join("out"),
            format: SaveFormat::Png,
        });

        assert!(matches!(result, Err(EditorError::NoImageLoaded)));
        assert!(!state.has_image());
        assert!(state.current.is_none());
        assert!(!state.is_grayscale);
        assert!(!dir.path().join("out.png").exists());
    }

    #[test]
    fn test_reset_rotation_is_unimplemented() {
        let state = AppState::with_image(red_square());
        assert!(matches!(
            state.dispatch(&Action::ResetRotation),
            Err(EditorError::Unimplemented(_))
        ));
    }

    #[test]
    fn test_grayscale_scenario() {
        let state = apply(&AppState::with_image(red_square()), TransformKind::Grayscale);

        assert!(state.is_grayscale);
        let buffer = state.render().unwrap();
        assert_eq!(buffer.format, PixelFormat::Grayscale8);
        assert_eq!((buffer.width, buffer.height), (4, 4));
        assert_eq!(buffer.data, vec![76u8; 16]);
        // The loaded image is kept as is
        assert_eq!(state.original, Some(red_square()));
    }

    #[test]
    fn test_rotate_scenario() {
        let state = apply(&AppState::with_image(two_by_three()), TransformKind::RotateLeft);
        let buffer = state.render().unwrap();
        assert_eq!((buffer.width, buffer.height), (3, 2));
    }

    #[test]
    fn test_transforms_chain_on_current() {
        let state = AppState::with_image(two_by_three());
        let state = apply(&state, TransformKind::RotateLeft);
        let state = apply(&state, TransformKind::RotateLeft);
        assert_eq!(state.working().unwrap().dimensions(), (2, 3));

        let state = apply(&state, TransformKind::RotateRight);
        assert_eq!(state.working().unwrap().dimensions(), (3, 2));
    }

    #[test]
    fn test_grayscale_flag_survives_later_transforms() {
        let state = AppState::with_image(red_square());
        let state = apply(&state, TransformKind::Grayscale);
        let state = apply(&state, TransformKind::GaussianBlur);
        let state = apply(&state, TransformKind::FlipHorizontal);

        assert!(state.is_grayscale);
        assert_eq!(state.render().unwrap().format, PixelFormat::Grayscale8);
    }

    #[test]
    fn test_rgba_render_packing() {
        let state = AppState::with_image(red_square());
        let buffer = state.render().unwrap();
        assert_eq!(buffer.format, PixelFormat::Rgba8888);
        assert_eq!(buffer.stride, 16);
    }

    #[test]
    fn test_load_resets_grayscale_and_current() {
        let dir = tempfile::tempdir().unwrap();
        let path = codec::save(&two_by_three(), &dir.path().join("a"), SaveFormat::Png).unwrap();

        let edited = apply(&AppState::with_image(red_square()), TransformKind::Grayscale);
        let reloaded = edited.dispatch(&Action::Load(path)).unwrap();

        assert!(!reloaded.is_grayscale);
        assert!(reloaded.current.is_none());
        assert_eq!(reloaded.working().unwrap().dimensions(), (2, 3));
    }

    #[test]
    fn test_failed_load_keeps_previous_state() {
        let state = apply(&AppState::with_image(red_square()), TransformKind::RotateLeft);
        let result = state.dispatch(&Action::Load(PathBuf::from("/no/such/file.png")));

        assert!(matches!(result, Err(EditorError::Decode { .. })));
        assert!(state.current.is_some());
        assert_eq!(state.original, Some(red_square()));
    }

    #[test]
    fn test_save_as_jpeg_writes_current() {
        let dir = tempfile::tempdir().unwrap();
        let state = apply(&AppState::with_image(two_by_three()), TransformKind::RotateRight);

        let next = state
            .dispatch(&Action::SaveAs {
                path: dir.path().join("rotated"),
                format: SaveFormat::Jpeg,
            })
            .unwrap();

        let saved = image::open(dir.path().join("rotated.jpg")).unwrap();
        assert_eq!((saved.width(), saved.height()), (3, 2));
        assert_eq!(saved.color(), image::ColorType::Rgb8);
        assert_eq!(next.current, state.current);
    }

    #[test]
    fn test_save_falls_back_to_original() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::with_image(two_by_three());
        state
            .dispatch(&Action::SaveAs {
                path: dir.path().join("copy.png"),
                format: SaveFormat::Png,
            })
            .unwrap();

        let saved = codec::load(&dir.path().join("copy.png")).unwrap();
        assert_eq!(saved, two_by_three());
    }
}
