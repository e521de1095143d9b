// Image codec module
// Decodes files into RGBA bitmaps and encodes bitmaps as PNG or JPEG

use crate::bitmap::{Bitmap, ColorMode};
use crate::error::{EditorError, Result};
use clap::ValueEnum;
use image::{DynamicImage, ImageFormat};
use log::{debug, info};
use std::fmt;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Output formats offered by "Save as..."
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SaveFormat {
    Png,
    Jpeg,
}

impl SaveFormat {
    /// Extension appended when the target path has none
    pub fn canonical_extension(self) -> &'static str {
        match self {
            SaveFormat::Png => "png",
            SaveFormat::Jpeg => "jpg",
        }
    }

    /// Whether `ext` already names this format
    pub fn accepts_extension(self, ext: &str) -> bool {
        matches!(
            (self, ext.to_ascii_lowercase().as_str()),
            (SaveFormat::Png, "png") | (SaveFormat::Jpeg, "jpg" | "jpeg")
        )
    }

    /// Whether the encoder can store an alpha channel
    pub fn supports_alpha(self) -> bool {
        matches!(self, SaveFormat::Png)
    }

    /// Resolve the format from the extension of `path`.
    ///
    /// Returns `None` when the path has no png/jpg/jpeg extension; the dot in
    /// a name like `beach.2024` is part of the name, not a format.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy();
        [SaveFormat::Png, SaveFormat::Jpeg]
            .into_iter()
            .find(|format| format.accepts_extension(&ext))
    }

    fn image_format(self) -> ImageFormat {
        match self {
            SaveFormat::Png => ImageFormat::Png,
            SaveFormat::Jpeg => ImageFormat::Jpeg,
        }
    }
}

impl fmt::Display for SaveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveFormat::Png => write!(f, "PNG"),
            SaveFormat::Jpeg => write!(f, "JPEG"),
        }
    }
}

/// Load an image file and normalize it to RGBA
pub fn load(path: &Path) -> Result<Bitmap> {
    let data = fs::read(path).map_err(|e| EditorError::Decode {
        path: path.to_path_buf(),
        source: image::ImageError::IoError(e),
    })?;

    let bitmap = decode(&data, path)?;

    info!(
        "Loaded {} ({}x{})",
        path.display(),
        bitmap.width(),
        bitmap.height()
    );
    Ok(bitmap)
}

/// Load an image from raw bytes (stdin), auto-detecting the format
pub fn load_from_bytes(data: &[u8]) -> Result<Bitmap> {
    decode(data, Path::new("<stdin>"))
}

fn decode(data: &[u8], origin: &Path) -> Result<Bitmap> {
    let decode_error = |source| EditorError::Decode {
        path: origin.to_path_buf(),
        source,
    };

    let format = image::guess_format(data).map_err(decode_error)?;
    debug!("Detected image format: {:?}", format);

    let img = image::load(Cursor::new(data), format).map_err(decode_error)?;

    // Always RGBA in memory, even for grayscale sources, so the display
    // packing is decided only by the editor's grayscale flag
    Bitmap::from_rgba(img.to_rgba8())
}

/// Append the canonical extension unless `path` already carries one for `format`
pub fn with_extension(path: &Path, format: SaveFormat) -> PathBuf {
    let has_extension = path
        .extension()
        .map(|ext| format.accepts_extension(&ext.to_string_lossy()))
        .unwrap_or(false);

    if has_extension {
        path.to_path_buf()
    } else {
        let mut name = path.as_os_str().to_os_string();
        name.push(".");
        name.push(format.canonical_extension());
        PathBuf::from(name)
    }
}

/// Encode `bitmap` to `path` and return the path actually written.
///
/// JPEG cannot store alpha, so RGBA bitmaps lose their alpha channel there.
pub fn save(bitmap: &Bitmap, path: &Path, format: SaveFormat) -> Result<PathBuf> {
    let target = with_extension(path, format);

    let image = match (bitmap.mode(), format.supports_alpha()) {
        (ColorMode::Rgba, false) => DynamicImage::ImageRgb8(bitmap.to_dynamic().to_rgb8()),
        _ => bitmap.to_dynamic(),
    };

    image
        .save_with_format(&target, format.image_format())
        .map_err(|source| EditorError::Encode {
            path: target.clone(),
            source,
        })?;

    info!(
        "Saved {}x{} image as {} to {}",
        bitmap.width(),
        bitmap.height(),
        format,
        target.display()
    );
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn sample_bitmap() -> Bitmap {
        let img = RgbaImage::from_fn(4, 3, |x, y| Rgba([x as u8 * 60, y as u8 * 80, 30, 128]));
        Bitmap::from_rgba(img).unwrap()
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            SaveFormat::from_path(Path::new("a.PNG")),
            Some(SaveFormat::Png)
        );
        assert_eq!(
            SaveFormat::from_path(Path::new("a.jpg")),
            Some(SaveFormat::Jpeg)
        );
        assert_eq!(
            SaveFormat::from_path(Path::new("a.Jpeg")),
            Some(SaveFormat::Jpeg)
        );
        assert_eq!(SaveFormat::from_path(Path::new("a")), None);
        assert_eq!(SaveFormat::from_path(Path::new("a.bmp")), None);
    }

    #[test]
    fn test_dotted_name_gets_default_extension() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("beach.2024");

        let format = SaveFormat::from_path(&target).unwrap_or(SaveFormat::Png);
        assert_eq!(format, SaveFormat::Png);

        let written = save(&sample_bitmap(), &target, format).unwrap();
        assert_eq!(written, dir.path().join("beach.2024.png"));
        assert!(written.exists());
    }

    #[test]
    fn test_with_extension_appends_only_when_missing() {
        assert_eq!(
            with_extension(Path::new("/tmp/out"), SaveFormat::Png),
            PathBuf::from("/tmp/out.png")
        );
        assert_eq!(
            with_extension(Path::new("/tmp/out.jpeg"), SaveFormat::Jpeg),
            PathBuf::from("/tmp/out.jpeg")
        );
        assert_eq!(
            with_extension(Path::new("/tmp/out.png"), SaveFormat::Jpeg),
            PathBuf::from("/tmp/out.png.jpg")
        );
    }

    #[test]
    fn test_png_round_trip_keeps_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let bitmap = sample_bitmap();

        let written = save(&bitmap, &dir.path().join("image"), SaveFormat::Png).unwrap();
        assert_eq!(written, dir.path().join("image.png"));

        let loaded = load(&written).unwrap();
        assert_eq!(loaded, bitmap);
    }

    #[test]
    fn test_jpeg_drops_alpha() {
        let dir = tempfile::tempdir().unwrap();
        let written =
            save(&sample_bitmap(), &dir.path().join("photo.jpg"), SaveFormat::Jpeg).unwrap();

        let decoded = image::open(&written).unwrap();
        assert_eq!(decoded.color(), image::ColorType::Rgb8);
        assert_eq!((decoded.width(), decoded.height()), (4, 3));
    }

    #[test]
    fn test_grayscale_source_loads_as_rgba() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gray.png");
        image::GrayImage::from_pixel(2, 2, image::Luma([90]))
            .save(&path)
            .unwrap();

        let bitmap = load(&path).unwrap();
        assert_eq!(bitmap.mode(), ColorMode::Rgba);
        assert_eq!(bitmap.as_bytes(), &[90, 90, 90, 255].repeat(4)[..]);
    }

    #[test]
    fn test_grayscale_bitmap_saves_single_channel() {
        let dir = tempfile::tempdir().unwrap();
        let gray = Bitmap::new(2, 2, ColorMode::Grayscale, vec![0, 50, 100, 150]).unwrap();

        let written = save(&gray, &dir.path().join("gray"), SaveFormat::Jpeg).unwrap();
        let decoded = image::open(&written).unwrap();
        assert_eq!(decoded.color(), image::ColorType::L8);
    }

    #[test]
    fn test_load_missing_file_is_decode_error() {
        let result = load(Path::new("/definitely/not/here.png"));
        assert!(matches!(result, Err(EditorError::Decode { .. })));
    }

    #[test]
    fn test_load_garbage_bytes_is_decode_error() {
        assert!(matches!(
            load_from_bytes(b"not an image"),
            Err(EditorError::Decode { .. })
        ));
    }

    #[test]
    fn test_save_to_missing_directory_is_encode_error() {
        let result = save(
            &sample_bitmap(),
            Path::new("/definitely/not/here/out.png"),
            SaveFormat::Png,
        );
        assert!(matches!(result, Err(EditorError::Encode { .. })));
    }
}
