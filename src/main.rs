// imgor - A minimal image viewer and editor for Wayland
// Shows one image in a layer-shell window and applies simple edits from a context menu

mod app;
mod bitmap;
mod cli;
mod codec;
mod display;
mod drag;
mod error;
mod menu;
mod transform;
mod wayland;
mod wgpu_renderer;

use anyhow::{Context, Result};
use app::AppState;
use log::info;

fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Parse command line arguments
    let args = cli::parse_args()?;

    info!(
        "Starting imgor with image: {:?}, dialog dir: {}",
        args.image_path,
        args.dialog_dir.display()
    );

    // A startup image that fails to decode is fatal
    let editor = if let Some(ref path) = args.image_path {
        let image = codec::load(path)
            .with_context(|| format!("Failed to load image: {}", path.display()))?;
        AppState::with_image(image)
    } else if let Some(ref data) = args.image_data {
        let image = codec::load_from_bytes(data).context("Failed to load image from stdin")?;
        AppState::with_image(image)
    } else {
        AppState::new()
    };

    if let Some(image) = editor.working() {
        info!("Image loaded: {}x{} pixels", image.width(), image.height());
    }

    // Run with layer-shell (GPU rendering by default, CPU as fallback)
    info!("Using layer-shell top layer (GPU: {})", args.use_gpu);
    wayland::run(
        editor,
        wayland::ShellOptions {
            dialog_dir: args.dialog_dir,
            default_format: args.default_format,
            clamp_drag: args.clamp_drag,
            use_gpu: args.use_gpu,
        },
    )
}
