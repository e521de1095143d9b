// Command line interface module
// Handles parsing of command line arguments and stdin input

use crate::codec::SaveFormat;
use anyhow::{bail, Result};
use clap::Parser;
use std::io::{self, Read};
use std::path::PathBuf;

/// imgor - A minimal image viewer and editor for Wayland
#[derive(Parser, Debug)]
#[command(name = "imgor")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Image to open at startup (can also be provided via stdin pipe)
    #[arg(value_name = "IMAGE")]
    pub image_path: Option<PathBuf>,

    /// Directory the open and save dialogs start in (defaults to ~/Pictures)
    #[arg(short, long, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Format used when a saved file name has no extension
    #[arg(short, long, value_enum, default_value = "png")]
    pub format: SaveFormat,

    /// Let the image be dragged past the window edges
    #[arg(long, default_value = "false")]
    pub free_drag: bool,

    /// Disable GPU rendering and use CPU rendering only
    #[arg(long, default_value = "false")]
    pub cpu: bool,
}

/// Parsed arguments with resolved image source
#[derive(Debug)]
pub struct ParsedArgs {
    pub image_path: Option<PathBuf>,
    pub image_data: Option<Vec<u8>>,
    pub dialog_dir: PathBuf,
    pub default_format: SaveFormat,
    /// Keep the image inside the window while dragging
    pub clamp_drag: bool,
    /// Use GPU rendering (default true, set to false with --cpu)
    pub use_gpu: bool,
}

/// Check if stdin has data available (is a pipe)
fn stdin_has_data() -> bool {
    !atty::is(atty::Stream::Stdin)
}

/// Read image data from stdin
fn read_stdin() -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    io::stdin().read_to_end(&mut buffer)?;
    Ok(buffer)
}

/// Default dialog directory: the user's pictures folder
pub fn default_dialog_dir() -> PathBuf {
    // Windows spells the folder in lower case
    let pictures = if cfg!(windows) { "pictures" } else { "Pictures" };
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(pictures))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Parse command line arguments and handle stdin input
pub fn parse_args() -> Result<ParsedArgs> {
    resolve(Args::parse())
}

fn resolve(args: Args) -> Result<ParsedArgs> {
    // Without a path, a pipe on stdin provides the startup image
    let image_data = if args.image_path.is_none() && stdin_has_data() {
        let data = read_stdin()?;
        if data.is_empty() {
            bail!("No data received from stdin");
        }
        Some(data)
    } else {
        None
    };

    let dialog_dir = match args.dir {
        Some(dir) if !dir.is_dir() => bail!("Not a directory: {}", dir.display()),
        Some(dir) => dir,
        None => default_dialog_dir(),
    };

    Ok(ParsedArgs {
        image_path: args.image_path,
        image_data,
        dialog_dir,
        default_format: args.format,
        clamp_drag: !args.free_drag,
        use_gpu: !args.cpu, // GPU is default, --cpu disables it
    })
}
