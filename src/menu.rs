// Context menu module
// The commands offered to the user, their layout on screen and label rendering

use crate::transform::TransformKind;
use cosmic_text::{Attrs, Buffer, Color, FontSystem, Metrics, Shaping, SwashCache};
use log::debug;

pub const MENU_ITEM_HEIGHT: u32 = 25;
pub const MENU_WIDTH: u32 = 230;

const FONT_SIZE: f32 = 14.0;
const LINE_HEIGHT: f32 = 18.0;
const TEXT_PADDING_X: u32 = 10;
const TEXT_PADDING_Y: u32 = 3;

/// BGRA colors
const ITEM_BG: [u8; 4] = [60, 60, 60, 235];
const ITEM_HOVER_BG: [u8; 4] = [180, 120, 60, 235];
const BORDER: [u8; 4] = [100, 100, 100, 255];

/// Everything the user can trigger from the menu or the keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuCommand {
    Open,
    SaveAs,
    ResetRotation,
    Transform(TransformKind),
    Exit,
}

impl MenuCommand {
    /// Menu entries, top to bottom
    pub const ALL: [MenuCommand; 10] = [
        MenuCommand::Open,
        MenuCommand::SaveAs,
        MenuCommand::ResetRotation,
        MenuCommand::Transform(TransformKind::RotateLeft),
        MenuCommand::Transform(TransformKind::RotateRight),
        MenuCommand::Transform(TransformKind::FlipHorizontal),
        MenuCommand::Transform(TransformKind::FlipVertical),
        MenuCommand::Transform(TransformKind::Grayscale),
        MenuCommand::Transform(TransformKind::GaussianBlur),
        MenuCommand::Exit,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MenuCommand::Open => "Open...",
            MenuCommand::SaveAs => "Save as...",
            MenuCommand::ResetRotation => "Reset rotation",
            MenuCommand::Transform(TransformKind::RotateLeft) => "Rotate left",
            MenuCommand::Transform(TransformKind::RotateRight) => "Rotate right",
            MenuCommand::Transform(TransformKind::FlipHorizontal) => "Flip image (Left - Right)",
            MenuCommand::Transform(TransformKind::FlipVertical) => "Flip image (Top - Bottom)",
            MenuCommand::Transform(TransformKind::Grayscale) => "Grayscale",
            MenuCommand::Transform(TransformKind::GaussianBlur) => "Gaussian Blur",
            MenuCommand::Exit => "Exit",
        }
    }

    pub fn shortcut(self) -> Option<char> {
        match self {
            MenuCommand::Open => Some('o'),
            MenuCommand::SaveAs => Some('s'),
            MenuCommand::ResetRotation => None,
            MenuCommand::Transform(TransformKind::RotateLeft) => Some('l'),
            MenuCommand::Transform(TransformKind::RotateRight) => Some('r'),
            MenuCommand::Transform(TransformKind::FlipHorizontal) => Some('h'),
            MenuCommand::Transform(TransformKind::FlipVertical) => Some('v'),
            MenuCommand::Transform(TransformKind::Grayscale) => Some('g'),
            MenuCommand::Transform(TransformKind::GaussianBlur) => Some('b'),
            MenuCommand::Exit => Some('q'),
        }
    }

    pub fn from_shortcut(key: char) -> Option<Self> {
        let key = key.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|command| command.shortcut() == Some(key))
    }
}

/// Context menu state
#[derive(Debug, Clone, Default)]
pub struct ContextMenu {
    /// Top-left corner when visible
    position: Option<(i32, i32)>,
    hovered: Option<usize>,
}

impl ContextMenu {
    pub fn is_visible(&self) -> bool {
        self.position.is_some()
    }

    pub fn height() -> u32 {
        MenuCommand::ALL.len() as u32 * MENU_ITEM_HEIGHT
    }

    /// Open at `point`, shifted so the whole menu stays inside the window
    pub fn open_at(&mut self, point: (f64, f64), window: (u32, u32)) {
        let mut x = point.0 as i32;
        let mut y = point.1 as i32;
        if x + MENU_WIDTH as i32 > window.0 as i32 {
            x = window.0 as i32 - MENU_WIDTH as i32;
        }
        if y + Self::height() as i32 > window.1 as i32 {
            y = window.1 as i32 - Self::height() as i32;
        }
        self.position = Some((x.max(0), y.max(0)));
        self.hovered = None;
        debug!("Menu opened at {:?}", self.position);
    }

    pub fn close(&mut self) {
        self.position = None;
        self.hovered = None;
    }

    /// Update the highlighted item; returns true when it changed
    pub fn hover(&mut self, point: (f64, f64)) -> bool {
        let hovered = self.item_at(point);
        let changed = hovered != self.hovered;
        self.hovered = hovered;
        changed
    }

    /// Index of the item under `point`
    pub fn item_at(&self, point: (f64, f64)) -> Option<usize> {
        let (menu_x, menu_y) = self.position?;
        let (x, y) = (point.0 - menu_x as f64, point.1 - menu_y as f64);
        if x < 0.0 || y < 0.0 || x >= MENU_WIDTH as f64 || y >= Self::height() as f64 {
            return None;
        }
        Some(y as usize / MENU_ITEM_HEIGHT as usize)
    }

    pub fn command_at(&self, point: (f64, f64)) -> Option<MenuCommand> {
        self.item_at(point).map(|idx| MenuCommand::ALL[idx])
    }

    /// Draw the menu onto a BGRA canvas
    pub fn render(
        &self,
        text: &mut TextRenderer,
        canvas: &mut [u8],
        canvas_width: u32,
        canvas_height: u32,
    ) {
        let Some((menu_x, menu_y)) = self.position else {
            return;
        };
        let (menu_x, menu_y) = (menu_x as u32, menu_y as u32);

        for (i, command) in MenuCommand::ALL.iter().enumerate() {
            let item_y = menu_y + i as u32 * MENU_ITEM_HEIGHT;
            let bg = if self.hovered == Some(i) {
                ITEM_HOVER_BG
            } else {
                ITEM_BG
            };
            fill_rect(
                canvas,
                canvas_width,
                canvas_height,
                (menu_x, item_y, MENU_WIDTH, MENU_ITEM_HEIGHT),
                bg,
            );

            let label = match command.shortcut() {
                Some(key) => format!("{}  ({})", command.label(), key.to_ascii_uppercase()),
                None => command.label().to_string(),
            };
            text.draw(
                canvas,
                canvas_width,
                canvas_height,
                (menu_x + TEXT_PADDING_X, item_y + TEXT_PADDING_Y),
                &label,
            );
        }

        stroke_rect(
            canvas,
            canvas_width,
            canvas_height,
            (menu_x, menu_y, MENU_WIDTH, Self::height()),
            BORDER,
        );
    }
}

/// Rasterizes menu labels with the system fonts
pub struct TextRenderer {
    font_system: FontSystem,
    swash_cache: SwashCache,
}

impl TextRenderer {
    pub fn new() -> Self {
        Self {
            font_system: FontSystem::new(),
            swash_cache: SwashCache::new(),
        }
    }

    /// Draw white text with its top-left corner at `origin`
    pub fn draw(
        &mut self,
        canvas: &mut [u8],
        canvas_width: u32,
        canvas_height: u32,
        origin: (u32, u32),
        text: &str,
    ) {
        let mut buffer = Buffer::new(&mut self.font_system, Metrics::new(FONT_SIZE, LINE_HEIGHT));
        buffer.set_size(
            &mut self.font_system,
            Some((MENU_WIDTH - TEXT_PADDING_X) as f32),
            Some(LINE_HEIGHT),
        );
        buffer.set_text(&mut self.font_system, text, Attrs::new(), Shaping::Advanced);
        buffer.shape_until_scroll(&mut self.font_system, false);

        buffer.draw(
            &mut self.font_system,
            &mut self.swash_cache,
            Color::rgb(255, 255, 255),
            |x, y, w, h, color| {
                if color.a() == 0 {
                    return;
                }
                for dy in 0..h as i32 {
                    for dx in 0..w as i32 {
                        let px = origin.0 as i32 + x + dx;
                        let py = origin.1 as i32 + y + dy;
                        if px < 0 || py < 0 {
                            continue;
                        }
                        blend_pixel(
                            canvas,
                            canvas_width,
                            canvas_height,
                            (px as u32, py as u32),
                            [color.b(), color.g(), color.r(), color.a()],
                        );
                    }
                }
            },
        );
    }
}

impl Default for TextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Alpha-blend one BGRA pixel
fn blend_pixel(canvas: &mut [u8], width: u32, height: u32, (x, y): (u32, u32), color: [u8; 4]) {
    if x >= width || y >= height {
        return;
    }
    let idx = ((y * width + x) * 4) as usize;
    let Some(pixel) = canvas.get_mut(idx..idx + 4) else {
        return;
    };
    let alpha = color[3] as u32;
    let inv = 255 - alpha;
    for c in 0..3 {
        pixel[c] = ((color[c] as u32 * alpha + pixel[c] as u32 * inv) / 255) as u8;
    }
    pixel[3] = (alpha + pixel[3] as u32 * inv / 255) as u8;
}

fn fill_rect(
    canvas: &mut [u8],
    width: u32,
    height: u32,
    (x, y, w, h): (u32, u32, u32, u32),
    color: [u8; 4],
) {
    for py in y..(y + h).min(height) {
        for px in x..(x + w).min(width) {
            let idx = ((py * width + px) * 4) as usize;
            if let Some(pixel) = canvas.get_mut(idx..idx + 4) {
                pixel.copy_from_slice(&color);
            }
        }
    }
}

fn stroke_rect(
    canvas: &mut [u8],
    width: u32,
    height: u32,
    (x, y, w, h): (u32, u32, u32, u32),
    color: [u8; 4],
) {
    fill_rect(canvas, width, height, (x, y, w, 1), color);
    fill_rect(canvas, width, height, (x, y + h.saturating_sub(1), w, 1), color);
    fill_rect(canvas, width, height, (x, y, 1, h), color);
    fill_rect(canvas, width, height, (x + w.saturating_sub(1), y, 1, h), color);
}
