// Wayland integration module
// Handles all Wayland-specific functionality using smithay-client-toolkit

use crate::app::{Action, AppState};
use crate::codec::SaveFormat;
use crate::display::DisplayBuffer;
use crate::drag::{CursorShape, DragSurface, MouseButton, Response};
use crate::error::EditorError;
use crate::menu::{ContextMenu, MenuCommand, TextRenderer};
use crate::wgpu_renderer::WgpuRenderer;
use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use rfd::FileDialog;
use smithay_client_toolkit::{
    compositor::{CompositorHandler, CompositorState},
    delegate_compositor, delegate_keyboard, delegate_layer, delegate_output, delegate_pointer,
    delegate_registry, delegate_seat, delegate_shm,
    output::{OutputHandler, OutputState},
    registry::{ProvidesRegistryState, RegistryState},
    registry_handlers,
    seat::{
        keyboard::{KeyEvent, KeyboardHandler, Keysym, Modifiers},
        pointer::{
            CursorIcon, PointerEvent, PointerEventKind, PointerHandler, ThemeSpec, ThemedPointer,
        },
        Capability, SeatHandler, SeatState,
    },
    shell::{
        wlr_layer::{
            Anchor, KeyboardInteractivity, Layer, LayerShell, LayerShellHandler, LayerSurface,
            LayerSurfaceConfigure,
        },
        WaylandSurface,
    },
    shm::{
        slot::{Buffer, SlotPool},
        Shm, ShmHandler,
    },
};
use std::path::PathBuf;
use wayland_client::{
    globals::registry_queue_init,
    protocol::{wl_keyboard, wl_output, wl_pointer, wl_seat, wl_shm, wl_surface},
    Connection, Proxy, QueueHandle,
};

/// Smallest window the image is shown in
const MIN_WINDOW_SIZE: u32 = 550;

/// Maximum window size to prevent buffer allocation failures
const MAX_SIZE: u32 = 4096;

/// Window background (BGRA)
const BACKGROUND: [u8; 4] = [40, 40, 40, 255];

/// Above normal windows but below fullscreen ones; file dialogs still need
/// the window unmapped to be seen
const WINDOW_LAYER: Layer = Layer::Top;

/// Settings the shell takes from the command line
#[derive(Debug, Clone)]
pub struct ShellOptions {
    /// Directory the open and save dialogs start in
    pub dialog_dir: PathBuf,
    /// Format for save targets without an extension
    pub default_format: SaveFormat,
    /// Keep the image inside the window (covering it, when larger) while dragging
    pub clamp_drag: bool,
    pub use_gpu: bool,
}

/// Main Wayland application state
struct WaylandApp {
    // Registry state
    registry_state: RegistryState,
    // Seat state for input handling
    seat_state: SeatState,
    // Output state for display info
    output_state: OutputState,
    // Shared memory for buffer allocation
    shm: Shm,
    // Layer shell for the editor window
    layer_shell: LayerShell,
    // Compositor state
    compositor_state: CompositorState,

    // Wayland display pointer (for GPU rendering)
    display_ptr: *mut std::ffi::c_void,

    // Editor state and what the user sees of it
    editor: AppState,
    display: Option<DisplayBuffer>,
    surface: DragSurface,
    menu: ContextMenu,
    // Loading fonts is slow, so this waits for the first menu
    text: Option<TextRenderer>,
    dialog_dir: PathBuf,
    default_format: SaveFormat,
    should_exit: bool,

    // Display dimensions for size limiting
    display_width: u32,
    display_height: u32,

    // Surface and buffer management
    layer_surface: Option<LayerSurface>,
    pool: Option<SlotPool>,
    buffer: Option<Buffer>,
    width: u32,
    height: u32,
    configured: bool,

    // Pointer state
    themed_pointer: Option<ThemedPointer>,

    // Redraw flag
    needs_redraw: bool,

    // GPU rendering
    use_gpu: bool,
    gpu_renderer: Option<WgpuRenderer>,
    gpu_initialized: bool,
    // The renderer's texture no longer matches `display`
    texture_dirty: bool,
}

impl WaylandApp {
    /// Create a new Wayland application
    fn new(
        registry_state: RegistryState,
        seat_state: SeatState,
        output_state: OutputState,
        shm: Shm,
        layer_shell: LayerShell,
        compositor_state: CompositorState,
        display_ptr: *mut std::ffi::c_void,
        editor: AppState,
        options: ShellOptions,
    ) -> Self {
        Self {
            registry_state,
            seat_state,
            output_state,
            shm,
            layer_shell,
            compositor_state,
            display_ptr,
            display: editor.render(),
            editor,
            surface: DragSurface::new(options.clamp_drag),
            menu: ContextMenu::default(),
            text: None,
            dialog_dir: options.dialog_dir,
            default_format: options.default_format,
            should_exit: false,
            display_width: 1920,
            display_height: 1080,
            layer_surface: None,
            pool: None,
            buffer: None,
            width: 0,
            height: 0,
            configured: false,
            themed_pointer: None,
            needs_redraw: false,
            use_gpu: options.use_gpu,
            gpu_renderer: None,
            gpu_initialized: false,
            texture_dirty: true,
        }
    }

    fn image_size(&self) -> (u32, u32) {
        self.display
            .as_ref()
            .map(|buffer| (buffer.width, buffer.height))
            .unwrap_or((0, 0))
    }

    /// Run a menu entry or keyboard shortcut
    fn run_command(&mut self, conn: &Connection, command: MenuCommand) {
        info!("Command: {}", command.label());

        let action = match command {
            MenuCommand::Open => self.with_window_hidden(conn, Self::pick_image),
            MenuCommand::SaveAs => self.with_window_hidden(conn, Self::pick_save_target),
            MenuCommand::ResetRotation => Some(Action::ResetRotation),
            MenuCommand::Transform(kind) => Some(Action::Transform(kind)),
            MenuCommand::Exit => {
                self.should_exit = true;
                None
            }
        };

        // A modal dialog swallows the release of any drag in progress
        if matches!(command, MenuCommand::Open | MenuCommand::SaveAs) {
            let cursor = self.surface.cancel();
            self.set_cursor(conn, cursor);
        }

        if let Some(action) = action {
            self.apply(action);
        }
    }

    /// Run a blocking file dialog with the window unmapped so the dialog is
    /// not stacked underneath it
    fn with_window_hidden(
        &mut self,
        conn: &Connection,
        dialog: fn(&Self) -> Option<Action>,
    ) -> Option<Action> {
        self.hide_window(conn);
        let action = dialog(self);
        self.show_window();
        action
    }

    fn hide_window(&mut self, conn: &Connection) {
        let Some(ref layer_surface) = self.layer_surface else {
            return;
        };

        // A null buffer unmaps a layer surface
        let surface = layer_surface.wl_surface();
        surface.attach(None, 0, 0);
        surface.commit();
        self.configured = false;
        self.buffer = None;

        // The dialog blocks the event loop, so send the unmap now
        if let Err(e) = conn.flush() {
            warn!("Failed to flush unmap request: {}", e);
        }
        debug!("Window hidden for dialog");
    }

    fn show_window(&mut self) {
        let Some(ref layer_surface) = self.layer_surface else {
            return;
        };

        // Remapping starts over: commit without a buffer, then draw on configure
        let (left, top) = centered_margins(
            (self.width, self.height),
            (self.display_width, self.display_height),
        );
        layer_surface.set_anchor(Anchor::TOP | Anchor::LEFT);
        layer_surface.set_margin(top, 0, 0, left);
        layer_surface.set_size(self.width, self.height);
        layer_surface.commit();
        self.needs_redraw = true;
        debug!("Window shown again");
    }

    fn pick_image(&self) -> Option<Action> {
        let path = FileDialog::new()
            .set_title("Select an Image")
            .set_directory(&self.dialog_dir)
            .add_filter("Images", &["png", "jpg", "jpeg"])
            .pick_file();

        match path {
            Some(path) => Some(Action::Load(path)),
            None => {
                debug!("Open dialog cancelled");
                None
            }
        }
    }

    fn pick_save_target(&self) -> Option<Action> {
        let Some(path) = FileDialog::new()
            .set_title("Save image as...")
            .set_directory(&self.dialog_dir)
            .add_filter("PNG", &["png"])
            .add_filter("JPG", &["jpg"])
            .add_filter("JPEG", &["jpeg"])
            .save_file()
        else {
            debug!("Save dialog cancelled");
            return None;
        };

        let format = SaveFormat::from_path(&path).unwrap_or(self.default_format);
        Some(Action::SaveAs { path, format })
    }

    /// Dispatch `action` and adopt the resulting state
    fn apply(&mut self, action: Action) {
        let loaded = matches!(action, Action::Load(_));

        match self.editor.dispatch(&action) {
            Ok(next) => {
                self.editor = next;
                self.refresh(loaded);
            }
            Err(err) => report(err),
        }
    }

    /// Re-render the editor state and fit the window around it
    fn refresh(&mut self, recenter: bool) {
        self.display = self.editor.render();
        let image_size = self.image_size();

        let (width, height) = fit_window(image_size, (self.display_width, self.display_height));
        self.resize_window(width, height);

        self.surface.resize(image_size, (width, height));
        if recenter {
            self.surface.center_in((width, height));
        }

        self.texture_dirty = true;
        self.needs_redraw = true;
    }

    /// Request a new window size and keep the window centered on the output
    fn resize_window(&mut self, width: u32, height: u32) {
        if (width, height) == (self.width, self.height) {
            return;
        }
        debug!(
            "Window {}x{} -> {}x{}",
            self.width, self.height, width, height
        );

        self.width = width;
        self.height = height;

        if let Some(ref layer_surface) = self.layer_surface {
            let (left, top) =
                centered_margins((width, height), (self.display_width, self.display_height));
            layer_surface.set_margin(top, 0, 0, left);
            layer_surface.set_size(width, height);
            layer_surface.commit();
        }
        // Reset pool to force buffer recreation
        self.pool = None;
    }

    fn set_cursor(&self, conn: &Connection, shape: Option<CursorShape>) {
        let (Some(shape), Some(pointer)) = (shape, self.themed_pointer.as_ref()) else {
            return;
        };

        let icon = match shape {
            CursorShape::Default => CursorIcon::Default,
            CursorShape::Grabbing => CursorIcon::Grabbing,
        };
        if let Err(e) = pointer.set_cursor(conn, icon) {
            debug!("Failed to set cursor {:?}: {:?}", icon, e);
        }
    }

    fn handle_press(&mut self, conn: &Connection, button: MouseButton, position: (f64, f64)) {
        if self.menu.is_visible() {
            match button {
                MouseButton::Primary => {
                    let command = self.menu.command_at(position);
                    self.menu.close();
                    self.needs_redraw = true;
                    if let Some(command) = command {
                        self.run_command(conn, command);
                    }
                }
                MouseButton::Secondary => {
                    self.menu.open_at(position, (self.width, self.height));
                    self.needs_redraw = true;
                }
                _ => {}
            }
            return;
        }

        match self.surface.press(button, position) {
            Response::Handled { cursor } => self.set_cursor(conn, cursor),
            Response::Ignored if button == MouseButton::Secondary => {
                self.menu.open_at(position, (self.width, self.height));
                self.needs_redraw = true;
            }
            Response::Ignored => {}
        }
    }

    /// Initialize GPU renderer from Wayland surface
    fn init_gpu_renderer(&mut self) {
        if self.gpu_initialized {
            return;
        }

        let layer_surface = match &self.layer_surface {
            Some(ls) => ls,
            None => {
                warn!("Cannot init GPU: no layer surface");
                return;
            }
        };

        // With wayland-backend client_system feature, ObjectId.as_ptr() is available
        let wl_surface = layer_surface.wl_surface();
        let surface_ptr = wl_surface.id().as_ptr() as *mut std::ffi::c_void;

        let display_ptr = self.display_ptr;

        if display_ptr.is_null() {
            warn!("Display pointer is null, falling back to CPU rendering");
            self.use_gpu = false;
            return;
        }

        info!("Initializing GPU renderer ({}x{})", self.width, self.height);

        match WgpuRenderer::new(display_ptr, surface_ptr, self.width, self.height) {
            Ok(renderer) => {
                self.gpu_renderer = Some(renderer);
                self.gpu_initialized = true;
                self.texture_dirty = true;
                info!("GPU renderer initialized successfully");
            }
            Err(e) => {
                warn!("Failed to initialize GPU renderer: {:?}", e);
                warn!("Falling back to CPU rendering");
                self.use_gpu = false;
            }
        }
    }

    fn draw(&mut self, _qh: &QueueHandle<Self>) {
        if !self.configured {
            return;
        }

        if self.layer_surface.is_none() {
            return;
        }

        // The menu is only drawn on the CPU path
        if self.use_gpu && self.gpu_renderer.is_some() && !self.menu.is_visible() {
            if self.draw_gpu() {
                return;
            }
            debug!("GPU frame not presented, drawing on CPU");
        }

        self.draw_cpu();
    }

    /// Draw using GPU (wgpu)
    fn draw_gpu(&mut self) -> bool {
        let renderer = match self.gpu_renderer.as_mut() {
            Some(r) => r,
            None => return false,
        };

        renderer.resize(self.width, self.height);

        if self.texture_dirty {
            let uploaded = match self.display.as_ref() {
                Some(buffer) => renderer.upload_texture(buffer),
                None => {
                    renderer.clear_texture();
                    Ok(())
                }
            };
            if let Err(e) = uploaded {
                warn!("Failed to upload texture to GPU: {:#}", e);
                warn!("Falling back to CPU rendering");
                self.use_gpu = false;
                return false;
            }
            self.texture_dirty = false;
        }

        match renderer.render(self.surface.position()) {
            Ok(true) => {
                // Commit the surface to show the frame
                if let Some(ref layer_surface) = self.layer_surface {
                    layer_surface.wl_surface().commit();
                }
                self.needs_redraw = false;
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!("GPU render error: {:?}", e);
                false
            }
        }
    }

    /// Draw using CPU (shared memory buffer)
    fn draw_cpu(&mut self) {
        // Clamp window size to prevent buffer allocation failures
        let width = self.width.clamp(1, MAX_SIZE);
        let height = self.height.clamp(1, MAX_SIZE);

        // 4 bytes per pixel for ARGB
        let stride = width as i32 * 4;
        let buffer_size = (stride * height as i32) as usize;

        if self.pool.is_none() {
            match SlotPool::new(buffer_size, &self.shm) {
                Ok(pool) => self.pool = Some(pool),
                Err(e) => {
                    error!("Failed to create slot pool: {}. Buffer size: {} bytes", e, buffer_size);
                    return;
                }
            }
        }

        let Some(pool) = self.pool.as_mut() else {
            return;
        };

        if pool.len() < buffer_size {
            if let Err(e) = pool.resize(buffer_size) {
                error!("Failed to resize pool to {} bytes: {}", buffer_size, e);
                self.pool = None;
                return;
            }
        }

        let (buffer, canvas) = match pool.create_buffer(
            width as i32,
            height as i32,
            stride,
            wl_shm::Format::Argb8888,
        ) {
            Ok(buf) => buf,
            Err(e) => {
                error!("Failed to create buffer {}x{}: {}", width, height, e);
                return;
            }
        };

        for pixel in canvas.chunks_exact_mut(4) {
            pixel.copy_from_slice(&BACKGROUND);
        }

        if let Some(ref display) = self.display {
            display.blit_bgra(canvas, width, height, self.surface.position());
        }

        if self.menu.is_visible() {
            let text = self.text.get_or_insert_with(TextRenderer::new);
            self.menu.render(text, canvas, width, height);
        }

        let Some(ref layer_surface) = self.layer_surface else {
            return;
        };
        let surface = layer_surface.wl_surface();
        if let Err(e) = buffer.attach_to(surface) {
            error!("Failed to attach buffer: {}", e);
            return;
        }
        surface.damage_buffer(0, 0, width as i32, height as i32);
        surface.commit();

        self.buffer = Some(buffer);
        self.needs_redraw = false;
    }
}

/// Log a failed action. The editor keeps its previous state.
fn report(err: EditorError) {
    match err {
        EditorError::NoImageLoaded | EditorError::Unimplemented(_) => warn!("{}", err),
        err => error!("{:#}", anyhow::Error::new(err)),
    }
}

/// Window size for an image: at least the minimum, at most the output
fn fit_window(image: (u32, u32), output: (u32, u32)) -> (u32, u32) {
    let fit = |image: u32, output: u32| {
        image.max(MIN_WINDOW_SIZE).min(output).min(MAX_SIZE).max(1)
    };
    (fit(image.0, output.0), fit(image.1, output.1))
}

/// Left and top margins that center a window on the output
fn centered_margins(window: (u32, u32), output: (u32, u32)) -> (i32, i32) {
    (
        (output.0.saturating_sub(window.0) / 2) as i32,
        (output.1.saturating_sub(window.1) / 2) as i32,
    )
}

// Implement required traits for smithay-client-toolkit

impl CompositorHandler for WaylandApp {
    fn scale_factor_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_factor: i32,
    ) {
        debug!("Scale factor changed");
    }

    fn transform_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_transform: wl_output::Transform,
    ) {
        debug!("Transform changed");
    }

    fn frame(
        &mut self,
        _conn: &Connection,
        qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _time: u32,
    ) {
        if self.needs_redraw {
            self.draw(qh);
        }
    }

    fn surface_enter(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _output: &wl_output::WlOutput,
    ) {
    }

    fn surface_leave(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _output: &wl_output::WlOutput,
    ) {
    }
}

impl OutputHandler for WaylandApp {
    fn output_state(&mut self) -> &mut OutputState {
        &mut self.output_state
    }

    fn new_output(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _output: wl_output::WlOutput,
    ) {
        debug!("New output detected");
    }

    fn update_output(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _output: wl_output::WlOutput,
    ) {
        debug!("Output updated");
    }

    fn output_destroyed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _output: wl_output::WlOutput,
    ) {
        debug!("Output destroyed");
    }
}

impl LayerShellHandler for WaylandApp {
    fn closed(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _layer: &LayerSurface) {
        info!("Layer surface closed");
        self.should_exit = true;
    }

    fn configure(
        &mut self,
        _conn: &Connection,
        qh: &QueueHandle<Self>,
        _layer: &LayerSurface,
        configure: LayerSurfaceConfigure,
        _serial: u32,
    ) {
        debug!("Layer surface configured: {:?}", configure);

        let (new_width, new_height) = configure.new_size;
        let width_changed = new_width > 0 && new_width != self.width;
        let height_changed = new_height > 0 && new_height != self.height;
        if width_changed || height_changed {
            if new_width > 0 {
                self.width = new_width;
            }
            if new_height > 0 {
                self.height = new_height;
            }
            self.pool = None;
            self.surface.resize(self.surface.size(), (self.width, self.height));
        }

        self.configured = true;
        self.needs_redraw = true;

        if self.use_gpu && !self.gpu_initialized {
            self.init_gpu_renderer();
        }

        self.draw(qh);
    }
}

impl SeatHandler for WaylandApp {
    fn seat_state(&mut self) -> &mut SeatState {
        &mut self.seat_state
    }

    fn new_seat(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _seat: wl_seat::WlSeat) {
        debug!("New seat");
    }

    fn new_capability(
        &mut self,
        _conn: &Connection,
        qh: &QueueHandle<Self>,
        seat: wl_seat::WlSeat,
        capability: Capability,
    ) {
        debug!("New capability: {:?}", capability);

        if capability == Capability::Keyboard {
            if let Err(e) = self.seat_state.get_keyboard(qh, &seat, None) {
                error!("Failed to get keyboard: {}", e);
            }
        }
        if capability == Capability::Pointer && self.themed_pointer.is_none() {
            let cursor_surface = self.compositor_state.create_surface(qh);
            match self.seat_state.get_pointer_with_theme(
                qh,
                &seat,
                self.shm.wl_shm(),
                cursor_surface,
                ThemeSpec::default(),
            ) {
                Ok(pointer) => self.themed_pointer = Some(pointer),
                Err(e) => error!("Failed to get pointer: {}", e),
            }
        }
    }

    fn remove_capability(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _seat: wl_seat::WlSeat,
        capability: Capability,
    ) {
        debug!("Capability removed: {:?}", capability);
        if capability == Capability::Pointer {
            self.themed_pointer = None;
            self.surface.cancel();
        }
    }

    fn remove_seat(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _seat: wl_seat::WlSeat) {
        debug!("Seat removed");
    }
}

impl KeyboardHandler for WaylandApp {
    fn enter(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &wl_keyboard::WlKeyboard,
        _surface: &wl_surface::WlSurface,
        _serial: u32,
        _raw: &[u32],
        _keysyms: &[Keysym],
    ) {
        debug!("Keyboard entered surface");
    }

    fn leave(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &wl_keyboard::WlKeyboard,
        _surface: &wl_surface::WlSurface,
        _serial: u32,
    ) {
        debug!("Keyboard left surface");
    }

    fn press_key(
        &mut self,
        conn: &Connection,
        qh: &QueueHandle<Self>,
        _keyboard: &wl_keyboard::WlKeyboard,
        _serial: u32,
        event: KeyEvent,
    ) {
        debug!("Key pressed: {:?}", event.keysym);

        if event.keysym == Keysym::Escape {
            if self.menu.is_visible() {
                self.menu.close();
                self.needs_redraw = true;
            } else {
                info!("Exit key pressed");
                self.should_exit = true;
            }
        } else if let Some(command) = event
            .utf8
            .as_deref()
            .and_then(|text| text.chars().next())
            .and_then(MenuCommand::from_shortcut)
        {
            if self.menu.is_visible() {
                self.menu.close();
                self.needs_redraw = true;
            }
            self.run_command(conn, command);
        }

        if self.needs_redraw {
            self.draw(qh);
        }
    }

    fn release_key(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &wl_keyboard::WlKeyboard,
        _serial: u32,
        _event: KeyEvent,
    ) {
    }

    fn update_modifiers(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &wl_keyboard::WlKeyboard,
        _serial: u32,
        _modifiers: Modifiers,
        _layout: u32,
    ) {
    }
}

impl PointerHandler for WaylandApp {
    fn pointer_frame(
        &mut self,
        conn: &Connection,
        qh: &QueueHandle<Self>,
        _pointer: &wl_pointer::WlPointer,
        events: &[PointerEvent],
    ) {
        for event in events {
            match event.kind {
                PointerEventKind::Enter { .. } => {
                    debug!("Pointer entered");
                    let cursor = if self.surface.is_dragging() {
                        CursorShape::Grabbing
                    } else {
                        CursorShape::Default
                    };
                    self.set_cursor(conn, Some(cursor));
                }
                PointerEventKind::Leave { .. } => {
                    debug!("Pointer left");
                    if self.surface.cancel().is_some() {
                        debug!("Drag cancelled");
                    }
                }
                PointerEventKind::Motion { .. } => {
                    if self.menu.is_visible() && self.menu.hover(event.position) {
                        self.needs_redraw = true;
                    }

                    if let Response::Handled { .. } =
                        self.surface.motion(event.position, (self.width, self.height))
                    {
                        self.needs_redraw = true;
                    }
                }
                PointerEventKind::Press { button, .. } => {
                    self.handle_press(conn, MouseButton::from_code(button), event.position);
                }
                PointerEventKind::Release { button, .. } => {
                    if let Response::Handled { cursor } =
                        self.surface.release(MouseButton::from_code(button))
                    {
                        self.set_cursor(conn, cursor);
                    }
                }
                _ => {}
            }
        }

        if self.needs_redraw {
            self.draw(qh);
        }
    }
}

impl ShmHandler for WaylandApp {
    fn shm_state(&mut self) -> &mut Shm {
        &mut self.shm
    }
}

impl ProvidesRegistryState for WaylandApp {
    fn registry(&mut self) -> &mut RegistryState {
        &mut self.registry_state
    }

    registry_handlers![OutputState, SeatState];
}

// Delegate macros
delegate_compositor!(WaylandApp);
delegate_output!(WaylandApp);
delegate_layer!(WaylandApp);
delegate_seat!(WaylandApp);
delegate_keyboard!(WaylandApp);
delegate_pointer!(WaylandApp);
delegate_shm!(WaylandApp);
delegate_registry!(WaylandApp);

/// Run the Wayland application until the user exits
pub fn run(editor: AppState, options: ShellOptions) -> Result<()> {
    info!("Connecting to Wayland display");

    let conn = Connection::connect_to_env().context("Failed to connect to Wayland display")?;

    let (globals, mut event_queue) =
        registry_queue_init(&conn).context("Failed to initialize registry")?;
    let qh = event_queue.handle();

    let compositor_state =
        CompositorState::bind(&globals, &qh).context("Failed to bind compositor")?;
    let layer_shell = LayerShell::bind(&globals, &qh).context("Failed to bind layer shell")?;
    let shm = Shm::bind(&globals, &qh).context("Failed to bind shm")?;

    // Get the display pointer for GPU rendering
    let display_ptr = conn.backend().display_ptr() as *mut std::ffi::c_void;

    let mut app = WaylandApp::new(
        RegistryState::new(&globals),
        SeatState::new(&globals, &qh),
        OutputState::new(&globals, &qh),
        shm,
        layer_shell,
        compositor_state,
        display_ptr,
        editor,
        options,
    );

    // Dispatch once to get output info
    event_queue.roundtrip(&mut app)?;

    let (display_width, display_height) = get_display_dimensions(&app.output_state);
    app.display_width = display_width;
    app.display_height = display_height;
    info!("Display dimensions: {}x{}", display_width, display_height);

    let image_size = app.image_size();
    let (width, height) = fit_window(image_size, (display_width, display_height));
    info!(
        "Image size: {}x{} -> Window size: {}x{}",
        image_size.0, image_size.1, width, height
    );
    app.width = width;
    app.height = height;
    app.surface.resize(image_size, (width, height));
    app.surface.center_in((width, height));

    let surface = app.compositor_state.create_surface(&qh);
    let layer_surface = app.layer_shell.create_layer_surface(
        &qh,
        surface,
        WINDOW_LAYER,
        Some("imgor"),
        None,
    );

    let (margin_left, margin_top) =
        centered_margins((width, height), (display_width, display_height));
    layer_surface.set_anchor(Anchor::TOP | Anchor::LEFT);
    layer_surface.set_margin(margin_top, 0, 0, margin_left);
    layer_surface.set_size(width, height);
    layer_surface.set_keyboard_interactivity(KeyboardInteractivity::OnDemand);

    // Commit the surface to trigger configure
    layer_surface.commit();

    app.layer_surface = Some(layer_surface);

    if !app.editor.has_image() {
        info!("No image loaded, choose Open... from the context menu");
    }

    info!("Starting event loop");
    info!("Controls: Right-click for menu, drag the image to move it, Esc to quit");

    loop {
        event_queue.blocking_dispatch(&mut app)?;

        if app.should_exit {
            info!("Exiting application");
            break;
        }
    }

    Ok(())
}

/// Get display dimensions from the output state
fn get_display_dimensions(output_state: &OutputState) -> (u32, u32) {
    for output in output_state.outputs() {
        if let Some(info) = output_state.info(&output) {
            if let Some(mode) = info.modes.iter().find(|m| m.current) {
                return (mode.dimensions.0 as u32, mode.dimensions.1 as u32);
            }
            if let Some(mode) = info.modes.first() {
                return (mode.dimensions.0 as u32, mode.dimensions.1 as u32);
            }
        }
    }
    (1920, 1080)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_image_gets_minimum_window() {
        assert_eq!(fit_window((0, 0), (1920, 1080)), (550, 550));
        assert_eq!(fit_window((100, 800), (1920, 1080)), (550, 800));
    }

    #[test]
    fn test_large_image_is_capped_at_output() {
        assert_eq!(fit_window((3000, 2000), (1920, 1080)), (1920, 1080));
        assert_eq!(fit_window((600, 600), (500, 400)), (500, 400));
    }

    #[test]
    fn test_window_does_not_cover_dialogs() {
        // Overlay surfaces stack above every toplevel, dialogs included
        assert!(!matches!(WINDOW_LAYER, Layer::Overlay));
        assert!(matches!(WINDOW_LAYER, Layer::Top));
    }

    #[test]
    fn test_centered_margins() {
        assert_eq!(centered_margins((550, 550), (1920, 1080)), (685, 265));
        assert_eq!(centered_margins((2000, 550), (1920, 1080)), (0, 265));
    }
}
