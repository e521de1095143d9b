// Drag module
// Pointer bookkeeping for the image surface that can be moved around inside the window

/// Pointer buttons the surface cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Primary,
    Secondary,
    Middle,
    Other(u32),
}

impl MouseButton {
    /// Map a Linux input event code (BTN_*) to a button
    pub fn from_code(code: u32) -> Self {
        match code {
            0x110 => MouseButton::Primary,
            0x111 => MouseButton::Secondary,
            0x112 => MouseButton::Middle,
            other => MouseButton::Other(other),
        }
    }
}

/// Cursor the shell should show after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorShape {
    Default,
    Grabbing,
}

/// Result of feeding an event to the surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// Consumed; change the cursor if one is given
    Handled { cursor: Option<CursorShape> },
    /// Not for the surface, fall through to default handling
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DragState {
    Idle,
    /// Press point relative to the surface's top-left corner
    Dragging { offset: (i32, i32) },
}

/// A rectangle positioned inside a parent that follows the pointer while the
/// primary button is held
#[derive(Debug, Clone)]
pub struct DragSurface {
    position: (i32, i32),
    size: (u32, u32),
    state: DragState,
    clamp: bool,
}

impl DragSurface {
    pub fn new(clamp: bool) -> Self {
        Self {
            position: (0, 0),
            size: (0, 0),
            state: DragState::Idle,
            clamp,
        }
    }

    pub fn position(&self) -> (i32, i32) {
        self.position
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    pub fn contains(&self, point: (f64, f64)) -> bool {
        let (x, y) = point;
        let (left, top) = (self.position.0 as f64, self.position.1 as f64);
        x >= left
            && y >= top
            && x < left + self.size.0 as f64
            && y < top + self.size.1 as f64
    }

    /// Button press at `point` in parent coordinates
    pub fn press(&mut self, button: MouseButton, point: (f64, f64)) -> Response {
        if button != MouseButton::Primary || !self.contains(point) {
            return Response::Ignored;
        }

        let offset = (
            point.0 as i32 - self.position.0,
            point.1 as i32 - self.position.1,
        );
        self.state = DragState::Dragging { offset };
        Response::Handled {
            cursor: Some(CursorShape::Grabbing),
        }
    }

    /// Pointer motion at `point` in parent coordinates
    pub fn motion(&mut self, point: (f64, f64), parent: (u32, u32)) -> Response {
        let DragState::Dragging { offset } = self.state else {
            return Response::Ignored;
        };

        let candidate = (point.0 as i32 - offset.0, point.1 as i32 - offset.1);
        self.position = if self.clamp {
            self.clamped(candidate, parent)
        } else {
            candidate
        };
        Response::Handled { cursor: None }
    }

    pub fn release(&mut self, button: MouseButton) -> Response {
        if button != MouseButton::Primary || !self.is_dragging() {
            return Response::Ignored;
        }

        self.state = DragState::Idle;
        Response::Handled {
            cursor: Some(CursorShape::Default),
        }
    }

    /// Drop an in-progress drag without a release event
    pub fn cancel(&mut self) -> Option<CursorShape> {
        if self.is_dragging() {
            self.state = DragState::Idle;
            Some(CursorShape::Default)
        } else {
            None
        }
    }

    /// Adopt new content dimensions, keeping the surface inside `parent`
    pub fn resize(&mut self, size: (u32, u32), parent: (u32, u32)) {
        self.size = size;
        if self.clamp {
            self.position = self.clamped(self.position, parent);
        }
    }

    /// Place the surface at the center of `parent`
    pub fn center_in(&mut self, parent: (u32, u32)) {
        let x = (parent.0 as i32 - self.size.0 as i32) / 2;
        let y = (parent.1 as i32 - self.size.1 as i32) / 2;
        self.position = if self.clamp {
            self.clamped((x, y), parent)
        } else {
            (x, y)
        };
    }

    fn clamped(&self, (x, y): (i32, i32), parent: (u32, u32)) -> (i32, i32) {
        (
            clamp_axis(x, self.size.0, parent.0),
            clamp_axis(y, self.size.1, parent.1),
        )
    }
}

/// Keep a span of `size` inside `parent` when it fits; when it does not, keep
/// the parent covered so dragging pans across the surface
fn clamp_axis(value: i32, size: u32, parent: u32) -> i32 {
    let slack = parent as i32 - size as i32;
    value.clamp(slack.min(0), slack.max(0))
}
