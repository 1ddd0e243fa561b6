use glam::Vec2;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};

/// Pixels per scroll "line" when the platform reports pixel deltas, and per
/// zoom step of a middle-button drag.
const PIXELS_PER_LINE: f32 = 40.0;

/// Input gathered between two frames.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PointerFrame {
    pub rotate: Vec2,
    pub pan: Vec2,
    /// Positive values zoom in.
    pub zoom: f32,
}

/// Pointer state accumulated from window events and consumed once per frame.
#[derive(Debug, Default)]
pub struct PointerInput {
    cursor: Option<Vec2>,
    rotating: bool,
    dollying: bool,
    panning: bool,
    pending: PointerFrame,
}

impl PointerInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the event was a pointer event.
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::MouseInput { state, button, .. } => {
                self.set_button(*button, *state == ElementState::Pressed);
                true
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.move_cursor(Vec2::new(position.x as f32, position.y as f32));
                true
            }
            WindowEvent::CursorLeft { .. } => {
                self.cursor = None;
                true
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(position) => position.y as f32 / PIXELS_PER_LINE,
                };
                self.scroll(lines);
                true
            }
            WindowEvent::Focused(false) => {
                self.rotating = false;
                self.dollying = false;
                self.panning = false;
                false
            }
            _ => false,
        }
    }

    pub fn set_button(&mut self, button: MouseButton, pressed: bool) {
        match button {
            MouseButton::Left => self.rotating = pressed,
            MouseButton::Middle => self.dollying = pressed,
            MouseButton::Right => self.panning = pressed,
            _ => {}
        }
    }

    pub fn move_cursor(&mut self, position: Vec2) {
        if let Some(previous) = self.cursor {
            let delta = position - previous;
            if self.rotating {
                self.pending.rotate += delta;
            } else if self.dollying {
                // Dragging up zooms in.
                self.pending.zoom -= delta.y / PIXELS_PER_LINE;
            } else if self.panning {
                self.pending.pan += delta;
            }
        }
        self.cursor = Some(position);
    }

    pub fn scroll(&mut self, lines: f32) {
        self.pending.zoom += lines;
    }

    /// Takes everything accumulated since the last call.
    pub fn take_frame(&mut self) -> PointerFrame {
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drag_with_left_button_accumulates_rotation() {
        let mut input = PointerInput::new();
        input.move_cursor(Vec2::new(10.0, 10.0));
        input.set_button(MouseButton::Left, true);
        input.move_cursor(Vec2::new(15.0, 12.0));
        input.move_cursor(Vec2::new(20.0, 10.0));

        let frame = input.take_frame();
        assert_eq!(frame.rotate, Vec2::new(10.0, 0.0));
        assert_eq!(frame.pan, Vec2::ZERO);
        assert_eq!(input.take_frame(), PointerFrame::default());
    }

    #[test]
    fn hover_without_buttons_moves_nothing() {
        let mut input = PointerInput::new();
        input.move_cursor(Vec2::ZERO);
        input.move_cursor(Vec2::new(50.0, 50.0));

        assert_eq!(input.take_frame(), PointerFrame::default());
    }

    #[test]
    fn right_drag_pans_and_wheel_zooms() {
        let mut input = PointerInput::new();
        input.move_cursor(Vec2::ZERO);
        input.set_button(MouseButton::Right, true);
        input.move_cursor(Vec2::new(-3.0, 4.0));
        input.scroll(2.0);
        input.scroll(-0.5);

        let frame = input.take_frame();
        assert_eq!(frame.pan, Vec2::new(-3.0, 4.0));
        assert_eq!(frame.zoom, 1.5);
    }

    #[test]
    fn middle_drag_dollies() {
        let mut input = PointerInput::new();
        input.move_cursor(Vec2::ZERO);
        input.set_button(MouseButton::Middle, true);
        input.move_cursor(Vec2::new(25.0, -80.0));

        let frame = input.take_frame();
        assert_eq!(frame.zoom, 2.0);
        assert_eq!(frame.pan, Vec2::ZERO);
        assert_eq!(frame.rotate, Vec2::ZERO);

        input.set_button(MouseButton::Middle, false);
        input.move_cursor(Vec2::new(25.0, 0.0));
        assert_eq!(input.take_frame(), PointerFrame::default());
    }
}
