//! Input bindings.
//!
//! Window events are translated into a small set of synthetic events so the
//! orbit controller never sees winit types and can be driven directly in
//! tests. Wheel deltas follow the browser convention: positive means the
//! content scrolls up, i.e. the user pulled the wheel towards themselves.

use winit::{
    dpi::PhysicalPosition,
    event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent},
    keyboard::{KeyCode, ModifiersState, PhysicalKey},
};

use crate::config::SensitivityPreset;

/// One notch of a line-based wheel, in pixels.
const LINE_HEIGHT: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    PointerDown(PointerButton),
    PointerUp(PointerButton),
    /// Pointer movement in physical pixels since the last move.
    PointerMoved { dx: f32, dy: f32 },
    Wheel { delta_y: f32, modifier_held: bool },
}

/// Viewer-level actions bound to keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerCommand {
    ToggleFullscreen,
    ToggleGrid,
    CycleBackground,
    ToggleAutoRotate,
    Sensitivity(SensitivityPreset),
}

/// Either an orbit input or a viewer command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Binding {
    Orbit(InputEvent),
    Command(ViewerCommand),
}

/// Stateful translator from winit window events; it tracks modifiers and the last cursor position.
#[derive(Debug, Default)]
pub struct InputBindings {
    modifiers: ModifiersState,
    cursor: Option<PhysicalPosition<f64>>,
}

impl InputBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ctrl or Shift turns the wheel into vertical orbit.
    pub fn modifier_held(&self) -> bool {
        self.modifiers.control_key() || self.modifiers.shift_key()
    }

    pub fn translate(&mut self, event: &WindowEvent) -> Option<Binding> {
        match event {
            WindowEvent::ModifiersChanged(modifiers) => {
                self.modifiers = modifiers.state();
                None
            }
            WindowEvent::CursorMoved { position, .. } => {
                let previous = self.cursor.replace(*position);
                self.cursor_moved(previous, *position).map(Binding::Orbit)
            }
            WindowEvent::CursorLeft { .. } => {
                self.cursor = None;
                None
            }
            WindowEvent::MouseInput { state, button, .. } => {
                pointer_event(*button, *state).map(Binding::Orbit)
            }
            WindowEvent::MouseWheel { delta, .. } => Some(Binding::Orbit(InputEvent::Wheel {
                delta_y: wheel_delta(*delta),
                modifier_held: self.modifier_held(),
            })),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state,
                        repeat,
                        ..
                    },
                ..
            } => key_command(*code, *state, *repeat).map(Binding::Command),
            _ => None,
        }
    }

    fn cursor_moved(
        &self,
        previous: Option<PhysicalPosition<f64>>,
        position: PhysicalPosition<f64>,
    ) -> Option<InputEvent> {
        let previous = previous?;
        Some(InputEvent::PointerMoved {
            dx: (position.x - previous.x) as f32,
            dy: (position.y - previous.y) as f32,
        })
    }
}

pub fn pointer_event(button: MouseButton, state: ElementState) -> Option<InputEvent> {
    let button = match button {
        MouseButton::Left => PointerButton::Primary,
        MouseButton::Right => PointerButton::Secondary,
        MouseButton::Middle => PointerButton::Middle,
        _ => return None,
    };
    Some(match state {
        ElementState::Pressed => InputEvent::PointerDown(button),
        ElementState::Released => InputEvent::PointerUp(button),
    })
}

/// Converts a winit scroll into a pixel delta with browser sign.
pub fn wheel_delta(delta: MouseScrollDelta) -> f32 {
    match delta {
        MouseScrollDelta::LineDelta(_, lines) => -lines * LINE_HEIGHT,
        MouseScrollDelta::PixelDelta(position) => -position.y as f32,
    }
}

/// Key bindings fire on press only; held keys don't repeat toggles.
pub fn key_command(code: KeyCode, state: ElementState, repeat: bool) -> Option<ViewerCommand> {
    if state != ElementState::Pressed || repeat {
        return None;
    }
    let command = match code {
        KeyCode::KeyF => ViewerCommand::ToggleFullscreen,
        KeyCode::KeyG => ViewerCommand::ToggleGrid,
        KeyCode::KeyB => ViewerCommand::CycleBackground,
        KeyCode::KeyR => ViewerCommand::ToggleAutoRotate,
        KeyCode::Digit1 => ViewerCommand::Sensitivity(SensitivityPreset::Low),
        KeyCode::Digit2 => ViewerCommand::Sensitivity(SensitivityPreset::Normal),
        KeyCode::Digit3 => ViewerCommand::Sensitivity(SensitivityPreset::High),
        _ => return None,
    };
    Some(command)
}
