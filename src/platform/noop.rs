//! No-op platform driver.
//!
//! Used for display-less environments: it accepts every call, produces no
//! events, and remembers just enough state (pointer, clipboard, brightness)
//! to answer its own getters. The subordinate replay loop runs against it on
//! hosts where no graphical backend is available, which keeps the transport
//! and handshake testable end to end.

// Rust guideline compliant 2026-03

use anyhow::Result;
use tokio::sync::mpsc;

use super::{Keycode, Platform, PlatformEvent};
use crate::hotkey::HotkeyAction;

/// Driver that swallows all output and produces no input.
#[derive(Debug, Default)]
pub struct NoopPlatform {
    mouse: (i32, i32),
    clipboard: Vec<u8>,
    brightness: f32,
}

impl NoopPlatform {
    /// Create a driver with full brightness and an empty clipboard.
    pub fn new() -> Self {
        Self {
            mouse: (0, 0),
            clipboard: Vec::new(),
            brightness: 1.0,
        }
    }
}

impl Platform for NoopPlatform {
    fn start(&mut self, _events: mpsc::UnboundedSender<PlatformEvent>) -> Result<()> {
        Ok(())
    }

    fn bind_hotkey(&mut self, combo: &str, _action: HotkeyAction) -> Result<()> {
        log::debug!("noop driver ignoring hotkey binding '{combo}'");
        Ok(())
    }

    fn grab_inputs(&mut self) -> Result<()> {
        Ok(())
    }

    fn ungrab_inputs(&mut self) {}

    fn mouse_pos(&mut self) -> (i32, i32) {
        self.mouse
    }

    fn set_mouse_pos(&mut self, x: i32, y: i32) {
        self.mouse = (x, y);
    }

    fn set_mouse_pos_screen_rel(&mut self, _x: f32, _y: f32) {}

    fn clipboard_text(&mut self) -> Option<Vec<u8>> {
        if self.clipboard.is_empty() {
            None
        } else {
            Some(self.clipboard.clone())
        }
    }

    fn set_clipboard(&mut self, data: &[u8]) {
        self.clipboard = data.to_vec();
    }

    fn display_brightness(&mut self) -> f32 {
        self.brightness
    }

    fn set_display_brightness(&mut self, level: f32) {
        self.brightness = level;
    }

    fn current_modifiers(&mut self) -> Vec<Keycode> {
        Vec::new()
    }

    fn inject_key(&mut self, _keycode: Keycode, _press: bool) {}

    fn inject_button(&mut self, _button: u32, _press: bool) {}

    fn inject_motion(&mut self, _dx: i32, _dy: i32) {}
}
