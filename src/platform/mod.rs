//! Platform input/output driver interface.
//!
//! Everything that touches the local display server lives behind the
//! [`Platform`] trait: input grabs, pointer warps, clipboard, display
//! brightness, hotkey registration, and event injection for the replay side.
//! The hub and the subordinate loop are written entirely against this trait,
//! so graphical backends (X11, Wayland) are separate work and tests drive the
//! control plane with a recording mock.
//!
//! Drivers deliver their events by pushing [`PlatformEvent`]s into the
//! channel handed to [`Platform::start`]:
//!
//! - edge-mask transitions whenever the local cursor enters or leaves a
//!   screen-edge band;
//! - grabbed key / relative-motion / button events while input is grabbed;
//! - hotkey firings, with a snapshot of the modifiers held at fire time.

// Rust guideline compliant 2026-03

pub mod noop;

use anyhow::{bail, Result};
use tokio::sync::mpsc;

use crate::hotkey::HotkeyAction;

/// Platform keycode. Keycode values are driver-defined; the protocol carries
/// them verbatim, which assumes a homogeneous keymap across nodes.
pub type Keycode = u32;

/// An event pushed by the platform driver.
#[derive(Debug, Clone)]
pub enum PlatformEvent {
    /// The local cursor's edge mask changed; coordinates are screen-relative.
    EdgeMask {
        /// Previous mask.
        old_mask: u8,
        /// New mask.
        new_mask: u8,
        /// Pointer x in [0, 1].
        x: f32,
        /// Pointer y in [0, 1].
        y: f32,
    },
    /// A grabbed key went down or up.
    Key {
        /// Driver keycode.
        keycode: Keycode,
        /// Press or release.
        press: bool,
    },
    /// Grabbed relative pointer motion.
    MotionRel {
        /// Horizontal delta.
        dx: i32,
        /// Vertical delta.
        dy: i32,
    },
    /// A grabbed button went down or up.
    Button {
        /// Button number.
        button: u32,
        /// Press or release.
        press: bool,
    },
    /// A bound hotkey combination fired.
    Hotkey {
        /// The action bound to the combination.
        action: HotkeyAction,
        /// Modifier keys held at fire time.
        modifiers: Vec<Keycode>,
    },
}

/// The platform input/output driver.
///
/// All methods are called from the hub task; implementations own whatever
/// display-server connection they need and must not block the caller beyond
/// the bounded clipboard wait.
pub trait Platform: Send {
    /// Begin delivering events into `events`. Called once before the event
    /// loop starts; binding hotkeys is only valid after this.
    fn start(&mut self, events: mpsc::UnboundedSender<PlatformEvent>) -> Result<()>;

    /// Bind a hotkey combination to an action.
    ///
    /// # Errors
    ///
    /// Fails on unparseable combinations and on collisions with an existing
    /// grab; both are fatal at startup.
    fn bind_hotkey(&mut self, combo: &str, action: HotkeyAction) -> Result<()>;

    /// Grab keyboard and pointer so local input stops reaching local windows.
    fn grab_inputs(&mut self) -> Result<()>;

    /// Release the input grabs.
    fn ungrab_inputs(&mut self);

    /// Current pointer position in pixels.
    fn mouse_pos(&mut self) -> (i32, i32);

    /// Warp the pointer to a pixel position.
    fn set_mouse_pos(&mut self, x: i32, y: i32);

    /// Warp the pointer to a screen-relative position, both axes in [0, 1].
    fn set_mouse_pos_screen_rel(&mut self, x: f32, y: f32);

    /// Read the clipboard. Selection acquisition waits at most ~100 ms
    /// inside the driver; `None` means empty or unavailable.
    fn clipboard_text(&mut self) -> Option<Vec<u8>>;

    /// Replace the clipboard contents.
    fn set_clipboard(&mut self, data: &[u8]);

    /// Current display brightness in [0, 1].
    fn display_brightness(&mut self) -> f32;

    /// Set display brightness (gamma) in [0, 1].
    fn set_display_brightness(&mut self, level: f32);

    /// Snapshot of currently held modifier keycodes.
    fn current_modifiers(&mut self) -> Vec<Keycode>;

    /// Replay a key event on the local display.
    fn inject_key(&mut self, keycode: Keycode, press: bool);

    /// Replay a button event on the local display.
    fn inject_button(&mut self, button: u32, press: bool);

    /// Replay relative pointer motion on the local display.
    fn inject_motion(&mut self, dx: i32, dy: i32);
}

/// Instantiate the driver named in the configuration.
///
/// Only the no-op driver is compiled into this crate; graphical backends
/// register here when they exist.
pub fn create(name: &str) -> Result<Box<dyn Platform>> {
    match name {
        "none" => Ok(Box::new(noop::NoopPlatform::new())),
        other => bail!("no '{other}' platform driver in this build"),
    }
}
