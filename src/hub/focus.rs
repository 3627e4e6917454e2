//! The focus state machine.
//!
//! Exactly one node receives input at any time. Switching focus is the one
//! operation that touches almost everything: input grabs, pointer position,
//! clipboard relay, modifier transfer, and the brightness hint. The order of
//! operations here is load-bearing — see the step comments in
//! [`Hub::focus_node`].
//!
//! Two user-visible invariants this module preserves across every path,
//! including failure paths:
//!
//! - **no stuck modifiers**: a modifier held across a switch is released on
//!   the node focus leaves and pressed on the node focus enters, so neither
//!   side is left believing a key is down that the other owns;
//! - **no lost clipboard**: leaving a remote asks it for its clipboard, and
//!   the asynchronous answer is applied to the master clipboard whenever it
//!   arrives, wherever focus lives by then.

// Rust guideline compliant 2026-03

use crate::config::ShowNullSwitch;
use crate::platform::Keycode;
use crate::protocol::Message;
use crate::remote::{ConnState, Node};

use super::Hub;

impl Hub {
    /// Switch focus to `target`.
    ///
    /// `None` means "stay" (a directional switch with no neighbor lands
    /// here). Returns whether an actual switch happened; a null switch may
    /// still indicate visually, per the show-nullswitch policy.
    pub fn focus_node(
        &mut self,
        target: Option<Node>,
        modifiers: &[Keycode],
        from_hotkey: bool,
    ) -> bool {
        // Resolve. A remote target must be CONNECTED; an aborted switch
        // shows no hint.
        let target = match target {
            Some(node) => node,
            None => self.focused,
        };
        if let Node::Remote(id) = target {
            if self.remotes[id].state != ConnState::Connected {
                log::warn!(
                    "[{}] is {}; staying on {}",
                    self.alias(id),
                    self.remotes[id].state,
                    self.node_name(self.focused)
                );
                return false;
            }
        }

        // Indicate. Real switches always; null switches per policy.
        let null_switch = target == self.focused;
        let indicate = !null_switch
            || self.nullswitch == ShowNullSwitch::Always
            || (self.nullswitch == ShowNullSwitch::HotkeyOnly && from_hotkey);
        if indicate {
            self.indicate_switch(self.focused, target);
        }
        if null_switch {
            return false;
        }

        let from = self.focused;

        // Boundary transitions. Leaving the master saves the pointer and
        // grabs input; returning releases the grabs and puts the pointer
        // back where it was. Remote-to-remote keeps the grabs.
        match (from, target) {
            (Node::Master, Node::Remote(_)) => {
                self.saved_master_pos = self.platform.mouse_pos();
                if let Err(e) = self.platform.grab_inputs() {
                    log::error!("cannot grab inputs: {e:#}; staying on master");
                    return false;
                }
            }
            (Node::Remote(_), Node::Master) => {
                self.platform.ungrab_inputs();
                let (x, y) = self.saved_master_pos;
                self.platform.set_mouse_pos(x, y);
            }
            _ => {}
        }

        // While a remote is driven, the local pointer parks at screen
        // center so relative motion has room in every direction.
        if matches!(target, Node::Remote(_)) {
            self.platform.set_mouse_pos_screen_rel(0.5, 0.5);
        }

        // Commit the focus pointer before the transfers: if a transfer
        // overflows a backlog and fails a remote, the failure handler must
        // see the post-switch focus, not the node we are abandoning.
        self.focused = target;
        log::info!(
            "focus: {} -> {}",
            self.node_name(from),
            self.node_name(target)
        );

        // Clipboard transfer. The departing remote is asked for its
        // clipboard (answered asynchronously with SETCLIPBOARD); the
        // arriving remote receives the master's current clipboard.
        if let Node::Remote(old) = from {
            self.send_to(old, Message::GetClipboard);
        }
        if let Node::Remote(new) = target {
            if let Some(buf) = self.platform.clipboard_text() {
                self.send_to(new, Message::SetClipboard(buf));
            }
        }

        // Modifier transfer: release on the departing side, press on the
        // arriving side, for every modifier physically held right now.
        for &keycode in modifiers {
            if let Node::Remote(old) = from {
                self.send_to(
                    old,
                    Message::KeyEvent {
                        keycode,
                        press: false,
                    },
                );
            }
            if let Node::Remote(new) = target {
                self.send_to(
                    new,
                    Message::KeyEvent {
                        keycode,
                        press: true,
                    },
                );
            }
        }

        // The transfers themselves may have failed the arriving remote; in
        // that case the failure handler already pulled focus back to the
        // master and this switch did not happen.
        if let Node::Remote(id) = target {
            if self.remotes[id].state != ConnState::Connected {
                return false;
            }
        }
        true
    }

    /// Failure-path return to the master: the remote that held focus is
    /// gone, so there is nobody to transfer anything to — just release the
    /// grabs, restore the pointer, and move the focus pointer home.
    pub(crate) fn force_focus_master(&mut self) {
        if self.focused == Node::Master {
            return;
        }
        self.platform.ungrab_inputs();
        let (x, y) = self.saved_master_pos;
        self.platform.set_mouse_pos(x, y);
        self.focused = Node::Master;
        log::info!("focus returned to master");
    }
}
