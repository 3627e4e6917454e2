//! Brightness-hint fades.
//!
//! A fade is not an animation loop: it is `fade_steps` pre-computed events
//! placed on a timeline, each setting an interpolated level. For the master
//! they are scheduled calls into the local gamma setter; for a remote they
//! are future-dated SETBRIGHTNESS messages that ride the remote's scheduled
//! queue and hit the wire when due. Either way the event loop's normal
//! deadline handling does the pacing.

// Rust guideline compliant 2026-03

use crate::config::FocusHintMode;
use crate::protocol::Message;
use crate::remote::Node;

use super::{Hub, ScheduledCall};

impl Hub {
    /// Emit the configured visual hint for a focus transition.
    ///
    /// `leaving == arriving` on a null switch; the fades still apply, which
    /// is what makes a null switch visible at all.
    pub(crate) fn indicate_switch(&mut self, leaving: Node, arriving: Node) {
        let dimmed = self.hint.brightness;
        match self.hint.mode {
            FocusHintMode::None => {}
            FocusHintMode::DimInactive => {
                self.fade(leaving, 1.0, dimmed);
                self.fade(arriving, dimmed, 1.0);
            }
            FocusHintMode::FlashActive => {
                self.fade(arriving, dimmed, 1.0);
            }
        }
    }

    /// Schedule a linear fade on a node: `fade_steps` events at equal
    /// intervals across `duration_us`, the last landing exactly on `to` at
    /// the full duration.
    pub(crate) fn fade(&mut self, node: Node, from: f32, to: f32) {
        let steps = self.hint.fade_steps.max(1);
        let duration = self.hint.duration_us;
        let now = self.now_us();
        for step in 1..=steps {
            let at = now + duration * u64::from(step) / u64::from(steps);
            let level = from + (to - from) * (step as f32 / steps as f32);
            match node {
                Node::Master => {
                    self.calls.push(at, ScheduledCall::SetMasterBrightness(level));
                }
                Node::Remote(id) => {
                    self.schedule_message(id, at, Message::SetBrightness(level));
                }
            }
        }
    }
}
