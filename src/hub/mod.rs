//! Hub - the master-side control plane.
//!
//! The Hub owns all mutable state and is the source of truth: the remote
//! registry, the focus pointer, the scheduled-call queue, and the edge-event
//! history of the master's own display. It follows the centralized state
//! store pattern — link tasks and the platform driver never mutate anything,
//! they feed events into channels the hub's event loop drains.
//!
//! # Architecture
//!
//! ```text
//!                  ┌───────────────────────┐
//!                  │          Hub          │
//!                  │  - remote registry    │
//!                  │  - focus pointer      │
//!                  │  - scheduler          │
//!                  └─────┬──────────┬──────┘
//!            LinkFeed ch │          │ PlatformEvent ch
//!             ┌──────────┴───┐   ┌──┴─────────────┐
//!             │ link tasks   │   │ platform driver│
//!             │ (per remote) │   │ (edges/hotkeys/│
//!             │              │   │  grabbed input)│
//!             └──────────────┘   └────────────────┘
//! ```
//!
//! # Module Structure
//!
//! - `focus`: the focus state machine (grabs, pointer, transfers)
//! - `brightness`: fade planning onto the scheduler
//! - `run`: the event loop

// Rust guideline compliant 2026-03

mod brightness;
mod focus;
mod run;

pub use run::run;

use anyhow::{Context, Result};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::clock::{Clock, Timeline};
use crate::config::{FocusHint, MouseSwitch, ShowNullSwitch, Topology};
use crate::edge::{transitions, EdgeEvent, EdgeHistory};
use crate::hotkey::HotkeyAction;
use crate::link::{Link, LinkEvent, LinkFeed};
use crate::platform::{Keycode, Platform, PlatformEvent};
use crate::protocol::{Message, SetupPayload, PROTOCOL_VERSION};
use crate::remote::{ConnState, Node, Remote, RemoteId};

/// A callback scheduled on the hub's own timeline.
///
/// Closed enum rather than boxed closures: every scheduled call the control
/// plane performs is one of these, and exhaustive matching keeps the
/// dispatch visible in one place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScheduledCall {
    /// Set the master display's brightness (a fade step).
    SetMasterBrightness(f32),
}

/// The master-side control plane.
pub struct Hub {
    platform: Box<dyn Platform>,
    clock: Clock,
    remotes: Vec<Remote>,
    master_neighbors: [Option<Node>; 4],
    hint: FocusHint,
    mouse: MouseSwitch,
    nullswitch: ShowNullSwitch,
    focused: Node,
    saved_master_pos: (i32, i32),
    master_edges: EdgeHistory,
    calls: Timeline<ScheduledCall>,
    feed_tx: mpsc::UnboundedSender<LinkFeed>,
    feed_rx: Option<mpsc::UnboundedReceiver<LinkFeed>>,
    platform_rx: Option<mpsc::UnboundedReceiver<PlatformEvent>>,
    quitting: bool,
}

impl Hub {
    /// Build the hub from a resolved topology: start the platform driver,
    /// bind every hotkey, and create the remote registry.
    ///
    /// Remotes start out Failed with an immediate reconnect deadline, so the
    /// first event-loop pass performs the initial setup through the same
    /// path as every later reconnect.
    ///
    /// # Errors
    ///
    /// Driver start failures and hotkey binding failures (bad combination,
    /// collision) are fatal.
    pub fn new(topo: Topology, mut platform: Box<dyn Platform>) -> Result<Hub> {
        let (platform_tx, platform_rx) = mpsc::unbounded_channel();
        platform.start(platform_tx).context("start platform driver")?;
        for binding in &topo.hotkeys {
            platform
                .bind_hotkey(&binding.combo, binding.action)
                .with_context(|| format!("bind hotkey '{}'", binding.combo))?;
        }

        let (feed_tx, feed_rx) = mpsc::unbounded_channel();
        let remotes = topo
            .remotes
            .into_iter()
            .enumerate()
            .map(|(id, spec)| Remote::new(id, spec))
            .collect();

        Ok(Hub {
            platform,
            clock: Clock::new(),
            remotes,
            master_neighbors: topo.master_neighbors,
            hint: topo.hint,
            mouse: topo.mouse_switch,
            nullswitch: topo.show_nullswitch,
            focused: Node::Master,
            saved_master_pos: (0, 0),
            master_edges: EdgeHistory::new(),
            calls: Timeline::new(),
            feed_tx,
            feed_rx: Some(feed_rx),
            platform_rx: Some(platform_rx),
            quitting: false,
        })
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    /// Microseconds on the hub's monotonic clock.
    #[must_use]
    pub fn now_us(&self) -> u64 {
        self.clock.now_us()
    }

    /// The currently focused node.
    #[must_use]
    pub fn focused(&self) -> Node {
        self.focused
    }

    /// Read access to a remote record.
    #[must_use]
    pub fn remote(&self, id: RemoteId) -> &Remote {
        &self.remotes[id]
    }

    /// Number of remotes in the registry.
    #[must_use]
    pub fn remote_count(&self) -> usize {
        self.remotes.len()
    }

    /// Whether a quit was requested.
    #[must_use]
    pub fn quitting(&self) -> bool {
        self.quitting
    }

    /// Detach the link-feed receiver (the event loop owns it while running).
    pub fn take_feed_rx(&mut self) -> Option<mpsc::UnboundedReceiver<LinkFeed>> {
        self.feed_rx.take()
    }

    /// Detach the platform-event receiver.
    pub fn take_platform_rx(&mut self) -> Option<mpsc::UnboundedReceiver<PlatformEvent>> {
        self.platform_rx.take()
    }

    fn alias(&self, id: RemoteId) -> &str {
        &self.remotes[id].alias
    }

    fn node_name(&self, node: Node) -> &str {
        match node {
            Node::Master => "master",
            Node::Remote(id) => self.alias(id),
        }
    }

    /// Neighbor slots of a node.
    #[must_use]
    pub fn neighbors_of(&self, node: Node) -> [Option<Node>; 4] {
        match node {
            Node::Master => self.master_neighbors,
            Node::Remote(id) => self.remotes[id].neighbors,
        }
    }

    // ── Remote lifecycle ────────────────────────────────────────────────────

    /// Spawn the transport for a remote and begin the handshake.
    ///
    /// # Errors
    ///
    /// Spawn failure is returned (and treated as fatal by the event loop):
    /// if the transport binary cannot even start, no backoff will help.
    pub fn setup_remote(&mut self, id: RemoteId) -> Result<()> {
        let (child, stdout, stdin) = self.remotes[id].spawn_transport()?;
        self.install_transport(id, stdout, stdin, Some(child));
        Ok(())
    }

    /// Install an established transport for a remote and send SETUP.
    ///
    /// Production goes through [`Hub::setup_remote`]; anything that can
    /// produce a byte-stream pair (an already-connected socket, an
    /// in-memory duplex) can stand in as the transport here.
    pub fn install_transport<R, W>(
        &mut self,
        id: RemoteId,
        reader: R,
        writer: W,
        child: Option<Child>,
    ) where
        R: tokio::io::AsyncRead + Send + Unpin + 'static,
        W: tokio::io::AsyncWrite + Send + Unpin + 'static,
    {
        let remote = &mut self.remotes[id];
        remote.generation += 1;
        let link = Link::spawn(id, remote.generation, reader, writer, self.feed_tx.clone());
        let setup = Message::Setup(SetupPayload {
            version: PROTOCOL_VERSION,
            params: remote.params.clone(),
        });
        if let Err(e) = link.enqueue(setup) {
            // A fresh queue cannot be full; this means the writer died at birth.
            log::error!("[{}] could not queue SETUP: {e}", remote.alias);
        }
        remote.child = child;
        remote.link = Some(link);
        remote.state = ConnState::SettingUp;
        remote.next_reconnect_us = None;
        log::info!(
            "[{}] transport up (attempt {}), awaiting READY",
            remote.alias,
            remote.failcount + 1
        );
    }

    /// Hard-fail a remote: teardown, backoff bookkeeping, focus rescue.
    pub fn fail_remote(&mut self, id: RemoteId, reason: &str) {
        if !self.remotes[id].is_live() {
            return;
        }
        let now = self.now_us();
        let state = self.remotes[id].note_failure(now);
        let remote = &self.remotes[id];
        match state {
            ConnState::PermFailed => log::warn!(
                "[{}] {reason}; {} consecutive failures, giving up until RECONNECT",
                remote.alias,
                remote.failcount
            ),
            _ => log::warn!(
                "[{}] {reason}; retrying in {:.1}s (failure {})",
                remote.alias,
                (remote.next_reconnect_us.unwrap_or(now) - now) as f64 / 1e6,
                remote.failcount
            ),
        }
        if self.focused == Node::Remote(id) {
            self.force_focus_master();
        }
    }

    /// Re-setup every FAILED remote whose backoff deadline has passed.
    ///
    /// # Errors
    ///
    /// Propagates transport spawn failures (fatal).
    pub fn sweep_reconnects(&mut self, now_us: u64) -> Result<()> {
        for id in 0..self.remotes.len() {
            let remote = &self.remotes[id];
            if remote.state == ConnState::Failed
                && remote.next_reconnect_us.is_some_and(|at| at <= now_us)
            {
                self.setup_remote(id)?;
            }
        }
        Ok(())
    }

    /// The RECONNECT action: clear permanent failures and failure counters
    /// everywhere and make every failed remote due immediately.
    pub fn reconnect_all(&mut self) {
        let now = self.now_us();
        for remote in &mut self.remotes {
            remote.clear_failures(now);
        }
        log::info!("reconnect requested; all failure counters cleared");
    }

    // ── Outbound ────────────────────────────────────────────────────────────

    /// Queue a message to a live remote; overflow or a dead writer fails it.
    pub fn send_to(&mut self, id: RemoteId, msg: Message) {
        let remote = &self.remotes[id];
        if !remote.is_live() {
            log::debug!("[{}] dropping {} (not live)", remote.alias, msg.kind());
            return;
        }
        let result = match &remote.link {
            Some(link) => link.enqueue(msg),
            None => return,
        };
        if let Err(e) = result {
            self.fail_remote(id, &e.to_string());
        }
    }

    /// Schedule a message on a remote for a future send time.
    pub fn schedule_message(&mut self, id: RemoteId, at_us: u64, msg: Message) {
        let remote = &mut self.remotes[id];
        if remote.is_live() {
            remote.pending.push(at_us, msg);
        }
    }

    /// Move every due scheduled message onto the wire, per remote, in order.
    pub fn flush_due_messages(&mut self, now_us: u64) {
        for id in 0..self.remotes.len() {
            if !self.remotes[id].is_live() {
                continue;
            }
            for msg in self.remotes[id].pending.take_due(now_us) {
                self.send_to(id, msg);
                if !self.remotes[id].is_live() {
                    // send_to failed the remote; its queue is already gone.
                    break;
                }
            }
        }
    }

    // ── Scheduler ───────────────────────────────────────────────────────────

    /// Run every scheduled call due at `now_us`, in order.
    pub fn run_due_calls(&mut self, now_us: u64) {
        for call in self.calls.take_due(now_us) {
            match call {
                ScheduledCall::SetMasterBrightness(level) => {
                    self.platform.set_display_brightness(level);
                }
            }
        }
    }

    /// Earliest of: scheduled call, scheduled message on a live remote,
    /// reconnect deadline of a failed remote. `None` means nothing is
    /// time-driven right now.
    #[must_use]
    pub fn next_deadline_us(&self) -> Option<u64> {
        let mut deadline = self.calls.next_at();
        for remote in &self.remotes {
            let candidate = match remote.state {
                ConnState::Failed => remote.next_reconnect_us,
                _ if remote.is_live() => remote.pending.next_at(),
                _ => None,
            };
            deadline = match (deadline, candidate) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
        }
        deadline
    }

    /// The instant corresponding to a deadline on the hub clock.
    #[must_use]
    pub fn deadline_instant(&self, at_us: u64) -> Instant {
        self.clock.instant_at(at_us)
    }

    // ── Inbound dispatch ────────────────────────────────────────────────────

    /// Act on a link task report. Reports from stale link incarnations are
    /// dropped — dispatch may have failed a remote earlier in this very
    /// loop iteration.
    pub fn handle_link_feed(&mut self, feed: LinkFeed) {
        let current = self.remotes[feed.id]
            .link
            .as_ref()
            .map(|link| link.generation());
        if current != Some(feed.generation) {
            return;
        }
        match feed.event {
            LinkEvent::Frame(msg) => self.dispatch_message(feed.id, msg),
            LinkEvent::Closed { error } => {
                let reason = error.unwrap_or_else(|| "transport closed".to_owned());
                self.fail_remote(feed.id, &reason);
            }
        }
    }

    fn dispatch_message(&mut self, id: RemoteId, msg: Message) {
        let state = self.remotes[id].state;
        match (state, msg) {
            (ConnState::SettingUp, Message::Ready) => self.mark_connected(id),
            (_, Message::LogMsg(text)) => {
                log::info!("[{}] {text}", self.alias(id));
            }
            (ConnState::Connected, Message::SetClipboard(buf)) => {
                self.clipboard_from_remote(buf);
            }
            (
                ConnState::Connected,
                Message::EdgeMaskChange {
                    old_mask,
                    new_mask,
                    x,
                    y,
                },
            ) => {
                self.edge_transition(Node::Remote(id), old_mask, new_mask, x, y);
            }
            (_, other) => {
                self.fail_remote(id, &format!("unexpected {} message", other.kind()));
            }
        }
    }

    fn mark_connected(&mut self, id: RemoteId) {
        let remote = &mut self.remotes[id];
        remote.state = ConnState::Connected;
        remote.failcount = 0;
        remote.next_reconnect_us = None;
        log::info!("[{}] ready", remote.alias);
        if self.hint.mode == crate::config::FocusHintMode::DimInactive
            && self.focused != Node::Remote(id)
        {
            // A freshly connected, unfocused display starts its life dimmed.
            self.fade(Node::Remote(id), 1.0, self.hint.brightness);
        }
    }

    /// An unsolicited (or requested) clipboard from a remote: apply locally
    /// no matter where focus lives — the GETCLIPBOARD answer routinely
    /// arrives after focus has moved on — then forward to the focused
    /// remote, if any.
    fn clipboard_from_remote(&mut self, buf: Vec<u8>) {
        self.platform.set_clipboard(&buf);
        if let Node::Remote(focused) = self.focused {
            self.send_to(focused, Message::SetClipboard(buf));
        }
    }

    // ── Platform events ─────────────────────────────────────────────────────

    /// Act on one platform driver event.
    pub fn handle_platform_event(&mut self, event: PlatformEvent) {
        match event {
            PlatformEvent::EdgeMask {
                old_mask,
                new_mask,
                x,
                y,
            } => self.edge_transition(Node::Master, old_mask, new_mask, x, y),
            PlatformEvent::Key { keycode, press } => {
                if let Node::Remote(id) = self.focused {
                    self.send_to(id, Message::KeyEvent { keycode, press });
                }
            }
            PlatformEvent::MotionRel { dx, dy } => {
                if let Node::Remote(id) = self.focused {
                    self.send_to(id, Message::MoveRel { dx, dy });
                }
            }
            PlatformEvent::Button { button, press } => {
                if let Node::Remote(id) = self.focused {
                    self.send_to(id, Message::ClickEvent { button, press });
                }
            }
            PlatformEvent::Hotkey { action, modifiers } => {
                self.handle_hotkey(action, &modifiers);
            }
        }
    }

    /// Dispatch a fired hotkey action.
    pub fn handle_hotkey(&mut self, action: HotkeyAction, modifiers: &[Keycode]) {
        match action {
            HotkeyAction::Switch(dir) => {
                let target = self.neighbors_of(self.focused)[dir.index()];
                self.focus_node(target, modifiers, true);
            }
            HotkeyAction::SwitchTo(node) => {
                self.focus_node(Some(node), modifiers, true);
            }
            HotkeyAction::Reconnect => self.reconnect_all(),
            HotkeyAction::Quit => {
                log::info!("quit requested");
                self.quitting = true;
            }
        }
    }

    // ── Edge events ─────────────────────────────────────────────────────────

    /// Record an edge-mask transition for a node and fire any completed
    /// multi-tap gesture.
    pub fn edge_transition(&mut self, node: Node, old_mask: u8, new_mask: u8, x: f32, y: f32) {
        let now = self.now_us();
        for (dir, event) in transitions(old_mask, new_mask) {
            let recorded = match node {
                Node::Master => self.master_edges.record(dir, event, now),
                Node::Remote(id) => self.remotes[id].edges.record(dir, event, now),
            };
            if let Err(e) = recorded {
                log::warn!("{}: {e}", self.node_name(node));
                continue;
            }
            if event != EdgeEvent::Arrive || !self.mouse.enabled {
                continue;
            }
            // Only the focused node's pointer is actually being driven by
            // the user; gestures reported by anyone else don't move focus.
            if node != self.focused {
                continue;
            }
            let history = match node {
                Node::Master => &self.master_edges,
                Node::Remote(id) => &self.remotes[id].edges,
            };
            if !history.tap_completed(dir, self.mouse.taps, self.mouse.window_us, now) {
                continue;
            }
            let target = self.neighbors_of(node)[dir.index()];
            let modifiers = self.platform.current_modifiers();
            if self.focus_node(target, &modifiers, false) {
                // Visual continuity: enter the new screen at the opposite
                // edge, preserving the coordinate along it.
                let (nx, ny) = dir.entry_point(x, y);
                match self.focused {
                    Node::Master => self.platform.set_mouse_pos_screen_rel(nx, ny),
                    Node::Remote(id) => {
                        self.send_to(id, Message::SetMousePosScreenRel { x: nx, y: ny });
                    }
                }
            }
        }
    }

    // ── Shutdown ────────────────────────────────────────────────────────────

    /// Clean shutdown: return focus to the master, restore brightness on
    /// every connected display, and tear every transport down.
    pub fn shutdown(&mut self) {
        if self.focused != Node::Master {
            self.force_focus_master();
        }
        // Restore full brightness everywhere, whatever dimmed it: a display
        // must never be left dark by a master that is gone.
        for id in 0..self.remotes.len() {
            if self.remotes[id].state == ConnState::Connected {
                self.send_to(id, Message::SetBrightness(1.0));
            }
        }
        self.platform.set_display_brightness(1.0);
        for remote in &mut self.remotes {
            remote.teardown();
        }
        log::info!("shut down");
    }
}
