//! Shared test fixtures: a recording platform driver and a hub harness that
//! attaches in-memory transports in place of SSH subprocesses.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};

use edgehop::codec::FrameCodec;
use edgehop::config::{Config, Topology};
use edgehop::hotkey::HotkeyAction;
use edgehop::hub::Hub;
use edgehop::link::LinkFeed;
use edgehop::platform::{Keycode, Platform, PlatformEvent};
use edgehop::remote::RemoteId;

/// Everything the mock driver was asked to do, for assertions.
#[derive(Debug, Default)]
pub struct MockState {
    pub grabbed: bool,
    pub grab_count: usize,
    pub mouse: (i32, i32),
    pub screen_rel_warps: Vec<(f32, f32)>,
    pub clipboard: Vec<u8>,
    pub brightness: Vec<f32>,
    pub modifiers: Vec<Keycode>,
    pub bound_hotkeys: Vec<String>,
}

/// Recording platform driver; the test keeps a handle to the shared state.
#[derive(Debug, Clone, Default)]
pub struct MockPlatform {
    pub state: Arc<Mutex<MockState>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }
}

impl Platform for MockPlatform {
    fn start(&mut self, _events: mpsc::UnboundedSender<PlatformEvent>) -> Result<()> {
        Ok(())
    }

    fn bind_hotkey(&mut self, combo: &str, _action: HotkeyAction) -> Result<()> {
        self.state().bound_hotkeys.push(combo.to_owned());
        Ok(())
    }

    fn grab_inputs(&mut self) -> Result<()> {
        let mut s = self.state();
        s.grabbed = true;
        s.grab_count += 1;
        Ok(())
    }

    fn ungrab_inputs(&mut self) {
        self.state().grabbed = false;
    }

    fn mouse_pos(&mut self) -> (i32, i32) {
        self.state().mouse
    }

    fn set_mouse_pos(&mut self, x: i32, y: i32) {
        self.state().mouse = (x, y);
    }

    fn set_mouse_pos_screen_rel(&mut self, x: f32, y: f32) {
        self.state().screen_rel_warps.push((x, y));
    }

    fn clipboard_text(&mut self) -> Option<Vec<u8>> {
        let s = self.state();
        if s.clipboard.is_empty() {
            None
        } else {
            Some(s.clipboard.clone())
        }
    }

    fn set_clipboard(&mut self, data: &[u8]) {
        self.state().clipboard = data.to_vec();
    }

    fn display_brightness(&mut self) -> f32 {
        self.state().brightness.last().copied().unwrap_or(1.0)
    }

    fn set_display_brightness(&mut self, level: f32) {
        self.state().brightness.push(level);
    }

    fn current_modifiers(&mut self) -> Vec<Keycode> {
        self.state().modifiers.clone()
    }

    fn inject_key(&mut self, _keycode: Keycode, _press: bool) {}

    fn inject_button(&mut self, _button: u32, _press: bool) {}

    fn inject_motion(&mut self, _dx: i32, _dy: i32) {}
}

/// The far side of an attached in-memory transport.
pub struct Peer {
    pub rx: FramedRead<ReadHalf<DuplexStream>, FrameCodec>,
    pub tx: FramedWrite<WriteHalf<DuplexStream>, FrameCodec>,
}

impl Peer {
    /// Next frame from the hub, skipping nothing.
    pub async fn recv(&mut self) -> edgehop::Message {
        use futures_util::StreamExt;
        self.rx
            .next()
            .await
            .expect("peer stream ended")
            .expect("peer decode")
    }

    pub async fn send(&mut self, msg: edgehop::Message) {
        use futures_util::SinkExt;
        self.tx.send(msg).await.expect("peer send");
    }
}

/// Hub plus the detached feed receiver the event loop would normally own.
pub struct Harness {
    pub hub: Hub,
    pub feeds: mpsc::UnboundedReceiver<LinkFeed>,
    pub mock: MockPlatform,
}

impl Harness {
    pub fn new(topology: Topology) -> Self {
        let mock = MockPlatform::new();
        let mut hub = Hub::new(topology, Box::new(mock.clone())).expect("hub");
        let feeds = hub.take_feed_rx().expect("feed receiver");
        Harness { hub, feeds, mock }
    }

    /// Attach an in-memory transport to a remote, returning the far side.
    /// The hub sends SETUP immediately and treats the remote as SettingUp.
    pub fn attach(&mut self, id: RemoteId) -> Peer {
        let (ours, theirs) = tokio::io::duplex(64 * 1024);
        let (reader, writer) = tokio::io::split(ours);
        self.hub.install_transport(id, reader, writer, None);
        let (peer_reader, peer_writer) = tokio::io::split(theirs);
        Peer {
            rx: FramedRead::new(peer_reader, FrameCodec::new()),
            tx: FramedWrite::new(peer_writer, FrameCodec::new()),
        }
    }

    /// Let the link tasks run, then dispatch everything they fed.
    pub async fn pump(&mut self) {
        for _ in 0..2 {
            for _ in 0..32 {
                tokio::task::yield_now().await;
            }
            while let Ok(feed) = self.feeds.try_recv() {
                self.hub.handle_link_feed(feed);
            }
        }
    }

    /// Attach and complete the handshake for a remote.
    pub async fn connect(&mut self, id: RemoteId) -> Peer {
        let mut peer = self.attach(id);
        // Consume the hub's SETUP so later assertions see a clean stream.
        match peer.recv().await {
            edgehop::Message::Setup(setup) => {
                assert_eq!(setup.version, edgehop::PROTOCOL_VERSION);
            }
            other => panic!("expected Setup, got {other:?}"),
        }
        peer.send(edgehop::Message::Ready).await;
        self.pump().await;
        assert_eq!(
            self.hub.remote(id).state,
            edgehop::ConnState::Connected,
            "handshake should connect remote {id}"
        );
        peer
    }
}

/// Master with one remote to the right ("desk") and one below ("pi").
/// No focus hint, double-tap edge switching with a 400 ms window.
pub fn two_remote_topology() -> Topology {
    let text = r#"
        [master]
        right = "desk"
        down = "pi"

        [[remote]]
        alias = "desk"
        hostname = "desk.lan"
        left = "master"

        [[remote]]
        alias = "pi"
        hostname = "pi.lan"
        up = "master"

        [hotkeys]
        "ctrl+alt+Right" = "switch-right"
        "ctrl+alt+m" = "switch-to:master"
        "ctrl+alt+d" = "switch-to:desk"
        "ctrl+alt+r" = "reconnect"
        "ctrl+alt+q" = "quit"

        [mouse_switch]
        taps = 2
        window_us = 400000
    "#;
    Config::parse(text).unwrap().resolve().unwrap()
}

/// Same layout with the dim-inactive hint from the brightness scenarios.
pub fn dim_hint_topology() -> Topology {
    let text = r#"
        [master]
        right = "desk"

        [[remote]]
        alias = "desk"
        left = "master"

        [focus_hint]
        mode = "dim-inactive"
        brightness = 0.3
        duration_us = 300000
        fade_steps = 6
    "#;
    Config::parse(text).unwrap().resolve().unwrap()
}

/// Narrow-window variant for the negative double-tap case.
pub fn narrow_window_topology() -> Topology {
    let text = r#"
        [master]
        right = "desk"

        [[remote]]
        alias = "desk"
        left = "master"

        [mouse_switch]
        taps = 2
        window_us = 100000
    "#;
    Config::parse(text).unwrap().resolve().unwrap()
}
