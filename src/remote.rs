//! Remote peer records and the connection-lifecycle state machine.
//!
//! Each configured remote owns its transport subprocess (an SSH client with
//! piped stdio), its framed [`Link`], a queue of future-dated outbound
//! messages, and its edge-event history. The record survives the whole
//! process lifetime; the subprocess and link are reborn across failure
//! cycles.
//!
//! # Connection states
//!
//! ```text
//!           setup            READY
//! (start) ───────► SettingUp ──────► Connected
//!                      │                 │
//!                      │ error/overflow  │ error/EOF/violation
//!                      ▼                 ▼
//!                   Failed ◄─────────────┘
//!                __/    │ \_ backoff deadline reached ──► setup again
//!   failcount > 10      │
//!                      ▼
//!                  PermFailed ── RECONNECT action ──► Failed (deadline now)
//! ```
//!
//! A remote is *live* in SettingUp or Connected. Backoff doubles from 0.5 s
//! per consecutive failure and caps at 30 s; the 11th consecutive failure
//! parks the remote in PermFailed until the user fires the RECONNECT action.

// Rust guideline compliant 2026-03

use std::collections::BTreeMap;
use std::fmt;
use std::process::Stdio;

use anyhow::{anyhow, Context, Result};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::clock::Timeline;
use crate::config::{RemoteSpec, SshSettings};
use crate::edge::EdgeHistory;
use crate::link::Link;
use crate::protocol::Message;

/// Handle into the remote registry (index into `Vec<Remote>`).
pub type RemoteId = usize;

/// A focusable node: the master itself or one of the remotes.
///
/// Unresolved references exist only as strings inside the raw configuration;
/// by the time a `Node` is constructed every name has been resolved, so
/// there is no unresolved variant to match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    /// The host running the hub.
    Master,
    /// A configured remote.
    Remote(RemoteId),
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Transport spawned, SETUP sent, READY not yet received.
    SettingUp,
    /// Handshake complete; input may be forwarded here.
    Connected,
    /// Torn down; will retry at `next_reconnect_us`.
    Failed,
    /// Too many consecutive failures; waiting for an explicit RECONNECT.
    PermFailed,
}

impl fmt::Display for ConnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnState::SettingUp => "setting-up",
            ConnState::Connected => "connected",
            ConnState::Failed => "failed",
            ConnState::PermFailed => "permanently-failed",
        };
        write!(f, "{name}")
    }
}

/// Consecutive failures tolerated before a remote goes PermFailed.
pub const MAX_FAILURES: u32 = 10;

/// Reconnect delay after the `failcount`-th consecutive failure:
/// `min(2^(failcount-1), 60) × 0.5 s`, i.e. 0.5 s doubling up to a 30 s cap.
#[must_use]
pub fn backoff_us(failcount: u32) -> u64 {
    let exp = failcount.saturating_sub(1).min(7);
    let factor = (1u64 << exp).min(60);
    factor * 500_000
}

/// One configured remote peer.
#[derive(Debug)]
pub struct Remote {
    /// Registry handle of this remote.
    pub id: RemoteId,
    /// Unique alias from the configuration.
    pub alias: String,
    /// Hostname the transport connects to.
    pub hostname: String,
    /// Parameters sent in the SETUP handshake.
    pub params: BTreeMap<String, String>,
    /// Transport settings (per-remote overlaid on global defaults).
    pub ssh: SshSettings,
    /// Neighbor slot per direction, indexed by [`Direction::index`](crate::edge::Direction::index).
    pub neighbors: [Option<Node>; 4],
    /// Lifecycle state.
    pub state: ConnState,
    /// Consecutive failures since the last successful handshake.
    pub failcount: u32,
    /// When a Failed remote becomes eligible for another setup.
    pub next_reconnect_us: Option<u64>,
    /// Transport subprocess of the current incarnation.
    pub child: Option<Child>,
    /// Framed channel of the current incarnation.
    pub link: Option<Link>,
    /// Incarnation counter; link feeds from older incarnations are stale.
    pub generation: u64,
    /// Future-dated outbound messages, ordered by send time.
    pub pending: Timeline<Message>,
    /// Per-direction edge-event history for this remote's display.
    pub edges: EdgeHistory,
}

impl Remote {
    /// Create the registry record for a resolved remote spec.
    ///
    /// The record starts Failed with an immediate reconnect deadline, so the
    /// first event-loop pass performs the initial setup through the same
    /// path as every later reconnect.
    pub fn new(id: RemoteId, spec: RemoteSpec) -> Self {
        Self {
            id,
            alias: spec.alias,
            hostname: spec.hostname,
            params: spec.params,
            ssh: spec.ssh,
            neighbors: spec.neighbors,
            state: ConnState::Failed,
            failcount: 0,
            next_reconnect_us: Some(0),
            child: None,
            link: None,
            generation: 0,
            pending: Timeline::new(),
            edges: EdgeHistory::new(),
        }
    }

    /// Live means the transport exists and messages may be queued.
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self.state, ConnState::SettingUp | ConnState::Connected)
    }

    /// The transport argv: per-remote settings overlaid on the defaults.
    ///
    /// `-T` (no PTY) and batch mode keep the shell client non-interactive;
    /// keepalives detect a dead peer even when no input flows.
    #[must_use]
    pub fn transport_argv(&self) -> Vec<String> {
        let s = &self.ssh;
        let mut argv = vec![
            s.command.clone(),
            "-T".to_owned(),
            "-oBatchMode=yes".to_owned(),
            format!("-oServerAliveInterval={}", s.keepalive_secs),
        ];
        if let Some(port) = s.port {
            argv.push("-p".to_owned());
            argv.push(port.to_string());
        }
        if let Some(bind) = &s.bind_address {
            argv.push("-b".to_owned());
            argv.push(bind.clone());
        }
        if let Some(identity) = &s.identity {
            argv.push("-i".to_owned());
            argv.push(shellexpand::tilde(identity).into_owned());
        }
        if let Some(user) = &s.user {
            argv.push("-l".to_owned());
            argv.push(user.clone());
        }
        argv.push(self.hostname.clone());
        argv.push(s.remote_command.clone());
        argv
    }

    /// Spawn the transport subprocess with piped stdio.
    ///
    /// stderr is inherited so the shell client's own diagnostics reach the
    /// master's stderr. `kill_on_drop` guarantees no orphan survives the
    /// record, whatever teardown path runs.
    ///
    /// # Errors
    ///
    /// A spawn failure (missing binary, fd exhaustion) is returned to the
    /// caller, where it is fatal: if the transport cannot even start, no
    /// amount of backoff will help.
    pub fn spawn_transport(&self) -> Result<(Child, ChildStdout, ChildStdin)> {
        let argv = self.transport_argv();
        log::debug!("[{}] spawning transport: {}", self.alias, argv.join(" "));
        let mut child = Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawn transport '{}' for {}", argv[0], self.alias))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("transport child has no stdout"))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("transport child has no stdin"))?;
        Ok((child, stdout, stdin))
    }

    /// Tear down the current incarnation: drop the link, SIGKILL the child,
    /// and discard scheduled messages.
    ///
    /// The kill is immediate and unconditional — the shell client has been
    /// seen ignoring polite termination, and a blocked reap would stall the
    /// whole event loop. Reaping happens in the background via tokio.
    pub fn teardown(&mut self) {
        self.link = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
        }
        self.pending.clear();
    }

    /// Record a failure: teardown, bump the counter, compute the next
    /// deadline. Returns the resulting state.
    pub fn note_failure(&mut self, now_us: u64) -> ConnState {
        self.teardown();
        self.failcount += 1;
        if self.failcount > MAX_FAILURES {
            self.state = ConnState::PermFailed;
            self.next_reconnect_us = None;
        } else {
            self.state = ConnState::Failed;
            self.next_reconnect_us = Some(now_us + backoff_us(self.failcount));
        }
        self.state
    }

    /// Apply the RECONNECT action: clear permanent failure and the counter,
    /// and make any failed remote due immediately. Live remotes keep running.
    pub fn clear_failures(&mut self, now_us: u64) {
        self.failcount = 0;
        self.next_reconnect_us = Some(now_us);
        if self.state == ConnState::PermFailed {
            self.state = ConnState::Failed;
        }
    }
}
