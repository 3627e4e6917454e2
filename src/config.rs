//! Configuration loading, validation, and topology resolution.
//!
//! The config file is TOML. A minimal two-machine setup:
//!
//! ```toml
//! [master]
//! right = "desk"
//!
//! [[remote]]
//! alias = "desk"
//! hostname = "desk.lan"
//! left = "master"
//!
//! [hotkeys]
//! "ctrl+alt+Right" = "switch-right"
//! "ctrl+alt+Left" = "switch-to:master"
//! "ctrl+alt+r" = "reconnect"
//! "ctrl+alt+q" = "quit"
//! ```
//!
//! Loading happens in two stages. [`Config::load`] gates on file ownership
//! (the file names hosts we will run commands on, so it must belong to the
//! invoking user and be writable by nobody else) and deserializes the raw
//! TOML. [`Config::resolve`] overlays per-remote SSH settings on the global
//! defaults, resolves every neighbor and hotkey node name — by alias first,
//! then by hostname — into a concrete [`Node`], and validates the result.
//! After resolve, no unresolved reference exists anywhere downstream.

// Rust guideline compliant 2026-03

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::edge::{Direction, EDGE_HISTORY_LEN};
use crate::hotkey::{ActionSpec, HotkeyAction, HotkeyBinding};
use crate::remote::{Node, RemoteId};

/// Merged transport settings for one remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshSettings {
    /// Shell-transport client binary.
    pub command: String,
    /// `-p` port, when set.
    pub port: Option<u16>,
    /// `-b` bind address, when set.
    pub bind_address: Option<String>,
    /// `-i` identity file, `~`-expanded at spawn.
    pub identity: Option<String>,
    /// `-l` login user, when set.
    pub user: Option<String>,
    /// Command executed on the far end (our own binary in subordinate mode).
    pub remote_command: String,
    /// `ServerAliveInterval` seconds.
    pub keepalive_secs: u64,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            command: "ssh".to_owned(),
            port: None,
            bind_address: None,
            identity: None,
            user: None,
            remote_command: "edgehop".to_owned(),
            keepalive_secs: 30,
        }
    }
}

/// Brightness-hint variant shown on focus transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FocusHintMode {
    /// No visual hint.
    #[default]
    None,
    /// Unfocused nodes sit dimmed; focus transitions fade both sides.
    DimInactive,
    /// The newly focused node flashes back up to full brightness.
    FlashActive,
}

/// Focus-hint configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocusHint {
    /// Which hint to show.
    pub mode: FocusHintMode,
    /// Brightness of an unfocused display, in [0, 1].
    pub brightness: f32,
    /// Total fade duration in microseconds.
    pub duration_us: u64,
    /// Number of equal-duration fade steps.
    pub fade_steps: u32,
}

impl Default for FocusHint {
    fn default() -> Self {
        Self {
            mode: FocusHintMode::None,
            brightness: 0.5,
            duration_us: 250_000,
            fade_steps: 5,
        }
    }
}

/// Edge-gesture configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseSwitch {
    /// Whether edge gestures switch focus at all.
    pub enabled: bool,
    /// Taps required (N rapid arrivals on the same edge).
    pub taps: u32,
    /// Window within which all N taps must land, in microseconds.
    pub window_us: u64,
}

impl Default for MouseSwitch {
    fn default() -> Self {
        Self {
            enabled: true,
            taps: 2,
            window_us: 300_000,
        }
    }
}

/// When a switch to the already-focused node still shows the visual hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShowNullSwitch {
    /// Never indicate null switches.
    #[default]
    Never,
    /// Indicate every null switch.
    Always,
    /// Indicate only hotkey-initiated null switches.
    HotkeyOnly,
}

/// One resolved remote: alias, hostname, handshake params, merged transport
/// settings, and neighbor slots by direction index.
#[derive(Debug, Clone)]
pub struct RemoteSpec {
    /// Unique alias.
    pub alias: String,
    /// Hostname for the transport.
    pub hostname: String,
    /// Key-value parameters sent at handshake.
    pub params: BTreeMap<String, String>,
    /// Merged transport settings.
    pub ssh: SshSettings,
    /// Neighbor per direction, [`Direction::index`]-indexed.
    pub neighbors: [Option<Node>; 4],
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Topology {
    /// The master's neighbor slots.
    pub master_neighbors: [Option<Node>; 4],
    /// All remotes; [`RemoteId`]s index into this.
    pub remotes: Vec<RemoteSpec>,
    /// Resolved hotkey bindings.
    pub hotkeys: Vec<HotkeyBinding>,
    /// Focus-hint settings.
    pub hint: FocusHint,
    /// Edge-gesture settings.
    pub mouse_switch: MouseSwitch,
    /// Null-switch indication policy.
    pub show_nullswitch: ShowNullSwitch,
    /// Platform driver name.
    pub driver: String,
}

// ── Raw TOML shapes ─────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct RawNeighbors {
    left: Option<String>,
    right: Option<String>,
    up: Option<String>,
    down: Option<String>,
}

impl RawNeighbors {
    fn slot(&self, dir: Direction) -> Option<&String> {
        match dir {
            Direction::Left => self.left.as_ref(),
            Direction::Right => self.right.as_ref(),
            Direction::Up => self.up.as_ref(),
            Direction::Down => self.down.as_ref(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawSsh {
    command: Option<String>,
    port: Option<u16>,
    bind_address: Option<String>,
    identity: Option<String>,
    user: Option<String>,
    remote_command: Option<String>,
    keepalive_secs: Option<u64>,
}

impl RawSsh {
    fn overlay(&self, base: &SshSettings) -> SshSettings {
        SshSettings {
            command: self.command.clone().unwrap_or_else(|| base.command.clone()),
            port: self.port.or(base.port),
            bind_address: self
                .bind_address
                .clone()
                .or_else(|| base.bind_address.clone()),
            identity: self.identity.clone().or_else(|| base.identity.clone()),
            user: self.user.clone().or_else(|| base.user.clone()),
            remote_command: self
                .remote_command
                .clone()
                .unwrap_or_else(|| base.remote_command.clone()),
            keepalive_secs: self.keepalive_secs.unwrap_or(base.keepalive_secs),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawRemote {
    alias: String,
    /// Defaults to the alias.
    hostname: Option<String>,
    #[serde(flatten)]
    neighbors: RawNeighbors,
    #[serde(default)]
    params: BTreeMap<String, String>,
    #[serde(default)]
    ssh: RawSsh,
}

#[derive(Debug, Default, Deserialize)]
struct RawFocusHint {
    mode: Option<FocusHintMode>,
    brightness: Option<f32>,
    duration_us: Option<u64>,
    fade_steps: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMouseSwitch {
    enabled: Option<bool>,
    taps: Option<u32>,
    window_us: Option<u64>,
}

/// Deserialized config file, names not yet resolved.
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    master: RawNeighbors,
    #[serde(default)]
    ssh: RawSsh,
    #[serde(default, rename = "remote")]
    remotes: Vec<RawRemote>,
    #[serde(default)]
    hotkeys: BTreeMap<String, String>,
    #[serde(default)]
    focus_hint: RawFocusHint,
    #[serde(default)]
    mouse_switch: RawMouseSwitch,
    #[serde(default)]
    show_nullswitch: ShowNullSwitch,
    #[serde(default)]
    driver: Option<String>,
}

impl Config {
    /// Gate on file ownership and permissions, then parse the TOML.
    ///
    /// # Errors
    ///
    /// Fails when the file is not owned by the invoking user, is group- or
    /// world-writable, cannot be read, or does not parse.
    pub fn load(path: &Path) -> Result<Config> {
        check_ownership(path)?;
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parse config file {}", path.display()))
    }

    /// Parse config TOML from a string (no ownership gate).
    pub fn parse(text: &str) -> Result<Config> {
        Ok(toml::from_str(text)?)
    }

    /// Resolve names into handles and validate the whole topology.
    ///
    /// Neighbor and hotkey node names resolve by alias first, then by
    /// hostname; `master` names the master. Unknown names, duplicate
    /// aliases, out-of-range hint values, and unsupported tap counts are
    /// all fatal here. Unreachable remotes and remotes with no neighbors
    /// are warned about but tolerated.
    pub fn resolve(self) -> Result<Topology> {
        let mut seen = HashSet::new();
        for r in &self.remotes {
            if r.alias == "master" {
                bail!("remote alias 'master' is reserved");
            }
            if !seen.insert(r.alias.as_str()) {
                bail!("duplicate remote alias '{}'", r.alias);
            }
        }

        let defaults = self.ssh.overlay(&SshSettings::default());

        let lookup = |name: &str| -> Result<Node> {
            if name == "master" {
                return Ok(Node::Master);
            }
            if let Some(id) = self.remotes.iter().position(|r| r.alias == name) {
                return Ok(Node::Remote(id));
            }
            if let Some(id) = self
                .remotes
                .iter()
                .position(|r| r.hostname.as_deref() == Some(name))
            {
                return Ok(Node::Remote(id));
            }
            bail!("unknown node '{name}' (no such alias or hostname)");
        };

        let resolve_slots = |raw: &RawNeighbors, who: &str| -> Result<[Option<Node>; 4]> {
            let mut slots = [None; 4];
            for dir in Direction::ALL {
                if let Some(name) = raw.slot(dir) {
                    slots[dir.index()] = Some(
                        lookup(name)
                            .with_context(|| format!("{who}: {dir} neighbor"))?,
                    );
                }
            }
            Ok(slots)
        };

        let master_neighbors = resolve_slots(&self.master, "master")?;
        let mut remotes = Vec::with_capacity(self.remotes.len());
        for raw in &self.remotes {
            remotes.push(RemoteSpec {
                alias: raw.alias.clone(),
                hostname: raw.hostname.clone().unwrap_or_else(|| raw.alias.clone()),
                params: raw.params.clone(),
                ssh: raw.ssh.overlay(&defaults),
                neighbors: resolve_slots(&raw.neighbors, &raw.alias)?,
            });
        }

        let mut hotkeys = Vec::with_capacity(self.hotkeys.len());
        for (combo, action_text) in &self.hotkeys {
            let action = match ActionSpec::parse(action_text)
                .with_context(|| format!("hotkey '{combo}'"))?
            {
                ActionSpec::Switch(dir) => HotkeyAction::Switch(dir),
                ActionSpec::SwitchTo(name) => HotkeyAction::SwitchTo(
                    lookup(&name).with_context(|| format!("hotkey '{combo}'"))?,
                ),
                ActionSpec::Reconnect => HotkeyAction::Reconnect,
                ActionSpec::Quit => HotkeyAction::Quit,
            };
            hotkeys.push(HotkeyBinding {
                combo: combo.clone(),
                action,
            });
        }

        let hint = {
            let d = FocusHint::default();
            let hint = FocusHint {
                mode: self.focus_hint.mode.unwrap_or(d.mode),
                brightness: self.focus_hint.brightness.unwrap_or(d.brightness),
                duration_us: self.focus_hint.duration_us.unwrap_or(d.duration_us),
                fade_steps: self.focus_hint.fade_steps.unwrap_or(d.fade_steps),
            };
            if !(0.0..=1.0).contains(&hint.brightness) {
                bail!("focus_hint.brightness {} outside [0, 1]", hint.brightness);
            }
            if hint.fade_steps == 0 {
                bail!("focus_hint.fade_steps must be at least 1");
            }
            if hint.duration_us == 0 {
                bail!("focus_hint.duration_us must be positive");
            }
            hint
        };

        let mouse_switch = {
            let d = MouseSwitch::default();
            let ms = MouseSwitch {
                enabled: self.mouse_switch.enabled.unwrap_or(d.enabled),
                taps: self.mouse_switch.taps.unwrap_or(d.taps),
                window_us: self.mouse_switch.window_us.unwrap_or(d.window_us),
            };
            let max_taps = (EDGE_HISTORY_LEN / 2) as u32;
            if ms.taps == 0 {
                bail!("mouse_switch.taps must be at least 1");
            }
            if ms.taps > max_taps {
                bail!(
                    "mouse_switch.taps {} exceeds the supported maximum {max_taps}",
                    ms.taps
                );
            }
            ms
        };

        let topology = Topology {
            master_neighbors,
            remotes,
            hotkeys,
            hint,
            mouse_switch,
            show_nullswitch: self.show_nullswitch,
            driver: self.driver.unwrap_or_else(|| "none".to_owned()),
        };
        topology.warn_on_suspect_graph();
        Ok(topology)
    }
}

impl Topology {
    /// Warn about remotes the pointer can never reach from the master and
    /// about remotes that have no neighbors of their own (one-way traps).
    fn warn_on_suspect_graph(&self) {
        let mut reached: HashSet<RemoteId> = HashSet::new();
        let mut queue: VecDeque<RemoteId> = self
            .master_neighbors
            .iter()
            .flatten()
            .filter_map(|n| match n {
                Node::Remote(id) => Some(*id),
                Node::Master => None,
            })
            .collect();
        while let Some(id) = queue.pop_front() {
            if !reached.insert(id) {
                continue;
            }
            for n in self.remotes[id].neighbors.iter().flatten() {
                if let Node::Remote(next) = n {
                    if !reached.contains(next) {
                        queue.push_back(*next);
                    }
                }
            }
        }
        for (id, spec) in self.remotes.iter().enumerate() {
            if !reached.contains(&id) {
                log::warn!(
                    "remote '{}' is not reachable from the master by any neighbor path",
                    spec.alias
                );
            }
            if spec.neighbors.iter().all(Option::is_none) {
                log::warn!(
                    "remote '{}' has no neighbors; only hotkeys can leave it",
                    spec.alias
                );
            }
        }
    }

    /// Neighbor slots of a node.
    #[must_use]
    pub fn neighbors_of(&self, node: Node) -> &[Option<Node>; 4] {
        match node {
            Node::Master => &self.master_neighbors,
            Node::Remote(id) => &self.remotes[id].neighbors,
        }
    }
}

/// The config file names hosts we will run commands on: require it to be
/// owned by the invoking user and writable only by them.
fn check_ownership(path: &Path) -> Result<()> {
    use std::os::unix::fs::MetadataExt;

    let meta = std::fs::metadata(path)
        .with_context(|| format!("stat config file {}", path.display()))?;
    let uid = unsafe { libc::getuid() };
    if meta.uid() != uid {
        bail!(
            "config file {} is owned by uid {}, not by the invoking user (uid {})",
            path.display(),
            meta.uid(),
            uid
        );
    }
    if meta.mode() & 0o022 != 0 {
        bail!(
            "config file {} is group- or world-writable (mode {:o})",
            path.display(),
            meta.mode() & 0o777
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        show_nullswitch = "hotkey-only"

        [master]
        right = "desk"
        down = "pi.lan"

        [ssh]
        user = "alice"
        keepalive_secs = 10

        [[remote]]
        alias = "desk"
        hostname = "desk.lan"
        left = "master"
        right = "pi"

        [remote.params]
        screen = "HDMI-1"

        [remote.ssh]
        port = 2222
        user = "bob"

        [[remote]]
        alias = "pi"
        hostname = "pi.lan"
        left = "desk"

        [hotkeys]
        "ctrl+alt+Right" = "switch-right"
        "ctrl+alt+m" = "switch-to:master"
        "ctrl+alt+q" = "quit"

        [focus_hint]
        mode = "dim-inactive"
        brightness = 0.3
        duration_us = 300000
        fade_steps = 6

        [mouse_switch]
        taps = 2
        window_us = 400000
    "#;

    #[test]
    fn sample_parses_and_resolves() {
        let topo = Config::parse(SAMPLE).unwrap().resolve().unwrap();
        assert_eq!(topo.remotes.len(), 2);
        assert_eq!(
            topo.master_neighbors[Direction::Right.index()],
            Some(Node::Remote(0))
        );
        // "pi.lan" resolved via hostname.
        assert_eq!(
            topo.master_neighbors[Direction::Down.index()],
            Some(Node::Remote(1))
        );
        let desk = &topo.remotes[0];
        assert_eq!(desk.neighbors[Direction::Left.index()], Some(Node::Master));
        assert_eq!(
            desk.neighbors[Direction::Right.index()],
            Some(Node::Remote(1))
        );
        assert_eq!(desk.params["screen"], "HDMI-1");
        assert_eq!(topo.show_nullswitch, ShowNullSwitch::HotkeyOnly);
        assert_eq!(topo.hint.mode, FocusHintMode::DimInactive);
        assert_eq!(topo.hint.fade_steps, 6);
        assert_eq!(topo.mouse_switch.taps, 2);
    }

    #[test]
    fn per_remote_ssh_overlays_global_defaults() {
        let topo = Config::parse(SAMPLE).unwrap().resolve().unwrap();
        let desk = &topo.remotes[0];
        assert_eq!(desk.ssh.user.as_deref(), Some("bob"));
        assert_eq!(desk.ssh.port, Some(2222));
        assert_eq!(desk.ssh.keepalive_secs, 10);
        assert_eq!(desk.ssh.command, "ssh");
        let pi = &topo.remotes[1];
        assert_eq!(pi.ssh.user.as_deref(), Some("alice"));
        assert_eq!(pi.ssh.port, None);
    }

    #[test]
    fn hotkey_nodes_resolve() {
        let topo = Config::parse(SAMPLE).unwrap().resolve().unwrap();
        let to_master = topo
            .hotkeys
            .iter()
            .find(|b| b.combo == "ctrl+alt+m")
            .unwrap();
        assert_eq!(to_master.action, HotkeyAction::SwitchTo(Node::Master));
    }

    #[test]
    fn unknown_neighbor_name_is_fatal() {
        let text = r#"
            [master]
            left = "ghost"
        "#;
        assert!(Config::parse(text).unwrap().resolve().is_err());
    }

    #[test]
    fn duplicate_alias_is_fatal() {
        let text = r#"
            [[remote]]
            alias = "a"
            [[remote]]
            alias = "a"
        "#;
        assert!(Config::parse(text).unwrap().resolve().is_err());
    }

    #[test]
    fn reserved_master_alias_is_fatal() {
        let text = r#"
            [[remote]]
            alias = "master"
        "#;
        assert!(Config::parse(text).unwrap().resolve().is_err());
    }

    #[test]
    fn hostname_defaults_to_alias() {
        let text = r#"
            [[remote]]
            alias = "desk"
        "#;
        let topo = Config::parse(text).unwrap().resolve().unwrap();
        assert_eq!(topo.remotes[0].hostname, "desk");
    }

    #[test]
    fn excessive_taps_are_rejected() {
        let text = r#"
            [mouse_switch]
            taps = 9
        "#;
        assert!(Config::parse(text).unwrap().resolve().is_err());
    }

    #[test]
    fn out_of_range_brightness_is_rejected() {
        let text = r#"
            [focus_hint]
            brightness = 1.5
        "#;
        assert!(Config::parse(text).unwrap().resolve().is_err());
    }

    #[test]
    fn ownership_gate_rejects_loose_permissions() {
        use std::fs;
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edgehop.toml");
        let mut f = fs::File::create(&path).unwrap();
        writeln!(f, "[master]").unwrap();
        drop(f);

        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();
        assert!(check_ownership(&path).is_ok());
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        assert!(check_ownership(&path).is_ok());
        fs::set_permissions(&path, fs::Permissions::from_mode(0o664)).unwrap();
        assert!(check_ownership(&path).is_err());
        fs::set_permissions(&path, fs::Permissions::from_mode(0o646)).unwrap();
        assert!(check_ownership(&path).is_err());
    }
}
