//! Hotkey action grammar.
//!
//! The configuration binds key-combination strings (whose syntax belongs to
//! the platform driver) to action strings parsed here:
//!
//! - `switch-left` / `switch-right` / `switch-up` / `switch-down`
//! - `switch-to:<node>` where `<node>` is `master` or a remote alias/hostname
//! - `reconnect`
//! - `quit`
//!
//! Parsing happens in two stages. [`ActionSpec`] is the textual form straight
//! from the config file; [`Config::resolve`](crate::config::Config::resolve)
//! turns the node name of `switch-to` into a concrete [`Node`], producing the
//! [`HotkeyAction`] the dispatcher fires with. Unknown actions and unknown
//! node names are startup errors.

// Rust guideline compliant 2026-03

use anyhow::{bail, Result};

use crate::edge::Direction;
use crate::remote::Node;

/// An action string as written in the config file, node names unresolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionSpec {
    /// Focus the current node's neighbor in a direction.
    Switch(Direction),
    /// Focus a named node.
    SwitchTo(String),
    /// Clear permanent failures and retry every remote now.
    Reconnect,
    /// Clean shutdown.
    Quit,
}

impl ActionSpec {
    /// Parse a config action string.
    ///
    /// # Errors
    ///
    /// Fails on anything outside the grammar above; hotkey configuration
    /// errors are fatal at startup.
    pub fn parse(text: &str) -> Result<ActionSpec> {
        if let Some(dir) = text.strip_prefix("switch-") {
            if let Some(dir) = Direction::from_name(dir) {
                return Ok(ActionSpec::Switch(dir));
            }
        }
        if let Some(node) = text.strip_prefix("switch-to:") {
            if node.is_empty() {
                bail!("switch-to needs a node name");
            }
            return Ok(ActionSpec::SwitchTo(node.to_owned()));
        }
        match text {
            "reconnect" => Ok(ActionSpec::Reconnect),
            "quit" => Ok(ActionSpec::Quit),
            other => bail!("unknown hotkey action '{other}'"),
        }
    }
}

/// A resolved hotkey action, ready to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyAction {
    /// Focus the current node's neighbor in a direction.
    Switch(Direction),
    /// Focus a specific node.
    SwitchTo(Node),
    /// Clear permanent failures and retry every remote now.
    Reconnect,
    /// Clean shutdown.
    Quit,
}

/// A resolved binding: driver combination string plus the action it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotkeyBinding {
    /// Key combination in the platform driver's syntax.
    pub combo: String,
    /// Action to dispatch when the combination fires.
    pub action: HotkeyAction,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_directional_switches() {
        assert_eq!(
            ActionSpec::parse("switch-left").unwrap(),
            ActionSpec::Switch(Direction::Left)
        );
        assert_eq!(
            ActionSpec::parse("switch-down").unwrap(),
            ActionSpec::Switch(Direction::Down)
        );
    }

    #[test]
    fn parses_switch_to_with_node_name() {
        assert_eq!(
            ActionSpec::parse("switch-to:master").unwrap(),
            ActionSpec::SwitchTo("master".into())
        );
        assert_eq!(
            ActionSpec::parse("switch-to:deskpc").unwrap(),
            ActionSpec::SwitchTo("deskpc".into())
        );
    }

    #[test]
    fn parses_reconnect_and_quit() {
        assert_eq!(ActionSpec::parse("reconnect").unwrap(), ActionSpec::Reconnect);
        assert_eq!(ActionSpec::parse("quit").unwrap(), ActionSpec::Quit);
    }

    #[test]
    fn rejects_unknown_actions() {
        assert!(ActionSpec::parse("switch-diagonal").is_err());
        assert!(ActionSpec::parse("switch-to:").is_err());
        assert!(ActionSpec::parse("").is_err());
    }
}
