//! edgehop - one keyboard and mouse driving many machines over SSH.
//!
//! The master captures local input and, while focus is directed at a remote
//! node, tunnels it as framed messages over an SSH subprocess to a peer
//! `edgehop` running in subordinate mode, which replays the events on its
//! own display. Focus moves by hotkey or by tapping a screen edge.

// Library modules
pub mod clock;
pub mod codec;
pub mod config;
pub mod edge;
pub mod hotkey;
pub mod hub;
pub mod link;
pub mod platform;
pub mod protocol;
pub mod remote;
pub mod serve;

// Re-export commonly used types
pub use clock::{Clock, Timeline};
pub use config::{Config, Topology};
pub use edge::{Direction, EdgeEvent, EdgeHistory};
pub use hotkey::{HotkeyAction, HotkeyBinding};
pub use hub::Hub;
pub use link::{Link, LinkEvent, LinkFeed};
pub use platform::{Platform, PlatformEvent};
pub use protocol::{Message, SetupPayload, PROTOCOL_VERSION};
pub use remote::{ConnState, Node, Remote, RemoteId};
