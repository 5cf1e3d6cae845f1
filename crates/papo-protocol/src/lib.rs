//! # papo-protocol
//!
//! Wire protocol definitions for the papo group chat server.
//!
//! The protocol is JSON text frames over a bidirectional message transport.
//! Each frame is one tagged object: inbound frames are [`ClientCommand`]s,
//! outbound frames are [`ServerEvent`]s.
//!
//! ## Commands and events
//!
//! - `join` / `switchGroup` - Group membership
//! - `message` / `typing` - Chat activity
//! - `groupList` / `history` / `userList` - Snapshots sent by the server
//! - `userJoined` / `userLeft` - Presence updates
//! - `messagesCleared` - History eviction notice
//!
//! ## Example
//!
//! ```rust
//! use papo_protocol::{codec, ClientCommand, MAX_FRAME_SIZE};
//!
//! let raw = r#"{"type":"message","text":"oi"}"#;
//! let cmd = codec::decode_command(raw, MAX_FRAME_SIZE).unwrap();
//! assert_eq!(cmd, ClientCommand::Message { text: "oi".into() });
//! ```

pub mod codec;
pub mod command;
pub mod event;
pub mod wire;

pub use codec::{decode_command, encode_event, ProtocolError, MAX_FRAME_SIZE};
pub use command::ClientCommand;
pub use event::ServerEvent;
pub use wire::{now_millis, ChatMessage, GroupSummary, UserInfo};
