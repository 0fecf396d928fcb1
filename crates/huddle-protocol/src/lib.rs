//! # huddle-protocol
//!
//! Wire protocol definitions for the Huddle group relay.
//!
//! The protocol is line-oriented text, one command per frame. This crate
//! defines both directions of the wire:
//!
//! - [`Command`] - the six inbound client commands and their parser
//! - [`ServerMessage`] - outbound lines the relay sends back
//!
//! ## Example
//!
//! ```rust
//! use huddle_protocol::{parse, Command};
//!
//! let cmd = parse("JOIN 3").unwrap();
//! assert_eq!(cmd, Command::Join { group: 3 });
//! ```

pub mod command;
pub mod outbound;

pub use command::{parse, Command, ParseError};
pub use outbound::{RoomEntry, RosterPayload, ServerMessage, UserEntry};

/// A user identifier issued by the relay.
pub type UserId = u32;

/// A group identifier issued by the relay.
pub type GroupId = u32;
