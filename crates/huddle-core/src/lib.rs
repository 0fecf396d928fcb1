//! # huddle-core
//!
//! The in-memory relay behind Huddle: many concurrently connected clients
//! exchanging text through ephemeral groups - persistent named rooms,
//! ad-hoc pairwise links, and a live presence roster broadcast to everyone
//! on every membership change.
//!
//! This crate owns all shared state and performs no network I/O. The
//! delivery seam is a per-connection `tokio::sync::mpsc` queue of outbound
//! lines; transport glue (see `huddle-server`) drains it into a socket.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐     ┌───────────┐     ┌──────────────────┐
//! │ Transport │────▶│   Relay   │────▶│ GroupRegistry    │
//! └───────────┘     └───────────┘     │ ConnectionRegistry│
//!                         │           │ IdPool (users)    │
//!                         ▼           └──────────────────┘
//!                  outbound queues
//! ```
//!
//! All registries live behind one mutex: JOIN/LINK/EXIT/NEWG and teardown
//! read-then-write across more than one of them, so they are serialized as
//! a unit. Outbound delivery happens after the lock is released.

pub mod connections;
pub mod groups;
pub mod pool;
pub mod relay;

pub use connections::{ConnId, ConnectionRegistry};
pub use groups::{GroupError, GroupRegistry, LeaveOutcome};
pub use pool::IdPool;
pub use relay::{Relay, RelayConfig, RelayStats};
