//! Group registry.
//!
//! Owns named rooms and the group id pool. A *room* is discoverable, keeps
//! a member count, and is destroyed when the count reaches zero. An
//! anonymous *link* only allocates an id here; its membership lives in the
//! two participants' joined sets, so `leave` on an id with no room entry is
//! the signal that the id named a link, not an error.

use crate::pool::IdPool;
use huddle_protocol::{GroupId, RoomEntry};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupError {
    /// No free group id.
    #[error("group id pool exhausted")]
    PoolExhausted,

    /// The id names no live room.
    #[error("unknown group: {0}")]
    UnknownGroup(GroupId),
}

/// What `leave` found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// A room with members remaining after the decrement.
    Remaining(usize),
    /// The room's count reached zero; it was destroyed and its id released.
    Destroyed,
    /// The id named no room - an anonymous link.
    Link,
}

#[derive(Debug)]
struct Room {
    name: String,
    members: usize,
}

/// Owns room metadata and the group id pool.
#[derive(Debug)]
pub struct GroupRegistry {
    rooms: BTreeMap<GroupId, Room>,
    ids: IdPool,
}

impl GroupRegistry {
    /// Create a registry with the given id pool capacity.
    #[must_use]
    pub fn new(max_groups: u32) -> Self {
        Self {
            rooms: BTreeMap::new(),
            ids: IdPool::new(max_groups),
        }
    }

    /// Create a named room with the requester as its first member.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::PoolExhausted`] if no group id is free.
    pub fn create_room(&mut self, name: &str) -> Result<GroupId, GroupError> {
        let id = self.ids.allocate().ok_or(GroupError::PoolExhausted)?;
        self.rooms.insert(
            id,
            Room {
                name: name.to_owned(),
                members: 1,
            },
        );
        debug!(group = %id, name = %name, "Created room");
        Ok(id)
    }

    /// Allocate an id for an anonymous link. No room entry is created;
    /// link accounting lives in the participants' joined sets.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::PoolExhausted`] if no group id is free.
    pub fn create_link(&mut self) -> Result<GroupId, GroupError> {
        let id = self.ids.allocate().ok_or(GroupError::PoolExhausted)?;
        debug!(group = %id, "Created link");
        Ok(id)
    }

    /// Add one member to a room, returning its name for the `PUSH` line.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::UnknownGroup`] if the id names no room.
    pub fn join(&mut self, id: GroupId) -> Result<String, GroupError> {
        let room = self.rooms.get_mut(&id).ok_or(GroupError::UnknownGroup(id))?;
        room.members += 1;
        debug!(group = %id, members = room.members, "Member joined room");
        Ok(room.name.clone())
    }

    /// Remove one member from a room, destroying it at zero. An id with no
    /// room entry is reported as [`LeaveOutcome::Link`].
    pub fn leave(&mut self, id: GroupId) -> LeaveOutcome {
        let Some(room) = self.rooms.get_mut(&id) else {
            return LeaveOutcome::Link;
        };
        room.members = room.members.saturating_sub(1);
        let remaining = room.members;
        if remaining == 0 {
            self.rooms.remove(&id);
            self.ids.release(id);
            debug!(group = %id, "Destroyed empty room");
            return LeaveOutcome::Destroyed;
        }
        LeaveOutcome::Remaining(remaining)
    }

    /// Reclaim a link id once no live connection holds it. A no-op for
    /// room ids and for ids already free.
    pub fn release_link(&mut self, id: GroupId) {
        if !self.rooms.contains_key(&id) && self.ids.release(id) {
            debug!(group = %id, "Released link id");
        }
    }

    /// Whether the id names a live room.
    #[must_use]
    pub fn is_room(&self, id: GroupId) -> bool {
        self.rooms.contains_key(&id)
    }

    /// Number of live rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Point-in-time room listing, ascending by group id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<RoomEntry> {
        self.rooms
            .iter()
            .map(|(id, room)| RoomEntry {
                name: room.name.clone(),
                members: room.members,
                id: *id,
            })
            .collect()
    }
}
