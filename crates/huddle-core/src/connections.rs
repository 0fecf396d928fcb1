//! Connection registry.
//!
//! The set of live connections and each connection's per-user state. A
//! connection exists from transport accept until close; its user id is
//! unassigned (`None`) until the first valid `USER` command. The registry
//! key is a monotonic [`ConnId`], independent of the user id, so a
//! connection is addressable before it identifies.

use huddle_protocol::{GroupId, UserEntry, UserId};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::mpsc;
use tracing::debug;

/// Registry-assigned key for a live connection.
pub type ConnId = u64;

/// Per-connection state.
#[derive(Debug)]
pub struct Connection {
    /// User id, `None` until the first valid `USER` command.
    pub user_id: Option<UserId>,
    /// Nickname, set once at identification, immutable thereafter.
    pub nickname: Option<String>,
    /// Groups this connection currently belongs to.
    pub joined: BTreeSet<GroupId>,
    /// Outbound line queue; the transport drains it into the socket.
    pub outbound: mpsc::UnboundedSender<String>,
}

impl Connection {
    /// Nickname for display in system notices; empty before `USER`.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.nickname.as_deref().unwrap_or("")
    }

    /// The id the `LIST` payload reports for this recipient.
    #[must_use]
    pub fn wire_id(&self) -> i64 {
        self.user_id.map_or(-1, i64::from)
    }
}

/// The set of all live connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    next: ConnId,
    conns: BTreeMap<ConnId, Connection>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection, returning its registry key.
    pub fn register(&mut self, outbound: mpsc::UnboundedSender<String>) -> ConnId {
        let id = self.next;
        self.next += 1;
        self.conns.insert(
            id,
            Connection {
                user_id: None,
                nickname: None,
                joined: BTreeSet::new(),
                outbound,
            },
        );
        debug!(connection = %id, "Registered connection");
        id
    }

    /// Remove a connection, returning its final state. `None` if it was
    /// already gone (teardown paths may race).
    pub fn unregister(&mut self, id: ConnId) -> Option<Connection> {
        let conn = self.conns.remove(&id);
        if conn.is_some() {
            debug!(connection = %id, "Unregistered connection");
        }
        conn
    }

    pub fn get(&self, id: ConnId) -> Option<&Connection> {
        self.conns.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnId) -> Option<&mut Connection> {
        self.conns.get_mut(&id)
    }

    /// Find the connection holding the given user id.
    #[must_use]
    pub fn find_user(&self, user_id: UserId) -> Option<ConnId> {
        self.conns
            .iter()
            .find(|(_, c)| c.user_id == Some(user_id))
            .map(|(id, _)| *id)
    }

    /// Whether any live connection has the given group in its joined set.
    #[must_use]
    pub fn any_member_of(&self, group: GroupId) -> bool {
        self.conns.values().any(|c| c.joined.contains(&group))
    }

    /// Number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.conns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    /// Iterate over all live connections.
    pub fn iter(&self) -> impl Iterator<Item = (ConnId, &Connection)> {
        self.conns.iter().map(|(id, c)| (*id, c))
    }

    /// Point-in-time listing of identified users, ascending by user id.
    #[must_use]
    pub fn users(&self) -> Vec<UserEntry> {
        let mut entries: Vec<UserEntry> = self
            .conns
            .values()
            .filter_map(|c| {
                c.user_id.map(|id| UserEntry {
                    id,
                    nickname: c.nickname.clone().unwrap_or_default(),
                })
            })
            .collect();
        entries.sort_by_key(|e| e.id);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> mpsc::UnboundedSender<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        std::mem::forget(rx);
        tx
    }

    #[test]
    fn test_register_unregister() {
        let mut reg = ConnectionRegistry::new();
        let a = reg.register(sender());
        let b = reg.register(sender());
        assert_ne!(a, b);
        assert_eq!(reg.len(), 2);

        assert!(reg.unregister(a).is_some());
        assert!(reg.unregister(a).is_none());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_find_user() {
        let mut reg = ConnectionRegistry::new();
        let a = reg.register(sender());
        reg.get_mut(a).unwrap().user_id = Some(7);

        assert_eq!(reg.find_user(7), Some(a));
        assert_eq!(reg.find_user(8), None);
    }

    #[test]
    fn test_users_skips_unidentified() {
        let mut reg = ConnectionRegistry::new();
        let a = reg.register(sender());
        let _b = reg.register(sender());
        {
            let conn = reg.get_mut(a).unwrap();
            conn.user_id = Some(0);
            conn.nickname = Some("alice".into());
        }

        let users = reg.users();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id, 0);
        assert_eq!(users[0].nickname, "alice");
    }

    #[test]
    fn test_users_sorted_by_id() {
        let mut reg = ConnectionRegistry::new();
        let a = reg.register(sender());
        let b = reg.register(sender());
        reg.get_mut(a).unwrap().user_id = Some(5);
        reg.get_mut(b).unwrap().user_id = Some(1);

        let ids: Vec<_> = reg.users().iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![1, 5]);
    }

    #[test]
    fn test_any_member_of() {
        let mut reg = ConnectionRegistry::new();
        let a = reg.register(sender());
        assert!(!reg.any_member_of(3));
        reg.get_mut(a).unwrap().joined.insert(3);
        assert!(reg.any_member_of(3));
    }
}
