//! The relay engine.
//!
//! Interprets client commands against the registries, mutates state, and
//! fans outbound lines to the per-connection queues. All shared state -
//! the user id pool, the group registry, and the connection registry -
//! lives behind a single mutex, because every command reads-then-writes
//! across more than one of them ("group exists AND not already joined"
//! must be checked-and-updated without interleaving).
//!
//! Locking discipline: each operation acquires the lock once, mutates,
//! snapshots its recipients into a delivery batch, and releases the lock
//! before pushing a single line. The queues never block, but a push to a
//! connection whose transport task is gone fails; that failure is an
//! implicit disconnect of that connection and never aborts delivery to
//! the remaining recipients.

use crate::connections::{ConnId, ConnectionRegistry};
use crate::groups::GroupRegistry;
use crate::pool::IdPool;
use huddle_protocol::{parse, Command, GroupId, ServerMessage, UserId};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// User id pool capacity.
    pub max_users: u32,
    /// Group id pool capacity.
    pub max_groups: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_users: 1000,
            max_groups: 100,
        }
    }
}

/// Relay statistics.
#[derive(Debug, Clone)]
pub struct RelayStats {
    /// Live connections, identified or not.
    pub connections: usize,
    /// Live named rooms.
    pub rooms: usize,
    /// Connections that have completed `USER`.
    pub identified: usize,
}

/// One outbound line bound for one connection's queue.
struct Delivery {
    conn: ConnId,
    sender: mpsc::UnboundedSender<String>,
    line: String,
}

/// All mutable relay state, guarded as one unit.
struct RelayInner {
    user_ids: IdPool,
    groups: GroupRegistry,
    conns: ConnectionRegistry,
}

/// The relay. Cheap to share behind an `Arc`; every method takes `&self`.
pub struct Relay {
    inner: Mutex<RelayInner>,
}

impl Relay {
    /// Create a relay with the given pool capacities.
    #[must_use]
    pub fn new(config: RelayConfig) -> Self {
        info!(
            max_users = config.max_users,
            max_groups = config.max_groups,
            "Creating relay"
        );
        Self {
            inner: Mutex::new(RelayInner {
                user_ids: IdPool::new(config.max_users),
                groups: GroupRegistry::new(config.max_groups),
                conns: ConnectionRegistry::new(),
            }),
        }
    }

    /// Register a new connection. The relay pushes outbound lines into
    /// `outbound`; the transport drains them into the socket.
    pub fn connect(&self, outbound: mpsc::UnboundedSender<String>) -> ConnId {
        self.inner.lock().conns.register(outbound)
    }

    /// Tear a connection down: release its user id, leave every joined
    /// group with a departure notice, and broadcast a fresh roster.
    /// Idempotent - the explicit close and a send-failure teardown may race.
    pub fn disconnect(&self, conn: ConnId) {
        let batch = self.inner.lock().teardown(conn);
        self.deliver(batch);
    }

    /// Handle one raw line from a connection. Malformed lines are dropped
    /// silently; this is the wire contract, not an error.
    pub fn handle_line(&self, conn: ConnId, line: &str) {
        match parse(line) {
            Ok(cmd) => self.dispatch(conn, cmd),
            Err(e) => trace!(connection = %conn, error = %e, "Dropped unparseable line"),
        }
    }

    /// Execute one decoded command.
    pub fn dispatch(&self, conn: ConnId, cmd: Command) {
        let batch = {
            let mut inner = self.inner.lock();
            match cmd {
                Command::User { nickname } => inner.identify(conn, nickname),
                Command::NewGroup { name } => inner.new_group(conn, name),
                Command::Join { group } => inner.join(conn, group),
                Command::Link { peer, label } => inner.link(conn, peer, label),
                Command::Exit { group } => inner.exit(conn, group),
                Command::Text { group, body } => inner.text(group, body),
            }
        };
        self.deliver(batch);
    }

    /// Current counts, for diagnostics.
    #[must_use]
    pub fn stats(&self) -> RelayStats {
        let inner = self.inner.lock();
        RelayStats {
            connections: inner.conns.len(),
            rooms: inner.groups.room_count(),
            identified: inner
                .conns
                .iter()
                .filter(|(_, c)| c.user_id.is_some())
                .count(),
        }
    }

    /// Push a batch to the queues, outside the lock. A failed push means
    /// the recipient's transport is gone; it is torn down after the loop
    /// so one dead connection cannot starve the rest of a broadcast.
    fn deliver(&self, batch: Vec<Delivery>) {
        let mut failed: Vec<ConnId> = Vec::new();
        for d in batch {
            if d.sender.send(d.line).is_err() && !failed.contains(&d.conn) {
                warn!(connection = %d.conn, "Outbound queue closed, treating as disconnect");
                failed.push(d.conn);
            }
        }
        for conn in failed {
            self.disconnect(conn);
        }
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new(RelayConfig::default())
    }
}

impl RelayInner {
    /// `USER <nickname>`: allocate a user id and identify the connection.
    /// On pool exhaustion the requester gets `UFULL` and stays
    /// unidentified; nothing else changes.
    fn identify(&mut self, conn: ConnId, nickname: String) -> Vec<Delivery> {
        match self.conns.get(conn) {
            None => return Vec::new(),
            Some(c) if c.user_id.is_some() => {
                // Nickname is immutable once set; repeat USERs are dropped.
                trace!(connection = %conn, "Ignoring repeated USER");
                return Vec::new();
            }
            Some(_) => {}
        }

        let Some(id) = self.user_ids.allocate() else {
            debug!(connection = %conn, "User id pool exhausted");
            return self.to(conn, &ServerMessage::UserPoolFull);
        };

        if let Some(c) = self.conns.get_mut(conn) {
            c.user_id = Some(id);
            c.nickname = Some(nickname);
            info!(connection = %conn, user = %id, "Connection identified");
        }
        self.roster()
    }

    /// `NEWG <name>`: create a named room with the requester as first
    /// member. On exhaustion the requester gets `GFULL` and nothing is
    /// created.
    fn new_group(&mut self, conn: ConnId, name: String) -> Vec<Delivery> {
        if self.conns.get(conn).is_none() {
            return Vec::new();
        }

        let Ok(group) = self.groups.create_room(&name) else {
            debug!(connection = %conn, "Group id pool exhausted");
            return self.to(conn, &ServerMessage::GroupPoolFull);
        };
        if let Some(c) = self.conns.get_mut(conn) {
            c.joined.insert(group);
        }

        let mut batch = self.to(conn, &ServerMessage::Push { group, label: name });
        batch.extend(self.roster());
        batch
    }

    /// `JOIN <groupId>`: join an existing room the requester is not in.
    /// A failed precondition is a no-op, but the roster is broadcast
    /// either way.
    fn join(&mut self, conn: ConnId, group: GroupId) -> Vec<Delivery> {
        let already = match self.conns.get(conn) {
            None => return Vec::new(),
            Some(c) => c.joined.contains(&group),
        };

        let mut batch = Vec::new();
        if !already {
            if let Ok(name) = self.groups.join(group) {
                let nick = self
                    .conns
                    .get(conn)
                    .map(|c| c.display_name().to_owned())
                    .unwrap_or_default();
                if let Some(c) = self.conns.get_mut(conn) {
                    c.joined.insert(group);
                }
                batch.extend(self.to(conn, &ServerMessage::Push { group, label: name }));
                batch.extend(self.broadcast(&ServerMessage::Text {
                    group,
                    body: format!("<messagesys>{nick}_joined_the_conversation</messagesys>"),
                }));
            } else {
                trace!(connection = %conn, group = %group, "JOIN for unknown group ignored");
            }
        } else {
            trace!(connection = %conn, group = %group, "JOIN while already a member ignored");
        }

        batch.extend(self.roster());
        batch
    }

    /// `LINK <peerId> <label>`: open an anonymous two-party link. A no-op
    /// if the peer is the requester or not online. Both ends get a `PUSH`
    /// whose label carries the client-side link markup.
    fn link(&mut self, conn: ConnId, peer: UserId, label: String) -> Vec<Delivery> {
        let (my_uid, my_nick) = match self.conns.get(conn) {
            None => return Vec::new(),
            Some(c) => (c.user_id, c.display_name().to_owned()),
        };
        if my_uid == Some(peer) {
            trace!(connection = %conn, "LINK to self ignored");
            return Vec::new();
        }
        let Some(peer_conn) = self.conns.find_user(peer) else {
            trace!(connection = %conn, peer = %peer, "LINK to unknown peer ignored");
            return Vec::new();
        };

        let Ok(group) = self.groups.create_link() else {
            debug!(connection = %conn, "Group id pool exhausted");
            return self.to(conn, &ServerMessage::GroupPoolFull);
        };
        if let Some(c) = self.conns.get_mut(conn) {
            c.joined.insert(group);
        }
        if let Some(p) = self.conns.get_mut(peer_conn) {
            p.joined.insert(group);
        }

        let my_wire = my_uid.map_or(-1, i64::from);
        let mut batch = self.to(
            peer_conn,
            &ServerMessage::Push {
                group,
                label: format!("<linkwith_id=\"lw{my_wire}\"></linkwith>chatting_with_{my_nick}"),
            },
        );
        batch.extend(self.to(
            conn,
            &ServerMessage::Push {
                group,
                label: format!("<linkwith_id=\"lw{peer}\"></linkwith>chatting_with_{label}"),
            },
        ));
        batch.extend(self.roster());
        batch
    }

    /// `EXIT <groupId>`: leave a room or link. The roster goes out first,
    /// then the departure notice tagged with the group id.
    fn exit(&mut self, conn: ConnId, group: GroupId) -> Vec<Delivery> {
        let (was_member, nick) = match self.conns.get_mut(conn) {
            None => return Vec::new(),
            Some(c) => (c.joined.remove(&group), c.display_name().to_owned()),
        };

        let marker = self.leave_group(group, was_member);

        let mut batch = self.roster();
        batch.extend(self.broadcast(&departure(group, &marker, &nick)));
        batch
    }

    /// `TEXT <groupId> <body>`: stateless relay, broadcast verbatim to
    /// every live connection. Recipients filter by group id locally; the
    /// registry tracks member counts, not member identity.
    fn text(&self, group: GroupId, body: String) -> Vec<Delivery> {
        self.broadcast(&ServerMessage::Text { group, body })
    }

    /// Connection teardown: the close-time equivalent of an `EXIT` for
    /// every joined group, then one roster broadcast.
    fn teardown(&mut self, conn: ConnId) -> Vec<Delivery> {
        let Some(closed) = self.conns.unregister(conn) else {
            return Vec::new();
        };
        if let Some(uid) = closed.user_id {
            self.user_ids.release(uid);
        }
        let nick = closed.nickname.unwrap_or_default();

        let mut batch = Vec::new();
        for group in closed.joined {
            let marker = self.leave_group(group, true);
            batch.extend(self.broadcast(&departure(group, &marker, &nick)));
        }
        batch.extend(self.roster());
        info!(connection = %conn, "Connection closed");
        batch
    }

    /// Shared room-leave-or-link-marker step for EXIT and teardown.
    /// Returns the `<leave .../>` marker when the id named no room. Room
    /// counts only move for actual members; a link id is reclaimed once
    /// the last holder is gone.
    fn leave_group(&mut self, group: GroupId, was_member: bool) -> String {
        if self.groups.is_room(group) {
            if was_member {
                self.groups.leave(group);
            }
            String::new()
        } else {
            if was_member && !self.conns.any_member_of(group) {
                self.groups.release_link(group);
            }
            format!("<leave_id=\"llv{group}\"></leave>")
        }
    }

    /// One line for one connection.
    fn to(&self, conn: ConnId, msg: &ServerMessage) -> Vec<Delivery> {
        self.conns
            .get(conn)
            .map(|c| Delivery {
                conn,
                sender: c.outbound.clone(),
                line: msg.to_line(),
            })
            .into_iter()
            .collect()
    }

    /// The same line for every live connection.
    fn broadcast(&self, msg: &ServerMessage) -> Vec<Delivery> {
        let line = msg.to_line();
        self.conns
            .iter()
            .map(|(conn, c)| Delivery {
                conn,
                sender: c.outbound.clone(),
                line: line.clone(),
            })
            .collect()
    }

    /// The presence snapshot for every live connection. The room and user
    /// lists are shared; `yourID` varies per recipient.
    fn roster(&self) -> Vec<Delivery> {
        let rooms = Arc::new(self.groups.snapshot());
        let users = Arc::new(self.conns.users());
        self.conns
            .iter()
            .map(|(conn, c)| Delivery {
                conn,
                sender: c.outbound.clone(),
                line: ServerMessage::List {
                    your_id: c.wire_id(),
                    rooms: Arc::clone(&rooms),
                    users: Arc::clone(&users),
                }
                .to_line(),
            })
            .collect()
    }
}

/// Departure system notice, optionally prefixed with the link-leave marker.
fn departure(group: GroupId, marker: &str, nick: &str) -> ServerMessage {
    ServerMessage::Text {
        group,
        body: format!("{marker}<messagesys>{nick}_left_the_conversation</messagesys>"),
    }
}
