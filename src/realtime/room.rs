use std::fmt;

use crate::db::{ChannelId, UserId};

use super::ConnectionId;

/// A fanout address. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    Channel(ChannelId),
    User(UserId),
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Room::Channel(id) => write!(f, "channel:{id}"),
            Room::User(id) => write!(f, "user:{id}"),
        }
    }
}

/// Who an event is delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Room(Room),
    /// A single connection, for replies to that connection's own requests.
    Connection(ConnectionId),
    All,
}

impl Scope {
    pub fn channel(id: ChannelId) -> Self {
        Scope::Room(Room::Channel(id))
    }

    pub fn user(id: UserId) -> Self {
        Scope::Room(Room::User(id))
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Scope::Room(room) => room.fmt(f),
            Scope::Connection(id) => write!(f, "connection:{id}"),
            Scope::All => f.write_str("all"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_tags() {
        assert_eq!(Room::Channel(7).to_string(), "channel:7");
        assert_eq!(Room::User(3).to_string(), "user:3");
    }

    #[test]
    fn scope_labels() {
        assert_eq!(Scope::channel(1).to_string(), "channel:1");
        assert_eq!(Scope::All.to_string(), "all");
    }
}
