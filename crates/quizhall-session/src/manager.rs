//! The session manager: connection → {identity, current room}.
//!
//! `SessionManager` is a plain `HashMap`, not a concurrent map. The server
//! wraps it in a mutex and holds that lock only for the table operation
//! itself, never across a room call.

use std::collections::HashMap;

use quizhall_protocol::{ConnectionId, RoomCode};

use crate::{Identity, Session, SessionError};

/// Tracks every live connection.
///
/// ```text
/// handshake ──→ create() ──→ set_room() / clear_room() ──→ remove()
/// ```
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: HashMap<ConnectionId, Session>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session for a connection that just completed its
    /// handshake.
    ///
    /// # Errors
    /// Returns [`SessionError::AlreadyConnected`] if the connection already
    /// has a session.
    pub fn create(
        &mut self,
        connection_id: ConnectionId,
        identity: Identity,
    ) -> Result<&Session, SessionError> {
        use std::collections::hash_map::Entry;

        match self.sessions.entry(connection_id) {
            Entry::Occupied(_) => Err(SessionError::AlreadyConnected(connection_id)),
            Entry::Vacant(slot) => {
                tracing::info!(
                    %connection_id,
                    display_name = %identity.display_name,
                    "session created"
                );
                Ok(slot.insert(Session::new(connection_id, identity)))
            }
        }
    }

    /// Drops the session, returning it so the caller can leave its room.
    pub fn remove(&mut self, connection_id: ConnectionId) -> Option<Session> {
        let removed = self.sessions.remove(&connection_id);
        if removed.is_some() {
            tracing::info!(%connection_id, "session removed");
        }
        removed
    }

    /// Records that the connection joined `room`.
    ///
    /// Returns the room it was in before, if any.
    ///
    /// # Errors
    /// Returns [`SessionError::NotFound`] for an unknown connection.
    pub fn set_room(
        &mut self,
        connection_id: ConnectionId,
        room: RoomCode,
    ) -> Result<Option<RoomCode>, SessionError> {
        let session = self
            .sessions
            .get_mut(&connection_id)
            .ok_or(SessionError::NotFound(connection_id))?;
        Ok(session.room.replace(room))
    }

    /// Forgets the connection's room. Unknown connections are a no-op.
    pub fn clear_room(&mut self, connection_id: ConnectionId) -> Option<RoomCode> {
        self.sessions
            .get_mut(&connection_id)
            .and_then(|s| s.room.take())
    }

    pub fn room_of(&self, connection_id: ConnectionId) -> Option<&RoomCode> {
        self.sessions
            .get(&connection_id)
            .and_then(|s| s.room.as_ref())
    }

    pub fn get(&self, connection_id: ConnectionId) -> Option<&Session> {
        self.sessions.get(&connection_id)
    }

    /// Connections currently recorded as being in `room`.
    pub fn members_of(&self, room: &RoomCode) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self
            .sessions
            .values()
            .filter(|s| s.room.as_ref() == Some(room))
            .map(|s| s.connection_id)
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(n: u64) -> ConnectionId {
        ConnectionId::new(n)
    }

    fn code(s: &str) -> RoomCode {
        RoomCode::parse(s).unwrap()
    }

    fn guest(name: &str) -> Identity {
        Identity {
            display_name: name.into(),
            user_id: None,
        }
    }

    #[test]
    fn test_create_registers_session_without_room() {
        let mut mgr = SessionManager::new();
        let session = mgr.create(cid(1), guest("a")).unwrap();
        assert_eq!(session.connection_id, cid(1));
        assert!(session.room.is_none());
        assert_eq!(mgr.len(), 1);
    }

    #[test]
    fn test_create_twice_is_rejected() {
        let mut mgr = SessionManager::new();
        mgr.create(cid(1), guest("a")).unwrap();
        let result = mgr.create(cid(1), guest("b"));
        assert!(matches!(result, Err(SessionError::AlreadyConnected(id)) if id == cid(1)));
        assert_eq!(mgr.get(cid(1)).unwrap().identity.display_name, "a");
    }

    #[test]
    fn test_set_room_returns_previous() {
        let mut mgr = SessionManager::new();
        mgr.create(cid(1), guest("a")).unwrap();
        assert_eq!(mgr.set_room(cid(1), code("AAAAAA")).unwrap(), None);
        assert_eq!(
            mgr.set_room(cid(1), code("BBBBBB")).unwrap(),
            Some(code("AAAAAA"))
        );
        assert_eq!(mgr.room_of(cid(1)), Some(&code("BBBBBB")));
    }

    #[test]
    fn test_set_room_unknown_connection() {
        let mut mgr = SessionManager::new();
        let result = mgr.set_room(cid(9), code("AAAAAA"));
        assert!(matches!(result, Err(SessionError::NotFound(_))));
    }

    #[test]
    fn test_clear_room_is_idempotent() {
        let mut mgr = SessionManager::new();
        mgr.create(cid(1), guest("a")).unwrap();
        mgr.set_room(cid(1), code("AAAAAA")).unwrap();
        assert_eq!(mgr.clear_room(cid(1)), Some(code("AAAAAA")));
        assert_eq!(mgr.clear_room(cid(1)), None);
        assert_eq!(mgr.clear_room(cid(42)), None);
    }

    #[test]
    fn test_members_of_lists_sorted_connections() {
        let mut mgr = SessionManager::new();
        for n in [3, 1, 2] {
            mgr.create(cid(n), guest("p")).unwrap();
        }
        mgr.set_room(cid(3), code("AAAAAA")).unwrap();
        mgr.set_room(cid(1), code("AAAAAA")).unwrap();
        mgr.set_room(cid(2), code("BBBBBB")).unwrap();
        assert_eq!(mgr.members_of(&code("AAAAAA")), vec![cid(1), cid(3)]);
    }

    #[test]
    fn test_remove_returns_session_with_room() {
        let mut mgr = SessionManager::new();
        mgr.create(cid(1), guest("a")).unwrap();
        mgr.set_room(cid(1), code("AAAAAA")).unwrap();
        let removed = mgr.remove(cid(1)).unwrap();
        assert_eq!(removed.room, Some(code("AAAAAA")));
        assert!(mgr.is_empty());
        assert!(mgr.remove(cid(1)).is_none());
    }
}
