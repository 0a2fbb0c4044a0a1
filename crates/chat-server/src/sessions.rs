use parking_lot::{Mutex, MutexGuard};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

pub type SessionId = u64;

/// Open sessions per room. Rooms disappear once their last session leaves.
#[derive(Debug, Default)]
pub struct RoomSessions {
    next_id: AtomicU64,
    rooms: Mutex<HashMap<String, HashSet<SessionId>>>,
}

impl RoomSessions {
    pub fn new() -> Self {
        Self::default()
    }

    fn rooms(&self) -> MutexGuard<'_, HashMap<String, HashSet<SessionId>>> {
        self.rooms.lock()
    }

    pub fn join(&self, room_id: &str) -> SessionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.rooms().entry(room_id.to_string()).or_default().insert(id);
        id
    }

    pub fn leave(&self, room_id: &str, session: SessionId) {
        let mut rooms = self.rooms();
        if let Some(sessions) = rooms.get_mut(room_id) {
            sessions.remove(&session);
            if sessions.is_empty() {
                rooms.remove(room_id);
            }
        }
    }

    pub fn total_connections(&self) -> usize {
        self.rooms().values().map(HashSet::len).sum()
    }

    pub fn room_count(&self) -> usize {
        self.rooms().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_and_leave() {
        let sessions = RoomSessions::new();
        let a = sessions.join("1");
        let b = sessions.join("1");
        let c = sessions.join("2");
        assert_ne!(a, b);
        assert_eq!(sessions.total_connections(), 3);
        assert_eq!(sessions.room_count(), 2);

        sessions.leave("2", c);
        assert_eq!(sessions.room_count(), 1, "empty room is dropped");

        sessions.leave("1", a);
        sessions.leave("1", a);
        assert_eq!(sessions.total_connections(), 1);

        sessions.leave("1", b);
        assert_eq!(sessions.total_connections(), 0);
        assert_eq!(sessions.room_count(), 0);
    }
}
