use std::collections::HashMap;

use crate::state::RoomState;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("room {0} already exists")]
    AlreadyExists(u32),
    #[error("room {0} not found")]
    NotFound(u32),
}

/// Owns the live match states, keyed by room id.
///
/// All access goes through here so that a room that has been torn down is
/// indistinguishable from one that never existed: late ticks and stale
/// paddle input simply find nothing to act on.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<u32, RoomState>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, room_id: u32, state: RoomState) -> Result<(), RegistryError> {
        if self.rooms.contains_key(&room_id) {
            return Err(RegistryError::AlreadyExists(room_id));
        }
        self.rooms.insert(room_id, state);
        Ok(())
    }

    pub fn get(&self, room_id: u32) -> Option<&RoomState> {
        self.rooms.get(&room_id)
    }

    pub fn get_mut(&mut self, room_id: u32) -> Option<&mut RoomState> {
        self.rooms.get_mut(&room_id)
    }

    pub fn delete(&mut self, room_id: u32) -> Result<RoomState, RegistryError> {
        self.rooms
            .remove(&room_id)
            .ok_or(RegistryError::NotFound(room_id))
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;

    fn state() -> RoomState {
        RoomState::new(&GameConfig::default())
    }

    #[test]
    fn create_get_delete_lifecycle() {
        let mut registry = RoomRegistry::new();
        assert!(registry.is_empty());

        registry.create(0, state()).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get(0).is_some());

        registry.get_mut(0).unwrap().score[0] = 3;
        assert_eq!(registry.get(0).unwrap().score, [3, 0]);

        let removed = registry.delete(0).unwrap();
        assert_eq!(removed.score, [3, 0]);
        assert!(registry.get(0).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn duplicate_room_id_is_rejected() {
        let mut registry = RoomRegistry::new();
        registry.create(4, state()).unwrap();
        assert_eq!(
            registry.create(4, state()),
            Err(RegistryError::AlreadyExists(4))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn deleting_unknown_room_is_an_error() {
        let mut registry = RoomRegistry::new();
        assert!(matches!(
            registry.delete(9),
            Err(RegistryError::NotFound(9))
        ));
    }
}
