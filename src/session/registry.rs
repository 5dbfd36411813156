//! Concurrent room registry keyed by short human-readable codes.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::room::GameRoom;

/// Code alphabet without visually ambiguous glyphs (0/O, 1/I).
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LENGTH: usize = 4;

#[derive(Default)]
pub struct RoomRegistry {
    rooms: DashMap<String, Arc<GameRoom>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a fresh code and insert the room built for it. The entry
    /// API makes reservation atomic against concurrent inserts.
    pub fn insert_with(&self, build: impl FnOnce(&str) -> Arc<GameRoom>) -> Arc<GameRoom> {
        loop {
            let code = Self::generate_code();
            match self.rooms.entry(code.clone()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    let room = build(&code);
                    slot.insert(Arc::clone(&room));
                    return room;
                }
            }
        }
    }

    /// Case-insensitive lookup.
    pub fn get(&self, code: &str) -> Option<Arc<GameRoom>> {
        self.rooms
            .get(&Self::normalize(code))
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, code: &str) -> Option<Arc<GameRoom>> {
        self.rooms.remove(&Self::normalize(code)).map(|(_, room)| room)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    fn normalize(code: &str) -> String {
        code.trim().to_ascii_uppercase()
    }

    fn generate_code() -> String {
        (0..CODE_LENGTH)
            .map(|_| CODE_ALPHABET[fastrand::usize(..CODE_ALPHABET.len())] as char)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_codes_use_safe_alphabet() {
        for _ in 0..200 {
            let code = RoomRegistry::generate_code();
            assert_eq!(code.len(), CODE_LENGTH);
            for ch in code.bytes() {
                assert!(CODE_ALPHABET.contains(&ch), "unexpected glyph {}", ch as char);
                assert!(![b'0', b'O', b'1', b'I'].contains(&ch));
            }
        }
    }

    #[test]
    fn test_normalize_is_case_insensitive() {
        assert_eq!(RoomRegistry::normalize(" ab2z "), "AB2Z");
    }
}
