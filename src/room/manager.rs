//! Component F: Room Directory. A concurrent map from room code to a
//! handle that can deliver events into that room's serial execution
//! context (§4.F, §9: "the room registry is the only cross-room shared
//! mutable structure, and it carries no game semantics").

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use rand::Rng;
use tokio::sync::mpsc;

use crate::error::DirectoryError;
use crate::room::{Room, RoomEvent};

const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const CODE_LEN: usize = 5;
const MAX_CODE_ATTEMPTS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomCode(String);

impl RoomCode {
    /// Normalizes to uppercase so lookups are case-insensitive (§6).
    pub fn normalize(raw: &str) -> Self {
        Self(raw.trim().to_ascii_uppercase())
    }

    pub fn generate(rng: &mut impl Rng) -> Self {
        let code: String = (0..CODE_LEN)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cheap handle to a room's inbound event queue. Cloning it is how every
/// connection task and every spawned timer reaches back into the room.
#[derive(Clone)]
pub struct RoomHandle {
    pub code: RoomCode,
    pub tx: mpsc::UnboundedSender<RoomEvent>,
}

pub struct RoomDirectory {
    rooms: Arc<DashMap<RoomCode, RoomHandle>>,
}

impl Default for RoomDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
        }
    }

    /// Generate a unique code, spawn the room's owning task, register it,
    /// and return the handle.
    pub fn create_room(&self) -> Result<RoomHandle, DirectoryError> {
        let mut rng = rand::thread_rng();
        let mut code = RoomCode::generate(&mut rng);
        let mut attempts = 0;
        while self.rooms.contains_key(&code) {
            attempts += 1;
            if attempts >= MAX_CODE_ATTEMPTS {
                return Err(DirectoryError::CodeExhausted(MAX_CODE_ATTEMPTS));
            }
            code = RoomCode::generate(&mut rng);
        }

        let directory = self.rooms.clone();
        let (handle, room) = Room::spawn_new(code.clone(), directory);
        self.rooms.insert(code, handle.clone());
        tokio::spawn(room.run());
        Ok(handle)
    }

    pub fn get_room(&self, raw_code: &str) -> Option<RoomHandle> {
        let code = RoomCode::normalize(raw_code);
        self.rooms.get(&code).map(|r| r.clone())
    }

    pub fn remove_room(&self, code: &RoomCode) {
        self.rooms.remove(code);
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Diagnostic enumeration of currently active room codes (§4.F).
    pub fn list_rooms(&self) -> Vec<String> {
        self.rooms.iter().map(|entry| entry.key().to_string()).collect()
    }
}
