//! Small interface passed into controller methods at call time instead of
//! a back-reference to the Room (§9 design notes: "prefer passing a small
//! broadcaster interface into controllers at construction/call time to
//! avoid cycles and ease testing").

use crate::room::state::SessionId;
use crate::protocol::ServerToClient;

pub trait Broadcaster {
    fn broadcast_all(&mut self, msg: ServerToClient);
    fn broadcast_except(&mut self, exclude: SessionId, msg: ServerToClient);
    fn send_to(&mut self, target: SessionId, msg: ServerToClient);
}

/// Test double that just records every call, for controller unit tests
/// that need to assert on what was broadcast without a real Room or
/// connections.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingBroadcaster {
    pub all: Vec<ServerToClient>,
    pub except: Vec<(SessionId, ServerToClient)>,
    pub direct: Vec<(SessionId, ServerToClient)>,
}

#[cfg(test)]
impl Broadcaster for RecordingBroadcaster {
    fn broadcast_all(&mut self, msg: ServerToClient) {
        self.all.push(msg);
    }

    fn broadcast_except(&mut self, exclude: SessionId, msg: ServerToClient) {
        self.except.push((exclude, msg));
    }

    fn send_to(&mut self, target: SessionId, msg: ServerToClient) {
        self.direct.push((target, msg));
    }
}
