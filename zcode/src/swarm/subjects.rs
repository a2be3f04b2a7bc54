//! The per-room subject scheme.
//!
//! Direct:    `room.{roomId}.{role}`
//! Broadcast: `room.{roomId}.broadcast`
//! Presence:  `room.{roomId}.presence`
//! State:     `room.{roomId}.state`

use super::role::Role;

/// Subject for messages addressed to one role.
#[must_use]
pub fn direct(room_id: &str, role: Role) -> String {
    format!("room.{room_id}.{role}")
}

/// Subject for room-wide broadcasts.
#[must_use]
pub fn broadcast(room_id: &str) -> String {
    format!("room.{room_id}.broadcast")
}

/// Subject for presence announcements.
#[must_use]
pub fn presence(room_id: &str) -> String {
    format!("room.{room_id}.presence")
}

/// Subject for authoritative room-state snapshots.
#[must_use]
pub fn state(room_id: &str) -> String {
    format!("room.{room_id}.state")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_shapes() {
        assert_eq!(direct("calm-otter-1a2b", Role::BeDev), "room.calm-otter-1a2b.BE_DEV");
        assert_eq!(broadcast("r"), "room.r.broadcast");
        assert_eq!(presence("r"), "room.r.presence");
        assert_eq!(state("r"), "room.r.state");
    }
}
