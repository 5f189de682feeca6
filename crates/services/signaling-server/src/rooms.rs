//! Two-party room registry
//!
//! Transport independent: the registry only tracks which occupant handles sit
//! in which room and with what role. Every admission decision is taken under a
//! single lock, so two peers racing into an empty room can never both be told
//! they created it.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Opaque per-connection identity
pub type PeerId = Uuid;

/// Maximum occupants per room
pub const ROOM_CAPACITY: usize = 2;

/// Role assigned at admission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Created the room, or inherited it when the creator left
    Initiator,
    /// Second occupant
    Joiner,
}

/// Outcome of a join attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Room was empty; the caller is its initiator
    Created,
    /// Room had one occupant; the caller joined it
    Joined {
        /// The occupant that must be told about the arrival
        partner: PeerId,
    },
    /// Room already holds two occupants; nothing changed
    Full,
}

/// Where a relayed payload should go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayTarget {
    /// The other occupant
    Partner(PeerId),
    /// The sender is alone in the room
    Alone,
    /// The sender does not occupy the room
    NotOccupant,
}

/// Result of removing an occupant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Departure {
    /// The remaining occupant, now the room's initiator
    pub partner: Option<PeerId>,
}

#[derive(Debug, Clone, Copy)]
struct Occupant {
    peer: PeerId,
    role: Role,
}

#[derive(Debug)]
struct Room {
    occupants: Vec<Occupant>,
    created_at: DateTime<Utc>,
}

impl Room {
    fn position(&self, peer: PeerId) -> Option<usize> {
        self.occupants.iter().position(|o| o.peer == peer)
    }
}

/// Room id to occupants map
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: Mutex<HashMap<String, Room>>,
}

impl RoomRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the two-party admission rule
    ///
    /// A peer that already occupies the room is reported as full rather than
    /// admitted twice.
    pub fn join(&self, room_id: &str, peer: PeerId) -> Admission {
        let mut rooms = self.rooms.lock();
        let room = rooms.entry(room_id.to_string()).or_insert_with(|| Room {
            occupants: Vec::with_capacity(ROOM_CAPACITY),
            created_at: Utc::now(),
        });

        if room.position(peer).is_some() {
            return Admission::Full;
        }

        match room.occupants.as_slice() {
            [] => {
                room.occupants.push(Occupant {
                    peer,
                    role: Role::Initiator,
                });
                debug!(room_id, %peer, "Room created");
                Admission::Created
            }
            [existing] => {
                let partner = existing.peer;
                room.occupants.push(Occupant {
                    peer,
                    role: Role::Joiner,
                });
                debug!(room_id, %peer, %partner, "Room joined");
                Admission::Joined { partner }
            }
            _ => Admission::Full,
        }
    }

    /// Resolve the recipient of a payload relayed by `from`
    pub fn relay_target(&self, room_id: &str, from: PeerId) -> RelayTarget {
        let rooms = self.rooms.lock();
        let Some(room) = rooms.get(room_id) else {
            return RelayTarget::NotOccupant;
        };
        if room.position(from).is_none() {
            return RelayTarget::NotOccupant;
        }
        room.occupants
            .iter()
            .find(|o| o.peer != from)
            .map_or(RelayTarget::Alone, |o| RelayTarget::Partner(o.peer))
    }

    /// Remove `peer` from the room
    ///
    /// Returns `None` when the peer was not an occupant. The remaining
    /// occupant, if any, becomes the initiator; an emptied room is removed.
    pub fn leave(&self, room_id: &str, peer: PeerId) -> Option<Departure> {
        let mut rooms = self.rooms.lock();
        let room = rooms.get_mut(room_id)?;
        let index = room.position(peer)?;
        room.occupants.remove(index);

        let partner = room.occupants.first_mut().map(|remaining| {
            remaining.role = Role::Initiator;
            remaining.peer
        });

        if room.occupants.is_empty() {
            let age = Utc::now() - room.created_at;
            rooms.remove(room_id);
            debug!(room_id, age_secs = age.num_seconds(), "Room removed");
        }

        Some(Departure { partner })
    }

    /// Current occupants in admission order
    pub fn occupants(&self, room_id: &str) -> Vec<PeerId> {
        self.rooms
            .lock()
            .get(room_id)
            .map(|room| room.occupants.iter().map(|o| o.peer).collect())
            .unwrap_or_default()
    }

    /// Role of `peer` in the room
    pub fn role_of(&self, room_id: &str, peer: PeerId) -> Option<Role> {
        let rooms = self.rooms.lock();
        let room = rooms.get(room_id)?;
        room.position(peer).map(|i| room.occupants[i].role)
    }

    /// Number of rooms with at least one occupant
    pub fn room_count(&self) -> usize {
        self.rooms.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_admission_sequence() {
        let registry = RoomRegistry::new();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        assert_eq!(registry.join("R1", a), Admission::Created);
        assert_eq!(registry.join("R1", b), Admission::Joined { partner: a });
        assert_eq!(registry.join("R1", c), Admission::Full);

        assert_eq!(registry.occupants("R1"), vec![a, b]);
        assert_eq!(registry.role_of("R1", a), Some(Role::Initiator));
        assert_eq!(registry.role_of("R1", b), Some(Role::Joiner));
        assert_eq!(registry.role_of("R1", c), None);
    }

    #[test]
    fn test_rejoin_by_occupant_changes_nothing() {
        let registry = RoomRegistry::new();
        let a = Uuid::new_v4();

        registry.join("R1", a);
        assert_eq!(registry.join("R1", a), Admission::Full);
        assert_eq!(registry.occupants("R1"), vec![a]);
    }

    #[test]
    fn test_relay_targets() {
        let registry = RoomRegistry::new();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        registry.join("R1", a);
        assert_eq!(registry.relay_target("R1", a), RelayTarget::Alone);

        registry.join("R1", b);
        assert_eq!(registry.relay_target("R1", a), RelayTarget::Partner(b));
        assert_eq!(registry.relay_target("R1", b), RelayTarget::Partner(a));
        assert_eq!(registry.relay_target("R1", c), RelayTarget::NotOccupant);
        assert_eq!(registry.relay_target("R2", a), RelayTarget::NotOccupant);
    }

    #[test]
    fn test_initiator_leaving_promotes_partner() {
        let registry = RoomRegistry::new();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        registry.join("R1", a);
        registry.join("R1", b);

        assert_eq!(
            registry.leave("R1", a),
            Some(Departure { partner: Some(b) })
        );
        assert_eq!(registry.role_of("R1", b), Some(Role::Initiator));

        // The next arrival joins the promoted occupant
        assert_eq!(registry.join("R1", c), Admission::Joined { partner: b });
        assert_eq!(registry.role_of("R1", c), Some(Role::Joiner));
    }

    #[test]
    fn test_empty_room_removed() {
        let registry = RoomRegistry::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        registry.join("R1", a);
        registry.join("R1", b);
        registry.leave("R1", b);
        assert_eq!(registry.leave("R1", a), Some(Departure { partner: None }));
        assert_eq!(registry.room_count(), 0);

        // A fresh join recreates it
        assert_eq!(registry.join("R1", b), Admission::Created);
    }

    #[test]
    fn test_leave_by_stranger_is_ignored() {
        let registry = RoomRegistry::new();
        let a = Uuid::new_v4();

        registry.join("R1", a);
        assert_eq!(registry.leave("R1", Uuid::new_v4()), None);
        assert_eq!(registry.leave("R2", a), None);
        assert_eq!(registry.occupants("R1"), vec![a]);
    }

    #[test]
    fn test_concurrent_joins_admit_exactly_two() {
        let registry = Arc::new(RoomRegistry::new());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.join("race", Uuid::new_v4()))
            })
            .collect();

        let outcomes: Vec<Admission> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let created = outcomes.iter().filter(|a| **a == Admission::Created).count();
        let joined = outcomes
            .iter()
            .filter(|a| matches!(a, Admission::Joined { .. }))
            .count();
        let full = outcomes.iter().filter(|a| **a == Admission::Full).count();

        assert_eq!((created, joined, full), (1, 1, 14));
        assert_eq!(registry.occupants("race").len(), ROOM_CAPACITY);
    }
}
