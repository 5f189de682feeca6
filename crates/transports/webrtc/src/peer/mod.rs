//! Peer connection management

mod connection;

pub use connection::{
    candidate_from_init, map_connection_state, map_signaling_state, PeerConnection,
};
