//! Signaling relay: opaque negotiation message forwarding.
//!
//! Forwards offer/answer/candidate payloads verbatim to the other
//! connection bound to a room. Payload contents are never parsed or
//! validated; they belong to the peers' negotiation protocol.

use crate::client::{ClientRegistry, ConnId};
use crate::protocol::ServerMessage;
use crate::room::{RoomId, RoomStore};
use metrics::counter;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Kind of negotiation message being relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationKind {
    Offer,
    Answer,
    IceCandidate,
}

/// Stateless forwarder keyed by room id.
pub struct SignalingRelay {
    rooms: Arc<RoomStore>,
    registry: Arc<ClientRegistry>,
}

impl SignalingRelay {
    pub fn new(rooms: Arc<RoomStore>, registry: Arc<ClientRegistry>) -> Self {
        Self { rooms, registry }
    }

    /// Forward a payload to the other peer of the room. Messages with
    /// no resolvable counterpart are dropped silently: negotiation
    /// traffic can legitimately arrive before the second peer is
    /// bound, and that is tolerated rather than errored.
    pub fn relay(&self, room_id: RoomId, from: ConnId, kind: NegotiationKind, payload: Value) {
        let Some(to) = self.rooms.counterpart(&room_id, &from) else {
            debug!(
                "Dropping {:?} for room {}: no counterpart bound",
                kind, room_id
            );
            counter!("signaling_relay_dropped_total").increment(1);
            return;
        };

        let msg = match kind {
            NegotiationKind::Offer => ServerMessage::Offer { payload, from },
            NegotiationKind::Answer => ServerMessage::Answer { payload, from },
            NegotiationKind::IceCandidate => ServerMessage::IceCandidate { payload, from },
        };
        counter!("signaling_relay_forwarded_total").increment(1);
        self.registry.send_to(&to, msg);
    }
}
