//! WebSocket protocol message types.
//!
//! Defines the JSON message format for participant-server
//! communication. Negotiation payloads (`offer` / `answer` /
//! `ice-candidate`) are carried as raw JSON values and never
//! interpreted by the server.

use crate::client::ConnId;
use crate::room::RoomId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role a participant registers as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Translator,
}

/// Whether a request is for an immediate or a scheduled call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Instant,
    Scheduled,
}

// ============================================================================
// Participant → Server Messages
// ============================================================================

/// Message sent from a participant to the server.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Register this connection as a client or translator.
    Register { role: Role, participant_id: String },
    /// Toggle translator availability.
    SetAvailability { available: bool },
    /// Request a translator for a live call.
    RequestTranslator {
        requester_id: String,
        source_lang: String,
        target_lang: String,
        category: String,
        kind: RequestKind,
        /// Requested start time for scheduled calls.
        #[serde(default)]
        scheduled_at: Option<chrono::DateTime<chrono::Utc>>,
    },
    /// Translator accepts an open request.
    AcceptRequest { room_id: RoomId },
    /// Translator declines an open request (advisory only).
    RejectRequest { room_id: RoomId },
    /// Requester withdraws an open request.
    CancelRequest { room_id: RoomId },
    /// Connection-negotiation offer (opaque payload).
    Offer { room_id: RoomId, payload: Value },
    /// Connection-negotiation answer (opaque payload).
    Answer { room_id: RoomId, payload: Value },
    /// Connection-negotiation candidate (opaque payload).
    IceCandidate { room_id: RoomId, payload: Value },
    /// A peer reports the media connection is established.
    CallConnected { room_id: RoomId },
    /// A peer ends the call with the elapsed duration.
    EndCall {
        room_id: RoomId,
        duration_seconds: u64,
    },
    /// Keepalive.
    Ping,
}

// ============================================================================
// Server → Participant Messages
// ============================================================================

/// Public translator profile shared with requesters.
///
/// Only these fields ever leave the server; internal record fields
/// (email, totals, online flag) stay private.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatorProfile {
    pub id: String,
    pub name: String,
    pub rating: f64,
}

/// Message sent from the server to a participant.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Broadcast count of connected participants.
    OnlineCount { count: usize },
    /// Request accepted for fan-out; searching for a translator.
    Searching {
        room_id: RoomId,
        eligible_count: usize,
    },
    /// No eligible translator is online.
    NoTranslatorAvailable { message: String },
    /// Invitation delivered to an eligible translator.
    IncomingRequest {
        room_id: RoomId,
        requester_id: String,
        source_lang: String,
        target_lang: String,
        category: String,
    },
    /// Acceptance window elapsed with no acceptance.
    RequestTimeout { room_id: RoomId },
    /// A translator accepted; sent to the requester.
    TranslatorFound {
        room_id: RoomId,
        translator: TranslatorProfile,
    },
    /// Another translator won the request; withdraw the invitation.
    RequestTaken { room_id: RoomId },
    /// The requester withdrew the request.
    RequestCancelled { room_id: RoomId },
    /// Both peers should begin connection negotiation.
    StartCall { room_id: RoomId, initiator: ConnId },
    /// Forwarded negotiation offer.
    Offer { payload: Value, from: ConnId },
    /// Forwarded negotiation answer.
    Answer { payload: Value, from: ConnId },
    /// Forwarded negotiation candidate.
    IceCandidate { payload: Value, from: ConnId },
    /// The room reached the active state.
    CallStarted { room_id: RoomId },
    /// Call completed with its billing breakdown.
    ///
    /// `earnings` is present only on the translator-facing copy.
    CallEnded {
        room_id: RoomId,
        duration_seconds: u64,
        total_price: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        earnings: Option<f64>,
    },
    /// The other peer's connection dropped.
    PeerDisconnected { reason: String },
    /// Error response to the sender only.
    Error { message: String, code: String },
    /// Keepalive response.
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_client_message_tags_are_kebab_case() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"set-availability","available":false}"#).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::SetAvailability { available: false }
        ));

        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"request-translator","requester_id":"u1","source_lang":"ka","target_lang":"en","category":"general","kind":"instant"}"#,
        )
        .unwrap();
        assert!(matches!(
            msg,
            ClientMessage::RequestTranslator {
                kind: RequestKind::Instant,
                ..
            }
        ));
    }

    #[test]
    fn test_negotiation_payload_stays_opaque() {
        let raw = r#"{"type":"ice-candidate","room_id":"7b41cbfc-08a1-4172-a7b2-a8a0737a5cd5","payload":{"candidate":"candidate:1 1 UDP 2122252543 192.0.2.1 54400 typ host"}}"#;
        let msg: ClientMessage = serde_json::from_str(raw).unwrap();
        match msg {
            ClientMessage::IceCandidate { payload, .. } => {
                assert_eq!(
                    payload["candidate"],
                    "candidate:1 1 UDP 2122252543 192.0.2.1 54400 typ host"
                );
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_call_ended_omits_earnings_for_requester() {
        let room_id = Uuid::new_v4();
        let to_requester = serde_json::to_value(ServerMessage::CallEnded {
            room_id,
            duration_seconds: 300,
            total_price: 10.0,
            earnings: None,
        })
        .unwrap();
        assert!(to_requester.get("earnings").is_none());
        assert_eq!(to_requester["type"], "call-ended");

        let to_translator = serde_json::to_value(ServerMessage::CallEnded {
            room_id,
            duration_seconds: 300,
            total_price: 10.0,
            earnings: Some(7.0),
        })
        .unwrap();
        assert_eq!(to_translator["earnings"], 7.0);
    }
}
