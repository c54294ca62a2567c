//! Real-time matching and call-signaling core for a live
//! interpretation marketplace.
//!
//! This service:
//! - Accepts WebSocket connections from clients and translators
//! - Tracks presence and live capability metadata
//! - Broadcasts translation requests to eligible translators and
//!   arbitrates the race to accept
//! - Owns the per-request room lifecycle, timers and billing inputs
//! - Relays opaque connection-negotiation payloads between the two
//!   matched peers
//!
//! ## Architecture
//!
//! ```text
//! WebSocket participants
//!         ↓
//! ws_server (gateway: dispatch + disconnect cleanup)
//!         ↓
//! MatchingEngine ── PresenceRegistry (IndexMap, insertion order)
//!         │     └── RoomStore (DashMap, atomic first-accept)
//!         ↓
//! SignalingRelay (opaque offer/answer/candidate forwarding)
//! ```
//!
//! Persistence, payments and push notifications are collaborators
//! behind the `external_services` traits; the core state is
//! process-local. Horizontal scaling would require an external shared
//! presence/session store, which is out of scope for a
//! single-instance deployment.

pub mod client;
pub mod error;
pub mod matching;
pub mod presence;
pub mod protocol;
pub mod relay;
pub mod room;
pub mod ws_server;

pub use client::{ClientRegistry, ClientState, ConnId};
pub use error::{Result, SignalingError};
pub use matching::{MatchConfig, MatchingEngine};
pub use presence::{Participant, PresenceRegistry, TranslatorPresence};
pub use protocol::{ClientMessage, RequestKind, Role, ServerMessage, TranslatorProfile};
pub use relay::{NegotiationKind, SignalingRelay};
pub use room::{
    compute_billing, AcceptOutcome, Billing, Room, RoomId, RoomStatus, RoomStore,
    TRANSLATOR_SHARE,
};
pub use ws_server::{create_router, spawn_stale_sweeper, sweep_stale, AppState};
