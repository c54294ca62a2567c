//! Room lifecycle: one room per matching attempt, from creation
//! through call completion.
//!
//! Rooms live in a DashMap; every check-and-transition runs under the
//! entry's guard, so concurrent accept attempts for the same room
//! resolve to exactly one winner. Snapshot structs carry the data a
//! caller needs for notifications out of the guard, so no lock is
//! held while messages are sent.

use crate::client::ConnId;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::task::AbortHandle;
use uuid::Uuid;

/// Unique room identifier.
pub type RoomId = Uuid;

/// Share of the total price paid out to the translator. The platform
/// retains the remainder. Pricing policy, not protocol.
pub const TRANSLATOR_SHARE: f64 = 0.7;

/// Room state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Created and broadcast, no acceptance yet.
    Waiting,
    /// A translator is bound, negotiation in progress.
    Connecting,
    /// Both peers confirmed the media connection.
    Active,
    /// Completed normally with a billing breakdown.
    Ended,
    /// Requester withdrew while waiting.
    Cancelled,
    /// Acceptance window elapsed with no acceptance.
    TimedOut,
}

impl RoomStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RoomStatus::Ended | RoomStatus::Cancelled | RoomStatus::TimedOut
        )
    }
}

/// A single matching attempt through to call completion.
#[derive(Debug)]
pub struct Room {
    pub id: RoomId,
    pub requester_id: String,
    pub requester_conn: ConnId,
    /// Bound on acceptance; binding is permanent for the room's life.
    pub translator_id: Option<String>,
    pub translator_conn: Option<ConnId>,
    pub source_lang: String,
    pub target_lang: String,
    pub category: String,
    pub price_per_minute: f64,
    pub status: RoomStatus,
    pub created_at: DateTime<Utc>,
    /// Connections the invitation was fanned out to.
    pub invited: Vec<ConnId>,
    /// Persisted call record id, set once the call goes active.
    pub call_record_id: Option<String>,
    /// At most one acceptance-window timer at a time.
    accept_timer: Option<AbortHandle>,
}

impl Room {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        requester_id: impl Into<String>,
        requester_conn: ConnId,
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
        category: impl Into<String>,
        price_per_minute: f64,
        invited: Vec<ConnId>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            requester_id: requester_id.into(),
            requester_conn,
            translator_id: None,
            translator_conn: None,
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
            category: category.into(),
            price_per_minute,
            status: RoomStatus::Waiting,
            created_at: Utc::now(),
            invited,
            call_record_id: None,
            accept_timer: None,
        }
    }
}

/// Billing breakdown for a completed call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Billing {
    pub minutes_billed: u64,
    pub total_price: f64,
    pub translator_earnings: f64,
    pub platform_fee: f64,
}

/// Compute the billing breakdown: started minutes are billed in full.
pub fn compute_billing(duration_seconds: u64, price_per_minute: f64) -> Billing {
    let minutes_billed = duration_seconds.div_ceil(60);
    let total_price = minutes_billed as f64 * price_per_minute;
    let translator_earnings = total_price * TRANSLATOR_SHARE;
    let platform_fee = total_price - translator_earnings;
    Billing {
        minutes_billed,
        total_price,
        translator_earnings,
        platform_fee,
    }
}

/// Outcome of an accept attempt.
#[derive(Debug)]
pub enum AcceptOutcome {
    Accepted(AcceptedRoom),
    AlreadyTaken,
    NotFound,
}

/// Snapshot returned to the single winning accept.
#[derive(Debug)]
pub struct AcceptedRoom {
    pub room_id: RoomId,
    pub requester_conn: ConnId,
    /// Invited connections that did not win the race.
    pub losers: Vec<ConnId>,
}

/// Snapshot of a room removed by the acceptance-window timer.
#[derive(Debug)]
pub struct ExpiredRoom {
    pub room_id: RoomId,
    pub requester_conn: ConnId,
}

/// Snapshot of a room withdrawn by its requester.
#[derive(Debug)]
pub struct CancelledRoom {
    pub room_id: RoomId,
    pub invited: Vec<ConnId>,
}

/// Snapshot of a room that received a connected signal.
#[derive(Debug)]
pub struct ConnectedRoom {
    pub room_id: RoomId,
    /// False when this was a duplicate signal for an already-active room.
    pub newly_active: bool,
    pub requester_id: String,
    pub translator_id: String,
    pub requester_conn: ConnId,
    pub translator_conn: ConnId,
    pub source_lang: String,
    pub target_lang: String,
    pub category: String,
    pub price_per_minute: f64,
}

/// Snapshot of a normally completed room.
#[derive(Debug)]
pub struct EndedRoom {
    pub room_id: RoomId,
    pub requester_id: String,
    pub translator_id: String,
    pub requester_conn: ConnId,
    pub translator_conn: Option<ConnId>,
    pub call_record_id: Option<String>,
    pub duration_seconds: u64,
    pub billing: Billing,
}

/// Snapshot of a room force-ended by a peer disconnect.
#[derive(Debug)]
pub struct DroppedRoom {
    pub room_id: RoomId,
    /// Status at the moment of the drop.
    pub phase: RoomStatus,
    pub dropped_was_requester: bool,
    /// The surviving peer, if one was bound.
    pub other_conn: Option<ConnId>,
    pub translator_conn: Option<ConnId>,
    pub invited: Vec<ConnId>,
    pub call_record_id: Option<String>,
}

/// Collection of in-flight rooms.
pub struct RoomStore {
    rooms: DashMap<RoomId, Room>,
}

impl RoomStore {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Track a freshly created room.
    pub fn insert(&self, room: Room) -> RoomId {
        let id = room.id;
        self.rooms.insert(id, room);
        id
    }

    /// Attach the acceptance-window timer to a waiting room. If the
    /// room already left `waiting`, the timer is aborted instead.
    pub fn set_accept_timer(&self, room_id: &RoomId, handle: AbortHandle) {
        match self.rooms.get_mut(room_id) {
            Some(mut room) if room.status == RoomStatus::Waiting => {
                if let Some(old) = room.accept_timer.replace(handle) {
                    old.abort();
                }
            }
            _ => handle.abort(),
        }
    }

    /// First-accept arbitration: the check-and-transition from
    /// `waiting` to `connecting` and the translator binding happen
    /// under the entry guard, so exactly one concurrent caller wins.
    pub fn try_accept(
        &self,
        room_id: &RoomId,
        translator_id: &str,
        translator_conn: ConnId,
    ) -> AcceptOutcome {
        let Some(mut room) = self.rooms.get_mut(room_id) else {
            return AcceptOutcome::NotFound;
        };
        if room.status != RoomStatus::Waiting {
            return AcceptOutcome::AlreadyTaken;
        }
        room.status = RoomStatus::Connecting;
        room.translator_id = Some(translator_id.to_string());
        room.translator_conn = Some(translator_conn);
        if let Some(timer) = room.accept_timer.take() {
            timer.abort();
        }
        let losers = room
            .invited
            .iter()
            .copied()
            .filter(|conn| *conn != translator_conn)
            .collect();
        AcceptOutcome::Accepted(AcceptedRoom {
            room_id: room.id,
            requester_conn: room.requester_conn,
            losers,
        })
    }

    /// Discard a room whose acceptance window elapsed. State check
    /// guards against a stale timer firing after the room moved on.
    pub fn expire(&self, room_id: &RoomId) -> Option<ExpiredRoom> {
        self.rooms
            .remove_if(room_id, |_, room| room.status == RoomStatus::Waiting)
            .map(|(_, room)| ExpiredRoom {
                room_id: room.id,
                requester_conn: room.requester_conn,
            })
    }

    /// Withdraw a waiting room on behalf of its requester.
    pub fn cancel(&self, room_id: &RoomId, requester_conn: &ConnId) -> Option<CancelledRoom> {
        let (_, room) = self.rooms.remove_if(room_id, |_, room| {
            room.status == RoomStatus::Waiting && room.requester_conn == *requester_conn
        })?;
        if let Some(timer) = room.accept_timer {
            timer.abort();
        }
        Some(CancelledRoom {
            room_id: room.id,
            invited: room.invited,
        })
    }

    /// Record a connected signal. The first signal moves the room to
    /// `active`; repeats are reported as duplicates, not errors.
    pub fn mark_connected(&self, room_id: &RoomId) -> Option<ConnectedRoom> {
        let mut room = self.rooms.get_mut(room_id)?;
        let newly_active = match room.status {
            RoomStatus::Connecting => {
                room.status = RoomStatus::Active;
                true
            }
            RoomStatus::Active => false,
            _ => return None,
        };
        let translator_conn = room.translator_conn?;
        let translator_id = room.translator_id.clone()?;
        Some(ConnectedRoom {
            room_id: room.id,
            newly_active,
            requester_id: room.requester_id.clone(),
            translator_id,
            requester_conn: room.requester_conn,
            translator_conn,
            source_lang: room.source_lang.clone(),
            target_lang: room.target_lang.clone(),
            category: room.category.clone(),
            price_per_minute: room.price_per_minute,
        })
    }

    /// Remember the persisted call record backing an active room.
    pub fn set_call_record(&self, room_id: &RoomId, record_id: impl Into<String>) {
        if let Some(mut room) = self.rooms.get_mut(room_id) {
            room.call_record_id = Some(record_id.into());
        }
    }

    /// Complete an active call, computing its billing breakdown and
    /// removing the room from active tracking.
    pub fn end(&self, room_id: &RoomId, duration_seconds: u64) -> Option<EndedRoom> {
        let (_, room) = self
            .rooms
            .remove_if(room_id, |_, room| room.status == RoomStatus::Active)?;
        let billing = compute_billing(duration_seconds, room.price_per_minute);
        Some(EndedRoom {
            room_id: room.id,
            requester_id: room.requester_id,
            translator_id: room.translator_id.unwrap_or_default(),
            requester_conn: room.requester_conn,
            translator_conn: room.translator_conn,
            call_record_id: room.call_record_id,
            duration_seconds,
            billing,
        })
    }

    /// Force-end every non-terminal room bound to a disconnected
    /// connection, returning what the caller needs to notify the
    /// surviving peers.
    pub fn force_end_for_conn(&self, conn_id: &ConnId) -> Vec<DroppedRoom> {
        let affected: Vec<RoomId> = self
            .rooms
            .iter()
            .filter(|entry| {
                let room = entry.value();
                !room.status.is_terminal()
                    && (room.requester_conn == *conn_id || room.translator_conn == Some(*conn_id))
            })
            .map(|entry| *entry.key())
            .collect();

        let mut dropped = Vec::new();
        for id in affected {
            if let Some((_, room)) = self.rooms.remove(&id) {
                if let Some(timer) = room.accept_timer {
                    timer.abort();
                }
                let dropped_was_requester = room.requester_conn == *conn_id;
                let other_conn = if dropped_was_requester {
                    room.translator_conn
                } else {
                    Some(room.requester_conn)
                };
                dropped.push(DroppedRoom {
                    room_id: room.id,
                    phase: room.status,
                    dropped_was_requester,
                    other_conn,
                    translator_conn: room.translator_conn,
                    invited: room.invited,
                    call_record_id: room.call_record_id,
                });
            }
        }
        dropped
    }

    /// The other bound connection of a room, for relaying. None means
    /// the message should be dropped: unknown room, second peer not
    /// bound yet, or sender not part of the room.
    pub fn counterpart(&self, room_id: &RoomId, from: &ConnId) -> Option<ConnId> {
        let room = self.rooms.get(room_id)?;
        if room.requester_conn == *from {
            room.translator_conn
        } else if room.translator_conn == Some(*from) {
            Some(room.requester_conn)
        } else {
            None
        }
    }

    /// Current status of a room.
    pub fn status(&self, room_id: &RoomId) -> Option<RoomStatus> {
        self.rooms.get(room_id).map(|room| room.status)
    }

    /// Translator bound to a room, if any.
    pub fn bound_translator(&self, room_id: &RoomId) -> Option<String> {
        self.rooms.get(room_id)?.translator_id.clone()
    }

    /// Number of tracked rooms in any non-terminal state.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Number of rooms with an established call.
    pub fn active_count(&self) -> usize {
        self.rooms
            .iter()
            .filter(|entry| entry.value().status == RoomStatus::Active)
            .count()
    }
}

impl Default for RoomStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn make_room(invited: Vec<ConnId>) -> Room {
        Room::new(
            "u1",
            Uuid::new_v4(),
            "ka",
            "en",
            "general",
            2.0,
            invited,
        )
    }

    #[test]
    fn test_billing_rounds_started_minutes_up() {
        let billing = compute_billing(125, 4.0);
        assert_eq!(billing.minutes_billed, 3);
        assert!(approx(billing.total_price, 12.0));
        assert!(approx(billing.translator_earnings, 8.4));
        assert!(approx(billing.platform_fee, 3.6));
    }

    #[test]
    fn test_billing_exact_minutes() {
        let billing = compute_billing(300, 2.0);
        assert_eq!(billing.minutes_billed, 5);
        assert!(approx(billing.total_price, 10.0));
        assert!(approx(billing.translator_earnings, 7.0));
        assert!(approx(billing.platform_fee, 3.0));
    }

    #[test]
    fn test_first_accept_wins_second_sees_taken() {
        let store = RoomStore::new();
        let winner_conn = Uuid::new_v4();
        let loser_conn = Uuid::new_v4();
        let room_id = store.insert(make_room(vec![winner_conn, loser_conn]));

        let outcome = store.try_accept(&room_id, "t1", winner_conn);
        let AcceptOutcome::Accepted(accepted) = outcome else {
            panic!("first accept should win");
        };
        assert_eq!(accepted.losers, vec![loser_conn]);
        assert_eq!(store.status(&room_id), Some(RoomStatus::Connecting));
        assert_eq!(store.bound_translator(&room_id).as_deref(), Some("t1"));

        assert!(matches!(
            store.try_accept(&room_id, "t2", loser_conn),
            AcceptOutcome::AlreadyTaken
        ));
        // binding unchanged by the losing attempt
        assert_eq!(store.bound_translator(&room_id).as_deref(), Some("t1"));
    }

    #[test]
    fn test_accept_after_expiry_is_not_found() {
        let store = RoomStore::new();
        let conn = Uuid::new_v4();
        let room_id = store.insert(make_room(vec![conn]));

        assert!(store.expire(&room_id).is_some());
        // the timer only fires once; a second expiry is a no-op
        assert!(store.expire(&room_id).is_none());
        assert!(matches!(
            store.try_accept(&room_id, "t1", conn),
            AcceptOutcome::NotFound
        ));
    }

    #[test]
    fn test_expire_is_guarded_by_state() {
        let store = RoomStore::new();
        let conn = Uuid::new_v4();
        let room_id = store.insert(make_room(vec![conn]));
        let AcceptOutcome::Accepted(_) = store.try_accept(&room_id, "t1", conn) else {
            panic!("accept should win");
        };

        // a stale timer firing after acceptance must not discard the room
        assert!(store.expire(&room_id).is_none());
        assert_eq!(store.status(&room_id), Some(RoomStatus::Connecting));
    }

    #[test]
    fn test_cancel_only_from_waiting_by_requester() {
        let store = RoomStore::new();
        let translator_conn = Uuid::new_v4();
        let room = make_room(vec![translator_conn]);
        let requester_conn = room.requester_conn;
        let room_id = store.insert(room);

        // someone else cannot cancel
        assert!(store.cancel(&room_id, &Uuid::new_v4()).is_none());

        let cancelled = store.cancel(&room_id, &requester_conn).unwrap();
        assert_eq!(cancelled.invited, vec![translator_conn]);
        assert!(store.status(&room_id).is_none());
    }

    #[test]
    fn test_cancel_rejected_after_acceptance() {
        let store = RoomStore::new();
        let translator_conn = Uuid::new_v4();
        let room = make_room(vec![translator_conn]);
        let requester_conn = room.requester_conn;
        let room_id = store.insert(room);
        store.try_accept(&room_id, "t1", translator_conn);

        assert!(store.cancel(&room_id, &requester_conn).is_none());
        assert_eq!(store.status(&room_id), Some(RoomStatus::Connecting));
    }

    #[test]
    fn test_connected_signal_is_idempotent() {
        let store = RoomStore::new();
        let translator_conn = Uuid::new_v4();
        let room_id = store.insert(make_room(vec![translator_conn]));
        store.try_accept(&room_id, "t1", translator_conn);

        let first = store.mark_connected(&room_id).unwrap();
        assert!(first.newly_active);
        assert_eq!(store.status(&room_id), Some(RoomStatus::Active));

        let second = store.mark_connected(&room_id).unwrap();
        assert!(!second.newly_active);
    }

    #[test]
    fn test_connected_signal_requires_bound_translator() {
        let store = RoomStore::new();
        let room_id = store.insert(make_room(vec![Uuid::new_v4()]));
        assert!(store.mark_connected(&room_id).is_none());
    }

    #[test]
    fn test_end_requires_active_room() {
        let store = RoomStore::new();
        let translator_conn = Uuid::new_v4();
        let room_id = store.insert(make_room(vec![translator_conn]));
        store.try_accept(&room_id, "t1", translator_conn);

        // connecting rooms cannot be ended with billing
        assert!(store.end(&room_id, 120).is_none());

        store.mark_connected(&room_id);
        let ended = store.end(&room_id, 300).unwrap();
        assert_eq!(ended.billing.minutes_billed, 5);
        assert!(approx(ended.billing.total_price, 10.0));
        assert!(store.status(&room_id).is_none());
    }

    #[test]
    fn test_force_end_resolves_bound_rooms() {
        let store = RoomStore::new();
        let translator_conn = Uuid::new_v4();
        let room = make_room(vec![translator_conn]);
        let requester_conn = room.requester_conn;
        let room_id = store.insert(room);
        store.try_accept(&room_id, "t1", translator_conn);
        store.mark_connected(&room_id);

        let dropped = store.force_end_for_conn(&translator_conn);
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].phase, RoomStatus::Active);
        assert!(!dropped[0].dropped_was_requester);
        assert_eq!(dropped[0].other_conn, Some(requester_conn));
        assert!(store.is_empty());
    }

    #[test]
    fn test_counterpart_resolution() {
        let store = RoomStore::new();
        let translator_conn = Uuid::new_v4();
        let room = make_room(vec![translator_conn]);
        let requester_conn = room.requester_conn;
        let room_id = store.insert(room);

        // no second peer bound yet: relay should drop
        assert!(store.counterpart(&room_id, &requester_conn).is_none());

        store.try_accept(&room_id, "t1", translator_conn);
        assert_eq!(
            store.counterpart(&room_id, &requester_conn),
            Some(translator_conn)
        );
        assert_eq!(
            store.counterpart(&room_id, &translator_conn),
            Some(requester_conn)
        );
        // a stranger is not part of the room
        assert!(store.counterpart(&room_id, &Uuid::new_v4()).is_none());
    }
}
