//! Matching engine: broadcast fan-out and first-accept arbitration.
//!
//! Eligibility is a flat filter with no priority ordering; every
//! eligible translator gets the invitation and the first acceptance
//! wins. The arbitration itself happens inside
//! [`RoomStore::try_accept`]; this module wires the outcome to
//! presence updates, collaborator writes and peer notifications.

use crate::client::{ClientRegistry, ConnId};
use crate::presence::PresenceRegistry;
use crate::protocol::{RequestKind, ServerMessage, TranslatorProfile};
use crate::room::{AcceptOutcome, Room, RoomId, RoomStore, RoomStatus};
use external_services::{
    CallStatus, CallUpdate, NewCall, Notifier, PaymentService, RecordStore,
};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Matching policy knobs.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// How long a request stays open for acceptance.
    pub accept_window: Duration,
    /// Price per minute applied when the category lookup fails.
    pub default_price_per_minute: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            accept_window: Duration::from_secs(60),
            default_price_per_minute: 2.0,
        }
    }
}

/// Coordinates presence, rooms, collaborators and notifications for
/// the whole request/accept/call flow.
pub struct MatchingEngine {
    presence: Arc<PresenceRegistry>,
    rooms: Arc<RoomStore>,
    registry: Arc<ClientRegistry>,
    records: Arc<dyn RecordStore>,
    payments: Arc<dyn PaymentService>,
    notifier: Arc<dyn Notifier>,
    config: MatchConfig,
}

impl MatchingEngine {
    pub fn new(
        presence: Arc<PresenceRegistry>,
        rooms: Arc<RoomStore>,
        registry: Arc<ClientRegistry>,
        records: Arc<dyn RecordStore>,
        payments: Arc<dyn PaymentService>,
        notifier: Arc<dyn Notifier>,
        config: MatchConfig,
    ) -> Self {
        Self {
            presence,
            rooms,
            registry,
            records,
            payments,
            notifier,
            config,
        }
    }

    /// Handle a translation request: find eligible translators, open
    /// a room, fan the invitation out and arm the acceptance timer.
    /// Returns the room id when a room was created.
    pub async fn submit_request(
        self: &Arc<Self>,
        requester_conn: ConnId,
        requester_id: &str,
        source_lang: &str,
        target_lang: &str,
        category: &str,
        kind: RequestKind,
    ) -> Option<RoomId> {
        counter!("signaling_requests_total").increment(1);

        let eligible = self.presence.find_eligible(source_lang, target_lang, category);
        if eligible.is_empty() {
            info!(
                "No eligible translator for {}→{}/{} from {}",
                source_lang, target_lang, category, requester_id
            );
            counter!("signaling_requests_unmatched_total").increment(1);
            self.registry.send_to(
                &requester_conn,
                ServerMessage::NoTranslatorAvailable {
                    message: "No translators available for your request".to_string(),
                },
            );
            return None;
        }

        let price_per_minute = match self.records.get_category(category).await {
            Ok(c) => c.price_per_minute,
            Err(e) => {
                warn!(
                    "Category lookup failed for {}, using default price: {}",
                    category, e
                );
                self.config.default_price_per_minute
            }
        };

        let invited: Vec<ConnId> = eligible.iter().map(|(conn, _)| *conn).collect();
        let room = Room::new(
            requester_id,
            requester_conn,
            source_lang,
            target_lang,
            category,
            price_per_minute,
            invited.clone(),
        );
        let room_id = self.rooms.insert(room);

        // Single-shot acceptance timer; aborted as soon as the room
        // leaves `waiting`, with a state check inside expire() as well.
        let engine = self.clone();
        let window = self.config.accept_window;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            engine.expire_room(room_id);
        });
        self.rooms.set_accept_timer(&room_id, timer.abort_handle());

        info!(
            "Room {} created for {} ({}→{}/{}, {:?}), inviting {} translators",
            room_id,
            requester_id,
            source_lang,
            target_lang,
            category,
            kind,
            invited.len()
        );

        self.registry.send_to(
            &requester_conn,
            ServerMessage::Searching {
                room_id,
                eligible_count: invited.len(),
            },
        );

        for (conn, translator) in &eligible {
            self.registry.send_to(
                conn,
                ServerMessage::IncomingRequest {
                    room_id,
                    requester_id: requester_id.to_string(),
                    source_lang: source_lang.to_string(),
                    target_lang: target_lang.to_string(),
                    category: category.to_string(),
                },
            );

            // Push alert alongside the live invitation; delivery is
            // best-effort and must not delay the fan-out.
            let notifier = self.notifier.clone();
            let translator_id = translator.translator_id.clone();
            let category = category.to_string();
            tokio::spawn(async move {
                notifier
                    .deliver(
                        &translator_id,
                        "Incoming translation request",
                        &format!("New {} request is waiting for you", category),
                    )
                    .await;
            });
        }

        Some(room_id)
    }

    /// Timer path: discard the room if it is still waiting.
    fn expire_room(&self, room_id: RoomId) {
        if let Some(expired) = self.rooms.expire(&room_id) {
            info!("Room {} timed out with no acceptance", room_id);
            counter!("signaling_request_timeouts_total").increment(1);
            self.registry
                .send_to(&expired.requester_conn, ServerMessage::RequestTimeout { room_id });
        }
    }

    /// Translator accepts. Exactly one concurrent accept wins; the
    /// rest are told the request is already taken.
    pub async fn accept_request(&self, translator_conn: ConnId, room_id: RoomId) {
        let Some(presence) = self.presence.translator(&translator_conn) else {
            self.registry.send_to(
                &translator_conn,
                ServerMessage::Error {
                    message: "Not registered as a translator".to_string(),
                    code: "NOT_FOUND".to_string(),
                },
            );
            return;
        };

        match self
            .rooms
            .try_accept(&room_id, &presence.translator_id, translator_conn)
        {
            AcceptOutcome::NotFound => {
                self.registry.send_to(
                    &translator_conn,
                    ServerMessage::Error {
                        message: "Room not found".to_string(),
                        code: "NOT_FOUND".to_string(),
                    },
                );
            }
            AcceptOutcome::AlreadyTaken => {
                counter!("signaling_accept_conflicts_total").increment(1);
                self.registry.send_to(
                    &translator_conn,
                    ServerMessage::Error {
                        message: "Request already accepted".to_string(),
                        code: "ALREADY_TAKEN".to_string(),
                    },
                );
            }
            AcceptOutcome::Accepted(accepted) => {
                counter!("signaling_matches_total").increment(1);
                info!(
                    "Translator {} accepted room {}",
                    presence.translator_id, room_id
                );

                self.presence.mark_busy(&translator_conn);

                // Public profile only; fall back to presence data if
                // the record store is unreachable.
                let profile = match self.records.get_translator(&presence.translator_id).await {
                    Ok(record) => TranslatorProfile {
                        id: record.id,
                        name: record.name,
                        rating: record.rating,
                    },
                    Err(e) => {
                        warn!(
                            "Profile lookup failed for {}: {}",
                            presence.translator_id, e
                        );
                        TranslatorProfile {
                            id: presence.translator_id.clone(),
                            name: presence.translator_id.clone(),
                            rating: 0.0,
                        }
                    }
                };

                self.registry.send_to(
                    &accepted.requester_conn,
                    ServerMessage::TranslatorFound {
                        room_id,
                        translator: profile,
                    },
                );

                // Withdraw the invitation from everyone who lost.
                for loser in &accepted.losers {
                    self.registry
                        .send_to(loser, ServerMessage::RequestTaken { room_id });
                }

                // Both peers start negotiation; the requester's
                // connection is the designated initiator.
                let start = ServerMessage::StartCall {
                    room_id,
                    initiator: accepted.requester_conn,
                };
                self.registry.send_to(&accepted.requester_conn, start.clone());
                self.registry.send_to(&translator_conn, start);
            }
        }
    }

    /// Advisory decline: logged, no state change. The room stays open
    /// for other translators or the timeout.
    pub fn reject_request(&self, translator_conn: ConnId, room_id: RoomId) {
        if let Some(presence) = self.presence.translator(&translator_conn) {
            info!(
                "Translator {} rejected room {}",
                presence.translator_id, room_id
            );
        } else {
            debug!("Reject from unregistered connection {}", translator_conn);
        }
    }

    /// Requester withdraws a waiting request.
    pub fn cancel_request(&self, requester_conn: ConnId, room_id: RoomId) {
        let Some(cancelled) = self.rooms.cancel(&room_id, &requester_conn) else {
            debug!(
                "Ignoring cancel for room {} (not waiting or wrong requester)",
                room_id
            );
            return;
        };
        info!("Room {} cancelled by requester", room_id);
        counter!("signaling_requests_cancelled_total").increment(1);

        let msg = ServerMessage::RequestCancelled { room_id };
        self.registry.send_to(&requester_conn, msg.clone());
        for conn in &cancelled.invited {
            self.registry.send_to(conn, msg.clone());
        }
    }

    /// A peer reports the media connection as established. The first
    /// signal activates the room and creates the persisted call
    /// record; repeats are idempotent.
    pub async fn call_connected(&self, room_id: RoomId) {
        let Some(connected) = self.rooms.mark_connected(&room_id) else {
            warn!("call-connected for unknown or unbound room {}", room_id);
            return;
        };
        if !connected.newly_active {
            debug!("Duplicate call-connected for room {}", room_id);
            return;
        }

        info!("Call started in room {}", room_id);
        counter!("signaling_calls_started_total").increment(1);

        let started = ServerMessage::CallStarted { room_id };
        self.registry.send_to(&connected.requester_conn, started.clone());
        self.registry.send_to(&connected.translator_conn, started);

        match self
            .records
            .create_call(NewCall {
                user_id: connected.requester_id,
                translator_id: connected.translator_id,
                from_lang: connected.source_lang,
                to_lang: connected.target_lang,
                category: connected.category,
                price_per_minute: connected.price_per_minute,
                status: CallStatus::Active,
            })
            .await
        {
            Ok(record) => self.rooms.set_call_record(&room_id, record.id),
            Err(e) => warn!("Failed to persist call record for room {}: {}", room_id, e),
        }
    }

    /// A peer ends the call. Peers are notified before any
    /// collaborator write, so billing persistence failure never
    /// blocks call termination delivery.
    pub async fn end_call(&self, room_id: RoomId, duration_seconds: u64) {
        let Some(ended) = self.rooms.end(&room_id, duration_seconds) else {
            warn!("end-call for unknown or non-active room {}", room_id);
            return;
        };
        let billing = ended.billing;
        info!(
            "Call ended in room {}: {}s, {} minutes billed, total {}",
            room_id, duration_seconds, billing.minutes_billed, billing.total_price
        );
        counter!("signaling_calls_completed_total").increment(1);

        self.registry.send_to(
            &ended.requester_conn,
            ServerMessage::CallEnded {
                room_id,
                duration_seconds,
                total_price: billing.total_price,
                earnings: None,
            },
        );
        if let Some(translator_conn) = ended.translator_conn {
            self.registry.send_to(
                &translator_conn,
                ServerMessage::CallEnded {
                    room_id,
                    duration_seconds,
                    total_price: billing.total_price,
                    earnings: Some(billing.translator_earnings),
                },
            );
            self.presence.mark_available(&translator_conn);
        }

        if let Some(call_id) = &ended.call_record_id {
            if let Err(e) = self
                .records
                .update_call(
                    call_id,
                    CallUpdate {
                        status: Some(CallStatus::Completed),
                        duration_seconds: Some(duration_seconds),
                        total_price: Some(billing.total_price),
                        ended_at: Some(chrono::Utc::now()),
                    },
                )
                .await
            {
                warn!("Failed to persist billing for room {}: {}", room_id, e);
            }
        } else {
            warn!("Room {} ended without a persisted call record", room_id);
        }

        // Charge the requester and alert both sides off the hot path.
        let payments = self.payments.clone();
        let requester_id = ended.requester_id.clone();
        let total = billing.total_price;
        tokio::spawn(async move {
            match payments.create_charge_intent(&requester_id, total).await {
                Ok(intent) => {
                    if let Err(e) = payments.confirm_charge(&intent.id).await {
                        warn!("Failed to confirm charge {}: {}", intent.id, e);
                    }
                }
                Err(e) => warn!("Failed to create charge intent for {}: {}", requester_id, e),
            }
        });

        let notifier = self.notifier.clone();
        let requester_id = ended.requester_id;
        let translator_id = ended.translator_id;
        let earnings = billing.translator_earnings;
        tokio::spawn(async move {
            notifier
                .deliver(
                    &requester_id,
                    "Call completed",
                    &format!("Your call cost {:.2}", total),
                )
                .await;
            notifier
                .deliver(
                    &translator_id,
                    "Call completed",
                    &format!("You earned {:.2}", earnings),
                )
                .await;
        });
    }

    /// Transport-level disconnect: remove presence, resolve every
    /// bound room, and keep the online count honest.
    pub async fn handle_disconnect(&self, conn_id: ConnId) {
        let removed = self.presence.remove(&conn_id);

        if let Some(crate::presence::Participant::Translator(translator)) = &removed {
            info!("Translator {} disconnected", translator.translator_id);
            if let Err(e) = self
                .records
                .update_translator_online(&translator.translator_id, false)
                .await
            {
                warn!(
                    "Failed to mark translator {} offline: {}",
                    translator.translator_id, e
                );
            }
            self.registry.broadcast_all(&ServerMessage::OnlineCount {
                count: self.presence.online_count(),
            });
        }

        for dropped in self.rooms.force_end_for_conn(&conn_id) {
            counter!("signaling_rooms_dropped_total").increment(1);
            match dropped.phase {
                RoomStatus::Waiting => {
                    // requester vanished before anyone accepted:
                    // withdraw the invitation everywhere
                    for conn in &dropped.invited {
                        self.registry.send_to(
                            conn,
                            ServerMessage::RequestCancelled {
                                room_id: dropped.room_id,
                            },
                        );
                    }
                }
                _ => {
                    let reason = if dropped.dropped_was_requester {
                        "User disconnected"
                    } else {
                        "Translator disconnected"
                    };
                    if let Some(other) = dropped.other_conn {
                        self.registry.send_to(
                            &other,
                            ServerMessage::PeerDisconnected {
                                reason: reason.to_string(),
                            },
                        );
                    }
                    // free the surviving translator for new requests
                    if dropped.dropped_was_requester {
                        if let Some(translator_conn) = dropped.translator_conn {
                            self.presence.mark_available(&translator_conn);
                        }
                    }
                    if let Some(call_id) = &dropped.call_record_id {
                        if let Err(e) = self
                            .records
                            .update_call(
                                call_id,
                                CallUpdate {
                                    status: Some(CallStatus::Dropped),
                                    ended_at: Some(chrono::Utc::now()),
                                    ..Default::default()
                                },
                            )
                            .await
                        {
                            warn!(
                                "Failed to mark call {} dropped for room {}: {}",
                                call_id, dropped.room_id, e
                            );
                        }
                    }
                }
            }
        }
    }
}
