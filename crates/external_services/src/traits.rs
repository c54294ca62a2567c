//! Collaborator traits consumed by the signaling core.
//!
//! Each backing system (platform HTTP backend, in-memory fixture)
//! implements these to provide a unified interface, so the core never
//! depends on a concrete persistence or payment engine.

use crate::error::Result;
use crate::types::{CallRecord, CallUpdate, Category, ChargeIntent, NewCall, TranslatorRecord};
use async_trait::async_trait;

/// Read/write access to user, translator and call records.
///
/// The signaling core only needs a narrow slice of the full record
/// store: translator capability profiles at registration time,
/// category pricing at request time, and call records around call
/// start/end.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch a translator profile by id.
    async fn get_translator(&self, id: &str) -> Result<TranslatorRecord>;

    /// Reflect a translator's online/offline status.
    async fn update_translator_online(&self, id: &str, online: bool) -> Result<()>;

    /// Fetch a specialty category (carries the per-minute price).
    async fn get_category(&self, id: &str) -> Result<Category>;

    /// Create a call record, returning it with its assigned id.
    async fn create_call(&self, call: NewCall) -> Result<CallRecord>;

    /// Apply a partial update to an existing call record.
    async fn update_call(&self, id: &str, update: CallUpdate) -> Result<CallRecord>;
}

/// Opaque charge/settlement service.
#[async_trait]
pub trait PaymentService: Send + Sync {
    /// Create a charge intent for the given amount against a user.
    async fn create_charge_intent(&self, user_id: &str, amount: f64) -> Result<ChargeIntent>;

    /// Confirm a previously created charge intent.
    async fn confirm_charge(&self, intent_id: &str) -> Result<ChargeIntent>;
}

/// Fire-and-forget participant alert delivery.
///
/// No delivery guarantee is assumed; failures are the implementation's
/// problem to log.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, participant_id: &str, title: &str, body: &str);
}
