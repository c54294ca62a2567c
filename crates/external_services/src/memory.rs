//! In-memory collaborator implementations.
//!
//! Used by tests and local development runs where no platform backend
//! is available.

use crate::error::{Error, Result};
use crate::traits::{Notifier, PaymentService, RecordStore};
use crate::types::{
    CallRecord, CallStatus, CallUpdate, Category, ChargeIntent, NewCall, TranslatorRecord,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

/// Record store backed by in-process maps.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    translators: DashMap<String, TranslatorRecord>,
    categories: DashMap<String, Category>,
    calls: DashMap<String, CallRecord>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_translator(&self, translator: TranslatorRecord) {
        self.translators.insert(translator.id.clone(), translator);
    }

    pub fn insert_category(&self, category: Category) {
        self.categories.insert(category.id.clone(), category);
    }

    pub fn get_call(&self, id: &str) -> Option<CallRecord> {
        self.calls.get(id).map(|c| c.clone())
    }

    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    pub fn calls_with_status(&self, status: CallStatus) -> Vec<CallRecord> {
        self.calls
            .iter()
            .filter(|entry| entry.value().status == status)
            .map(|entry| entry.value().clone())
            .collect()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get_translator(&self, id: &str) -> Result<TranslatorRecord> {
        self.translators
            .get(id)
            .map(|t| t.clone())
            .ok_or_else(|| Error::TranslatorNotFound(id.to_string()))
    }

    async fn update_translator_online(&self, id: &str, online: bool) -> Result<()> {
        let mut translator = self
            .translators
            .get_mut(id)
            .ok_or_else(|| Error::TranslatorNotFound(id.to_string()))?;
        translator.is_online = online;
        Ok(())
    }

    async fn get_category(&self, id: &str) -> Result<Category> {
        self.categories
            .get(id)
            .map(|c| c.clone())
            .ok_or_else(|| Error::CategoryNotFound(id.to_string()))
    }

    async fn create_call(&self, call: NewCall) -> Result<CallRecord> {
        let record = CallRecord {
            id: Uuid::new_v4().to_string(),
            user_id: call.user_id,
            translator_id: call.translator_id,
            from_lang: call.from_lang,
            to_lang: call.to_lang,
            category: call.category,
            price_per_minute: call.price_per_minute,
            duration_seconds: 0,
            total_price: 0.0,
            status: call.status,
            created_at: Utc::now(),
            ended_at: None,
        };
        self.calls.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn update_call(&self, id: &str, update: CallUpdate) -> Result<CallRecord> {
        let mut call = self
            .calls
            .get_mut(id)
            .ok_or_else(|| Error::CallNotFound(id.to_string()))?;
        if let Some(status) = update.status {
            call.status = status;
        }
        if let Some(duration) = update.duration_seconds {
            call.duration_seconds = duration;
        }
        if let Some(total) = update.total_price {
            call.total_price = total;
        }
        if let Some(ended_at) = update.ended_at {
            call.ended_at = Some(ended_at);
        }
        Ok(call.clone())
    }
}

/// Payment service backed by an in-process map.
#[derive(Debug, Default)]
pub struct MemoryPaymentService {
    intents: DashMap<String, ChargeIntent>,
}

impl MemoryPaymentService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intent_count(&self) -> usize {
        self.intents.len()
    }
}

#[async_trait]
impl PaymentService for MemoryPaymentService {
    async fn create_charge_intent(&self, user_id: &str, amount: f64) -> Result<ChargeIntent> {
        let intent = ChargeIntent {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            amount,
            status: "created".to_string(),
        };
        self.intents.insert(intent.id.clone(), intent.clone());
        Ok(intent)
    }

    async fn confirm_charge(&self, intent_id: &str) -> Result<ChargeIntent> {
        let mut intent = self
            .intents
            .get_mut(intent_id)
            .ok_or_else(|| Error::ChargeIntentNotFound(intent_id.to_string()))?;
        intent.status = "confirmed".to_string();
        Ok(intent.clone())
    }
}

/// Notifier that only logs deliveries.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, participant_id: &str, title: &str, body: &str) {
        info!("Notification to {}: {} - {}", participant_id, title, body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LanguagePair;

    fn make_translator(id: &str) -> TranslatorRecord {
        TranslatorRecord {
            id: id.to_string(),
            name: format!("Translator {}", id),
            rating: 5.0,
            languages: vec![LanguagePair::new("ka", "en")],
            categories: vec!["general".to_string()],
            is_online: false,
            total_calls: 0,
            total_minutes: 0,
        }
    }

    #[tokio::test]
    async fn test_translator_online_round_trip() {
        let store = MemoryRecordStore::new();
        store.insert_translator(make_translator("t1"));

        store.update_translator_online("t1", true).await.unwrap();
        assert!(store.get_translator("t1").await.unwrap().is_online);

        store.update_translator_online("t1", false).await.unwrap();
        assert!(!store.get_translator("t1").await.unwrap().is_online);
    }

    #[tokio::test]
    async fn test_unknown_translator_errors() {
        let store = MemoryRecordStore::new();
        assert!(matches!(
            store.get_translator("missing").await,
            Err(Error::TranslatorNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_call_create_and_update() {
        let store = MemoryRecordStore::new();
        let record = store
            .create_call(NewCall {
                user_id: "u1".to_string(),
                translator_id: "t1".to_string(),
                from_lang: "ka".to_string(),
                to_lang: "en".to_string(),
                category: "general".to_string(),
                price_per_minute: 2.0,
                status: CallStatus::Active,
            })
            .await
            .unwrap();
        assert_eq!(record.status, CallStatus::Active);

        let updated = store
            .update_call(
                &record.id,
                CallUpdate {
                    status: Some(CallStatus::Completed),
                    duration_seconds: Some(300),
                    total_price: Some(10.0),
                    ended_at: Some(Utc::now()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, CallStatus::Completed);
        assert_eq!(updated.duration_seconds, 300);
    }

    #[tokio::test]
    async fn test_charge_intent_confirm() {
        let payments = MemoryPaymentService::new();
        let intent = payments.create_charge_intent("u1", 12.0).await.unwrap();
        assert_eq!(intent.status, "created");

        let confirmed = payments.confirm_charge(&intent.id).await.unwrap();
        assert_eq!(confirmed.status, "confirmed");
    }
}
