//! Record types exchanged with the collaborator services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A directed language pair a translator can interpret.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LanguagePair {
    pub from: String,
    pub to: String,
}

impl LanguagePair {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Translator profile as stored by the record store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatorRecord {
    pub id: String,
    pub name: String,
    pub rating: f64,
    pub languages: Vec<LanguagePair>,
    pub categories: Vec<String>,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub total_calls: i64,
    #[serde(default)]
    pub total_minutes: i64,
}

/// Specialty category with its per-minute price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub price_per_minute: f64,
}

/// Lifecycle status of a persisted call record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Active,
    Completed,
    /// A peer disconnected before the call finished normally.
    Dropped,
}

/// Fields required to create a call record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCall {
    pub user_id: String,
    pub translator_id: String,
    pub from_lang: String,
    pub to_lang: String,
    pub category: String,
    pub price_per_minute: f64,
    pub status: CallStatus,
}

/// A persisted call record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: String,
    pub user_id: String,
    pub translator_id: String,
    pub from_lang: String,
    pub to_lang: String,
    pub category: String,
    pub price_per_minute: f64,
    pub duration_seconds: u64,
    pub total_price: f64,
    pub status: CallStatus,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Partial update applied to an existing call record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CallStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

/// A charge intent created against the payment service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeIntent {
    pub id: String,
    pub user_id: String,
    pub amount: f64,
    pub status: String,
}
