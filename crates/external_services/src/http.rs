//! HTTP-backed collaborator clients.
//!
//! Thin reqwest clients against the platform backend's REST API.

use crate::error::{Error, Result};
use crate::traits::{PaymentService, RecordStore};
use crate::types::{CallRecord, CallUpdate, Category, ChargeIntent, NewCall, TranslatorRecord};
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

/// Record store client against the platform backend.
#[derive(Debug, Clone)]
pub struct HttpRecordStore {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRecordStore {
    /// Create a client against the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!("GET {}", url);
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Api(format!(
                "GET {} returned status {}",
                url,
                response.status()
            )));
        }
        Ok(response.json().await?)
    }
}

#[derive(Serialize)]
struct OnlineUpdate {
    is_online: bool,
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    async fn get_translator(&self, id: &str) -> Result<TranslatorRecord> {
        let url = format!("{}/api/translators/{}", self.base_url, id);
        self.get_json(&url).await
    }

    async fn update_translator_online(&self, id: &str, online: bool) -> Result<()> {
        let url = format!("{}/api/translators/{}/online", self.base_url, id);
        debug!("PATCH {} is_online={}", url, online);
        let response = self
            .http
            .patch(&url)
            .json(&OnlineUpdate { is_online: online })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::Api(format!(
                "PATCH {} returned status {}",
                url,
                response.status()
            )));
        }
        Ok(())
    }

    async fn get_category(&self, id: &str) -> Result<Category> {
        let url = format!("{}/api/categories/{}", self.base_url, id);
        self.get_json(&url).await
    }

    async fn create_call(&self, call: NewCall) -> Result<CallRecord> {
        let url = format!("{}/api/calls", self.base_url);
        debug!("POST {}", url);
        let response = self.http.post(&url).json(&call).send().await?;
        if !response.status().is_success() {
            return Err(Error::Api(format!(
                "POST {} returned status {}",
                url,
                response.status()
            )));
        }
        Ok(response.json().await?)
    }

    async fn update_call(&self, id: &str, update: CallUpdate) -> Result<CallRecord> {
        let url = format!("{}/api/calls/{}", self.base_url, id);
        debug!("PATCH {}", url);
        let response = self.http.patch(&url).json(&update).send().await?;
        if !response.status().is_success() {
            return Err(Error::Api(format!(
                "PATCH {} returned status {}",
                url,
                response.status()
            )));
        }
        Ok(response.json().await?)
    }
}

/// Payment service client against the platform backend.
#[derive(Debug, Clone)]
pub struct HttpPaymentService {
    http: reqwest::Client,
    base_url: String,
}

impl HttpPaymentService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[derive(Serialize)]
struct NewChargeIntent<'a> {
    user_id: &'a str,
    amount: f64,
}

#[async_trait]
impl PaymentService for HttpPaymentService {
    async fn create_charge_intent(&self, user_id: &str, amount: f64) -> Result<ChargeIntent> {
        let url = format!("{}/api/payments/charge-intents", self.base_url);
        debug!("POST {} user={} amount={}", url, user_id, amount);
        let response = self
            .http
            .post(&url)
            .json(&NewChargeIntent { user_id, amount })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::Api(format!(
                "POST {} returned status {}",
                url,
                response.status()
            )));
        }
        Ok(response.json().await?)
    }

    async fn confirm_charge(&self, intent_id: &str) -> Result<ChargeIntent> {
        let url = format!(
            "{}/api/payments/charge-intents/{}/confirm",
            self.base_url, intent_id
        );
        debug!("POST {}", url);
        let response = self.http.post(&url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Api(format!(
                "POST {} returned status {}",
                url,
                response.status()
            )));
        }
        Ok(response.json().await?)
    }
}
