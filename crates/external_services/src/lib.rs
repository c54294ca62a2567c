//! Collaborator service clients for the signaling core.
//!
//! The signaling core treats persistence, payments and push
//! notifications as opaque collaborators behind traits:
//! - [`RecordStore`]: translator profiles, categories and call records
//! - [`PaymentService`]: charge intent creation and confirmation
//! - [`Notifier`]: fire-and-forget participant alerts
//!
//! Production deployments use the HTTP-backed implementations against
//! the platform backend; tests and local runs use the in-memory ones.
//!
//! # Example
//!
//! ```ignore
//! use external_services::{HttpRecordStore, RecordStore};
//!
//! let records = HttpRecordStore::new("http://localhost:8080");
//! let translator = records.get_translator("t-123").await?;
//! ```

pub mod error;
pub mod http;
pub mod memory;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use http::{HttpPaymentService, HttpRecordStore};
pub use memory::{LogNotifier, MemoryPaymentService, MemoryRecordStore};
pub use traits::{Notifier, PaymentService, RecordStore};
pub use types::{
    CallRecord, CallStatus, CallUpdate, Category, ChargeIntent, LanguagePair, NewCall,
    TranslatorRecord,
};
