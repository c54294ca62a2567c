//! Error types for collaborator services.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Translator not found: {0}")]
    TranslatorNotFound(String),

    #[error("Category not found: {0}")]
    CategoryNotFound(String),

    #[error("Call not found: {0}")]
    CallNotFound(String),

    #[error("Charge intent not found: {0}")]
    ChargeIntentNotFound(String),

    #[error("API error: {0}")]
    Api(String),
}

pub type Result<T> = std::result::Result<T, Error>;
