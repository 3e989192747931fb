// ===============================
// src/error.rs
// ===============================
use thiserror::Error;

/// Failure reported by (or about) an external collaborator.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CollabError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("collaborator timed out")]
    Timeout,
    #[error("rejected by collaborator: {0}")]
    Rejected(String),
    #[error("{0}")]
    Other(String),
}

/// Malformed input at a public entry point.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("asset must not be empty")]
    EmptyAsset,
    #[error("price must be positive and finite, got {0}")]
    Price(f64),
    #[error("amount must be positive and finite, got {0}")]
    Amount(f64),
    #[error("confidence must be within [0,1], got {0}")]
    Confidence(f64),
    #[error("non-finite value in {0}")]
    NonFinite(&'static str),
    #[error("hold signals are not tradable")]
    NotTradable,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {msg}")]
    Invalid { key: &'static str, msg: String },
}
