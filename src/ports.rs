// ===============================
// src/ports.rs
// ===============================
//
// Batas kolaborator eksternal. Core hanya bergantung pada trait ini;
// implementasi mock ada di feed.rs, risk.rs, dan gateway.rs.
//
use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::domain::{ExecResult, MarketSnapshot, RiskAssessment, Signal, Trade, Venue};
use crate::error::CollabError;

/// Asset -> last price on one venue. Ordered so scans are deterministic.
pub type PriceMap = BTreeMap<String, f64>;

#[async_trait]
pub trait MarketData: Send + Sync {
    async fn fetch_snapshots(&self, venue: Venue) -> Result<Vec<MarketSnapshot>, CollabError>;
    async fn price_map(&self, venue: Venue) -> Result<PriceMap, CollabError>;
}

/// Predictive model, opaque: features in, predicted fractional price move out.
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score_price_move(&self, features: &[f64; 11]) -> Result<f64, CollabError>;
}

#[async_trait]
pub trait RiskAssessor: Send + Sync {
    async fn assess_signal(&self, signal: &Signal) -> Result<RiskAssessment, CollabError>;
    async fn assess_trade(&self, trade: &Trade) -> Result<RiskAssessment, CollabError>;
}

#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    async fn submit_trade(&self, trade: &Trade) -> Result<ExecResult, CollabError>;
}
