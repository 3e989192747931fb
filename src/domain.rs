// ===============================
// src/domain.rs
// ===============================
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Dua venue independen (chain A / chain B) tempat aset yang sama diperdagangkan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Venue { ChainA, ChainB }

impl Venue {
    pub const ALL: [Venue; 2] = [Venue::ChainA, Venue::ChainB];

    pub fn as_str(&self) -> &'static str {
        match self { Venue::ChainA => "chain_a", Venue::ChainB => "chain_b" }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction { Buy, Sell, Hold }

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self { Direction::Buy => "buy", Direction::Sell => "sell", Direction::Hold => "hold" }
    }

    /// `Hold` tidak bisa dieksekusi.
    pub fn side(&self) -> Option<Side> {
        match self { Direction::Buy => Some(Side::Buy), Direction::Sell => Some(Side::Sell), Direction::Hold => None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side { Buy, Sell }

/// One asset on one venue at one instant. Indicators arrive precomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub ts: DateTime<Utc>,
    pub asset: String,
    pub venue: Venue,
    pub price: f64,
    pub volume_24h: f64,
    pub avg_volume: f64,
    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub bollinger_upper: f64,
    pub bollinger_lower: f64,
    pub sma_20: f64,
    pub sma_50: f64,
    pub price_change_24h: f64,
    pub volume_change_24h: f64,
}

impl MarketSnapshot {
    /// Feature vector for the predictive scorer, fixed order.
    pub fn features(&self) -> [f64; 11] {
        [
            self.price,
            self.volume_24h,
            self.rsi,
            self.macd,
            self.macd_signal,
            self.bollinger_upper,
            self.bollinger_lower,
            self.sma_20,
            self.sma_50,
            self.price_change_24h,
            self.volume_change_24h,
        ]
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.asset.trim().is_empty() {
            return Err(ValidationError::EmptyAsset);
        }
        if !self.price.is_finite() || self.price <= 0.0 {
            return Err(ValidationError::Price(self.price));
        }
        if self.features().iter().any(|x| !x.is_finite()) {
            return Err(ValidationError::NonFinite("snapshot indicator"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub asset: String,
    pub venue: Venue,
    pub direction: Direction,
    /// Scalar in [0,1] used directly for sizing.
    pub confidence: f64,
    pub reason: String,
    pub price_target: f64,
    pub stop_loss: f64,
}

impl Signal {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.asset.trim().is_empty() {
            return Err(ValidationError::EmptyAsset);
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(ValidationError::Confidence(self.confidence));
        }
        if !self.price_target.is_finite() || self.price_target <= 0.0 {
            return Err(ValidationError::Price(self.price_target));
        }
        if !self.stop_loss.is_finite() {
            return Err(ValidationError::NonFinite("stop_loss"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel { Low, Medium, High }

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment { pub level: RiskLevel, pub score: f64 }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub asset: String,
    pub venue: Venue,
    pub side: Side,
    /// Magnitude as a fraction of portfolio; the sign comes from `side`.
    pub amount: f64,
    pub price: f64,
    pub stop_loss: f64,
    pub confidence: f64,
}

impl Trade {
    pub fn from_signal(sig: &Signal, side: Side, amount: f64) -> Self {
        Self {
            asset: sig.asset.clone(),
            venue: sig.venue,
            side,
            amount,
            price: sig.price_target,
            stop_loss: sig.stop_loss,
            confidence: sig.confidence,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.asset.trim().is_empty() {
            return Err(ValidationError::EmptyAsset);
        }
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(ValidationError::Amount(self.amount));
        }
        if !self.price.is_finite() || self.price <= 0.0 {
            return Err(ValidationError::Price(self.price));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(ValidationError::Confidence(self.confidence));
        }
        Ok(())
    }
}

/// Backend answer for one submitted trade.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_price: Option<f64>,
}

impl ExecResult {
    pub fn ok(tx_id: impl Into<String>) -> Self {
        Self { success: true, tx_id: Some(tx_id.into()), ..Default::default() }
    }
    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false, error: Some(error.into()), ..Default::default() }
    }
}

/// Entry in a position's history and in the bounded global trade log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub ts: DateTime<Utc>,
    pub asset: String,
    pub venue: Venue,
    pub side: Side,
    pub amount: f64,
    pub price: f64,
    pub confidence: f64,
    pub result: ExecResult,
}

impl TradeRecord {
    pub fn new(ts: DateTime<Utc>, t: &Trade, result: ExecResult) -> Self {
        Self {
            ts,
            asset: t.asset.clone(),
            venue: t.venue,
            side: t.side,
            amount: t.amount,
            price: t.price,
            confidence: t.confidence,
            result,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbDirection { pub buy_on: Venue, pub sell_on: Venue }

impl fmt::Display for ArbDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buy_{}_sell_{}", self.buy_on, self.sell_on)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrageOpportunity {
    pub asset: String,
    pub price_a: f64,
    pub price_b: f64,
    pub price_difference: f64,
    pub direction: ArbDirection,
    pub potential_profit: f64,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_trades: u64,
    pub winning_trades: u64,
    pub losing_trades: u64,
    pub total_pnl: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    /// `win_rate * 2 - 1`; a coarse scalar in [-1,1], not a real Sharpe ratio.
    pub sharpe_proxy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub running: bool,
    pub total_trades: u64,
    pub total_pnl: f64,
    pub max_drawdown: f64,
    pub sharpe_proxy: f64,
    pub active_positions: usize,
    pub last_update: DateTime<Utc>,
}

// ---- per-cycle reporting ----
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage { Fetch, Score, Execute, PriceMap, Panic }

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Score => "score",
            Stage::Execute => "execute",
            Stage::PriceMap => "price_map",
            Stage::Panic => "panic",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleFailure { pub stage: Stage, pub context: String, pub error: String }

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub snapshots: usize,
    pub signals: usize,
    pub settled: usize,
    pub rejected: usize,
    pub failed: usize,
    pub opportunities: usize,
    pub failures: Vec<CycleFailure>,
    /// No venue produced market data this cycle.
    pub starved: bool,
}

impl CycleReport {
    pub fn push(&mut self, stage: Stage, context: impl Into<String>, error: impl fmt::Display) {
        self.failures.push(CycleFailure { stage, context: context.into(), error: error.to_string() });
    }

    /// A degraded cycle triggers the loop cooldown instead of the normal tick.
    pub fn is_degraded(&self) -> bool {
        self.starved || self.failures.iter().any(|f| f.stage == Stage::Panic)
    }
}

/// Recorder events (JSONL).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    Sig(Signal),
    Trade { state: String, trade: Trade, error: Option<String> },
    /// Signal stopped before a trade was built (invalid, risk veto, limit).
    Rejected { signal: Signal, reason: String, risk_score: Option<f64> },
    Arb(Vec<ArbitrageOpportunity>),
    Cycle(CycleReport),
    Note(String),
}
