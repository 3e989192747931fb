// ===============================
// src/risk.rs
// ===============================
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::domain::{RiskAssessment, RiskLevel, Signal, Trade};
use crate::error::CollabError;
use crate::ports::RiskAssessor;

/// Alasan penolakan pre-trade (policy, bukan error sistem).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Rejection {
    #[error("high risk rejected (score {score:.1})")]
    HighRisk { score: f64 },
    #[error("risk assessment unavailable: {0}")]
    AssessorFailed(CollabError),
    #[error("position limit exceeded for {asset}: |{current:.4} + {proposed:.4}| > {max:.4}")]
    PositionLimit { asset: String, current: f64, proposed: f64, max: f64 },
    #[error("{0}")]
    Invalid(String),
}

/// `1 - score/100`, score clamped to [0,100].
pub fn risk_multiplier(a: &RiskAssessment) -> f64 {
    1.0 - a.score.clamp(0.0, 100.0) / 100.0
}

/// Trade size as a fraction of portfolio. Pure.
pub fn position_size(max_position_size: f64, confidence: f64, risk: Option<&RiskAssessment>) -> f64 {
    let base = max_position_size * confidence;
    match risk {
        Some(a) => base * risk_multiplier(a),
        None => base,
    }
}

/// Wraps the external assessor. `High` is an absolute veto.
#[derive(Clone)]
pub struct RiskGate {
    assessor: Arc<dyn RiskAssessor>,
}

impl RiskGate {
    pub fn new(assessor: Arc<dyn RiskAssessor>) -> Self { Self { assessor } }

    fn verdict(res: Result<RiskAssessment, CollabError>, asset: &str) -> Result<RiskAssessment, Rejection> {
        match res {
            Ok(a) if a.level == RiskLevel::High => {
                warn!(%asset, score = a.score, "high risk rejected");
                Err(Rejection::HighRisk { score: a.score })
            }
            Ok(a) => Ok(a),
            Err(e) => {
                warn!(%asset, error = %e, "risk assessor failed");
                Err(Rejection::AssessorFailed(e))
            }
        }
    }

    pub async fn check_signal(&self, sig: &Signal) -> Result<RiskAssessment, Rejection> {
        Self::verdict(self.assessor.assess_signal(sig).await, &sig.asset)
    }

    pub async fn check_trade(&self, trade: &Trade) -> Result<RiskAssessment, Rejection> {
        Self::verdict(self.assessor.assess_trade(trade).await, &trade.asset)
    }
}

/// Penilai risiko sederhana untuk mode mock: makin rendah confidence dan
/// makin besar porsi terhadap batas posisi, makin tinggi skornya.
#[derive(Debug, Clone)]
pub struct HeuristicAssessor {
    pub max_position_size: f64,
    pub medium_from: f64,
    pub high_from: f64,
}

impl HeuristicAssessor {
    pub fn new(max_position_size: f64) -> Self {
        Self { max_position_size, medium_from: 30.0, high_from: 70.0 }
    }

    fn level(&self, score: f64) -> RiskLevel {
        if score >= self.high_from {
            RiskLevel::High
        } else if score >= self.medium_from {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    fn assess(&self, confidence: f64, amount: f64) -> RiskAssessment {
        let exposure = if self.max_position_size > 0.0 { (amount / self.max_position_size).min(1.0) } else { 1.0 };
        let score = ((1.0 - confidence.clamp(0.0, 1.0)) * 60.0 + exposure * 40.0).clamp(0.0, 100.0);
        RiskAssessment { level: self.level(score), score }
    }
}

#[async_trait]
impl RiskAssessor for HeuristicAssessor {
    async fn assess_signal(&self, signal: &Signal) -> Result<RiskAssessment, CollabError> {
        // signal belum punya ukuran: anggap setengah batas
        Ok(self.assess(signal.confidence, self.max_position_size * 0.5))
    }

    async fn assess_trade(&self, trade: &Trade) -> Result<RiskAssessment, CollabError> {
        Ok(self.assess(trade.confidence, trade.amount))
    }
}
