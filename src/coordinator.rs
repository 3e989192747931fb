// ===============================
// src/coordinator.rs (execution coordinator)
// ===============================
//
// State machine per signal / trade:
//
//   RECEIVED -> RISK_CHECKED -> SIZE_CHECKED -> DISPATCHED -> SETTLED
//       |             |                             |
//       +-> REJECTED  +-> REJECTED (limit)          +-> FAILED
//
// Risk gate dan backend dipanggil tanpa lock ledger; hanya commit (settle)
// yang mengambil lock per aset.
//
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::domain::{Event, ExecResult, Signal, Trade, TradeRecord};
use crate::error::ValidationError;
use crate::metrics::TRADES_BY;
use crate::positions::{PositionLedger, Reservation};
use crate::ports::ExecutionBackend;
use crate::risk::{position_size, Rejection, RiskGate};
use crate::scheduler::Clock;

/// Lifecycle of one execution. Intermediate states only show up in the
/// `debug!` trace; an `ExecOutcome` always carries `Settled`, `Rejected` or
/// `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecState { Received, RiskChecked, SizeChecked, Dispatched, Settled, Rejected, Failed }

impl ExecState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecState::Received => "received",
            ExecState::RiskChecked => "risk_checked",
            ExecState::SizeChecked => "size_checked",
            ExecState::Dispatched => "dispatched",
            ExecState::Settled => "settled",
            ExecState::Rejected => "rejected",
            ExecState::Failed => "failed",
        }
    }
}

/// Result handed back to every caller; never a panic or a bare error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecOutcome {
    pub state: ExecState,
    pub success: bool,
    pub error: Option<String>,
    pub risk_score: Option<f64>,
    pub trade: Option<Trade>,
    pub result: Option<ExecResult>,
}

impl ExecOutcome {
    fn rejected(reason: impl ToString, risk_score: Option<f64>, trade: Option<Trade>) -> Self {
        Self {
            state: ExecState::Rejected,
            success: false,
            error: Some(reason.to_string()),
            risk_score,
            trade,
            result: None,
        }
    }
}

pub struct Coordinator {
    max_position_size: f64,
    gate: RiskGate,
    backend: Arc<dyn ExecutionBackend>,
    ledger: Arc<PositionLedger>,
    clock: Arc<dyn Clock>,
    rec_tx: Option<mpsc::Sender<Event>>,
}

impl Coordinator {
    pub fn new(
        max_position_size: f64,
        gate: RiskGate,
        backend: Arc<dyn ExecutionBackend>,
        ledger: Arc<PositionLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { max_position_size, gate, backend, ledger, clock, rec_tx: None }
    }

    pub fn with_recorder(mut self, tx: mpsc::Sender<Event>) -> Self {
        self.rec_tx = Some(tx);
        self
    }

    fn record(&self, state: ExecState, trade: &Trade, error: Option<String>) {
        TRADES_BY.with_label_values(&[state.as_str()]).inc();
        if let Some(tx) = &self.rec_tx {
            // recorder lambat tidak boleh menahan eksekusi
            let _ = tx.try_send(Event::Trade { state: state.as_str().to_string(), trade: trade.clone(), error });
        }
    }

    fn reject_signal(&self, sig: &Signal, reason: &Rejection, risk_score: Option<f64>) -> ExecOutcome {
        warn!(asset = %sig.asset, venue = %sig.venue, reason = %reason, "signal rejected");
        TRADES_BY.with_label_values(&[ExecState::Rejected.as_str()]).inc();
        if let Some(tx) = &self.rec_tx {
            let _ = tx.try_send(Event::Rejected { signal: sig.clone(), reason: reason.to_string(), risk_score });
        }
        ExecOutcome::rejected(reason, risk_score, None)
    }

    fn trace(&self, state: ExecState, asset: &str) {
        debug!(state = state.as_str(), %asset, "execution step");
    }

    /// Full pipeline for one signal: risk, limit, size, dispatch, settle.
    pub async fn process_signal(&self, sig: &Signal) -> ExecOutcome {
        self.trace(ExecState::Received, &sig.asset);
        let side = match sig.validate().and_then(|_| sig.direction.side().ok_or(ValidationError::NotTradable)) {
            Ok(side) => side,
            Err(e) => return self.reject_signal(sig, &Rejection::Invalid(e.to_string()), None),
        };

        let assessment = match self.gate.check_signal(sig).await {
            Ok(a) => a,
            Err(r) => {
                let score = match &r { Rejection::HighRisk { score } => Some(*score), _ => None };
                return self.reject_signal(sig, &r, score);
            }
        };
        self.trace(ExecState::RiskChecked, &sig.asset);

        // limit check sengaja pakai ukuran tanpa risk multiplier (upper bound)
        let unadjusted = position_size(self.max_position_size, sig.confidence, None);
        let reservation = match self.ledger.reserve(&sig.asset, unadjusted, self.max_position_size) {
            Ok(r) => r,
            Err(r) => return self.reject_signal(sig, &r, Some(assessment.score)),
        };

        let amount = position_size(self.max_position_size, sig.confidence, Some(&assessment));
        self.trace(ExecState::SizeChecked, &sig.asset);
        let trade = Trade::from_signal(sig, side, amount);
        if let Err(e) = trade.validate() {
            // mis. risk score 100 -> size 0
            let out = ExecOutcome::rejected(e, Some(assessment.score), Some(trade.clone()));
            self.record(ExecState::Rejected, &trade, out.error.clone());
            return out;
        }

        let mut out = self.dispatch(trade, Some(reservation)).await;
        out.risk_score = Some(assessment.score);
        out
    }

    /// Ad hoc execution: risk gate then dispatch, no position-limit check.
    pub async fn execute_trade(&self, trade: Trade) -> ExecOutcome {
        if let Err(e) = trade.validate() {
            warn!(asset = %trade.asset, error = %e, "invalid trade");
            let out = ExecOutcome::rejected(e, None, Some(trade.clone()));
            self.record(ExecState::Rejected, &trade, out.error.clone());
            return out;
        }

        let assessment = match self.gate.check_trade(&trade).await {
            Ok(a) => a,
            Err(r) => {
                let score = match &r { Rejection::HighRisk { score } => Some(*score), _ => None };
                let out = ExecOutcome::rejected(&r, score, Some(trade.clone()));
                self.record(ExecState::Rejected, &trade, out.error.clone());
                return out;
            }
        };

        let mut out = self.dispatch(trade, None).await;
        out.risk_score = Some(assessment.score);
        out
    }

    async fn dispatch(&self, trade: Trade, reservation: Option<Reservation>) -> ExecOutcome {
        self.trace(ExecState::Dispatched, &trade.asset);
        let res = match self.backend.submit_trade(&trade).await {
            Ok(res) if res.success => res,
            Ok(res) => {
                let msg = res.error.clone().unwrap_or_else(|| "backend reported failure".to_string());
                return self.fail(trade, msg, Some(res));
            }
            Err(e) => return self.fail(trade, e.to_string(), None),
        };

        // SETTLED
        let record = TradeRecord::new(self.clock.now(), &trade, res.clone());
        let closing = self.ledger.settle(&trade, record, reservation);
        info!(
            asset = %trade.asset,
            venue = %trade.venue,
            side = ?trade.side,
            amount = trade.amount,
            price = trade.price,
            tx = ?res.tx_id,
            ?closing,
            "trade settled"
        );
        self.record(ExecState::Settled, &trade, None);

        ExecOutcome {
            state: ExecState::Settled,
            success: true,
            error: None,
            risk_score: None,
            trade: Some(trade),
            result: Some(res),
        }
    }

    fn fail(&self, trade: Trade, msg: String, res: Option<ExecResult>) -> ExecOutcome {
        error!(asset = %trade.asset, venue = %trade.venue, error = %msg, "trade execution failed");
        self.record(ExecState::Failed, &trade, Some(msg.clone()));
        ExecOutcome {
            state: ExecState::Failed,
            success: false,
            error: Some(msg),
            risk_score: None,
            trade: Some(trade),
            result: res,
        }
    }
}
