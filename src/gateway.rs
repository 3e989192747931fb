// ===============================
// src/gateway.rs (mock execution backend)
// ===============================
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use tokio::time::{sleep, Duration};
use tracing::debug;

use crate::domain::{ExecResult, Trade};
use crate::error::CollabError;
use crate::ports::ExecutionBackend;

/// Simulated venue: waits `fill_ms`, then fills at the requested price or
/// rejects with probability `reject_rate`.
#[derive(Debug, Clone)]
pub struct MockGateway {
    pub fill_ms: u64,
    pub reject_rate: f64,
}

impl MockGateway {
    pub fn new(fill_ms: u64, reject_rate: f64) -> Self { Self { fill_ms, reject_rate } }
}

#[async_trait]
impl ExecutionBackend for MockGateway {
    async fn submit_trade(&self, t: &Trade) -> Result<ExecResult, CollabError> {
        sleep(Duration::from_millis(self.fill_ms)).await;

        let (rejected, nonce) = {
            let mut rng = rand::thread_rng();
            (self.reject_rate > 0.0 && rng.gen_bool(self.reject_rate.min(1.0)), rng.gen::<u32>())
        };
        if rejected {
            return Ok(ExecResult::failed("venue rejected order"));
        }

        let ts = Utc::now().timestamp_nanos_opt().unwrap_or(0);
        let tx_id = format!("TX-{}-{}-{}", t.venue, ts, nonce);
        debug!(asset = %t.asset, %tx_id, "mock fill");
        Ok(ExecResult { fill_price: Some(t.price), ..ExecResult::ok(tx_id) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Side, Venue};

    fn trade() -> Trade {
        Trade { asset: "SEI".into(), venue: Venue::ChainB, side: Side::Buy, amount: 0.01, price: 0.5, stop_loss: 0.45, confidence: 0.7 }
    }

    #[tokio::test]
    async fn fills_at_requested_price() {
        let res = MockGateway::new(0, 0.0).submit_trade(&trade()).await.unwrap();
        assert!(res.success);
        assert_eq!(res.fill_price, Some(0.5));
        assert!(res.tx_id.unwrap().starts_with("TX-chain_b-"));
    }

    #[tokio::test]
    async fn always_rejects_at_full_rate() {
        let res = MockGateway::new(0, 1.0).submit_trade(&trade()).await.unwrap();
        assert!(!res.success);
        assert!(res.error.is_some());
    }
}
