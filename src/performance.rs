// ===============================
// src/performance.rs (metrics aggregator)
// ===============================
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::arbitrage::expired;
use crate::domain::PerformanceMetrics;
use crate::metrics::{MAX_DRAWDOWN, PNL_TOTAL, WIN_RATE};
use crate::positions::{PositionLedger, TradeCounts};

/// `(win_rate, sharpe_proxy)`; zero trades gives `(0, -1)`.
pub fn ratios(c: TradeCounts) -> (f64, f64) {
    let win_rate = if c.total == 0 { 0.0 } else { c.winning as f64 / c.total as f64 };
    (win_rate, win_rate * 2.0 - 1.0)
}

/// Owned by the monitoring loop; external readers only see `published`.
#[derive(Debug)]
pub struct MetricsAggregator {
    current: PerformanceMetrics,
    peak_pnl: f64,
    drawdown_limit: f64,
    ttl: Duration,
    published: Option<(PerformanceMetrics, DateTime<Utc>)>,
}

impl MetricsAggregator {
    pub fn new(ttl: Duration, drawdown_limit: f64) -> Self {
        let current = PerformanceMetrics { sharpe_proxy: ratios(TradeCounts::default()).1, ..Default::default() };
        Self { current, peak_pnl: 0.0, drawdown_limit, ttl, published: None }
    }

    pub fn refresh(&mut self, ledger: &PositionLedger, now: DateTime<Utc>) -> PerformanceMetrics {
        let counts = ledger.counts();
        let total_pnl = ledger.total_pnl();
        let (win_rate, sharpe_proxy) = ratios(counts);

        self.peak_pnl = self.peak_pnl.max(total_pnl);
        let drawdown = self.peak_pnl - total_pnl;

        let m = &mut self.current;
        m.total_trades = counts.total;
        m.winning_trades = counts.winning;
        m.losing_trades = counts.losing;
        m.total_pnl = total_pnl;
        m.max_drawdown = m.max_drawdown.max(drawdown);
        m.win_rate = win_rate;
        m.sharpe_proxy = sharpe_proxy;

        if m.max_drawdown > self.drawdown_limit {
            warn!(max_drawdown = m.max_drawdown, limit = self.drawdown_limit, "drawdown above configured limit");
        }

        PNL_TOTAL.set(total_pnl);
        WIN_RATE.set(win_rate);
        MAX_DRAWDOWN.set(m.max_drawdown);

        self.published = Some((m.clone(), now));
        m.clone()
    }

    pub fn current(&self) -> &PerformanceMetrics { &self.current }

    /// Last published metrics, `None` once older than the staleness window.
    pub fn published(&self, now: DateTime<Utc>) -> Option<PerformanceMetrics> {
        match &self.published {
            Some((m, at)) if !expired(*at, self.ttl, now) => Some(m.clone()),
            _ => None,
        }
    }
}
