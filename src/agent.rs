// ===============================
// src/agent.rs (agent facade)
// ===============================
//
// Merangkai semua komponen: feed -> strategy -> coordinator -> ledger ->
// performance, plus arbitrage scan. State agent dimiliki eksplisit di sini
// (bukan global) dan dibagikan lewat Arc.
//
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::arbitrage::{self, OpportunityCache};
use crate::config::AgentConfig;
use crate::coordinator::{Coordinator, ExecOutcome, ExecState};
use crate::domain::{
    AgentStatus, ArbitrageOpportunity, CycleReport, Event, MarketSnapshot, PerformanceMetrics, Signal, Stage,
    Trade, TradeRecord, Venue,
};
use crate::error::ValidationError;
use crate::metrics::ARB_OPPORTUNITIES;
use crate::performance::{ratios, MetricsAggregator};
use crate::ports::{ExecutionBackend, MarketData, RiskAssessor, Scorer};
use crate::positions::{Position, PositionLedger};
use crate::risk::RiskGate;
use crate::scheduler::{self, Clock, CycleRunner, LoopCfg};
use crate::strategy::{self, SignalGenerator};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// External capabilities the agent is wired with.
#[derive(Clone)]
pub struct Collaborators {
    pub market: Arc<dyn MarketData>,
    pub scorer: Option<Arc<dyn Scorer>>,
    pub risk: Arc<dyn RiskAssessor>,
    pub backend: Arc<dyn ExecutionBackend>,
}

pub struct Agent {
    cfg: AgentConfig,
    market: Arc<dyn MarketData>,
    generator: SignalGenerator,
    coordinator: Coordinator,
    ledger: Arc<PositionLedger>,
    arb_cache: Mutex<OpportunityCache>,
    aggregator: Mutex<MetricsAggregator>,
    clock: Arc<dyn Clock>,
    running: AtomicBool,
    stop_tx: watch::Sender<bool>,
    rec_tx: Option<mpsc::Sender<Event>>,
}

impl Agent {
    pub fn new(
        cfg: AgentConfig,
        collab: Collaborators,
        clock: Arc<dyn Clock>,
        rec_tx: Option<mpsc::Sender<Event>>,
    ) -> Self {
        let ledger = Arc::new(PositionLedger::new(cfg.trade_log_cap));
        let mut coordinator = Coordinator::new(
            cfg.max_position_size,
            RiskGate::new(collab.risk),
            collab.backend,
            ledger.clone(),
            clock.clone(),
        );
        if let Some(tx) = &rec_tx {
            coordinator = coordinator.with_recorder(tx.clone());
        }
        let (stop_tx, _) = watch::channel(false);

        Self {
            generator: SignalGenerator::new(collab.scorer, cfg.model_threshold),
            market: collab.market,
            coordinator,
            ledger,
            arb_cache: Mutex::new(OpportunityCache::new(cfg.arb_ttl)),
            aggregator: Mutex::new(MetricsAggregator::new(cfg.metrics_ttl, cfg.max_drawdown)),
            clock,
            running: AtomicBool::new(false),
            stop_tx,
            rec_tx,
            cfg,
        }
    }

    fn emit(&self, ev: Event) {
        if let Some(tx) = &self.rec_tx {
            let _ = tx.try_send(ev);
        }
    }

    // ---- core-exposed interfaces ----

    pub fn get_status(&self) -> AgentStatus {
        let counts = self.ledger.counts();
        let (_, sharpe_proxy) = ratios(counts);
        AgentStatus {
            running: self.running.load(Ordering::SeqCst),
            total_trades: counts.total,
            total_pnl: self.ledger.total_pnl(),
            max_drawdown: lock(&self.aggregator).current().max_drawdown,
            sharpe_proxy,
            active_positions: self.ledger.active_positions(),
            last_update: self.clock.now(),
        }
    }

    /// Best rule signal for an ad hoc snapshot, or `hold`.
    pub fn generate_signal(&self, snapshot: &MarketSnapshot) -> Result<Signal, ValidationError> {
        snapshot.validate()?;
        Ok(strategy::best_signal(snapshot))
    }

    pub async fn execute_trade(&self, trade: Trade) -> ExecOutcome {
        self.coordinator.execute_trade(trade).await
    }

    pub async fn process_signal(&self, signal: &Signal) -> ExecOutcome {
        self.coordinator.process_signal(signal).await
    }

    /// Cached scan result; empty once the TTL has passed.
    pub fn get_arbitrage_opportunities(&self) -> Vec<ArbitrageOpportunity> {
        lock(&self.arb_cache).get(self.clock.now())
    }

    pub fn published_metrics(&self) -> Option<PerformanceMetrics> {
        lock(&self.aggregator).published(self.clock.now())
    }

    pub fn positions(&self) -> Vec<(String, Position)> { self.ledger.snapshot() }

    pub fn recent_trades(&self, n: usize) -> Vec<TradeRecord> { self.ledger.recent_trades(n) }

    pub fn config(&self) -> &AgentConfig { &self.cfg }

    // ---- monitoring loop ----

    /// Claim the loop and return its future; the loop runs until `stop()`
    /// (or `max_cycles`). Only one loop may run.
    ///
    /// The stop flag is cleared here, at call time, so a `stop()` issued
    /// after this call but before the future is first polled still counts.
    pub fn run_monitoring(self: Arc<Self>, max_cycles: Option<u64>) -> impl Future<Output = u64> + Send + 'static {
        let claimed = self.running.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok();
        if claimed {
            self.stop_tx.send_replace(false);
        }
        let stop_rx = self.stop_tx.subscribe();

        async move {
            if !claimed {
                warn!("monitoring loop already running");
                return 0;
            }
            let loop_cfg = LoopCfg { tick: self.cfg.tick, cooldown: self.cfg.cooldown, max_cycles };
            self.emit(Event::Note("monitoring started".to_string()));

            let cycles = scheduler::run(self.clone(), self.clock.clone(), loop_cfg, stop_rx).await;
            self.running.store(false, Ordering::SeqCst);
            self.emit(Event::Note(format!("monitoring stopped after {cycles} cycles")));
            cycles
        }
    }

    /// Request a stop; the in-flight cycle completes first.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
        info!("agent stop requested");
    }

    pub fn is_running(&self) -> bool { self.running.load(Ordering::SeqCst) }

    // ---- cycle stages ----

    async fn fetch_snapshots(&self, report: &mut CycleReport) -> Vec<MarketSnapshot> {
        let fetches = Venue::ALL.iter().map(|&v| async move { (v, self.market.fetch_snapshots(v).await) });
        let mut snaps = Vec::new();
        let mut venues_ok = 0;

        for (venue, res) in join_all(fetches).await {
            match res {
                Ok(batch) => {
                    venues_ok += 1;
                    for s in batch {
                        match s.validate() {
                            Ok(()) => snaps.push(s),
                            Err(e) => {
                                warn!(%venue, asset = %s.asset, error = %e, "dropping malformed snapshot");
                                report.push(Stage::Fetch, format!("{venue}/{}", s.asset), e);
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(%venue, error = %e, "market data fetch failed");
                    report.push(Stage::Fetch, venue.as_str(), e);
                }
            }
        }
        report.starved = venues_ok == 0;
        snaps
    }

    async fn scan_arbitrage(&self, report: &mut CycleReport) {
        let (a, b) = tokio::join!(
            self.market.price_map(Venue::ChainA),
            self.market.price_map(Venue::ChainB)
        );
        let (a, b) = match (a, b) {
            (Ok(a), Ok(b)) => (a, b),
            (a, b) => {
                for (venue, res) in [(Venue::ChainA, a), (Venue::ChainB, b)] {
                    if let Err(e) = res {
                        warn!(%venue, error = %e, "price map unavailable, arbitrage scan skipped");
                        report.push(Stage::PriceMap, venue.as_str(), e);
                    }
                }
                return;
            }
        };

        let now = self.clock.now();
        let opps = arbitrage::scan(&a, &b, self.cfg.arbitrage_threshold, now);
        report.opportunities = opps.len();
        ARB_OPPORTUNITIES.set(opps.len() as i64);
        if !opps.is_empty() {
            info!(n = opps.len(), "arbitrage opportunities found");
            self.emit(Event::Arb(opps.clone()));
        }
        lock(&self.arb_cache).store(opps, now);
    }
}

#[async_trait]
impl CycleRunner for Agent {
    /// fetch -> signal -> decide -> arbitrage scan -> metrics
    async fn run_cycle(&self, cycle: u64) -> CycleReport {
        let mut report = CycleReport { cycle, ..Default::default() };

        let snaps = self.fetch_snapshots(&mut report).await;
        report.snapshots = snaps.len();

        let mut signals = Vec::new();
        for s in &snaps {
            let batch = self.generator.generate(s).await;
            if let Some(e) = batch.scorer_error {
                report.push(Stage::Score, format!("{}/{}", s.venue, s.asset), e);
            }
            signals.extend(batch.signals);
        }
        report.signals = signals.len();

        // berurutan: satu signal selesai sebelum berikutnya
        for sig in &signals {
            self.emit(Event::Sig(sig.clone()));
            let out = self.coordinator.process_signal(sig).await;
            match out.state {
                ExecState::Settled => report.settled += 1,
                ExecState::Rejected => report.rejected += 1,
                _ => {
                    report.failed += 1;
                    report.push(
                        Stage::Execute,
                        format!("{}/{}", sig.venue, sig.asset),
                        out.error.unwrap_or_default(),
                    );
                }
            }
        }

        self.scan_arbitrage(&mut report).await;

        let metrics = lock(&self.aggregator).refresh(&self.ledger, self.clock.now());
        debug!(
            cycle,
            snapshots = report.snapshots,
            signals = report.signals,
            settled = report.settled,
            rejected = report.rejected,
            failed = report.failed,
            total_pnl = metrics.total_pnl,
            "cycle done"
        );
        self.emit(Event::Cycle(report.clone()));
        report
    }
}
