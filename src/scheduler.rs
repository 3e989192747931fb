// ===============================
// src/scheduler.rs (monitoring loop)
// ===============================
//
// Satu loop per proses: jalankan cycle, tidur `tick`, ulangi.
// Cycle yang degraded (tidak ada market data sama sekali, atau panic)
// diikuti cooldown yang lebih panjang. Loop hanya berhenti lewat stop
// signal (atau `max_cycles`), dan cycle yang sedang jalan selalu selesai dulu.
//
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::domain::{CycleReport, Stage};
use crate::metrics::{CYCLES, CYCLE_FAILURES};

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    async fn sleep(&self, d: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> { Utc::now() }
    async fn sleep(&self, d: Duration) { tokio::time::sleep(d).await }
}

/// Deterministic clock: `sleep` advances virtual time and records the request.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start), sleeps: Mutex::new(Vec::new()) }
    }

    pub fn advance(&self, d: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::zero());
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> { *self.now.lock().unwrap_or_else(PoisonError::into_inner) }

    async fn sleep(&self, d: Duration) {
        self.sleeps.lock().unwrap_or_else(PoisonError::into_inner).push(d);
        self.advance(d);
        tokio::task::yield_now().await;
    }
}

/// One discrete unit of work driven by the loop.
#[async_trait]
pub trait CycleRunner: Send + Sync + 'static {
    async fn run_cycle(&self, cycle: u64) -> CycleReport;
}

#[derive(Debug, Clone)]
pub struct LoopCfg {
    pub tick: Duration,
    pub cooldown: Duration,
    pub max_cycles: Option<u64>,
}

/// Drive cycles until stopped. Returns the number of cycles run.
pub async fn run<R: CycleRunner>(
    runner: Arc<R>,
    clock: Arc<dyn Clock>,
    cfg: LoopCfg,
    mut stop_rx: watch::Receiver<bool>,
) -> u64 {
    info!(tick_ms = cfg.tick.as_millis() as u64, cooldown_ms = cfg.cooldown.as_millis() as u64, "monitoring loop started");
    let mut cycle: u64 = 0;

    loop {
        if *stop_rx.borrow() {
            break;
        }
        cycle += 1;

        // spawn: panic di dalam cycle tidak boleh mematikan loop
        let r = runner.clone();
        let report = match tokio::spawn(async move { r.run_cycle(cycle).await }).await {
            Ok(rep) => rep,
            Err(e) => {
                let mut rep = CycleReport { cycle, ..Default::default() };
                rep.push(Stage::Panic, "cycle", &e);
                rep
            }
        };

        CYCLES.inc();
        for f in &report.failures {
            CYCLE_FAILURES.with_label_values(&[f.stage.as_str()]).inc();
        }

        let pause = if report.is_degraded() {
            error!(cycle, failures = ?report.failures, "cycle degraded, cooling down");
            cfg.cooldown
        } else {
            if !report.failures.is_empty() {
                warn!(cycle, failures = report.failures.len(), "cycle finished with collaborator failures");
            }
            cfg.tick
        };

        if matches!(cfg.max_cycles, Some(m) if cycle >= m) {
            break;
        }

        tokio::select! {
            _ = clock.sleep(pause) => {}
            changed = stop_rx.changed() => {
                // sender hilang = tidak ada yang bisa restart; berhenti
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    info!(cycles = cycle, "monitoring loop stopped");
    cycle
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Cycle `n` is degraded when `n` is in `bad`; cycle `panic_on` panics.
    struct Scripted {
        bad: Vec<u64>,
        panic_on: Option<u64>,
        runs: AtomicU64,
    }

    #[async_trait]
    impl CycleRunner for Scripted {
        async fn run_cycle(&self, cycle: u64) -> CycleReport {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.panic_on == Some(cycle) {
                panic!("boom");
            }
            CycleReport { cycle, starved: self.bad.contains(&cycle), ..Default::default() }
        }
    }

    fn cfg(max: u64) -> LoopCfg {
        LoopCfg { tick: Duration::from_secs(1), cooldown: Duration::from_secs(5), max_cycles: Some(max) }
    }

    #[tokio::test]
    async fn tick_and_cooldown_follow_cycle_health() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let runner = Arc::new(Scripted { bad: vec![2], panic_on: None, runs: AtomicU64::new(0) });
        let (_tx, rx) = watch::channel(false);

        let n = run(runner.clone(), clock.clone(), cfg(4), rx).await;

        assert_eq!(n, 4);
        assert_eq!(runner.runs.load(Ordering::SeqCst), 4);
        // no sleep after the final cycle
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(1), Duration::from_secs(5), Duration::from_secs(1)]
        );
    }

    #[tokio::test]
    async fn panicking_cycle_does_not_end_the_loop() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let runner = Arc::new(Scripted { bad: vec![], panic_on: Some(1), runs: AtomicU64::new(0) });
        let (_tx, rx) = watch::channel(false);

        let n = run(runner.clone(), clock.clone(), cfg(3), rx).await;

        assert_eq!(n, 3);
        assert_eq!(clock.sleeps()[0], Duration::from_secs(5));
    }

    #[tokio::test]
    async fn stop_before_start_runs_nothing() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let runner = Arc::new(Scripted { bad: vec![], panic_on: None, runs: AtomicU64::new(0) });
        let (_tx, rx) = watch::channel(true);

        assert_eq!(run(runner.clone(), clock, cfg(10), rx).await, 0);
        assert_eq!(runner.runs.load(Ordering::SeqCst), 0);
    }

    /// Blocks mid-cycle until released, then marks the cycle complete.
    #[derive(Default)]
    struct Gated {
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
        completed: AtomicU64,
    }

    #[async_trait]
    impl CycleRunner for Gated {
        async fn run_cycle(&self, cycle: u64) -> CycleReport {
            self.entered.notify_one();
            self.release.notified().await;
            self.completed.fetch_add(1, Ordering::SeqCst);
            CycleReport { cycle, ..Default::default() }
        }
    }

    #[tokio::test]
    async fn stop_lets_the_in_flight_cycle_finish() {
        let runner = Arc::new(Gated::default());
        let (tx, rx) = watch::channel(false);
        let loop_cfg = LoopCfg { tick: Duration::from_secs(1), cooldown: Duration::from_secs(5), max_cycles: None };
        let handle = tokio::spawn(run(runner.clone(), Arc::new(ManualClock::new(Utc::now())), loop_cfg, rx));

        runner.entered.notified().await;
        tx.send(true).unwrap();
        runner.release.notify_one();

        let n = tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
        assert_eq!(n, 1);
        assert_eq!(runner.completed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_signal_halts_a_running_loop() {
        let runner = Arc::new(Scripted { bad: vec![], panic_on: None, runs: AtomicU64::new(0) });
        let (tx, rx) = watch::channel(false);
        let loop_cfg = LoopCfg { tick: Duration::from_millis(10), cooldown: Duration::from_millis(10), max_cycles: None };
        let handle = tokio::spawn(run(runner.clone(), Arc::new(SystemClock), loop_cfg, rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        let n = tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
        assert!(n >= 1);
        assert_eq!(runner.runs.load(Ordering::SeqCst), n);
    }
}
