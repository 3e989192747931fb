// ===============================
// src/main.rs
// ===============================
/*
 # jalankan dengan mock collaborators, 1 cycle/detik
 RUST_LOG=info ASSETS=SEI,USDC,WETH cargo run --release

 # cek metrics
 curl -s localhost:9899/metrics | egrep '^(cycles_total|trades_total_by|pnl_total|arb_opportunities)'
*/
/*
=============================================================================
Project : xchain_agent_rust — async cross-chain trading agent in Rust
Module  : main.rs
Version : 0.1.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
Email   : kukuhtw@gmail.com
WhatsApp: https://wa.me/628129893706
LinkedIn: https://id.linkedin.com/in/kukuhtw
License : MIT (see LICENSE)

Summary : Watches indicator snapshots on two chains, turns them into
          rule/model signals, gates them through risk, sizes and dispatches
          trades, tracks positions/PnL, scans cross-chain arbitrage,
          exposes Prometheus metrics, and records JSONL events.

(c) 2025 Kukuh TW. All rights reserved where applicable.
=============================================================================
*/
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use xchain_agent::config::{self, Cli};
use xchain_agent::domain::Event;
use xchain_agent::feed::{MockMarket, TrendScorer};
use xchain_agent::gateway::MockGateway;
use xchain_agent::risk::HeuristicAssessor;
use xchain_agent::scheduler::SystemClock;
use xchain_agent::{metrics, recorder, Agent, Collaborators};

#[tokio::main]
async fn main() -> ExitCode {
    // ---- Logging ----
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ---- Load config ----
    let (args, cfg) = match config::load(Cli::parse()) {
        Ok(v) => v,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    info!(
        assets = ?args.assets,
        max_position_size = cfg.max_position_size,
        arbitrage_threshold = cfg.arbitrage_threshold,
        tick_ms = cfg.tick.as_millis() as u64,
        fill_ms = args.fill_ms,
        reject_rate = args.reject_rate,
        "startup config"
    );

    // ---- Metrics ----
    metrics::init();
    metrics::serve_metrics(args.metrics_port);

    // ---- Recorder (optional) ----
    let rec_tx = args.record_file.clone().map(|path| {
        let (tx, rx) = mpsc::channel::<Event>(8192);
        tokio::spawn(recorder::run(rx, path));
        tx
    });

    // ---- Collaborators (mock) ----
    let collab = Collaborators {
        market: Arc::new(MockMarket::new(args.assets.clone())),
        scorer: Some(Arc::new(TrendScorer::default())),
        risk: Arc::new(HeuristicAssessor::new(cfg.max_position_size)),
        backend: Arc::new(MockGateway::new(args.fill_ms, args.reject_rate)),
    };

    let agent = Arc::new(Agent::new(cfg, collab, Arc::new(SystemClock), rec_tx));

    // ---- Monitoring loop ----
    let mut loop_handle = tokio::spawn(agent.clone().run_monitoring(args.max_cycles));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("ctrl-c received, finishing current cycle");
            agent.stop();
        }
        _ = &mut loop_handle => {}
    }
    if !loop_handle.is_finished() {
        if let Err(e) = (&mut loop_handle).await {
            error!(?e, "monitoring loop task failed");
        }
    }

    let status = agent.get_status();
    info!(
        total_trades = status.total_trades,
        total_pnl = status.total_pnl,
        max_drawdown = status.max_drawdown,
        sharpe_proxy = status.sharpe_proxy,
        active_positions = status.active_positions,
        opportunities = agent.get_arbitrage_opportunities().len(),
        "agent stopped"
    );
    ExitCode::SUCCESS
}
