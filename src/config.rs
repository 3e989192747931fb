// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : xchain_agent_rust — async cross-chain trading agent in Rust
Module  : config.rs
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
use std::env;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use dotenvy::dotenv;

use crate::error::ConfigError;

/// Override dari command line (mengalahkan ENV).
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "xchain_agent", about = "Cross-chain signal/risk/execution agent")]
pub struct Cli {
    /// Comma separated asset universe (ENV: ASSETS)
    #[arg(long)]
    pub assets: Option<String>,
    /// Prometheus port (ENV: METRICS_PORT)
    #[arg(long)]
    pub metrics_port: Option<u16>,
    /// JSONL event file (ENV: RECORD_FILE)
    #[arg(long)]
    pub record_file: Option<String>,
    /// Stop after N cycles (ENV: MAX_CYCLES)
    #[arg(long)]
    pub max_cycles: Option<u64>,
}

/// Process-level knobs (wiring, mocks, IO).
#[derive(Clone, Debug)]
pub struct Args {
    pub assets: Vec<String>,
    pub metrics_port: u16,
    pub record_file: Option<String>,
    pub max_cycles: Option<u64>,

    // mock collaborators
    pub fill_ms: u64,
    pub reject_rate: f64,
}

/// Decision-loop parameters.
#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub max_position_size: f64,
    pub arbitrage_threshold: f64,
    pub model_threshold: f64,
    pub arb_ttl: Duration,
    pub metrics_ttl: Duration,
    pub trade_log_cap: usize,
    pub tick: Duration,
    pub cooldown: Duration,

    // batas drawdown; hanya memicu warning, tidak menghentikan loop
    pub max_drawdown: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_position_size: 0.1,
            arbitrage_threshold: 0.01,
            model_threshold: 0.02,
            arb_ttl: Duration::from_secs(60),
            metrics_ttl: Duration::from_secs(300),
            trade_log_cap: 1000,
            tick: Duration::from_secs(1),
            cooldown: Duration::from_secs(5),
            max_drawdown: 0.05,
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.max_position_size.is_finite() || self.max_position_size <= 0.0 {
            return Err(ConfigError::Invalid {
                key: "MAX_POSITION_SIZE",
                msg: format!("must be > 0, got {}", self.max_position_size),
            });
        }
        if !self.arbitrage_threshold.is_finite() || self.arbitrage_threshold < 0.0 {
            return Err(ConfigError::Invalid {
                key: "ARBITRAGE_THRESHOLD",
                msg: format!("must be >= 0, got {}", self.arbitrage_threshold),
            });
        }
        if !self.model_threshold.is_finite() || self.model_threshold < 0.0 {
            return Err(ConfigError::Invalid {
                key: "MODEL_THRESHOLD",
                msg: format!("must be >= 0, got {}", self.model_threshold),
            });
        }
        if !self.max_drawdown.is_finite() || self.max_drawdown <= 0.0 {
            return Err(ConfigError::Invalid {
                key: "MAX_DRAWDOWN",
                msg: format!("must be > 0, got {}", self.max_drawdown),
            });
        }
        if self.tick.is_zero() {
            return Err(ConfigError::Invalid { key: "TICK_MS", msg: "must be > 0".into() });
        }
        if self.trade_log_cap == 0 {
            return Err(ConfigError::Invalid { key: "TRADE_LOG_CAP", msg: "must be > 0".into() });
        }
        Ok(())
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

fn env_ms(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

pub fn parse_assets(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = raw
        .split(',')
        .map(|x| x.trim())
        .filter(|x| !x.is_empty())
        .map(|x| x.to_ascii_uppercase())
        .collect();
    out.dedup();
    out
}

pub fn load(cli: Cli) -> Result<(Args, AgentConfig), ConfigError> {
    // Pastikan .env dibaca (ASSETS, RECORD_FILE, dll)
    let _ = dotenv();

    // ===== Basic =====
    // ASSETS=SEI,USDC,WETH
    let raw_assets = cli
        .assets
        .or_else(|| env::var("ASSETS").ok())
        .unwrap_or_else(|| "SEI,USDC,WETH".to_string());
    let assets = parse_assets(&raw_assets);
    if assets.is_empty() {
        return Err(ConfigError::Invalid { key: "ASSETS", msg: "no assets configured".into() });
    }

    let reject_rate = env_or("REJECT_RATE", 0.0_f64);
    if !(0.0..=1.0).contains(&reject_rate) {
        return Err(ConfigError::Invalid {
            key: "REJECT_RATE",
            msg: format!("must be within [0,1], got {reject_rate}"),
        });
    }

    let args = Args {
        assets,
        metrics_port: cli.metrics_port.unwrap_or_else(|| env_or("METRICS_PORT", 9899)),
        record_file: cli.record_file.or_else(|| env::var("RECORD_FILE").ok()),
        max_cycles: cli.max_cycles.or_else(|| env::var("MAX_CYCLES").ok().and_then(|s| s.parse().ok())),
        fill_ms: env_or("FILL_MS", 25),
        reject_rate,
    };

    // ===== Agent =====
    let d = AgentConfig::default();
    let cfg = AgentConfig {
        max_position_size: env_or("MAX_POSITION_SIZE", d.max_position_size),
        arbitrage_threshold: env_or("ARBITRAGE_THRESHOLD", d.arbitrage_threshold),
        model_threshold: env_or("MODEL_THRESHOLD", d.model_threshold),
        arb_ttl: env_secs("ARB_TTL_SECS", d.arb_ttl),
        metrics_ttl: env_secs("METRICS_TTL_SECS", d.metrics_ttl),
        trade_log_cap: env_or("TRADE_LOG_CAP", d.trade_log_cap),
        tick: env_ms("TICK_MS", d.tick),
        cooldown: env_ms("COOLDOWN_MS", d.cooldown),
        max_drawdown: env_or("MAX_DRAWDOWN", d.max_drawdown),
    };
    cfg.validate()?;

    Ok((args, cfg))
}
