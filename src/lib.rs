// ===============================
// src/lib.rs
// ===============================
pub mod agent;
pub mod arbitrage;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod feed;         // mock market data + scorer
pub mod gateway;      // mock execution backend (fill after delay)
pub mod metrics;
pub mod performance;
pub mod ports;
pub mod positions;
pub mod recorder;
pub mod risk;
pub mod scheduler;
pub mod strategy;

pub use agent::{Agent, Collaborators};
pub use coordinator::{ExecOutcome, ExecState};
