// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Gauge, GaugeVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use tracing::{error, info};

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Loop --------
pub static CYCLES: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("cycles_total", "monitoring cycles completed").unwrap());

pub static CYCLE_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("cycle_failures_total", "collaborator failures inside cycles (label: stage)"),
        &["stage"],
    )
    .unwrap()
});

// -------- Signals & trades --------
pub static SIGNALS_BY: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("signals_total_by", "signals by direction & venue"),
        &["direction", "venue"],
    )
    .unwrap()
});

pub static TRADES_BY: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("trades_total_by", "execution outcomes (label: outcome)"),
        &["outcome"],
    )
    .unwrap()
});

// -------- Positions & performance --------
pub static POSITION_SIZE: Lazy<GaugeVec> = Lazy::new(|| {
    GaugeVec::new(
        Opts::new("position_size", "signed position size, fraction of portfolio"),
        &["asset"],
    )
    .unwrap()
});

pub static PNL_TOTAL: Lazy<Gauge> =
    Lazy::new(|| Gauge::new("pnl_total", "sum of position PnL").unwrap());

pub static WIN_RATE: Lazy<Gauge> =
    Lazy::new(|| Gauge::new("win_rate", "winning / total trades").unwrap());

pub static MAX_DRAWDOWN: Lazy<Gauge> =
    Lazy::new(|| Gauge::new("max_drawdown", "largest drop of total PnL from its peak").unwrap());

pub static ARB_OPPORTUNITIES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("arb_opportunities", "opportunities found by the last scan").unwrap()
});

pub fn init() {
    // Register all metrics to the custom registry; double registration is harmless
    for m in [
        REGISTRY.register(Box::new(CYCLES.clone())),
        REGISTRY.register(Box::new(CYCLE_FAILURES.clone())),
        REGISTRY.register(Box::new(SIGNALS_BY.clone())),
        REGISTRY.register(Box::new(TRADES_BY.clone())),
        REGISTRY.register(Box::new(POSITION_SIZE.clone())),
        REGISTRY.register(Box::new(PNL_TOTAL.clone())),
        REGISTRY.register(Box::new(WIN_RATE.clone())),
        REGISTRY.register(Box::new(MAX_DRAWDOWN.clone())),
        REGISTRY.register(Box::new(ARB_OPPORTUNITIES.clone())),
    ] {
        let _ = m;
    }
}

// Encode all metrics in Prometheus text format
pub fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

// Serve one HTTP request (GET / or /metrics) — tiny HTTP 1.1 responder
fn handle_client(mut stream: TcpStream) {
    let mut _req_buf = [0u8; 1024];
    let _ = stream.read(&mut _req_buf);

    let body = encode_metrics();
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

// Run the metrics server in a dedicated OS thread (keeps Tokio runtime clean)
pub fn serve_metrics(port: u16) {
    thread::spawn(move || {
        let addr = format!("0.0.0.0:{port}");
        let listener = match TcpListener::bind(&addr) {
            Ok(l) => l,
            Err(e) => {
                error!(%addr, ?e, "metrics bind failed, exporter disabled");
                return;
            }
        };
        info!("metrics listening on http://{addr}/ (and /metrics)");

        for conn in listener.incoming() {
            match conn {
                Ok(stream) => handle_client(stream),
                Err(e) => error!(?e, "metrics accept error"),
            }
        }
    });
}
