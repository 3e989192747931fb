// ===============================
// src/feed.rs
// ===============================
//
// Market data adapters:
// - MockMarket     : random walk per (asset, venue) dengan indikator sintetis
// - TrendScorer    : scorer sederhana pengganti model prediksi
//
// Notes:
// - Indikator (RSI, MACD, SMA, Bollinger) di sini hanya angka masuk akal untuk
//   menggerakkan pipeline; perhitungan indikator sesungguhnya milik layanan
//   market data eksternal.
//
use std::sync::{Mutex, PoisonError};

use ahash::AHashMap as HashMap;
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;

use crate::domain::{MarketSnapshot, Venue};
use crate::error::CollabError;
use crate::ports::{MarketData, PriceMap, Scorer};

#[derive(Debug, Clone)]
struct Walk {
    price: f64,
    sma_20: f64,
    sma_50: f64,
    open_24h: f64,
    avg_volume: f64,
    last_volume: f64,
}

impl Walk {
    fn new(price: f64) -> Self {
        Self { price, sma_20: price, sma_50: price, open_24h: price, avg_volume: 10_000.0, last_volume: 10_000.0 }
    }
}

/// Random-walk feed for both venues. Venue B trades at a small, drifting
/// premium/discount to venue A so the arbitrage scanner has something to find.
pub struct MockMarket {
    assets: Vec<String>,
    state: Mutex<HashMap<(String, Venue), Walk>>,
    /// Probability that a fetch fails, per call.
    pub failure_rate: f64,
}

impl MockMarket {
    pub fn new(assets: Vec<String>) -> Self {
        let mut state = HashMap::new();
        for (i, a) in assets.iter().enumerate() {
            let base = 1.0 + i as f64 * 10.0;
            state.insert((a.clone(), Venue::ChainA), Walk::new(base));
            state.insert((a.clone(), Venue::ChainB), Walk::new(base * 1.005));
        }
        Self { assets, state: Mutex::new(state), failure_rate: 0.0 }
    }

    fn maybe_fail(&self, venue: Venue) -> Result<(), CollabError> {
        if self.failure_rate > 0.0 && rand::thread_rng().gen_bool(self.failure_rate.min(1.0)) {
            return Err(CollabError::Unavailable(format!("{venue} market data")));
        }
        Ok(())
    }

    // jangan simpan ThreadRng melewati .await (fungsi ini sync)
    fn step(&self, venue: Venue) -> Vec<MarketSnapshot> {
        let mut rng = rand::thread_rng();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out = Vec::with_capacity(self.assets.len());

        for asset in &self.assets {
            let Some(w) = state.get_mut(&(asset.clone(), venue)) else { continue };
            let ret: f64 = rng.gen_range(-0.02..=0.02);
            w.price = (w.price * (1.0 + ret)).max(0.0001);
            w.sma_20 += (w.price - w.sma_20) / 20.0;
            w.sma_50 += (w.price - w.sma_50) / 50.0;
            w.last_volume = w.avg_volume * rng.gen_range(0.5..=2.0);
            let prev_avg = w.avg_volume;
            w.avg_volume += (w.last_volume - w.avg_volume) / 30.0;

            let macd = w.sma_20 - w.sma_50;
            let band = w.sma_20 * 0.04;
            out.push(MarketSnapshot {
                ts: Utc::now(),
                asset: asset.clone(),
                venue,
                price: w.price,
                volume_24h: w.last_volume,
                avg_volume: w.avg_volume,
                rsi: rng.gen_range(15.0..=85.0),
                macd,
                macd_signal: macd * rng.gen_range(0.8..=1.2),
                bollinger_upper: w.sma_20 + band,
                bollinger_lower: w.sma_20 - band,
                sma_20: w.sma_20,
                sma_50: w.sma_50,
                price_change_24h: (w.price - w.open_24h) / w.open_24h,
                volume_change_24h: (w.last_volume - prev_avg) / prev_avg,
            });
        }
        out
    }
}

#[async_trait]
impl MarketData for MockMarket {
    async fn fetch_snapshots(&self, venue: Venue) -> Result<Vec<MarketSnapshot>, CollabError> {
        self.maybe_fail(venue)?;
        Ok(self.step(venue))
    }

    async fn price_map(&self, venue: Venue) -> Result<PriceMap, CollabError> {
        self.maybe_fail(venue)?;
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(state
            .iter()
            .filter(|((_, v), _)| *v == venue)
            .map(|((asset, _), w)| (asset.clone(), w.price))
            .collect())
    }
}

/// Stand-in predictor: blends trend (SMA20 vs SMA50) with a band-position
/// mean-reversion term. Output is a fractional price move.
#[derive(Debug, Clone)]
pub struct TrendScorer {
    pub trend_weight: f64,
    pub reversion_weight: f64,
}

impl Default for TrendScorer {
    fn default() -> Self { Self { trend_weight: 2.0, reversion_weight: 0.02 } }
}

#[async_trait]
impl Scorer for TrendScorer {
    async fn score_price_move(&self, f: &[f64; 11]) -> Result<f64, CollabError> {
        let (price, upper, lower, sma_20, sma_50) = (f[0], f[5], f[6], f[7], f[8]);
        if sma_50 <= 0.0 || upper <= lower {
            return Err(CollabError::Other("degenerate features".into()));
        }
        let trend = (sma_20 - sma_50) / sma_50;
        // -1 di band bawah, +1 di band atas
        let band_pos = ((price - lower) / (upper - lower)) * 2.0 - 1.0;
        Ok(self.trend_weight * trend - self.reversion_weight * band_pos)
    }
}
