// ===============================
// src/strategy.rs
// ===============================
//
// Signal generator: snapshot -> nol atau lebih Signal.
//
// 1) Rule checks (deterministik, semua boleh aktif bersamaan):
//      RSI < 30            -> buy  0.8  (target/stop ±5%)
//      RSI > 70            -> sell 0.8  (±5%)
//      MACD > MACD signal  -> buy  0.7  (±3%)
//      vol 24h > 1.5 x avg -> buy  0.6  (±2%)
// 2) Model check: skor dari Scorer eksternal (predicted fractional move p).
//      |p| > threshold -> buy/sell, confidence = min(0.9, |p| x 10)
//
// Urutan output: rule dulu, lalu model. Tidak ada dedup.
//
use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::{Direction, MarketSnapshot, Signal};
use crate::error::CollabError;
use crate::metrics::SIGNALS_BY;
use crate::ports::Scorer;

const RSI_OVERSOLD: f64 = 30.0;
const RSI_OVERBOUGHT: f64 = 70.0;
const VOLUME_BREAKOUT_MULT: f64 = 1.5;
const MODEL_CONFIDENCE_CAP: f64 = 0.9;

/// Rule signal with a symmetric percentage band around the current price.
fn banded(s: &MarketSnapshot, direction: Direction, confidence: f64, reason: &str, band: f64) -> Signal {
    let (price_target, stop_loss) = match direction {
        Direction::Sell => (s.price * (1.0 - band), s.price * (1.0 + band)),
        _ => (s.price * (1.0 + band), s.price * (1.0 - band)),
    };
    Signal {
        asset: s.asset.clone(),
        venue: s.venue,
        direction,
        confidence,
        reason: reason.to_string(),
        price_target,
        stop_loss,
    }
}

pub fn rule_signals(s: &MarketSnapshot) -> Vec<Signal> {
    let mut out = Vec::with_capacity(3);

    if s.rsi < RSI_OVERSOLD {
        out.push(banded(s, Direction::Buy, 0.8, "oversold", 0.05));
    }
    if s.rsi > RSI_OVERBOUGHT {
        out.push(banded(s, Direction::Sell, 0.8, "overbought", 0.05));
    }
    if s.macd > s.macd_signal {
        out.push(banded(s, Direction::Buy, 0.7, "bullish crossover", 0.03));
    }
    if s.volume_24h > s.avg_volume * VOLUME_BREAKOUT_MULT {
        out.push(banded(s, Direction::Buy, 0.6, "volume breakout", 0.02));
    }
    out
}

/// Map a predicted move to a signal, `None` inside the dead band.
pub fn model_signal_from(s: &MarketSnapshot, p: f64, threshold: f64) -> Option<Signal> {
    let direction = if p > threshold {
        Direction::Buy
    } else if p < -threshold {
        Direction::Sell
    } else {
        return None;
    };
    Some(Signal {
        asset: s.asset.clone(),
        venue: s.venue,
        direction,
        confidence: (p.abs() * 10.0).min(MODEL_CONFIDENCE_CAP),
        reason: format!("model predicts {:+.2}% move", p * 100.0),
        price_target: s.price * (1.0 + p),
        stop_loss: s.price * (1.0 - p * 0.5),
    })
}

/// Highest-confidence rule signal, or a neutral hold.
pub fn best_signal(s: &MarketSnapshot) -> Signal {
    // ties keep the earlier rule
    let best = rule_signals(s).into_iter().fold(None::<Signal>, |acc, sig| match acc {
        Some(a) if a.confidence >= sig.confidence => Some(a),
        _ => Some(sig),
    });
    best.unwrap_or_else(|| Signal {
        asset: s.asset.clone(),
        venue: s.venue,
        direction: Direction::Hold,
        confidence: 0.5,
        reason: "no clear signal".to_string(),
        price_target: s.price,
        stop_loss: s.price * 0.95,
    })
}

/// Output of one snapshot; `scorer_error` is set when the model path failed.
#[derive(Debug, Default)]
pub struct SignalBatch {
    pub signals: Vec<Signal>,
    pub scorer_error: Option<CollabError>,
}

pub struct SignalGenerator {
    scorer: Option<Arc<dyn Scorer>>,
    model_threshold: f64,
}

impl SignalGenerator {
    pub fn new(scorer: Option<Arc<dyn Scorer>>, model_threshold: f64) -> Self {
        Self { scorer, model_threshold }
    }

    async fn model_signal(&self, s: &MarketSnapshot) -> Result<Option<Signal>, CollabError> {
        let Some(scorer) = &self.scorer else {
            return Ok(None);
        };
        let p = scorer.score_price_move(&s.features()).await?;
        if !p.is_finite() {
            return Err(CollabError::Other(format!("scorer returned non-finite move {p}")));
        }
        Ok(model_signal_from(s, p, self.model_threshold))
    }

    pub async fn generate(&self, s: &MarketSnapshot) -> SignalBatch {
        let mut batch = SignalBatch { signals: rule_signals(s), scorer_error: None };

        match self.model_signal(s).await {
            Ok(Some(sig)) => batch.signals.push(sig),
            Ok(None) => {}
            Err(e) => {
                // hanya jalur model yang kosong; rule signal tetap jalan
                warn!(asset = %s.asset, venue = %s.venue, error = %e, "scorer failed, no model signal");
                batch.scorer_error = Some(e);
            }
        }

        for sig in &batch.signals {
            SIGNALS_BY.with_label_values(&[sig.direction.as_str(), sig.venue.as_str()]).inc();
        }
        debug!(asset = %s.asset, venue = %s.venue, n = batch.signals.len(), "signals generated");
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Venue;
    use async_trait::async_trait;
    use chrono::Utc;

    fn snapshot(asset: &str, venue: Venue, price: f64) -> MarketSnapshot {
        // neutral indicators: no rule fires
        MarketSnapshot {
            ts: Utc::now(),
            asset: asset.to_string(),
            venue,
            price,
            volume_24h: 1_000.0,
            avg_volume: 1_000.0,
            rsi: 50.0,
            macd: 0.0,
            macd_signal: 0.0,
            bollinger_upper: price * 1.1,
            bollinger_lower: price * 0.9,
            sma_20: price,
            sma_50: price,
            price_change_24h: 0.0,
            volume_change_24h: 0.0,
        }
    }

    struct FixedScorer(Result<f64, CollabError>);

    #[async_trait]
    impl Scorer for FixedScorer {
        async fn score_price_move(&self, _f: &[f64; 11]) -> Result<f64, CollabError> {
            self.0.clone()
        }
    }

    fn approx(a: f64, b: f64) -> bool { (a - b).abs() < 1e-9 }

    #[test]
    fn oversold_emits_buy() {
        let s = MarketSnapshot { rsi: 25.0, ..snapshot("SEI", Venue::ChainA, 100.0) };
        let sigs = rule_signals(&s);
        assert_eq!(sigs.len(), 1);
        assert_eq!(sigs[0].direction, Direction::Buy);
        assert_eq!(sigs[0].confidence, 0.8);
        assert_eq!(sigs[0].reason, "oversold");
        assert!(approx(sigs[0].price_target, 105.0));
        assert!(approx(sigs[0].stop_loss, 95.0));
    }

    #[test]
    fn overbought_emits_sell_with_inverted_band() {
        let s = MarketSnapshot { rsi: 75.0, ..snapshot("SEI", Venue::ChainB, 100.0) };
        let sigs = rule_signals(&s);
        assert_eq!(sigs.len(), 1);
        assert_eq!(sigs[0].direction, Direction::Sell);
        assert_eq!(sigs[0].reason, "overbought");
        assert!(approx(sigs[0].price_target, 95.0));
        assert!(approx(sigs[0].stop_loss, 105.0));
    }

    #[test]
    fn all_rules_can_fire_together_in_order() {
        let s = MarketSnapshot {
            rsi: 10.0,
            macd: 1.0,
            macd_signal: 0.5,
            volume_24h: 2_000.0,
            ..snapshot("SEI", Venue::ChainA, 10.0)
        };
        let reasons: Vec<_> = rule_signals(&s).into_iter().map(|s| s.reason).collect();
        assert_eq!(reasons, vec!["oversold", "bullish crossover", "volume breakout"]);
    }

    #[test]
    fn rsi_boundaries_are_exclusive() {
        assert!(rule_signals(&MarketSnapshot { rsi: 30.0, ..snapshot("X", Venue::ChainA, 1.0) }).is_empty());
        assert!(rule_signals(&MarketSnapshot { rsi: 70.0, ..snapshot("X", Venue::ChainA, 1.0) }).is_empty());
        // exactly 1.5x average volume is not a breakout
        assert!(rule_signals(&MarketSnapshot { volume_24h: 1_500.0, ..snapshot("X", Venue::ChainA, 1.0) }).is_empty());
    }

    #[test]
    fn model_band_and_confidence_cap() {
        let s = snapshot("SEI", Venue::ChainA, 100.0);
        assert!(model_signal_from(&s, 0.02, 0.02).is_none());
        assert!(model_signal_from(&s, -0.02, 0.02).is_none());

        let buy = model_signal_from(&s, 0.05, 0.02).unwrap();
        assert_eq!(buy.direction, Direction::Buy);
        assert!(approx(buy.confidence, 0.5));
        assert!(approx(buy.price_target, 105.0));
        assert!(approx(buy.stop_loss, 97.5));

        let sell = model_signal_from(&s, -0.2, 0.02).unwrap();
        assert_eq!(sell.direction, Direction::Sell);
        assert!(approx(sell.confidence, 0.9));
        assert!(approx(sell.price_target, 80.0));
        assert!(approx(sell.stop_loss, 110.0));
    }

    #[tokio::test]
    async fn model_signal_comes_after_rules() {
        let gen = SignalGenerator::new(Some(Arc::new(FixedScorer(Ok(0.03)))), 0.02);
        let s = MarketSnapshot { rsi: 20.0, ..snapshot("SEI", Venue::ChainA, 100.0) };
        let batch = gen.generate(&s).await;
        assert_eq!(batch.signals.len(), 2);
        assert_eq!(batch.signals[0].reason, "oversold");
        assert!(batch.signals[1].reason.starts_with("model"));
        assert!(batch.scorer_error.is_none());
    }

    #[tokio::test]
    async fn scorer_failure_only_drops_model_path() {
        let gen = SignalGenerator::new(
            Some(Arc::new(FixedScorer(Err(CollabError::Unavailable("model".into()))))),
            0.02,
        );
        let s = MarketSnapshot { rsi: 80.0, ..snapshot("SEI", Venue::ChainA, 100.0) };
        let batch = gen.generate(&s).await;
        assert_eq!(batch.signals.len(), 1);
        assert_eq!(batch.signals[0].reason, "overbought");
        assert!(batch.scorer_error.is_some());
    }

    #[tokio::test]
    async fn missing_scorer_is_not_an_error() {
        let gen = SignalGenerator::new(None, 0.02);
        let batch = gen.generate(&snapshot("SEI", Venue::ChainA, 100.0)).await;
        assert!(batch.signals.is_empty());
        assert!(batch.scorer_error.is_none());
    }

    #[test]
    fn best_signal_picks_highest_confidence_or_holds() {
        let s = MarketSnapshot { macd: 2.0, volume_24h: 5_000.0, ..snapshot("SEI", Venue::ChainA, 100.0) };
        assert_eq!(best_signal(&s).reason, "bullish crossover");

        let hold = best_signal(&snapshot("SEI", Venue::ChainA, 100.0));
        assert_eq!(hold.direction, Direction::Hold);
        assert_eq!(hold.confidence, 0.5);
        assert!(approx(hold.stop_loss, 95.0));
        assert!(approx(hold.price_target, 100.0));
    }
}
