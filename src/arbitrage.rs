// ===============================
// src/arbitrage.rs (cross-chain scanner + TTL cache)
// ===============================
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::{ArbDirection, ArbitrageOpportunity, Venue};
use crate::ports::PriceMap;

/// Compare both venues for every asset quoted on each.
///
/// `diff = |a - b| / min(a, b)`; emitted only when `diff > threshold`.
pub fn scan(prices_a: &PriceMap, prices_b: &PriceMap, threshold: f64, now: DateTime<Utc>) -> Vec<ArbitrageOpportunity> {
    let mut out = Vec::new();
    for (asset, &pa) in prices_a {
        let Some(&pb) = prices_b.get(asset) else { continue };
        if !(pa.is_finite() && pb.is_finite()) || pa <= 0.0 || pb <= 0.0 {
            debug!(%asset, pa, pb, "skip unusable quote");
            continue;
        }
        let low = pa.min(pb);
        let diff = (pa - pb).abs() / low;
        if diff <= threshold {
            continue;
        }
        let direction = if pa < pb {
            ArbDirection { buy_on: Venue::ChainA, sell_on: Venue::ChainB }
        } else {
            ArbDirection { buy_on: Venue::ChainB, sell_on: Venue::ChainA }
        };
        out.push(ArbitrageOpportunity {
            asset: asset.clone(),
            price_a: pa,
            price_b: pb,
            price_difference: diff,
            direction,
            potential_profit: diff * low,
            ts: now,
        });
    }
    out
}

/// Last non-empty scan, readable until it ages past the TTL.
#[derive(Debug, Clone)]
pub struct OpportunityCache {
    ttl: Duration,
    entries: Vec<ArbitrageOpportunity>,
    stored_at: Option<DateTime<Utc>>,
}

impl OpportunityCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: Vec::new(), stored_at: None }
    }

    /// Replace wholesale; an empty scan leaves the previous entry in place.
    pub fn store(&mut self, opps: Vec<ArbitrageOpportunity>, now: DateTime<Utc>) {
        if opps.is_empty() {
            return;
        }
        self.entries = opps;
        self.stored_at = Some(now);
    }

    pub fn get(&self, now: DateTime<Utc>) -> Vec<ArbitrageOpportunity> {
        match self.stored_at {
            Some(at) if !expired(at, self.ttl, now) => self.entries.clone(),
            _ => Vec::new(),
        }
    }
}

pub(crate) fn expired(at: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> bool {
    match (now - at).to_std() {
        Ok(age) => age >= ttl,
        // stored "in the future" (clock skew): still fresh
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prices(items: &[(&str, f64)]) -> PriceMap {
        items.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn cheaper_venue_is_the_buy_side() {
        let now = Utc::now();
        let opps = scan(&prices(&[("SEI", 100.0)]), &prices(&[("SEI", 105.0)]), 0.01, now);
        assert_eq!(opps.len(), 1);
        let o = &opps[0];
        assert!((o.price_difference - 0.05).abs() < 1e-12);
        assert_eq!(o.direction, ArbDirection { buy_on: Venue::ChainA, sell_on: Venue::ChainB });
        assert!((o.potential_profit - 5.0).abs() < 1e-9);

        let flipped = scan(&prices(&[("SEI", 105.0)]), &prices(&[("SEI", 100.0)]), 0.01, now);
        assert_eq!(flipped[0].direction.buy_on, Venue::ChainB);
    }

    #[test]
    fn threshold_is_exclusive() {
        // 101 / 100 -> diff exactly 0.01
        let opps = scan(&prices(&[("SEI", 100.0)]), &prices(&[("SEI", 101.0)]), 0.01, Utc::now());
        assert!(opps.is_empty());
    }

    #[test]
    fn only_shared_assets_are_compared() {
        let a = prices(&[("SEI", 1.0), ("USDC", 1.0), ("WETH", 2000.0)]);
        let b = prices(&[("SEI", 2.0), ("ATOM", 9.0), ("WETH", 2000.0)]);
        let opps = scan(&a, &b, 0.01, Utc::now());
        assert_eq!(opps.len(), 1);
        assert_eq!(opps[0].asset, "SEI");
    }

    #[test]
    fn zero_or_nan_quotes_are_skipped() {
        let a = prices(&[("SEI", 0.0), ("USDC", f64::NAN)]);
        let b = prices(&[("SEI", 1.0), ("USDC", 1.0)]);
        assert!(scan(&a, &b, 0.01, Utc::now()).is_empty());
    }

    #[test]
    fn cache_keeps_last_non_empty_scan_until_ttl() {
        let t0 = Utc::now();
        let mut cache = OpportunityCache::new(Duration::from_secs(60));
        let opps = scan(&prices(&[("SEI", 100.0)]), &prices(&[("SEI", 110.0)]), 0.01, t0);
        cache.store(opps, t0);

        cache.store(Vec::new(), t0 + chrono::Duration::seconds(10));
        assert_eq!(cache.get(t0 + chrono::Duration::seconds(30)).len(), 1);
        assert!(cache.get(t0 + chrono::Duration::seconds(60)).is_empty());
    }

    #[test]
    fn cache_replaces_instead_of_merging() {
        let t0 = Utc::now();
        let mut cache = OpportunityCache::new(Duration::from_secs(60));
        cache.store(scan(&prices(&[("SEI", 1.0)]), &prices(&[("SEI", 2.0)]), 0.01, t0), t0);
        cache.store(scan(&prices(&[("WETH", 1.0)]), &prices(&[("WETH", 2.0)]), 0.01, t0), t0);
        let got = cache.get(t0);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].asset, "WETH");
    }
}
