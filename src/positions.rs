// ===============================
// src/positions.rs (Position ledger & trade log)
// ===============================
//
// Satu Position per aset. Setiap aset punya lock sendiri sehingga settle
// untuk aset yang sama diserialisasi, sedangkan aset berbeda jalan paralel.
// Lock tidak pernah dipegang melewati `.await`.
//
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ahash::AHashMap as HashMap;
use serde::{Deserialize, Serialize};

use crate::domain::{Side, Trade, TradeRecord};
use crate::metrics::POSITION_SIZE;
use crate::risk::Rejection;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Signed, fraction of portfolio; positive = long.
    pub size: f64,
    /// 0 while flat.
    pub avg_price: f64,
    pub pnl: f64,
    pub trades: Vec<TradeRecord>,
}

/// Outcome classification of a settled trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Closing { Win, Loss, Neutral }

impl Position {
    /// Apply one settled trade.
    ///
    /// Buys re-average the entry price; sells only reduce size. PnL is marked
    /// at the trade price while size != 0 and left untouched once flat.
    pub fn apply(&mut self, trade: &Trade, record: TradeRecord) -> Closing {
        let mut closing = Closing::Neutral;
        match trade.side {
            Side::Buy => {
                let new_size = self.size + trade.amount;
                if new_size != 0.0 {
                    self.avg_price = (self.avg_price * self.size + trade.price * trade.amount) / new_size;
                }
                self.size = new_size;
            }
            Side::Sell => {
                if self.size > 0.0 {
                    if trade.price > self.avg_price {
                        closing = Closing::Win;
                    } else if trade.price < self.avg_price {
                        closing = Closing::Loss;
                    }
                }
                self.size -= trade.amount;
            }
        }

        if self.size != 0.0 {
            self.pnl = (trade.price - self.avg_price) * self.size;
        }
        self.trades.push(record);
        closing
    }
}

#[derive(Debug, Default)]
struct Book {
    position: Position,
    // exposure reserved by in-flight signal executions
    pending: f64,
}

type Books = Mutex<HashMap<String, Arc<Mutex<Book>>>>;

/// Exposure reserved by a limit check, released on drop unless settled.
///
/// A reservation on an asset that never settles leaves no book behind.
pub struct Reservation {
    books: Arc<Books>,
    asset: String,
    book: Arc<Mutex<Book>>,
    amount: f64,
    active: bool,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        // urutan lock: map -> book (sama dengan reserve)
        let mut books = lock(&self.books);
        let empty = {
            let mut b = lock(&self.book);
            b.pending = (b.pending - self.amount).max(0.0);
            b.pending == 0.0 && b.position.trades.is_empty()
        };
        // hanya map dan reservation ini yang memegang book
        if empty && Arc::strong_count(&self.book) == 2 {
            books.remove(&self.asset);
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeCounts { pub total: u64, pub winning: u64, pub losing: u64 }

pub struct PositionLedger {
    books: Arc<Books>,
    log: Mutex<VecDeque<TradeRecord>>,
    log_cap: usize,
    total: AtomicU64,
    winning: AtomicU64,
    losing: AtomicU64,
}

impl PositionLedger {
    pub fn new(log_cap: usize) -> Self {
        Self {
            books: Arc::new(Mutex::new(HashMap::new())),
            log: Mutex::new(VecDeque::with_capacity(log_cap.min(1024))),
            log_cap: log_cap.max(1),
            total: AtomicU64::new(0),
            winning: AtomicU64::new(0),
            losing: AtomicU64::new(0),
        }
    }

    fn book(&self, asset: &str) -> Arc<Mutex<Book>> {
        let mut books = lock(&self.books);
        books.entry(asset.to_string()).or_default().clone()
    }

    fn existing(&self, asset: &str) -> Option<Arc<Mutex<Book>>> {
        lock(&self.books).get(asset).cloned()
    }

    pub fn current_size(&self, asset: &str) -> f64 {
        self.existing(asset).map(|b| lock(&b).position.size).unwrap_or(0.0)
    }

    /// Limit check and reservation in one critical section.
    ///
    /// Rejects when `|size + pending + proposed| > max`. Without concurrent
    /// executions on the asset `pending` is 0. An unknown asset counts as
    /// flat, and a rejected check does not register it.
    pub fn reserve(&self, asset: &str, proposed: f64, max: f64) -> Result<Reservation, Rejection> {
        let mut books = lock(&self.books);
        let fresh = !books.contains_key(asset);
        let book = books.entry(asset.to_string()).or_default().clone();
        {
            let mut b = lock(&book);
            let current = b.position.size + b.pending;
            if (current + proposed).abs() > max {
                drop(b);
                if fresh {
                    books.remove(asset);
                }
                return Err(Rejection::PositionLimit { asset: asset.to_string(), current, proposed, max });
            }
            b.pending += proposed;
        }
        drop(books);

        Ok(Reservation { books: self.books.clone(), asset: asset.to_string(), book, amount: proposed, active: true })
    }

    /// Commit a settled trade. Position update, reservation release and the
    /// trade counters move together under the asset lock.
    pub fn settle(&self, trade: &Trade, record: TradeRecord, reservation: Option<Reservation>) -> Closing {
        let book = self.book(&trade.asset);
        let (closing, size) = {
            let mut b = lock(&book);
            let closing = b.position.apply(trade, record.clone());
            if let Some(mut r) = reservation {
                b.pending = (b.pending - r.amount).max(0.0);
                r.active = false;
            }
            self.total.fetch_add(1, Ordering::SeqCst);
            match closing {
                Closing::Win => { self.winning.fetch_add(1, Ordering::SeqCst); }
                Closing::Loss => { self.losing.fetch_add(1, Ordering::SeqCst); }
                Closing::Neutral => {}
            }
            (closing, b.position.size)
        };
        POSITION_SIZE.with_label_values(&[&trade.asset]).set(size);

        let mut log = lock(&self.log);
        log.push_back(record);
        while log.len() > self.log_cap {
            log.pop_front();
        }
        closing
    }

    pub fn position(&self, asset: &str) -> Option<Position> {
        self.existing(asset).map(|b| lock(&b).position.clone())
    }

    /// Point-in-time copy of every position, sorted by asset.
    pub fn snapshot(&self) -> Vec<(String, Position)> {
        let books: Vec<(String, Arc<Mutex<Book>>)> =
            lock(&self.books).iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let mut out: Vec<(String, Position)> =
            books.into_iter().map(|(k, b)| (k, lock(&b).position.clone())).collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    // (size, pnl) per asset without cloning trade histories
    fn marks(&self) -> Vec<(f64, f64)> {
        let books: Vec<Arc<Mutex<Book>>> = lock(&self.books).values().cloned().collect();
        books
            .iter()
            .map(|b| {
                let b = lock(b);
                (b.position.size, b.position.pnl)
            })
            .collect()
    }

    pub fn total_pnl(&self) -> f64 {
        self.marks().iter().map(|(_, pnl)| pnl).sum()
    }

    pub fn active_positions(&self) -> usize {
        self.marks().iter().filter(|(size, _)| *size != 0.0).count()
    }

    pub fn counts(&self) -> TradeCounts {
        TradeCounts {
            total: self.total.load(Ordering::SeqCst),
            winning: self.winning.load(Ordering::SeqCst),
            losing: self.losing.load(Ordering::SeqCst),
        }
    }

    /// Newest first.
    pub fn recent_trades(&self, n: usize) -> Vec<TradeRecord> {
        lock(&self.log).iter().rev().take(n).cloned().collect()
    }

    pub fn trade_log_len(&self) -> usize { lock(&self.log).len() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExecResult, Venue};
    use chrono::Utc;

    fn trade(side: Side, amount: f64, price: f64) -> Trade {
        Trade { asset: "SEI".into(), venue: Venue::ChainA, side, amount, price, stop_loss: 0.0, confidence: 0.7 }
    }

    fn settle(l: &PositionLedger, t: Trade) -> Closing {
        let rec = TradeRecord::new(Utc::now(), &t, ExecResult::ok("tx"));
        l.settle(&t, rec, None)
    }

    #[test]
    fn first_buy_sets_entry() {
        let l = PositionLedger::new(10);
        settle(&l, trade(Side::Buy, 10.0, 5.0));
        let p = l.position("SEI").unwrap();
        assert_eq!(p.size, 10.0);
        assert_eq!(p.avg_price, 5.0);
        assert_eq!(p.pnl, 0.0);
        assert_eq!(p.trades.len(), 1);
    }

    #[test]
    fn second_buy_reaverages_and_marks() {
        let l = PositionLedger::new(10);
        settle(&l, trade(Side::Buy, 10.0, 5.0));
        settle(&l, trade(Side::Buy, 10.0, 7.0));
        let p = l.position("SEI").unwrap();
        assert_eq!(p.size, 20.0);
        assert_eq!(p.avg_price, 6.0);
        assert_eq!(p.pnl, 20.0);
    }

    #[test]
    fn repeated_buy_is_not_idempotent() {
        let l = PositionLedger::new(10);
        settle(&l, trade(Side::Buy, 1.0, 4.0));
        settle(&l, trade(Side::Buy, 1.0, 8.0));
        let once = l.position("SEI").unwrap();
        settle(&l, trade(Side::Buy, 1.0, 8.0));
        let twice = l.position("SEI").unwrap();
        assert_ne!(once.size, twice.size);
        assert!(twice.avg_price > once.avg_price && twice.avg_price < 8.0);
    }

    #[test]
    fn sell_keeps_average_and_classifies() {
        let l = PositionLedger::new(10);
        settle(&l, trade(Side::Buy, 10.0, 5.0));
        assert_eq!(settle(&l, trade(Side::Sell, 4.0, 6.0)), Closing::Win);
        let p = l.position("SEI").unwrap();
        assert_eq!(p.size, 6.0);
        assert_eq!(p.avg_price, 5.0);
        assert_eq!(p.pnl, 6.0);
        assert_eq!(settle(&l, trade(Side::Sell, 1.0, 4.0)), Closing::Loss);
        let c = l.counts();
        assert_eq!((c.total, c.winning, c.losing), (3, 1, 1));
    }

    #[test]
    fn pnl_survives_flat_position() {
        let l = PositionLedger::new(10);
        settle(&l, trade(Side::Buy, 2.0, 5.0));
        settle(&l, trade(Side::Sell, 1.0, 6.0));
        let before = l.position("SEI").unwrap().pnl;
        settle(&l, trade(Side::Sell, 1.0, 9.0));
        let p = l.position("SEI").unwrap();
        assert_eq!(p.size, 0.0);
        assert_eq!(p.pnl, before);
        assert_eq!(l.active_positions(), 0);
    }

    #[test]
    fn limit_uses_current_size_and_pending() {
        let l = PositionLedger::new(10);
        settle(&l, trade(Side::Buy, 0.05, 1.0));
        assert!(matches!(l.reserve("SEI", 0.06, 0.1), Err(Rejection::PositionLimit { .. })));
        let r = l.reserve("SEI", 0.03, 0.1).unwrap();
        // the reservation counts against the next check
        assert!(l.reserve("SEI", 0.03, 0.1).is_err());
        drop(r);
        assert!(l.reserve("SEI", 0.03, 0.1).is_ok());
    }

    #[test]
    fn released_reservation_leaves_no_position() {
        let l = PositionLedger::new(10);
        let r = l.reserve("WETH", 0.05, 0.1).unwrap();
        drop(r);
        assert!(l.position("WETH").is_none());
        assert!(l.snapshot().is_empty());

        assert!(l.reserve("WETH", 0.5, 0.1).is_err());
        assert!(l.position("WETH").is_none());
    }

    #[test]
    fn overlapping_reservations_release_cleanly() {
        let l = PositionLedger::new(10);
        let a = l.reserve("WETH", 0.04, 0.1).unwrap();
        let b = l.reserve("WETH", 0.04, 0.1).unwrap();
        drop(a);
        // b still holds exposure on the book
        assert!(l.reserve("WETH", 0.07, 0.1).is_err());
        drop(b);
        assert!(l.position("WETH").is_none());
        assert!(l.reserve("WETH", 0.07, 0.1).is_ok());
    }

    #[test]
    fn settle_consumes_reservation() {
        let l = PositionLedger::new(10);
        let r = l.reserve("SEI", 0.04, 0.1).unwrap();
        let t = trade(Side::Buy, 0.02, 1.0);
        l.settle(&t, TradeRecord::new(Utc::now(), &t, ExecResult::ok("tx")), Some(r));
        // only the settled 0.02 remains, pending is released
        assert!(l.reserve("SEI", 0.07, 0.1).is_ok());
    }

    #[test]
    fn trade_log_evicts_oldest() {
        let l = PositionLedger::new(3);
        for i in 0..5 {
            settle(&l, trade(Side::Buy, 1.0, 1.0 + i as f64));
        }
        assert_eq!(l.trade_log_len(), 3);
        let recent = l.recent_trades(10);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].price, 5.0);
        assert_eq!(recent[2].price, 3.0);
        // per-position history is never truncated
        assert_eq!(l.position("SEI").unwrap().trades.len(), 5);
    }

    #[test]
    fn concurrent_settles_do_not_lose_updates() {
        let l = Arc::new(PositionLedger::new(100));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let l = l.clone();
                std::thread::spawn(move || settle(&l, trade(Side::Buy, 1.0, 2.0 + (i % 2) as f64)))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let p = l.position("SEI").unwrap();
        assert_eq!(p.size, 8.0);
        assert!((p.avg_price - 2.5).abs() < 1e-9);
        assert_eq!(l.counts().total, 8);
    }
}
