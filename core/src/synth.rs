//! Deterministic synthetic ledger generation.
//!
//! RULE: every draw flows through one `LedgerRng` seeded from the caller's
//! seed, so the same (seed, count) always yields the same ledger.
//!
//! The generator plants the shapes the detectors look for: a recurring
//! sender/receiver ring at a fixed amount, round-thousand transfers,
//! periodic bursts inside one hour, and rapid follow-ups from one sender.

use crate::{
    features::RawRow,
    transaction::{Transaction, NO_REFERENCE, NO_REMARKS},
};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;

const ACCOUNTS: usize = 30;
const RING_AMOUNT: f64 = 9_500.0;
const RING_SHARE: f64 = 0.12;
const ROUND_SHARE: f64 = 0.10;
const FOLLOW_UP_RATE: f64 = 0.08;
const MISSING_REFERENCE_RATE: f64 = 0.05;
const RETAIL_FLOOR: f64 = 50.0;
const RETAIL_TAIL: f64 = 1.6;
const RETAIL_CAP: f64 = 50_000.0;
const BURST_EVERY: usize = 200;
const BURST_LEN: usize = 15;

const FIRST_NAMES: &[&str] = &[
    "Aarav", "Priya", "Rohan", "Meera", "Vikram", "Anika", "Kabir", "Isha", "Arjun", "Diya",
    "James", "Sofia", "Daniel", "Amara", "Lucas", "Nora",
];
const LAST_NAMES: &[&str] = &[
    "Sharma", "Iyer", "Patel", "Reddy", "Khan", "Gupta", "Nair", "Das", "Smith", "Okafor",
    "Silva", "Novak",
];
const REMARKS: &[&str] = &[
    "Rent", "Invoice settlement", "Family support", "Consulting fee", "Loan repayment",
    "Groceries", "Refund", NO_REMARKS,
];

/// Seeded source for every ledger draw. Only this type touches the PRNG.
struct LedgerRng {
    inner: Pcg64Mcg,
}

impl LedgerRng {
    fn new(seed: u64) -> Self {
        Self { inner: Pcg64Mcg::seed_from_u64(seed) }
    }

    fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[self.inner.gen_range(0..items.len())]
    }

    fn account(&mut self) -> usize {
        self.inner.gen_range(0..ACCOUNTS)
    }

    /// Any account other than `sender`.
    fn counterparty(&mut self, sender: usize) -> usize {
        (sender + self.inner.gen_range(1..ACCOUNTS)) % ACCOUNTS
    }

    /// Which planted shape the next transfer takes.
    fn shape(&mut self) -> Shape {
        let roll: f64 = self.inner.gen();
        if roll < RING_SHARE {
            Shape::Ring
        } else if roll < RING_SHARE + ROUND_SHARE {
            Shape::RoundThousands
        } else {
            Shape::Retail
        }
    }

    fn happens(&mut self, rate: f64) -> bool {
        self.inner.gen_bool(rate)
    }

    /// Seconds since the previous transfer; bursts arrive much faster.
    fn gap(&mut self, in_burst: bool) -> Duration {
        let secs = if in_burst {
            self.inner.gen_range(10..=120)
        } else {
            self.inner.gen_range(60..=1_800)
        };
        Duration::seconds(secs)
    }

    fn settlement_delay(&mut self) -> Duration {
        Duration::seconds(self.inner.gen_range(5..=900))
    }

    fn round_thousands(&mut self) -> f64 {
        f64::from(self.inner.gen_range(1..=9u32)) * 1_000.0
    }

    /// Heavy-tailed retail payment in cents precision: many small, few large.
    fn retail_amount(&mut self) -> f64 {
        let u: f64 = self.inner.gen_range(f64::EPSILON..1.0);
        let amount = (RETAIL_FLOOR * u.powf(-1.0 / RETAIL_TAIL)).min(RETAIL_CAP);
        (amount * 100.0).round() / 100.0
    }

    fn status(&mut self) -> &'static str {
        match self.inner.gen_range(0..20) {
            0 => "failed",
            1 => "pending",
            _ => "completed",
        }
    }

    fn reference(&mut self) -> String {
        if self.happens(MISSING_REFERENCE_RATE) {
            NO_REFERENCE.to_string()
        } else {
            format!("UTR{:010}", self.inner.gen_range(0..10_000_000_000u64))
        }
    }
}

enum Shape {
    Ring,
    RoundThousands,
    Retail,
}

struct Account {
    id: String,
    name: String,
}

fn accounts(rng: &mut LedgerRng) -> Vec<Account> {
    (0..ACCOUNTS)
        .map(|i| Account {
            id: format!("ACC{i:03}"),
            name: format!("{} {}", rng.pick(FIRST_NAMES), rng.pick(LAST_NAMES)),
        })
        .collect()
}

fn start_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(9, 0, 0))
        .unwrap_or_default()
}

/// Generate `count` transactions from `seed`.
pub fn generate(seed: u64, count: usize) -> Vec<Transaction> {
    let mut rng = LedgerRng::new(seed);
    let book = accounts(&mut rng);
    let mut clock = start_time();
    let mut out = Vec::with_capacity(count);
    let mut follow_up_from: Option<usize> = None;

    for i in 0..count {
        let in_burst = i % BURST_EVERY >= BURST_EVERY / 2 && i % BURST_EVERY < BURST_EVERY / 2 + BURST_LEN;
        clock += rng.gap(in_burst);

        let (sender, receiver, amount) = match rng.shape() {
            Shape::Ring => (0, 1, RING_AMOUNT),
            shape => {
                let sender = follow_up_from.take().unwrap_or_else(|| rng.account());
                let receiver = rng.counterparty(sender);
                let amount = match shape {
                    Shape::RoundThousands => rng.round_thousands(),
                    _ => rng.retail_amount(),
                };
                (sender, receiver, amount)
            }
        };
        if rng.happens(FOLLOW_UP_RATE) {
            follow_up_from = Some(sender);
        }

        let processing = rng.settlement_delay();
        let payment_status = rng.status();
        let reference = rng.reference();

        out.push(Transaction {
            transaction_id: format!("TXN{i:06}"),
            sender_id: book[sender].id.clone(),
            sender_name: book[sender].name.clone(),
            receiver_id: book[receiver].id.clone(),
            receiver_name: book[receiver].name.clone(),
            amount,
            created_at: clock,
            updated_at: clock + processing,
            remarks: rng.pick(REMARKS).to_string(),
            reference,
            payment_status: payment_status.to_string(),
        });
    }
    out
}

/// Render transactions as loose rows, the shape file and database loaders produce.
pub fn to_raw_rows(txns: &[Transaction]) -> Vec<RawRow> {
    txns.iter()
        .filter_map(|t| match serde_json::to_value(t) {
            Ok(serde_json::Value::Object(map)) => Some(map),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_ledger() {
        assert_eq!(generate(42, 300), generate(42, 300));
        assert_ne!(generate(42, 300), generate(43, 300));
    }

    #[test]
    fn ids_unique_and_times_monotonic() {
        let txns = generate(1, 500);
        let ids: std::collections::HashSet<_> = txns.iter().map(|t| &t.transaction_id).collect();
        assert_eq!(ids.len(), 500);
        assert!(txns.windows(2).all(|w| w[0].created_at < w[1].created_at));
        assert!(txns.iter().all(|t| t.sender_id != t.receiver_id));
        assert!(txns.iter().all(|t| t.updated_at > t.created_at));
    }

    #[test]
    fn draws_stay_inside_their_ledger_bounds() {
        let mut rng = LedgerRng::new(5);
        for _ in 0..2_000 {
            let sender = rng.account();
            assert_ne!(rng.counterparty(sender), sender);
            let retail = rng.retail_amount();
            assert!((RETAIL_FLOOR..=RETAIL_CAP).contains(&retail), "{retail}");
            assert_eq!(rng.round_thousands() % 1_000.0, 0.0);
            assert!(rng.gap(true) <= Duration::seconds(120));
        }
    }

    #[test]
    fn raw_rows_carry_canonical_columns() {
        let rows = to_raw_rows(&generate(3, 4));
        assert_eq!(rows.len(), 4);
        for col in ["transaction_id", "sender_id", "amount", "created_at", "payment_status"] {
            assert!(rows[0].contains_key(col), "{col}");
        }
    }
}
