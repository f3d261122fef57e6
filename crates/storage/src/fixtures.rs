use fedq_execution::{Row, ScalarValue};
use serde::{Deserialize, Serialize};

use crate::memory::MemoryConnector;

pub const REGIONS: [&str; 4] = ["Northeast", "Midwest", "South", "West"];
pub const SEGMENTS: [&str; 3] = ["SMB", "ENT", "Prosumer"];
pub const EVENT_TYPES: [&str; 4] = ["page_view", "add_to_cart", "checkout", "wishlist"];
const EVENT_WEIGHTS: [u64; 4] = [60, 20, 10, 10];
const ORDER_STATUSES: [&str; 3] = ["paid", "shipped", "cancelled"];

/// 2023-01-01 as days since the Unix epoch.
const ORDER_DATE_START_DAYS: i64 = 19_358;
/// Days from 2023-01-01 through 2025-09-01, inclusive.
const ORDER_DATE_SPAN_DAYS: u64 = 975;

/// Sizes and seed of the synthetic customers/orders/events dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub customers: usize,
    pub orders: usize,
    pub events: usize,
    pub seed: u64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            customers: 5_000,
            orders: 30_000,
            events: 100_000,
            seed: 42,
        }
    }
}

impl DatasetConfig {
    /// Full benchmark scale: 50k customers, 300k orders, 1M events.
    pub fn bench() -> Self {
        Self {
            customers: 50_000,
            orders: 300_000,
            events: 1_000_000,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub customers: Vec<Row>,
    pub orders: Vec<Row>,
    pub events: Vec<Row>,
}

impl Dataset {
    /// Load customers/orders into `relational` and events into `document`.
    pub fn load_into(self, relational: &MemoryConnector, document: &MemoryConnector) {
        relational.load_table("customers", self.customers);
        relational.load_table("orders", self.orders);
        document.load_table("events", self.events);
    }
}

/// Same config, same rows, every run.
pub fn generate_dataset(cfg: &DatasetConfig) -> Dataset {
    let mut rng = SplitMix64::new(cfg.seed);
    let n_customers = cfg.customers.max(1) as u64;

    let customers = (1..=cfg.customers as i64)
        .map(|cid| {
            Row::from_pairs([
                ("customer_id", ScalarValue::Int64(cid)),
                ("region", ScalarValue::from(*rng.choose(&REGIONS))),
                ("segment", ScalarValue::from(*rng.choose(&SEGMENTS))),
            ])
        })
        .collect();

    let orders = (1..=cfg.orders as i64)
        .map(|oid| {
            let cid = rng.below(n_customers) as i64 + 1;
            let day = ORDER_DATE_START_DAYS + rng.below(ORDER_DATE_SPAN_DAYS) as i64;
            let amount_cents = 500 + rng.below(49_501) as i64;
            Row::from_pairs([
                ("order_id", ScalarValue::Int64(oid)),
                ("customer_id", ScalarValue::Int64(cid)),
                ("order_date", ScalarValue::Utf8(date_string(day))),
                ("amount_cents", ScalarValue::Int64(amount_cents)),
                ("status", ScalarValue::from(*rng.choose(&ORDER_STATUSES))),
            ])
        })
        .collect();

    let events = (1..=cfg.events as i64)
        .map(|eid| {
            let cid = rng.below(n_customers) as i64 + 1;
            let event_type = EVENT_TYPES[rng.weighted(&EVENT_WEIGHTS)];
            let day = ORDER_DATE_START_DAYS + rng.below(ORDER_DATE_SPAN_DAYS) as i64;
            let secs = rng.below(86_400);
            let ts = format!(
                "{}T{:02}:{:02}:{:02}Z",
                date_string(day),
                secs / 3600,
                (secs / 60) % 60,
                secs % 60
            );
            Row::from_pairs([
                ("event_id", ScalarValue::Int64(eid)),
                ("customer_id", ScalarValue::Int64(cid)),
                ("event_type", ScalarValue::from(event_type)),
                ("ts", ScalarValue::Utf8(ts)),
            ])
        })
        .collect();

    Dataset {
        customers,
        orders,
        events,
    }
}

struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform in `0..n`; `n` must be non-zero.
    fn below(&mut self, n: u64) -> u64 {
        self.next_u64() % n
    }

    fn choose<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[self.below(items.len() as u64) as usize]
    }

    fn weighted(&mut self, weights: &[u64]) -> usize {
        let total = weights.iter().sum::<u64>();
        let mut pick = self.below(total);
        for (i, w) in weights.iter().enumerate() {
            if pick < *w {
                return i;
            }
            pick -= w;
        }
        weights.len() - 1
    }
}

/// `YYYY-MM-DD` for days since 1970-01-01 (proleptic Gregorian).
fn date_string(days: i64) -> String {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = yoe + era * 400 + i64::from(m <= 2);
    format!("{y:04}-{m:02}-{d:02}")
}
