//! Synthetic price history for offline demos

use chrono::{Duration, Utc};
use ensemble_stock::Bar;
use rand::Rng;

pub const DEFAULT_BASE_PRICE: f64 = 2450.0;
const MAX_DAILY_MOVE: f64 = 0.02;
const VOLUME_RANGE: std::ops::RangeInclusive<u64> = 800_000..=1_500_000;

/// Daily random-walk bars ending today, oldest first
pub fn random_walk(rng: &mut impl Rng, days: usize, base_price: f64) -> Vec<Bar> {
    let today = Utc::now();
    let mut previous = base_price;

    (0..days)
        .map(|i| {
            let change = rng.random_range(-MAX_DAILY_MOVE..=MAX_DAILY_MOVE);
            let open = previous;
            let close = open * (1.0 + change);
            let high = open.max(close) * (1.0 + rng.random_range(0.0..0.01));
            let low = open.min(close) * (1.0 - rng.random_range(0.0..0.01));
            previous = close;

            Bar {
                timestamp: today - Duration::days((days - 1 - i) as i64),
                open,
                high,
                low,
                close,
                volume: rng.random_range(VOLUME_RANGE),
            }
        })
        .collect()
}
