//! Time-bucketed health counter: per-`(endpoint, model,
//! provider-hint)` triple rolling counters for `success`, `error`,
//! `skip`, aggregated into minute/hour/day buckets with retention
//! 60/24/30 respectively. Writes are the sole aggregator and are
//! serialized; reads never mutate.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// Seam for controlling "now" in tests — bucket rollup is otherwise
/// untestable. Production code uses [`SystemClock`]; tests use a
/// fixed/advanceable clock.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now_unix_secs(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix_secs(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_secs()
    }
}

/// `(endpoint, model, provider-hint)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HealthKey {
    pub endpoint: String,
    pub model: String,
    pub provider_hint: Option<String>,
}

impl HealthKey {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        provider_hint: Option<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            provider_hint,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Success,
    Error,
    Skip,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricCounts {
    pub success: u64,
    pub error: u64,
    pub skip: u64,
}

impl MetricCounts {
    fn add(&mut self, metric: Metric, amount: u64) {
        match metric {
            Metric::Success => self.success += amount,
            Metric::Error => self.error += amount,
            Metric::Skip => self.skip += amount,
        }
    }

    fn merge(&mut self, other: &MetricCounts) {
        self.success += other.success;
        self.error += other.error;
        self.skip += other.skip;
    }
}

/// A metric's count broken down by which bucket tier it currently
/// lives in, mirroring the storage tiers §4.7 aggregates into.
#[derive(Debug, Clone, Copy, Default)]
pub struct BucketBreakdown {
    pub minute: u64,
    pub hour: u64,
    pub day: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricStats {
    pub total: u64,
    pub last_hour: u64,
    pub last_day: u64,
    pub buckets: BucketBreakdown,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KeyStats {
    pub success: MetricStats,
    pub error: MetricStats,
    pub skip: MetricStats,
}

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
const MINUTE_RETENTION: u64 = HOUR;
const HOUR_RETENTION: u64 = DAY;
const DAY_RETENTION: u64 = 30 * DAY;

fn floor_to(ts: u64, unit: u64) -> u64 {
    (ts / unit) * unit
}

#[derive(Debug, Default)]
struct KeyBuckets {
    minute: BTreeMap<u64, MetricCounts>,
    hour: BTreeMap<u64, MetricCounts>,
    day: BTreeMap<u64, MetricCounts>,
}

#[derive(Debug)]
pub struct HealthCounter {
    clock: Arc<dyn Clock>,
    store: Mutex<HashMap<HealthKey, KeyBuckets>>,
}

impl HealthCounter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            store: Mutex::new(HashMap::new()),
        }
    }

    pub fn new_in_memory() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    /// Lands `amount` in the current minute bucket, then rolls stale
    /// minute buckets into hour buckets, stale hour buckets into day
    /// buckets, then drops day buckets past retention — all in one
    /// critical section.
    pub fn increment(&self, key: &HealthKey, metric: Metric, amount: u64) {
        let now = self.clock.now_unix_secs();
        let mut store = self.store.lock().expect("health counter lock poisoned");
        let buckets = store.entry(key.clone()).or_default();

        let minute_ts = floor_to(now, MINUTE);
        buckets
            .minute
            .entry(minute_ts)
            .or_default()
            .add(metric, amount);

        let minute_cutoff = now.saturating_sub(MINUTE_RETENTION);
        let stale_minutes: Vec<u64> = buckets
            .minute
            .range(..=minute_cutoff)
            .map(|(&ts, _)| ts)
            .collect();
        for ts in stale_minutes {
            if let Some(counts) = buckets.minute.remove(&ts) {
                buckets
                    .hour
                    .entry(floor_to(ts, HOUR))
                    .or_default()
                    .merge(&counts);
            }
        }

        let hour_cutoff = now.saturating_sub(HOUR_RETENTION);
        let stale_hours: Vec<u64> = buckets
            .hour
            .range(..=hour_cutoff)
            .map(|(&ts, _)| ts)
            .collect();
        for ts in stale_hours {
            if let Some(counts) = buckets.hour.remove(&ts) {
                buckets
                    .day
                    .entry(floor_to(ts, DAY))
                    .or_default()
                    .merge(&counts);
            }
        }

        let day_cutoff = now.saturating_sub(DAY_RETENTION);
        let stale_days: Vec<u64> = buckets
            .day
            .range(..day_cutoff)
            .map(|(&ts, _)| ts)
            .collect();
        for ts in stale_days {
            buckets.day.remove(&ts);
        }
    }

    /// Raw lifetime counts for `key` across every bucket tier,
    /// regardless of age — this is what the cascade's back-off
    /// decision and success-reset act on (skip when `errors > 0` and
    /// `skips < errors`).
    pub fn counts(&self, key: &HealthKey) -> MetricCounts {
        let store = self.store.lock().expect("health counter lock poisoned");
        let Some(buckets) = store.get(key) else {
            return MetricCounts::default();
        };
        let mut total = MetricCounts::default();
        for counts in buckets.minute.values() {
            total.merge(counts);
        }
        for counts in buckets.hour.values() {
            total.merge(counts);
        }
        for counts in buckets.day.values() {
            total.merge(counts);
        }
        total
    }

    /// `{metric: {total, last_hour, last_day, buckets: {minute, hour,
    /// day}}}`. A pure read: filters buckets by a `since` threshold and
    /// sums, never mutates.
    pub fn get_stats(&self, key: &HealthKey) -> KeyStats {
        let now = self.clock.now_unix_secs();
        let hour_since = now.saturating_sub(HOUR);
        let day_since = now.saturating_sub(DAY);

        let store = self.store.lock().expect("health counter lock poisoned");
        let Some(buckets) = store.get(key) else {
            return KeyStats::default();
        };

        let mut total = MetricCounts::default();
        let mut last_hour = MetricCounts::default();
        let mut last_day = MetricCounts::default();

        let mut minute_tier = MetricCounts::default();
        let mut hour_tier = MetricCounts::default();
        let mut day_tier = MetricCounts::default();

        let tiers: [(&BTreeMap<u64, MetricCounts>, &mut MetricCounts); 3] = [
            (&buckets.minute, &mut minute_tier),
            (&buckets.hour, &mut hour_tier),
            (&buckets.day, &mut day_tier),
        ];
        for (tier, tier_total) in tiers {
            for (ts, counts) in tier {
                total.merge(counts);
                tier_total.merge(counts);
                if *ts >= hour_since {
                    last_hour.merge(counts);
                }
                if *ts >= day_since {
                    last_day.merge(counts);
                }
            }
        }

        KeyStats {
            success: MetricStats {
                total: total.success,
                last_hour: last_hour.success,
                last_day: last_day.success,
                buckets: BucketBreakdown {
                    minute: minute_tier.success,
                    hour: hour_tier.success,
                    day: day_tier.success,
                },
            },
            error: MetricStats {
                total: total.error,
                last_hour: last_hour.error,
                last_day: last_day.error,
                buckets: BucketBreakdown {
                    minute: minute_tier.error,
                    hour: hour_tier.error,
                    day: day_tier.error,
                },
            },
            skip: MetricStats {
                total: total.skip,
                last_hour: last_hour.skip,
                last_day: last_day.skip,
                buckets: BucketBreakdown {
                    minute: minute_tier.skip,
                    hour: hour_tier.skip,
                    day: day_tier.skip,
                },
            },
        }
    }

    /// Records a success and clears `error`/`skip` for `key` in the
    /// same critical section. Success history itself is left
    /// untouched — only the back-off counters are cleared.
    pub fn record_success(&self, key: &HealthKey) {
        let now = self.clock.now_unix_secs();
        let mut store = self.store.lock().expect("health counter lock poisoned");
        let buckets = store.entry(key.clone()).or_default();

        let minute_ts = floor_to(now, MINUTE);
        buckets
            .minute
            .entry(minute_ts)
            .or_default()
            .add(Metric::Success, 1);

        for tier in [&mut buckets.minute, &mut buckets.hour, &mut buckets.day] {
            for counts in tier.values_mut() {
                counts.error = 0;
                counts.skip = 0;
            }
        }
    }

    /// Clears one key, or every key when `key` is `None`.
    pub fn reset(&self, key: Option<&HealthKey>) {
        let mut store = self.store.lock().expect("health counter lock poisoned");
        match key {
            Some(key) => {
                store.remove(key);
            }
            None => store.clear(),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::FixedClock;
    use super::*;

    fn key() -> HealthKey {
        HealthKey::new("ep", "model", None)
    }

    #[test]
    fn increment_lands_in_current_minute_bucket() {
        let counter = HealthCounter::new(Arc::new(FixedClock::new(1_000)));
        counter.increment(&key(), Metric::Success, 1);
        assert_eq!(counter.counts(&key()).success, 1);
    }

    #[test]
    fn skip_is_gated_by_error_count() {
        let counter = HealthCounter::new(Arc::new(FixedClock::new(0)));
        let k = key();
        counter.increment(&k, Metric::Error, 1);

        let counts = counter.counts(&k);
        assert!(counts.error > 0 && counts.skip < counts.error);

        counter.increment(&k, Metric::Skip, 1);
        let counts = counter.counts(&k);
        assert_eq!(counts.skip, counts.error);
    }

    #[test]
    fn success_reset_clears_error_and_skip() {
        let counter = HealthCounter::new(Arc::new(FixedClock::new(0)));
        let k = key();
        counter.increment(&k, Metric::Error, 2);
        counter.increment(&k, Metric::Skip, 1);
        counter.reset(Some(&k));
        let counts = counter.counts(&k);
        assert_eq!(counts, MetricCounts::default());
    }

    #[test]
    fn bucket_rollup_moves_stale_minute_into_hour_bucket() {
        let clock = Arc::new(FixedClock::new(10_000));
        let counter = HealthCounter::new(clock.clone());
        let k = key();
        let t = 10_000u64;

        counter.increment(&k, Metric::Success, 1);
        clock.advance(61 * 60);
        counter.increment(&k, Metric::Success, 1);

        let store = counter.store.lock().unwrap();
        let buckets = store.get(&k).unwrap();
        let now = clock.now_unix_secs();
        for ts in buckets.minute.keys() {
            assert!(now - ts <= HOUR, "no minute bucket should be older than 60 minutes");
        }
        let expected_hour = floor_to(t, HOUR);
        assert!(buckets.hour.contains_key(&expected_hour));
        assert_eq!(buckets.hour[&expected_hour].success, 1);
    }

    #[test]
    fn get_stats_breaks_counts_down_by_bucket_tier() {
        let clock = Arc::new(FixedClock::new(10_000));
        let counter = HealthCounter::new(clock.clone());
        let k = key();

        counter.increment(&k, Metric::Success, 1);
        clock.advance(61 * 60);
        counter.increment(&k, Metric::Success, 1);

        let stats = counter.get_stats(&k);
        assert_eq!(stats.success.total, 2);
        assert_eq!(stats.success.buckets.hour, 1);
        assert_eq!(stats.success.buckets.minute, 1);
        assert_eq!(stats.success.buckets.day, 0);
    }

    #[test]
    fn reset_all_clears_every_key() {
        let counter = HealthCounter::new(Arc::new(FixedClock::new(0)));
        counter.increment(&HealthKey::new("a", "m", None), Metric::Error, 1);
        counter.increment(&HealthKey::new("b", "m", None), Metric::Error, 1);
        counter.reset(None);
        assert_eq!(counter.counts(&HealthKey::new("a", "m", None)).error, 0);
        assert_eq!(counter.counts(&HealthKey::new("b", "m", None)).error, 0);
    }
}
