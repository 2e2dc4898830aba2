//! Bot detection heuristics.
//!
//! Composite scoring from two signals:
//!   - timing: inter-message speed and consistency
//!   - offer pattern: fixed increments or near-algorithmic curves
//!
//! Score bands: below 0.3 looks human, 0.3 to 0.7 is suspicious (tighten
//! strategy), above 0.7 is likely a bot (extreme boulware).

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

const MAX_DETECTORS: usize = 1000;
const EVICT_BATCH: usize = 500;

#[derive(Debug, Clone)]
pub struct BotDetector {
    timing_weight: f64,
    pattern_weight: f64,
    min_interval_sec: f64,
    max_stddev_sec: f64,
    timestamps: Vec<DateTime<Utc>>,
    offers: Vec<f64>,
}

impl Default for BotDetector {
    fn default() -> Self {
        Self::new(0.5, 0.5, 2.0, 0.5)
    }
}

impl BotDetector {
    pub fn new(
        timing_weight: f64,
        pattern_weight: f64,
        min_interval_sec: f64,
        max_stddev_sec: f64,
    ) -> Self {
        Self {
            timing_weight,
            pattern_weight,
            min_interval_sec,
            max_stddev_sec,
            timestamps: Vec::new(),
            offers: Vec::new(),
        }
    }

    pub fn record(&mut self, timestamp: DateTime<Utc>, offer: f64) {
        self.timestamps.push(timestamp);
        self.offers.push(offer);
    }

    /// Score 0-1 on how bot-like the message timing is. Needs 3 samples.
    pub fn score_timing(&self) -> f64 {
        if self.timestamps.len() < 3 {
            return 0.0;
        }

        let intervals: Vec<f64> = self
            .timestamps
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).num_milliseconds() as f64 / 1000.0)
            .collect();

        let avg_interval = mean(&intervals);
        let speed_score = (1.0 - avg_interval / (self.min_interval_sec * 3.0)).max(0.0);

        let consistency_score = if intervals.len() >= 3 {
            (1.0 - stddev(&intervals) / self.max_stddev_sec).max(0.0)
        } else {
            0.0
        };

        ((speed_score + consistency_score) / 2.0).min(1.0)
    }

    /// Score 0-1 on how algorithmic the offer pattern is. Needs 4 offers.
    pub fn score_pattern(&self) -> f64 {
        if self.offers.len() < 4 {
            return 0.0;
        }

        let deltas: Vec<f64> = self.offers.windows(2).map(|p| p[1] - p[0]).collect();

        // Fixed-increment pattern: all rounded deltas identical
        let first = (deltas[0] * 100.0).round();
        if deltas.iter().all(|d| (d * 100.0).round() == first) {
            return 1.0;
        }

        // Near-fixed-increment: very low coefficient of variation
        if deltas.len() >= 3 {
            let mean_delta = mean(&deltas).abs();
            let mean_delta = if mean_delta == 0.0 { 1.0 } else { mean_delta };
            let cv = stddev(&deltas) / mean_delta;
            if cv < 0.05 {
                return 0.9;
            }
            if cv < 0.15 {
                return 0.5;
            }
        }

        0.0
    }

    /// Composite bot score in [0, 1], rounded to 3 decimals.
    pub fn compute_bot_score(&self) -> f64 {
        let raw = self.timing_weight * self.score_timing() + self.pattern_weight * self.score_pattern();
        (raw * 1000.0).round() / 1000.0
    }

    /// If the buyer looks like a bot, be tougher (higher beta) for this round.
    pub fn recommended_beta(bot_score: f64, base_beta: f64) -> f64 {
        if bot_score > 0.7 {
            base_beta.max(20.0)
        } else if bot_score > 0.3 {
            base_beta.max(10.0)
        } else {
            base_beta
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Process-local map of per-session detectors, bounded so abandoned sessions
/// cannot grow it without limit. An insert at the bound first drops the
/// oldest half, so the map never exceeds 1000 entries; terminal sessions are
/// evicted immediately by the orchestrator.
pub struct DetectorRegistry {
    inner: Mutex<RegistryInner>,
}

struct RegistryInner {
    detectors: HashMap<String, BotDetector>,
    insertion_order: VecDeque<String>,
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                detectors: HashMap::new(),
                insertion_order: VecDeque::new(),
            }),
        }
    }

    /// Run `f` against the session's detector, creating it if absent.
    pub fn with<R>(&self, session_id: &str, f: impl FnOnce(&mut BotDetector) -> R) -> R {
        let mut inner = self.inner.lock();
        if !inner.detectors.contains_key(session_id) {
            if inner.detectors.len() >= MAX_DETECTORS {
                for _ in 0..EVICT_BATCH {
                    let Some(oldest) = inner.insertion_order.pop_front() else {
                        break;
                    };
                    inner.detectors.remove(&oldest);
                }
            }
            inner.insertion_order.push_back(session_id.to_string());
        }
        let detector = inner
            .detectors
            .entry(session_id.to_string())
            .or_default();
        f(detector)
    }

    pub fn evict(&self, session_id: &str) {
        let mut inner = self.inner.lock();
        inner.detectors.remove(session_id);
        inner.insertion_order.retain(|id| id != session_id);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn insufficient_data_returns_zero() {
        let mut d = BotDetector::default();
        d.record(base_time(), 500.0);
        d.record(base_time(), 520.0);
        assert_eq!(d.compute_bot_score(), 0.0);
    }

    #[test]
    fn rapid_fire_high_timing_score() {
        let mut d = BotDetector::default();
        for i in 0..5 {
            d.record(
                base_time() + chrono::Duration::milliseconds(300 * i),
                500.0 + i as f64 * 10.0,
            );
        }
        assert!(d.score_timing() > 0.5);
    }

    #[test]
    fn natural_timing_low_score() {
        let mut d = BotDetector::default();
        for (i, secs) in [0i64, 7, 12, 20, 28].iter().enumerate() {
            d.record(
                base_time() + chrono::Duration::seconds(*secs),
                500.0 + i as f64 * 23.0,
            );
        }
        assert!(d.score_timing() < 0.3);
    }

    #[test]
    fn fixed_increment_high_pattern_score() {
        let mut d = BotDetector::default();
        for i in 0..6 {
            d.record(
                base_time() + chrono::Duration::seconds(i * 10),
                500.0 + i as f64 * 50.0,
            );
        }
        assert_eq!(d.score_pattern(), 1.0);
    }

    #[test]
    fn varied_offers_low_pattern_score() {
        let mut d = BotDetector::default();
        for (i, price) in [500.0, 530.0, 545.0, 560.0, 590.0, 600.0].iter().enumerate() {
            d.record(base_time() + chrono::Duration::seconds(i as i64 * 10), *price);
        }
        assert!(d.score_pattern() < 0.5);
    }

    #[test]
    fn fixed_increment_rapid_stream_scores_botlike() {
        // 6 offers, +50 each, 1 second apart: unmistakably automated
        let mut d = BotDetector::default();
        for i in 0..6 {
            d.record(
                base_time() + chrono::Duration::seconds(i),
                500.0 + i as f64 * 50.0,
            );
        }
        assert!(d.compute_bot_score() >= 0.9);
    }

    #[test]
    fn score_non_decreasing_for_fixed_stream() {
        let mut d = BotDetector::default();
        let mut last = 0.0;
        for i in 0..10 {
            d.record(
                base_time() + chrono::Duration::seconds(i),
                500.0 + i as f64 * 50.0,
            );
            let score = d.compute_bot_score();
            assert!((0.0..=1.0).contains(&score));
            if i >= 4 {
                assert!(score >= last);
            }
            last = score;
        }
    }

    #[test]
    fn recommended_beta_bands() {
        assert_eq!(BotDetector::recommended_beta(0.1, 5.0), 5.0);
        assert_eq!(BotDetector::recommended_beta(0.5, 5.0), 10.0);
        assert_eq!(BotDetector::recommended_beta(0.8, 5.0), 20.0);
        // an already-tough base beta is never lowered
        assert_eq!(BotDetector::recommended_beta(0.8, 25.0), 25.0);
    }

    #[test]
    fn registry_evicts_oldest_half_at_bound() {
        let registry = DetectorRegistry::new();
        for i in 0..MAX_DETECTORS {
            registry.with(&format!("session-{i}"), |_| {});
        }
        assert_eq!(registry.len(), MAX_DETECTORS);

        // an insert at the bound drops the oldest 500 first, so the map
        // never exceeds MAX_DETECTORS entries
        registry.with("one-more", |_| {});
        assert_eq!(registry.len(), MAX_DETECTORS - EVICT_BATCH + 1);

        // the oldest entries are the ones that went; the newest survive
        registry.with(&format!("session-{}", MAX_DETECTORS - 1), |d| {
            assert!(d.compute_bot_score() >= 0.0)
        });
        assert_eq!(registry.len(), MAX_DETECTORS - EVICT_BATCH + 1);
    }

    #[test]
    fn registry_eviction_is_immediate() {
        let registry = DetectorRegistry::new();
        registry.with("s1", |d| d.record(base_time(), 500.0));
        assert_eq!(registry.len(), 1);
        registry.evict("s1");
        assert!(registry.is_empty());
    }
}
