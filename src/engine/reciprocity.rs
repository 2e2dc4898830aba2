//! Tit-for-Tat reciprocity tracker.
//!
//! Mirrors buyer concession behaviour with a damping factor alpha, so the AI
//! always concedes less than the buyer did:
//!
//!     ai_delta = alpha * buyer_delta   (0 < alpha < 1)

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuyerTrend {
    /// Buyer concessions increasing (eager buyer).
    Accelerating,
    /// Roughly constant.
    Stable,
    /// Buyer concessions shrinking (nearing their limit).
    Decelerating,
    /// Buyer not conceding at all.
    Stalled,
}

impl BuyerTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuyerTrend::Accelerating => "accelerating",
            BuyerTrend::Stable => "stable",
            BuyerTrend::Decelerating => "decelerating",
            BuyerTrend::Stalled => "stalled",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReciprocityTracker {
    alpha: f64,
    max_concession: f64,
    window: usize,
    buyer_offers: Vec<f64>,
}

impl ReciprocityTracker {
    /// `alpha` damping: buyer concedes 50 at alpha=0.6 and the AI concedes 30.
    /// `max_concession` caps the AI concession per round; `window` is the
    /// sliding window used for averaging buyer deltas.
    pub fn new(alpha: f64, max_concession: f64, window: usize) -> Self {
        Self {
            alpha,
            max_concession,
            window: window.max(1),
            buyer_offers: Vec::new(),
        }
    }

    pub fn record_buyer_offer(&mut self, price: f64) {
        self.buyer_offers.push(price);
    }

    /// Per-round buyer concession amounts (positive = buyer moved up).
    pub fn buyer_deltas(&self) -> Vec<f64> {
        self.buyer_offers
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .collect()
    }

    /// Average buyer concession over the sliding window.
    pub fn avg_buyer_delta(&self) -> f64 {
        let deltas = self.buyer_deltas();
        if deltas.is_empty() {
            return 0.0;
        }
        let recent = &deltas[deltas.len().saturating_sub(self.window)..];
        recent.iter().sum::<f64>() / recent.len() as f64
    }

    /// How much the AI should concede this round, based on buyer behaviour.
    /// A stalled or retreating buyer earns zero concession.
    pub fn compute_ai_concession(&self) -> f64 {
        let buyer_delta = self.avg_buyer_delta();
        if buyer_delta <= 0.0 {
            return 0.0;
        }
        (self.alpha * buyer_delta).min(self.max_concession)
    }

    /// Classify the buyer's concession trend over the window.
    pub fn detect_trend(&self) -> BuyerTrend {
        let deltas = self.buyer_deltas();
        if deltas.len() < 2 {
            return BuyerTrend::Stable;
        }
        let recent = &deltas[deltas.len().saturating_sub(self.window)..];
        if recent.iter().all(|d| *d <= 0.0) {
            return BuyerTrend::Stalled;
        }
        if recent.len() >= 2 {
            let slope = recent[recent.len() - 1] - recent[0];
            if slope > 5.0 {
                return BuyerTrend::Accelerating;
            }
            if slope < -5.0 {
                return BuyerTrend::Decelerating;
            }
        }
        BuyerTrend::Stable
    }

    /// Adjust alpha based on remaining time: identity below the halfway mark,
    /// then a linear ramp to 1.0 at the deadline.
    pub fn adaptive_alpha(&self, relative_time: f64) -> f64 {
        let r = relative_time.clamp(0.0, 1.0);
        self.alpha + (1.0 - self.alpha) * ((r - 0.5).max(0.0)) * 2.0
    }
}
