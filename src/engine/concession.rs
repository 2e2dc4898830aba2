//! Time-dependent concession curve.
//!
//! P(t) = Pa + (Rs - Pa) * (t / T) ^ beta
//!
//! beta >> 1 is Boulware (hardliner, concedes late), beta == 1 linear,
//! beta < 1 a conceder that gives in early.

use rand::Rng;

use crate::models::round2;

/// Compute the seller's offer price at `current_round` of `max_rounds`.
///
/// `noise_pct` adds symmetric jitter as a fraction of |anchor - reservation|
/// so sophisticated buyers cannot fingerprint the curve. The result is
/// rounded to 2 decimals and clamped to [reservation, anchor].
pub fn compute_offer(
    anchor: f64,
    reservation: f64,
    current_round: u32,
    max_rounds: u32,
    beta: f64,
    noise_pct: f64,
) -> f64 {
    if max_rounds == 0 || current_round == 0 {
        return round2(anchor);
    }

    let t = current_round.min(max_rounds) as f64;
    let ratio = t / max_rounds as f64;

    let f_t = ratio.powf(beta);
    let mut price = anchor + (reservation - anchor) * f_t;

    if noise_pct > 0.0 {
        let spread = (anchor - reservation).abs() * noise_pct;
        price += rand::thread_rng().gen_range(-spread..=spread);
    }

    round2(price.clamp(reservation.min(anchor), anchor.max(reservation)))
}

/// Aspiration level in utility space [0, 1]:
/// a(t) = 1 - (1 - r) * (t/T)^beta
pub fn compute_aspiration(
    current_round: u32,
    max_rounds: u32,
    beta: f64,
    reserved_utility: f64,
) -> f64 {
    if max_rounds == 0 || current_round == 0 {
        return 1.0;
    }
    let t = current_round.min(max_rounds) as f64;
    let ratio = t / max_rounds as f64;
    1.0 - (1.0 - reserved_utility) * ratio.powf(beta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_zero_returns_anchor() {
        assert_eq!(compute_offer(1000.0, 700.0, 0, 10, 5.0, 0.0), 1000.0);
    }

    #[test]
    fn final_round_returns_reservation() {
        assert_eq!(compute_offer(1000.0, 700.0, 10, 10, 5.0, 0.0), 700.0);
    }

    #[test]
    fn boulware_holds_firm_mid_negotiation() {
        let price = compute_offer(1000.0, 700.0, 5, 10, 5.0, 0.0);
        assert!(price > 850.0);
    }

    #[test]
    fn linear_concedes_proportionally() {
        let price = compute_offer(1000.0, 700.0, 5, 10, 1.0, 0.0);
        assert!((845.0..=855.0).contains(&price));
    }

    #[test]
    fn conceder_drops_fast_early() {
        let price = compute_offer(1000.0, 700.0, 2, 10, 0.3, 0.0);
        assert!(price < 800.0);
    }

    #[test]
    fn clamped_to_band_past_deadline() {
        let price = compute_offer(1000.0, 700.0, 100, 10, 0.1, 0.0);
        assert!(price >= 700.0);
    }

    #[test]
    fn spot_check_beta3() {
        // 1000 + (700 - 1000) * 0.5^3 = 962.5
        let price = compute_offer(1000.0, 700.0, 5, 10, 3.0, 0.0);
        assert_eq!(price, 962.5);
    }

    #[test]
    fn max_rounds_zero_returns_anchor() {
        assert_eq!(compute_offer(1000.0, 700.0, 5, 0, 5.0, 0.0), 1000.0);
    }

    #[test]
    fn noise_stays_within_band() {
        for _ in 0..100 {
            let price = compute_offer(1000.0, 700.0, 5, 10, 1.0, 0.05);
            assert!((700.0..=1000.0).contains(&price));
            // 850 +/- 15 at most
            assert!((835.0..=865.0).contains(&price));
        }
    }

    #[test]
    fn aspiration_starts_at_one() {
        assert_eq!(compute_aspiration(0, 10, 5.0, 0.0), 1.0);
    }

    #[test]
    fn aspiration_ends_at_reserved_utility() {
        let a = compute_aspiration(10, 10, 5.0, 0.0);
        assert!(a.abs() < 0.01);
    }
}
