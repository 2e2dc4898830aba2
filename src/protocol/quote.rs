//! Beckn quote construction and ISO-8601 durations.

use crate::models::beckn::{BecknBreakupItem, BecknPrice, BecknQuote};
use crate::models::round2;

/// Convert seconds to an ISO 8601 duration: 300 -> "PT5M", 3600 -> "PT1H",
/// 90 -> "PT1M30S", 0 -> "PT0S".
pub fn seconds_to_iso_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    let mut out = String::from("PT");
    if hours > 0 {
        out.push_str(&format!("{hours}H"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}M"));
    }
    if secs > 0 {
        out.push_str(&format!("{secs}S"));
    }
    if out == "PT" {
        out.push_str("0S");
    }
    out
}

/// Parse the time portion of an ISO 8601 duration back into seconds.
/// Accepts the subset this service emits: PT[nH][nM][nS].
pub fn parse_iso_duration(raw: &str) -> Option<u64> {
    let rest = raw.strip_prefix("PT")?;
    if rest.is_empty() {
        return None;
    }

    let mut total: u64 = 0;
    let mut number = String::new();
    for c in rest.chars() {
        if c.is_ascii_digit() {
            number.push(c);
            continue;
        }
        let value: u64 = number.parse().ok()?;
        number.clear();
        total += match c {
            'H' => value * 3600,
            'M' => value * 60,
            'S' => value,
            _ => return None,
        };
    }
    if !number.is_empty() {
        return None;
    }
    Some(total)
}

/// Build a Beckn-compliant quote with a price breakup and TTL.
pub fn build_quote(
    price: f64,
    ttl_seconds: u64,
    delivery_charge: f64,
    discount: f64,
) -> BecknQuote {
    let mut breakup = vec![BecknBreakupItem {
        title: "Item Price".to_string(),
        price: BecknPrice {
            currency: "INR".to_string(),
            value: format_amount(price),
        },
    }];

    if delivery_charge > 0.0 {
        breakup.push(BecknBreakupItem {
            title: "Delivery Charge".to_string(),
            price: BecknPrice {
                currency: "INR".to_string(),
                value: format_amount(delivery_charge),
            },
        });
    }

    if discount > 0.0 {
        breakup.push(BecknBreakupItem {
            title: "Discount".to_string(),
            price: BecknPrice {
                currency: "INR".to_string(),
                value: format_amount(-discount),
            },
        });
    }

    let total = round2(price + delivery_charge - discount);

    BecknQuote {
        price: BecknPrice {
            currency: "INR".to_string(),
            value: format_amount(total),
        },
        breakup,
        ttl: seconds_to_iso_duration(ttl_seconds),
    }
}

fn format_amount(value: f64) -> String {
    format!("{:.2}", round2(value))
}
