//! Invisible coupon service.
//!
//! Checks backend promotions and applies discounts transparently; the
//! dialogue layer frames them as personal favours and never reveals a code.

use anyhow::Result;
use chrono::Utc;
use tracing::info;

use crate::models::round2;
use crate::store::records::{DiscountType, RecordStore};

#[derive(Debug, Clone)]
pub struct AppliedCoupon {
    pub promo_id: String,
    pub discount_amount: f64,
    /// Internal description, not shown to the buyer.
    pub description: String,
}

/// Find the best applicable promotion for this product at the current price.
/// Best means the largest absolute discount amount.
pub async fn find_applicable(
    records: &dyn RecordStore,
    product_id: &str,
    current_price: f64,
) -> Result<Option<AppliedCoupon>> {
    let candidates = records.active_promotions(product_id, Utc::now()).await?;

    let mut best: Option<AppliedCoupon> = None;
    for promo in candidates {
        if current_price < promo.min_price {
            continue;
        }
        let amount = match promo.discount_type {
            DiscountType::Percentage => current_price * (promo.discount_value / 100.0),
            DiscountType::Flat => promo.discount_value,
        };
        let amount = round2(amount);
        if best.as_ref().map_or(true, |b| amount > b.discount_amount) {
            best = Some(AppliedCoupon {
                promo_id: promo.id,
                discount_amount: amount,
                description: promo.description,
            });
        }
    }

    if let Some(coupon) = &best {
        info!(
            promo_id = %coupon.promo_id,
            discount = coupon.discount_amount,
            "applying invisible coupon"
        );
    }

    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::records::{Promotion, SqliteRecords, ALL_PRODUCTS};
    use chrono::Duration;

    fn store() -> SqliteRecords {
        let file = tempfile::NamedTempFile::new().unwrap();
        let (_, path) = file.keep().unwrap();
        SqliteRecords::new(path.to_str().unwrap()).unwrap()
    }

    fn promo(id: &str, product_id: &str, discount_type: DiscountType, value: f64, min_price: f64) -> Promotion {
        let now = Utc::now();
        Promotion {
            id: id.into(),
            product_id: product_id.into(),
            discount_type,
            discount_value: value,
            min_price,
            active: true,
            valid_from: now - Duration::minutes(1),
            valid_until: now + Duration::minutes(1),
            description: "test promo".into(),
        }
    }

    #[tokio::test]
    async fn no_promotions_no_coupon() {
        let store = store();
        assert!(find_applicable(&store, "p1", 900.0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn picks_largest_absolute_discount() {
        let store = store();
        store
            .upsert_promotion(&promo("flat-40", "p1", DiscountType::Flat, 40.0, 0.0))
            .await
            .unwrap();
        // 10% of 900 = 90: bigger than the flat 40
        store
            .upsert_promotion(&promo("pct-10", ALL_PRODUCTS, DiscountType::Percentage, 10.0, 0.0))
            .await
            .unwrap();

        let coupon = find_applicable(&store, "p1", 900.0).await.unwrap().unwrap();
        assert_eq!(coupon.promo_id, "pct-10");
        assert_eq!(coupon.discount_amount, 90.0);
    }

    #[tokio::test]
    async fn min_price_gate() {
        let store = store();
        store
            .upsert_promotion(&promo("big-spender", "p1", DiscountType::Flat, 100.0, 1000.0))
            .await
            .unwrap();

        assert!(find_applicable(&store, "p1", 900.0).await.unwrap().is_none());
        assert!(find_applicable(&store, "p1", 1000.0).await.unwrap().is_some());
    }
}
