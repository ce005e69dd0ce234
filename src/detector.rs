use crate::types::{ItemSnapshot, PriceChange, PriceDirection, TrackedItem};

/// Compare a stored baseline against a fresh market snapshot.
///
/// Fires on any nonzero price delta — no magnitude threshold, no hysteresis.
/// A stored baseline of zero suppresses detection entirely: the first
/// observation after an add (or after the API reported a zero price) sets the
/// baseline without alerting. A *fetched* price of zero against a nonzero
/// baseline is not special-cased — it reports as a normal decrease.
pub fn detect(old: &TrackedItem, fresh: &ItemSnapshot) -> Option<PriceChange> {
    if fresh.price == old.last_price || old.last_price == 0 {
        return None;
    }

    let direction = if fresh.price > old.last_price {
        PriceDirection::Increase
    } else {
        PriceDirection::Decrease
    };

    Some(PriceChange {
        item_id: old.item_id,
        sid: old.sid,
        item_name: fresh.name.clone(),
        old_price: old.last_price,
        new_price: fresh.price,
        direction,
        stock: fresh.stock,
        last_sold_time: fresh.last_sold_time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracked(price: i64) -> TrackedItem {
        TrackedItem {
            item_id: 10007,
            sid: 0,
            name: "Grunil Helmet".to_string(),
            last_price: price,
            last_stock: 10,
            last_sold_time: 1_700_000_000,
            added_at: 1_700_000_000_000,
        }
    }

    fn fresh(price: i64) -> ItemSnapshot {
        ItemSnapshot {
            name: "Grunil Helmet".to_string(),
            price,
            stock: 12,
            last_sold_time: 1_700_000_100,
        }
    }

    #[test]
    fn equal_price_yields_nothing() {
        assert!(detect(&tracked(100_000), &fresh(100_000)).is_none());
    }

    #[test]
    fn zero_baseline_suppresses_detection() {
        // First observation after an add with a zero baseline: no alert,
        // even though the prices differ.
        assert!(detect(&tracked(0), &fresh(50_000)).is_none());
    }

    #[test]
    fn rise_above_nonzero_baseline_is_an_increase() {
        let change = detect(&tracked(100_000), &fresh(120_000)).expect("change");
        assert_eq!(change.direction, PriceDirection::Increase);
        assert_eq!(change.old_price, 100_000);
        assert_eq!(change.new_price, 120_000);
        assert_eq!(change.item_name, "Grunil Helmet");
        assert_eq!(change.stock, 12);
    }

    #[test]
    fn drop_below_nonzero_baseline_is_a_decrease() {
        let change = detect(&tracked(100_000), &fresh(80_000)).expect("change");
        assert_eq!(change.direction, PriceDirection::Decrease);
    }

    #[test]
    fn fetched_zero_against_nonzero_baseline_is_a_decrease() {
        // The zero guard only applies to the stored baseline.
        let change = detect(&tracked(100_000), &fresh(0)).expect("change");
        assert_eq!(change.direction, PriceDirection::Decrease);
        assert_eq!(change.new_price, 0);
    }

    #[test]
    fn one_silver_delta_qualifies() {
        assert!(detect(&tracked(100_000), &fresh(100_001)).is_some());
    }
}
