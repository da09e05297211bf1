use ironmaker_core::{DesiredQuote, LiveOrder, OrderRequest, Side};

/// Tolerances under which a live order is considered equal to the desired
/// quote and left untouched.
#[derive(Debug, Clone, Copy)]
pub struct DiffTolerance {
    pub price: f64,
    pub quantity: f64,
}

/// Actions to bring the book in line with one desired quote. Cancels must
/// complete before any placement to avoid duplicate exposure.
#[derive(Debug, Default)]
pub struct ReconcilePlan {
    pub cancels: Vec<LiveOrder>,
    pub places: Vec<OrderRequest>,
}

impl ReconcilePlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cancels.is_empty() && self.places.is_empty()
    }
}

/// Diffs the desired quote against live orders.
///
/// Per side: the first live order within tolerance is kept; every other
/// live order on that side is cancelled; a missing side with a desired
/// quote becomes a placement. Running the resulting plan and diffing again
/// yields an empty plan.
#[must_use]
pub fn diff(desired: &DesiredQuote, live: &[LiveOrder], tolerance: &DiffTolerance) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();

    for side in [Side::Buy, Side::Sell] {
        let want = desired.side(side);
        let mut kept = false;

        for order in live.iter().filter(|o| o.side == side) {
            let matches = want.is_some_and(|q| {
                (order.price - q.price).abs() < tolerance.price
                    && (order.quantity - q.quantity).abs() <= tolerance.quantity
            });
            if matches && !kept {
                kept = true;
            } else {
                plan.cancels.push(order.clone());
            }
        }

        if let Some(quote) = want {
            if !kept {
                plan.places.push(OrderRequest {
                    market: desired.market.clone(),
                    side,
                    price: quote.price,
                    quantity: quote.quantity,
                });
            }
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironmaker_core::{MarketId, QuoteSide};

    const TOL: DiffTolerance = DiffTolerance {
        price: 0.001,
        quantity: 0.01,
    };

    fn quote(buy: Option<(f64, f64)>, sell: Option<(f64, f64)>) -> DesiredQuote {
        DesiredQuote {
            market: MarketId::new("diam_iron"),
            buy: buy.map(|(price, quantity)| QuoteSide { price, quantity }),
            sell: sell.map(|(price, quantity)| QuoteSide { price, quantity }),
        }
    }

    fn order(side: Side, price: f64, quantity: f64, order_id: u64) -> LiveOrder {
        LiveOrder {
            market: MarketId::new("diam_iron"),
            side,
            price,
            quantity,
            order_id,
        }
    }

    #[test]
    fn empty_book_places_both_sides() {
        let plan = diff(&quote(Some((47.0, 2.0)), Some((53.0, 2.0))), &[], &TOL);
        assert!(plan.cancels.is_empty());
        assert_eq!(plan.places.len(), 2);
    }

    #[test]
    fn matching_orders_produce_an_empty_plan() {
        let live = [
            order(Side::Buy, 47.0, 2.0, 1),
            order(Side::Sell, 53.0, 2.0, 2),
        ];
        let plan = diff(&quote(Some((47.0, 2.0)), Some((53.0, 2.0))), &live, &TOL);
        assert!(plan.is_empty());
    }

    #[test]
    fn price_drift_beyond_tolerance_replaces_the_order() {
        let live = [order(Side::Buy, 46.5, 2.0, 1)];
        let plan = diff(&quote(Some((47.0, 2.0)), None), &live, &TOL);
        assert_eq!(plan.cancels.len(), 1);
        assert_eq!(plan.places.len(), 1);
        assert_eq!(plan.cancels[0].order_id, 1);
    }

    #[test]
    fn drift_within_tolerance_is_kept() {
        let live = [order(Side::Buy, 47.0005, 2.005, 1)];
        let plan = diff(&quote(Some((47.0, 2.0)), None), &live, &TOL);
        assert!(plan.is_empty());
    }

    #[test]
    fn duplicate_orders_on_a_side_are_pruned() {
        let live = [
            order(Side::Buy, 47.0, 2.0, 1),
            order(Side::Buy, 47.0, 2.0, 2),
            order(Side::Buy, 46.0, 1.0, 3),
        ];
        let plan = diff(&quote(Some((47.0, 2.0)), None), &live, &TOL);
        assert_eq!(plan.cancels.len(), 2);
        assert!(plan.places.is_empty());
    }

    #[test]
    fn a_dropped_side_cancels_its_live_orders() {
        let live = [
            order(Side::Buy, 47.0, 2.0, 1),
            order(Side::Sell, 53.0, 2.0, 2),
        ];
        let plan = diff(&quote(Some((47.0, 2.0)), None), &live, &TOL);
        assert_eq!(plan.cancels.len(), 1);
        assert_eq!(plan.cancels[0].side, Side::Sell);
        assert!(plan.places.is_empty());
    }

    #[test]
    fn replanning_after_execution_is_idempotent() {
        let desired = quote(Some((47.0, 2.0)), Some((53.0, 2.0)));
        let live = [order(Side::Buy, 46.0, 2.0, 1)];
        let plan = diff(&desired, &live, &TOL);

        // simulate executing the plan
        let mut after: Vec<LiveOrder> = live
            .iter()
            .filter(|o| !plan.cancels.iter().any(|c| c.order_id == o.order_id))
            .cloned()
            .collect();
        for (i, place) in plan.places.iter().enumerate() {
            after.push(order(place.side, place.price, place.quantity, 100 + i as u64));
        }

        assert!(diff(&desired, &after, &TOL).is_empty());
    }
}
