//! Reservation planning tests
//!
//! Covers FIFO consumption planning across lots, whole-request failure on
//! shortfall, weighted cost of the drawn units, and release clamping.

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

use engine::services::reservation::{plan_fifo_consumption, plan_release};
use shared::models::{InventoryLot, Warehouse};

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// Build a lot with the given split. Lots are handed to the planners in
/// slice order, mirroring the preference ordering used at reserve time.
fn lot(warehouse: Warehouse, reserved: i32, available: i32, cost_basis: Decimal) -> InventoryLot {
    let now = Utc::now();
    InventoryLot {
        id: Uuid::new_v4(),
        variant_id: Uuid::new_v4(),
        warehouse,
        quantity: reserved + available,
        reserved,
        available,
        cost_basis,
        created_at: now,
        updated_at: now,
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn consumption_drains_lots_in_order() {
        let lots = vec![
            lot(Warehouse::Company, 0, 30, dec("10.00")),
            lot(Warehouse::Private, 0, 50, dec("14.00")),
        ];

        let plan = plan_fifo_consumption(&lots, 40).unwrap();
        assert_eq!(plan.quantity, 40);
        assert_eq!(plan.draws.len(), 2);
        assert_eq!(plan.draws[0].lot_id, lots[0].id);
        assert_eq!(plan.draws[0].units, 30);
        assert_eq!(plan.draws[1].lot_id, lots[1].id);
        assert_eq!(plan.draws[1].units, 10);
    }

    #[test]
    fn consumption_cost_reflects_lots_drawn() {
        let lots = vec![
            lot(Warehouse::Company, 0, 30, dec("10.00")),
            lot(Warehouse::Private, 0, 50, dec("14.00")),
        ];

        // 30 at 10.00 plus 10 at 14.00
        let plan = plan_fifo_consumption(&lots, 40).unwrap();
        assert_eq!(plan.total_cost, dec("440.00"));
        assert_eq!(plan.unit_cost(), dec("11.00"));
    }

    #[test]
    fn consumption_skips_fully_reserved_lots() {
        let lots = vec![
            lot(Warehouse::Company, 20, 0, dec("10.00")),
            lot(Warehouse::Private, 0, 25, dec("14.00")),
        ];

        let plan = plan_fifo_consumption(&lots, 25).unwrap();
        assert_eq!(plan.draws.len(), 1);
        assert_eq!(plan.draws[0].lot_id, lots[1].id);
        assert_eq!(plan.draws[0].units, 25);
    }

    #[test]
    fn shortfall_fails_whole_request() {
        let lots = vec![
            lot(Warehouse::Company, 10, 15, dec("10.00")),
            lot(Warehouse::Private, 0, 5, dec("14.00")),
        ];

        // 20 available in total; reserved units never count
        let err = plan_fifo_consumption(&lots, 21).unwrap_err();
        assert_eq!(err, 20);
    }

    #[test]
    fn empty_lot_set_reports_zero_available() {
        let err = plan_fifo_consumption(&[], 1).unwrap_err();
        assert_eq!(err, 0);
    }

    #[test]
    fn release_clamps_to_total_reserved() {
        let lots = vec![
            lot(Warehouse::Company, 8, 2, dec("10.00")),
            lot(Warehouse::Private, 4, 0, dec("14.00")),
        ];

        let draws = plan_release(&lots, 20);
        let released: i32 = draws.iter().map(|d| d.units).sum();
        assert_eq!(released, 12);
    }

    #[test]
    fn release_stops_once_satisfied() {
        let lots = vec![
            lot(Warehouse::Company, 8, 0, dec("10.00")),
            lot(Warehouse::Private, 9, 0, dec("14.00")),
        ];

        let draws = plan_release(&lots, 10);
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].units, 8);
        assert_eq!(draws[1].units, 2);
    }

    #[test]
    fn release_of_nothing_reserved_is_empty() {
        let lots = vec![lot(Warehouse::Company, 0, 10, dec("10.00"))];
        assert!(plan_release(&lots, 5).is_empty());
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn cost_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..=50000i64).prop_map(|n| Decimal::new(n, 2))
    }

    fn lots_strategy() -> impl Strategy<Value = Vec<InventoryLot>> {
        prop::collection::vec(
            (0i32..=100, 0i32..=100, cost_strategy(), prop::bool::ANY).prop_map(
                |(reserved, available, cost, company)| {
                    let warehouse = if company {
                        Warehouse::Company
                    } else {
                        Warehouse::Private
                    };
                    lot(warehouse, reserved, available, cost)
                },
            ),
            0..6,
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// A successful plan draws exactly the requested units, never more
        /// than a lot has available, and earlier lots are exhausted before
        /// later ones contribute.
        #[test]
        fn prop_fifo_plan_is_exact_and_ordered(
            lots in lots_strategy(),
            needed in 1i32..=400
        ) {
            let total_available: i32 = lots.iter().map(|l| l.available).sum();
            match plan_fifo_consumption(&lots, needed) {
                Ok(plan) => {
                    prop_assert!(total_available >= needed);
                    let drawn: i32 = plan.draws.iter().map(|d| d.units).sum();
                    prop_assert_eq!(drawn, needed);

                    for draw in &plan.draws {
                        let source = lots.iter().find(|l| l.id == draw.lot_id).unwrap();
                        prop_assert!(draw.units > 0);
                        prop_assert!(draw.units <= source.available);
                        prop_assert_eq!(draw.unit_cost, source.cost_basis);
                    }

                    // All draws but the last must fully drain their lot
                    for draw in plan.draws.iter().rev().skip(1) {
                        let source = lots.iter().find(|l| l.id == draw.lot_id).unwrap();
                        prop_assert_eq!(draw.units, source.available);
                    }
                }
                Err(available) => {
                    prop_assert_eq!(available, total_available);
                    prop_assert!(total_available < needed);
                }
            }
        }

        /// Total cost equals the sum of units times each source lot's basis.
        #[test]
        fn prop_plan_cost_matches_draws(
            lots in lots_strategy(),
            needed in 1i32..=400
        ) {
            if let Ok(plan) = plan_fifo_consumption(&lots, needed) {
                let expected: Decimal = plan
                    .draws
                    .iter()
                    .map(|d| d.unit_cost * Decimal::from(d.units))
                    .sum();
                prop_assert_eq!(plan.total_cost, expected);
            }
        }

        /// Release never exceeds the requested amount nor any lot's reserved
        /// count, and releases min(requested, total reserved) in total.
        #[test]
        fn prop_release_clamps(
            lots in lots_strategy(),
            requested in 1i32..=400
        ) {
            let total_reserved: i32 = lots.iter().map(|l| l.reserved).sum();
            let draws = plan_release(&lots, requested);
            let released: i32 = draws.iter().map(|d| d.units).sum();

            prop_assert_eq!(released, requested.min(total_reserved));
            for draw in &draws {
                let source = lots.iter().find(|l| l.id == draw.lot_id).unwrap();
                prop_assert!(draw.units <= source.reserved);
            }
        }
    }
}
