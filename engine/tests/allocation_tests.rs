//! Allocation strategy tests
//!
//! Covers the three strategies over constrained stock:
//! - conservation: allocations never exceed available stock
//! - proportional fairness and largest-remainder distribution
//! - priority ordering with preferred-customer and waiting-time bonuses
//! - first-come-first-served ordering with missing timestamps

use chrono::{Duration, Utc};
use proptest::prelude::*;
use uuid::Uuid;

use engine::services::allocation::{allocate, score_demand};
use shared::models::{AllocationStrategy, DemandItem, FundingSource, Order, OrderStatus};

fn demand(requested: i32) -> DemandItem {
    DemandItem {
        order_id: Uuid::new_v4(),
        requested_quantity: requested,
        priority_score: None,
        order_timestamp: None,
        is_preferred_customer: false,
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn full_allocation_when_stock_covers_demand() {
        let demands = vec![demand(30), demand(20)];
        for strategy in [
            AllocationStrategy::Proportional,
            AllocationStrategy::Priority,
            AllocationStrategy::FirstComeFirstServed,
        ] {
            let results = allocate(50, &demands, strategy, Utc::now()).unwrap();
            assert_eq!(results.len(), 2);
            for (r, d) in results.iter().zip(&demands) {
                assert_eq!(r.order_id, d.order_id);
                assert_eq!(r.allocated_quantity, d.requested_quantity);
                assert_eq!(r.shortage_quantity, 0);
            }
        }
    }

    #[test]
    fn empty_demand_list_yields_empty_results() {
        let results = allocate(100, &[], AllocationStrategy::Proportional, Utc::now()).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn zero_stock_allocates_nothing() {
        let demands = vec![demand(10), demand(5)];
        let results = allocate(0, &demands, AllocationStrategy::Priority, Utc::now()).unwrap();
        for (r, d) in results.iter().zip(&demands) {
            assert_eq!(r.allocated_quantity, 0);
            assert_eq!(r.shortage_quantity, d.requested_quantity);
        }
    }

    #[test]
    fn negative_stock_rejected() {
        assert!(allocate(-1, &[demand(5)], AllocationStrategy::Proportional, Utc::now()).is_err());
    }

    #[test]
    fn non_positive_request_rejected() {
        assert!(allocate(10, &[demand(0)], AllocationStrategy::Proportional, Utc::now()).is_err());
    }

    #[test]
    fn proportional_splits_by_requested_share() {
        // 10 units over requests of 7 and 3: exact shares are 7.0 and 3.0
        let demands = vec![demand(7), demand(3)];
        let results = allocate(10, &demands, AllocationStrategy::Proportional, Utc::now()).unwrap();
        assert_eq!(results[0].allocated_quantity, 7);
        assert_eq!(results[1].allocated_quantity, 3);
    }

    #[test]
    fn proportional_largest_remainder_breaks_rounding() {
        // 10 units over requests of 6 and 9 (total 15): floors are 4 and 6,
        // exact shares 4.0 and 6.0, so no remainder units move
        let demands = vec![demand(6), demand(9)];
        let results = allocate(10, &demands, AllocationStrategy::Proportional, Utc::now()).unwrap();
        assert_eq!(results[0].allocated_quantity, 4);
        assert_eq!(results[1].allocated_quantity, 6);

        // 10 over 7, 7, 7 (total 21): floors 3+3+3 leave one unit; remainders
        // tie so the earliest demand wins it
        let demands = vec![demand(7), demand(7), demand(7)];
        let results = allocate(10, &demands, AllocationStrategy::Proportional, Utc::now()).unwrap();
        assert_eq!(
            results.iter().map(|r| r.allocated_quantity).collect::<Vec<_>>(),
            vec![4, 3, 3]
        );
    }

    #[test]
    fn proportional_never_exceeds_request() {
        let demands = vec![demand(1), demand(100)];
        let results = allocate(50, &demands, AllocationStrategy::Proportional, Utc::now()).unwrap();
        for (r, d) in results.iter().zip(&demands) {
            assert!(r.allocated_quantity <= d.requested_quantity);
            assert_eq!(
                r.shortage_quantity,
                d.requested_quantity - r.allocated_quantity
            );
        }
    }

    #[test]
    fn priority_serves_higher_score_first() {
        let mut high = demand(40);
        high.priority_score = Some(100);
        let mut low = demand(40);
        low.priority_score = Some(50);

        // Low-priority demand listed first; priority must still win
        let demands = vec![low.clone(), high.clone()];
        let results = allocate(50, &demands, AllocationStrategy::Priority, Utc::now()).unwrap();

        // Results come back in input order
        assert_eq!(results[0].order_id, low.order_id);
        assert_eq!(results[0].allocated_quantity, 10);
        assert_eq!(results[1].order_id, high.order_id);
        assert_eq!(results[1].allocated_quantity, 40);
    }

    #[test]
    fn priority_allocation_is_reproducible_for_a_fixed_clock() {
        let now = Utc::now();
        let mut waited = demand(40);
        waited.order_timestamp = Some(now - Duration::days(14));
        let mut fresh = demand(40);
        fresh.order_timestamp = Some(now);
        fresh.priority_score = Some(5);
        let demands = vec![fresh, waited];

        let first = allocate(50, &demands, AllocationStrategy::Priority, now).unwrap();
        let second = allocate(50, &demands, AllocationStrategy::Priority, now).unwrap();
        assert_eq!(first, second);

        // The waiting bonus follows the anchor, not the wall clock: the
        // 14-day head start beats the manual score of 5.
        assert_eq!(first[1].allocated_quantity, 40);
        assert_eq!(first[0].allocated_quantity, 10);
    }

    #[test]
    fn demand_carries_order_priority_fields() {
        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            customer_name: "Bistro Nakamura".to_string(),
            status: OrderStatus::Preorder,
            funding_source: FundingSource::Company,
            is_preferred_customer: true,
            priority: 25,
            ordered_at: now - Duration::days(3),
            created_at: now,
            updated_at: now,
        };

        let d = DemandItem::from_order(&order, 12);
        assert_eq!(d.order_id, order.id);
        assert_eq!(d.requested_quantity, 12);
        assert_eq!(d.priority_score, Some(25));
        assert_eq!(d.order_timestamp, Some(order.ordered_at));
        assert!(d.is_preferred_customer);

        // 25 base + 100 preferred + 3 waiting days
        assert_eq!(score_demand(&d, now), 128);
    }

    #[test]
    fn preferred_customer_outranks_plain_priority_gap() {
        let now = Utc::now();
        let mut preferred = demand(10);
        preferred.priority_score = Some(10);
        preferred.is_preferred_customer = true;
        let mut plain = demand(10);
        plain.priority_score = Some(60);

        assert!(score_demand(&preferred, now) > score_demand(&plain, now));
    }

    #[test]
    fn waiting_days_add_to_score() {
        let now = Utc::now();
        let mut old = demand(10);
        old.order_timestamp = Some(now - Duration::days(30));
        let mut fresh = demand(10);
        fresh.order_timestamp = Some(now);

        assert_eq!(score_demand(&old, now) - score_demand(&fresh, now), 30);
    }

    #[test]
    fn fcfs_serves_oldest_first_and_missing_timestamps_last() {
        let now = Utc::now();
        let mut oldest = demand(30);
        oldest.order_timestamp = Some(now - Duration::days(5));
        let mut newer = demand(30);
        newer.order_timestamp = Some(now - Duration::days(1));
        let undated = demand(30);

        let demands = vec![undated.clone(), newer.clone(), oldest.clone()];
        let results =
            allocate(40, &demands, AllocationStrategy::FirstComeFirstServed, Utc::now()).unwrap();

        let by_id = |id: Uuid| results.iter().find(|r| r.order_id == id).unwrap();
        assert_eq!(by_id(oldest.order_id).allocated_quantity, 30);
        assert_eq!(by_id(newer.order_id).allocated_quantity, 10);
        assert_eq!(by_id(undated.order_id).allocated_quantity, 0);
    }

    #[test]
    fn fcfs_ties_resolve_by_input_order() {
        let ts = Utc::now() - Duration::days(2);
        let mut a = demand(30);
        a.order_timestamp = Some(ts);
        let mut b = demand(30);
        b.order_timestamp = Some(ts);

        let results =
            allocate(
                30,
                &[a.clone(), b.clone()],
                AllocationStrategy::FirstComeFirstServed,
                Utc::now(),
            )
            .unwrap();
        assert_eq!(results[0].allocated_quantity, 30);
        assert_eq!(results[1].allocated_quantity, 0);
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn demands_strategy() -> impl Strategy<Value = Vec<DemandItem>> {
        prop::collection::vec((1i32..=500).prop_map(demand), 1..12)
    }

    fn strategy_strategy() -> impl Strategy<Value = AllocationStrategy> {
        prop_oneof![
            Just(AllocationStrategy::Proportional),
            Just(AllocationStrategy::Priority),
            Just(AllocationStrategy::FirstComeFirstServed),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Total allocated never exceeds available stock, and each demand
        /// never receives more than it asked for.
        #[test]
        fn prop_allocation_conserves_stock(
            available in 0i32..=2000,
            demands in demands_strategy(),
            strategy in strategy_strategy()
        ) {
            let results = allocate(available, &demands, strategy, Utc::now()).unwrap();
            prop_assert_eq!(results.len(), demands.len());

            let total: i32 = results.iter().map(|r| r.allocated_quantity).sum();
            prop_assert!(total <= available);

            for (r, d) in results.iter().zip(&demands) {
                prop_assert_eq!(r.order_id, d.order_id);
                prop_assert!(r.allocated_quantity >= 0);
                prop_assert!(r.allocated_quantity <= d.requested_quantity);
                prop_assert_eq!(
                    r.shortage_quantity,
                    d.requested_quantity - r.allocated_quantity
                );
            }
        }

        /// Under shortage every strategy hands out the full stock; nothing
        /// is left behind while a demand still wants units.
        #[test]
        fn prop_shortage_exhausts_stock(
            demands in demands_strategy(),
            strategy in strategy_strategy()
        ) {
            let total_requested: i32 = demands.iter().map(|d| d.requested_quantity).sum();
            prop_assume!(total_requested > 1);
            let available = total_requested / 2;

            let results = allocate(available, &demands, strategy, Utc::now()).unwrap();
            let total: i32 = results.iter().map(|r| r.allocated_quantity).sum();
            prop_assert_eq!(total, available);
        }

        /// When stock covers all demand, every strategy fully allocates.
        #[test]
        fn prop_sufficient_stock_fully_allocates(
            demands in demands_strategy(),
            strategy in strategy_strategy(),
            surplus in 0i32..=100
        ) {
            let total_requested: i32 = demands.iter().map(|d| d.requested_quantity).sum();
            let results = allocate(total_requested + surplus, &demands, strategy, Utc::now()).unwrap();
            for (r, d) in results.iter().zip(&demands) {
                prop_assert_eq!(r.allocated_quantity, d.requested_quantity);
                prop_assert_eq!(r.shortage_quantity, 0);
            }
        }
    }
}
