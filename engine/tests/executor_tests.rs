//! Allocation executor tests
//!
//! Covers the line-claiming rules used when stamping allocation results
//! onto order lines:
//! - unpinned lines are matched through their resolved default variant
//! - lines already carrying an allocation or shortage are never re-stamped
//! - two lines on the same variant each claim their own line

use chrono::Utc;
use proptest::prelude::*;
use uuid::Uuid;

use engine::services::executor::open_line;
use shared::models::OrderItem;

fn line(variant: Option<Uuid>, allocated: i32, shortage: i32) -> OrderItem {
    OrderItem {
        id: Uuid::new_v4(),
        order_id: Uuid::new_v4(),
        product_id: Uuid::new_v4(),
        variant_id: variant,
        quantity: 10,
        cost_price: None,
        allocated_quantity: allocated,
        shortage_quantity: shortage,
        created_at: Utc::now(),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn unpinned_line_claimed_through_default_variant() {
        let default_variant = Uuid::new_v4();
        let unpinned = line(None, 0, 0);
        let lines = vec![(unpinned.clone(), default_variant)];

        let claimed = open_line(&lines, default_variant).unwrap();
        assert_eq!(claimed.id, unpinned.id);
    }

    #[test]
    fn pinned_line_claimed_by_its_variant() {
        let variant = Uuid::new_v4();
        let other = Uuid::new_v4();
        let lines = vec![
            (line(Some(other), 0, 0), other),
            (line(Some(variant), 0, 0), variant),
        ];

        let claimed = open_line(&lines, variant).unwrap();
        assert_eq!(claimed.id, lines[1].0.id);
    }

    #[test]
    fn allocated_line_is_not_reclaimed() {
        let variant = Uuid::new_v4();
        let lines = vec![(line(Some(variant), 7, 3), variant)];
        assert!(open_line(&lines, variant).is_none());
    }

    #[test]
    fn backordered_line_is_not_reclaimed() {
        // Zero allocated but a recorded shortage still marks the line done
        let variant = Uuid::new_v4();
        let lines = vec![(line(Some(variant), 0, 10), variant)];
        assert!(open_line(&lines, variant).is_none());
    }

    #[test]
    fn two_lines_same_variant_claim_distinct_lines() {
        let variant = Uuid::new_v4();
        let first = line(Some(variant), 0, 0);
        let second = line(None, 0, 0);
        let mut lines = vec![(first.clone(), variant), (second.clone(), variant)];

        let claimed = open_line(&lines, variant).unwrap();
        assert_eq!(claimed.id, first.id);

        // Stamping the first line lets the next result reach the second
        lines[0].0.allocated_quantity = 4;
        lines[0].0.shortage_quantity = 6;
        let claimed = open_line(&lines, variant).unwrap();
        assert_eq!(claimed.id, second.id);

        lines[1].0.shortage_quantity = 10;
        assert!(open_line(&lines, variant).is_none());
    }

    #[test]
    fn unrelated_variant_yields_none() {
        let variant = Uuid::new_v4();
        let lines = vec![(line(Some(variant), 0, 0), variant)];
        assert!(open_line(&lines, Uuid::new_v4()).is_none());
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Claiming and stamping lines one result at a time visits every
        /// open matching line exactly once, oldest first, and never touches
        /// a claimed or foreign line.
        #[test]
        fn prop_claims_each_open_line_once_in_order(
            profile in prop::collection::vec((any::<bool>(), any::<bool>()), 0..12)
        ) {
            let target = Uuid::new_v4();
            let foreign = Uuid::new_v4();
            let mut lines: Vec<(OrderItem, Uuid)> = profile
                .iter()
                .map(|&(matches, touched)| {
                    let resolved = if matches { target } else { foreign };
                    let l = line(Some(resolved), 0, i32::from(touched) * 5);
                    (l, resolved)
                })
                .collect();

            let open_ids: Vec<Uuid> = lines
                .iter()
                .filter(|(l, v)| *v == target && l.shortage_quantity == 0)
                .map(|(l, _)| l.id)
                .collect();

            let mut claimed_ids = Vec::new();
            while let Some(l) = open_line(&lines, target) {
                claimed_ids.push(l.id);
                let id = l.id;
                let entry = lines.iter_mut().find(|(l, _)| l.id == id).unwrap();
                entry.0.allocated_quantity = 1;
                entry.0.shortage_quantity = 9;
            }

            prop_assert_eq!(claimed_ids, open_ids);
        }
    }
}
