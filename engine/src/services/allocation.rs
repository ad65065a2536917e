//! Allocation strategies for distributing scarce stock across competing demands
//!
//! `allocate` is a pure function of its inputs: no locking, no I/O. The
//! executor applies its results against the ledger afterwards.
//!
//! Contract, for every strategy: one result per input demand (in input
//! order, including zero allocations), `sum(allocated) <= available_stock`,
//! and per item `allocated + shortage == requested`.

use chrono::{DateTime, Utc};

use crate::error::{AppError, AppResult};
use crate::models::{AllocationResult, AllocationStrategy, DemandItem};

/// Score bonus for preferred customers under the priority strategy
pub const PREFERRED_CUSTOMER_BONUS: i64 = 100;

/// Score bonus per full day an order has been waiting
pub const WAITING_DAY_BONUS: i64 = 1;

/// Distribute `available_stock` units across `demands`.
///
/// `now` anchors the waiting-time bonus under the priority strategy, so
/// the same inputs always produce the same allocation.
pub fn allocate(
    available_stock: i32,
    demands: &[DemandItem],
    strategy: AllocationStrategy,
    now: DateTime<Utc>,
) -> AppResult<Vec<AllocationResult>> {
    if available_stock < 0 {
        return Err(AppError::validation(
            "available_stock",
            "Available stock cannot be negative",
        ));
    }
    for demand in demands {
        if demand.requested_quantity <= 0 {
            return Err(AppError::validation(
                "requested_quantity",
                format!(
                    "Demand for order {} must request a positive quantity",
                    demand.order_id
                ),
            ));
        }
    }

    let total_requested: i64 = demands
        .iter()
        .map(|d| d.requested_quantity as i64)
        .sum();

    // No scarcity: everyone is fully allocated regardless of strategy.
    if total_requested <= available_stock as i64 {
        return Ok(demands
            .iter()
            .map(|d| AllocationResult {
                order_id: d.order_id,
                requested_quantity: d.requested_quantity,
                allocated_quantity: d.requested_quantity,
                shortage_quantity: 0,
            })
            .collect());
    }

    let allocated = match strategy {
        AllocationStrategy::Proportional => {
            allocate_proportional(available_stock, demands, total_requested)
        }
        AllocationStrategy::Priority => allocate_greedy_by(available_stock, demands, |order| {
            let mut keyed: Vec<usize> = order.to_vec();
            let scores: Vec<i64> = demands.iter().map(|d| score_demand(d, now)).collect();
            // Stable: ties keep input order.
            keyed.sort_by(|&a, &b| scores[b].cmp(&scores[a]));
            keyed
        }),
        AllocationStrategy::FirstComeFirstServed => {
            allocate_greedy_by(available_stock, demands, |order| {
                let mut keyed: Vec<usize> = order.to_vec();
                // Missing timestamps sort after any present timestamp.
                keyed.sort_by_key(|&i| {
                    (
                        demands[i].order_timestamp.is_none(),
                        demands[i].order_timestamp,
                    )
                });
                keyed
            })
        }
    };

    Ok(demands
        .iter()
        .zip(allocated)
        .map(|(d, alloc)| AllocationResult {
            order_id: d.order_id,
            requested_quantity: d.requested_quantity,
            allocated_quantity: alloc,
            shortage_quantity: d.requested_quantity - alloc,
        })
        .collect())
}

/// Priority score: manual score, preferred-customer bonus, and a small
/// bonus per day the order has been waiting.
pub fn score_demand(demand: &DemandItem, now: DateTime<Utc>) -> i64 {
    let mut score = demand.priority_score.unwrap_or(0) as i64;
    if demand.is_preferred_customer {
        score += PREFERRED_CUSTOMER_BONUS;
    }
    if let Some(ordered_at) = demand.order_timestamp {
        let days_waiting = (now - ordered_at).num_days().max(0);
        score += days_waiting * WAITING_DAY_BONUS;
    }
    score
}

/// Floor shares by exact ratio, then hand the remainder out one unit at a
/// time to the largest fractional remainders (ties by input order).
fn allocate_proportional(
    available_stock: i32,
    demands: &[DemandItem],
    total_requested: i64,
) -> Vec<i32> {
    let available = available_stock as i64;
    let mut allocated: Vec<i64> = Vec::with_capacity(demands.len());
    let mut remainders: Vec<(usize, i64)> = Vec::with_capacity(demands.len());

    for (i, demand) in demands.iter().enumerate() {
        let exact = demand.requested_quantity as i64 * available;
        allocated.push(exact / total_requested);
        remainders.push((i, exact % total_requested));
    }

    let mut leftover = available - allocated.iter().sum::<i64>();
    remainders.sort_by(|a, b| b.1.cmp(&a.1));
    for (i, remainder) in remainders {
        if leftover == 0 {
            break;
        }
        if remainder > 0 {
            allocated[i] += 1;
            leftover -= 1;
        }
    }

    allocated.into_iter().map(|a| a as i32).collect()
}

/// Greedy hand-out in the order produced by `rank`, which permutes the
/// demand indices.
fn allocate_greedy_by<F>(available_stock: i32, demands: &[DemandItem], rank: F) -> Vec<i32>
where
    F: FnOnce(&[usize]) -> Vec<usize>,
{
    let order: Vec<usize> = (0..demands.len()).collect();
    let ranked = rank(&order);

    let mut remaining = available_stock;
    let mut allocated = vec![0i32; demands.len()];
    for i in ranked {
        if remaining == 0 {
            break;
        }
        let take = demands[i].requested_quantity.min(remaining);
        allocated[i] = take;
        remaining -= take;
    }
    allocated
}
