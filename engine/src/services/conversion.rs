//! Preorder conversion: promotes preorders to confirmed orders once stock
//! can cover every line
//!
//! Conversion is all-or-nothing per order. An order with three lines where
//! only two can be covered stays a preorder untouched; the shortfalls are
//! reported so replenishment can be planned. Orders are attempted oldest
//! first so a late order never jumps the queue by converting ahead of an
//! earlier one contending for the same stock.

use std::collections::HashMap;

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::backorder;
use crate::services::executor::{load_lines_resolved, load_order_for_update, update_order_status};
use crate::services::ledger::lock_lots_preferred;
use crate::services::reservation::{reserve_tx, ReserveInput};
use crate::models::{BatchOutcome, OrderStatus};
use shared::validation::validate_actor;

/// Service for converting preorders into confirmed orders
#[derive(Clone)]
pub struct PreorderConversionService {
    db: PgPool,
}

/// One order line that could not be covered
#[derive(Debug, Clone)]
pub struct LineShortfall {
    pub variant_id: Uuid,
    pub requested: i32,
    pub available: i32,
}

/// An order the sweep could not convert
#[derive(Debug, Clone)]
pub struct ConversionFailure {
    pub order_id: Uuid,
    /// Empty when the failure was an error rather than a stock shortfall
    pub shortfalls: Vec<LineShortfall>,
    pub error: Option<String>,
}

/// Result of one conversion sweep
#[derive(Debug, Clone)]
pub struct ConversionSummary {
    pub converted: Vec<Uuid>,
    pub failed: Vec<ConversionFailure>,
    pub outcome: BatchOutcome,
}

impl PreorderConversionService {
    /// Create a new PreorderConversionService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Attempt to convert every preorder touching the given variants.
    ///
    /// An empty `candidate_variant_ids` slice sweeps all preorders. Unpinned
    /// lines count as touching a variant when the product's default variant
    /// is among the candidates. Each order converts in its own transaction;
    /// one order failing never blocks the rest.
    pub async fn auto_convert(
        &self,
        candidate_variant_ids: &[Uuid],
        actor: &str,
    ) -> AppResult<ConversionSummary> {
        validate_actor(actor).map_err(|m| AppError::validation("actor", m))?;

        let candidates = self.candidate_orders(candidate_variant_ids).await?;
        let mut summary = ConversionSummary {
            converted: Vec::new(),
            failed: Vec::new(),
            outcome: BatchOutcome::Success,
        };

        for order_id in candidates {
            match self.convert_order(order_id, actor).await {
                Ok(ConvertAttempt::Converted) => summary.converted.push(order_id),
                Ok(ConvertAttempt::Short(shortfalls)) => {
                    tracing::info!(
                        order_id = %order_id,
                        lines_short = shortfalls.len(),
                        "preorder left unconverted, stock shortfall"
                    );
                    summary.failed.push(ConversionFailure {
                        order_id,
                        shortfalls,
                        error: None,
                    });
                }
                Err(err) => {
                    tracing::warn!(order_id = %order_id, error = %err, "preorder conversion failed");
                    summary.failed.push(ConversionFailure {
                        order_id,
                        shortfalls: Vec::new(),
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        summary.outcome = BatchOutcome::classify(summary.converted.len(), summary.failed.len());

        tracing::info!(
            converted = summary.converted.len(),
            failed = summary.failed.len(),
            "preorder sweep finished"
        );
        Ok(summary)
    }

    /// Preorder ids touching any candidate variant, oldest first.
    async fn candidate_orders(&self, candidate_variant_ids: &[Uuid]) -> AppResult<Vec<Uuid>> {
        let rows: Vec<(Uuid, chrono::DateTime<chrono::Utc>)> = sqlx::query_as(
            r#"
            SELECT DISTINCT o.id, o.ordered_at
            FROM orders o
            JOIN order_items oi ON oi.order_id = o.id
            LEFT JOIN product_variants dv
              ON dv.product_id = oi.product_id
             AND dv.is_default
             AND dv.variant_type = 'standard'
            WHERE o.status = 'preorder'
              AND (cardinality($1::uuid[]) = 0
                   OR COALESCE(oi.variant_id, dv.id) = ANY($1))
            ORDER BY o.ordered_at ASC
            "#,
        )
        .bind(candidate_variant_ids)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(|(id, _)| id).collect())
    }

    async fn convert_order(&self, order_id: Uuid, actor: &str) -> AppResult<ConvertAttempt> {
        let mut tx = self.db.begin().await?;

        let order = load_order_for_update(&mut tx, order_id).await?;
        if order.status != OrderStatus::Preorder {
            return Err(AppError::InvalidStateTransition(format!(
                "order {} is {}, only preorders convert",
                order_id,
                order.status.as_str()
            )));
        }

        // Unpinned lines resolve to the product's default variant up front,
        // so both phases see the same variants.
        let resolved = load_lines_resolved(&mut tx, order_id).await?;
        if resolved.is_empty() {
            return Err(AppError::Consistency(format!(
                "preorder {order_id} has no lines"
            )));
        }

        let warehouse = order.funding_source.warehouse();

        // Phase one: lock lots and verify every line fits. Availability is
        // tracked per variant so two lines on the same variant cannot both
        // count the same units.
        let mut remaining: HashMap<Uuid, i32> = HashMap::new();
        let mut shortfalls = Vec::new();
        for (line, variant_id) in &resolved {
            if !remaining.contains_key(variant_id) {
                let lots = lock_lots_preferred(&mut tx, *variant_id, Some(warehouse)).await?;
                let available = lots.iter().map(|l| l.available).sum::<i32>();
                remaining.insert(*variant_id, available);
            }
            let entry = remaining
                .get_mut(variant_id)
                .ok_or_else(|| AppError::Consistency("availability map out of sync".into()))?;
            if *entry < line.quantity {
                shortfalls.push(LineShortfall {
                    variant_id: *variant_id,
                    requested: line.quantity,
                    available: (*entry).max(0),
                });
            }
            *entry -= line.quantity;
        }
        if !shortfalls.is_empty() {
            tx.rollback().await?;
            return Ok(ConvertAttempt::Short(shortfalls));
        }

        // Phase two: reserve every line and pin the resolved variant.
        let mut touched_variants = Vec::with_capacity(resolved.len());
        for (line, variant_id) in &resolved {
            let outcome = reserve_tx(
                &mut tx,
                &ReserveInput {
                    variant_id: *variant_id,
                    warehouse: Some(warehouse),
                    quantity: line.quantity,
                    reason: format!("preorder conversion for order {order_id}"),
                    reference: Some(order_id.to_string()),
                    actor: actor.to_string(),
                },
            )
            .await?;

            sqlx::query(
                r#"
                UPDATE order_items
                SET variant_id = $1, allocated_quantity = $2, shortage_quantity = 0,
                    cost_price = $3
                WHERE id = $4
                "#,
            )
            .bind(variant_id)
            .bind(line.quantity)
            .bind(outcome.unit_cost)
            .bind(line.id)
            .execute(&mut *tx)
            .await?;

            touched_variants.push(*variant_id);
        }

        update_order_status(&mut tx, order_id, OrderStatus::Confirmed).await?;
        backorder::fulfill_for_order_conn(&mut tx, order_id, &touched_variants).await?;

        tx.commit().await?;
        tracing::info!(order_id = %order_id, "preorder converted");
        Ok(ConvertAttempt::Converted)
    }
}

enum ConvertAttempt {
    Converted,
    Short(Vec<LineShortfall>),
}
