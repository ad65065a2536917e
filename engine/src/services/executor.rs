//! Allocation executor: applies allocation results against the ledger
//!
//! Each demand is processed in its own transaction. A failure reserving
//! for one order (for example a race drained stock between computing the
//! allocation and applying it) is caught into the summary's failure list
//! and never aborts the rest of the batch. Cross-demand atomicity is
//! deliberately not provided: the goal is to get stock to as many orders
//! as possible even if one is rejected.

use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use chrono::{DateTime, Utc};

use crate::error::{AppError, AppResult};
use crate::services::backorder;
use crate::services::catalog::default_variant_conn;
use crate::services::reservation::{reserve_tx, ReserveInput};
use crate::models::{
    AllocationResult, BatchOutcome, DemandItem, FundingSource, Order, OrderItem, OrderStatus,
};
use shared::validation::validate_actor;

/// Executor applying allocation results per demand
#[derive(Clone)]
pub struct AllocationExecutor {
    db: PgPool,
}

/// Ambient data for one execution batch
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// The variant the allocation run was computed for
    pub variant_id: Uuid,
    pub actor: String,
    /// Reference recorded on movements (e.g. the goods-receipt id that
    /// triggered the allocation)
    pub reference: Option<String>,
}

/// One demand that could not be applied
#[derive(Debug, Clone)]
pub struct ExecutionFailure {
    pub order_id: Uuid,
    pub error: String,
}

/// Result of applying a batch of allocation results
#[derive(Debug, Clone)]
pub struct ExecutionSummary {
    pub confirmed: Vec<Uuid>,
    pub partially_confirmed: Vec<Uuid>,
    /// Orders for which a backorder was created (possibly in addition to a
    /// partial confirmation)
    pub backordered: Vec<Uuid>,
    pub failures: Vec<ExecutionFailure>,
    pub outcome: BatchOutcome,
}

impl AllocationExecutor {
    /// Create a new AllocationExecutor instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Collect open demand for a variant: one item per preorder line that
    /// references it, either pinned directly or through the product's
    /// default variant. Oldest order first, matching allocation input order.
    pub async fn demands_for_variant(&self, variant_id: Uuid) -> AppResult<Vec<DemandItem>> {
        let rows: Vec<OrderDemandDbRow> = sqlx::query_as(
            r#"
            SELECT o.id, o.customer_name, o.status, o.funding_source,
                   o.is_preferred_customer, o.priority, o.ordered_at,
                   o.created_at, o.updated_at, oi.quantity
            FROM orders o
            JOIN order_items oi ON oi.order_id = o.id
            LEFT JOIN product_variants dv
              ON dv.product_id = oi.product_id
             AND dv.is_default
             AND dv.variant_type = 'standard'
            WHERE o.status = 'preorder'
              AND COALESCE(oi.variant_id, dv.id) = $1
            ORDER BY o.ordered_at ASC
            "#,
        )
        .bind(variant_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|row| {
                let (order, quantity) = order_from_demand_row(row)?;
                Ok(DemandItem::from_order(&order, quantity))
            })
            .collect()
    }

    /// Apply `results` (produced by `allocate`) for the context's variant.
    pub async fn execute_allocation(
        &self,
        ctx: &ExecutionContext,
        results: &[AllocationResult],
    ) -> AppResult<ExecutionSummary> {
        validate_actor(&ctx.actor).map_err(|m| AppError::validation("actor", m))?;

        let mut summary = ExecutionSummary {
            confirmed: Vec::new(),
            partially_confirmed: Vec::new(),
            backordered: Vec::new(),
            failures: Vec::new(),
            outcome: BatchOutcome::Success,
        };

        for result in results {
            match self.apply_one(ctx, result).await {
                Ok(applied) => {
                    match applied.status {
                        Some(OrderStatus::Confirmed) => summary.confirmed.push(result.order_id),
                        Some(OrderStatus::PartiallyConfirmed) => {
                            summary.partially_confirmed.push(result.order_id)
                        }
                        _ => {}
                    }
                    if applied.backordered {
                        summary.backordered.push(result.order_id);
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        order_id = %result.order_id,
                        variant_id = %ctx.variant_id,
                        error = %err,
                        "allocation execution failed for order"
                    );
                    summary.failures.push(ExecutionFailure {
                        order_id: result.order_id,
                        error: err.to_string(),
                    });
                }
            }
        }

        let succeeded = results.len() - summary.failures.len();
        summary.outcome = BatchOutcome::classify(succeeded, summary.failures.len());
        Ok(summary)
    }

    /// Apply a single allocation result in its own transaction.
    ///
    /// The line to stamp is picked after lock: unpinned lines resolve to
    /// the product's default variant first, then the result claims the
    /// first matching line still untouched, pinning the variant and
    /// attaching the reservation's weighted-average cost.
    async fn apply_one(
        &self,
        ctx: &ExecutionContext,
        result: &AllocationResult,
    ) -> AppResult<AppliedResult> {
        let mut tx = self.db.begin().await?;

        let order = load_order_for_update(&mut tx, result.order_id).await?;
        let lines = load_lines_resolved(&mut tx, result.order_id).await?;
        let line = open_line(&lines, ctx.variant_id).ok_or_else(|| {
            AppError::Consistency(format!(
                "order {} has no open line for variant {}",
                result.order_id, ctx.variant_id
            ))
        })?;
        let mut applied = AppliedResult {
            status: None,
            backordered: false,
        };

        if result.allocated_quantity > 0 {
            let outcome = reserve_tx(
                &mut tx,
                &ReserveInput {
                    variant_id: ctx.variant_id,
                    warehouse: Some(order.funding_source.warehouse()),
                    quantity: result.allocated_quantity,
                    reason: format!("allocation for order {}", result.order_id),
                    reference: ctx.reference.clone(),
                    actor: ctx.actor.clone(),
                },
            )
            .await?;

            stamp_line(
                &mut tx,
                line.id,
                ctx.variant_id,
                result.allocated_quantity,
                result.shortage_quantity,
                Some(outcome.unit_cost),
            )
            .await?;

            let status = if result.shortage_quantity == 0 {
                OrderStatus::Confirmed
            } else {
                OrderStatus::PartiallyConfirmed
            };
            update_order_status(&mut tx, result.order_id, status).await?;
            applied.status = Some(status);
        } else {
            // Nothing allocated: the order stays a preorder, only the
            // bookkeeping columns move.
            stamp_line(
                &mut tx,
                line.id,
                ctx.variant_id,
                0,
                result.shortage_quantity,
                None,
            )
            .await?;
        }

        if result.shortage_quantity > 0 {
            backorder::create_conn(
                &mut tx,
                result.order_id,
                ctx.variant_id,
                result.shortage_quantity,
                order.priority,
            )
            .await?;
            applied.backordered = true;
        }

        tx.commit().await?;
        Ok(applied)
    }
}

struct AppliedResult {
    status: Option<OrderStatus>,
    backordered: bool,
}

/// Pick the order line an allocation result should stamp: the first line
/// resolving to `variant_id` whose bookkeeping columns are still untouched.
/// A line with any allocation or shortage recorded was already claimed by
/// an earlier result, so two lines on the same variant each get their own.
pub fn open_line(lines: &[(OrderItem, Uuid)], variant_id: Uuid) -> Option<&OrderItem> {
    lines
        .iter()
        .find(|(line, resolved)| {
            *resolved == variant_id
                && line.allocated_quantity == 0
                && line.shortage_quantity == 0
        })
        .map(|(line, _)| line)
}

async fn stamp_line(
    conn: &mut PgConnection,
    line_id: Uuid,
    variant_id: Uuid,
    allocated: i32,
    shortage: i32,
    unit_cost: Option<Decimal>,
) -> AppResult<()> {
    let updated = sqlx::query(
        r#"
        UPDATE order_items
        SET variant_id = $1, allocated_quantity = $2, shortage_quantity = $3,
            cost_price = COALESCE($4, cost_price)
        WHERE id = $5
        "#,
    )
    .bind(variant_id)
    .bind(allocated)
    .bind(shortage)
    .bind(unit_cost)
    .bind(line_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(AppError::Consistency(format!(
            "order line {line_id} vanished mid-update"
        )));
    }
    Ok(())
}

/// Load an order's lines oldest first, resolving unpinned lines to the
/// product's default standard variant so every caller sees the same
/// variants.
pub(crate) async fn load_lines_resolved(
    conn: &mut PgConnection,
    order_id: Uuid,
) -> AppResult<Vec<(OrderItem, Uuid)>> {
    type LineDbRow = (
        Uuid,
        Uuid,
        Uuid,
        Option<Uuid>,
        i32,
        Option<Decimal>,
        i32,
        i32,
        DateTime<Utc>,
    );

    let rows: Vec<LineDbRow> = sqlx::query_as(
        r#"
        SELECT id, order_id, product_id, variant_id, quantity, cost_price,
               allocated_quantity, shortage_quantity, created_at
        FROM order_items
        WHERE order_id = $1
        ORDER BY created_at ASC
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut resolved = Vec::with_capacity(rows.len());
    for (
        id,
        order_id,
        product_id,
        variant_id,
        quantity,
        cost_price,
        allocated_quantity,
        shortage_quantity,
        created_at,
    ) in rows
    {
        let line = OrderItem {
            id,
            order_id,
            product_id,
            variant_id,
            quantity,
            cost_price,
            allocated_quantity,
            shortage_quantity,
            created_at,
        };
        let resolved_variant = match line.variant_id {
            Some(id) => id,
            None => default_variant_conn(&mut *conn, line.product_id).await?.id,
        };
        resolved.push((line, resolved_variant));
    }
    Ok(resolved)
}

type OrderDemandDbRow = (
    Uuid,
    String,
    String,
    String,
    bool,
    i32,
    DateTime<Utc>,
    DateTime<Utc>,
    DateTime<Utc>,
    i32,
);

fn order_from_demand_row(row: OrderDemandDbRow) -> AppResult<(Order, i32)> {
    let (
        id,
        customer_name,
        status,
        funding_source,
        is_preferred_customer,
        priority,
        ordered_at,
        created_at,
        updated_at,
        quantity,
    ) = row;
    let order = Order {
        id,
        customer_name,
        status: OrderStatus::from_str(&status)
            .ok_or_else(|| AppError::Consistency(format!("unknown order status '{status}'")))?,
        funding_source: FundingSource::from_str(&funding_source).ok_or_else(|| {
            AppError::Consistency(format!("unknown funding source '{funding_source}'"))
        })?,
        is_preferred_customer,
        priority,
        ordered_at,
        created_at,
        updated_at,
    };
    Ok((order, quantity))
}

/// Minimal order fields the executor needs, locked for the transaction
pub(crate) struct OrderRow {
    pub status: OrderStatus,
    pub funding_source: FundingSource,
    pub priority: i32,
}

pub(crate) async fn load_order_for_update(
    conn: &mut PgConnection,
    order_id: Uuid,
) -> AppResult<OrderRow> {
    let (status, funding_source, priority): (String, String, i32) = sqlx::query_as(
        "SELECT status, funding_source, priority FROM orders WHERE id = $1 FOR UPDATE",
    )
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Order {order_id}")))?;

    Ok(OrderRow {
        status: OrderStatus::from_str(&status)
            .ok_or_else(|| AppError::Consistency(format!("unknown order status '{status}'")))?,
        funding_source: FundingSource::from_str(&funding_source).ok_or_else(|| {
            AppError::Consistency(format!("unknown funding source '{funding_source}'"))
        })?,
        priority,
    })
}

pub(crate) async fn update_order_status(
    conn: &mut PgConnection,
    order_id: Uuid,
    status: OrderStatus,
) -> AppResult<()> {
    sqlx::query("UPDATE orders SET status = $1, updated_at = NOW() WHERE id = $2")
        .bind(status.as_str())
        .bind(order_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
