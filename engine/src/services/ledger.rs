//! Inventory ledger service: per-(variant, warehouse) lot rows and the
//! append-only movement log
//!
//! The lot table is the single source of truth for current stock. Every
//! mutation here runs inside a transaction, locks the lot row it touches,
//! and writes a movement record in the same transaction.
//!
//! Movement counter semantics: for reservation and release movements the
//! `quantity_before/after` columns track the lot's *available* units; for
//! every other type they track total on-hand quantity (the field the
//! movement actually changed).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{lot_consistency_violation, AppError, AppResult};
use crate::models::{
    InventoryLot, MovementType, StockMovement, StockOverview, Warehouse, WarehouseStock,
};
use shared::types::{PaginatedResponse, Pagination, PaginationMeta};
use shared::validation::validate_unit_cost;

/// Ledger service for lot state and stock-in events
#[derive(Clone)]
pub struct LedgerService {
    db: PgPool,
}

/// Input for recording a stock-in event
#[derive(Debug, Clone, Validate, serde::Deserialize)]
pub struct StockInInput {
    pub variant_id: Uuid,
    pub warehouse: Warehouse,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub unit_cost: Decimal,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
    pub reference: Option<String>,
    #[validate(length(min = 1))]
    pub actor: String,
}

impl LedgerService {
    /// Create a new LedgerService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Sum of available units across matching lots. Returns 0 when no lot
    /// exists; never an error.
    pub async fn get_available(
        &self,
        variant_id: Uuid,
        warehouse: Option<Warehouse>,
    ) -> AppResult<i32> {
        let total: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT SUM(available)::bigint
            FROM inventory_lots
            WHERE variant_id = $1 AND ($2::text IS NULL OR warehouse = $2)
            "#,
        )
        .bind(variant_id)
        .bind(warehouse.map(|w| w.as_str()))
        .fetch_one(&self.db)
        .await?;

        Ok(total.unwrap_or(0) as i32)
    }

    /// Return the lot for (variant, warehouse), creating an empty one if it
    /// does not exist yet. Idempotent under concurrent callers: unique
    /// constraint on (variant_id, warehouse) with insert-or-fetch.
    pub async fn ensure_lot(
        &self,
        variant_id: Uuid,
        warehouse: Warehouse,
    ) -> AppResult<InventoryLot> {
        let mut conn = self.db.acquire().await?;
        ensure_lot_conn(&mut conn, variant_id, warehouse).await
    }

    /// Record a stock-in event: increments quantity and available, updates
    /// the weighted-average cost basis, and logs the movement, all in one
    /// transaction.
    pub async fn stock_in(&self, input: StockInInput) -> AppResult<StockMovement> {
        let mut tx = self.db.begin().await?;
        let movement = stock_in_conn(&mut tx, &input, MovementType::StockIn).await?;
        tx.commit().await?;

        tracing::info!(
            variant_id = %input.variant_id,
            warehouse = input.warehouse.as_str(),
            quantity = input.quantity,
            actor = %input.actor,
            "stock-in recorded"
        );
        Ok(movement)
    }

    /// Manual stock correction, positive or negative. Negative adjustments
    /// draw down available units only and fail on shortfall; the cost basis
    /// is left untouched either way.
    pub async fn adjust(
        &self,
        variant_id: Uuid,
        warehouse: Warehouse,
        delta: i32,
        reason: &str,
        actor: &str,
    ) -> AppResult<StockMovement> {
        if delta == 0 {
            return Err(AppError::validation("delta", "Adjustment cannot be zero"));
        }
        shared::validation::validate_reason(reason)
            .map_err(|m| AppError::validation("reason", m))?;
        shared::validation::validate_actor(actor).map_err(|m| AppError::validation("actor", m))?;

        let mut tx = self.db.begin().await?;

        let lot = lock_lot(&mut tx, variant_id, warehouse)
            .await?
            .ok_or_else(|| AppError::NotFound("Inventory lot".to_string()))?;

        if delta < 0 && lot.available < -delta {
            return Err(AppError::InsufficientStock {
                variant_id,
                requested: -delta,
                available: lot.available,
            });
        }

        sqlx::query(
            r#"
            UPDATE inventory_lots
            SET quantity = quantity + $1, available = available + $1, updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(delta)
        .bind(lot.id)
        .execute(&mut *tx)
        .await?;

        let movement = record_movement_conn(
            &mut tx,
            MovementRow {
                variant_id,
                warehouse,
                movement_type: MovementType::Adjustment,
                quantity_before: lot.quantity,
                quantity_change: delta,
                quantity_after: lot.quantity + delta,
                unit_cost: lot.cost_basis,
                total_cost: lot.cost_basis * Decimal::from(delta.abs()),
                reason: reason.to_string(),
                reference: None,
                actor: actor.to_string(),
            },
        )
        .await?;

        tx.commit().await?;
        Ok(movement)
    }

    /// Read-time rollup of a variant's lots across warehouses. No
    /// denormalized per-variant counter exists; this is the only
    /// variant-level view.
    pub async fn get_stock_overview(&self, variant_id: Uuid) -> AppResult<StockOverview> {
        let rows = sqlx::query_as::<_, (String, i32, i32, i32, Decimal)>(
            r#"
            SELECT warehouse, quantity, reserved, available, cost_basis
            FROM inventory_lots
            WHERE variant_id = $1
            ORDER BY warehouse
            "#,
        )
        .bind(variant_id)
        .fetch_all(&self.db)
        .await?;

        let mut overview = StockOverview {
            variant_id,
            total_quantity: 0,
            total_reserved: 0,
            total_available: 0,
            lots: Vec::with_capacity(rows.len()),
        };
        for (warehouse, quantity, reserved, available, cost_basis) in rows {
            let warehouse = parse_warehouse(&warehouse)?;
            overview.total_quantity += quantity as i64;
            overview.total_reserved += reserved as i64;
            overview.total_available += available as i64;
            overview.lots.push(WarehouseStock {
                warehouse,
                quantity,
                reserved,
                available,
                cost_basis,
            });
        }
        Ok(overview)
    }

    /// Movement history for a variant, newest first
    pub async fn list_movements(
        &self,
        variant_id: Uuid,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<StockMovement>> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM stock_movements WHERE variant_id = $1")
                .bind(variant_id)
                .fetch_one(&self.db)
                .await?;

        let rows = sqlx::query_as::<_, MovementDbRow>(
            r#"
            SELECT id, variant_id, warehouse, movement_type, quantity_before, quantity_change,
                   quantity_after, unit_cost, total_cost, reason, reference, actor, created_at
            FROM stock_movements
            WHERE variant_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(variant_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let data = rows
            .into_iter()
            .map(movement_from_row)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PaginatedResponse {
            pagination: PaginationMeta::new(&pagination, total as u64),
            data,
        })
    }
}

/// Weighted-average cost basis after adding `quantity` units at `unit_cost`
/// to a lot holding `old_quantity` units at `old_basis`.
pub fn weighted_basis(
    old_basis: Decimal,
    old_quantity: i32,
    unit_cost: Decimal,
    quantity: i32,
) -> Decimal {
    let new_total = old_quantity as i64 + quantity as i64;
    if new_total == 0 {
        return unit_cost;
    }
    (old_basis * Decimal::from(old_quantity) + unit_cost * Decimal::from(quantity))
        / Decimal::from(new_total)
}

/// Insert-or-fetch the lot row for (variant, warehouse). The cost basis of
/// a freshly created lot is seeded from the variant's default cost.
pub(crate) async fn ensure_lot_conn(
    conn: &mut PgConnection,
    variant_id: Uuid,
    warehouse: Warehouse,
) -> AppResult<InventoryLot> {
    let seed_cost: Decimal = sqlx::query_scalar("SELECT cost_price FROM product_variants WHERE id = $1")
        .bind(variant_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Product variant".to_string()))?;

    sqlx::query(
        r#"
        INSERT INTO inventory_lots (variant_id, warehouse, quantity, reserved, available, cost_basis)
        VALUES ($1, $2, 0, 0, 0, $3)
        ON CONFLICT (variant_id, warehouse) DO NOTHING
        "#,
    )
    .bind(variant_id)
    .bind(warehouse.as_str())
    .bind(seed_cost)
    .execute(&mut *conn)
    .await?;

    let row = sqlx::query_as::<_, LotDbRow>(
        r#"
        SELECT id, variant_id, warehouse, quantity, reserved, available, cost_basis,
               created_at, updated_at
        FROM inventory_lots
        WHERE variant_id = $1 AND warehouse = $2
        "#,
    )
    .bind(variant_id)
    .bind(warehouse.as_str())
    .fetch_one(&mut *conn)
    .await?;

    lot_from_row(row)
}

/// Stock-in against an open connection/transaction. `movement_type` lets
/// the damage-transfer flow tag its movement while reusing the same path.
pub(crate) async fn stock_in_conn(
    conn: &mut PgConnection,
    input: &StockInInput,
    movement_type: MovementType,
) -> AppResult<StockMovement> {
    input.validate()?;
    validate_unit_cost(input.unit_cost).map_err(|m| AppError::validation("unit_cost", m))?;

    ensure_lot_conn(conn, input.variant_id, input.warehouse).await?;
    let lot = lock_lot(conn, input.variant_id, input.warehouse)
        .await?
        .ok_or_else(|| AppError::NotFound("Inventory lot".to_string()))?;

    let new_basis = weighted_basis(lot.cost_basis, lot.quantity, input.unit_cost, input.quantity);

    sqlx::query(
        r#"
        UPDATE inventory_lots
        SET quantity = quantity + $1, available = available + $1, cost_basis = $2,
            updated_at = NOW()
        WHERE id = $3
        "#,
    )
    .bind(input.quantity)
    .bind(new_basis)
    .bind(lot.id)
    .execute(&mut *conn)
    .await?;

    record_movement_conn(
        conn,
        MovementRow {
            variant_id: input.variant_id,
            warehouse: input.warehouse,
            movement_type,
            quantity_before: lot.quantity,
            quantity_change: input.quantity,
            quantity_after: lot.quantity + input.quantity,
            unit_cost: input.unit_cost,
            total_cost: input.unit_cost * Decimal::from(input.quantity),
            reason: input.reason.clone(),
            reference: input.reference.clone(),
            actor: input.actor.clone(),
        },
    )
    .await
}

/// Lock a single lot row for update, verifying the ledger invariant.
pub(crate) async fn lock_lot(
    conn: &mut PgConnection,
    variant_id: Uuid,
    warehouse: Warehouse,
) -> AppResult<Option<InventoryLot>> {
    let row = sqlx::query_as::<_, LotDbRow>(
        r#"
        SELECT id, variant_id, warehouse, quantity, reserved, available, cost_basis,
               created_at, updated_at
        FROM inventory_lots
        WHERE variant_id = $1 AND warehouse = $2
        FOR UPDATE
        "#,
    )
    .bind(variant_id)
    .bind(warehouse.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    row.map(lot_from_row).transpose()
}

/// Lock every lot of a variant, optionally pinned to one warehouse, in
/// consumption preference order (company first, then FIFO by creation).
pub(crate) async fn lock_lots_preferred(
    conn: &mut PgConnection,
    variant_id: Uuid,
    warehouse: Option<Warehouse>,
) -> AppResult<Vec<InventoryLot>> {
    let rows = sqlx::query_as::<_, LotDbRow>(
        r#"
        SELECT id, variant_id, warehouse, quantity, reserved, available, cost_basis,
               created_at, updated_at
        FROM inventory_lots
        WHERE variant_id = $1 AND ($2::text IS NULL OR warehouse = $2)
        ORDER BY CASE warehouse WHEN 'company' THEN 0 ELSE 1 END, created_at ASC
        FOR UPDATE
        "#,
    )
    .bind(variant_id)
    .bind(warehouse.map(|w| w.as_str()))
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(lot_from_row).collect()
}

/// Append one movement record. Never updated or deleted afterwards.
pub(crate) async fn record_movement_conn(
    conn: &mut PgConnection,
    row: MovementRow,
) -> AppResult<StockMovement> {
    let (id, created_at): (Uuid, DateTime<Utc>) = sqlx::query_as(
        r#"
        INSERT INTO stock_movements (
            variant_id, warehouse, movement_type, quantity_before, quantity_change,
            quantity_after, unit_cost, total_cost, reason, reference, actor
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING id, created_at
        "#,
    )
    .bind(row.variant_id)
    .bind(row.warehouse.as_str())
    .bind(row.movement_type.as_str())
    .bind(row.quantity_before)
    .bind(row.quantity_change)
    .bind(row.quantity_after)
    .bind(row.unit_cost)
    .bind(row.total_cost)
    .bind(&row.reason)
    .bind(&row.reference)
    .bind(&row.actor)
    .fetch_one(&mut *conn)
    .await?;

    Ok(StockMovement {
        id,
        variant_id: row.variant_id,
        warehouse: row.warehouse,
        movement_type: row.movement_type,
        quantity_before: row.quantity_before,
        quantity_change: row.quantity_change,
        quantity_after: row.quantity_after,
        unit_cost: row.unit_cost,
        total_cost: row.total_cost,
        reason: row.reason,
        reference: row.reference,
        actor: row.actor,
        created_at,
    })
}

/// Fields of a movement record before insertion
pub(crate) struct MovementRow {
    pub variant_id: Uuid,
    pub warehouse: Warehouse,
    pub movement_type: MovementType,
    pub quantity_before: i32,
    pub quantity_change: i32,
    pub quantity_after: i32,
    pub unit_cost: Decimal,
    pub total_cost: Decimal,
    pub reason: String,
    pub reference: Option<String>,
    pub actor: String,
}

type LotDbRow = (
    Uuid,
    Uuid,
    String,
    i32,
    i32,
    i32,
    Decimal,
    DateTime<Utc>,
    DateTime<Utc>,
);

type MovementDbRow = (
    Uuid,
    Uuid,
    String,
    String,
    i32,
    i32,
    i32,
    Decimal,
    Decimal,
    String,
    Option<String>,
    String,
    DateTime<Utc>,
);

pub(crate) fn parse_warehouse(s: &str) -> AppResult<Warehouse> {
    Warehouse::from_str(s)
        .ok_or_else(|| AppError::Consistency(format!("unknown warehouse tag '{s}'")))
}

fn lot_from_row(row: LotDbRow) -> AppResult<InventoryLot> {
    let (id, variant_id, warehouse, quantity, reserved, available, cost_basis, created_at, updated_at) =
        row;
    let lot = InventoryLot {
        id,
        variant_id,
        warehouse: parse_warehouse(&warehouse)?,
        quantity,
        reserved,
        available,
        cost_basis,
        created_at,
        updated_at,
    };
    if !lot.invariant_holds() {
        return Err(lot_consistency_violation(
            lot.id,
            lot.quantity,
            lot.reserved,
            lot.available,
            lot.cost_basis,
        ));
    }
    Ok(lot)
}

fn movement_from_row(row: MovementDbRow) -> AppResult<StockMovement> {
    let (
        id,
        variant_id,
        warehouse,
        movement_type,
        quantity_before,
        quantity_change,
        quantity_after,
        unit_cost,
        total_cost,
        reason,
        reference,
        actor,
        created_at,
    ) = row;
    Ok(StockMovement {
        id,
        variant_id,
        warehouse: parse_warehouse(&warehouse)?,
        movement_type: MovementType::from_str(&movement_type)
            .ok_or_else(|| AppError::Consistency(format!("unknown movement type '{movement_type}'")))?,
        quantity_before,
        quantity_change,
        quantity_after,
        unit_cost,
        total_cost,
        reason,
        reference,
        actor,
        created_at,
    })
}
