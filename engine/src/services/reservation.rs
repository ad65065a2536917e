//! Reservation / release protocol
//!
//! Reserving moves units from `available` to `reserved`, consuming lots
//! oldest-first (company warehouse before private when no warehouse is
//! pinned) and capturing the weighted-average unit cost of the lots
//! actually drawn. Releasing is the inverse, used for cancellations.
//!
//! Each call is atomic: on shortfall nothing is committed. Callers that
//! reserve several variants for one order use the `_tx` variants inside
//! one outer transaction so the whole order reserves all-or-nothing.

use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::ledger::{lock_lots_preferred, record_movement_conn, MovementRow};
use crate::models::{InventoryLot, MovementType, Warehouse};

/// Reservation service driving FIFO lot consumption
#[derive(Clone)]
pub struct ReservationService {
    db: PgPool,
}

/// Input for reserving stock against a demand
#[derive(Debug, Clone, Validate)]
pub struct ReserveInput {
    pub variant_id: Uuid,
    /// None scans warehouses in preference order (company, then private)
    pub warehouse: Option<Warehouse>,
    #[validate(range(min = 1))]
    pub quantity: i32,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
    pub reference: Option<String>,
    #[validate(length(min = 1))]
    pub actor: String,
}

/// Input for releasing previously reserved stock
#[derive(Debug, Clone, Validate)]
pub struct ReleaseInput {
    pub variant_id: Uuid,
    pub warehouse: Option<Warehouse>,
    #[validate(range(min = 1))]
    pub quantity: i32,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
    pub reference: Option<String>,
    #[validate(length(min = 1))]
    pub actor: String,
}

/// Units drawn from one lot by a reservation plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotDraw {
    pub lot_id: Uuid,
    pub warehouse: Warehouse,
    pub units: i32,
    pub unit_cost: Decimal,
}

/// Result of planning FIFO consumption against a set of lots
#[derive(Debug, Clone)]
pub struct ConsumptionPlan {
    pub draws: Vec<LotDraw>,
    pub quantity: i32,
    pub total_cost: Decimal,
}

impl ConsumptionPlan {
    /// Weighted-average unit cost across the lots drawn
    pub fn unit_cost(&self) -> Decimal {
        if self.quantity == 0 {
            return Decimal::ZERO;
        }
        self.total_cost / Decimal::from(self.quantity)
    }
}

/// Outcome of a successful reservation
#[derive(Debug, Clone)]
pub struct ReservationOutcome {
    pub variant_id: Uuid,
    pub quantity: i32,
    /// Weighted-average unit cost of the units actually drawn. Callers
    /// attach this to the demand record (order line) for margin
    /// calculation; it reflects the specific lots consumed, not a global
    /// average.
    pub unit_cost: Decimal,
    pub total_cost: Decimal,
    pub draws: Vec<LotDraw>,
}

/// Outcome of a release; `released` may be less than requested when fewer
/// units were actually reserved
#[derive(Debug, Clone)]
pub struct ReleaseOutcome {
    pub variant_id: Uuid,
    pub released: i32,
}

impl ReservationService {
    /// Create a new ReservationService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Reserve `quantity` units, FIFO over eligible lots. Atomic: either
    /// the full quantity is reserved or nothing changes.
    pub async fn reserve(&self, input: ReserveInput) -> AppResult<ReservationOutcome> {
        let mut tx = self.db.begin().await?;
        let outcome = reserve_tx(&mut tx, &input).await?;
        tx.commit().await?;

        tracing::info!(
            variant_id = %input.variant_id,
            quantity = input.quantity,
            unit_cost = %outcome.unit_cost,
            lots = outcome.draws.len(),
            "stock reserved"
        );
        Ok(outcome)
    }

    /// Return previously reserved units to available, oldest lot first.
    /// Releasing more than is currently reserved is clamped, not an error
    /// (partial cancellations are normal traffic).
    pub async fn release(&self, input: ReleaseInput) -> AppResult<ReleaseOutcome> {
        let mut tx = self.db.begin().await?;
        let outcome = release_tx(&mut tx, &input).await?;
        tx.commit().await?;

        tracing::info!(
            variant_id = %input.variant_id,
            released = outcome.released,
            "reservation released"
        );
        Ok(outcome)
    }

    /// Consume reserved units on shipment: decrements both `reserved` and
    /// total quantity, logging a sale-consumption movement per lot drawn.
    pub async fn consume_reserved(&self, input: ReleaseInput) -> AppResult<ReleaseOutcome> {
        input.validate()?;
        let mut tx = self.db.begin().await?;

        let lots = lock_lots_preferred(&mut tx, input.variant_id, input.warehouse).await?;
        let draws = plan_release(&lots, input.quantity);
        let consumed: i32 = draws.iter().map(|d| d.units).sum();
        if consumed < input.quantity {
            return Err(AppError::InsufficientStock {
                variant_id: input.variant_id,
                requested: input.quantity,
                available: consumed,
            });
        }

        for draw in &draws {
            let lot = lot_by_id(&lots, draw.lot_id)?;
            sqlx::query(
                r#"
                UPDATE inventory_lots
                SET quantity = quantity - $1, reserved = reserved - $1, updated_at = NOW()
                WHERE id = $2
                "#,
            )
            .bind(draw.units)
            .bind(draw.lot_id)
            .execute(&mut *tx)
            .await?;

            record_movement_conn(
                &mut tx,
                MovementRow {
                    variant_id: input.variant_id,
                    warehouse: draw.warehouse,
                    movement_type: MovementType::SaleConsumption,
                    quantity_before: lot.quantity,
                    quantity_change: -draw.units,
                    quantity_after: lot.quantity - draw.units,
                    unit_cost: draw.unit_cost,
                    total_cost: draw.unit_cost * Decimal::from(draw.units),
                    reason: input.reason.clone(),
                    reference: input.reference.clone(),
                    actor: input.actor.clone(),
                },
            )
            .await?;
        }

        tx.commit().await?;
        Ok(ReleaseOutcome {
            variant_id: input.variant_id,
            released: consumed,
        })
    }
}

/// Reserve inside a caller-owned transaction.
pub async fn reserve_tx(
    conn: &mut PgConnection,
    input: &ReserveInput,
) -> AppResult<ReservationOutcome> {
    input.validate()?;

    let lots = lock_lots_preferred(conn, input.variant_id, input.warehouse).await?;
    let plan = plan_fifo_consumption(&lots, input.quantity).map_err(|available| {
        AppError::InsufficientStock {
            variant_id: input.variant_id,
            requested: input.quantity,
            available,
        }
    })?;

    for draw in &plan.draws {
        let lot = lot_by_id(&lots, draw.lot_id)?;
        sqlx::query(
            r#"
            UPDATE inventory_lots
            SET available = available - $1, reserved = reserved + $1, updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(draw.units)
        .bind(draw.lot_id)
        .execute(&mut *conn)
        .await?;

        record_movement_conn(
            conn,
            MovementRow {
                variant_id: input.variant_id,
                warehouse: draw.warehouse,
                movement_type: MovementType::Reservation,
                quantity_before: lot.available,
                quantity_change: -draw.units,
                quantity_after: lot.available - draw.units,
                unit_cost: draw.unit_cost,
                total_cost: draw.unit_cost * Decimal::from(draw.units),
                reason: input.reason.clone(),
                reference: input.reference.clone(),
                actor: input.actor.clone(),
            },
        )
        .await?;
    }

    Ok(ReservationOutcome {
        variant_id: input.variant_id,
        quantity: input.quantity,
        unit_cost: plan.unit_cost(),
        total_cost: plan.total_cost,
        draws: plan.draws,
    })
}

/// Release inside a caller-owned transaction.
pub async fn release_tx(
    conn: &mut PgConnection,
    input: &ReleaseInput,
) -> AppResult<ReleaseOutcome> {
    input.validate()?;

    let lots = lock_lots_preferred(conn, input.variant_id, input.warehouse).await?;
    let draws = plan_release(&lots, input.quantity);

    let mut released = 0;
    for draw in &draws {
        let lot = lot_by_id(&lots, draw.lot_id)?;
        sqlx::query(
            r#"
            UPDATE inventory_lots
            SET available = available + $1, reserved = reserved - $1, updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(draw.units)
        .bind(draw.lot_id)
        .execute(&mut *conn)
        .await?;

        record_movement_conn(
            conn,
            MovementRow {
                variant_id: input.variant_id,
                warehouse: draw.warehouse,
                movement_type: MovementType::Release,
                quantity_before: lot.available,
                quantity_change: draw.units,
                quantity_after: lot.available + draw.units,
                unit_cost: draw.unit_cost,
                total_cost: draw.unit_cost * Decimal::from(draw.units),
                reason: input.reason.clone(),
                reference: input.reference.clone(),
                actor: input.actor.clone(),
            },
        )
        .await?;
        released += draw.units;
    }

    Ok(ReleaseOutcome {
        variant_id: input.variant_id,
        released,
    })
}

/// Plan FIFO consumption of `needed` available units from `lots`, which
/// must already be ordered by consumption preference. Returns the total
/// available on shortfall, without partial draws.
pub fn plan_fifo_consumption(lots: &[InventoryLot], needed: i32) -> Result<ConsumptionPlan, i32> {
    let total_available: i64 = lots.iter().map(|l| l.available as i64).sum();
    if total_available < needed as i64 {
        return Err(total_available as i32);
    }

    let mut remaining = needed;
    let mut draws = Vec::new();
    let mut total_cost = Decimal::ZERO;
    for lot in lots {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(lot.available);
        if take == 0 {
            continue;
        }
        total_cost += lot.cost_basis * Decimal::from(take);
        draws.push(LotDraw {
            lot_id: lot.id,
            warehouse: lot.warehouse,
            units: take,
            unit_cost: lot.cost_basis,
        });
        remaining -= take;
    }

    Ok(ConsumptionPlan {
        draws,
        quantity: needed,
        total_cost,
    })
}

/// Plan the return (or consumption) of up to `requested` reserved units,
/// oldest lot first. Clamps to what is actually reserved.
pub fn plan_release(lots: &[InventoryLot], requested: i32) -> Vec<LotDraw> {
    let mut remaining = requested;
    let mut draws = Vec::new();
    for lot in lots {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(lot.reserved);
        if take == 0 {
            continue;
        }
        draws.push(LotDraw {
            lot_id: lot.id,
            warehouse: lot.warehouse,
            units: take,
            unit_cost: lot.cost_basis,
        });
        remaining -= take;
    }
    draws
}

fn lot_by_id(lots: &[InventoryLot], id: Uuid) -> AppResult<&InventoryLot> {
    // Draws are planned from this same slice; a miss means a planner bug.
    lots.iter()
        .find(|l| l.id == id)
        .ok_or_else(|| AppError::Consistency(format!("planned draw references unknown lot {id}")))
}
