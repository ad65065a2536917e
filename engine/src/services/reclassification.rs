//! Damage reclassification: moves discovered damage onto a marked-down
//! sibling variant
//!
//! The damaged sibling is created lazily, once per product, with price and
//! cost scaled by the markdown ratio at creation time. Later transfers for
//! the same product reuse the existing sibling and never re-apply the
//! markdown.

use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{AppError, AppResult};
use crate::services::catalog::{damaged_sibling_conn, get_variant_conn};
use crate::services::ledger::{lock_lot, record_movement_conn, stock_in_conn, MovementRow, StockInInput};
use crate::models::{MovementType, ProductVariant, StockMovement, VariantType, Warehouse};
use shared::validation::{validate_actor, validate_markdown_ratio, validate_positive_quantity};

/// Service handling damaged-stock reclassification
#[derive(Clone)]
pub struct DamageTransferService {
    db: PgPool,
    markdown_ratio: Decimal,
    decrement_source: bool,
}

/// Result of one damage transfer
#[derive(Debug, Clone)]
pub struct DamageTransferOutcome {
    pub damaged_variant: ProductVariant,
    pub movement: StockMovement,
    /// Set when the source lot was decremented alongside the transfer
    pub source_adjustment: Option<StockMovement>,
}

impl DamageTransferService {
    /// Create a new DamageTransferService instance
    pub fn new(db: PgPool, engine: &EngineConfig) -> Self {
        Self {
            db,
            markdown_ratio: engine.damaged_markdown_ratio,
            decrement_source: engine.decrement_source_on_damage,
        }
    }

    /// Move `quantity` units of a standard variant onto its damaged sibling.
    ///
    /// Stock lands in the company warehouse at the sibling's cost price.
    pub async fn transfer_damaged(
        &self,
        source_variant_id: Uuid,
        quantity: i32,
        actor: &str,
        reference: Option<String>,
    ) -> AppResult<DamageTransferOutcome> {
        validate_positive_quantity(quantity).map_err(|m| AppError::validation("quantity", m))?;
        validate_actor(actor).map_err(|m| AppError::validation("actor", m))?;
        validate_markdown_ratio(self.markdown_ratio)
            .map_err(|m| AppError::Configuration(format!("damaged_markdown_ratio: {m}")))?;

        let mut tx = self.db.begin().await?;

        let source = get_variant_conn(&mut tx, source_variant_id).await?;
        if source.variant_type == VariantType::Damaged {
            return Err(AppError::InvalidStateTransition(format!(
                "variant {source_variant_id} is already a damaged variant"
            )));
        }

        let source_adjustment = if self.decrement_source {
            Some(decrement_source_lot(&mut tx, &source, quantity, actor, reference.as_deref()).await?)
        } else {
            None
        };

        let damaged = resolve_damaged_sibling(&mut tx, &source, self.markdown_ratio).await?;

        let movement = stock_in_conn(
            &mut tx,
            &StockInInput {
                variant_id: damaged.id,
                warehouse: Warehouse::Company,
                quantity,
                unit_cost: damaged.cost_price,
                reason: format!("damage transfer from {}", source.name),
                reference,
                actor: actor.to_string(),
            },
            MovementType::DamageTransfer,
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            source_variant_id = %source_variant_id,
            damaged_variant_id = %damaged.id,
            quantity,
            "damaged stock reclassified"
        );

        Ok(DamageTransferOutcome {
            damaged_variant: damaged,
            movement,
            source_adjustment,
        })
    }
}

/// How a transfer obtains its damaged sibling
#[derive(Debug, Clone, PartialEq)]
pub enum SiblingPlan {
    /// A sibling already exists; its prices stay exactly as stored.
    Reuse(ProductVariant),
    /// First transfer for this product; the markdown applies here and
    /// never again.
    Create {
        name: String,
        price: Decimal,
        cost_price: Decimal,
    },
}

/// Decide between reusing the product's damaged sibling and creating it.
///
/// The markdown ratio only enters on creation. An existing sibling is
/// returned untouched no matter how many transfers follow.
pub fn plan_damaged_sibling(
    existing: Option<ProductVariant>,
    source: &ProductVariant,
    markdown_ratio: Decimal,
) -> SiblingPlan {
    match existing {
        Some(sibling) => SiblingPlan::Reuse(sibling),
        None => SiblingPlan::Create {
            name: markdown_name(&source.name),
            price: (source.price * markdown_ratio).round_dp(2),
            cost_price: (source.cost_price * markdown_ratio).round_dp(2),
        },
    }
}

/// Find the product's damaged sibling, creating it on first use.
///
/// Creation races are settled by the partial unique index on
/// `(product_id) WHERE variant_type = 'damaged'`; losers re-read the
/// winner's row.
async fn resolve_damaged_sibling(
    conn: &mut PgConnection,
    source: &ProductVariant,
    markdown_ratio: Decimal,
) -> AppResult<ProductVariant> {
    let existing = damaged_sibling_conn(&mut *conn, source.product_id).await?;
    let (name, price, cost_price) = match plan_damaged_sibling(existing, source, markdown_ratio) {
        SiblingPlan::Reuse(sibling) => return Ok(sibling),
        SiblingPlan::Create {
            name,
            price,
            cost_price,
        } => (name, price, cost_price),
    };

    sqlx::query(
        r#"
        INSERT INTO product_variants (product_id, name, variant_type, price, cost_price, is_default)
        VALUES ($1, $2, 'damaged', $3, $4, FALSE)
        ON CONFLICT (product_id) WHERE variant_type = 'damaged' DO NOTHING
        "#,
    )
    .bind(source.product_id)
    .bind(name)
    .bind(price)
    .bind(cost_price)
    .execute(&mut *conn)
    .await?;

    damaged_sibling_conn(conn, source.product_id)
        .await?
        .ok_or_else(|| {
            AppError::Consistency(format!(
                "damaged sibling for product {} missing after insert",
                source.product_id
            ))
        })
}

/// Remove the damaged units from the source variant's company lot.
async fn decrement_source_lot(
    conn: &mut PgConnection,
    source: &ProductVariant,
    quantity: i32,
    actor: &str,
    reference: Option<&str>,
) -> AppResult<StockMovement> {
    let lot = lock_lot(conn, source.id, Warehouse::Company)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Company lot for variant {}", source.id)))?;

    if lot.available < quantity {
        return Err(AppError::InsufficientStock {
            variant_id: source.id,
            requested: quantity,
            available: lot.available,
        });
    }

    sqlx::query(
        r#"
        UPDATE inventory_lots
        SET quantity = quantity - $1, available = available - $1, updated_at = NOW()
        WHERE id = $2
        "#,
    )
    .bind(quantity)
    .bind(lot.id)
    .execute(&mut *conn)
    .await?;

    record_movement_conn(
        conn,
        MovementRow {
            variant_id: source.id,
            warehouse: Warehouse::Company,
            movement_type: MovementType::Adjustment,
            quantity_before: lot.quantity,
            quantity_change: -quantity,
            quantity_after: lot.quantity - quantity,
            unit_cost: lot.cost_basis,
            total_cost: lot.cost_basis * Decimal::from(quantity),
            reason: format!("damage transfer out of {}", source.name),
            reference: reference.map(str::to_string),
            actor: actor.to_string(),
        },
    )
    .await
}

fn markdown_name(source_name: &str) -> String {
    format!("{source_name} (damaged)")
}
