//! Backorder lifecycle
//!
//! Backorders record unmet demand after allocation. They are never
//! deleted: a later stock-in that converts the preorder marks them
//! fulfilled, a cancellation marks them cancelled.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Backorder, BackorderStatus};

/// Backorder service
#[derive(Clone)]
pub struct BackorderService {
    db: PgPool,
}

impl BackorderService {
    /// Create a new BackorderService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Record unmet demand for an order/variant pair
    pub async fn create(
        &self,
        order_id: Uuid,
        variant_id: Uuid,
        quantity: i32,
        priority: i32,
    ) -> AppResult<Backorder> {
        let mut conn = self.db.acquire().await?;
        create_conn(&mut conn, order_id, variant_id, quantity, priority).await
    }

    /// Pending backorders, optionally filtered to one variant, highest
    /// priority then oldest first
    pub async fn list_pending(&self, variant_id: Option<Uuid>) -> AppResult<Vec<Backorder>> {
        let rows = sqlx::query_as::<_, BackorderDbRow>(
            r#"
            SELECT id, order_id, variant_id, quantity, priority, status, created_at, resolved_at
            FROM backorders
            WHERE status = 'pending' AND ($1::uuid IS NULL OR variant_id = $1)
            ORDER BY priority DESC, created_at ASC
            "#,
        )
        .bind(variant_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(backorder_from_row).collect()
    }

    /// Cancel a pending backorder (soft transition)
    pub async fn cancel(&self, backorder_id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE backorders
            SET status = 'cancelled', resolved_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(backorder_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Pending backorder".to_string()));
        }
        Ok(())
    }
}

pub(crate) async fn create_conn(
    conn: &mut PgConnection,
    order_id: Uuid,
    variant_id: Uuid,
    quantity: i32,
    priority: i32,
) -> AppResult<Backorder> {
    if quantity <= 0 {
        return Err(AppError::validation(
            "quantity",
            "Backorder quantity must be positive",
        ));
    }

    let (id, created_at): (Uuid, DateTime<Utc>) = sqlx::query_as(
        r#"
        INSERT INTO backorders (order_id, variant_id, quantity, priority, status)
        VALUES ($1, $2, $3, $4, 'pending')
        RETURNING id, created_at
        "#,
    )
    .bind(order_id)
    .bind(variant_id)
    .bind(quantity)
    .bind(priority)
    .fetch_one(&mut *conn)
    .await?;

    Ok(Backorder {
        id,
        order_id,
        variant_id,
        quantity,
        priority,
        status: BackorderStatus::Pending,
        created_at,
        resolved_at: None,
    })
}

/// Mark pending backorders for (order, variants) fulfilled; returns the
/// number of rows transitioned.
pub(crate) async fn fulfill_for_order_conn(
    conn: &mut PgConnection,
    order_id: Uuid,
    variant_ids: &[Uuid],
) -> AppResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE backorders
        SET status = 'fulfilled', resolved_at = NOW()
        WHERE order_id = $1 AND variant_id = ANY($2) AND status = 'pending'
        "#,
    )
    .bind(order_id)
    .bind(variant_ids)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

type BackorderDbRow = (
    Uuid,
    Uuid,
    Uuid,
    i32,
    i32,
    String,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
);

fn backorder_from_row(row: BackorderDbRow) -> AppResult<Backorder> {
    let (id, order_id, variant_id, quantity, priority, status, created_at, resolved_at) = row;
    Ok(Backorder {
        id,
        order_id,
        variant_id,
        quantity,
        priority,
        status: BackorderStatus::from_str(&status)
            .ok_or_else(|| AppError::Consistency(format!("unknown backorder status '{status}'")))?,
        created_at,
        resolved_at,
    })
}
