//! Read-only catalog lookups used by reclassification and default-variant
//! resolution
//!
//! The catalog is owned by the product-management side of the system; the
//! engine only reads it (the one write, damaged-sibling creation, lives in
//! the reclassification service).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{ProductVariant, VariantType};

/// Catalog lookup service
#[derive(Clone)]
pub struct CatalogService {
    db: PgPool,
}

impl CatalogService {
    /// Create a new CatalogService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Get a variant by id
    pub async fn get_variant(&self, variant_id: Uuid) -> AppResult<ProductVariant> {
        let mut conn = self.db.acquire().await?;
        get_variant_conn(&mut conn, variant_id).await
    }

    /// The default variant for a product, used when an order line does not
    /// pin one
    pub async fn default_variant_for_product(&self, product_id: Uuid) -> AppResult<ProductVariant> {
        let mut conn = self.db.acquire().await?;
        default_variant_conn(&mut conn, product_id).await
    }
}

pub(crate) async fn get_variant_conn(
    conn: &mut PgConnection,
    variant_id: Uuid,
) -> AppResult<ProductVariant> {
    let row = sqlx::query_as::<_, VariantDbRow>(
        r#"
        SELECT id, product_id, name, variant_type, price, cost_price, is_default,
               created_at, updated_at
        FROM product_variants
        WHERE id = $1
        "#,
    )
    .bind(variant_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Product variant".to_string()))?;

    variant_from_row(row)
}

pub(crate) async fn default_variant_conn(
    conn: &mut PgConnection,
    product_id: Uuid,
) -> AppResult<ProductVariant> {
    let row = sqlx::query_as::<_, VariantDbRow>(
        r#"
        SELECT id, product_id, name, variant_type, price, cost_price, is_default,
               created_at, updated_at
        FROM product_variants
        WHERE product_id = $1 AND is_default AND variant_type = 'standard'
        ORDER BY created_at ASC
        LIMIT 1
        "#,
    )
    .bind(product_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Default variant for product {product_id}")))?;

    variant_from_row(row)
}

/// The damaged sibling of a product, if it exists
pub(crate) async fn damaged_sibling_conn(
    conn: &mut PgConnection,
    product_id: Uuid,
) -> AppResult<Option<ProductVariant>> {
    let row = sqlx::query_as::<_, VariantDbRow>(
        r#"
        SELECT id, product_id, name, variant_type, price, cost_price, is_default,
               created_at, updated_at
        FROM product_variants
        WHERE product_id = $1 AND variant_type = 'damaged'
        "#,
    )
    .bind(product_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(variant_from_row).transpose()
}

pub(crate) type VariantDbRow = (
    Uuid,
    Uuid,
    String,
    String,
    Decimal,
    Decimal,
    bool,
    DateTime<Utc>,
    DateTime<Utc>,
);

pub(crate) fn variant_from_row(row: VariantDbRow) -> AppResult<ProductVariant> {
    let (id, product_id, name, variant_type, price, cost_price, is_default, created_at, updated_at) =
        row;
    Ok(ProductVariant {
        id,
        product_id,
        name,
        variant_type: VariantType::from_str(&variant_type)
            .ok_or_else(|| AppError::Consistency(format!("unknown variant type '{variant_type}'")))?,
        price,
        cost_price,
        is_default,
        created_at,
        updated_at,
    })
}
