//! Preorder sweep
//!
//! Scans all preorders and converts the ones current stock can cover.
//! Typically scheduled after goods receipts land, but safe to run at any
//! time; orders that cannot be covered are simply left as preorders.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use engine::services::PreorderConversionService;
use engine::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "engine=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::load()?;

    tracing::info!("Starting preorder sweep");
    tracing::info!("Environment: {}", config.environment);

    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.database.url)
        .await?;

    if config.environment == "development" {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&db_pool).await?;
    }

    let conversion = PreorderConversionService::new(db_pool);
    let summary = conversion.auto_convert(&[], "system:preorder-sweep").await?;

    tracing::info!(
        converted = summary.converted.len(),
        unconverted = summary.failed.len(),
        outcome = ?summary.outcome,
        "Preorder sweep complete"
    );

    for failure in &summary.failed {
        match &failure.error {
            Some(err) => {
                tracing::warn!(order_id = %failure.order_id, error = %err, "order failed to convert")
            }
            None => tracing::info!(
                order_id = %failure.order_id,
                lines_short = failure.shortfalls.len(),
                "order waiting on stock"
            ),
        }
    }

    Ok(())
}
