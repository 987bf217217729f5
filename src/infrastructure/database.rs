use crate::config::DatabaseConfig;
use crate::entities::file_records;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema};
use std::time::Duration;
use tracing::info;

pub async fn setup_database(config: &DatabaseConfig) -> anyhow::Result<DatabaseConnection> {
    let db_url = config.connection_url();

    info!("📂 Database: {}", config.redacted_url());

    let mut opt = ConnectOptions::new(&db_url);
    if db_url.contains(":memory:") {
        // Every pooled connection would otherwise get its own empty database
        opt.max_connections(1).min_connections(1);
    } else {
        opt.max_connections(20)
            .min_connections(1)
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800));
    }
    opt.connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let db = Database::connect(opt).await?;

    info!("✅ Database connected successfully");

    run_migrations(&db).await?;

    Ok(db)
}

/// Create the file record table if it does not exist yet.
pub async fn run_migrations(db: &DatabaseConnection) -> anyhow::Result<()> {
    info!("🔄 Syncing schema...");
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let stmt = schema
        .create_table_from_entity(file_records::Entity)
        .if_not_exists()
        .to_owned();
    db.execute(builder.build(&stmt)).await?;

    db.execute(sea_orm::Statement::from_string(
        builder,
        "CREATE INDEX IF NOT EXISTS idx_file_records_status_created ON file_records(status, created_at);"
            .to_string(),
    ))
    .await?;

    Ok(())
}
