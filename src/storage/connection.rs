use crate::storage::entity;
use log::info;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Schema};
use std::time::Duration;

pub async fn establish_connection(db_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(db_url.to_owned());
    opt.max_connections(10)
        .min_connections(2)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(8))
        .max_lifetime(Duration::from_secs(8))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Info);

    let db = Database::connect(opt).await?;

    // 启用 WAL 模式
    let _ = sea_orm::ConnectionTrait::execute(
        &db,
        sea_orm::Statement::from_string(
            sea_orm::DatabaseBackend::Sqlite,
            "PRAGMA journal_mode=WAL;".to_string(),
        ),
    )
    .await?;

    // 创建表（如果不存在）
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let stmt = builder.build(
        schema
            .create_table_from_entity(entity::agent_definition::Entity)
            .if_not_exists(),
    );
    db.execute(stmt).await?;

    let stmt = builder.build(
        schema
            .create_table_from_entity(entity::instrument::Entity)
            .if_not_exists(),
    );
    db.execute(stmt).await?;
    ensure_instrument_columns(&db).await?;

    let stmt = builder.build(
        schema
            .create_table_from_entity(entity::instrument_agent_binding::Entity)
            .if_not_exists(),
    );
    db.execute(stmt).await?;

    let stmt = builder.build(
        schema
            .create_table_from_entity(entity::data_source_binding::Entity)
            .if_not_exists(),
    );
    db.execute(stmt).await?;

    let stmt = builder.build(
        schema
            .create_table_from_entity(entity::notify_channel::Entity)
            .if_not_exists(),
    );
    db.execute(stmt).await?;

    let stmt = builder.build(
        schema
            .create_table_from_entity(entity::ai_model::Entity)
            .if_not_exists(),
    );
    db.execute(stmt).await?;

    let stmt = builder.build(
        schema
            .create_table_from_entity(entity::throttle_state::Entity)
            .if_not_exists(),
    );
    db.execute(stmt).await?;

    let stmt = builder.build(
        schema
            .create_table_from_entity(entity::agent_run::Entity)
            .if_not_exists(),
    );
    db.execute(stmt).await?;

    // 唯一索引：标识字段去重 + 节流键按 (agent, instrument) 唯一
    for sql in [
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_agent_definitions_name ON agent_definitions(name);",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_instruments_symbol ON instruments(symbol);",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_bindings_instrument_agent ON instrument_agent_bindings(instrument_id, agent_name);",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_data_source_name_provider ON data_source_bindings(name, provider);",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_throttle_agent_instrument ON throttle_states(agent_name, instrument_id);",
    ] {
        let _ = sea_orm::ConnectionTrait::execute(
            &db,
            sea_orm::Statement::from_string(sea_orm::DatabaseBackend::Sqlite, sql.to_string()),
        )
        .await?;
    }

    info!("Database connection established with WAL mode and table initialized.");

    Ok(db)
}

/// 持仓字段是后加的，旧库补列
async fn ensure_instrument_columns(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    if backend != sea_orm::DatabaseBackend::Sqlite {
        return Ok(());
    }

    let rows = db
        .query_all(sea_orm::Statement::from_string(
            backend,
            "PRAGMA table_info(instruments);".to_string(),
        ))
        .await?;

    let mut cols = std::collections::HashSet::new();
    for row in rows {
        if let Ok(name) = row.try_get::<String>("", "name") {
            cols.insert(name);
        }
    }

    if !cols.contains("cost_price") {
        db.execute(sea_orm::Statement::from_string(
            backend,
            "ALTER TABLE instruments ADD COLUMN cost_price REAL;".to_string(),
        ))
        .await?;
    }
    if !cols.contains("shares") {
        db.execute(sea_orm::Statement::from_string(
            backend,
            "ALTER TABLE instruments ADD COLUMN shares REAL;".to_string(),
        ))
        .await?;
    }

    Ok(())
}
