// src/db.rs

use std::{str::FromStr, time::Duration};

use chrono::Utc;
use sqlx::{
    SqlitePool,
    migrate::{MigrateError, Migrator},
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

use crate::{
    config::{Config, DEFAULT_ADMIN_PASSWORD},
    error::AppError,
    utils::hash::hash_password,
};

/// Versioned schema, applied once at startup.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const CONNECT_ATTEMPTS: u32 = 5;

/// Opens the SQLite pool, creating the database file if needed.
/// Retries a few times before giving up.
pub async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let mut retry_count = 0;
    loop {
        match SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect_with(options.clone())
            .await
        {
            Ok(pool) => return Ok(pool),
            Err(e) => {
                retry_count += 1;
                if retry_count >= CONNECT_ATTEMPTS {
                    return Err(e);
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}

/// Private in-memory database. A single connection that never expires, since
/// every SQLite `:memory:` connection is its own database.
pub async fn connect_in_memory() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
}

pub async fn migrate(pool: &SqlitePool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Creates the configured admin account when no admin exists yet.
pub async fn seed_admin(pool: &SqlitePool, config: &Config) -> Result<(), AppError> {
    let admins: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM admins")
        .fetch_one(pool)
        .await?;

    if admins > 0 {
        return Ok(());
    }

    if config.admin_password == DEFAULT_ADMIN_PASSWORD {
        tracing::warn!("Seeding admin with the default password; change it after first login.");
    }

    tracing::info!("Seeding admin user: {}", config.admin_username);
    let hashed_password = hash_password(&config.admin_password)?;

    sqlx::query("INSERT INTO admins (username, password_hash, created_at) VALUES (?1, ?2, ?3)")
        .bind(&config.admin_username)
        .bind(hashed_password)
        .bind(Utc::now())
        .execute(pool)
        .await?;

    tracing::info!("Admin user created successfully.");
    Ok(())
}
