// src/test_support.rs
//! In-memory database fixtures for unit tests

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use crate::db::run_migrations;

/// Single-connection pool: every connection to `sqlite::memory:` is a
/// separate database, so the pool must never open a second one.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("open in-memory database");
    run_migrations(&pool).await.expect("run migrations");
    pool
}

pub async fn insert_donor(
    pool: &SqlitePool,
    table: &str,
    name: &str,
    blood_type: &str,
    status: &str,
    created_at: &str,
) -> i64 {
    let sql = format!(
        "INSERT INTO {} (name, email, blood_type, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        table
    );
    sqlx::query(&sql)
        .bind(name)
        .bind(format!("{}@example.com", name.to_lowercase().replace(' ', ".")))
        .bind(blood_type)
        .bind(status)
        .bind(created_at)
        .bind(created_at)
        .execute(pool)
        .await
        .expect("insert donor")
        .last_insert_rowid()
}

pub async fn insert_donor_with_id(
    pool: &SqlitePool,
    table: &str,
    id: i64,
    name: &str,
    blood_type: &str,
    status: &str,
    created_at: &str,
) {
    let sql = format!(
        "INSERT INTO {} (id, name, blood_type, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        table
    );
    sqlx::query(&sql)
        .bind(id)
        .bind(name)
        .bind(blood_type)
        .bind(status)
        .bind(created_at)
        .bind(created_at)
        .execute(pool)
        .await
        .expect("insert donor with id");
}

pub async fn insert_unit(
    pool: &SqlitePool,
    unit_id: &str,
    donor_id: Option<i64>,
    blood_type: &str,
    collection_date: &str,
    expiry_date: &str,
    status: &str,
) {
    sqlx::query(
        r#"INSERT INTO blood_inventory
           (unit_id, donor_id, blood_type, collection_date, expiry_date, status, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, datetime('now'), datetime('now'))"#
    )
        .bind(unit_id)
        .bind(donor_id)
        .bind(blood_type)
        .bind(collection_date)
        .bind(expiry_date)
        .bind(status)
        .execute(pool)
        .await
        .expect("insert unit");
}

pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .expect("count rows")
}

/// Swaps the legacy `donors` table for one without CHECK constraints, the
/// way older databases were created, then restores the views over it.
pub async fn loosen_legacy_donors(pool: &SqlitePool) {
    for statement in [
        "DROP VIEW virtual_inventory",
        "DROP VIEW inventory_listing",
        "DROP TABLE donors",
        "CREATE TABLE donors (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, email TEXT, phone TEXT, \
         blood_type TEXT, status TEXT, created_at TEXT, updated_at TEXT)",
    ] {
        sqlx::query(statement).execute(pool).await.expect("replace legacy donors");
    }
    run_migrations(pool).await.expect("restore views");
}
