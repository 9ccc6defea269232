// src/db.rs - Database setup, migrations and schema helpers

use std::str::FromStr;
use std::time::Duration;
use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use crate::config::DatabaseConfig;

pub const DONORS_TABLE: &str = "donors_new";
pub const LEGACY_DONORS_TABLE: &str = "donors";
pub const INVENTORY_TABLE: &str = "blood_inventory";

/// How long a writer waits on a lock held by the server or the cron job.
const BUSY_TIMEOUT_SECS: u64 = 5;

const DONOR_STATUS_CHECK: &str =
    "status IN ('pending', 'approved', 'served', 'unserved', 'rejected', 'suspended', 'completed')";
const BLOOD_TYPE_CHECK: &str =
    "blood_type IN ('A+', 'A-', 'B+', 'B-', 'AB+', 'AB-', 'O+', 'O-', 'Unknown')";

/// Opens the pool. `create_if_missing` is off for the cron job so a wrong
/// `DATABASE_URL` fails instead of producing an empty database.
pub async fn create_database_pool(db_config: &DatabaseConfig, create_if_missing: bool) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&db_config.url)
        .with_context(|| format!("Invalid database URL: {}", db_config.url))?
        .create_if_missing(create_if_missing)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(BUSY_TIMEOUT_SECS))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(db_config.max_connections)
        .min_connections(db_config.min_connections)
        .acquire_timeout(Duration::from_secs(db_config.connect_timeout))
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to connect to database: {}", db_config.url))?;

    Ok(pool)
}

fn donor_table_sql(table: &str) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL CHECK(length(name) > 0 AND length(name) <= 255),
            email TEXT CHECK(email IS NULL OR length(email) <= 255),
            phone TEXT CHECK(phone IS NULL OR length(phone) <= 50),
            blood_type TEXT NOT NULL DEFAULT 'Unknown' CHECK({BLOOD_TYPE_CHECK}),
            status TEXT NOT NULL DEFAULT 'pending' CHECK({DONOR_STATUS_CHECK}),
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#
    )
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(pool)
        .await?;

    sqlx::query(&donor_table_sql(DONORS_TABLE))
        .execute(pool)
        .await?;

    // Legacy registrations, read by the sync job only
    sqlx::query(&donor_table_sql(LEGACY_DONORS_TABLE))
        .execute(pool)
        .await?;

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS blood_inventory (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            unit_id TEXT NOT NULL UNIQUE CHECK(length(unit_id) > 0 AND length(unit_id) <= 64),
            donor_id INTEGER,
            blood_type TEXT NOT NULL CHECK({BLOOD_TYPE_CHECK}),
            collection_date DATE NOT NULL,
            expiry_date DATE NOT NULL,
            status TEXT NOT NULL DEFAULT 'available' CHECK(
                status IN ('available', 'used', 'expired', 'quarantined')
            ),
            collection_site TEXT CHECK(collection_site IS NULL OR length(collection_site) <= 255),
            storage_location TEXT CHECK(storage_location IS NULL OR length(storage_location) <= 255),
            reference TEXT CHECK(reference IS NULL OR length(reference) <= 255),
            used_date DATETIME,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            CHECK(expiry_date >= collection_date)
        )
        "#
    ))
        .execute(pool)
        .await?;

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS blood_requests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            patient_name TEXT NOT NULL CHECK(length(patient_name) > 0 AND length(patient_name) <= 255),
            hospital TEXT NOT NULL CHECK(length(hospital) > 0 AND length(hospital) <= 255),
            blood_type TEXT NOT NULL CHECK({BLOOD_TYPE_CHECK}),
            units_requested INTEGER NOT NULL CHECK(units_requested >= 1),
            urgency TEXT NOT NULL DEFAULT 'routine' CHECK(
                urgency IN ('routine', 'urgent', 'emergency')
            ),
            status TEXT NOT NULL DEFAULT 'pending' CHECK(
                status IN ('pending', 'approved', 'fulfilled', 'rejected', 'cancelled')
            ),
            notes TEXT CHECK(notes IS NULL OR length(notes) <= 1000),
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#
    ))
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_logs (
            id TEXT PRIMARY KEY,
            actor TEXT,
            action TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT,
            description TEXT,
            ip_address TEXT,
            created_at DATETIME NOT NULL
        )
        "#,
    )
        .execute(pool)
        .await?;

    // Rows owned by a donor; removed with it
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS donor_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            donor_id INTEGER NOT NULL,
            subject TEXT,
            body TEXT,
            created_at DATETIME NOT NULL
        )
        "#,
    )
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS donor_matching (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            donor_id INTEGER NOT NULL,
            request_id INTEGER,
            created_at DATETIME NOT NULL
        )
        "#,
    )
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS donor_screening (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            donor_id INTEGER NOT NULL,
            hemoglobin REAL,
            notes TEXT,
            screened_at DATETIME NOT NULL
        )
        "#,
    )
        .execute(pool)
        .await?;

    // ==================== INDEXES ====================

    let index_queries = [
        "CREATE INDEX IF NOT EXISTS idx_donors_new_status ON donors_new(status)",
        "CREATE INDEX IF NOT EXISTS idx_donors_new_blood_type ON donors_new(blood_type)",
        "CREATE INDEX IF NOT EXISTS idx_donors_status ON donors(status)",
        "CREATE INDEX IF NOT EXISTS idx_inventory_donor ON blood_inventory(donor_id)",
        "CREATE INDEX IF NOT EXISTS idx_inventory_status ON blood_inventory(status)",
        "CREATE INDEX IF NOT EXISTS idx_inventory_blood_type ON blood_inventory(blood_type)",
        "CREATE INDEX IF NOT EXISTS idx_inventory_expiry ON blood_inventory(expiry_date)",
        "CREATE INDEX IF NOT EXISTS idx_requests_status ON blood_requests(status)",
        "CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_logs(entity_type, entity_id)",
        "CREATE INDEX IF NOT EXISTS idx_donor_messages_donor ON donor_messages(donor_id)",
        "CREATE INDEX IF NOT EXISTS idx_donor_matching_donor ON donor_matching(donor_id)",
        "CREATE INDEX IF NOT EXISTS idx_donor_screening_donor ON donor_screening(donor_id)",
    ];

    for query in index_queries.iter() {
        if let Err(e) = sqlx::query(query).execute(pool).await {
            log::warn!("Index creation failed ({}): {}", query, e);
        }
    }

    migrate_existing_tables(pool).await?;

    create_views(pool).await?;

    Ok(())
}

// ==================== LISTING VIEWS ====================

async fn create_views(pool: &SqlitePool) -> Result<()> {
    // Physical units with the donor name from whichever donor table knows it
    sqlx::query(
        r#"
        CREATE VIEW IF NOT EXISTS inventory_listing AS
        SELECT
            bi.id AS id,
            bi.unit_id AS unit_id,
            bi.donor_id AS donor_id,
            COALESCE(dn.name, d.name) AS donor_name,
            bi.blood_type AS blood_type,
            bi.collection_date AS collection_date,
            bi.expiry_date AS expiry_date,
            bi.status AS status,
            bi.collection_site AS collection_site,
            bi.storage_location AS storage_location,
            bi.reference AS reference,
            bi.used_date AS used_date,
            bi.created_at AS created_at,
            bi.updated_at AS updated_at
        FROM blood_inventory bi
        LEFT JOIN donors_new dn ON dn.id = bi.donor_id
        LEFT JOIN donors d ON d.id = bi.donor_id
        "#,
    )
        .execute(pool)
        .await?;

    // Served donors projected as units. A legacy row is hidden when the
    // same id is already served in donors_new.
    sqlx::query(
        r#"
        CREATE VIEW IF NOT EXISTS virtual_inventory AS
        SELECT
            id AS donor_id,
            name AS donor_name,
            blood_type AS blood_type,
            date(created_at) AS collection_date,
            'donors_new' AS source_table
        FROM donors_new
        WHERE status IN ('served', 'completed')
        UNION ALL
        SELECT
            id AS donor_id,
            name AS donor_name,
            blood_type AS blood_type,
            date(created_at) AS collection_date,
            'donors' AS source_table
        FROM donors
        WHERE status = 'served'
          AND id NOT IN (SELECT id FROM donors_new WHERE status IN ('served', 'completed'))
        "#,
    )
        .execute(pool)
        .await?;

    Ok(())
}

// ==================== MIGRATION FOR EXISTING DATABASES ====================

pub async fn migrate_existing_tables(pool: &SqlitePool) -> Result<()> {
    let migrations: [(&str, &str, &str); 5] = [
        (INVENTORY_TABLE, "used_date", "ALTER TABLE blood_inventory ADD COLUMN used_date DATETIME"),
        (INVENTORY_TABLE, "reference", "ALTER TABLE blood_inventory ADD COLUMN reference TEXT"),
        (INVENTORY_TABLE, "collection_site", "ALTER TABLE blood_inventory ADD COLUMN collection_site TEXT"),
        (INVENTORY_TABLE, "storage_location", "ALTER TABLE blood_inventory ADD COLUMN storage_location TEXT"),
        (DONORS_TABLE, "phone", "ALTER TABLE donors_new ADD COLUMN phone TEXT"),
    ];

    for (table, column, query) in migrations.iter() {
        if !column_exists(pool, table, column).await? {
            log::info!("Adding column {}.{}", table, column);
            sqlx::query(query).execute(pool).await?;
        }
    }

    Ok(())
}

// ==================== UTILITY FUNCTIONS ====================

/// Check if a table exists
pub async fn table_exists(pool: &SqlitePool, table: &str) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?"
    )
        .bind(table)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

/// Check if a column exists in a table
pub async fn column_exists(pool: &SqlitePool, table: &str, column: &str) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?"
    )
        .bind(table)
        .bind(column)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_pool;

    fn file_config(path: &std::path::Path) -> DatabaseConfig {
        DatabaseConfig {
            url: format!("sqlite:{}", path.display()),
            max_connections: 2,
            min_connections: 1,
            connect_timeout: 5,
        }
    }

    #[tokio::test]
    async fn test_file_pool_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let config = file_config(&dir.path().join("bloodbank.db"));

        let pool = create_database_pool(&config, true).await.unwrap();
        let mode: String = sqlx::query_scalar("PRAGMA journal_mode").fetch_one(&pool).await.unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        let timeout: i64 = sqlx::query_scalar("PRAGMA busy_timeout").fetch_one(&pool).await.unwrap();
        assert_eq!(timeout, (BUSY_TIMEOUT_SECS * 1000) as i64);
        pool.close().await;
    }

    #[tokio::test]
    async fn test_missing_file_is_not_created_for_the_job() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.db");

        assert!(create_database_pool(&file_config(&path), false).await.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = memory_pool().await;
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        for table in ["donors_new", "donors", "blood_inventory", "blood_requests", "audit_logs"] {
            assert!(table_exists(&pool, table).await.unwrap(), "missing table {}", table);
        }
    }

    #[tokio::test]
    async fn test_column_exists() {
        let pool = memory_pool().await;
        assert!(column_exists(&pool, "blood_inventory", "used_date").await.unwrap());
        assert!(!column_exists(&pool, "blood_inventory", "no_such_column").await.unwrap());
        assert!(!table_exists(&pool, "no_such_table").await.unwrap());
    }

    #[tokio::test]
    async fn test_migrate_adds_missing_used_date() {
        let pool = memory_pool().await;
        sqlx::query("DROP VIEW inventory_listing").execute(&pool).await.unwrap();
        sqlx::query("DROP TABLE blood_inventory").execute(&pool).await.unwrap();
        sqlx::query(
            "CREATE TABLE blood_inventory (id INTEGER PRIMARY KEY, unit_id TEXT, donor_id INTEGER, \
             blood_type TEXT, collection_date DATE, expiry_date DATE, status TEXT, \
             created_at DATETIME, updated_at DATETIME)"
        )
            .execute(&pool)
            .await
            .unwrap();

        migrate_existing_tables(&pool).await.unwrap();
        assert!(column_exists(&pool, "blood_inventory", "used_date").await.unwrap());
        assert!(column_exists(&pool, "blood_inventory", "reference").await.unwrap());
    }
}
