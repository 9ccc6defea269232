// src/inventory/store.rs
//! Row-level access to `blood_inventory` shared by the sync job and the admin API

use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use sqlx::SqlitePool;
use crate::models::{BloodType, UnitStatus};

/// Attempts before giving up on a colliding random suffix.
const MAX_UNIT_ID_ATTEMPTS: usize = 5;

/// `<prefix>-<YYYYMMDD>-<donor>-<suffix>`; units without a donor use `M`.
pub fn format_unit_id(prefix: &str, collection_date: NaiveDate, donor_id: Option<i64>, suffix: u16) -> String {
    let donor = donor_id.map(|id| id.to_string()).unwrap_or_else(|| "M".to_string());
    format!("{}-{}-{}-{:04}", prefix, collection_date.format("%Y%m%d"), donor, suffix)
}

pub fn generate_unit_id(prefix: &str, collection_date: NaiveDate, donor_id: Option<i64>) -> String {
    let suffix: u16 = rand::thread_rng().gen_range(1000..=9999);
    format_unit_id(prefix, collection_date, donor_id, suffix)
}

#[derive(Debug, Clone)]
pub struct NewUnit {
    pub donor_id: Option<i64>,
    pub blood_type: BloodType,
    pub collection_date: NaiveDate,
    pub expiry_date: NaiveDate,
    pub status: UnitStatus,
    pub collection_site: Option<String>,
    pub storage_location: Option<String>,
    pub reference: Option<String>,
    pub used_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

pub async fn donor_has_unit(pool: &SqlitePool, donor_id: i64) -> Result<bool, sqlx::Error> {
    let found: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM blood_inventory WHERE donor_id = ? LIMIT 1"
    )
        .bind(donor_id)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

pub async fn count_units(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM blood_inventory")
        .fetch_one(pool)
        .await
}

/// Inserts the unit under a freshly generated unit id and returns that id.
/// `with_used_date` is false for legacy tables that lack the column.
pub async fn insert_unit(
    pool: &SqlitePool,
    unit: &NewUnit,
    prefix: &str,
    with_used_date: bool,
) -> Result<String, sqlx::Error> {
    let sql = if with_used_date {
        r#"INSERT INTO blood_inventory
           (unit_id, donor_id, blood_type, collection_date, expiry_date, status,
            collection_site, storage_location, reference, used_date, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#
    } else {
        r#"INSERT INTO blood_inventory
           (unit_id, donor_id, blood_type, collection_date, expiry_date, status,
            collection_site, storage_location, reference, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#
    };

    let mut attempt = 0;
    loop {
        attempt += 1;
        let unit_id = generate_unit_id(prefix, unit.collection_date, unit.donor_id);

        let mut query = sqlx::query(sql)
            .bind(&unit_id)
            .bind(unit.donor_id)
            .bind(unit.blood_type)
            .bind(unit.collection_date)
            .bind(unit.expiry_date)
            .bind(unit.status)
            .bind(&unit.collection_site)
            .bind(&unit.storage_location)
            .bind(&unit.reference);
        if with_used_date {
            query = query.bind(unit.used_date);
        }
        let result = query
            .bind(unit.created_at)
            .bind(unit.created_at)
            .execute(pool)
            .await;

        match result {
            Ok(_) => return Ok(unit_id),
            Err(sqlx::Error::Database(db_err))
                if db_err.is_unique_violation() && attempt < MAX_UNIT_ID_ATTEMPTS =>
            {
                log::debug!("Unit id {} already taken, regenerating", unit_id);
            }
            Err(e) => return Err(e),
        }
    }
}
