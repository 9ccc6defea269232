// src/monitoring.rs
use actix_web::{web, HttpResponse};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;
use tokio::time::{interval, sleep, Duration};
use lazy_static::lazy_static;
use crate::audit::{audit, Actor};
use crate::config::InventoryConfig;
use crate::error::ApiResult;
use crate::inventory::InventoryService;
use crate::AppState;

lazy_static! {
    static ref STARTED_AT: Instant = Instant::now();
}

const EXPIRY_SWEEP_INTERVAL_SECS: u64 = 3600;
const AUDIT_RETENTION_DAYS: i64 = 90;
const AUDIT_CLEANUP_CHUNK: i64 = 1000;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub uptime_seconds: u64,
}

pub async fn health_check() -> HttpResponse {
    let response = HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: STARTED_AT.elapsed().as_secs(),
    };

    HttpResponse::Ok().json(response)
}

/// Ready once the database answers and the inventory table is in place.
pub async fn readiness_check(app_state: web::Data<Arc<AppState>>) -> HttpResponse {
    let pool = &app_state.db_pool;
    if let Err(e) = sqlx::query("SELECT 1").fetch_one(pool).await {
        log::warn!("Readiness check failed: {}", e);
        return HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "status": "not ready",
            "database": "disconnected"
        }));
    }

    match crate::db::table_exists(pool, crate::db::INVENTORY_TABLE).await {
        Ok(true) => HttpResponse::Ok().json(serde_json::json!({
            "status": "ready",
            "database": "connected"
        })),
        _ => HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "status": "not ready",
            "database": "schema missing"
        })),
    }
}

pub async fn start_maintenance_tasks(pool: SqlitePool, settings: InventoryConfig) {
    // Touch the clock so uptime counts from startup
    lazy_static::initialize(&STARTED_AT);

    let audit_pool = pool.clone();
    tokio::spawn(async move {
        cleanup_old_audit_logs(audit_pool).await;
    });

    tokio::spawn(async move {
        expire_units_periodically(pool, settings).await;
    });
}

async fn expire_units_periodically(pool: SqlitePool, settings: InventoryConfig) {
    let mut interval = interval(Duration::from_secs(EXPIRY_SWEEP_INTERVAL_SECS));

    loop {
        interval.tick().await;
        match sweep_expired_units(&pool, &settings, Utc::now().date_naive()).await {
            Ok(0) => log::debug!("Expiry sweep: nothing to expire"),
            Ok(count) => log::info!("Expiry sweep marked {} units as expired", count),
            Err(e) => log::error!("Expiry sweep failed: {}", e),
        }
    }
}

/// One sweep pass; audited as the `system` actor when anything expired.
pub async fn sweep_expired_units(pool: &SqlitePool, settings: &InventoryConfig, today: NaiveDate) -> ApiResult<u64> {
    let count = InventoryService::new(pool, settings).expire_stale_units(today).await?;
    if count > 0 {
        audit(
            pool,
            &Actor::system(),
            "expire",
            "inventory",
            "blood_inventory",
            &format!("Marked {} units as expired", count),
        ).await;
    }
    Ok(count)
}

async fn cleanup_old_audit_logs(pool: SqlitePool) {
    let mut interval = interval(Duration::from_secs(24 * 3600));

    loop {
        interval.tick().await;
        let cutoff = Utc::now() - chrono::Duration::days(AUDIT_RETENTION_DAYS);

        match purge_audit_logs(&pool, cutoff, AUDIT_CLEANUP_CHUNK).await {
            Ok(0) => {}
            Ok(total_deleted) => log::info!(
                "Removed {} audit log entries older than {} days",
                total_deleted,
                AUDIT_RETENTION_DAYS
            ),
            Err(e) => log::error!("Failed to clean up audit logs: {}", e),
        }
    }
}

/// Deletes audit rows created before `cutoff`, `chunk` rows per statement.
pub async fn purge_audit_logs(pool: &SqlitePool, cutoff: DateTime<Utc>, chunk: i64) -> Result<u64, sqlx::Error> {
    let mut total_deleted = 0;

    loop {
        let deleted = sqlx::query(
            r#"DELETE FROM audit_logs
               WHERE id IN (
                   SELECT id FROM audit_logs
                   WHERE created_at < ?
                   LIMIT ?
               )"#
        )
            .bind(cutoff)
            .bind(chunk)
            .execute(pool)
            .await?
            .rows_affected();

        total_deleted += deleted;
        if deleted < chunk as u64 {
            return Ok(total_deleted);
        }
        sleep(Duration::from_millis(50)).await;
    }
}
