// src/inventory_handlers.rs
//! HTTP surface of the inventory: dashboard, listing, unit admin and the sync trigger

use actix_web::{web, HttpRequest, HttpResponse};
use std::sync::Arc;
use chrono::Utc;
use crate::audit::{audit, Actor};
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::inventory::{InventoryService, InventorySync, SyncError};
use crate::models::{CreateUnitRequest, InventoryQuery, UpdateUnitStatusRequest};
use crate::AppState;

fn service(app_state: &AppState) -> InventoryService<'_> {
    InventoryService::new(&app_state.db_pool, &app_state.config.inventory)
}

pub async fn get_dashboard_summary(app_state: web::Data<Arc<AppState>>) -> ApiResult<HttpResponse> {
    let summary = service(&app_state).dashboard_summary(Utc::now().date_naive()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(summary)))
}

pub async fn get_inventory(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<InventoryQuery>,
) -> ApiResult<HttpResponse> {
    let page = service(&app_state).list(&query).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(page)))
}

pub async fn get_inventory_count(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<InventoryQuery>,
) -> ApiResult<HttpResponse> {
    let total = service(&app_state).count(&query).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({ "total": total }))))
}

pub async fn export_inventory(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<InventoryQuery>,
) -> ApiResult<HttpResponse> {
    let csv_data = service(&app_state).export_csv(&query).await?;
    let filename = format!("inventory_{}.csv", Utc::now().format("%Y%m%d"));

    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header(("Content-Disposition", format!("attachment; filename=\"{}\"", filename)))
        .body(csv_data))
}

pub async fn get_unit(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let unit = service(&app_state).get_unit(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(unit)))
}

pub async fn create_unit(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<CreateUnitRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let unit = service(&app_state).create_unit(&request, Utc::now()).await?;

    audit(
        &app_state.db_pool,
        &Actor::from_request(&http_request),
        "create",
        "inventory_unit",
        &unit.unit_id,
        &format!("Registered {} unit, expires {}", unit.blood_type, unit.expiry_date),
    ).await;

    Ok(HttpResponse::Created().json(ApiResponse::success(unit)))
}

pub async fn update_unit_status(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    update: web::Json<UpdateUnitStatusRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let unit_id = path.into_inner();
    let unit = service(&app_state)
        .update_unit_status(&unit_id, update.status, Utc::now())
        .await?;

    audit(
        &app_state.db_pool,
        &Actor::from_request(&http_request),
        "status_change",
        "inventory_unit",
        &unit_id,
        &format!("status -> {}", unit.status),
    ).await;

    Ok(HttpResponse::Ok().json(ApiResponse::success(unit)))
}

pub async fn run_inventory_sync(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let report = InventorySync::new(&app_state.db_pool, &app_state.config.inventory)
        .run()
        .await
        .map_err(|e| match e {
            SyncError::InventoryTableMissing => {
                ApiError::InternalServerError(SyncError::InventoryTableMissing.to_string())
            }
            SyncError::Database(err) => ApiError::DatabaseError(err),
        })?;

    audit(
        &app_state.db_pool,
        &Actor::from_request(&http_request),
        "sync",
        "inventory",
        "blood_inventory",
        &format!(
            "scanned {}, inserted {}, skipped {}, failed {}",
            report.scanned, report.inserted, report.skipped_existing, report.failed.len()
        ),
    ).await;

    let message = format!("Inserted {} inventory units", report.inserted);
    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(report, message)))
}

pub async fn expire_units(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let expired = service(&app_state).expire_stale_units(Utc::now().date_naive()).await?;

    if expired > 0 {
        audit(
            &app_state.db_pool,
            &Actor::from_request(&http_request),
            "expire",
            "inventory",
            "blood_inventory",
            &format!("Marked {} units as expired", expired),
        ).await;
    }

    Ok(HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({ "expired": expired }))))
}
