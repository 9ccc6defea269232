// src/request_handlers.rs
//! Blood requests from hospitals

use actix_web::{web, HttpRequest, HttpResponse};
use std::str::FromStr;
use std::sync::Arc;
use chrono::Utc;
use lazy_static::lazy_static;
use sqlx::SqlitePool;
use validator::Validate;
use crate::audit::{audit, Actor};
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::models::{
    BloodRequest, BloodType, CreateBloodRequest, RequestQuery, RequestStatus, UpdateRequestStatusRequest, Urgency,
};
use crate::pagination::{normalize, PaginatedResponse};
use crate::query_builders::{fetch_count, fetch_rows, non_blank, FieldWhitelist, SafeQueryBuilder};
use crate::AppState;

lazy_static! {
    static ref REQUEST_FIELDS: FieldWhitelist = FieldWhitelist::for_requests();
}

pub async fn find_requests(pool: &SqlitePool, query: &RequestQuery) -> ApiResult<PaginatedResponse<BloodRequest>> {
    let (page, per_page, _) = normalize(query.page, query.per_page);

    let mut builder = SafeQueryBuilder::new("blood_requests")
        .map_err(ApiError::InternalServerError)?
        .with_whitelist(&REQUEST_FIELDS);

    if let Some(status) = non_blank(&query.status) {
        let status = RequestStatus::from_str(status).map_err(|_| ApiError::invalid_filter("status", status))?;
        builder.add_exact_match("status", status.to_string());
    }
    if let Some(blood_type) = non_blank(&query.blood_type) {
        let blood_type =
            BloodType::from_str(blood_type).map_err(|_| ApiError::invalid_filter("blood_type", blood_type))?;
        builder.add_exact_match("blood_type", blood_type.to_string());
    }
    if let Some(search) = non_blank(&query.search) {
        builder.add_any_like(&["patient_name", "hospital"], search);
    }

    let (count_sql, count_params) = builder.build_count();
    let total = fetch_count(pool, &count_sql, &count_params).await?;

    // Emergencies first, then oldest first within the same urgency
    builder
        .order_by_raw("CASE urgency WHEN 'emergency' THEN 0 WHEN 'urgent' THEN 1 ELSE 2 END")
        .order_by("created_at", "ASC")
        .order_by("id", "ASC")
        .paginate(page, per_page);
    let (sql, params) = builder.build_select("*");
    let requests = fetch_rows::<BloodRequest>(pool, &sql, &params).await?;

    Ok(PaginatedResponse::new(requests, total, page, per_page))
}

pub async fn fetch_request(pool: &SqlitePool, request_id: i64) -> ApiResult<BloodRequest> {
    sqlx::query_as::<_, BloodRequest>("SELECT * FROM blood_requests WHERE id = ?")
        .bind(request_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::request_not_found(request_id))
}

/// Applies a status change if the lifecycle allows it.
pub async fn change_request_status(
    pool: &SqlitePool,
    request_id: i64,
    next: RequestStatus,
) -> ApiResult<(BloodRequest, RequestStatus)> {
    let existing = fetch_request(pool, request_id).await?;
    if !existing.status.can_transition_to(next) {
        return Err(ApiError::invalid_transition("request", existing.status.as_ref(), next.as_ref()));
    }

    sqlx::query("UPDATE blood_requests SET status = ?, updated_at = ? WHERE id = ?")
        .bind(next)
        .bind(Utc::now())
        .bind(request_id)
        .execute(pool)
        .await?;

    let updated = fetch_request(pool, request_id).await?;
    Ok((updated, existing.status))
}

// ==================== HANDLERS ====================

pub async fn get_requests(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<RequestQuery>,
) -> ApiResult<HttpResponse> {
    let page = find_requests(&app_state.db_pool, &query).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(page)))
}

pub async fn get_request(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<i64>,
) -> ApiResult<HttpResponse> {
    let request = fetch_request(&app_state.db_pool, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(request)))
}

pub async fn create_request(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<CreateBloodRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    request.validate()?;
    let pool = &app_state.db_pool;
    let now = Utc::now();
    let urgency = request.urgency.unwrap_or(Urgency::Routine);

    let result = sqlx::query(
        r#"INSERT INTO blood_requests
           (patient_name, hospital, blood_type, units_requested, urgency, status, notes, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, 'pending', ?, ?, ?)"#
    )
        .bind(request.patient_name.trim())
        .bind(request.hospital.trim())
        .bind(request.blood_type)
        .bind(request.units_requested)
        .bind(urgency)
        .bind(&request.notes)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

    let created = fetch_request(pool, result.last_insert_rowid()).await?;

    audit(
        pool,
        &Actor::from_request(&http_request),
        "create",
        "blood_request",
        &created.id.to_string(),
        &format!("{} x {} for {} ({})", created.units_requested, created.blood_type, created.hospital, urgency),
    ).await;

    if urgency == Urgency::Emergency {
        log::warn!("Emergency request {}: {} x {}", created.id, created.units_requested, created.blood_type);
    }

    Ok(HttpResponse::Created().json(ApiResponse::success(created)))
}

pub async fn update_request_status(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<i64>,
    update: web::Json<UpdateRequestStatusRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let request_id = path.into_inner();
    let pool = &app_state.db_pool;
    let (updated, previous) = change_request_status(pool, request_id, update.status).await?;

    audit(
        pool,
        &Actor::from_request(&http_request),
        "status_change",
        "blood_request",
        &request_id.to_string(),
        &format!("{} -> {}", previous, updated.status),
    ).await;

    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};
    use crate::config::Config;
    use crate::test_support::memory_pool;

    async fn insert_request(pool: &SqlitePool, patient: &str, blood_type: &str, urgency: &str, created_at: &str) -> i64 {
        sqlx::query(
            r#"INSERT INTO blood_requests
               (patient_name, hospital, blood_type, units_requested, urgency, status, created_at, updated_at)
               VALUES (?, 'General Hospital', ?, 2, ?, 'pending', ?, ?)"#
        )
            .bind(patient)
            .bind(blood_type)
            .bind(urgency)
            .bind(created_at)
            .bind(created_at)
            .execute(pool)
            .await
            .unwrap()
            .last_insert_rowid()
    }

    #[tokio::test]
    async fn test_emergencies_listed_first() {
        let pool = memory_pool().await;
        insert_request(&pool, "Routine Early", "O+", "routine", "2024-01-01T00:00:00Z").await;
        insert_request(&pool, "Emergency Late", "O-", "emergency", "2024-01-05T00:00:00Z").await;
        insert_request(&pool, "Urgent Mid", "A+", "urgent", "2024-01-03T00:00:00Z").await;

        let page = find_requests(&pool, &RequestQuery::default()).await.unwrap();
        let names: Vec<&str> = page.data.iter().map(|r| r.patient_name.as_str()).collect();
        assert_eq!(names, vec!["Emergency Late", "Urgent Mid", "Routine Early"]);
        assert_eq!(page.total, 3);

        let filtered = find_requests(&pool, &RequestQuery { blood_type: Some("O-".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(filtered.total, 1);
        assert_eq!(filtered.data.len(), 1);
    }

    #[tokio::test]
    async fn test_status_lifecycle() {
        let pool = memory_pool().await;
        let id = insert_request(&pool, "P. Reyes", "B+", "urgent", "2024-01-01T00:00:00Z").await;

        let (approved, previous) = change_request_status(&pool, id, RequestStatus::Approved).await.unwrap();
        assert_eq!(previous, RequestStatus::Pending);
        assert_eq!(approved.status, RequestStatus::Approved);

        change_request_status(&pool, id, RequestStatus::Fulfilled).await.unwrap();
        let err = change_request_status(&pool, id, RequestStatus::Cancelled).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));

        assert!(matches!(
            change_request_status(&pool, 999, RequestStatus::Approved).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[actix_web::test]
    async fn test_create_request_endpoint() {
        let pool = memory_pool().await;
        let state = Arc::new(AppState { db_pool: pool, config: Config::default() });
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/requests", web::post().to(create_request))
                .route("/requests/{id}", web::get().to(get_request)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/requests")
            .set_json(serde_json::json!({
                "patient_name": "Lito Lapid",
                "hospital": "PGH",
                "blood_type": "AB+",
                "units_requested": 3
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::CREATED);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["urgency"], "routine");
        assert_eq!(body["data"]["status"], "pending");

        let req = test::TestRequest::post()
            .uri("/requests")
            .set_json(serde_json::json!({
                "patient_name": "Lito Lapid",
                "hospital": "PGH",
                "blood_type": "AB+",
                "units_requested": 0
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get().uri("/requests/77").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), actix_web::http::StatusCode::NOT_FOUND);
    }
}
