// src/donor_handlers.rs
//! Donor administration over `donors_new`

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
    BloodType, CreateDonorRequest, Donor, DonorDeletion, DonorQuery, DonorStatus, UpdateDonorStatusRequest,
};
use crate::pagination::{normalize, PaginatedResponse};
use crate::query_builders::{fetch_count, fetch_rows, non_blank, FieldWhitelist, SafeQueryBuilder};
use crate::AppState;

lazy_static! {
    static ref DONOR_FIELDS: FieldWhitelist = FieldWhitelist::for_donors();
}

/// Rows owned by a donor, removed before the donor itself.
const DONOR_RELATED_TABLES: [&str; 3] = ["donor_messages", "donor_matching", "donor_screening"];

// ==================== QUERIES ====================

pub async fn find_donors(pool: &SqlitePool, query: &DonorQuery) -> ApiResult<PaginatedResponse<Donor>> {
    let (page, per_page, _) = normalize(query.page, query.per_page);

    let mut builder = SafeQueryBuilder::new("donors_new")
        .map_err(ApiError::InternalServerError)?
        .with_whitelist(&DONOR_FIELDS);

    if let Some(status) = non_blank(&query.status) {
        let status = DonorStatus::from_str(status).map_err(|_| ApiError::invalid_filter("status", status))?;
        builder.add_exact_match("status", status.to_string());
    }
    if let Some(blood_type) = non_blank(&query.blood_type) {
        let blood_type =
            BloodType::from_str(blood_type).map_err(|_| ApiError::invalid_filter("blood_type", blood_type))?;
        builder.add_exact_match("blood_type", blood_type.to_string());
    }
    if let Some(search) = non_blank(&query.search) {
        builder.add_any_like(&["name", "email", "phone"], search);
    }

    let (count_sql, count_params) = builder.build_count();
    let total = fetch_count(pool, &count_sql, &count_params).await?;

    builder.order_by("created_at", "DESC").order_by("id", "DESC").paginate(page, per_page);
    let (sql, params) = builder.build_select("*");
    let donors = fetch_rows::<Donor>(pool, &sql, &params).await?;

    Ok(PaginatedResponse::new(donors, total, page, per_page))
}

pub async fn fetch_donor(pool: &SqlitePool, donor_id: i64) -> ApiResult<Donor> {
    sqlx::query_as::<_, Donor>("SELECT * FROM donors_new WHERE id = ?")
        .bind(donor_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::donor_not_found(donor_id))
}

/// Deletes the donor and, best effort, the rows that belong to it. A failed
/// cleanup becomes a warning; a failed donor delete rolls everything back.
pub async fn remove_donor(pool: &SqlitePool, donor_id: i64) -> ApiResult<DonorDeletion> {
    let mut tx = pool.begin().await?;

    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM donors_new WHERE id = ?")
        .bind(donor_id)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_none() {
        return Err(ApiError::donor_not_found(donor_id));
    }

    let mut related_rows_deleted = 0;
    let mut warnings = Vec::new();

    for table in DONOR_RELATED_TABLES {
        let sql = format!("DELETE FROM {} WHERE donor_id = ?", table);
        match sqlx::query(&sql).bind(donor_id).execute(&mut *tx).await {
            Ok(result) => related_rows_deleted += result.rows_affected(),
            Err(e) => {
                let warning = format!("Could not remove {} rows for donor {}: {}", table, donor_id, e);
                log::warn!("{}", warning);
                warnings.push(warning);
            }
        }
    }

    sqlx::query("DELETE FROM donors_new WHERE id = ?")
        .bind(donor_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(DonorDeletion {
        donor_id,
        related_rows_deleted,
        warnings,
    })
}

// ==================== HANDLERS ====================

pub async fn get_donors(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<DonorQuery>,
) -> ApiResult<HttpResponse> {
    let page = find_donors(&app_state.db_pool, &query).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(page)))
}

pub async fn get_donor(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<i64>,
) -> ApiResult<HttpResponse> {
    let donor = fetch_donor(&app_state.db_pool, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(donor)))
}

pub async fn create_donor(
    app_state: web::Data<Arc<AppState>>,
    donor: web::Json<CreateDonorRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    donor.validate()?;
    let pool = &app_state.db_pool;

    if let Some(ref email) = donor.email {
        let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM donors_new WHERE LOWER(email) = LOWER(?)")
            .bind(email)
            .fetch_optional(pool)
            .await?;
        if existing.is_some() {
            return Err(ApiError::Conflict(format!("A donor with email '{}' already exists", email)));
        }
    }

    let now = Utc::now();
    let blood_type = donor.blood_type.unwrap_or(BloodType::Unknown);
    let status = donor.status.unwrap_or(DonorStatus::Pending);

    let result = sqlx::query(
        r#"INSERT INTO donors_new (name, email, phone, blood_type, status, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#
    )
        .bind(donor.name.trim())
        .bind(&donor.email)
        .bind(&donor.phone)
        .bind(blood_type)
        .bind(status)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

    let created = fetch_donor(pool, result.last_insert_rowid()).await?;

    audit(
        pool,
        &Actor::from_request(&http_request),
        "create",
        "donor",
        &created.id.to_string(),
        &format!("Registered donor {} ({})", created.name, created.blood_type),
    ).await;

    log::info!("Created donor {} ({})", created.id, created.blood_type);
    Ok(HttpResponse::Created().json(ApiResponse::success(created)))
}

pub async fn update_donor_status(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<i64>,
    update: web::Json<UpdateDonorStatusRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let donor_id = path.into_inner();
    let pool = &app_state.db_pool;
    let existing = fetch_donor(pool, donor_id).await?;

    sqlx::query("UPDATE donors_new SET status = ?, updated_at = ? WHERE id = ?")
        .bind(update.status)
        .bind(Utc::now())
        .bind(donor_id)
        .execute(pool)
        .await?;

    audit(
        pool,
        &Actor::from_request(&http_request),
        "status_change",
        "donor",
        &donor_id.to_string(),
        &format!("{} -> {}", existing.status, update.status),
    ).await;

    let updated = fetch_donor(pool, donor_id).await?;

    if update.status.is_collected() && !existing.status.is_collected() {
        return Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
            updated,
            "Donation recorded; the next inventory sync registers the unit".to_string(),
        )));
    }

    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

pub async fn delete_donor(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<i64>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let donor_id = path.into_inner();
    let pool = &app_state.db_pool;
    let deletion = remove_donor(pool, donor_id).await?;

    audit(
        pool,
        &Actor::from_request(&http_request),
        "delete",
        "donor",
        &donor_id.to_string(),
        &format!("Deleted donor with {} related rows", deletion.related_rows_deleted),
    ).await;

    let message = if deletion.warnings.is_empty() {
        "Donor deleted".to_string()
    } else {
        format!("Donor deleted with {} cleanup warning(s)", deletion.warnings.len())
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(deletion, message)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};
    use crate::config::Config;
    use crate::test_support::{count_rows, insert_donor, memory_pool};

    async fn seed(pool: &SqlitePool) {
        insert_donor(pool, "donors_new", "Maria Santos", "O+", "approved", "2024-01-01T00:00:00Z").await;
        insert_donor(pool, "donors_new", "Jose Rizal", "A-", "served", "2024-01-02T00:00:00Z").await;
        insert_donor(pool, "donors_new", "Andres Bonifacio", "O+", "pending", "2024-01-03T00:00:00Z").await;
    }

    #[tokio::test]
    async fn test_find_donors_filters() {
        let pool = memory_pool().await;
        seed(&pool).await;

        let all = find_donors(&pool, &DonorQuery::default()).await.unwrap();
        assert_eq!(all.total, 3);
        assert_eq!(all.data[0].name, "Andres Bonifacio");

        let o_pos = find_donors(&pool, &DonorQuery { blood_type: Some("O+".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(o_pos.total, 2);

        let served = find_donors(&pool, &DonorQuery { status: Some("served".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(served.total, 1);
        assert_eq!(served.data[0].name, "Jose Rizal");

        let search = find_donors(&pool, &DonorQuery { search: Some("santos".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(search.total, 1);

        let bad = find_donors(&pool, &DonorQuery { status: Some("retired".into()), ..Default::default() }).await;
        assert!(matches!(bad, Err(ApiError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_remove_donor_cleans_related_rows() {
        let pool = memory_pool().await;
        let id = insert_donor(&pool, "donors_new", "Ana", "O+", "served", "2024-01-01T00:00:00Z").await;
        sqlx::query("INSERT INTO donor_messages (donor_id, subject, body, created_at) VALUES (?, 'Hi', 'Thanks', datetime('now'))")
            .bind(id)
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO donor_screening (donor_id, hemoglobin, screened_at) VALUES (?, 13.5, datetime('now'))")
            .bind(id)
            .execute(&pool)
            .await
            .unwrap();

        let deletion = remove_donor(&pool, id).await.unwrap();
        assert_eq!(deletion.related_rows_deleted, 2);
        assert!(deletion.warnings.is_empty());
        assert_eq!(count_rows(&pool, "donors_new").await, 0);
        assert_eq!(count_rows(&pool, "donor_messages").await, 0);
    }

    #[tokio::test]
    async fn test_remove_donor_reports_cleanup_failures() {
        let pool = memory_pool().await;
        let id = insert_donor(&pool, "donors_new", "Ana", "O+", "served", "2024-01-01T00:00:00Z").await;
        sqlx::query("DROP TABLE donor_matching").execute(&pool).await.unwrap();

        let deletion = remove_donor(&pool, id).await.unwrap();
        assert_eq!(deletion.warnings.len(), 1);
        assert!(deletion.warnings[0].contains("donor_matching"));
        assert_eq!(count_rows(&pool, "donors_new").await, 0);
    }

    #[tokio::test]
    async fn test_remove_missing_donor() {
        let pool = memory_pool().await;
        assert!(matches!(remove_donor(&pool, 404).await, Err(ApiError::NotFound(_))));
    }

    #[actix_web::test]
    async fn test_donor_endpoints() {
        let pool = memory_pool().await;
        let state = Arc::new(AppState { db_pool: pool.clone(), config: Config::default() });
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/donors", web::get().to(get_donors))
                .route("/donors", web::post().to(create_donor))
                .route("/donors/{id}", web::get().to(get_donor))
                .route("/donors/{id}/status", web::put().to(update_donor_status))
                .route("/donors/{id}", web::delete().to(delete_donor)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/donors")
            .insert_header(("X-Admin-User", "admin"))
            .set_json(serde_json::json!({"name": "Ana Cruz", "email": "ana@example.com", "blood_type": "B-"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::CREATED);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["status"], "pending");
        let id = body["data"]["id"].as_i64().unwrap();

        // Same email again
        let req = test::TestRequest::post()
            .uri("/donors")
            .set_json(serde_json::json!({"name": "Ana C.", "email": "ANA@example.com"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::CONFLICT);

        let req = test::TestRequest::put()
            .uri(&format!("/donors/{}/status", id))
            .set_json(serde_json::json!({"status": "served"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["status"], "served");
        assert!(body["message"].is_string());

        let audits = count_rows(&pool, "audit_logs").await;
        assert_eq!(audits, 2);

        let req = test::TestRequest::get().uri("/donors?status=bogus").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);

        let req = test::TestRequest::delete().uri(&format!("/donors/{}", id)).to_request();
        assert!(test::call_service(&app, req).await.status().is_success());

        let req = test::TestRequest::get().uri(&format!("/donors/{}", id)).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), actix_web::http::StatusCode::NOT_FOUND);
    }
}
