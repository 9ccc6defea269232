// src/lib.rs
//! Blood bank service: donors, blood unit inventory and hospital requests.

pub mod audit;
pub mod config;
pub mod db;
pub mod donor_handlers;
pub mod error;
pub mod handlers;
pub mod inventory;
pub mod inventory_handlers;
pub mod models;
pub mod monitoring;
pub mod pagination;
pub mod query_builders;
pub mod request_handlers;

#[cfg(test)]
pub mod test_support;

use actix_web::web;
use sqlx::SqlitePool;
use config::Config;

pub struct AppState {
    pub db_pool: SqlitePool,
    pub config: Config,
}

/// Registers every endpoint. Fixed inventory paths come before `/{unit_id}`.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/health")
            .route("", web::get().to(monitoring::health_check))
            .route("/ready", web::get().to(monitoring::readiness_check)),
    )
    .service(
        web::scope("/api")
            .service(
                web::scope("/inventory")
                    .route("", web::get().to(inventory_handlers::get_inventory))
                    .route("", web::post().to(inventory_handlers::create_unit))
                    .route("/count", web::get().to(inventory_handlers::get_inventory_count))
                    .route("/summary", web::get().to(inventory_handlers::get_dashboard_summary))
                    .route("/export", web::get().to(inventory_handlers::export_inventory))
                    .route("/sync", web::post().to(inventory_handlers::run_inventory_sync))
                    .route("/expire", web::post().to(inventory_handlers::expire_units))
                    .route("/{unit_id}", web::get().to(inventory_handlers::get_unit))
                    .route("/{unit_id}/status", web::put().to(inventory_handlers::update_unit_status)),
            )
            .service(
                web::scope("/donors")
                    .route("", web::get().to(donor_handlers::get_donors))
                    .route("", web::post().to(donor_handlers::create_donor))
                    .route("/{id}", web::get().to(donor_handlers::get_donor))
                    .route("/{id}", web::delete().to(donor_handlers::delete_donor))
                    .route("/{id}/status", web::put().to(donor_handlers::update_donor_status)),
            )
            .service(
                web::scope("/requests")
                    .route("", web::get().to(request_handlers::get_requests))
                    .route("", web::post().to(request_handlers::create_request))
                    .route("/{id}", web::get().to(request_handlers::get_request))
                    .route("/{id}/status", web::put().to(request_handlers::update_request_status)),
            ),
    );
}
