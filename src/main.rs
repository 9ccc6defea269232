// src/main.rs
use actix_web::{
    http::header,
    middleware::{DefaultHeaders, Logger},
    web, App, HttpServer,
};
use actix_cors::Cors;
use std::sync::Arc;
use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use bloodbank::config::{load_config, Config};
use bloodbank::error::ApiError;
use bloodbank::{configure_routes, db, monitoring, AppState};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;

    setup_logging(&config)?;

    if config.is_production() {
        validate_production_config(&config)?;
    }

    config.print_startup_info();

    let pool = db::create_database_pool(&config.database, true)
        .await
        .context("Failed to open database")?;

    db::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    let app_state = Arc::new(AppState {
        db_pool: pool.clone(),
        config: config.clone(),
    });

    monitoring::start_maintenance_tasks(pool.clone(), config.inventory.clone()).await;

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    log::info!("Starting server at http://{}", bind_address);

    let server_config = config.clone();
    let mut server = HttpServer::new(move || {
        let json_config = web::JsonConfig::default()
            .limit(server_config.security.max_request_size)
            .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into());
        let query_config = web::QueryConfig::default()
            .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into());

        App::new()
            .wrap(setup_cors(&server_config.security.allowed_origins, server_config.is_production()))
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY")),
            )
            .wrap(Logger::default())
            .app_data(web::Data::new(app_state.clone()))
            .app_data(json_config)
            .app_data(query_config)
            .configure(configure_routes)
    })
    .keep_alive(std::time::Duration::from_secs(config.server.keep_alive));

    if let Some(workers) = config.server.workers {
        server = server.workers(workers);
    }

    server
        .bind(&bind_address)
        .with_context(|| format!("Failed to bind {}", bind_address))?
        .run()
        .await?;

    Ok(())
}

fn setup_logging(config: &Config) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.as_str()));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("Failed to install log subscriber")?;

    Ok(())
}

fn validate_production_config(config: &Config) -> anyhow::Result<()> {
    if config.security.allowed_origins.iter().any(|o| o == "*") {
        anyhow::bail!("Wildcard CORS origins not allowed in production!");
    }

    if config.database.url.contains(":memory:") {
        anyhow::bail!("In-memory database not allowed in production!");
    }

    Ok(())
}

fn setup_cors(allowed_origins: &[String], is_production: bool) -> Cors {
    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allowed_headers(vec![
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::HeaderName::from_static("x-admin-user"),
        ])
        .expose_headers(vec![header::CONTENT_DISPOSITION])
        .max_age(3600);

    if allowed_origins.iter().any(|o| o == "*") && !is_production {
        log::warn!("Using wildcard CORS (*) in development mode");
        return cors.allow_any_origin();
    }

    for origin in allowed_origins {
        cors = cors.allowed_origin(origin);
    }

    cors
}
