// src/audit.rs
//! Audit trail for admin actions and sync runs

use sqlx::SqlitePool;
use uuid::Uuid;
use chrono::Utc;
use actix_web::HttpRequest;
use serde::Serialize;

/// Who triggered an action. Authentication lives outside this service, so
/// the admin name comes from the `X-Admin-User` header set by the gateway.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Actor {
    pub name: Option<String>,
    pub ip_address: Option<String>,
}

impl Actor {
    pub fn system() -> Self {
        Self {
            name: Some("system".to_string()),
            ip_address: None,
        }
    }

    pub fn from_request(req: &HttpRequest) -> Self {
        let name = req
            .headers()
            .get("X-Admin-User")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let ip_address = req
            .connection_info()
            .realip_remote_addr()
            .map(|s| s.to_string());

        Self { name, ip_address }
    }
}

pub async fn log_activity(
    pool: &SqlitePool,
    actor: &Actor,
    action: &str,
    entity_type: &str,
    entity_id: Option<&str>,
    description: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO audit_logs
           (id, actor, action, entity_type, entity_id, description, ip_address, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&actor.name)
    .bind(action)
    .bind(entity_type)
    .bind(entity_id)
    .bind(description)
    .bind(&actor.ip_address)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

/// Fire-and-log variant; a failed audit write never fails the action.
pub async fn audit(
    pool: &SqlitePool,
    actor: &Actor,
    action: &str,
    entity_type: &str,
    entity_id: &str,
    description: &str,
) {
    if let Err(e) = log_activity(pool, actor, action, entity_type, Some(entity_id), description).await {
        log::error!("Failed to write audit log: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_pool;

    #[tokio::test]
    async fn test_audit_writes_row() {
        let pool = memory_pool().await;
        let actor = Actor { name: Some("nurse.joy".to_string()), ip_address: None };
        audit(&pool, &actor, "status_change", "donor", "42", "approved -> served").await;

        let row: (Option<String>, String, Option<String>) = sqlx::query_as(
            "SELECT actor, action, entity_id FROM audit_logs"
        )
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.0.as_deref(), Some("nurse.joy"));
        assert_eq!(row.1, "status_change");
        assert_eq!(row.2.as_deref(), Some("42"));
    }

    #[actix_web::test]
    async fn test_actor_from_request() {
        let req = actix_web::test::TestRequest::default()
            .insert_header(("X-Admin-User", " admin "))
            .to_http_request();
        let actor = Actor::from_request(&req);
        assert_eq!(actor.name.as_deref(), Some("admin"));
    }
}
