// src/query_builders/mod.rs
//! Query builders for safe, parameterized SQL

pub mod select;
pub mod utils;
pub mod whitelist;

pub use select::SafeQueryBuilder;
pub use utils::{escape_like_value, non_blank};
pub use whitelist::FieldWhitelist;

use sqlx::sqlite::SqliteRow;
use sqlx::SqlitePool;

/// Runs a built SELECT, binding every parameter as text.
pub async fn fetch_rows<T>(pool: &SqlitePool, sql: &str, params: &[String]) -> Result<Vec<T>, sqlx::Error>
where
    T: for<'r> sqlx::FromRow<'r, SqliteRow> + Send + Unpin,
{
    let mut query = sqlx::query_as::<_, T>(sql);
    for param in params {
        query = query.bind(param);
    }
    query.fetch_all(pool).await
}

/// Runs a built COUNT.
pub async fn fetch_count(pool: &SqlitePool, sql: &str, params: &[String]) -> Result<i64, sqlx::Error> {
    let mut query = sqlx::query_scalar::<_, i64>(sql);
    for param in params {
        query = query.bind(param);
    }
    query.fetch_one(pool).await
}
