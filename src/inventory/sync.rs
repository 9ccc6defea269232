// src/inventory/sync.rs
//! Materializes one inventory unit for every served or completed donor.
//!
//! The job is one-shot and sequential. It reads `donors_new` first and the
//! legacy `donors` table second, skips donors that already own a unit and
//! inserts the rest as `used` units. Running it twice inserts nothing the
//! second time.

use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use crate::config::InventoryConfig;
use crate::db::{column_exists, table_exists, DONORS_TABLE, INVENTORY_TABLE, LEGACY_DONORS_TABLE};
use crate::models::{expiry_for, BloodType, UnitStatus};
use super::store::{donor_has_unit, insert_unit, NewUnit};

#[derive(Debug)]
pub enum SyncError {
    InventoryTableMissing,
    Database(sqlx::Error),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SyncError::InventoryTableMissing => {
                write!(f, "Table '{}' does not exist; run the server migrations first", INVENTORY_TABLE)
            }
            SyncError::Database(err) => write!(f, "Database error during inventory sync: {}", err),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Database(err) => Some(err),
            SyncError::InventoryTableMissing => None,
        }
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::Database(err)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncFailure {
    pub donor_id: i64,
    pub source_table: String,
    pub message: String,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct SyncReport {
    pub scanned: usize,
    pub inserted: usize,
    pub skipped_existing: usize,
    pub failed: Vec<SyncFailure>,
    pub warnings: Vec<String>,
}

impl SyncReport {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    fn warn(&mut self, message: String) {
        log::warn!("{}", message);
        self.warnings.push(message);
    }
}

/// Donor row as read by the job. Values stay raw so one bad legacy row
/// does not fail the whole query.
#[derive(Debug, sqlx::FromRow)]
struct SyncCandidate {
    id: i64,
    blood_type: String,
    /// `date(created_at)`, NULL when SQLite cannot parse it
    collection_date: Option<NaiveDate>,
    created_at: Option<String>,
}

pub struct InventorySync<'a> {
    pool: &'a SqlitePool,
    settings: &'a InventoryConfig,
}

impl<'a> InventorySync<'a> {
    pub fn new(pool: &'a SqlitePool, settings: &'a InventoryConfig) -> Self {
        Self { pool, settings }
    }

    pub async fn run(&self) -> Result<SyncReport, SyncError> {
        self.run_at(Utc::now()).await
    }

    /// Runs the sync with `now` as the `used_date` and row timestamps.
    #[tracing::instrument(name = "inventory_sync", skip(self))]
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<SyncReport, SyncError> {
        if !table_exists(self.pool, INVENTORY_TABLE).await? {
            return Err(SyncError::InventoryTableMissing);
        }

        let mut report = SyncReport::default();
        let with_used_date = self.ensure_used_date_column(&mut report).await;

        let sources: [(&str, &[&str]); 2] = [
            (DONORS_TABLE, &["served", "completed"]),
            (LEGACY_DONORS_TABLE, &["served"]),
        ];

        for (table, statuses) in sources {
            let candidates = match self.load_candidates(table, statuses, &mut report).await? {
                Some(candidates) => candidates,
                None => continue,
            };
            log::info!("Found {} collected donors in {}", candidates.len(), table);

            for candidate in candidates {
                report.scanned += 1;
                self.sync_donor(table, candidate, now, with_used_date, &mut report).await?;
            }
        }

        log::info!(
            "Inventory sync finished: scanned={}, inserted={}, skipped={}, failed={}",
            report.scanned,
            report.inserted,
            report.skipped_existing,
            report.failed.len()
        );

        Ok(report)
    }

    /// Adds `used_date` on databases created before the column existed.
    /// Returns whether inserts may write it.
    async fn ensure_used_date_column(&self, report: &mut SyncReport) -> bool {
        match column_exists(self.pool, INVENTORY_TABLE, "used_date").await {
            Ok(true) => return true,
            Ok(false) => {}
            Err(e) => {
                report.warn(format!("Could not inspect {} columns: {}", INVENTORY_TABLE, e));
                return false;
            }
        }

        log::info!("Adding missing column {}.used_date", INVENTORY_TABLE);
        match sqlx::query("ALTER TABLE blood_inventory ADD COLUMN used_date DATETIME")
            .execute(self.pool)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                report.warn(format!("Could not add {}.used_date: {}", INVENTORY_TABLE, e));
                false
            }
        }
    }

    /// `None` when the source table is absent.
    async fn load_candidates(
        &self,
        table: &str,
        statuses: &[&str],
        report: &mut SyncReport,
    ) -> Result<Option<Vec<SyncCandidate>>, SyncError> {
        if !table_exists(self.pool, table).await? {
            report.warn(format!("Donor table '{}' not found, skipping", table));
            return Ok(None);
        }

        let placeholders: Vec<&str> = statuses.iter().map(|_| "?").collect();
        let sql = format!(
            "SELECT id, COALESCE(blood_type, '') AS blood_type, date(created_at) AS collection_date, \
             CAST(created_at AS TEXT) AS created_at \
             FROM {} WHERE status IN ({}) ORDER BY id",
            table,
            placeholders.join(", ")
        );

        let mut query = sqlx::query_as::<_, SyncCandidate>(&sql);
        for status in statuses {
            query = query.bind(*status);
        }

        Ok(Some(query.fetch_all(self.pool).await?))
    }

    async fn sync_donor(
        &self,
        table: &str,
        candidate: SyncCandidate,
        now: DateTime<Utc>,
        with_used_date: bool,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        // A lookup failure means the inventory table itself is unusable
        if donor_has_unit(self.pool, candidate.id).await? {
            log::debug!("Donor {} from {} already has a unit", candidate.id, table);
            report.skipped_existing += 1;
            return Ok(());
        }

        let collection_date = match candidate.collection_date {
            Some(date) => date,
            None => {
                let raw = candidate.created_at.as_deref().unwrap_or("NULL");
                log::error!("Donor {} ({}) has unparseable created_at '{}'", candidate.id, table, raw);
                report.failed.push(SyncFailure {
                    donor_id: candidate.id,
                    source_table: table.to_string(),
                    message: format!("unparseable created_at '{}'", raw),
                });
                return Ok(());
            }
        };

        let blood_type = BloodType::from_str(candidate.blood_type.trim()).unwrap_or_else(|_| {
            report.warn(format!(
                "Donor {} in {} has unrecognized blood type '{}', stored as Unknown",
                candidate.id, table, candidate.blood_type
            ));
            BloodType::Unknown
        });

        let unit = NewUnit {
            donor_id: Some(candidate.id),
            blood_type,
            collection_date,
            expiry_date: expiry_for(collection_date, self.settings.shelf_life_days),
            status: UnitStatus::Used,
            collection_site: Some(self.settings.collection_site.clone()),
            storage_location: Some(self.settings.storage_location.clone()),
            reference: Some(format!("{}#{}", table, candidate.id)),
            used_date: Some(now),
            created_at: now,
        };

        match insert_unit(self.pool, &unit, &self.settings.unit_prefix, with_used_date).await {
            Ok(unit_id) => {
                log::info!("Created unit {} for donor {} ({})", unit_id, candidate.id, table);
                report.inserted += 1;
            }
            Err(e) => {
                log::error!("Failed to create unit for donor {} ({}): {}", candidate.id, table, e);
                report.failed.push(SyncFailure {
                    donor_id: candidate.id,
                    source_table: table.to_string(),
                    message: e.to_string(),
                });
            }
        }

        Ok(())
    }
}
