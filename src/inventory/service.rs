// src/inventory/service.rs
//! Dashboard aggregates, the filtered inventory listing and unit administration.
//!
//! Every read first decides its source: the `blood_inventory` table when it
//! holds at least one row, otherwise a virtual projection of served and
//! completed donors (`virtual_inventory` view). Listing and counting build
//! their SQL from one `SafeQueryBuilder`, so a page's `total` and the count
//! endpoint always agree.

use std::str::FromStr;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use lazy_static::lazy_static;
use serde::Serialize;
use sqlx::SqlitePool;
use strum::IntoEnumIterator;
use validator::Validate;
use crate::config::InventoryConfig;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    expiry_for, BloodType, CreateUnitRequest, InventoryQuery, InventoryUnit, UnitStatus, VirtualUnitRow,
};
use crate::pagination;
use crate::query_builders::{fetch_count, fetch_rows, escape_like_value, non_blank, FieldWhitelist, SafeQueryBuilder};
use super::store::{count_units, insert_unit, NewUnit};

lazy_static! {
    static ref INVENTORY_FIELDS: FieldWhitelist = FieldWhitelist::for_inventory();
    static ref VIRTUAL_FIELDS: FieldWhitelist = FieldWhitelist::for_virtual_inventory();
}

const LISTING_VIEW: &str = "inventory_listing";
const VIRTUAL_VIEW: &str = "virtual_inventory";
const VIRTUAL_PREFIX: &str = "VIRTUAL-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InventorySource {
    Inventory,
    VirtualFromDonors,
}

#[derive(Debug, Clone, Serialize)]
pub struct BloodTypeCount {
    pub blood_type: BloodType,
    pub units: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub total_units: i64,
    pub available_units: i64,
    pub used_units: i64,
    pub expired_units: i64,
    pub quarantined_units: i64,
    pub expiring_soon_units: i64,
    pub by_blood_type: Vec<BloodTypeCount>,
    pub source: InventorySource,
}

#[derive(Debug, Serialize)]
pub struct InventoryPage {
    pub data: Vec<InventoryUnit>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
    pub source: InventorySource,
}

/// Parsed listing filters. Empty strings mean "any"; anything else must be a
/// known blood type or unit status.
#[derive(Debug, Default, Clone)]
pub struct InventoryFilters {
    pub blood_type: Option<BloodType>,
    pub status: Option<UnitStatus>,
    pub search: Option<String>,
}

impl InventoryFilters {
    pub fn parse(query: &InventoryQuery) -> ApiResult<Self> {
        let blood_type = non_blank(&query.blood_type)
            .map(|v| BloodType::from_str(v).map_err(|_| ApiError::invalid_filter("blood_type", v)))
            .transpose()?;
        let status = non_blank(&query.status)
            .map(|v| UnitStatus::from_str(v).map_err(|_| ApiError::invalid_filter("status", v)))
            .transpose()?;
        let search = non_blank(&query.search).map(|s| s.to_string());

        Ok(Self { blood_type, status, search })
    }
}

pub struct InventoryService<'a> {
    pool: &'a SqlitePool,
    settings: &'a InventoryConfig,
}

impl<'a> InventoryService<'a> {
    pub fn new(pool: &'a SqlitePool, settings: &'a InventoryConfig) -> Self {
        Self { pool, settings }
    }

    /// Physical inventory as soon as one unit exists.
    pub async fn source(&self) -> Result<InventorySource, sqlx::Error> {
        if count_units(self.pool).await? > 0 {
            Ok(InventorySource::Inventory)
        } else {
            Ok(InventorySource::VirtualFromDonors)
        }
    }

    // ==================== DASHBOARD ====================

    pub async fn dashboard_summary(&self, today: NaiveDate) -> ApiResult<DashboardSummary> {
        let source = self.source().await?;
        let summary = match source {
            InventorySource::Inventory => self.physical_summary(today).await?,
            InventorySource::VirtualFromDonors => {
                log::debug!("Inventory table is empty, summarizing served donors");
                self.virtual_summary(today).await?
            }
        };
        Ok(summary)
    }

    async fn physical_summary(&self, today: NaiveDate) -> Result<DashboardSummary, sqlx::Error> {
        let by_status: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM blood_inventory GROUP BY status"
        )
            .fetch_all(self.pool)
            .await?;

        let mut summary = DashboardSummary {
            total_units: 0,
            available_units: 0,
            used_units: 0,
            expired_units: 0,
            quarantined_units: 0,
            expiring_soon_units: 0,
            by_blood_type: Vec::new(),
            source: InventorySource::Inventory,
        };

        for (status, units) in by_status {
            summary.total_units += units;
            match UnitStatus::from_str(&status) {
                Ok(UnitStatus::Available) => summary.available_units += units,
                Ok(UnitStatus::Used) => summary.used_units += units,
                Ok(UnitStatus::Expired) => summary.expired_units += units,
                Ok(UnitStatus::Quarantined) => summary.quarantined_units += units,
                Err(_) => log::warn!("{} units with unknown status '{}'", units, status),
            }
        }

        summary.expiring_soon_units = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM blood_inventory
               WHERE status = 'available' AND expiry_date >= ? AND expiry_date <= ?"#
        )
            .bind(today)
            .bind(today + Duration::days(self.settings.expiring_soon_days))
            .fetch_one(self.pool)
            .await?;

        let by_type: Vec<(String, i64)> = sqlx::query_as(
            "SELECT blood_type, COUNT(*) FROM blood_inventory WHERE status = 'available' GROUP BY blood_type"
        )
            .fetch_all(self.pool)
            .await?;
        summary.by_blood_type = tally_by_blood_type(by_type);

        Ok(summary)
    }

    /// Every served donor counts as one available unit.
    async fn virtual_summary(&self, today: NaiveDate) -> Result<DashboardSummary, sqlx::Error> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM virtual_inventory")
            .fetch_one(self.pool)
            .await?;

        // expiry = collection + shelf life, so the window shifts back by it
        let shelf_life = Duration::days(self.settings.shelf_life_days);
        let expiring_soon: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM virtual_inventory WHERE collection_date >= ? AND collection_date <= ?"
        )
            .bind(today - shelf_life)
            .bind(today - shelf_life + Duration::days(self.settings.expiring_soon_days))
            .fetch_one(self.pool)
            .await?;

        let by_type: Vec<(String, i64)> = sqlx::query_as(
            "SELECT blood_type, COUNT(*) FROM virtual_inventory GROUP BY blood_type"
        )
            .fetch_all(self.pool)
            .await?;

        Ok(DashboardSummary {
            total_units: total,
            available_units: total,
            used_units: 0,
            expired_units: 0,
            quarantined_units: 0,
            expiring_soon_units: expiring_soon,
            by_blood_type: tally_by_blood_type(by_type),
            source: InventorySource::VirtualFromDonors,
        })
    }

    // ==================== LISTING ====================

    pub async fn list(&self, query: &InventoryQuery) -> ApiResult<InventoryPage> {
        let filters = InventoryFilters::parse(query)?;
        let source = self.source().await?;
        let (page, per_page, _) = pagination::normalize(query.page, query.per_page);

        let mut builder = listing_query(source, &filters)?;
        let (count_sql, count_params) = builder.build_count();
        let total = fetch_count(self.pool, &count_sql, &count_params).await?;

        builder.paginate(page, per_page);
        let data = self.fetch_units(source, &builder).await?;

        Ok(InventoryPage {
            data,
            total,
            page,
            per_page,
            total_pages: pagination::total_pages(total, per_page),
            source,
        })
    }

    pub async fn count(&self, query: &InventoryQuery) -> ApiResult<i64> {
        let filters = InventoryFilters::parse(query)?;
        let source = self.source().await?;
        let builder = listing_query(source, &filters)?;
        let (sql, params) = builder.build_count();
        Ok(fetch_count(self.pool, &sql, &params).await?)
    }

    async fn fetch_units(&self, source: InventorySource, builder: &SafeQueryBuilder<'_>) -> Result<Vec<InventoryUnit>, sqlx::Error> {
        match source {
            InventorySource::Inventory => {
                let (sql, params) = builder.build_select("*");
                fetch_rows::<InventoryUnit>(self.pool, &sql, &params).await
            }
            InventorySource::VirtualFromDonors => {
                let (sql, params) =
                    builder.build_select("donor_id, donor_name, blood_type, collection_date, source_table");
                let rows = fetch_rows::<VirtualUnitRow>(self.pool, &sql, &params).await?;
                Ok(rows
                    .into_iter()
                    .map(|row| InventoryUnit::from_virtual(row, self.settings.shelf_life_days))
                    .collect())
            }
        }
    }

    // ==================== UNITS ====================

    /// Looks up a physical unit, or a projected one by its `VIRTUAL-<id>` name.
    pub async fn get_unit(&self, unit_id: &str) -> ApiResult<InventoryUnit> {
        if let Some(donor_id) = virtual_donor_id(unit_id) {
            let row: Option<VirtualUnitRow> = sqlx::query_as(
                r#"SELECT donor_id, donor_name, blood_type, collection_date, source_table
                   FROM virtual_inventory WHERE donor_id = ? LIMIT 1"#
            )
                .bind(donor_id)
                .fetch_optional(self.pool)
                .await?;
            return row
                .map(|r| InventoryUnit::from_virtual(r, self.settings.shelf_life_days))
                .ok_or_else(|| ApiError::unit_not_found(unit_id));
        }

        sqlx::query_as::<_, InventoryUnit>("SELECT * FROM inventory_listing WHERE unit_id = ?")
            .bind(unit_id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| ApiError::unit_not_found(unit_id))
    }

    /// Registers a collected unit by hand; it enters the stock as available.
    pub async fn create_unit(&self, request: &CreateUnitRequest, now: DateTime<Utc>) -> ApiResult<InventoryUnit> {
        request.validate()?;

        if request.collection_date > now.date_naive() {
            return Err(ApiError::ValidationError(
                "Collection date cannot be in the future".to_string(),
            ));
        }

        if let Some(donor_id) = request.donor_id {
            let known: bool = sqlx::query_scalar(
                r#"SELECT EXISTS(SELECT 1 FROM donors_new WHERE id = ?1)
                       OR EXISTS(SELECT 1 FROM donors WHERE id = ?1)"#
            )
                .bind(donor_id)
                .fetch_one(self.pool)
                .await?;
            if !known {
                return Err(ApiError::donor_not_found(donor_id));
            }
        }

        let unit = NewUnit {
            donor_id: request.donor_id,
            blood_type: request.blood_type,
            collection_date: request.collection_date,
            expiry_date: expiry_for(request.collection_date, self.settings.shelf_life_days),
            status: UnitStatus::Available,
            collection_site: Some(
                request.collection_site.clone().unwrap_or_else(|| self.settings.collection_site.clone()),
            ),
            storage_location: Some(
                request.storage_location.clone().unwrap_or_else(|| self.settings.storage_location.clone()),
            ),
            reference: request.reference.clone(),
            used_date: None,
            created_at: now,
        };

        let unit_id = insert_unit(self.pool, &unit, &self.settings.unit_prefix, true).await?;
        log::info!("Registered unit {} ({})", unit_id, unit.blood_type);

        self.get_unit(&unit_id).await
    }

    pub async fn update_unit_status(
        &self,
        unit_id: &str,
        next: UnitStatus,
        now: DateTime<Utc>,
    ) -> ApiResult<InventoryUnit> {
        if virtual_donor_id(unit_id).is_some() {
            return Err(ApiError::BadRequest(
                "Projected units cannot be modified; run the inventory sync first".to_string(),
            ));
        }

        let unit = self.get_unit(unit_id).await?;
        if !unit.status.can_transition_to(next) {
            return Err(ApiError::invalid_transition("unit", unit.status.as_ref(), next.as_ref()));
        }

        let used_date = (next == UnitStatus::Used).then_some(now);
        sqlx::query(
            r#"UPDATE blood_inventory
               SET status = ?, used_date = COALESCE(?, used_date), updated_at = ?
               WHERE unit_id = ?"#
        )
            .bind(next)
            .bind(used_date)
            .bind(now)
            .bind(unit_id)
            .execute(self.pool)
            .await?;

        log::info!("Unit {} status: {} -> {}", unit_id, unit.status, next);
        self.get_unit(unit_id).await
    }

    /// Marks available units past their expiry date as expired.
    pub async fn expire_stale_units(&self, today: NaiveDate) -> ApiResult<u64> {
        let result = sqlx::query(
            r#"UPDATE blood_inventory
               SET status = 'expired', updated_at = ?
               WHERE status = 'available' AND expiry_date < ?"#
        )
            .bind(Utc::now())
            .bind(today)
            .execute(self.pool)
            .await?;

        let expired = result.rows_affected();
        if expired > 0 {
            log::info!("Marked {} units as expired", expired);
        }
        Ok(expired)
    }

    /// CSV of every unit matching the filters, unpaged.
    pub async fn export_csv(&self, query: &InventoryQuery) -> ApiResult<Vec<u8>> {
        let filters = InventoryFilters::parse(query)?;
        let source = self.source().await?;
        let builder = listing_query(source, &filters)?;
        let units = self.fetch_units(source, &builder).await?;

        let mut csv_data = Vec::new();
        {
            let mut writer = csv::Writer::from_writer(&mut csv_data);
            writer.write_record([
                "Unit ID", "Donor ID", "Donor Name", "Blood Type", "Collection Date",
                "Expiry Date", "Status", "Collection Site", "Storage Location", "Reference", "Used Date",
            ]).map_err(|e| ApiError::InternalServerError(e.to_string()))?;

            for unit in units {
                writer.write_record([
                    unit.unit_id,
                    unit.donor_id.map(|id| id.to_string()).unwrap_or_default(),
                    unit.donor_name.unwrap_or_default(),
                    unit.blood_type.to_string(),
                    unit.collection_date.to_string(),
                    unit.expiry_date.to_string(),
                    unit.status.to_string(),
                    unit.collection_site.unwrap_or_default(),
                    unit.storage_location.unwrap_or_default(),
                    unit.reference.unwrap_or_default(),
                    unit.used_date.map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string()).unwrap_or_default(),
                ]).map_err(|e| ApiError::InternalServerError(e.to_string()))?;
            }

            writer.flush().map_err(|e| ApiError::InternalServerError(e.to_string()))?;
        }

        Ok(csv_data)
    }
}

/// Shared WHERE/ORDER for the listing, count and export of either source.
fn listing_query(source: InventorySource, filters: &InventoryFilters) -> ApiResult<SafeQueryBuilder<'static>> {
    match source {
        InventorySource::Inventory => {
            let mut builder = SafeQueryBuilder::new(LISTING_VIEW)
                .map_err(ApiError::InternalServerError)?
                .with_whitelist(&INVENTORY_FIELDS);

            if let Some(blood_type) = filters.blood_type {
                builder.add_exact_match("blood_type", blood_type.to_string());
            }
            if let Some(status) = filters.status {
                builder.add_exact_match("status", status.to_string());
            }
            if let Some(ref search) = filters.search {
                builder.add_any_like(&["unit_id", "donor_name", "reference"], search.as_str());
            }

            builder.order_by("collection_date", "DESC").order_by("id", "DESC");
            Ok(builder)
        }
        InventorySource::VirtualFromDonors => {
            let mut builder = SafeQueryBuilder::new(VIRTUAL_VIEW)
                .map_err(ApiError::InternalServerError)?
                .with_whitelist(&VIRTUAL_FIELDS);

            // Projected units are always available
            if matches!(filters.status, Some(status) if status != UnitStatus::Available) {
                builder.add_match_none();
            }
            if let Some(blood_type) = filters.blood_type {
                builder.add_exact_match("blood_type", blood_type.to_string());
            }
            if let Some(ref search) = filters.search {
                let like = format!("%{}%", escape_like_value(search));
                builder.add_raw_condition(
                    "(donor_name LIKE ? ESCAPE '\\' OR ('VIRTUAL-' || donor_id) LIKE ? ESCAPE '\\')",
                    vec![like.clone(), like],
                );
            }

            builder.order_by("collection_date", "DESC").order_by("donor_id", "DESC");
            Ok(builder)
        }
    }
}

fn virtual_donor_id(unit_id: &str) -> Option<i64> {
    unit_id
        .strip_prefix(VIRTUAL_PREFIX)
        .and_then(|id| id.parse::<i64>().ok())
}

/// One entry per blood type, zero-filled, in a stable order.
fn tally_by_blood_type(rows: Vec<(String, i64)>) -> Vec<BloodTypeCount> {
    let mut counts: Vec<BloodTypeCount> = BloodType::iter()
        .map(|blood_type| BloodTypeCount { blood_type, units: 0 })
        .collect();

    for (raw, units) in rows {
        let blood_type = BloodType::from_str(raw.trim()).unwrap_or_else(|_| {
            log::warn!("{} units with unrecognized blood type '{}', counted as Unknown", units, raw);
            BloodType::Unknown
        });
        if let Some(entry) = counts.iter_mut().find(|c| c.blood_type == blood_type) {
            entry.units += units;
        }
    }

    counts
}
