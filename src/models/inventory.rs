// src/models/inventory.rs
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use validator::Validate;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use super::donor::BloodType;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
    EnumString, Display, AsRefStr, EnumIter, sqlx::Type,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum UnitStatus {
    Available,
    Used,
    Expired,
    Quarantined,
}

impl UnitStatus {
    /// `used` and `expired` are final.
    pub fn can_transition_to(&self, next: UnitStatus) -> bool {
        use UnitStatus::*;
        matches!(
            (self, next),
            (Available, Used) | (Available, Expired) | (Available, Quarantined)
                | (Quarantined, Available) | (Quarantined, Expired) | (Quarantined, Used)
        )
    }
}

pub fn expiry_for(collection_date: NaiveDate, shelf_life_days: i64) -> NaiveDate {
    collection_date + Duration::days(shelf_life_days)
}

// ==================== INVENTORY UNIT ====================

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct InventoryUnit {
    /// None for units projected from donor records
    pub id: Option<i64>,
    pub unit_id: String,
    pub donor_id: Option<i64>,
    pub donor_name: Option<String>,
    pub blood_type: BloodType,
    pub collection_date: NaiveDate,
    pub expiry_date: NaiveDate,
    pub status: UnitStatus,
    pub collection_site: Option<String>,
    pub storage_location: Option<String>,
    pub reference: Option<String>,
    pub used_date: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    #[sqlx(default)]
    pub is_virtual: bool,
}

/// Row of the `virtual_inventory` view. The blood type stays raw: legacy
/// rows may hold values outside the canonical set.
#[derive(Debug, sqlx::FromRow, Clone)]
pub struct VirtualUnitRow {
    pub donor_id: i64,
    pub donor_name: Option<String>,
    pub blood_type: String,
    pub collection_date: NaiveDate,
    pub source_table: String,
}

impl InventoryUnit {
    pub fn from_virtual(row: VirtualUnitRow, shelf_life_days: i64) -> Self {
        Self {
            id: None,
            unit_id: format!("VIRTUAL-{}", row.donor_id),
            donor_id: Some(row.donor_id),
            donor_name: row.donor_name,
            blood_type: BloodType::from_str(row.blood_type.trim()).unwrap_or(BloodType::Unknown),
            collection_date: row.collection_date,
            expiry_date: expiry_for(row.collection_date, shelf_life_days),
            status: UnitStatus::Available,
            collection_site: None,
            storage_location: None,
            reference: Some(format!("{}#{}", row.source_table, row.donor_id)),
            used_date: None,
            created_at: None,
            updated_at: None,
            is_virtual: true,
        }
    }
}

#[derive(Debug, Deserialize, Validate, Clone)]
pub struct CreateUnitRequest {
    #[validate(range(min = 1, message = "Donor ID must be positive"))]
    pub donor_id: Option<i64>,
    pub blood_type: BloodType,
    pub collection_date: NaiveDate,
    #[validate(length(min = 1, max = 255, message = "Collection site must be between 1 and 255 characters"))]
    pub collection_site: Option<String>,
    #[validate(length(min = 1, max = 255, message = "Storage location must be between 1 and 255 characters"))]
    pub storage_location: Option<String>,
    #[validate(length(max = 255, message = "Reference cannot exceed 255 characters"))]
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUnitStatusRequest {
    pub status: UnitStatus,
}

/// Raw filters from the query string; empty strings mean "any".
#[derive(Debug, Deserialize, Default, Clone)]
pub struct InventoryQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub blood_type: Option<String>,
    pub status: Option<String>,
    pub search: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_expiry_is_forty_two_days_later() {
        let collected = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        assert_eq!(expiry_for(collected, 42), NaiveDate::from_ymd_opt(2024, 2, 21).unwrap());
        // Leap year February
        let collected = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        assert_eq!(expiry_for(collected, 42), NaiveDate::from_ymd_opt(2024, 3, 14).unwrap());
    }

    #[test]
    fn test_unit_status_transitions() {
        assert!(UnitStatus::Available.can_transition_to(UnitStatus::Used));
        assert!(UnitStatus::Quarantined.can_transition_to(UnitStatus::Available));
        assert!(!UnitStatus::Expired.can_transition_to(UnitStatus::Available));
        assert!(!UnitStatus::Used.can_transition_to(UnitStatus::Available));
        assert!(!UnitStatus::Available.can_transition_to(UnitStatus::Available));
    }

    #[test]
    fn test_unit_status_parse() {
        assert_eq!(UnitStatus::from_str("quarantined").unwrap(), UnitStatus::Quarantined);
        assert!(UnitStatus::from_str("lost").is_err());
    }

    #[test]
    fn test_virtual_unit_projection() {
        let row = VirtualUnitRow {
            donor_id: 42,
            donor_name: Some("Juan".to_string()),
            blood_type: "A-".to_string(),
            collection_date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            source_table: "donors_new".to_string(),
        };
        let unit = InventoryUnit::from_virtual(row, 42);
        assert_eq!(unit.unit_id, "VIRTUAL-42");
        assert_eq!(unit.status, UnitStatus::Available);
        assert_eq!(unit.expiry_date, NaiveDate::from_ymd_opt(2024, 2, 21).unwrap());
        assert!(unit.is_virtual);
        assert_eq!(unit.reference.as_deref(), Some("donors_new#42"));
        assert_eq!(unit.blood_type, BloodType::ANegative);
    }

    #[test]
    fn test_virtual_unit_with_unrecognized_blood_type() {
        let row = VirtualUnitRow {
            donor_id: 7,
            donor_name: None,
            blood_type: "o+".to_string(),
            collection_date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            source_table: "donors".to_string(),
        };
        let unit = InventoryUnit::from_virtual(row, 42);
        assert_eq!(unit.blood_type, BloodType::Unknown);
        assert_eq!(unit.unit_id, "VIRTUAL-7");
    }
}
