// src/models/donor.rs
use serde::{Deserialize, Serialize};
use validator::Validate;
use chrono::{DateTime, Utc};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref PHONE_REGEX: Regex = Regex::new(r"^\+?[0-9 ()-]{7,20}$").unwrap();
}

// ==================== ENUMS ====================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
    EnumString, Display, AsRefStr, EnumIter, sqlx::Type,
)]
pub enum BloodType {
    #[serde(rename = "A+")]
    #[strum(serialize = "A+")]
    #[sqlx(rename = "A+")]
    APositive,
    #[serde(rename = "A-")]
    #[strum(serialize = "A-")]
    #[sqlx(rename = "A-")]
    ANegative,
    #[serde(rename = "B+")]
    #[strum(serialize = "B+")]
    #[sqlx(rename = "B+")]
    BPositive,
    #[serde(rename = "B-")]
    #[strum(serialize = "B-")]
    #[sqlx(rename = "B-")]
    BNegative,
    #[serde(rename = "AB+")]
    #[strum(serialize = "AB+")]
    #[sqlx(rename = "AB+")]
    AbPositive,
    #[serde(rename = "AB-")]
    #[strum(serialize = "AB-")]
    #[sqlx(rename = "AB-")]
    AbNegative,
    #[serde(rename = "O+")]
    #[strum(serialize = "O+")]
    #[sqlx(rename = "O+")]
    OPositive,
    #[serde(rename = "O-")]
    #[strum(serialize = "O-")]
    #[sqlx(rename = "O-")]
    ONegative,
    #[serde(rename = "Unknown")]
    #[strum(serialize = "Unknown")]
    #[sqlx(rename = "Unknown")]
    Unknown,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
    EnumString, Display, AsRefStr, EnumIter, sqlx::Type,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum DonorStatus {
    Pending,
    Approved,
    Served,
    Unserved,
    Rejected,
    Suspended,
    Completed,
}

impl DonorStatus {
    /// Donation physically collected; such donors should own an inventory unit.
    pub fn is_collected(&self) -> bool {
        matches!(self, DonorStatus::Served | DonorStatus::Completed)
    }
}

// ==================== DONOR ====================

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Donor {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub blood_type: BloodType,
    pub status: DonorStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, Clone)]
pub struct CreateDonorRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: String,
    #[validate(email(message = "Email address is not valid"))]
    pub email: Option<String>,
    #[validate(regex(path = *PHONE_REGEX, message = "Phone number is not valid"))]
    pub phone: Option<String>,
    pub blood_type: Option<BloodType>,
    pub status: Option<DonorStatus>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDonorStatusRequest {
    pub status: DonorStatus,
}

/// Query string for the donor list. Values stay strings so a bad value is
/// reported as a validation error instead of a generic deserialize failure.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct DonorQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub status: Option<String>,
    pub blood_type: Option<String>,
    pub search: Option<String>,
}

/// Outcome of a donor delete; cleanup failures are reported, not hidden.
#[derive(Debug, Serialize)]
pub struct DonorDeletion {
    pub donor_id: i64,
    pub related_rows_deleted: u64,
    pub warnings: Vec<String>,
}
