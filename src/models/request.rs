// src/models/request.rs
use serde::{Deserialize, Serialize};
use validator::Validate;
use chrono::{DateTime, Utc};
use strum::{AsRefStr, Display, EnumString};
use super::donor::BloodType;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
    EnumString, Display, AsRefStr, sqlx::Type,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Fulfilled,
    Rejected,
    Cancelled,
}

impl RequestStatus {
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        use RequestStatus::*;
        matches!(
            (self, next),
            (Pending, Approved) | (Pending, Rejected) | (Pending, Cancelled)
                | (Approved, Fulfilled) | (Approved, Cancelled)
        )
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
    EnumString, Display, AsRefStr, sqlx::Type,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Urgency {
    Routine,
    Urgent,
    Emergency,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct BloodRequest {
    pub id: i64,
    pub patient_name: String,
    pub hospital: String,
    pub blood_type: BloodType,
    pub units_requested: i64,
    pub urgency: Urgency,
    pub status: RequestStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, Clone)]
pub struct CreateBloodRequest {
    #[validate(length(min = 1, max = 255, message = "Patient name must be between 1 and 255 characters"))]
    pub patient_name: String,
    #[validate(length(min = 1, max = 255, message = "Hospital must be between 1 and 255 characters"))]
    pub hospital: String,
    pub blood_type: BloodType,
    #[validate(range(min = 1, max = 50, message = "Units requested must be between 1 and 50"))]
    pub units_requested: i64,
    pub urgency: Option<Urgency>,
    #[validate(length(max = 1000, message = "Notes cannot exceed 1000 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequestStatusRequest {
    pub status: RequestStatus,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct RequestQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub status: Option<String>,
    pub blood_type: Option<String>,
    pub search: Option<String>,
}
