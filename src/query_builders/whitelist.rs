// src/query_builders/whitelist.rs
//! Column whitelists so filter and sort names never reach SQL unchecked

use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct FieldWhitelist {
    allowed_fields: HashSet<String>,
}

impl FieldWhitelist {
    pub fn new(fields: &[&str]) -> Self {
        Self {
            allowed_fields: fields.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn for_inventory() -> Self {
        Self::new(&[
            "id", "unit_id", "donor_id", "donor_name", "blood_type", "collection_date",
            "expiry_date", "status", "collection_site", "storage_location", "reference",
            "used_date", "created_at", "updated_at",
        ])
    }

    pub fn for_virtual_inventory() -> Self {
        Self::new(&["donor_id", "donor_name", "blood_type", "collection_date", "source_table"])
    }

    pub fn for_donors() -> Self {
        Self::new(&[
            "id", "name", "email", "phone", "blood_type", "status", "created_at", "updated_at",
        ])
    }

    pub fn for_requests() -> Self {
        Self::new(&[
            "id", "patient_name", "hospital", "blood_type", "units_requested", "urgency",
            "status", "notes", "created_at", "updated_at",
        ])
    }

    pub fn is_allowed(&self, field: &str) -> bool {
        self.allowed_fields.contains(field)
    }
}
