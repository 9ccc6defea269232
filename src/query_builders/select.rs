// src/query_builders/select.rs
//! Safe SELECT / COUNT builder

use std::borrow::Cow;
use super::whitelist::FieldWhitelist;
use super::utils::{escape_like_value, is_safe_identifier, normalize_sort_order};
use crate::pagination::offset_for;

/// Builds parameterized SELECT and COUNT statements over one table or view.
///
/// Values always travel as `?` parameters; table and column names are
/// checked against the whitelist (or the identifier rules without one).
/// `build_select` and `build_count` share the same conditions, so a page and
/// its total are always computed under identical filters.
pub struct SafeQueryBuilder<'a> {
    table: Cow<'a, str>,
    whitelist: Option<&'a FieldWhitelist>,
    conditions: Vec<String>,
    params: Vec<String>,
    order_by: Vec<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl<'a> SafeQueryBuilder<'a> {
    pub fn new(table: impl Into<Cow<'a, str>>) -> Result<Self, String> {
        let table = table.into();
        if !is_safe_identifier(&table) {
            return Err(format!("Invalid table name: '{}'", table));
        }
        Ok(Self {
            table,
            whitelist: None,
            conditions: Vec::new(),
            params: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        })
    }

    pub fn with_whitelist(mut self, whitelist: &'a FieldWhitelist) -> Self {
        self.whitelist = Some(whitelist);
        self
    }

    // ==================== CONDITIONS ====================

    /// field = ?
    pub fn add_exact_match(&mut self, field: &str, value: impl Into<String>) -> &mut Self {
        if self.is_field_allowed(field) {
            self.conditions.push(format!("{} = ?", field));
            self.params.push(value.into());
        }
        self
    }

    /// (f1 LIKE ? OR f2 LIKE ? ...) with the same substring for every field
    pub fn add_any_like(&mut self, fields: &[&str], pattern: impl Into<String>) -> &mut Self {
        let allowed: Vec<&str> = fields
            .iter()
            .copied()
            .filter(|f| self.is_field_allowed(f))
            .collect();
        if allowed.is_empty() {
            return self;
        }

        let like = format!("%{}%", escape_like_value(&pattern.into()));
        let parts: Vec<String> = allowed
            .iter()
            .map(|f| format!("{} LIKE ? ESCAPE '\\'", f))
            .collect();
        self.conditions.push(format!("({})", parts.join(" OR ")));
        self.params.extend(allowed.iter().map(|_| like.clone()));
        self
    }

    /// Condition that matches nothing
    pub fn add_match_none(&mut self) -> &mut Self {
        self.conditions.push("1 = 0".to_string());
        self
    }

    /// Pre-validated condition. Never pass user input here.
    pub fn add_raw_condition(&mut self, condition: &str, params: Vec<String>) -> &mut Self {
        self.conditions.push(condition.to_string());
        self.params.extend(params);
        self
    }

    // ==================== SORTING AND PAGINATION ====================

    /// Appends a sort key; later calls break ties of earlier ones.
    pub fn order_by(&mut self, field: &str, order: &str) -> &mut Self {
        if self.is_field_allowed(field) {
            self.order_by.push(format!("{} {}", field, normalize_sort_order(order)));
        }
        self
    }

    /// Fixed sort expression such as a CASE ranking. Never pass user input here.
    pub fn order_by_raw(&mut self, expression: &'static str) -> &mut Self {
        self.order_by.push(expression.to_string());
        self
    }

    /// LIMIT/OFFSET from an already normalized page/per_page
    pub fn paginate(&mut self, page: i64, per_page: i64) -> &mut Self {
        self.limit = Some(per_page);
        self.offset = Some(offset_for(page, per_page));
        self
    }

    // ==================== BUILD ====================

    pub fn build_select(&self, fields: &str) -> (String, Vec<String>) {
        let mut sql = format!("SELECT {} FROM {}", fields, self.table);
        self.push_where(&mut sql);

        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        (sql, self.params.clone())
    }

    pub fn build_count(&self) -> (String, Vec<String>) {
        let mut sql = format!("SELECT COUNT(*) as count FROM {}", self.table);
        self.push_where(&mut sql);
        (sql, self.params.clone())
    }

    fn push_where(&self, sql: &mut String) {
        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conditions.join(" AND "));
        }
    }

    #[inline]
    fn is_field_allowed(&self, field: &str) -> bool {
        match self.whitelist {
            Some(wl) => wl.is_allowed(field),
            None => is_safe_identifier(field),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_with_filters() {
        let mut builder = SafeQueryBuilder::new("inventory_listing").unwrap();
        builder
            .add_exact_match("blood_type", "O+")
            .add_exact_match("status", "available");

        let (sql, params) = builder.build_select("*");
        assert_eq!(
            sql,
            "SELECT * FROM inventory_listing WHERE blood_type = ? AND status = ?"
        );
        assert_eq!(params, vec!["O+", "available"]);
    }

    #[test]
    fn test_whitelist_drops_unknown_fields() {
        let whitelist = FieldWhitelist::for_inventory();
        let mut builder = SafeQueryBuilder::new("inventory_listing").unwrap()
            .with_whitelist(&whitelist);

        builder.add_exact_match("status", "used");
        builder.add_exact_match("password", "secret");

        let (sql, params) = builder.build_select("*");
        assert!(sql.contains("status = ?"));
        assert!(!sql.contains("password"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_any_like_escapes_and_repeats_param() {
        let mut builder = SafeQueryBuilder::new("inventory_listing").unwrap();
        builder.add_any_like(&["unit_id", "donor_name", "reference"], "50%_off");

        let (sql, params) = builder.build_select("*");
        assert!(sql.contains("(unit_id LIKE ? ESCAPE '\\' OR donor_name LIKE ? ESCAPE '\\' OR reference LIKE ? ESCAPE '\\')"));
        assert_eq!(params.len(), 3);
        assert!(params.iter().all(|p| p == "%50\\%\\_off%"));
    }

    #[test]
    fn test_count_ignores_order_and_paging() {
        let mut builder = SafeQueryBuilder::new("blood_requests").unwrap();
        builder
            .add_exact_match("status", "pending")
            .order_by("created_at", "desc")
            .order_by("id", "asc")
            .paginate(3, 20);

        let (select_sql, _) = builder.build_select("*");
        assert!(select_sql.ends_with("ORDER BY created_at DESC, id ASC LIMIT 20 OFFSET 40"));

        let (count_sql, count_params) = builder.build_count();
        assert_eq!(count_sql, "SELECT COUNT(*) as count FROM blood_requests WHERE status = ?");
        assert_eq!(count_params, vec!["pending"]);
    }

    #[test]
    fn test_match_none_keeps_other_conditions() {
        let mut builder = SafeQueryBuilder::new("virtual_inventory").unwrap();
        builder.add_exact_match("blood_type", "O+").add_match_none();
        let (sql, params) = builder.build_count();
        assert!(sql.ends_with("WHERE blood_type = ? AND 1 = 0"));
        assert_eq!(params, vec!["O+"]);
    }

    #[test]
    fn test_raw_order_comes_first_when_added_first() {
        let mut builder = SafeQueryBuilder::new("blood_requests").unwrap();
        builder
            .order_by_raw("CASE urgency WHEN 'emergency' THEN 0 ELSE 1 END")
            .order_by("id", "asc");
        let (sql, _) = builder.build_select("*");
        assert!(sql.ends_with("ORDER BY CASE urgency WHEN 'emergency' THEN 0 ELSE 1 END, id ASC"));
    }

    #[test]
    fn test_paginate_saturates_offset() {
        let mut builder = SafeQueryBuilder::new("blood_inventory").unwrap();
        builder.paginate(i64::MAX, 100);
        let (sql, _) = builder.build_select("*");
        assert!(sql.ends_with(&format!("LIMIT 100 OFFSET {}", i64::MAX)));
    }

    #[test]
    fn test_invalid_table_name() {
        assert!(SafeQueryBuilder::new("DROP TABLE donors; --").is_err());
    }
}
