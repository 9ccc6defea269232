// src/pagination.rs
//! Page-based pagination shared by all list endpoints

use serde::Serialize;

pub const DEFAULT_PER_PAGE: i64 = 20;
pub const MAX_PER_PAGE: i64 = 100;
pub const MAX_PAGE: i64 = 1_000_000;

/// Clamps `page` to 1..=MAX_PAGE and `per_page` to 1..=100, returns (page, per_page, offset).
pub fn normalize(page: Option<i64>, per_page: Option<i64>) -> (i64, i64, i64) {
    let page = page.unwrap_or(1).clamp(1, MAX_PAGE);
    let per_page = per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
    (page, per_page, offset_for(page, per_page))
}

/// Row offset of `page`; saturates instead of overflowing.
pub fn offset_for(page: i64, per_page: i64) -> i64 {
    (page.max(1) - 1).saturating_mul(per_page.max(0))
}

pub fn total_pages(total: i64, per_page: i64) -> i64 {
    if total <= 0 {
        0
    } else {
        (total + per_page - 1) / per_page
    }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, total: i64, page: i64, per_page: i64) -> Self {
        Self {
            data,
            total,
            page,
            per_page,
            total_pages: total_pages(total, per_page),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_defaults_and_clamps() {
        assert_eq!(normalize(None, None), (1, 20, 0));
        assert_eq!(normalize(Some(0), Some(0)), (1, 1, 0));
        assert_eq!(normalize(Some(3), Some(500)), (3, 100, 200));
        assert_eq!(normalize(Some(-4), Some(10)), (1, 10, 0));
    }

    #[test]
    fn test_huge_page_is_capped() {
        let (page, per_page, offset) = normalize(Some(i64::MAX), Some(100));
        assert_eq!(page, MAX_PAGE);
        assert_eq!(per_page, 100);
        assert_eq!(offset, (MAX_PAGE - 1) * 100);

        assert_eq!(offset_for(i64::MAX, i64::MAX), i64::MAX);
        assert_eq!(offset_for(i64::MIN, 20), 0);
    }

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(0, 20), 0);
        assert_eq!(total_pages(20, 20), 1);
        assert_eq!(total_pages(21, 20), 2);
    }
}
