/// API route handlers
///
/// This module contains all route handlers organized by resource:
///
/// - `health`: Health check endpoint
/// - `tenants`: Tenant provisioning and back-office listings
/// - `buyers`, `products`, `invoices`: tenant-scoped entity endpoints

pub mod buyers;
pub mod health;
pub mod invoices;
pub mod products;
pub mod tenants;

use serde::Deserialize;

/// Pagination query parameters (`?limit=&offset=`)
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Pagination {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 200;

    /// Limit clamped to 1..=200
    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_bounds() {
        let default = Pagination::default();
        assert_eq!(default.limit(), 50);
        assert_eq!(default.offset(), 0);

        let wild = Pagination {
            limit: Some(10_000),
            offset: Some(-5),
        };
        assert_eq!(wild.limit(), 200);
        assert_eq!(wild.offset(), 0);

        let zero = Pagination {
            limit: Some(0),
            offset: Some(20),
        };
        assert_eq!(zero.limit(), 1);
        assert_eq!(zero.offset(), 20);
    }
}
