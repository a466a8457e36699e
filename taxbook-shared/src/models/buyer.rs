/// Buyer model (tenant database)
///
/// Buyers are the counterparties printed on a seller's invoices. The tax
/// identifier is deliberately *not* unique: the same NTN/CNIC can arrive more
/// than once from data sync and imports, so lookups by tax id return a list.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE buyers (
///     id BIGINT NOT NULL AUTO_INCREMENT,
///     buyer_ntn_cnic VARCHAR(50) NOT NULL,          -- non-unique index
///     buyer_business_name VARCHAR(255) NOT NULL,
///     buyer_province VARCHAR(100) NOT NULL,
///     buyer_address TEXT NULL,
///     buyer_registration_type VARCHAR(50) NOT NULL DEFAULT 'Unregistered',
///     created_at TIMESTAMP NOT NULL,
///     updated_at TIMESTAMP NOT NULL
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use validator::Validate;

/// Buyer record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Buyer {
    pub id: i64,
    pub buyer_ntn_cnic: String,
    pub buyer_business_name: String,
    pub buyer_province: String,
    pub buyer_address: Option<String>,

    /// `Registered` or `Unregistered` with FBR
    pub buyer_registration_type: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a buyer
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateBuyer {
    #[validate(length(min = 1, max = 50, message = "NTN/CNIC must be 1-50 characters"))]
    pub buyer_ntn_cnic: String,

    #[validate(length(min = 1, max = 255, message = "Business name must be 1-255 characters"))]
    pub buyer_business_name: String,

    #[validate(length(min = 1, max = 100, message = "Province must be 1-100 characters"))]
    pub buyer_province: String,

    pub buyer_address: Option<String>,

    #[serde(default = "default_registration_type")]
    pub buyer_registration_type: String,
}

fn default_registration_type() -> String {
    "Unregistered".to_string()
}

const BUYER_COLUMNS: &str = "id, buyer_ntn_cnic, buyer_business_name, buyer_province, buyer_address, \
     buyer_registration_type, created_at, updated_at";

/// Buyer operations bound to one tenant database
#[derive(Debug, Clone)]
pub struct BuyerStore {
    pool: MySqlPool,
}

impl BuyerStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Inserts a buyer and returns it
    pub async fn create(&self, data: CreateBuyer) -> Result<Buyer, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO buyers (buyer_ntn_cnic, buyer_business_name, buyer_province,
                                buyer_address, buyer_registration_type)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(data.buyer_ntn_cnic)
        .bind(data.buyer_business_name)
        .bind(data.buyer_province)
        .bind(data.buyer_address)
        .bind(data.buyer_registration_type)
        .execute(&self.pool)
        .await?;

        self.find_by_id(result.last_insert_id() as i64)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Finds a buyer by id
    pub async fn find_by_id(&self, id: i64) -> Result<Option<Buyer>, sqlx::Error> {
        let query = format!("SELECT {} FROM buyers WHERE id = ?", BUYER_COLUMNS);

        sqlx::query_as::<_, Buyer>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Finds every buyer carrying a tax identifier (duplicates allowed)
    pub async fn find_by_ntn_cnic(&self, buyer_ntn_cnic: &str) -> Result<Vec<Buyer>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM buyers WHERE buyer_ntn_cnic = ? ORDER BY id ASC",
            BUYER_COLUMNS
        );

        sqlx::query_as::<_, Buyer>(&query)
            .bind(buyer_ntn_cnic)
            .fetch_all(&self.pool)
            .await
    }

    /// Lists buyers alphabetically with pagination
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Buyer>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM buyers ORDER BY buyer_business_name ASC, id ASC LIMIT ? OFFSET ?",
            BUYER_COLUMNS
        );

        sqlx::query_as::<_, Buyer>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
    }

    /// Counts buyers
    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM buyers")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_type_defaults_to_unregistered() {
        let buyer: CreateBuyer = serde_json::from_value(serde_json::json!({
            "buyer_ntn_cnic": "3520212345678",
            "buyer_business_name": "Lahore Textiles",
            "buyer_province": "Punjab",
            "buyer_address": null
        }))
        .unwrap();

        assert_eq!(buyer.buyer_registration_type, "Unregistered");
        assert!(buyer.validate().is_ok());
    }

    #[test]
    fn test_empty_province_rejected() {
        let buyer = CreateBuyer {
            buyer_ntn_cnic: "1234567".to_string(),
            buyer_business_name: "Karachi Steel".to_string(),
            buyer_province: String::new(),
            buyer_address: None,
            buyer_registration_type: default_registration_type(),
        };

        let errors = buyer.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("buyer_province"));
    }
}
