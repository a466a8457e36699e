/// Product model (tenant database)
///
/// Products carry the HS code and unit of measure FBR expects on every
/// invoice line, so invoice items can be prefilled from them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use validator::Validate;

/// Product record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,

    /// Harmonized System code, e.g. `5208.1100`
    pub hs_code: String,

    /// Unit of measure, e.g. `Numbers, pieces, units`
    pub uom: String,

    pub unit_price: Decimal,

    /// Sales tax rate label as FBR prints it, e.g. `18%`
    pub tax_rate: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a product
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateProduct {
    #[validate(length(min = 1, max = 255))]
    pub name: String,

    pub description: Option<String>,

    #[validate(length(min = 1, max = 50))]
    pub hs_code: String,

    #[validate(length(min = 1, max = 100))]
    pub uom: String,

    #[serde(default)]
    pub unit_price: Decimal,

    #[serde(default = "default_tax_rate")]
    pub tax_rate: String,
}

fn default_tax_rate() -> String {
    "18%".to_string()
}

const PRODUCT_COLUMNS: &str =
    "id, name, description, hs_code, uom, unit_price, tax_rate, created_at, updated_at";

/// Product operations bound to one tenant database
#[derive(Debug, Clone)]
pub struct ProductStore {
    pool: MySqlPool,
}

impl ProductStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, data: CreateProduct) -> Result<Product, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO products (name, description, hs_code, uom, unit_price, tax_rate)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(data.name)
        .bind(data.description)
        .bind(data.hs_code)
        .bind(data.uom)
        .bind(data.unit_price)
        .bind(data.tax_rate)
        .execute(&self.pool)
        .await?;

        self.find_by_id(result.last_insert_id() as i64)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<Product>, sqlx::Error> {
        let query = format!("SELECT {} FROM products WHERE id = ?", PRODUCT_COLUMNS);

        sqlx::query_as::<_, Product>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Product>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM products ORDER BY name ASC, id ASC LIMIT ? OFFSET ?",
            PRODUCT_COLUMNS
        );

        sqlx::query_as::<_, Product>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
    }
}
