/// Tenant registry model and database operations
///
/// Each tenant is a seller business registered with FBR. Its invoices,
/// buyers and products live in a physically separate database whose name is
/// recorded here; the registry row is the only place the two are linked.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE tenants (
///     id BIGINT NOT NULL AUTO_INCREMENT,
///     tenant_id VARCHAR(100) NOT NULL,           -- unique
///     seller_ntn_cnic VARCHAR(50) NOT NULL,      -- unique
///     seller_business_name VARCHAR(255) NOT NULL,
///     seller_province VARCHAR(100) NULL,
///     seller_address TEXT NULL,
///     database_name VARCHAR(64) NOT NULL,        -- unique, never updated
///     is_active TINYINT(1) NOT NULL DEFAULT 1,
///     provisioning_state VARCHAR(32) NOT NULL DEFAULT 'unprovisioned',
///     created_at TIMESTAMP NOT NULL,
///     updated_at TIMESTAMP NOT NULL
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use taxbook_shared::models::tenant::Tenant;
/// use sqlx::MySqlPool;
///
/// # async fn example(pool: MySqlPool) -> Result<(), sqlx::Error> {
/// if let Some(tenant) = Tenant::find_active_by_tenant_id(&pool, "tenant_1735689600000_k3j9x2m1q").await? {
///     println!("{} lives in {}", tenant.seller_business_name, tenant.database_name);
/// }
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use std::fmt;
use validator::Validate;

/// Provisioning progress of a tenant database
///
/// ```text
/// Unprovisioned ──► DbCreated ──► RegistryInserted ──► SchemaReady
/// ```
///
/// `DbCreated` is only ever logged: the registry row does not exist yet at
/// that point. Rows are inserted as `RegistryInserted` and flipped to
/// `SchemaReady` once the schema initializer has applied every migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningState {
    Unprovisioned,
    DbCreated,
    RegistryInserted,
    SchemaReady,
}

impl ProvisioningState {
    /// Converts state to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisioningState::Unprovisioned => "unprovisioned",
            ProvisioningState::DbCreated => "db_created",
            ProvisioningState::RegistryInserted => "registry_inserted",
            ProvisioningState::SchemaReady => "schema_ready",
        }
    }

    /// Parses state from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "unprovisioned" => Some(ProvisioningState::Unprovisioned),
            "db_created" => Some(ProvisioningState::DbCreated),
            "registry_inserted" => Some(ProvisioningState::RegistryInserted),
            "schema_ready" => Some(ProvisioningState::SchemaReady),
            _ => None,
        }
    }

    /// Whether the tenant database is fully usable
    pub fn is_ready(&self) -> bool {
        matches!(self, ProvisioningState::SchemaReady)
    }
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tenant registry row
///
/// `is_active` is always a real boolean here, whatever integer encoding the
/// storage layer uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    /// Numeric primary key (referenced by audit tables)
    pub id: i64,

    /// Stable string identifier, e.g. `tenant_1735689600000_k3j9x2m1q`
    pub tenant_id: String,

    /// Seller NTN or CNIC
    pub seller_ntn_cnic: String,

    /// Legal / display name
    pub seller_business_name: String,

    /// Province as registered with FBR
    pub seller_province: Option<String>,

    /// Business address
    pub seller_address: Option<String>,

    /// Physical database backing this tenant
    pub database_name: String,

    /// Whether the tenant may be resolved
    pub is_active: bool,

    /// How far provisioning got
    pub provisioning_state: ProvisioningState,

    /// When the tenant was created
    pub created_at: DateTime<Utc>,

    /// When the tenant was last updated
    pub updated_at: DateTime<Utc>,
}

/// Raw row as MySQL returns it (`TINYINT` flag, free-form state)
#[derive(Debug, sqlx::FromRow)]
struct TenantRow {
    id: i64,
    tenant_id: String,
    seller_ntn_cnic: String,
    seller_business_name: String,
    seller_province: Option<String>,
    seller_address: Option<String>,
    database_name: String,
    is_active: i8,
    provisioning_state: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TenantRow> for Tenant {
    fn from(row: TenantRow) -> Self {
        let provisioning_state = ProvisioningState::from_str(&row.provisioning_state)
            .unwrap_or_else(|| {
                tracing::warn!(
                    tenant_id = %row.tenant_id,
                    state = %row.provisioning_state,
                    "Unknown provisioning state, treating as unprovisioned"
                );
                ProvisioningState::Unprovisioned
            });

        Tenant {
            id: row.id,
            tenant_id: row.tenant_id,
            seller_ntn_cnic: row.seller_ntn_cnic,
            seller_business_name: row.seller_business_name,
            seller_province: row.seller_province,
            seller_address: row.seller_address,
            database_name: row.database_name,
            is_active: row.is_active != 0,
            provisioning_state,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Input for creating a new tenant
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateTenant {
    /// Seller NTN or CNIC (must be unique among tenants)
    #[validate(length(min = 1, max = 50, message = "Tax identifier must be 1-50 characters"))]
    pub seller_ntn_cnic: String,

    /// Legal / display name
    #[validate(length(min = 1, max = 255, message = "Business name must be 1-255 characters"))]
    pub seller_business_name: String,

    /// Province
    #[validate(length(max = 100, message = "Province must be at most 100 characters"))]
    pub seller_province: Option<String>,

    /// Address
    pub seller_address: Option<String>,

    /// Explicit database name; generated from the tax identifier when absent
    #[serde(default)]
    pub database_name: Option<String>,
}

/// Fully resolved registry row to insert
#[derive(Debug, Clone, PartialEq)]
pub struct NewTenantRecord {
    pub tenant_id: String,
    pub seller_ntn_cnic: String,
    pub seller_business_name: String,
    pub seller_province: Option<String>,
    pub seller_address: Option<String>,
    pub database_name: String,
    pub provisioning_state: ProvisioningState,
}

const TENANT_COLUMNS: &str = "id, tenant_id, seller_ntn_cnic, seller_business_name, seller_province, \
     seller_address, database_name, is_active, provisioning_state, created_at, updated_at";

impl Tenant {
    /// Inserts a registry row and returns it
    ///
    /// # Errors
    ///
    /// Returns the raw sqlx error; a duplicate `tenant_id`, tax identifier or
    /// database name is a unique-key violation (MySQL 1062).
    pub async fn insert(pool: &MySqlPool, record: &NewTenantRecord) -> Result<Self, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO tenants (tenant_id, seller_ntn_cnic, seller_business_name,
                                 seller_province, seller_address, database_name,
                                 is_active, provisioning_state)
            VALUES (?, ?, ?, ?, ?, ?, 1, ?)
            "#,
        )
        .bind(&record.tenant_id)
        .bind(&record.seller_ntn_cnic)
        .bind(&record.seller_business_name)
        .bind(&record.seller_province)
        .bind(&record.seller_address)
        .bind(&record.database_name)
        .bind(record.provisioning_state.as_str())
        .execute(pool)
        .await?;

        Self::find_by_tenant_id(pool, &record.tenant_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Finds a tenant by string id regardless of the active flag
    pub async fn find_by_tenant_id(
        pool: &MySqlPool,
        tenant_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {} FROM tenants WHERE tenant_id = ?", TENANT_COLUMNS);

        let row = sqlx::query_as::<_, TenantRow>(&query)
            .bind(tenant_id)
            .fetch_optional(pool)
            .await?;

        Ok(row.map(Tenant::from))
    }

    /// Finds an active tenant by string id
    pub async fn find_active_by_tenant_id(
        pool: &MySqlPool,
        tenant_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM tenants WHERE tenant_id = ? AND is_active = 1",
            TENANT_COLUMNS
        );

        let row = sqlx::query_as::<_, TenantRow>(&query)
            .bind(tenant_id)
            .fetch_optional(pool)
            .await?;

        Ok(row.map(Tenant::from))
    }

    /// Finds an active tenant by physical database name
    pub async fn find_active_by_database_name(
        pool: &MySqlPool,
        database_name: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM tenants WHERE database_name = ? AND is_active = 1",
            TENANT_COLUMNS
        );

        let row = sqlx::query_as::<_, TenantRow>(&query)
            .bind(database_name)
            .fetch_optional(pool)
            .await?;

        Ok(row.map(Tenant::from))
    }

    /// Whether any row, active or not, holds this seller tax identifier
    pub async fn tax_id_exists(pool: &MySqlPool, seller_ntn_cnic: &str) -> Result<bool, sqlx::Error> {
        let exists: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM tenants WHERE seller_ntn_cnic = ?)",
        )
        .bind(seller_ntn_cnic)
        .fetch_one(pool)
        .await?;

        Ok(exists > 0)
    }

    /// Whether any row, active or not, is backed by this database
    pub async fn database_name_exists(pool: &MySqlPool, database_name: &str) -> Result<bool, sqlx::Error> {
        let exists: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM tenants WHERE database_name = ?)",
        )
        .bind(database_name)
        .fetch_one(pool)
        .await?;

        Ok(exists > 0)
    }

    /// Records provisioning progress
    ///
    /// # Returns
    ///
    /// True if a row was updated
    pub async fn set_provisioning_state(
        pool: &MySqlPool,
        tenant_id: &str,
        state: ProvisioningState,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tenants SET provisioning_state = ?, updated_at = CURRENT_TIMESTAMP WHERE tenant_id = ?",
        )
        .bind(state.as_str())
        .bind(tenant_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Activates or deactivates a tenant
    pub async fn set_active(
        pool: &MySqlPool,
        tenant_id: &str,
        active: bool,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tenants SET is_active = ?, updated_at = CURRENT_TIMESTAMP WHERE tenant_id = ?",
        )
        .bind(active)
        .bind(tenant_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists active tenants, oldest first
    pub async fn list_active(pool: &MySqlPool) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM tenants WHERE is_active = 1 ORDER BY created_at ASC, id ASC",
            TENANT_COLUMNS
        );

        let rows = sqlx::query_as::<_, TenantRow>(&query)
            .fetch_all(pool)
            .await?;

        Ok(rows.into_iter().map(Tenant::from).collect())
    }

    /// Lists active tenants whose provisioning never reached `schema_ready`
    pub async fn list_incomplete(pool: &MySqlPool) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM tenants WHERE is_active = 1 AND provisioning_state <> ? ORDER BY created_at ASC",
            TENANT_COLUMNS
        );

        let rows = sqlx::query_as::<_, TenantRow>(&query)
            .bind(ProvisioningState::SchemaReady.as_str())
            .fetch_all(pool)
            .await?;

        Ok(rows.into_iter().map(Tenant::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(is_active: i8, state: &str) -> TenantRow {
        TenantRow {
            id: 7,
            tenant_id: "tenant_1_abc".to_string(),
            seller_ntn_cnic: "1234567-8".to_string(),
            seller_business_name: "Acme Traders".to_string(),
            seller_province: Some("Punjab".to_string()),
            seller_address: None,
            database_name: "tenant_1234567-8_1_abc".to_string(),
            is_active,
            provisioning_state: state.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_provisioning_state_round_trip() {
        for state in [
            ProvisioningState::Unprovisioned,
            ProvisioningState::DbCreated,
            ProvisioningState::RegistryInserted,
            ProvisioningState::SchemaReady,
        ] {
            assert_eq!(ProvisioningState::from_str(state.as_str()), Some(state));
        }
        assert_eq!(ProvisioningState::from_str("ready"), None);
    }

    #[test]
    fn test_provisioning_states_are_ordered() {
        assert!(ProvisioningState::Unprovisioned < ProvisioningState::DbCreated);
        assert!(ProvisioningState::DbCreated < ProvisioningState::RegistryInserted);
        assert!(ProvisioningState::RegistryInserted < ProvisioningState::SchemaReady);
        assert!(ProvisioningState::SchemaReady.is_ready());
        assert!(!ProvisioningState::RegistryInserted.is_ready());
    }

    #[test]
    fn test_active_flag_is_normalized() {
        let active = Tenant::from(row(1, "schema_ready"));
        let inactive = Tenant::from(row(0, "schema_ready"));

        assert!(active.is_active);
        assert!(!inactive.is_active);

        // Serialized output carries a JSON boolean, not 0/1
        let json = serde_json::to_value(&active).unwrap();
        assert_eq!(json["is_active"], serde_json::Value::Bool(true));
        assert_eq!(json["provisioning_state"], "schema_ready");
    }

    #[test]
    fn test_unknown_state_falls_back() {
        let tenant = Tenant::from(row(1, "garbage"));
        assert_eq!(tenant.provisioning_state, ProvisioningState::Unprovisioned);
    }

    #[test]
    fn test_create_tenant_validation() {
        let valid = CreateTenant {
            seller_ntn_cnic: "T-001".to_string(),
            seller_business_name: "Acme".to_string(),
            seller_province: Some("Sindh".to_string()),
            seller_address: None,
            database_name: None,
        };
        assert!(valid.validate().is_ok());

        let invalid = CreateTenant {
            seller_ntn_cnic: String::new(),
            ..valid
        };
        assert!(invalid.validate().is_err());
    }
}
