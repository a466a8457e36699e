/// Tenant schema initializer
///
/// Brings a tenant database to the declared shape and keeps it there.
///
/// # Modules
///
/// - `migrations`: ordered, versioned list of tenant schema migrations
/// - `buyer_index`: repair of the buyer tax-identifier indexes
///
/// # Behaviour
///
/// [`initialize_tenant_schema`] records applied migration versions in
/// `_tenant_schema_migrations`. Pending migrations run step by step; a failed
/// step is logged, collected as a [`SchemaWarning`] and the remaining steps
/// still run. A migration is recorded only when every one of its steps
/// succeeded, so the next run retries it. The buyer index repair runs last.
///
/// # Example
///
/// ```no_run
/// use taxbook_shared::schema::initialize_tenant_schema;
/// # async fn example(pool: sqlx::MySqlPool) -> Result<(), sqlx::Error> {
/// let report = initialize_tenant_schema(&pool).await?;
/// if !report.is_complete() {
///     for warning in &report.warnings {
///         eprintln!("{}: {}", warning.step, warning.message);
///     }
/// }
/// # Ok(())
/// # }
/// ```

pub mod buyer_index;
pub mod migrations;

pub use buyer_index::repair_buyer_tax_index;
pub use migrations::{latest_version, pending_migrations, MigrationStep, TenantMigration};

use serde::Serialize;
use sqlx::MySqlPool;
use std::fmt::Display;
use tracing::{debug, info, warn};

/// Table recording applied tenant migrations
pub const SCHEMA_MIGRATIONS_TABLE: &str = "_tenant_schema_migrations";

/// Non-fatal failure of one schema step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaWarning {
    pub step: String,
    pub message: String,
}

impl SchemaWarning {
    pub fn new(step: impl Into<String>, error: &impl Display) -> Self {
        Self {
            step: step.into(),
            message: error.to_string(),
        }
    }
}

/// Outcome of one initializer run
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchemaReport {
    /// Versions applied by this run
    pub applied: Vec<u32>,

    /// Versions that had at least one failed step
    pub incomplete: Vec<u32>,

    pub warnings: Vec<SchemaWarning>,
}

impl SchemaReport {
    /// True when every declared migration is now recorded
    ///
    /// Index repair warnings do not make a schema incomplete.
    pub fn is_complete(&self) -> bool {
        self.incomplete.is_empty()
    }
}

/// Initializes or upgrades the schema of one tenant database
///
/// # Errors
///
/// Only fails when the migrations table cannot be created or read; every
/// later problem ends up in [`SchemaReport::warnings`].
pub async fn initialize_tenant_schema(pool: &MySqlPool) -> Result<SchemaReport, sqlx::Error> {
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS `{}` (
            version INT UNSIGNED NOT NULL PRIMARY KEY,
            name VARCHAR(128) NOT NULL,
            applied_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci
        "#,
        SCHEMA_MIGRATIONS_TABLE
    ))
    .execute(pool)
    .await?;

    let applied = applied_versions(pool).await?;
    let pending = pending_migrations(&applied);

    let mut report = SchemaReport::default();

    if pending.is_empty() {
        debug!(version = latest_version(), "Tenant schema up to date");
    }

    for migration in pending {
        let mut failed = false;

        for step in migration.steps {
            if let Err(e) = apply_step(pool, step).await {
                warn!(
                    version = migration.version,
                    migration = migration.name,
                    step = %step.describe(),
                    error = %e,
                    "Tenant schema step failed, continuing"
                );
                report.warnings.push(SchemaWarning::new(step.describe(), &e));
                failed = true;
            }
        }

        if failed {
            report.incomplete.push(migration.version);
            continue;
        }

        match record_migration(pool, migration).await {
            Ok(()) => {
                info!(
                    version = migration.version,
                    migration = migration.name,
                    "Applied tenant migration"
                );
                report.applied.push(migration.version);
            }
            Err(e) => {
                warn!(version = migration.version, error = %e, "Could not record tenant migration");
                report
                    .warnings
                    .push(SchemaWarning::new(format!("record migration {}", migration.version), &e));
                report.incomplete.push(migration.version);
            }
        }
    }

    report.warnings.extend(repair_buyer_tax_index(pool).await);

    Ok(report)
}

/// Versions already recorded in the migrations table
pub async fn applied_versions(pool: &MySqlPool) -> Result<Vec<u32>, sqlx::Error> {
    let versions: Vec<i64> = sqlx::query_scalar(&format!(
        "SELECT CAST(version AS SIGNED) FROM `{}` ORDER BY version",
        SCHEMA_MIGRATIONS_TABLE
    ))
    .fetch_all(pool)
    .await?;

    Ok(versions.into_iter().map(|v| v as u32).collect())
}

async fn record_migration(pool: &MySqlPool, migration: &TenantMigration) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "INSERT IGNORE INTO `{}` (version, name) VALUES (?, ?)",
        SCHEMA_MIGRATIONS_TABLE
    ))
    .bind(migration.version)
    .bind(migration.name)
    .execute(pool)
    .await?;

    Ok(())
}

async fn apply_step(pool: &MySqlPool, step: &MigrationStep) -> Result<(), sqlx::Error> {
    match step {
        MigrationStep::Execute(sql) => {
            sqlx::query(sql).execute(pool).await?;
        }
        MigrationStep::AddColumn {
            table,
            column,
            definition,
        } => {
            if column_exists(pool, table, column).await? {
                debug!(table, column, "Column already present");
                return Ok(());
            }
            sqlx::query(&format!(
                "ALTER TABLE `{}` ADD COLUMN `{}` {}",
                table, column, definition
            ))
            .execute(pool)
            .await?;
        }
        MigrationStep::CreateIndex {
            table,
            name,
            columns,
        } => {
            if index_exists(pool, table, name).await? {
                debug!(table, index = name, "Index already present");
                return Ok(());
            }
            let column_list = columns
                .iter()
                .map(|c| format!("`{}`", c))
                .collect::<Vec<_>>()
                .join(", ");
            sqlx::query(&format!(
                "CREATE INDEX `{}` ON `{}` ({})",
                name, table, column_list
            ))
            .execute(pool)
            .await?;
        }
    }

    Ok(())
}

/// Checks `information_schema.COLUMNS` in the current database
pub async fn column_exists(pool: &MySqlPool, table: &str, column: &str) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM information_schema.COLUMNS
        WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND COLUMN_NAME = ?
        "#,
    )
    .bind(table)
    .bind(column)
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}

/// Checks `information_schema.STATISTICS` in the current database
pub async fn index_exists(pool: &MySqlPool, table: &str, index: &str) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM information_schema.STATISTICS
        WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND INDEX_NAME = ?
        "#,
    )
    .bind(table)
    .bind(index)
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_completeness() {
        let mut report = SchemaReport::default();
        assert!(report.is_complete());

        report.warnings.push(SchemaWarning {
            step: "DROP INDEX `buyer_ntn_cnic` ON `buyers`".to_string(),
            message: "denied".to_string(),
        });
        assert!(report.is_complete());

        report.incomplete.push(6);
        assert!(!report.is_complete());
    }

    #[test]
    fn test_warning_captures_display() {
        let warning = SchemaWarning::new("add column buyers.buyer_registration_type", &"timeout");
        assert_eq!(warning.step, "add column buyers.buyer_registration_type");
        assert_eq!(warning.message, "timeout");
    }
}
