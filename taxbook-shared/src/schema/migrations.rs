/// Versioned tenant schema migrations
///
/// The tenant schema is declared as an ordered, append-only list. Each
/// migration has a version, a name and a list of steps; every step is
/// idempotent on its own (`IF NOT EXISTS`, or an existence check before
/// altering), so a half-applied migration can simply be run again.
///
/// Rules for adding a migration:
/// - append it with the next version number, never edit a released one
/// - new columns on existing tables go through [`MigrationStep::AddColumn`]
/// - `buyers.buyer_ntn_cnic` indexes are owned by the buyer index repair,
///   not by migrations

/// One idempotent schema change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStep {
    /// Statement that is idempotent by itself (`CREATE TABLE IF NOT EXISTS ...`)
    Execute(&'static str),

    /// `ALTER TABLE ... ADD COLUMN`, skipped when the column exists
    AddColumn {
        table: &'static str,
        column: &'static str,
        definition: &'static str,
    },

    /// `CREATE INDEX`, skipped when an index of that name exists
    CreateIndex {
        table: &'static str,
        name: &'static str,
        columns: &'static [&'static str],
    },
}

impl MigrationStep {
    /// Short description for logs and warnings
    pub fn describe(&self) -> String {
        match self {
            MigrationStep::Execute(sql) => {
                let first_line = sql.trim().lines().next().unwrap_or_default();
                first_line.trim_end_matches('(').trim().to_string()
            }
            MigrationStep::AddColumn { table, column, .. } => {
                format!("add column {}.{}", table, column)
            }
            MigrationStep::CreateIndex { table, name, .. } => {
                format!("create index {} on {}", name, table)
            }
        }
    }
}

/// Named, versioned group of steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantMigration {
    pub version: u32,
    pub name: &'static str,
    pub steps: &'static [MigrationStep],
}

/// Every tenant schema migration, in application order
pub const TENANT_MIGRATIONS: &[TenantMigration] = &[
    TenantMigration {
        version: 1,
        name: "create_buyers",
        steps: &[MigrationStep::Execute(
            r#"CREATE TABLE IF NOT EXISTS buyers (
                id BIGINT NOT NULL AUTO_INCREMENT,
                buyer_ntn_cnic VARCHAR(50) NOT NULL,
                buyer_business_name VARCHAR(255) NOT NULL,
                buyer_province VARCHAR(100) NOT NULL,
                buyer_address TEXT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
                PRIMARY KEY (id)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci"#,
        )],
    },
    TenantMigration {
        version: 2,
        name: "create_products",
        steps: &[MigrationStep::Execute(
            r#"CREATE TABLE IF NOT EXISTS products (
                id BIGINT NOT NULL AUTO_INCREMENT,
                name VARCHAR(255) NOT NULL,
                description TEXT NULL,
                hs_code VARCHAR(50) NOT NULL,
                uom VARCHAR(100) NOT NULL,
                unit_price DECIMAL(15, 2) NOT NULL DEFAULT 0.00,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
                PRIMARY KEY (id),
                KEY idx_products_hs_code (hs_code)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci"#,
        )],
    },
    TenantMigration {
        version: 3,
        name: "create_invoices",
        steps: &[MigrationStep::Execute(
            r#"CREATE TABLE IF NOT EXISTS invoices (
                id BIGINT NOT NULL AUTO_INCREMENT,
                invoice_number VARCHAR(100) NOT NULL,
                invoice_type VARCHAR(50) NOT NULL DEFAULT 'Sale Invoice',
                invoice_date DATE NOT NULL,
                buyer_id BIGINT NULL,
                buyer_ntn_cnic VARCHAR(50) NOT NULL,
                buyer_business_name VARCHAR(255) NOT NULL,
                buyer_province VARCHAR(100) NOT NULL,
                buyer_address TEXT NULL,
                buyer_registration_type VARCHAR(50) NOT NULL DEFAULT 'Unregistered',
                invoice_ref_no VARCHAR(100) NULL,
                scenario_id VARCHAR(20) NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                fbr_invoice_number VARCHAR(100) NULL,
                total_value_excl_st DECIMAL(15, 2) NOT NULL DEFAULT 0.00,
                total_sales_tax DECIMAL(15, 2) NOT NULL DEFAULT 0.00,
                total_amount DECIMAL(15, 2) NOT NULL DEFAULT 0.00,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
                PRIMARY KEY (id),
                UNIQUE KEY uq_invoices_invoice_number (invoice_number),
                KEY idx_invoices_status (status),
                KEY idx_invoices_buyer (buyer_id)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci"#,
        )],
    },
    TenantMigration {
        version: 4,
        name: "create_invoice_items",
        steps: &[MigrationStep::Execute(
            r#"CREATE TABLE IF NOT EXISTS invoice_items (
                id BIGINT NOT NULL AUTO_INCREMENT,
                invoice_id BIGINT NOT NULL,
                hs_code VARCHAR(50) NOT NULL,
                product_description TEXT NOT NULL,
                rate VARCHAR(50) NOT NULL,
                uom VARCHAR(100) NOT NULL,
                quantity DECIMAL(15, 4) NOT NULL,
                unit_price DECIMAL(15, 2) NOT NULL,
                discount DECIMAL(15, 2) NOT NULL DEFAULT 0.00,
                value_sales_excluding_st DECIMAL(15, 2) NOT NULL,
                sales_tax_applicable DECIMAL(15, 2) NOT NULL,
                total_values DECIMAL(15, 2) NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
                PRIMARY KEY (id),
                KEY idx_invoice_items_invoice (invoice_id),
                CONSTRAINT fk_invoice_items_invoice FOREIGN KEY (invoice_id)
                    REFERENCES invoices (id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci"#,
        )],
    },
    TenantMigration {
        version: 5,
        name: "create_invoice_backups",
        steps: &[
            MigrationStep::Execute(
                r#"CREATE TABLE IF NOT EXISTS invoice_backups (
                    id BIGINT NOT NULL AUTO_INCREMENT,
                    invoice_id BIGINT NOT NULL,
                    backup_type VARCHAR(50) NOT NULL,
                    backup_data JSON NOT NULL,
                    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                    PRIMARY KEY (id),
                    KEY idx_invoice_backups_invoice (invoice_id),
                    CONSTRAINT fk_invoice_backups_invoice FOREIGN KEY (invoice_id)
                        REFERENCES invoices (id) ON DELETE CASCADE
                ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci"#,
            ),
            MigrationStep::Execute(
                r#"CREATE TABLE IF NOT EXISTS invoice_backup_summary (
                    id BIGINT NOT NULL AUTO_INCREMENT,
                    invoice_id BIGINT NOT NULL,
                    total_backups INT NOT NULL DEFAULT 0,
                    last_backup_type VARCHAR(50) NOT NULL,
                    first_backup_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                    last_backup_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                    PRIMARY KEY (id),
                    UNIQUE KEY uq_invoice_backup_summary_invoice (invoice_id),
                    CONSTRAINT fk_invoice_backup_summary_invoice FOREIGN KEY (invoice_id)
                        REFERENCES invoices (id) ON DELETE CASCADE
                ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci"#,
            ),
        ],
    },
    TenantMigration {
        version: 6,
        name: "add_buyer_registration_type",
        steps: &[MigrationStep::AddColumn {
            table: "buyers",
            column: "buyer_registration_type",
            definition: "VARCHAR(50) NOT NULL DEFAULT 'Unregistered' AFTER buyer_address",
        }],
    },
    TenantMigration {
        version: 7,
        name: "add_product_tax_rate",
        steps: &[MigrationStep::AddColumn {
            table: "products",
            column: "tax_rate",
            definition: "VARCHAR(50) NOT NULL DEFAULT '18%' AFTER unit_price",
        }],
    },
    TenantMigration {
        version: 8,
        name: "add_invoice_posting_fields",
        steps: &[
            MigrationStep::AddColumn {
                table: "invoices",
                column: "posted_at",
                definition: "TIMESTAMP NULL DEFAULT NULL AFTER total_amount",
            },
            MigrationStep::CreateIndex {
                table: "invoices",
                name: "idx_invoices_invoice_date",
                columns: &["invoice_date"],
            },
            MigrationStep::CreateIndex {
                table: "invoices",
                name: "idx_invoices_fbr_invoice_number",
                columns: &["fbr_invoice_number"],
            },
        ],
    },
];

/// Latest tenant schema version
pub fn latest_version() -> u32 {
    TENANT_MIGRATIONS
        .last()
        .map(|migration| migration.version)
        .unwrap_or(0)
}

/// Migrations not yet recorded as applied, in order
pub fn pending_migrations(applied: &[u32]) -> Vec<&'static TenantMigration> {
    TENANT_MIGRATIONS
        .iter()
        .filter(|migration| !applied.contains(&migration.version))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_versions_strictly_increase() {
        assert!(TENANT_MIGRATIONS
            .windows(2)
            .all(|pair| pair[0].version < pair[1].version));
        assert_eq!(TENANT_MIGRATIONS[0].version, 1);
    }

    #[test]
    fn test_names_are_unique() {
        let names: HashSet<&str> = TENANT_MIGRATIONS.iter().map(|m| m.name).collect();
        assert_eq!(names.len(), TENANT_MIGRATIONS.len());
    }

    #[test]
    fn test_every_tenant_table_is_created() {
        let statements: Vec<&str> = TENANT_MIGRATIONS
            .iter()
            .flat_map(|m| m.steps.iter())
            .filter_map(|step| match step {
                MigrationStep::Execute(sql) => Some(*sql),
                _ => None,
            })
            .collect();

        for table in [
            "buyers",
            "products",
            "invoices",
            "invoice_items",
            "invoice_backups",
            "invoice_backup_summary",
        ] {
            let needle = format!("CREATE TABLE IF NOT EXISTS {} (", table);
            assert!(
                statements.iter().any(|sql| sql.contains(&needle)),
                "no migration creates {}",
                table
            );
        }
    }

    #[test]
    fn test_buyer_tax_id_never_unique_in_migrations() {
        for migration in TENANT_MIGRATIONS {
            for step in migration.steps {
                if let MigrationStep::Execute(sql) = step {
                    assert!(!sql.contains("UNIQUE KEY uq_buyers"), "{}", migration.name);
                }
                if let MigrationStep::CreateIndex { table, columns, .. } = step {
                    assert!(!(*table == "buyers" && columns.contains(&"buyer_ntn_cnic")));
                }
            }
        }
    }

    #[test]
    fn test_pending_after_full_apply_is_empty() {
        let all: Vec<u32> = TENANT_MIGRATIONS.iter().map(|m| m.version).collect();
        assert!(pending_migrations(&all).is_empty());
        assert_eq!(pending_migrations(&[]).len(), TENANT_MIGRATIONS.len());
    }

    #[test]
    fn test_pending_keeps_order_and_skips_applied() {
        let pending = pending_migrations(&[1, 2, 4]);
        let versions: Vec<u32> = pending.iter().map(|m| m.version).collect();
        assert_eq!(versions[0], 3);
        assert!(versions.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(!versions.contains(&4));
        assert_eq!(latest_version(), *versions.last().unwrap());
    }

    #[test]
    fn test_describe_steps() {
        let step = MigrationStep::AddColumn {
            table: "buyers",
            column: "buyer_registration_type",
            definition: "VARCHAR(50)",
        };
        assert_eq!(step.describe(), "add column buyers.buyer_registration_type");

        let create = TENANT_MIGRATIONS[0].steps[0];
        assert_eq!(create.describe(), "CREATE TABLE IF NOT EXISTS buyers");
    }
}
