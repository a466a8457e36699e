/// Invoice backup models (tenant database)
///
/// Every time an invoice is saved, submitted or posted, a JSON snapshot of it
/// is appended to `invoice_backups`. `invoice_backup_summary` keeps one row
/// per invoice (unique `invoice_id`) with the running count and the first /
/// last backup timestamps, so reports never have to scan the snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::MySqlPool;

/// Why a snapshot was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupType {
    Draft,
    Submission,
    Posted,
    Edit,
}

impl BackupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupType::Draft => "draft",
            BackupType::Submission => "submission",
            BackupType::Posted => "posted",
            BackupType::Edit => "edit",
        }
    }
}

/// One snapshot of an invoice
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InvoiceBackup {
    pub id: i64,
    pub invoice_id: i64,
    pub backup_type: String,
    pub backup_data: JsonValue,
    pub created_at: DateTime<Utc>,
}

/// Per-invoice backup rollup
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InvoiceBackupSummary {
    pub id: i64,
    pub invoice_id: i64,
    pub total_backups: i32,
    pub last_backup_type: String,
    pub first_backup_at: DateTime<Utc>,
    pub last_backup_at: DateTime<Utc>,
}

/// Snapshot operations bound to one tenant database
#[derive(Debug, Clone)]
pub struct InvoiceBackupStore {
    pool: MySqlPool,
}

impl InvoiceBackupStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Appends a snapshot and bumps the invoice's summary row
    ///
    /// Both writes commit together.
    pub async fn record(
        &self,
        invoice_id: i64,
        backup_type: BackupType,
        backup_data: &JsonValue,
    ) -> Result<InvoiceBackup, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO invoice_backups (invoice_id, backup_type, backup_data) VALUES (?, ?, ?)",
        )
        .bind(invoice_id)
        .bind(backup_type.as_str())
        .bind(backup_data)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO invoice_backup_summary (invoice_id, total_backups, last_backup_type,
                                                first_backup_at, last_backup_at)
            VALUES (?, 1, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
            ON DUPLICATE KEY UPDATE
                total_backups = total_backups + 1,
                last_backup_type = VALUES(last_backup_type),
                last_backup_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(invoice_id)
        .bind(backup_type.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let backup = sqlx::query_as::<_, InvoiceBackup>(
            "SELECT id, invoice_id, backup_type, backup_data, created_at FROM invoice_backups WHERE id = ?",
        )
        .bind(result.last_insert_id() as i64)
        .fetch_one(&self.pool)
        .await?;

        Ok(backup)
    }

    /// Lists snapshots of an invoice, newest first
    pub async fn list_for_invoice(&self, invoice_id: i64) -> Result<Vec<InvoiceBackup>, sqlx::Error> {
        sqlx::query_as::<_, InvoiceBackup>(
            r#"
            SELECT id, invoice_id, backup_type, backup_data, created_at
            FROM invoice_backups
            WHERE invoice_id = ?
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
    }
}

/// Summary lookups bound to one tenant database
#[derive(Debug, Clone)]
pub struct InvoiceBackupSummaryStore {
    pool: MySqlPool,
}

impl InvoiceBackupSummaryStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn find_for_invoice(
        &self,
        invoice_id: i64,
    ) -> Result<Option<InvoiceBackupSummary>, sqlx::Error> {
        sqlx::query_as::<_, InvoiceBackupSummary>(
            r#"
            SELECT id, invoice_id, total_backups, last_backup_type, first_backup_at, last_backup_at
            FROM invoice_backup_summary
            WHERE invoice_id = ?
            "#,
        )
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_type_matches_serde_name() {
        for kind in [
            BackupType::Draft,
            BackupType::Submission,
            BackupType::Posted,
            BackupType::Edit,
        ] {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, JsonValue::String(kind.as_str().to_string()));
        }
    }
}
