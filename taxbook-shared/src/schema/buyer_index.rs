/// Buyer tax-identifier index repair
///
/// `buyers.buyer_ntn_cnic` must be searchable but never unique: data sync
/// imports the same NTN/CNIC more than once. Older tenant databases were
/// created with a unique constraint on that column, which makes those imports
/// fail. The repair:
///
/// 1. reads the current indexes of `buyers`
/// 2. drops every unique index that covers `buyer_ntn_cnic` (never `PRIMARY`)
/// 3. creates `idx_buyers_ntn_cnic (buyer_ntn_cnic)` if absent
/// 4. creates `idx_buyers_ntn_cnic_name (buyer_ntn_cnic, buyer_business_name)` if absent
///
/// The plan is computed by [`plan_repair`], a pure function over the index
/// listing, so an already-correct table yields an empty plan and running the
/// repair twice changes nothing.

use crate::schema::SchemaWarning;
use sqlx::MySqlPool;
use tracing::{debug, info, warn};

pub const BUYERS_TABLE: &str = "buyers";
pub const TAX_ID_COLUMN: &str = "buyer_ntn_cnic";
pub const LOOKUP_INDEX: &str = "idx_buyers_ntn_cnic";
pub const COMPOSITE_INDEX: &str = "idx_buyers_ntn_cnic_name";

const LOOKUP_COLUMNS: &[&str] = &["buyer_ntn_cnic"];
const COMPOSITE_COLUMNS: &[&str] = &["buyer_ntn_cnic", "buyer_business_name"];

/// One index on the buyers table, columns in index order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    pub name: String,
    pub unique: bool,
    pub columns: Vec<String>,
}

impl IndexInfo {
    fn covers(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.eq_ignore_ascii_case(column))
    }
}

/// One change to apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexAction {
    Drop { name: String },
    Create { name: &'static str, columns: &'static [&'static str] },
}

impl IndexAction {
    /// SQL statement for this action on the buyers table
    pub fn to_sql(&self) -> String {
        match self {
            IndexAction::Drop { name } => {
                format!("DROP INDEX `{}` ON `{}`", name.replace('`', "``"), BUYERS_TABLE)
            }
            IndexAction::Create { name, columns } => format!(
                "CREATE INDEX `{}` ON `{}` ({})",
                name,
                BUYERS_TABLE,
                columns
                    .iter()
                    .map(|c| format!("`{}`", c))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

/// Raw row from `information_schema.STATISTICS`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IndexColumnRow {
    pub index_name: String,
    pub non_unique: i64,
    pub column_name: String,
    pub seq_in_index: i64,
}

/// Groups per-column rows into indexes, preserving column order
pub fn group_index_rows(mut rows: Vec<IndexColumnRow>) -> Vec<IndexInfo> {
    rows.sort_by(|a, b| {
        a.index_name
            .cmp(&b.index_name)
            .then(a.seq_in_index.cmp(&b.seq_in_index))
    });

    let mut indexes: Vec<IndexInfo> = Vec::new();

    for row in rows {
        match indexes.last_mut() {
            Some(last) if last.name == row.index_name => last.columns.push(row.column_name),
            _ => indexes.push(IndexInfo {
                name: row.index_name,
                unique: row.non_unique == 0,
                columns: vec![row.column_name],
            }),
        }
    }

    indexes
}

/// Computes the actions that bring the buyers indexes into shape
///
/// Drops come first so a unique index that happens to carry one of the
/// target names is recreated as non-unique.
pub fn plan_repair(indexes: &[IndexInfo]) -> Vec<IndexAction> {
    let mut actions = Vec::new();

    let doomed: Vec<&IndexInfo> = indexes
        .iter()
        .filter(|index| index.unique && index.name != "PRIMARY" && index.covers(TAX_ID_COLUMN))
        .collect();

    for index in &doomed {
        actions.push(IndexAction::Drop {
            name: index.name.clone(),
        });
    }

    let survives = |name: &str| {
        indexes
            .iter()
            .any(|index| index.name == name && !doomed.iter().any(|d| d.name == index.name))
    };

    if !survives(LOOKUP_INDEX) {
        actions.push(IndexAction::Create {
            name: LOOKUP_INDEX,
            columns: LOOKUP_COLUMNS,
        });
    }

    if !survives(COMPOSITE_INDEX) {
        actions.push(IndexAction::Create {
            name: COMPOSITE_INDEX,
            columns: COMPOSITE_COLUMNS,
        });
    }

    actions
}

/// Applies a plan to an index listing without touching a database
///
/// Used to check the post-repair shape.
pub fn apply_plan(indexes: &[IndexInfo], actions: &[IndexAction]) -> Vec<IndexInfo> {
    let mut result: Vec<IndexInfo> = indexes.to_vec();

    for action in actions {
        match action {
            IndexAction::Drop { name } => result.retain(|index| &index.name != name),
            IndexAction::Create { name, columns } => result.push(IndexInfo {
                name: name.to_string(),
                unique: false,
                columns: columns.iter().map(|c| c.to_string()).collect(),
            }),
        }
    }

    result
}

/// Reads the indexes of a table in the current database
pub async fn load_indexes(pool: &MySqlPool, table: &str) -> Result<Vec<IndexInfo>, sqlx::Error> {
    let rows = sqlx::query_as::<_, IndexColumnRow>(
        r#"
        SELECT INDEX_NAME AS index_name,
               CAST(NON_UNIQUE AS SIGNED) AS non_unique,
               COLUMN_NAME AS column_name,
               CAST(SEQ_IN_INDEX AS SIGNED) AS seq_in_index
        FROM information_schema.STATISTICS
        WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
        "#,
    )
    .bind(table)
    .fetch_all(pool)
    .await?;

    Ok(group_index_rows(rows))
}

/// Repairs the buyer tax-identifier indexes of one tenant database
///
/// Never fails: every problem is logged and returned as a warning.
pub async fn repair_buyer_tax_index(pool: &MySqlPool) -> Vec<SchemaWarning> {
    let indexes = match load_indexes(pool, BUYERS_TABLE).await {
        Ok(indexes) => indexes,
        Err(e) => {
            warn!(error = %e, "Could not inspect buyers indexes, skipping repair");
            return vec![SchemaWarning::new("inspect buyers indexes", &e)];
        }
    };

    if indexes.is_empty() {
        // Table missing: the migrations reported that already
        debug!("buyers table has no indexes, skipping repair");
        return Vec::new();
    }

    let actions = plan_repair(&indexes);

    if actions.is_empty() {
        debug!("Buyer tax-id indexes already in shape");
        return Vec::new();
    }

    let mut warnings = Vec::new();

    for action in &actions {
        let sql = action.to_sql();
        match sqlx::query(&sql).execute(pool).await {
            Ok(_) => info!(statement = %sql, "Buyer tax-id index repaired"),
            Err(e) => {
                warn!(statement = %sql, error = %e, "Buyer tax-id index repair step failed");
                warnings.push(SchemaWarning::new(&sql, &e));
            }
        }
    }

    warnings
}
