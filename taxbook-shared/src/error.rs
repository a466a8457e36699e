/// Error types for tenant lifecycle operations
///
/// `TenantError` is the single failure type surfaced by the lifecycle manager
/// and its collaborators. Request handlers translate each variant into an
/// HTTP response; the reconciler logs them.
///
/// Non-fatal schema problems are *not* errors: they are collected as
/// [`SchemaWarning`](crate::schema::SchemaWarning) values and logged.

use crate::models::tenant::ProvisioningState;
use sqlx::mysql::MySqlDatabaseError;

/// Tenant lifecycle error
#[derive(Debug, thiserror::Error)]
pub enum TenantError {
    /// Cannot reach or authenticate against a database
    #[error("Cannot connect to database `{database}`: {source}")]
    Connectivity {
        /// Database that was being opened (empty for the server bootstrap connection)
        database: String,
        #[source]
        source: sqlx::Error,
    },

    /// Tax identifier or database name already taken
    #[error("Tenant already exists: {0}")]
    DuplicateTenant(String),

    /// No active registry row matches the lookup key
    #[error("Tenant not found: {0}")]
    NotFound(String),

    /// Provisioning stopped after the database was created but before the
    /// schema was ready
    #[error("Provisioning of `{database_name}` stopped at {state}: {source}")]
    PartialProvisioning {
        database_name: String,
        state: ProvisioningState,
        #[source]
        source: Box<TenantError>,
    },

    /// Tenant input failed validation
    #[error("Invalid tenant input: {0}")]
    Validation(String),

    /// Any other database failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result alias for tenant operations
pub type TenantResult<T> = Result<T, TenantError>;

impl TenantError {
    /// Wraps an error raised while opening `database` into the right variant
    ///
    /// Transport failures, pool timeouts and MySQL authentication / unknown
    /// database errors become [`TenantError::Connectivity`]; everything else
    /// stays a plain database error.
    pub fn from_connect(database: &str, err: sqlx::Error) -> Self {
        if is_connectivity_error(&err) {
            TenantError::Connectivity {
                database: database.to_string(),
                source: err,
            }
        } else {
            TenantError::Database(err)
        }
    }

    /// Wraps a step failure into a partial provisioning error
    pub fn partial(database_name: &str, state: ProvisioningState, source: TenantError) -> Self {
        TenantError::PartialProvisioning {
            database_name: database_name.to_string(),
            state,
            source: Box::new(source),
        }
    }
}

/// MySQL server error numbers that mean "this database cannot be reached as configured"
///
/// 1044 access denied to database, 1045 access denied for user,
/// 1049 unknown database.
const CONNECTIVITY_ERRNOS: &[u16] = &[1044, 1045, 1049];

/// MySQL server error number for a duplicate key
const DUPLICATE_KEY_ERRNO: u16 = 1062;

fn mysql_errno(err: &sqlx::Error) -> Option<u16> {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .try_downcast_ref::<MySqlDatabaseError>()
            .map(|mysql_err| mysql_err.number()),
        _ => None,
    }
}

/// Whether a sqlx error means the database is unreachable
pub fn is_connectivity_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Configuration(_) => true,
        sqlx::Error::Database(_) => mysql_errno(err)
            .map(|errno| CONNECTIVITY_ERRNOS.contains(&errno))
            .unwrap_or(false),
        _ => false,
    }
}

/// Whether a sqlx error is a unique-key violation (MySQL 1062)
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation() || mysql_errno(err) == Some(DUPLICATE_KEY_ERRNO)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_connectivity() {
        let err = TenantError::from_connect("tenant_a", sqlx::Error::PoolTimedOut);
        assert!(matches!(err, TenantError::Connectivity { ref database, .. } if database == "tenant_a"));
    }

    #[test]
    fn test_row_not_found_is_not_connectivity() {
        let err = TenantError::from_connect("tenant_a", sqlx::Error::RowNotFound);
        assert!(matches!(err, TenantError::Database(_)));
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn test_partial_provisioning_display() {
        let err = TenantError::partial(
            "tenant_x",
            ProvisioningState::DbCreated,
            TenantError::Validation("boom".to_string()),
        );
        assert_eq!(
            err.to_string(),
            "Provisioning of `tenant_x` stopped at db_created: Invalid tenant input: boom"
        );
    }
}
