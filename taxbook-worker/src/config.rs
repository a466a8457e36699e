/// Configuration for the provisioning reconciler
///
/// # Environment Variables
///
/// - `RECONCILE_INTERVAL_SECONDS`: Pause between sweeps (default: 60)
/// - `DB_*`: database server and master database (see
///   [`DatabaseConfig::from_env`])
/// - `DB_GRANT_USER`, `DB_GRANT_HOST`: grantee for databases the
///   reconciler has to recreate (default: `DB_USER` at `%`)

use std::env;
use std::time::Duration;
use taxbook_shared::db::pool::DatabaseConfig;

/// Complete worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub reconciler: ReconcilerConfig,
    pub database: DatabaseConfig,
    pub grant_user: String,
    pub grant_host: String,
}

/// Reconciler loop settings
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Seconds to wait between sweeps
    pub interval_secs: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        ReconcilerConfig { interval_secs: 60 }
    }
}

impl ReconcilerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl WorkerConfig {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if `RECONCILE_INTERVAL_SECONDS` is not a number.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let interval_secs = match env::var("RECONCILE_INTERVAL_SECONDS") {
            Ok(raw) => raw.trim().parse::<u64>().map_err(|e| {
                anyhow::anyhow!("RECONCILE_INTERVAL_SECONDS must be a number: {}", e)
            })?,
            Err(_) => ReconcilerConfig::default().interval_secs,
        };

        let database = DatabaseConfig::from_env();
        let grant_user = env::var("DB_GRANT_USER").unwrap_or_else(|_| database.username.clone());
        let grant_host = env::var("DB_GRANT_HOST").unwrap_or_else(|_| "%".to_string());

        Ok(Self {
            reconciler: ReconcilerConfig { interval_secs },
            database,
            grant_user,
            grant_host,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_is_never_zero() {
        assert_eq!(ReconcilerConfig::default().interval(), Duration::from_secs(60));
        assert_eq!(
            ReconcilerConfig { interval_secs: 0 }.interval(),
            Duration::from_secs(1)
        );
    }
}
