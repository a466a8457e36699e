/// Database connection factory
///
/// This module builds MySQL connection pools for the master database, for an
/// arbitrary tenant database, or for the bare server (no database selected,
/// used to issue `CREATE DATABASE`).
///
/// Building a pool never touches the network: pools are created lazily and
/// the first query (normally [`health_check`]) is what actually authenticates.
/// Missing host or credentials therefore do not fail at startup; they surface
/// as a connectivity error the first time the pool is used.
///
/// # Example
///
/// ```no_run
/// use taxbook_shared::db::pool::{open_pool, ConnectionTarget, DatabaseConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = DatabaseConfig::from_env();
///
///     // Lazily built, authenticated by the health check inside open_pool
///     let master = open_pool(&config, ConnectionTarget::Master).await?;
///
///     let row: (i64,) = sqlx::query_as("SELECT ?")
///         .bind(42i64)
///         .fetch_one(&master)
///         .await?;
///
///     Ok(())
/// }
/// ```

use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use std::env;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Connection settings shared by every pool the process opens
///
/// Timeouts are in seconds for ease of configuration from environment variables.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// MySQL host
    pub host: String,

    /// MySQL port
    pub port: u16,

    /// User the application connects as
    pub username: String,

    /// Password for `username`
    pub password: String,

    /// Name of the master database (tenant registry, users, roles, audit)
    pub master_database: String,

    /// Maximum connections per pool
    ///
    /// Default: 5. Every tenant gets its own pool, so this stays small.
    pub max_connections: u32,

    /// Minimum number of idle connections kept open per pool
    ///
    /// Default: 0
    pub min_connections: u32,

    /// Timeout for acquiring a connection from the pool (seconds)
    ///
    /// Default: 30 seconds
    pub acquire_timeout_seconds: u64,

    /// How long a connection may sit idle before being closed (seconds)
    ///
    /// Default: Some(10)
    pub idle_timeout_seconds: Option<u64>,

    /// Maximum lifetime of a connection before forced recycling (seconds)
    ///
    /// Default: Some(1800) (30 minutes)
    pub max_lifetime_seconds: Option<u64>,

    /// Connection character set
    pub charset: String,

    /// Connection collation
    pub collation: String,

    /// Whether to ping connections before handing them out
    pub test_before_acquire: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            username: String::new(),
            password: String::new(),
            master_database: "fbr_master".to_string(),
            max_connections: 5,
            min_connections: 0,
            acquire_timeout_seconds: 30,
            idle_timeout_seconds: Some(10),
            max_lifetime_seconds: Some(1800),
            charset: "utf8mb4".to_string(),
            collation: "utf8mb4_unicode_ci".to_string(),
            test_before_acquire: true,
        }
    }
}

/// Which database a pool should be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionTarget<'a> {
    /// Server-level connection with no default database
    Server,

    /// The master database
    Master,

    /// A tenant database by physical name
    Tenant(&'a str),
}

impl ConnectionTarget<'_> {
    /// Database name used in log lines and errors ("" for the server target)
    pub fn label<'c>(&'c self, config: &'c DatabaseConfig) -> &'c str {
        match self {
            ConnectionTarget::Server => "",
            ConnectionTarget::Master => &config.master_database,
            ConnectionTarget::Tenant(name) => *name,
        }
    }
}

impl DatabaseConfig {
    /// Reads settings from the environment
    ///
    /// - `DB_HOST` (default `localhost`)
    /// - `DB_PORT` (default 3306)
    /// - `DB_USER`, `DB_PASSWORD` (default empty)
    /// - `DB_NAME`: master database (default `fbr_master`)
    /// - `DB_MAX_CONNECTIONS` (default 5)
    ///
    /// Never fails: missing credentials are reported when the first pool
    /// authenticates. An unparsable number falls back to its default.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            host: env::var("DB_HOST").unwrap_or(defaults.host),
            port: parse_env("DB_PORT", defaults.port),
            username: env::var("DB_USER").unwrap_or(defaults.username),
            password: env::var("DB_PASSWORD").unwrap_or(defaults.password),
            master_database: env::var("DB_NAME").unwrap_or(defaults.master_database),
            max_connections: parse_env("DB_MAX_CONNECTIONS", defaults.max_connections),
            ..defaults
        }
    }

    /// Builds connect options for a target
    ///
    /// Sessions run in UTC so `created_at` / `updated_at` round-trip as
    /// `DateTime<Utc>` without conversion.
    pub fn connect_options(&self, target: ConnectionTarget<'_>) -> MySqlConnectOptions {
        let options = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .password(&self.password)
            .charset(&self.charset)
            .collation(&self.collation)
            .timezone(Some(String::from("+00:00")));

        match target {
            ConnectionTarget::Server => options,
            ConnectionTarget::Master => options.database(&self.master_database),
            ConnectionTarget::Tenant(name) => options.database(name),
        }
    }

    /// Pool options derived from the configured limits
    pub fn pool_options(&self) -> MySqlPoolOptions {
        let mut pool_options = MySqlPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(Duration::from_secs(self.acquire_timeout_seconds))
            .test_before_acquire(self.test_before_acquire);

        if let Some(idle_timeout) = self.idle_timeout_seconds {
            pool_options = pool_options.idle_timeout(Duration::from_secs(idle_timeout));
        }

        if let Some(max_lifetime) = self.max_lifetime_seconds {
            pool_options = pool_options.max_lifetime(Duration::from_secs(max_lifetime));
        }

        pool_options
    }

    /// Builds a pool for `target` without opening any connection
    pub fn build_pool(&self, target: ConnectionTarget<'_>) -> MySqlPool {
        debug!(
            database = target.label(self),
            max_connections = self.max_connections,
            "Building lazy connection pool"
        );

        self.pool_options()
            .connect_lazy_with(self.connect_options(target))
    }
}

fn parse_env<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, value = %raw, "Ignoring unparsable environment value");
                default
            }
        },
        Err(_) => default,
    }
}

/// Builds a pool for `target` and authenticates it
///
/// # Errors
///
/// Returns the underlying sqlx error if the server is unreachable, the
/// credentials are rejected, or the database does not exist.
pub async fn open_pool(
    config: &DatabaseConfig,
    target: ConnectionTarget<'_>,
) -> Result<MySqlPool, sqlx::Error> {
    info!(
        database = target.label(config),
        host = %config.host,
        port = config.port,
        "Opening database connection pool"
    );

    let pool = config.build_pool(target);

    if let Err(e) = health_check(&pool).await {
        warn!(database = target.label(config), error = %e, "Database authentication failed");
        pool.close().await;
        return Err(e);
    }

    info!(database = target.label(config), "Database connection pool ready");
    Ok(pool)
}

/// Performs a health check on the pool
///
/// Executes `SELECT 1`, which forces a connection to be opened and
/// authenticated.
///
/// # Errors
///
/// Returns an error if the query fails
pub async fn health_check(pool: &MySqlPool) -> Result<(), sqlx::Error> {
    debug!("Performing database health check");

    let result: (i64,) = sqlx::query_as("SELECT CAST(1 AS SIGNED)")
        .fetch_one(pool)
        .await?;

    if result.0 == 1 {
        debug!("Database health check passed");
        Ok(())
    } else {
        warn!("Database health check returned unexpected value: {}", result.0);
        Err(sqlx::Error::Protocol(
            "Health check returned unexpected value".into(),
        ))
    }
}

/// Current pool statistics for monitoring
#[derive(Debug, Clone)]
pub struct PoolStats {
    /// Number of connections currently in use
    pub active_connections: usize,

    /// Number of idle connections available
    pub idle_connections: usize,

    /// Total connections in the pool
    pub total_connections: usize,
}

pub fn get_pool_stats(pool: &MySqlPool) -> PoolStats {
    let size = pool.size();
    let idle = pool.num_idle();

    PoolStats {
        active_connections: (size as usize).saturating_sub(idle),
        idle_connections: idle,
        total_connections: size as usize,
    }
}

/// Gracefully closes the connection pool
pub async fn close_pool(pool: &MySqlPool) {
    info!("Closing database connection pool");
    pool.close().await;
    info!("Database connection pool closed");
}
