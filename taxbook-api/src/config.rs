/// Configuration management for the API server
///
/// This module loads configuration from environment variables and provides
/// a type-safe configuration struct.
///
/// # Environment Variables
///
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `API_PORT`: Port to bind to (default: 8080)
/// - `CORS_ORIGINS`: Comma-separated allowed origins (default: any)
/// - `DB_HOST`, `DB_PORT`, `DB_USER`, `DB_PASSWORD`, `DB_NAME`: database
///   server and master database (see [`DatabaseConfig::from_env`])
/// - `DB_GRANT_USER`: account granted access to new tenant databases
///   (default: `DB_USER`)
/// - `RUST_LOG`: Log level (default: info)
///
/// # Example
///
/// ```no_run
/// use taxbook_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use std::env;
use taxbook_shared::db::pool::DatabaseConfig;

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Database server and master database
    pub database: DatabaseConfig,

    /// Tenant provisioning settings
    pub provisioning: ProvisioningConfig,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Allowed CORS origins; empty means any origin
    pub cors_origins: Vec<String>,
}

/// Tenant provisioning configuration
#[derive(Debug, Clone)]
pub struct ProvisioningConfig {
    /// Account granted privileges on new tenant databases
    pub grant_user: String,

    /// Host part of the grantee account
    pub grant_host: String,
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if `API_PORT` is not a valid port number. Missing
    /// database credentials are not an error here; they surface when the
    /// first connection authenticates.
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        let api_host = env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let api_port = env::var("API_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .map_err(|e| anyhow::anyhow!("API_PORT must be a port number: {}", e))?;

        let cors_origins = parse_origins(&env::var("CORS_ORIGINS").unwrap_or_default());

        let database = DatabaseConfig::from_env();

        let grant_user = env::var("DB_GRANT_USER").unwrap_or_else(|_| database.username.clone());
        let grant_host = env::var("DB_GRANT_HOST").unwrap_or_else(|_| "%".to_string());

        Ok(Self {
            api: ApiConfig {
                host: api_host,
                port: api_port,
                cors_origins,
            },
            database,
            provisioning: ProvisioningConfig {
                grant_user,
                grant_host,
            },
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty() && *origin != "*")
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_address() {
        let config = Config {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                cors_origins: Vec::new(),
            },
            database: DatabaseConfig::default(),
            provisioning: ProvisioningConfig {
                grant_user: "fbr".to_string(),
                grant_host: "%".to_string(),
            },
        };

        assert_eq!(config.bind_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_parse_origins() {
        assert!(parse_origins("").is_empty());
        assert!(parse_origins("*").is_empty());
        assert_eq!(
            parse_origins("http://localhost:3000, https://app.example.pk ,"),
            vec!["http://localhost:3000", "https://app.example.pk"]
        );
    }
}
