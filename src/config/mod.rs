use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub security: SecurityConfig,
    pub credentials: Vec<CredentialConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Name of the backing table all built-in routes query.
    pub table: String,
    /// Attribute holding the delimited partition key.
    pub partition_attribute: String,
    /// Attribute holding the sort key.
    pub sort_attribute: String,
    /// Upper bound on items per range-query page.
    pub page_size: usize,
    /// Bounded timeout for a single store call, in milliseconds.
    pub timeout_ms: u64,
    /// Optional JSON seed file loaded into the in-memory store at startup.
    pub seed_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub cors_origins: Vec<String>,
}

/// One provisioned API key with its usage plan.
///
/// Credentials are provisioned out of band (here: configuration); the
/// service only reads them and tracks quota/throttle state at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialConfig {
    pub id: String,
    /// Admissions allowed per calendar month.
    pub quota_limit: u64,
    /// Token bucket capacity.
    pub burst_capacity: u32,
    /// Sustained token refill rate per second.
    pub rate_per_sec: f64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("FACADE_PORT") {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }

        // Store overrides
        if let Ok(v) = env::var("STORE_TABLE") {
            self.store.table = v;
        }
        if let Ok(v) = env::var("STORE_PARTITION_ATTRIBUTE") {
            self.store.partition_attribute = v;
        }
        if let Ok(v) = env::var("STORE_SORT_ATTRIBUTE") {
            self.store.sort_attribute = v;
        }
        if let Ok(v) = env::var("STORE_PAGE_SIZE") {
            self.store.page_size = v.parse().unwrap_or(self.store.page_size);
        }
        if let Ok(v) = env::var("STORE_TIMEOUT_MS") {
            self.store.timeout_ms = v.parse().unwrap_or(self.store.timeout_ms);
        }
        if let Ok(v) = env::var("STORE_SEED_PATH") {
            self.store.seed_path = Some(v);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }

        // Credential overrides: "id:quota:burst:rate,id:quota:burst:rate"
        if let Ok(v) = env::var("FACADE_API_KEYS") {
            match parse_credentials(&v) {
                Ok(creds) => self.credentials = creds,
                Err(e) => tracing::warn!("ignoring malformed FACADE_API_KEYS: {}", e),
            }
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig { port: 3000 },
            store: StoreConfig {
                table: "texts".to_string(),
                partition_attribute: "collection".to_string(),
                sort_attribute: "id".to_string(),
                page_size: 100,
                timeout_ms: 5_000,
                seed_path: None,
            },
            security: SecurityConfig {
                cors_origins: vec![
                    "http://localhost:3000".to_string(),
                    "http://localhost:5173".to_string(),
                ],
            },
            credentials: vec![CredentialConfig {
                id: "dev-key".to_string(),
                quota_limit: 1_000_000,
                burst_capacity: 50,
                rate_per_sec: 25.0,
            }],
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig { port: 3000 },
            store: StoreConfig {
                table: "texts".to_string(),
                partition_attribute: "collection".to_string(),
                sort_attribute: "id".to_string(),
                page_size: 100,
                timeout_ms: 2_000,
                seed_path: None,
            },
            security: SecurityConfig {
                cors_origins: vec!["https://scrollbible.app".to_string()],
            },
            // Production keys come from FACADE_API_KEYS; no default key.
            credentials: vec![],
        }
    }
}

/// Parse the `FACADE_API_KEYS` encoding: `id:quota:burst:rate` entries
/// joined with commas.
fn parse_credentials(raw: &str) -> Result<Vec<CredentialConfig>, String> {
    let mut creds = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let parts: Vec<&str> = entry.split(':').collect();
        if parts.len() != 4 {
            return Err(format!("expected id:quota:burst:rate, got '{}'", entry));
        }
        let quota_limit = parts[1]
            .parse()
            .map_err(|_| format!("bad quota in '{}'", entry))?;
        let burst_capacity = parts[2]
            .parse()
            .map_err(|_| format!("bad burst in '{}'", entry))?;
        let rate_per_sec = parts[3]
            .parse()
            .map_err(|_| format!("bad rate in '{}'", entry))?;
        creds.push(CredentialConfig {
            id: parts[0].to_string(),
            quota_limit,
            burst_capacity,
            rate_per_sec,
        });
    }
    Ok(creds)
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert_eq!(config.store.table, "texts");
        assert_eq!(config.credentials.len(), 1);
        assert_eq!(config.credentials[0].id, "dev-key");
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        assert!(config.credentials.is_empty());
        assert_eq!(config.store.timeout_ms, 2_000);
    }

    #[test]
    fn test_parse_credentials() {
        let creds = parse_credentials("public:1000000:20:10, partner:5000:5:0.5").unwrap();
        assert_eq!(creds.len(), 2);
        assert_eq!(creds[0].id, "public");
        assert_eq!(creds[0].quota_limit, 1_000_000);
        assert_eq!(creds[1].burst_capacity, 5);
        assert!((creds[1].rate_per_sec - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_credentials_rejects_short_entry() {
        assert!(parse_credentials("public:1000").is_err());
    }
}
