use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub connection_timeout: u64,
    pub auto_migrate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub public_base_url: String,
    pub default_page_size: i64,
    pub max_page_size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(skip_serializing, default)]
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
    pub refresh_window_hours: u64,
    pub bcrypt_cost: u32,
    pub min_password_length: usize,
    pub allow_registration: bool,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub upload_dir: String,
    pub default_limit_bytes: i64,
    pub max_upload_bytes: usize,
}

const DEV_JWT_SECRET: &str = "demo-hub-development-secret";

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }
        if let Ok(v) = env::var("DATABASE_AUTO_MIGRATE") {
            self.database.auto_migrate = v.parse().unwrap_or(self.database.auto_migrate);
        }

        // API overrides
        if let Some(port) = env::var("DEMO_HUB_PORT")
            .ok()
            .or_else(|| env::var("PORT").ok())
            .and_then(|s| s.parse::<u16>().ok())
        {
            self.api.port = port;
        }
        if let Ok(v) = env::var("API_PUBLIC_BASE_URL") {
            self.api.public_base_url = v.trim_end_matches('/').to_string();
        }
        if let Ok(v) = env::var("API_DEFAULT_PAGE_SIZE") {
            self.api.default_page_size = v.parse().unwrap_or(self.api.default_page_size);
        }
        if let Ok(v) = env::var("API_MAX_PAGE_SIZE") {
            self.api.max_page_size = v.parse().unwrap_or(self.api.max_page_size);
        }

        // Security overrides
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }
        if let Ok(v) = env::var("SECURITY_REFRESH_WINDOW_HOURS") {
            self.security.refresh_window_hours = v.parse().unwrap_or(self.security.refresh_window_hours);
        }
        if let Ok(v) = env::var("SECURITY_BCRYPT_COST") {
            self.security.bcrypt_cost = v.parse().unwrap_or(self.security.bcrypt_cost);
        }
        if let Ok(v) = env::var("SECURITY_MIN_PASSWORD_LENGTH") {
            self.security.min_password_length = v.parse().unwrap_or(self.security.min_password_length);
        }
        if let Ok(v) = env::var("SECURITY_ALLOW_REGISTRATION") {
            self.security.allow_registration = v.parse().unwrap_or(self.security.allow_registration);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // Storage overrides
        if let Ok(v) = env::var("STORAGE_UPLOAD_DIR") {
            self.storage.upload_dir = v;
        }
        if let Ok(v) = env::var("STORAGE_DEFAULT_LIMIT_BYTES") {
            self.storage.default_limit_bytes = positive_or(&v, self.storage.default_limit_bytes);
        }
        if let Ok(v) = env::var("STORAGE_MAX_UPLOAD_BYTES") {
            self.storage.max_upload_bytes = positive_or(&v, self.storage.max_upload_bytes);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                max_connections: 10,
                connection_timeout: 30,
                auto_migrate: true,
            },
            api: ApiConfig {
                port: 3000,
                public_base_url: "http://localhost:3000".to_string(),
                default_page_size: 25,
                max_page_size: 200,
            },
            security: SecurityConfig {
                jwt_secret: DEV_JWT_SECRET.to_string(),
                jwt_expiry_hours: 24 * 7, // 1 week
                refresh_window_hours: 24 * 30,
                bcrypt_cost: 4,
                min_password_length: 8,
                allow_registration: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
            },
            storage: StorageConfig {
                upload_dir: "./uploads".to_string(),
                default_limit_bytes: 1024 * 1024 * 1024, // 1GB
                max_upload_bytes: 100 * 1024 * 1024,     // 100MB
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                max_connections: 20,
                connection_timeout: 10,
                auto_migrate: true,
            },
            api: ApiConfig {
                port: 3000,
                public_base_url: "https://staging.demohub.example.com".to_string(),
                default_page_size: 25,
                max_page_size: 100,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 24,
                refresh_window_hours: 24 * 7,
                bcrypt_cost: 10,
                min_password_length: 10,
                allow_registration: true,
                cors_origins: vec!["https://staging.demohub.example.com".to_string()],
            },
            storage: StorageConfig {
                upload_dir: "/var/lib/demo-hub/uploads".to_string(),
                default_limit_bytes: 1024 * 1024 * 1024,
                max_upload_bytes: 100 * 1024 * 1024,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                max_connections: 50,
                connection_timeout: 5,
                auto_migrate: false,
            },
            api: ApiConfig {
                port: 3000,
                public_base_url: "https://demohub.example.com".to_string(),
                default_page_size: 25,
                max_page_size: 100,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 8,
                refresh_window_hours: 24 * 7,
                bcrypt_cost: 12,
                min_password_length: 12,
                allow_registration: false,
                cors_origins: vec!["https://demohub.example.com".to_string()],
            },
            storage: StorageConfig {
                upload_dir: "/var/lib/demo-hub/uploads".to_string(),
                default_limit_bytes: 5 * 1024 * 1024 * 1024, // 5GB
                max_upload_bytes: 500 * 1024 * 1024,         // 500MB
            },
        }
    }

    /// Public URL under which uploaded files are served
    pub fn uploads_base_url(&self) -> String {
        format!("{}/uploads", self.api.public_base_url)
    }

    /// Public URL a prospect opens for a share token
    pub fn share_url(&self, token: &str) -> String {
        format!("{}/share/{}", self.api.public_base_url, token)
    }
}

/// Parsed override when it is a number above zero, otherwise the current value
fn positive_or<T>(raw: &str, current: T) -> T
where
    T: std::str::FromStr + PartialOrd + Default,
{
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => value,
        _ => {
            tracing::warn!("Ignoring non-positive or invalid size '{}'", raw);
            current
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_production {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Production)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert!(config.security.allow_registration);
        assert_eq!(config.security.jwt_secret, DEV_JWT_SECRET);
        assert!(config.database.auto_migrate);
        assert_eq!(config.api.default_page_size, 25);
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        assert!(!config.security.allow_registration);
        // production must be given a secret explicitly
        assert!(config.security.jwt_secret.is_empty());
        assert!(!config.database.auto_migrate);
        assert!(config.security.bcrypt_cost >= 12);
    }

    #[test]
    fn test_public_urls() {
        let config = AppConfig::development();
        assert_eq!(config.uploads_base_url(), "http://localhost:3000/uploads");
        assert_eq!(config.share_url("abc"), "http://localhost:3000/share/abc");
    }

    #[test]
    fn test_size_overrides_must_be_positive() {
        assert_eq!(positive_or("2048", 1024i64), 2048);
        assert_eq!(positive_or("0", 1024i64), 1024);
        assert_eq!(positive_or("-5", 1024i64), 1024);
        assert_eq!(positive_or("lots", 1024i64), 1024);
        assert_eq!(positive_or("0", 10usize), 10);
    }

    #[test]
    fn test_secret_not_serialized() {
        let config = AppConfig::development();
        let value = serde_json::to_value(&config).unwrap();
        assert!(value["security"].get("jwt_secret").is_none());
    }
}
