use envconfig::Envconfig;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Where users and posts are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::Postgres => f.write_str("postgres"),
            StorageBackend::Memory => f.write_str("memory"),
        }
    }
}

#[derive(Envconfig, Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[envconfig(from = "DATABASE_URL", default = "postgresql://localhost/forum_moderation")]
    pub database_url: String,

    #[envconfig(from = "STORAGE", default = "postgres")]
    pub storage: StorageBackend,

    #[envconfig(from = "HTTP_PORT", default = "4000")]
    pub http_port: u16,

    #[envconfig(from = "TOKEN_SECRET", default = "change-me-in-production")]
    pub token_secret: String,

    #[envconfig(from = "TOKEN_TTL_SECONDS", default = "604800")] // 7 days
    pub token_ttl_seconds: i64,

    #[envconfig(from = "APPEAL_URL", default = "https://discord.gg/dear-diary-expense-tracker")]
    pub appeal_url: String,

    #[envconfig(from = "MAX_DB_CONNECTIONS", default = "5")]
    pub max_db_connections: u32,

    #[envconfig(from = "MAX_BODY_BYTES", default = "1048576")] // 1MB
    pub max_body_bytes: usize,

    /// Allowed browser origin; `*` allows any.
    #[envconfig(from = "CORS_ORIGIN", default = "*")]
    pub cors_origin: String,

    #[envconfig(from = "SEED_ADMIN_USERNAME", default = "admin")]
    pub seed_admin_username: String,

    #[envconfig(from = "RUST_LOG", default = "info")]
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self, envconfig::Error> {
        Self::init_from_env()
    }

    /// Settings for tests and local runs: in-memory storage, fixed secret.
    pub fn for_tests() -> Self {
        Self {
            database_url: String::new(),
            storage: StorageBackend::Memory,
            http_port: 0,
            token_secret: "test-secret".to_string(),
            token_ttl_seconds: 3600,
            appeal_url: "https://discord.gg/dear-diary-expense-tracker".to_string(),
            max_db_connections: 1,
            max_body_bytes: 1024 * 1024,
            cors_origin: "*".to_string(),
            seed_admin_username: "admin".to_string(),
            log_level: "debug".to_string(),
        }
    }
}
