use std::path::Path;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::okr::store::{HistoryOrder, PageRequest, DEFAULT_PAGE_SIZE};

pub const DEFAULT_CONFIG_FILE: &str = "okrserver.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub base_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            base_path: "/api/v1".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Unset means the in-memory store.
    pub url: Option<String>,
    pub max_connections: u32,
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            run_migrations: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: Option<String>,
    pub issuer: String,
    pub token_ttl_minutes: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            issuer: "okrserver".to_string(),
            token_ttl_minutes: 60 * 12,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryConfig {
    pub default_order: HistoryOrder,
    pub default_page_size: i64,
    pub max_page_size: i64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            default_order: HistoryOrder::Asc,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: 200,
        }
    }
}

impl AppConfig {
    /// Defaults, then the TOML file, then `OKR_*` environment variables.
    pub fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("OKR_").split("__"))
    }

    pub fn load() -> Result<Self, figment::Error> {
        let path = std::env::var("OKR_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::figment(path).extract()
    }

    pub fn database_url(&self) -> Option<String> {
        self.database
            .url
            .clone()
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .filter(|url| !url.trim().is_empty())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn page_request(&self, page: Option<i64>, size: Option<i64>) -> PageRequest {
        let size = size
            .unwrap_or(self.history.default_page_size)
            .min(self.history.max_page_size);
        PageRequest::new(page.unwrap_or(0), size)
    }
}
