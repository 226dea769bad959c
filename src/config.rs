use std::path::PathBuf;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    /// Table holding the user records.
    pub collection: String,
}

impl DbConfig {
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinioConfig {
    pub endpoint: String,
    pub user: String,
    pub password: String,
    pub bucket: String,
    pub use_ssl: bool,
    pub region: String,
}

impl MinioConfig {
    pub fn endpoint_url(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{}://{}", scheme, self.endpoint)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub host: String,
    pub port: u16,
    pub auth_service_addr: String,
    pub db: DbConfig,
    pub minio: MinioConfig,
}

impl AppConfig {
    /// Loads `CONFIG_PATH` (or `./.env`) into the environment, then reads settings from it.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var_os("CONFIG_PATH").map(PathBuf::from) {
            Some(path) => {
                dotenvy::from_path(&path).map_err(|_| ConfigError::Invalid {
                    key: "CONFIG_PATH",
                    value: path.display().to_string(),
                })?;
            }
            None => {
                dotenvy::dotenv().ok();
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let require = |key: &'static str| lookup(key).ok_or(ConfigError::Missing(key));

        let db = DbConfig {
            host: get("DB_HOST", "localhost"),
            port: parse(&lookup, "DB_PORT", 5432)?,
            user: get("DB_USER", "postgres"),
            password: require("DB_PASSWORD")?,
            database: get("DB_DATABASE", "users"),
            collection: identifier(get("DB_COLLECTION", "users"))?,
        };

        let minio = MinioConfig {
            endpoint: get("MINIO_ENDPOINT", "localhost:9000"),
            user: get("MINIO_ROOT_USER", "minio"),
            password: require("MINIO_ROOT_PASSWORD")?,
            bucket: get("MINIO_BUCKET_NAME", "users"),
            use_ssl: parse(&lookup, "MINIO_USE_SSL", false)?,
            region: get("MINIO_REGION", "us-east-1"),
        };

        Ok(Self {
            env: get("ENV", "prod"),
            host: get("APP_HOST", "0.0.0.0"),
            port: parse(&lookup, "PORT", 50055)?,
            auth_service_addr: get("AUTH_SERVICE_ADDR", "http://localhost:50051"),
            db,
            minio,
        })
    }

    #[cfg(test)]
    pub fn from_map(vars: &std::collections::HashMap<&str, &str>) -> Result<Self, ConfigError> {
        Self::from_lookup(|k| vars.get(k).map(|v| v.to_string()))
    }
}

fn parse<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value: v }),
    }
}

// The collection name is spliced into SQL, so only plain identifiers pass.
fn identifier(name: String) -> Result<String, ConfigError> {
    lazy_static! {
        static ref IDENT_RE: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").unwrap();
    }
    if IDENT_RE.is_match(&name) {
        Ok(name)
    } else {
        Err(ConfigError::Invalid {
            key: "DB_COLLECTION",
            value: name,
        })
    }
}
