// src/config.rs - Configuration management
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::fs;
use anyhow::{Context, Result};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub inventory: InventoryConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
    pub keep_alive: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: u64,
}

/// Business constants for blood units.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InventoryConfig {
    /// Red cell shelf life, counted from the collection date.
    pub shelf_life_days: i64,
    pub expiring_soon_days: i64,
    pub unit_prefix: String,
    pub collection_site: String,
    pub storage_location: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    pub max_request_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            workers: None,
            keep_alive: 30,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:bloodbank.db".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: 30,
        }
    }
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            shelf_life_days: 42,
            expiring_soon_days: 7,
            unit_prefix: "PRC".to_string(),
            collection_site: "Main Blood Bank".to_string(),
            storage_location: "Main Storage".to_string(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
            max_request_size: 1024 * 1024,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            inventory: InventoryConfig::default(),
            security: SecurityConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.inventory.shelf_life_days <= 0 {
            return Err(anyhow::anyhow!(
                "inventory.shelf_life_days must be positive (current: {})",
                self.inventory.shelf_life_days
            ));
        }

        if self.inventory.expiring_soon_days < 0 {
            return Err(anyhow::anyhow!("inventory.expiring_soon_days cannot be negative"));
        }

        let prefix = &self.inventory.unit_prefix;
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(anyhow::anyhow!(
                "inventory.unit_prefix must be non-empty and alphanumeric (current: '{}')",
                prefix
            ));
        }

        if self.database.max_connections < self.database.min_connections {
            return Err(anyhow::anyhow!(
                "max_connections ({}) must be >= min_connections ({})",
                self.database.max_connections,
                self.database.min_connections
            ));
        }

        Ok(())
    }

    pub fn is_production(&self) -> bool {
        env::var("BLOODBANK_ENV").map(|v| v == "production").unwrap_or(false)
    }

    pub fn print_startup_info(&self) {
        log::info!("Blood bank service starting up...");
        log::info!("Server: {}:{}", self.server.host, self.server.port);
        log::info!("Database: {}", self.database.url);
        log::info!(
            "Inventory: shelf life {} days, unit prefix {}",
            self.inventory.shelf_life_days,
            self.inventory.unit_prefix
        );
        log::info!("Logging: {} level", self.logging.level);

        if !self.is_production() {
            log::warn!("Running in development mode");
        }
    }
}

pub fn load_config() -> Result<Config> {
    load_env_file()?;

    let mut config = if let Ok(config_file) = env::var("CONFIG_FILE") {
        parse_config_file(Path::new(&config_file))?
    } else {
        Config::default()
    };

    apply_overrides(&mut config, |key| env::var(key).ok());

    config.validate()
        .context("Configuration validation failed")?;

    Ok(config)
}

pub fn parse_config_file(path: &Path) -> Result<Config> {
    let config_str = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&config_str)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Applies `KEY=value` overrides; unparsable numbers are ignored.
pub fn apply_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("BIND_ADDRESS") {
        config.server.host = host;
    }
    if let Some(port) = lookup("BLOODBANK_PORT").and_then(|v| v.parse::<u16>().ok()) {
        config.server.port = port;
    }
    if let Some(workers) = lookup("BLOODBANK_WORKERS").and_then(|v| v.parse::<usize>().ok()) {
        config.server.workers = Some(workers);
    }
    if let Some(url) = lookup("DATABASE_URL") {
        config.database.url = url;
    }
    if let Some(max_conn) = lookup("DATABASE_MAX_CONNECTIONS").and_then(|v| v.parse::<u32>().ok()) {
        config.database.max_connections = max_conn;
    }
    if let Some(min_conn) = lookup("DATABASE_MIN_CONNECTIONS").and_then(|v| v.parse::<u32>().ok()) {
        config.database.min_connections = min_conn;
    }
    if let Some(days) = lookup("INVENTORY_SHELF_LIFE_DAYS").and_then(|v| v.parse::<i64>().ok()) {
        config.inventory.shelf_life_days = days;
    }
    if let Some(days) = lookup("INVENTORY_EXPIRING_SOON_DAYS").and_then(|v| v.parse::<i64>().ok()) {
        config.inventory.expiring_soon_days = days;
    }
    if let Some(site) = lookup("INVENTORY_COLLECTION_SITE") {
        config.inventory.collection_site = site;
    }
    if let Some(location) = lookup("INVENTORY_STORAGE_LOCATION") {
        config.inventory.storage_location = location;
    }
    if let Some(origins) = lookup("ALLOWED_ORIGINS") {
        config.security.allowed_origins = origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Some(level) = lookup("RUST_LOG") {
        config.logging.level = level;
    }
}

pub fn load_env_file() -> Result<()> {
    if let Ok(env_file) = env::var("ENV_FILE") {
        dotenvy::from_filename(&env_file)
            .with_context(|| format!("Failed to load environment file: {}", env_file))?;
    } else if Path::new(".env").exists() {
        dotenvy::dotenv().context("Failed to load .env file")?;
    }
    Ok(())
}
