//! Configuration module for fee-service.

use crate::models::ResolutionStrategy;
use crate::services::EngineSettings;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone)]
pub struct FeeConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub currency: String,
    pub default_strategy: ResolutionStrategy,
}

impl EngineConfig {
    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            currency: self.currency.clone(),
            default_strategy: self.default_strategy,
        }
    }
}

impl FeeConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "fee-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            },
            engine: EngineConfig {
                currency: env::var("FEE_CURRENCY").unwrap_or_else(|_| "KES".to_string()),
                default_strategy: parse_strategy(env::var("FEE_DEFAULT_STRATEGY").ok())?,
            },
        })
    }
}

fn parse_strategy(value: Option<String>) -> Result<ResolutionStrategy, AppError> {
    match value.as_deref().map(str::trim) {
        None | Some("") | Some("merge") => Ok(ResolutionStrategy::Merge),
        Some("override") => Ok(ResolutionStrategy::Override),
        Some(other) => Err(AppError::ConfigError(anyhow::anyhow!(
            "FEE_DEFAULT_STRATEGY must be 'merge' or 'override', got '{}'",
            other
        ))),
    }
}
