use std::collections::HashMap;

use anyhow::{Context, Result};
use log::*;
use r2d2::Pool;
use r2d2_postgres::{PostgresConnectionManager, TlsMode};
use serde::{Deserialize, Serialize};
use url::Url;

use infra::persistence::RecordConnectionManager;

pub const DEFAULT_ADDONS_CATEGORY: &str = "add-ons";
const DEFAULT_POOL_SIZE: u32 = 4;
const ENV_PREFIX: &str = "CMS_";

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct Config {
    pub postgres: PostgresConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct PostgresConfig {
    pub url: String,
    #[serde(default)]
    pub pool_size: Option<u32>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CatalogConfig {
    /// Products in this category never get recipes.
    #[serde(default = "default_addons_category")]
    pub addons_category: String,
}

/// `CMS_POSTGRES_URL` and `CMS_POOL_SIZE`.
#[derive(Deserialize, Debug, Default)]
struct EnvOverrides {
    postgres_url: Option<String>,
    pool_size: Option<u32>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "lowercase")]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Deserialize, Debug, Default)]
pub struct EnvLogger {
    level: Option<LogLevel>,
    #[serde(default)]
    modules: HashMap<String, LogLevel>,
    #[serde(default)]
    timestamp_nanos: bool,
}

fn default_addons_category() -> String {
    DEFAULT_ADDONS_CATEGORY.to_string()
}

impl Default for CatalogConfig {
    fn default() -> Self {
        CatalogConfig {
            addons_category: default_addons_category(),
        }
    }
}

impl Config {
    pub fn with_env_overrides(mut self) -> Result<Self> {
        let overrides = envy::prefixed(ENV_PREFIX)
            .from_env::<EnvOverrides>()
            .context("Read CMS_ environment")?;
        if let Some(url) = overrides.postgres_url {
            debug!("Database url from environment");
            self.postgres.url = url;
        }
        if let Some(size) = overrides.pool_size {
            self.postgres.pool_size = Some(size);
        }
        Ok(self)
    }
}

impl PostgresConfig {
    fn checked_url(&self) -> Result<Url> {
        let url = Url::parse(&self.url).context("Parse postgres url")?;
        match url.scheme() {
            "postgres" | "postgresql" => Ok(url),
            other => Err(anyhow::anyhow!("Unsupported database scheme: {:?}", other)),
        }
    }

    pub(crate) fn build(&self) -> Result<Pool<RecordConnectionManager>> {
        let url = self.checked_url()?;
        debug!("Build pool for {}:{:?}", url.host_str().unwrap_or(""), url.port());

        let manager = PostgresConnectionManager::new(url.as_str(), TlsMode::None)
            .context("Postgres connection parameters")?;
        let builder = r2d2::Pool::builder().max_size(self.pool_size.unwrap_or(DEFAULT_POOL_SIZE));

        debug!("Pool builder: {:?}", builder);
        let pool = builder
            .build(RecordConnectionManager::new(manager))
            .context("build pool")?;

        Ok(pool)
    }
}

impl LogLevel {
    fn to_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

impl EnvLogger {
    pub fn builder(&self) -> env_logger::Builder {
        let mut b = env_logger::Builder::from_default_env();
        if let Some(level) = self.level.as_ref() {
            b.filter_level(level.to_filter());
        }

        for (module, level) in self.modules.iter() {
            b.filter_module(&module, level.to_filter());
        }

        if self.timestamp_nanos {
            b.format_timestamp_nanos();
        }

        b
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn catalog_section_is_optional() {
        let config: Config = toml::from_str(
            r#"
            [postgres]
            url = "postgres://cms@localhost/cms"
            "#,
        )
        .expect("parse");

        assert_eq!(config.catalog.addons_category, DEFAULT_ADDONS_CATEGORY);
        assert_eq!(config.postgres.pool_size, None);
    }

    #[test]
    fn reads_every_section() {
        let config: Config = toml::from_str(
            r#"
            [postgres]
            url = "postgres://cms@localhost/cms"
            pool_size = 8

            [catalog]
            addons_category = "Extras"
            "#,
        )
        .expect("parse");

        assert_eq!(config.postgres.pool_size, Some(8));
        assert_eq!(config.catalog.addons_category, "Extras");
    }

    #[test]
    fn rejects_non_postgres_urls() {
        let config = PostgresConfig {
            url: "mysql://localhost/cms".to_string(),
            pool_size: None,
        };
        assert!(config.checked_url().is_err());

        let config = PostgresConfig {
            url: "not a url".to_string(),
            pool_size: None,
        };
        assert!(config.checked_url().is_err());
    }

    #[test]
    fn env_logger_section_accepts_levels() {
        let logger: EnvLogger = toml::from_str(
            r#"
            level = "info"
            timestamp_nanos = true
            [modules]
            backoffice = "debug"
            "#,
        )
        .expect("parse");

        assert_eq!(logger.level.map(|l| l.to_filter()), Some(log::LevelFilter::Info));
        assert_eq!(logger.modules.len(), 1);
    }
}
