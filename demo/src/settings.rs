use anyhow::{Context, Result};
use docrepo::ConnectionConfig;
use serde::{Deserialize, Serialize};

/// 演示程序配置：`docrepo.toml`（可选）叠加 `DOCREPO__*` 环境变量
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_level")]
    pub level: String,
    /// `pretty` 或 `json`
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .set_default(
                "connection.connection_string",
                "AccountEndpoint=memory://local;AccountKey=ZGVtbw==;",
            )?
            .set_default("connection.database", "demo")?
            .set_default("connection.containers", vec!["customers"])?
            .add_source(config::File::with_name("docrepo").required(false))
            .add_source(
                config::Environment::with_prefix("DOCREPO")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("failed to build settings")?;

        config
            .try_deserialize()
            .context("failed to deserialize settings")
    }
}

fn default_level() -> String {
    "info,docrepo=debug".to_string()
}

fn default_format() -> String {
    "pretty".to_string()
}
