//! Layered configuration: optional TOML file, then `QRLINK_*` environment variables.

use anyhow::{Context, Result};
use config::{Config, File as ConfigFile};
use qrlink_invites::{
    InviteLedger, InviteLinks, TokenGenerator, DEFAULT_SERVER_ORIGIN, DEFAULT_TOKEN_LENGTH,
};
use qrlink_storage::{MemoryStorage, SledStorage};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DEFAULT_CONFIG_PATH: &str = "config/qrlink.toml";
pub const ENV_PREFIX: &str = "QRLINK";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sled,
}

impl StorageBackend {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "memory" | "mem" => Ok(StorageBackend::Memory),
            "sled" => Ok(StorageBackend::Sled),
            other => anyhow::bail!("unknown storage backend '{other}' (expected memory or sled)"),
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            StorageBackend::Memory => "memory",
            StorageBackend::Sled => "sled",
        };
        f.write_str(value)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AppConfig {
    pub config_path: Option<PathBuf>,
    pub server_origin: String,
    pub storage_backend: StorageBackend,
    pub token_length: usize,
    pub log_level: String,
    pub log_format: String,
}

impl AppConfig {
    pub fn load(config_path_override: Option<&Path>) -> Result<Self> {
        let resolved_path = if let Some(path) = config_path_override {
            if !path.exists() {
                anyhow::bail!(
                    "Configuration file {} not found (specified via --config)",
                    path.display()
                );
            }
            Some(path.to_path_buf())
        } else {
            let path = PathBuf::from(DEFAULT_CONFIG_PATH);
            if path.exists() {
                Some(path)
            } else {
                None
            }
        };

        let mut builder = Config::builder();

        if let Some(path) = &resolved_path {
            builder = builder.add_source(ConfigFile::from(path.as_path()));
        }

        builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX));

        let config = builder.build()?;
        Self::from_config(&config, resolved_path)
    }

    pub fn from_config(config: &Config, config_path: Option<PathBuf>) -> Result<Self> {
        let storage_backend =
            match get_string_value(config, &["STORAGE_BACKEND", "storage_backend", "storage.backend"])
            {
                Some(value) => StorageBackend::parse(&value)?,
                None => StorageBackend::Memory,
            };

        let token_length = match get_string_value(
            config,
            &["TOKEN_LENGTH", "token_length", "invites.token_length"],
        ) {
            Some(value) => value
                .parse()
                .with_context(|| format!("invalid token length '{value}'"))?,
            None => DEFAULT_TOKEN_LENGTH,
        };

        Ok(Self {
            config_path,
            server_origin: get_string_value(
                config,
                &["SERVER_ORIGIN", "server_origin", "server.origin"],
            )
            .unwrap_or_else(|| DEFAULT_SERVER_ORIGIN.to_string()),
            storage_backend,
            token_length,
            log_level: get_string_value(config, &["LOG_LEVEL", "log_level", "log.level"])
                .unwrap_or_else(|| "info".to_string()),
            log_format: get_string_value(config, &["LOG_FORMAT", "log_format", "log.format"])
                .unwrap_or_else(|| "pretty".to_string()),
        })
    }

    pub fn links(&self) -> InviteLinks {
        InviteLinks::new(self.server_origin.as_str())
    }

    /// Fresh ledger over the configured transient backend.
    pub fn build_ledger(&self) -> Result<InviteLedger> {
        let tokens = TokenGenerator::with_length(self.token_length)?;
        let ledger = match self.storage_backend {
            StorageBackend::Memory => InviteLedger::with_store(Arc::new(MemoryStorage::new())),
            StorageBackend::Sled => InviteLedger::with_store(Arc::new(
                SledStorage::temporary().context("failed to open temporary sled store")?,
            )),
        };
        Ok(ledger.with_token_generator(tokens))
    }
}

fn get_string_value(config: &Config, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        config
            .get_string(key)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;
    use std::collections::HashMap;
    use std::io::Write;

    fn from_toml(toml: &str) -> Result<AppConfig> {
        let config = Config::builder()
            .add_source(ConfigFile::from_str(toml, FileFormat::Toml))
            .build()?;
        AppConfig::from_config(&config, None)
    }

    #[test]
    fn defaults_apply_to_empty_config() {
        let cfg = from_toml("").unwrap();
        assert_eq!(cfg.server_origin, DEFAULT_SERVER_ORIGIN);
        assert_eq!(cfg.storage_backend, StorageBackend::Memory);
        assert_eq!(cfg.token_length, DEFAULT_TOKEN_LENGTH);
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.log_format, "pretty");
    }

    #[test]
    fn reads_sectioned_toml() {
        let cfg = from_toml(
            r#"
            [server]
            origin = "https://connect.example.org"

            [storage]
            backend = "sled"

            [invites]
            token_length = 32

            [log]
            level = "debug"
            format = "plain"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.server_origin, "https://connect.example.org");
        assert_eq!(cfg.storage_backend, StorageBackend::Sled);
        assert_eq!(cfg.token_length, 32);
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.log_format, "plain");
    }

    #[test]
    fn environment_overrides_file() {
        let env = HashMap::from([
            (
                "QRLINK_SERVER_ORIGIN".to_string(),
                "https://env.example.org".to_string(),
            ),
            ("QRLINK_TOKEN_LENGTH".to_string(), "24".to_string()),
        ]);
        let config = Config::builder()
            .add_source(ConfigFile::from_str(
                r#"
                [server]
                origin = "https://file.example.org"

                [invites]
                token_length = 32

                [log]
                level = "warn"
                "#,
                FileFormat::Toml,
            ))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).source(Some(env)))
            .build()
            .unwrap();

        let cfg = AppConfig::from_config(&config, None).unwrap();
        assert_eq!(cfg.server_origin, "https://env.example.org");
        assert_eq!(cfg.token_length, 24);
        assert_eq!(cfg.log_level, "warn");
    }

    #[test]
    fn rejects_unknown_backend() {
        let err = from_toml("storage_backend = \"postgres\"").unwrap_err();
        assert!(err.to_string().contains("postgres"));
    }

    #[test]
    fn short_token_length_fails_when_building_ledger() {
        let cfg = from_toml("token_length = 6").unwrap();
        assert!(cfg.build_ledger().is_err());
    }

    #[test]
    fn missing_override_path_is_an_error() {
        let err = AppConfig::load(Some(Path::new("/nonexistent/qrlink.toml"))).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn loads_file_passed_on_command_line() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(file, "[server]\norigin = \"https://qr.example.net/\"").unwrap();

        let cfg = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(cfg.config_path.as_deref(), Some(file.path()));
        assert_eq!(cfg.links().origin(), "https://qr.example.net");
    }

    #[test]
    fn builds_both_backends() {
        for backend in ["memory", "sled"] {
            let cfg = from_toml(&format!("storage_backend = \"{backend}\"")).unwrap();
            let ledger = cfg.build_ledger().unwrap();
            assert_eq!(ledger.pending_invites().unwrap(), 0);
        }
    }
}
