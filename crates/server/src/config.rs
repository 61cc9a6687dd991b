use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use playback::DEFAULT_EVENT_CAPACITY;
use serde::Deserialize;
use source_fetch::DEFAULT_SYNDICATION_BASE_URL;

pub const CONFIG_FILE: &str = "overlay.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceBackend {
    Sqlite,
    Blob,
    Memory,
}

impl std::str::FromStr for PersistenceBackend {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "blob" => Ok(Self::Blob),
            "memory" => Ok(Self::Memory),
            other => bail!("unknown persistence backend '{other}'"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub server_bind: String,
    pub persistence: PersistenceBackend,
    pub database_url: String,
    pub blob_url: Option<String>,
    pub syndication_base_url: String,
    pub event_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:3000".into(),
            persistence: PersistenceBackend::Sqlite,
            database_url: "sqlite://./data/overlay.db".into(),
            blob_url: None,
            syndication_base_url: DEFAULT_SYNDICATION_BASE_URL.into(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    bind_addr: Option<String>,
    persistence: Option<PersistenceBackend>,
    database_url: Option<String>,
    blob_url: Option<String>,
    syndication_base_url: Option<String>,
    event_capacity: Option<usize>,
}

pub fn load_settings() -> Settings {
    let file = fs::read_to_string(CONFIG_FILE).ok();
    load_settings_from(file.as_deref(), |key| std::env::var(key).ok())
}

/// Defaults, then the config file, then environment variables. Malformed
/// values are skipped with a warning rather than aborting startup.
pub fn load_settings_from(
    file: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Some(raw) = file {
        match toml::from_str::<FileConfig>(raw) {
            Ok(file_cfg) => apply_file(&mut settings, file_cfg),
            Err(error) => tracing::warn!(%error, "ignoring malformed {CONFIG_FILE}"),
        }
    }

    if let Some(port) = env("PORT") {
        settings.server_bind = format!("0.0.0.0:{}", port.trim());
    }
    if let Some(v) = env("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = env("APP__PERSISTENCE") {
        match v.parse() {
            Ok(backend) => settings.persistence = backend,
            Err(error) => tracing::warn!(%error, "ignoring APP__PERSISTENCE"),
        }
    }

    if let Some(v) = env("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = env("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(v) = env("BLOB_URL") {
        settings.blob_url = Some(v);
    }
    if let Some(v) = env("APP__BLOB_URL") {
        settings.blob_url = Some(v);
    }

    if let Some(v) = env("APP__SYNDICATION_BASE_URL") {
        settings.syndication_base_url = v;
    }

    if let Some(v) = env("APP__EVENT_CAPACITY") {
        match v.parse::<usize>() {
            Ok(parsed) => settings.event_capacity = parsed.max(1),
            Err(error) => tracing::warn!(%error, value = %v, "ignoring APP__EVENT_CAPACITY"),
        }
    }

    settings
}

fn apply_file(settings: &mut Settings, file_cfg: FileConfig) {
    if let Some(v) = file_cfg.bind_addr {
        settings.server_bind = v;
    }
    if let Some(v) = file_cfg.persistence {
        settings.persistence = v;
    }
    if let Some(v) = file_cfg.database_url {
        settings.database_url = v;
    }
    if let Some(v) = file_cfg.blob_url {
        settings.blob_url = Some(v);
    }
    if let Some(v) = file_cfg.syndication_base_url {
        settings.syndication_base_url = v;
    }
    if let Some(v) = file_cfg.event_capacity {
        settings.event_capacity = v.max(1);
    }
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    ensure_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:") {
        return raw_database_url.to_string();
    }

    let path = if let Some(path) = raw_database_url.strip_prefix("sqlite://") {
        path
    } else if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        path
    } else if raw_database_url.contains("://") {
        return raw_database_url.to_string();
    } else {
        raw_database_url
    };

    let path = path.replace('\\', "/");
    if has_drive_prefix(&path) {
        format!("sqlite:{path}")
    } else {
        format!("sqlite://{path}")
    }
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn ensure_parent_dir_exists(database_url: &str) -> anyhow::Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
