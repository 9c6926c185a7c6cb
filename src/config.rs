/// User configuration read from `config.toml`.
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::FixedOffset;
use serde::Deserialize;

use crate::types::WeekStart;

const APP_DIR: &str = "lifebalance";

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub week_start: WeekStart,
    /// Fixed offset used for reports. The local zone is used when absent.
    pub utc_offset_minutes: Option<i32>,
    pub log_level: Option<String>,
    pub database: Option<PathBuf>,
    pub flags: Option<PathBuf>,
}

impl Config {
    /// Reads the config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(err).with_context(|| format!("reading {}", path.display())),
        };
        toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn report_offset(&self) -> Result<Option<FixedOffset>> {
        self.utc_offset_minutes
            .map(|minutes| {
                FixedOffset::east_opt(minutes * 60).ok_or_else(|| {
                    anyhow::anyhow!("utc_offset_minutes {minutes} is out of range")
                })
            })
            .transpose()
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(crate::db::default_db_path)
    }

    pub fn flags_path(&self) -> PathBuf {
        self.flags.clone().unwrap_or_else(|| match data_dir() {
            Some(dir) => dir.join("timer_flags.json"),
            None => PathBuf::from("timer_flags.json"),
        })
    }
}

/// `<data_local_dir>/lifebalance`, created on first use.
pub fn data_dir() -> Option<PathBuf> {
    let dir = dirs::data_local_dir()?.join(APP_DIR);
    fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

pub fn default_config_path() -> PathBuf {
    match dirs::config_dir() {
        Some(dir) => dir.join(APP_DIR).join("config.toml"),
        None => PathBuf::from("config.toml"),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.week_start, WeekStart::Sunday);
        assert_eq!(config.report_offset().unwrap(), None);
    }

    #[test]
    fn reads_all_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
week_start = "monday"
utc_offset_minutes = 540
log_level = "debug"
database = "/tmp/life.db"
"#,
        )
        .unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.week_start, WeekStart::Monday);
        assert_eq!(
            config.report_offset().unwrap(),
            FixedOffset::east_opt(9 * 3600)
        );
        assert_eq!(config.database_path(), PathBuf::from("/tmp/life.db"));
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "weekstart = \"monday\"\n").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn offset_out_of_range_is_an_error() {
        let config = Config {
            utc_offset_minutes: Some(24 * 60),
            ..Config::default()
        };
        assert!(config.report_offset().is_err());
    }
}
