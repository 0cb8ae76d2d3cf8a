//! Process configuration for hosts embedding the core.
//!
//! # Responsibility
//! - Collect log and database settings from plain key/value pairs.
//! - Hand validated values to the logging and db bootstrap.
//!
//! # Invariants
//! - Missing keys fall back to build-mode defaults; malformed values are
//!   rejected, never silently replaced.

use crate::db::{open_db, open_db_in_memory, DbResult};
use crate::logging::{self, default_log_level, normalize_level};
use rusqlite::Connection;
use std::error::Error;
use std::ffi::OsString;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const ENV_LOG_LEVEL: &str = "INDIEK_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "INDIEK_LOG_DIR";
pub const ENV_DB_PATH: &str = "INDIEK_DB_PATH";

const ENV_PREFIX: &str = "INDIEK_";

const IN_MEMORY_DB: &str = ":memory:";

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidLogLevel(String),
    RelativeLogDir(String),
    EmptyValue(&'static str),
    /// An `INDIEK_*` variable holds bytes that are not valid UTF-8.
    NotUnicode(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidLogLevel(message) => write!(f, "{message}"),
            Self::RelativeLogDir(dir) => {
                write!(f, "{ENV_LOG_DIR} must be an absolute path, got `{dir}`")
            }
            Self::EmptyValue(key) => write!(f, "{key} is set but empty"),
            Self::NotUnicode(key) => write!(f, "{key} is not valid UTF-8"),
        }
    }
}

impl Error for ConfigError {}

/// Where the SQLite store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    InMemory,
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    pub log_level: &'static str,
    pub log_dir: PathBuf,
    pub database: DatabaseLocation,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_dir: std::env::temp_dir().join("indiek").join("logs"),
            database: DatabaseLocation::InMemory,
        }
    }
}

impl CoreConfig {
    /// Reads `INDIEK_*` settings from the process environment.
    ///
    /// Variables outside the `INDIEK_` prefix are never decoded, so foreign
    /// non-UTF-8 entries are ignored.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_os_vars(std::env::vars_os())
    }

    pub(crate) fn from_os_vars<I>(vars: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        let mut decoded = Vec::new();
        for (key, value) in vars {
            let Some(key) = key.to_str().filter(|key| key.starts_with(ENV_PREFIX)) else {
                continue;
            };
            let value = value
                .into_string()
                .map_err(|_| ConfigError::NotUnicode(key.to_string()))?;
            decoded.push((key.to_string(), value));
        }
        Self::from_vars(decoded)
    }

    /// Reads `INDIEK_*` settings from any key/value source; other keys are
    /// ignored.
    pub fn from_vars<I, K, V>(vars: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (key, value) in vars {
            let value = value.as_ref().trim();
            match key.as_ref() {
                ENV_LOG_LEVEL => {
                    config.log_level =
                        normalize_level(value).map_err(ConfigError::InvalidLogLevel)?;
                }
                ENV_LOG_DIR => {
                    if value.is_empty() {
                        return Err(ConfigError::EmptyValue(ENV_LOG_DIR));
                    }
                    let dir = PathBuf::from(value);
                    if !dir.is_absolute() {
                        return Err(ConfigError::RelativeLogDir(value.to_string()));
                    }
                    config.log_dir = dir;
                }
                ENV_DB_PATH => {
                    config.database = match value {
                        "" => return Err(ConfigError::EmptyValue(ENV_DB_PATH)),
                        IN_MEMORY_DB => DatabaseLocation::InMemory,
                        path => DatabaseLocation::File(PathBuf::from(path)),
                    };
                }
                _ => {}
            }
        }
        Ok(config)
    }

    /// Starts file logging with this level and directory.
    pub fn init_logging(&self) -> Result<(), String> {
        let log_dir = self
            .log_dir
            .to_str()
            .ok_or_else(|| format!("log_dir `{}` is not valid UTF-8", self.log_dir.display()))?;
        logging::init_logging(self.log_level, log_dir)
    }

    /// Opens and migrates the configured SQLite database.
    pub fn open_database(&self) -> DbResult<Connection> {
        match &self.database {
            DatabaseLocation::InMemory => open_db_in_memory(),
            DatabaseLocation::File(path) => open_db(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, CoreConfig, DatabaseLocation, ENV_DB_PATH, ENV_LOG_LEVEL};
    use std::path::PathBuf;

    #[test]
    fn missing_keys_use_defaults() {
        let config = CoreConfig::from_vars(Vec::<(String, String)>::new()).unwrap();
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.database, DatabaseLocation::InMemory);
    }

    #[test]
    fn reads_known_keys_and_ignores_others() {
        let log_dir = std::env::temp_dir().join("indiek-config-test");
        let vars = vec![
            ("INDIEK_LOG_LEVEL", " Warning "),
            ("INDIEK_LOG_DIR", log_dir.to_str().unwrap()),
            ("INDIEK_DB_PATH", "/tmp/indiek.sqlite3"),
            ("HOME", "/root"),
        ];
        let config = CoreConfig::from_vars(vars).unwrap();
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.log_dir, log_dir);
        assert_eq!(
            config.database,
            DatabaseLocation::File(PathBuf::from("/tmp/indiek.sqlite3"))
        );
    }

    #[test]
    fn memory_marker_selects_in_memory_database() {
        let config = CoreConfig::from_vars([(ENV_DB_PATH, ":memory:")]).unwrap();
        assert_eq!(config.database, DatabaseLocation::InMemory);
    }

    #[test]
    fn rejects_malformed_values() {
        let level = CoreConfig::from_vars([(ENV_LOG_LEVEL, "loud")]).unwrap_err();
        assert!(matches!(level, ConfigError::InvalidLogLevel(_)));

        let dir = CoreConfig::from_vars([("INDIEK_LOG_DIR", "logs")]).unwrap_err();
        assert_eq!(dir, ConfigError::RelativeLogDir("logs".to_string()));

        let db = CoreConfig::from_vars([(ENV_DB_PATH, "  ")]).unwrap_err();
        assert_eq!(db, ConfigError::EmptyValue(ENV_DB_PATH));
    }

    #[cfg(unix)]
    #[test]
    fn environment_decoding_skips_foreign_non_utf8_entries() {
        use std::ffi::OsString;
        use std::os::unix::ffi::OsStringExt;

        let invalid = || OsString::from_vec(vec![0x66, 0xff, 0x6f]);
        let config = CoreConfig::from_os_vars(vec![
            (invalid(), OsString::from("value")),
            (OsString::from("LANG"), invalid()),
            (OsString::from(ENV_DB_PATH), OsString::from(":memory:")),
        ])
        .unwrap();
        assert_eq!(config.database, DatabaseLocation::InMemory);

        let err = CoreConfig::from_os_vars(vec![(OsString::from(ENV_LOG_LEVEL), invalid())])
            .unwrap_err();
        assert_eq!(err, ConfigError::NotUnicode(ENV_LOG_LEVEL.to_string()));
    }

    #[test]
    fn open_database_bootstraps_schema() {
        let conn = CoreConfig::default().open_database().unwrap();
        let version = crate::db::migrations::current_user_version(&conn).unwrap();
        assert_eq!(version, crate::db::migrations::latest_version());
    }
}
