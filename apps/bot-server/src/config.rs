//! Centralized configuration for bot-server.
//!
//! All environment variables are loaded and validated at startup to fail fast
//! on misconfiguration rather than at request time.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use domain::validate::UrlPolicy;
use domain::workflow::{Keywords, WorkflowOptions};
use domain::{AdminList, UserId};

/// Storage backend provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageProvider {
    /// In-memory storage (data lost on restart)
    Memory,
    /// SQLite file-based storage
    Sqlite,
}

impl StorageProvider {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("sqlite") {
            Self::Sqlite
        } else {
            Self::Memory
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration error for {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Server configuration loaded from environment variables.
///
/// All fields are validated at construction time.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 3001)
    pub port: u16,
    /// Telegram ids allowed to run admin commands
    pub admin_ids: Vec<UserId>,
    /// Storage provider
    pub storage_provider: StorageProvider,
    /// SQLite database path (when using sqlite storage)
    pub db_path: Option<PathBuf>,
    /// Log format
    pub log_format: LogFormat,
    /// Reply words recognised during an edit
    pub keywords: Keywords,
    /// Accepted URL prefixes
    pub url_prefixes: Vec<String>,
    /// Idle lifetime of an edit session; `None` disables expiry
    pub session_ttl: Option<Duration>,
    /// Display name reported by the health endpoint
    pub bot_name: String,
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// Fails fast on invalid configuration.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Port
        let port = match env::var("PORT") {
            Ok(s) => s.trim().parse().map_err(|_| ConfigError {
                field: "PORT",
                message: format!("Invalid port '{}'", s),
            })?,
            Err(_) => 3001,
        };

        // Admins
        let admin_ids = parse_admin_ids(&env::var("ADMIN_IDS").unwrap_or_default())?;

        // Storage provider
        let storage_provider = StorageProvider::from_str(
            &env::var("STORAGE_PROVIDER").unwrap_or_else(|_| "sqlite".into()),
        );

        // DB path (for sqlite)
        let db_path = env::var("DB_PATH")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        // Log format
        let log_format =
            LogFormat::from_str(&env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".into()));

        // Edit keywords
        let defaults = Keywords::default();
        let keywords = Keywords {
            cancel: non_empty_var("CANCEL_WORD").unwrap_or(defaults.cancel),
            affirm: non_empty_var("AFFIRM_WORD").unwrap_or(defaults.affirm),
        };
        if keywords.is_cancel(&keywords.affirm) {
            return Err(ConfigError {
                field: "AFFIRM_WORD",
                message: "Must differ from CANCEL_WORD".into(),
            });
        }

        // URL prefixes
        let url_prefixes = match non_empty_var("URL_PREFIXES") {
            Some(raw) => {
                let list = split_list(&raw);
                if list.is_empty() {
                    return Err(ConfigError {
                        field: "URL_PREFIXES",
                        message: "At least one prefix is required".into(),
                    });
                }
                list
            }
            None => UrlPolicy::default().prefixes().to_vec(),
        };

        // Session TTL
        let session_ttl = match non_empty_var("SESSION_TTL_SECS") {
            Some(raw) => parse_ttl(&raw)?,
            None => WorkflowOptions::default().session_ttl,
        };

        let bot_name = non_empty_var("BOT_NAME").unwrap_or_else(|| "link-menu-bot".into());

        Ok(Self {
            port,
            admin_ids,
            storage_provider,
            db_path,
            log_format,
            keywords,
            url_prefixes,
            session_ttl,
            bot_name,
        })
    }

    pub fn admins(&self) -> AdminList {
        AdminList::new(self.admin_ids.iter().copied())
    }

    pub fn url_policy(&self) -> UrlPolicy {
        UrlPolicy::new(self.url_prefixes.iter().cloned())
    }

    pub fn workflow_options(&self) -> WorkflowOptions {
        WorkflowOptions {
            keywords: self.keywords.clone(),
            session_ttl: self.session_ttl,
        }
    }

    /// Log warnings about configuration that leaves features unusable.
    pub fn warn_if_degraded(&self) {
        if self.admin_ids.is_empty() {
            tracing::warn!(
                "ADMIN_IDS is empty: nobody can edit links, view statistics or export users."
            );
        }
        if self.storage_provider == StorageProvider::Memory {
            tracing::warn!("STORAGE_PROVIDER=memory: data is lost on restart.");
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Parse a comma-separated list of numeric user ids.
fn parse_admin_ids(raw: &str) -> Result<Vec<UserId>, ConfigError> {
    split_list(raw)
        .into_iter()
        .map(|s| {
            s.parse::<i64>().map(UserId::new).map_err(|_| ConfigError {
                field: "ADMIN_IDS",
                message: format!("Invalid user id '{}'", s),
            })
        })
        .collect()
}

/// `0` disables expiry.
fn parse_ttl(raw: &str) -> Result<Option<Duration>, ConfigError> {
    let secs: u64 = raw.parse().map_err(|_| ConfigError {
        field: "SESSION_TTL_SECS",
        message: format!("Invalid number of seconds '{}'", raw),
    })?;
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}
