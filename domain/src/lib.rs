//! Domain library for the link-menu bot.
//!
//! Holds the domain types, ports (traits), and error definitions, together
//! with the services that drive them: the slot configuration store, the click
//! log, the admin edit workflow and the menu router. Keep transport and IO
//! concerns out of this crate; storage lives behind the repository traits.

use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::time::SystemTime;

use serde::Serialize;

/// Stable external identifier of a chat user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// One of the fixed link slots shown in the menu.
///
/// Slots are fixed at compile time; only their configuration changes at runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Support,
    Contest,
    Videos,
    Catalog,
    Channel,
}

impl Slot {
    /// All slots in menu order.
    pub const ALL: [Slot; 5] = [
        Slot::Support,
        Slot::Contest,
        Slot::Videos,
        Slot::Catalog,
        Slot::Channel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Slot::Support => "support",
            Slot::Contest => "contest",
            Slot::Videos => "videos",
            Slot::Catalog => "catalog",
            Slot::Channel => "channel",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s.trim().to_lowercase().as_str() {
            "support" => Ok(Slot::Support),
            "contest" => Ok(Slot::Contest),
            "videos" => Ok(Slot::Videos),
            "catalog" => Ok(Slot::Catalog),
            "channel" => Ok(Slot::Channel),
            _ => Err(CoreError::UnknownSlot(s.to_string())),
        }
    }
}

impl Display for Slot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration of a single menu link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkConfig {
    pub slot: Slot,
    /// Button text shown to users.
    pub label: String,
    pub url: String,
    /// Admin-facing note about what the link points to.
    pub description: String,
    /// Inactive records are ignored by lookups, which fall back to the default.
    pub is_active: bool,
    /// Administrator who last changed the record. `None` for untouched defaults.
    pub updated_by: Option<UserId>,
    pub updated_at: Option<SystemTime>,
}

/// A validated change to a slot's url and, optionally, its label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkEdit {
    pub url: String,
    /// `None` keeps the stored label.
    pub label: Option<String>,
    pub updated_by: UserId,
    pub updated_at: SystemTime,
}

/// A single link click. Never updated or deleted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClickEvent {
    /// Soft reference: the user may never have been recorded in the directory.
    pub user_id: UserId,
    pub slot: Slot,
    pub clicked_at: SystemTime,
}

/// A known chat user. All attributes are overwritten on every interaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct User {
    pub user_id: UserId,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl User {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            username: None,
            first_name: None,
            last_name: None,
        }
    }

    /// First and last name joined, falling back to the username or the id.
    pub fn full_name(&self) -> String {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|p| !p.is_empty())
            .collect();
        if !parts.is_empty() {
            return parts.join(" ");
        }
        match self.username.as_deref() {
            Some(u) if !u.is_empty() => u.to_string(),
            _ => self.user_id.to_string(),
        }
    }
}

/// Click totals for one slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    pub slot: Slot,
    pub click_count: u64,
    pub distinct_users: u64,
}

/// Aggregate usage computed on demand from the directory and the click log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UsageReport {
    pub total_users: u64,
    pub total_clicks: u64,
    pub per_link: Vec<LinkStats>,
}

/// Static allow-list of administrator ids.
#[derive(Clone, Debug, Default)]
pub struct AdminList(HashSet<UserId>);

impl AdminList {
    pub fn new<I: IntoIterator<Item = UserId>>(ids: I) -> Self {
        Self(ids.into_iter().collect())
    }

    pub fn contains(&self, id: UserId) -> bool {
        self.0.contains(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fail with `Forbidden` unless `id` is on the list.
    pub fn ensure(&self, id: UserId) -> Result<(), CoreError> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(CoreError::Forbidden)
        }
    }
}

/// Time source abstraction to make code testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Repository port for slot configuration.
pub trait LinkConfigRepository: Send + Sync {
    fn get(&self, slot: Slot) -> Result<Option<LinkConfig>, CoreError>;
    /// All stored records, in no particular order.
    fn list(&self) -> Result<Vec<LinkConfig>, CoreError>;
    /// Insert `config` unless a record for its slot exists. Returns whether it was inserted.
    fn insert_if_absent(&self, config: LinkConfig) -> Result<bool, CoreError>;
    /// Atomically apply `edit` to the slot, creating it from `seed` when absent.
    fn apply_edit(
        &self,
        slot: Slot,
        edit: &LinkEdit,
        seed: &LinkConfig,
    ) -> Result<LinkConfig, CoreError>;
    /// Atomically set the active flag, creating the record from `seed` when absent.
    fn set_active(
        &self,
        slot: Slot,
        is_active: bool,
        updated_by: UserId,
        updated_at: SystemTime,
        seed: &LinkConfig,
    ) -> Result<LinkConfig, CoreError>;
}

/// Repository port for the append-only click log.
pub trait ClickRepository: Send + Sync {
    fn record_click(&self, event: ClickEvent) -> Result<(), CoreError>;
    fn count_clicks(&self) -> Result<u64, CoreError>;
    /// Per-slot totals for slots with at least one click.
    fn stats_by_slot(&self) -> Result<Vec<LinkStats>, CoreError>;
    /// Click count per user id, including ids absent from the directory.
    fn clicks_by_user(&self) -> Result<Vec<(UserId, u64)>, CoreError>;
}

/// Repository port for the user directory.
pub trait UserRepository: Send + Sync {
    /// Create or overwrite the user record.
    fn upsert_user(&self, user: &User) -> Result<(), CoreError>;
    fn get_user(&self, id: UserId) -> Result<Option<User>, CoreError>;
    fn count_users(&self) -> Result<u64, CoreError>;
    /// All users ordered by id.
    fn list_users(&self) -> Result<Vec<User>, CoreError>;
}

/// Core domain errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("administrator privilege required")]
    Forbidden,
    #[error("unknown slot: {0}")]
    UnknownSlot(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("export failed: {0}")]
    Export(String),
}

/// Return a short about/version line for the binary to print.
pub fn about() -> String {
    let pkg = env!("CARGO_PKG_NAME");
    let ver = env!("CARGO_PKG_VERSION");
    format!("{} v{} - link-menu bot domain", pkg, ver)
}

pub mod adapters;
pub mod defaults;
pub mod export;
pub mod render;
pub mod router;
pub mod service;
pub mod session;
pub mod stats;
pub mod validate;
pub mod workflow;
