//! sqlite-adapter: SQLite implementation of the domain storage ports.
//!
//! Purpose
//! - Durable storage for slot configuration, the click log and the user
//!   directory in a single file.
//! - Implements `LinkConfigRepository`, `ClickRepository` and
//!   `UserRepository` from the `domain` crate.
//!
//! Notes
//! - Uses `rusqlite` with the `bundled` feature for portability.
//! - Stores timestamps as seconds since UNIX_EPOCH.
//! - Slot edits are single upsert statements run inside a transaction that
//!   also reads the row back, so readers never see a half-applied edit.
//! - `click_events.user_id` is deliberately not a foreign key: clicks may
//!   reference users that were never recorded.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use domain::{
    ClickEvent, ClickRepository, CoreError, LinkConfig, LinkConfigRepository, LinkEdit, LinkStats,
    Slot, User, UserId, UserRepository,
};
use rusqlite::{params, Connection};
use tracing::warn;

const LINK_COLUMNS: &str =
    "slot, label, url, description, is_active, updated_by, updated_at";

/// SQLite-backed repository.
pub struct SqliteRepo {
    conn: Mutex<Connection>,
}

impl SqliteRepo {
    /// Open (or create) a SQLite database at the given path and ensure schema.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let conn = Connection::open(path).map_err(map_sqerr)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Construct from env var `DB_PATH` (defaults to `./data/bot.db`).
    pub fn from_env() -> Result<Self, CoreError> {
        let path = std::env::var("DB_PATH").unwrap_or_else(|_| "./data/bot.db".to_string());
        Self::open_creating_dirs(path)
    }

    /// Open `path`, creating its parent directory first.
    pub fn open_creating_dirs<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        if let Some(dir) = path.as_ref().parent() {
            std::fs::create_dir_all(dir).map_err(map_sqerr)?;
        }
        Self::new(path)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, CoreError> {
        self.conn
            .lock()
            .map_err(|_| CoreError::StoreUnavailable("mutex poisoned".into()))
    }
}

fn init_schema(conn: &Connection) -> Result<(), CoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS link_configs (
            slot TEXT PRIMARY KEY,
            label TEXT NOT NULL,
            url TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            is_active INTEGER NOT NULL DEFAULT 1,
            updated_by INTEGER,
            updated_at INTEGER
        );
        CREATE TABLE IF NOT EXISTS users (
            user_id INTEGER PRIMARY KEY,
            username TEXT,
            first_name TEXT,
            last_name TEXT
        );
        CREATE TABLE IF NOT EXISTS click_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            slot TEXT NOT NULL,
            clicked_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_click_events_slot ON click_events(slot);
        CREATE INDEX IF NOT EXISTS idx_click_events_user ON click_events(user_id);
        "#,
    )
    .map_err(map_sqerr)
}

fn map_sqerr<E: std::fmt::Display>(e: E) -> CoreError {
    CoreError::StoreUnavailable(format!("sqlite error: {e}"))
}

fn system_time_to_secs(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs() as i64
}

fn secs_to_system_time(secs: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64)
}

fn row_to_config(row: &rusqlite::Row) -> Result<LinkConfig, CoreError> {
    let slot: String = row.get(0).map_err(map_sqerr)?;
    let is_active: i64 = row.get(4).map_err(map_sqerr)?;
    let updated_by: Option<i64> = row.get(5).map_err(map_sqerr)?;
    let updated_at: Option<i64> = row.get(6).map_err(map_sqerr)?;
    Ok(LinkConfig {
        slot: Slot::parse(&slot)
            .map_err(|e| CoreError::StoreUnavailable(format!("bad slot in db: {e}")))?,
        label: row.get(1).map_err(map_sqerr)?,
        url: row.get(2).map_err(map_sqerr)?,
        description: row.get(3).map_err(map_sqerr)?,
        is_active: is_active != 0,
        updated_by: updated_by.map(UserId::new),
        updated_at: updated_at.map(secs_to_system_time),
    })
}

fn read_config(conn: &Connection, slot: Slot) -> Result<Option<LinkConfig>, CoreError> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {LINK_COLUMNS} FROM link_configs WHERE slot = ?1"
        ))
        .map_err(map_sqerr)?;
    let mut rows = stmt.query(params![slot.as_str()]).map_err(map_sqerr)?;
    match rows.next().map_err(map_sqerr)? {
        Some(row) => Ok(Some(row_to_config(row)?)),
        None => Ok(None),
    }
}

fn read_config_required(conn: &Connection, slot: Slot) -> Result<LinkConfig, CoreError> {
    read_config(conn, slot)?
        .ok_or_else(|| CoreError::StoreUnavailable(format!("slot {slot} missing after write")))
}

// ============ LinkConfigRepository ============

impl LinkConfigRepository for SqliteRepo {
    fn get(&self, slot: Slot) -> Result<Option<LinkConfig>, CoreError> {
        let conn = self.lock()?;
        read_config(&conn, slot)
    }

    fn list(&self) -> Result<Vec<LinkConfig>, CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {LINK_COLUMNS} FROM link_configs"))
            .map_err(map_sqerr)?;
        let mut rows = stmt.query([]).map_err(map_sqerr)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(map_sqerr)? {
            match row_to_config(row) {
                Ok(cfg) => out.push(cfg),
                Err(e) => warn!(err = %e, "skipping unreadable link config row"),
            }
        }
        Ok(out)
    }

    fn insert_if_absent(&self, config: LinkConfig) -> Result<bool, CoreError> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO link_configs(slot, label, url, description, is_active, updated_by, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    config.slot.as_str(),
                    config.label,
                    config.url,
                    config.description,
                    config.is_active as i64,
                    config.updated_by.map(UserId::get),
                    config.updated_at.map(system_time_to_secs),
                ],
            )
            .map_err(map_sqerr)?;
        Ok(changed > 0)
    }

    fn apply_edit(
        &self,
        slot: Slot,
        edit: &LinkEdit,
        seed: &LinkConfig,
    ) -> Result<LinkConfig, CoreError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(map_sqerr)?;
        tx.execute(
            "INSERT INTO link_configs(slot, label, url, description, is_active, updated_by, updated_at)
             VALUES (?1, COALESCE(?2, ?3), ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(slot) DO UPDATE SET
                 url = excluded.url,
                 label = COALESCE(?2, link_configs.label),
                 updated_by = excluded.updated_by,
                 updated_at = excluded.updated_at",
            params![
                slot.as_str(),
                edit.label,
                seed.label,
                edit.url,
                seed.description,
                seed.is_active as i64,
                edit.updated_by.get(),
                system_time_to_secs(edit.updated_at),
            ],
        )
        .map_err(map_sqerr)?;
        let saved = read_config_required(&tx, slot)?;
        tx.commit().map_err(map_sqerr)?;
        Ok(saved)
    }

    fn set_active(
        &self,
        slot: Slot,
        is_active: bool,
        updated_by: UserId,
        updated_at: SystemTime,
        seed: &LinkConfig,
    ) -> Result<LinkConfig, CoreError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(map_sqerr)?;
        tx.execute(
            "INSERT INTO link_configs(slot, label, url, description, is_active, updated_by, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(slot) DO UPDATE SET
                 is_active = excluded.is_active,
                 updated_by = excluded.updated_by,
                 updated_at = excluded.updated_at",
            params![
                slot.as_str(),
                seed.label,
                seed.url,
                seed.description,
                is_active as i64,
                updated_by.get(),
                system_time_to_secs(updated_at),
            ],
        )
        .map_err(map_sqerr)?;
        let saved = read_config_required(&tx, slot)?;
        tx.commit().map_err(map_sqerr)?;
        Ok(saved)
    }
}

// ============ ClickRepository ============

impl ClickRepository for SqliteRepo {
    fn record_click(&self, event: ClickEvent) -> Result<(), CoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO click_events(user_id, slot, clicked_at) VALUES (?1, ?2, ?3)",
            params![
                event.user_id.get(),
                event.slot.as_str(),
                system_time_to_secs(event.clicked_at),
            ],
        )
        .map_err(map_sqerr)?;
        Ok(())
    }

    fn count_clicks(&self) -> Result<u64, CoreError> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM click_events", [], |r| r.get(0))
            .map_err(map_sqerr)?;
        Ok(count as u64)
    }

    fn stats_by_slot(&self) -> Result<Vec<LinkStats>, CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT slot, COUNT(*), COUNT(DISTINCT user_id)
                 FROM click_events
                 GROUP BY slot",
            )
            .map_err(map_sqerr)?;
        let mut rows = stmt.query([]).map_err(map_sqerr)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(map_sqerr)? {
            let name: String = row.get(0).map_err(map_sqerr)?;
            let clicks: i64 = row.get(1).map_err(map_sqerr)?;
            let users: i64 = row.get(2).map_err(map_sqerr)?;
            let Ok(slot) = Slot::parse(&name) else {
                warn!(slot = %name, "ignoring clicks for unknown slot");
                continue;
            };
            out.push(LinkStats {
                slot,
                click_count: clicks as u64,
                distinct_users: users as u64,
            });
        }
        Ok(out)
    }

    fn clicks_by_user(&self) -> Result<Vec<(UserId, u64)>, CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT user_id, COUNT(*) FROM click_events GROUP BY user_id ORDER BY user_id")
            .map_err(map_sqerr)?;
        let mut rows = stmt.query([]).map_err(map_sqerr)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(map_sqerr)? {
            let id: i64 = row.get(0).map_err(map_sqerr)?;
            let count: i64 = row.get(1).map_err(map_sqerr)?;
            out.push((UserId::new(id), count as u64));
        }
        Ok(out)
    }
}

// ============ UserRepository ============

fn row_to_user(row: &rusqlite::Row) -> Result<User, CoreError> {
    let id: i64 = row.get(0).map_err(map_sqerr)?;
    Ok(User {
        user_id: UserId::new(id),
        username: row.get(1).map_err(map_sqerr)?,
        first_name: row.get(2).map_err(map_sqerr)?,
        last_name: row.get(3).map_err(map_sqerr)?,
    })
}

impl UserRepository for SqliteRepo {
    fn upsert_user(&self, user: &User) -> Result<(), CoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO users(user_id, username, first_name, last_name) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                 username = excluded.username,
                 first_name = excluded.first_name,
                 last_name = excluded.last_name",
            params![
                user.user_id.get(),
                user.username,
                user.first_name,
                user.last_name,
            ],
        )
        .map_err(map_sqerr)?;
        Ok(())
    }

    fn get_user(&self, id: UserId) -> Result<Option<User>, CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT user_id, username, first_name, last_name FROM users WHERE user_id = ?1")
            .map_err(map_sqerr)?;
        let mut rows = stmt.query(params![id.get()]).map_err(map_sqerr)?;
        match rows.next().map_err(map_sqerr)? {
            Some(row) => Ok(Some(row_to_user(row)?)),
            None => Ok(None),
        }
    }

    fn count_users(&self) -> Result<u64, CoreError> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))
            .map_err(map_sqerr)?;
        Ok(count as u64)
    }

    fn list_users(&self) -> Result<Vec<User>, CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT user_id, username, first_name, last_name FROM users ORDER BY user_id")
            .map_err(map_sqerr)?;
        let mut rows = stmt.query([]).map_err(map_sqerr)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(map_sqerr)? {
            out.push(row_to_user(row)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::defaults::default_config;

    fn tmp_db() -> (SqliteRepo, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");
        let repo = SqliteRepo::new(path).unwrap();
        (repo, dir)
    }

    fn edit(url: &str, label: Option<&str>, by: i64, secs: u64) -> LinkEdit {
        LinkEdit {
            url: url.into(),
            label: label.map(Into::into),
            updated_by: UserId::new(by),
            updated_at: UNIX_EPOCH + Duration::from_secs(secs),
        }
    }

    #[test]
    fn insert_if_absent_then_get() {
        let (repo, _dir) = tmp_db();
        let seed = default_config(Slot::Support);
        assert!(repo.insert_if_absent(seed.clone()).unwrap());
        assert!(!repo.insert_if_absent(seed.clone()).unwrap());
        assert_eq!(repo.get(Slot::Support).unwrap(), Some(seed));
        assert!(repo.get(Slot::Videos).unwrap().is_none());
    }

    #[test]
    fn apply_edit_creates_from_seed() {
        let (repo, _dir) = tmp_db();
        let seed = default_config(Slot::Contest);
        let saved = repo
            .apply_edit(Slot::Contest, &edit("https://new", None, 9, 50), &seed)
            .unwrap();
        assert_eq!(saved.url, "https://new");
        assert_eq!(saved.label, seed.label);
        assert_eq!(saved.description, seed.description);
        assert_eq!(saved.updated_by, Some(UserId::new(9)));
        assert_eq!(saved.updated_at, Some(UNIX_EPOCH + Duration::from_secs(50)));
    }

    #[test]
    fn apply_edit_keeps_label_unless_given() {
        let (repo, _dir) = tmp_db();
        let seed = default_config(Slot::Videos);
        repo.apply_edit(Slot::Videos, &edit("https://a", Some("Mine"), 1, 10), &seed)
            .unwrap();
        let kept = repo
            .apply_edit(Slot::Videos, &edit("https://b", None, 2, 20), &seed)
            .unwrap();
        assert_eq!(kept.label, "Mine");
        assert_eq!(kept.url, "https://b");
        assert_eq!(kept.updated_by, Some(UserId::new(2)));

        let replaced = repo
            .apply_edit(Slot::Videos, &edit("https://c", Some("Other"), 3, 30), &seed)
            .unwrap();
        assert_eq!(replaced.label, "Other");
        assert_eq!(repo.list().unwrap().len(), 1);
    }

    #[test]
    fn set_active_toggles() {
        let (repo, _dir) = tmp_db();
        let seed = default_config(Slot::Channel);
        let off = repo
            .set_active(Slot::Channel, false, UserId::new(1), UNIX_EPOCH, &seed)
            .unwrap();
        assert!(!off.is_active);
        assert_eq!(off.url, seed.url);
        let on = repo
            .set_active(Slot::Channel, true, UserId::new(1), UNIX_EPOCH, &seed)
            .unwrap();
        assert!(on.is_active);
    }

    #[test]
    fn click_stats_and_left_join() {
        let (repo, _dir) = tmp_db();
        repo.upsert_user(&User::new(UserId::new(1))).unwrap();
        for (user, slot) in [(1, Slot::Support), (1, Slot::Support), (2, Slot::Support), (3, Slot::Catalog)] {
            repo.record_click(ClickEvent {
                user_id: UserId::new(user),
                slot,
                clicked_at: UNIX_EPOCH,
            })
            .unwrap();
        }
        assert_eq!(repo.count_clicks().unwrap(), 4);
        assert_eq!(repo.count_users().unwrap(), 1);

        let mut stats = repo.stats_by_slot().unwrap();
        stats.sort_by_key(|s| s.slot);
        assert_eq!(
            stats,
            vec![
                LinkStats { slot: Slot::Support, click_count: 3, distinct_users: 2 },
                LinkStats { slot: Slot::Catalog, click_count: 1, distinct_users: 1 },
            ]
        );
        assert_eq!(
            repo.clicks_by_user().unwrap(),
            vec![(UserId::new(1), 2), (UserId::new(2), 1), (UserId::new(3), 1)]
        );
    }

    #[test]
    fn upsert_user_last_write_wins() {
        let (repo, _dir) = tmp_db();
        let mut u = User::new(UserId::new(77));
        u.username = Some("first".into());
        repo.upsert_user(&u).unwrap();
        u.username = None;
        u.last_name = Some("Smirnova".into());
        repo.upsert_user(&u).unwrap();

        let got = repo.get_user(UserId::new(77)).unwrap().unwrap();
        assert_eq!(got, u);
        assert_eq!(repo.list_users().unwrap(), vec![u]);
        assert!(repo.get_user(UserId::new(1)).unwrap().is_none());
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("bot.db");
        {
            let repo = SqliteRepo::open_creating_dirs(&path).unwrap();
            repo.apply_edit(
                Slot::Support,
                &edit("t.me/help", Some("Help"), 1, 5),
                &default_config(Slot::Support),
            )
            .unwrap();
        }
        let repo = SqliteRepo::new(&path).unwrap();
        let got = repo.get(Slot::Support).unwrap().unwrap();
        assert_eq!(got.url, "t.me/help");
        assert_eq!(got.label, "Help");
    }

    // Two writers alternate full (url, label, editor) triples on one slot while
    // a reader polls; every observed record must be one writer's triple.
    fn assert_edits_are_atomic<R: LinkConfigRepository>(repo: &R) {
        let seed = default_config(Slot::Support);
        let a = edit("https://a.example", Some("A"), 1, 10);
        let b = edit("https://b.example", Some("B"), 2, 20);
        repo.apply_edit(Slot::Support, &a, &seed).unwrap();

        let is_whole = |cfg: &LinkConfig| {
            matches!(
                (cfg.url.as_str(), cfg.label.as_str(), cfg.updated_by.map(UserId::get)),
                ("https://a.example", "A", Some(1)) | ("https://b.example", "B", Some(2))
            )
        };
        let (seed, is_whole) = (&seed, &is_whole);
        std::thread::scope(|s| {
            for e in [&a, &b] {
                s.spawn(move || {
                    for _ in 0..200 {
                        let saved = repo.apply_edit(Slot::Support, e, seed).unwrap();
                        assert!(is_whole(&saved), "{saved:?}");
                    }
                });
            }
            s.spawn(move || {
                for _ in 0..400 {
                    let cfg = repo.get(Slot::Support).unwrap().unwrap();
                    assert!(is_whole(&cfg), "{cfg:?}");
                }
            });
        });

        assert!(is_whole(&repo.get(Slot::Support).unwrap().unwrap()));
        assert_eq!(repo.list().unwrap().len(), 1);
    }

    #[test]
    fn concurrent_edits_never_expose_mixed_records() {
        let (repo, _dir) = tmp_db();
        assert_edits_are_atomic(&repo);
    }
}
