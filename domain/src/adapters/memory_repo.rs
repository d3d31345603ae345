use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

use crate::{
    ClickEvent, ClickRepository, CoreError, LinkConfig, LinkConfigRepository, LinkEdit, LinkStats,
    Slot, User, UserId, UserRepository,
};

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, CoreError> {
    m.lock()
        .map_err(|_| CoreError::StoreUnavailable("mutex poisoned".into()))
}

/// In-memory slot configuration. Each mutation runs under a single lock.
#[derive(Default)]
pub struct InMemoryLinkRepo {
    inner: Mutex<BTreeMap<Slot, LinkConfig>>,
}

/// In-memory append-only click log.
#[derive(Default)]
pub struct InMemoryClickRepo {
    clicks: Mutex<Vec<ClickEvent>>,
}

/// In-memory user directory.
#[derive(Default)]
pub struct InMemoryUserRepo {
    users: Mutex<BTreeMap<UserId, User>>,
}

impl InMemoryLinkRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InMemoryClickRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every recorded event, oldest first.
    pub fn events(&self) -> Result<Vec<ClickEvent>, CoreError> {
        Ok(lock(&self.clicks)?.clone())
    }
}

impl InMemoryUserRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LinkConfigRepository for InMemoryLinkRepo {
    fn get(&self, slot: Slot) -> Result<Option<LinkConfig>, CoreError> {
        Ok(lock(&self.inner)?.get(&slot).cloned())
    }

    fn list(&self) -> Result<Vec<LinkConfig>, CoreError> {
        Ok(lock(&self.inner)?.values().cloned().collect())
    }

    fn insert_if_absent(&self, config: LinkConfig) -> Result<bool, CoreError> {
        let mut map = lock(&self.inner)?;
        if map.contains_key(&config.slot) {
            return Ok(false);
        }
        map.insert(config.slot, config);
        Ok(true)
    }

    fn apply_edit(
        &self,
        slot: Slot,
        edit: &LinkEdit,
        seed: &LinkConfig,
    ) -> Result<LinkConfig, CoreError> {
        let mut map = lock(&self.inner)?;
        let record = map.entry(slot).or_insert_with(|| seed.clone());
        record.url = edit.url.clone();
        if let Some(label) = &edit.label {
            record.label = label.clone();
        }
        record.updated_by = Some(edit.updated_by);
        record.updated_at = Some(edit.updated_at);
        Ok(record.clone())
    }

    fn set_active(
        &self,
        slot: Slot,
        is_active: bool,
        updated_by: UserId,
        updated_at: SystemTime,
        seed: &LinkConfig,
    ) -> Result<LinkConfig, CoreError> {
        let mut map = lock(&self.inner)?;
        let record = map.entry(slot).or_insert_with(|| seed.clone());
        record.is_active = is_active;
        record.updated_by = Some(updated_by);
        record.updated_at = Some(updated_at);
        Ok(record.clone())
    }
}

impl ClickRepository for InMemoryClickRepo {
    fn record_click(&self, event: ClickEvent) -> Result<(), CoreError> {
        lock(&self.clicks)?.push(event);
        Ok(())
    }

    fn count_clicks(&self) -> Result<u64, CoreError> {
        Ok(lock(&self.clicks)?.len() as u64)
    }

    fn stats_by_slot(&self) -> Result<Vec<LinkStats>, CoreError> {
        let clicks = lock(&self.clicks)?;
        let mut by_slot: BTreeMap<Slot, (u64, BTreeSet<UserId>)> = BTreeMap::new();
        for c in clicks.iter() {
            let entry = by_slot.entry(c.slot).or_default();
            entry.0 += 1;
            entry.1.insert(c.user_id);
        }
        Ok(by_slot
            .into_iter()
            .map(|(slot, (click_count, users))| LinkStats {
                slot,
                click_count,
                distinct_users: users.len() as u64,
            })
            .collect())
    }

    fn clicks_by_user(&self) -> Result<Vec<(UserId, u64)>, CoreError> {
        let clicks = lock(&self.clicks)?;
        let mut by_user: BTreeMap<UserId, u64> = BTreeMap::new();
        for c in clicks.iter() {
            *by_user.entry(c.user_id).or_default() += 1;
        }
        Ok(by_user.into_iter().collect())
    }
}

impl UserRepository for InMemoryUserRepo {
    fn upsert_user(&self, user: &User) -> Result<(), CoreError> {
        lock(&self.users)?.insert(user.user_id, user.clone());
        Ok(())
    }

    fn get_user(&self, id: UserId) -> Result<Option<User>, CoreError> {
        Ok(lock(&self.users)?.get(&id).cloned())
    }

    fn count_users(&self) -> Result<u64, CoreError> {
        Ok(lock(&self.users)?.len() as u64)
    }

    fn list_users(&self) -> Result<Vec<User>, CoreError> {
        Ok(lock(&self.users)?.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::default_config;
    use std::time::{Duration, UNIX_EPOCH};

    fn edit(url: &str, label: Option<&str>, by: i64, secs: u64) -> LinkEdit {
        LinkEdit {
            url: url.into(),
            label: label.map(Into::into),
            updated_by: UserId::new(by),
            updated_at: UNIX_EPOCH + Duration::from_secs(secs),
        }
    }

    #[test]
    fn apply_edit_seeds_missing_record() {
        let repo = InMemoryLinkRepo::new();
        let seed = default_config(Slot::Contest);
        let got = repo
            .apply_edit(Slot::Contest, &edit("https://new", None, 7, 10), &seed)
            .unwrap();
        assert_eq!(got.url, "https://new");
        assert_eq!(got.label, seed.label);
        assert_eq!(got.updated_by, Some(UserId::new(7)));
        assert_eq!(repo.get(Slot::Contest).unwrap(), Some(got));
    }

    #[test]
    fn insert_if_absent_is_idempotent() {
        let repo = InMemoryLinkRepo::new();
        assert!(repo.insert_if_absent(default_config(Slot::Support)).unwrap());
        assert!(!repo.insert_if_absent(default_config(Slot::Support)).unwrap());
        assert_eq!(repo.list().unwrap().len(), 1);
    }

    #[test]
    fn click_stats_count_distinct_users() {
        let repo = InMemoryClickRepo::new();
        for user in [1, 1, 2] {
            repo.record_click(ClickEvent {
                user_id: UserId::new(user),
                slot: Slot::Videos,
                clicked_at: UNIX_EPOCH,
            })
            .unwrap();
        }
        let stats = repo.stats_by_slot().unwrap();
        assert_eq!(
            stats,
            vec![LinkStats {
                slot: Slot::Videos,
                click_count: 3,
                distinct_users: 2
            }]
        );
        assert_eq!(
            repo.clicks_by_user().unwrap(),
            vec![(UserId::new(1), 2), (UserId::new(2), 1)]
        );
    }

    #[test]
    fn upsert_user_overwrites() {
        let repo = InMemoryUserRepo::new();
        let mut u = User::new(UserId::new(5));
        u.username = Some("old".into());
        repo.upsert_user(&u).unwrap();
        u.username = Some("new".into());
        u.first_name = Some("Anna".into());
        repo.upsert_user(&u).unwrap();
        assert_eq!(repo.count_users().unwrap(), 1);
        let got = repo.get_user(UserId::new(5)).unwrap().unwrap();
        assert_eq!(got.username.as_deref(), Some("new"));
        assert_eq!(got.first_name.as_deref(), Some("Anna"));
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
        assert_edits_are_atomic(&InMemoryLinkRepo::new());
    }
}
