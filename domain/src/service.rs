use std::sync::Arc;

use tracing::{info, warn};

use crate::defaults::default_config;
use crate::validate::UrlPolicy;
use crate::{Clock, CoreError, LinkConfig, LinkConfigRepository, LinkEdit, Slot, UserId};

/// Application service owning slot configuration.
///
/// Lookups never fail for a known slot: a missing or inactive record, or an
/// unreadable store, falls back to the compiled-in default. `upsert` is the
/// only path that changes a slot's url or label, and it delegates the
/// read-modify-write to the repository so each edit lands as one unit.
#[derive(Clone)]
pub struct ConfigStore {
    repo: Arc<dyn LinkConfigRepository>,
    clock: Arc<dyn Clock>,
    policy: UrlPolicy,
}

impl ConfigStore {
    pub fn new(repo: Arc<dyn LinkConfigRepository>, clock: Arc<dyn Clock>, policy: UrlPolicy) -> Self {
        Self {
            repo,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &UrlPolicy {
        &self.policy
    }

    /// Store a default record for every slot that has none. Returns how many were created.
    pub fn seed_defaults(&self) -> Result<usize, CoreError> {
        let mut created = 0;
        for slot in Slot::ALL {
            if self.repo.insert_if_absent(default_config(slot))? {
                info!(slot = %slot, "created default slot config");
                created += 1;
            }
        }
        Ok(created)
    }

    /// Resolve the configuration shown to users for `slot`.
    pub fn get(&self, slot: Slot) -> LinkConfig {
        match self.repo.get(slot) {
            Ok(Some(cfg)) if cfg.is_active => cfg,
            Ok(_) => default_config(slot),
            Err(e) => {
                warn!(slot = %slot, err = ?e, "config read failed, using default");
                default_config(slot)
            }
        }
    }

    /// Like [`ConfigStore::get`] but for an unparsed slot name.
    pub fn lookup(&self, name: &str) -> Result<LinkConfig, CoreError> {
        Ok(self.get(Slot::parse(name)?))
    }

    /// Replace the slot's url and, when `label` is given, its label.
    pub fn upsert(
        &self,
        slot: Slot,
        url: &str,
        editor: UserId,
        label: Option<&str>,
    ) -> Result<LinkConfig, CoreError> {
        let url = self.policy.validate(url)?;
        let edit = LinkEdit {
            url,
            label: label.map(str::to_string),
            updated_by: editor,
            updated_at: self.clock.now(),
        };
        let saved = self.repo.apply_edit(slot, &edit, &default_config(slot))?;
        info!(
            slot = %slot,
            admin = %editor,
            label_changed = edit.label.is_some(),
            "slot config updated"
        );
        Ok(saved)
    }

    pub fn set_active(
        &self,
        slot: Slot,
        is_active: bool,
        editor: UserId,
    ) -> Result<LinkConfig, CoreError> {
        let saved = self.repo.set_active(
            slot,
            is_active,
            editor,
            self.clock.now(),
            &default_config(slot),
        )?;
        info!(slot = %slot, admin = %editor, is_active, "slot active flag changed");
        Ok(saved)
    }

    /// Snapshot of every slot in menu order. Stored records are shown as
    /// stored, including inactive ones; slots without a record show the default.
    pub fn summary(&self) -> Result<Vec<LinkConfig>, CoreError> {
        let mut stored = self.repo.list()?;
        Ok(Slot::ALL
            .iter()
            .map(|slot| match stored.iter().position(|c| c.slot == *slot) {
                Some(idx) => stored.swap_remove(idx),
                None => default_config(*slot),
            })
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::adapters::memory_repo::InMemoryLinkRepo;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    pub(crate) struct TestClock;
    impl Clock for TestClock {
        fn now(&self) -> SystemTime {
            UNIX_EPOCH + Duration::from_secs(1_000)
        }
    }

    /// Repository whose every call fails, for store-outage paths.
    pub(crate) struct BrokenRepo;
    impl LinkConfigRepository for BrokenRepo {
        fn get(&self, _: Slot) -> Result<Option<LinkConfig>, CoreError> {
            Err(CoreError::StoreUnavailable("down".into()))
        }
        fn list(&self) -> Result<Vec<LinkConfig>, CoreError> {
            Err(CoreError::StoreUnavailable("down".into()))
        }
        fn insert_if_absent(&self, _: LinkConfig) -> Result<bool, CoreError> {
            Err(CoreError::StoreUnavailable("down".into()))
        }
        fn apply_edit(&self, _: Slot, _: &LinkEdit, _: &LinkConfig) -> Result<LinkConfig, CoreError> {
            Err(CoreError::StoreUnavailable("down".into()))
        }
        fn set_active(
            &self,
            _: Slot,
            _: bool,
            _: UserId,
            _: SystemTime,
            _: &LinkConfig,
        ) -> Result<LinkConfig, CoreError> {
            Err(CoreError::StoreUnavailable("down".into()))
        }
    }

    fn store() -> (ConfigStore, Arc<InMemoryLinkRepo>) {
        let repo = Arc::new(InMemoryLinkRepo::new());
        let store = ConfigStore::new(repo.clone(), Arc::new(TestClock), UrlPolicy::default());
        (store, repo)
    }

    #[test]
    fn get_falls_back_to_default_for_every_slot() {
        let (store, _) = store();
        let policy = UrlPolicy::default();
        for slot in Slot::ALL {
            let cfg = store.get(slot);
            assert!(!cfg.label.is_empty());
            assert!(policy.validate(&cfg.url).is_ok());
        }
    }

    #[test]
    fn get_survives_store_outage() {
        let store = ConfigStore::new(Arc::new(BrokenRepo), Arc::new(TestClock), UrlPolicy::default());
        assert_eq!(store.get(Slot::Support), default_config(Slot::Support));
        assert!(store.summary().is_err());
    }

    #[test]
    fn lookup_unknown_slot() {
        let (store, _) = store();
        assert!(matches!(store.lookup("nope"), Err(CoreError::UnknownSlot(_))));
        assert_eq!(store.lookup("catalog").unwrap().slot, Slot::Catalog);
    }

    #[test]
    fn upsert_without_label_keeps_label() {
        let (store, _) = store();
        store
            .upsert(Slot::Support, "https://a", UserId::new(1), Some("Custom"))
            .unwrap();
        let saved = store
            .upsert(Slot::Support, "https://b", UserId::new(2), None)
            .unwrap();
        assert_eq!(saved.label, "Custom");
        assert_eq!(saved.url, "https://b");
        assert_eq!(saved.updated_by, Some(UserId::new(2)));
        assert_eq!(saved.updated_at, Some(TestClock.now()));
        assert_eq!(store.get(Slot::Support), saved);
    }

    #[test]
    fn upsert_with_label_overwrites() {
        let (store, _) = store();
        let saved = store
            .upsert(Slot::Videos, "t.me/new", UserId::new(3), Some("New Label"))
            .unwrap();
        assert_eq!(saved.label, "New Label");
        assert_eq!(saved.url, "t.me/new");
        assert_eq!(saved.description, default_config(Slot::Videos).description);
    }

    #[test]
    fn invalid_url_leaves_record_untouched() {
        let (store, repo) = store();
        store.seed_defaults().unwrap();
        let before = repo.get(Slot::Contest).unwrap();
        let err = store
            .upsert(Slot::Contest, "not-a-url", UserId::new(1), Some("X"))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidUrl(_)));
        assert_eq!(repo.get(Slot::Contest).unwrap(), before);
    }

    #[test]
    fn seed_defaults_once() {
        let (store, repo) = store();
        assert_eq!(store.seed_defaults().unwrap(), Slot::ALL.len());
        assert_eq!(store.seed_defaults().unwrap(), 0);
        assert_eq!(repo.list().unwrap().len(), Slot::ALL.len());
    }

    #[test]
    fn inactive_record_falls_back_but_shows_in_summary() {
        let (store, _) = store();
        store
            .upsert(Slot::Catalog, "https://shop", UserId::new(1), None)
            .unwrap();
        store.set_active(Slot::Catalog, false, UserId::new(1)).unwrap();
        assert_eq!(store.get(Slot::Catalog).url, default_config(Slot::Catalog).url);

        let summary = store.summary().unwrap();
        assert_eq!(summary.len(), Slot::ALL.len());
        let catalog = summary.iter().find(|c| c.slot == Slot::Catalog).unwrap();
        assert!(!catalog.is_active);
        assert_eq!(catalog.url, "https://shop");
        let order: Vec<Slot> = summary.iter().map(|c| c.slot).collect();
        assert_eq!(order, Slot::ALL.to_vec());
    }
}
