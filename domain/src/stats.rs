//! Click log and user directory.

use std::sync::Arc;
use std::time::SystemTime;

use tracing::debug;

use crate::{
    ClickEvent, ClickRepository, CoreError, LinkStats, Slot, UsageReport, User, UserId,
    UserRepository,
};

/// One row of the per-user activity snapshot used by exports.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserActivity {
    pub user_id: UserId,
    /// `None` when clicks exist for an id that was never recorded.
    pub user: Option<User>,
    pub click_count: u64,
}

/// Records users and clicks, and answers aggregate questions about them.
///
/// Aggregates are computed on every call; nothing is cached.
#[derive(Clone)]
pub struct ClickLog {
    clicks: Arc<dyn ClickRepository>,
    users: Arc<dyn UserRepository>,
}

impl ClickLog {
    pub fn new(clicks: Arc<dyn ClickRepository>, users: Arc<dyn UserRepository>) -> Self {
        Self { clicks, users }
    }

    pub fn record_click(
        &self,
        user_id: UserId,
        slot: Slot,
        clicked_at: SystemTime,
    ) -> Result<(), CoreError> {
        self.clicks.record_click(ClickEvent {
            user_id,
            slot,
            clicked_at,
        })?;
        debug!(user = %user_id, slot = %slot, "click recorded");
        Ok(())
    }

    pub fn upsert_user(&self, user: &User) -> Result<(), CoreError> {
        self.users.upsert_user(user)
    }

    /// Totals plus one entry per slot in menu order, zero-filled.
    pub fn aggregate(&self) -> Result<UsageReport, CoreError> {
        let total_users = self.users.count_users()?;
        let total_clicks = self.clicks.count_clicks()?;
        let by_slot = self.clicks.stats_by_slot()?;
        let per_link = Slot::ALL
            .iter()
            .map(|slot| {
                by_slot
                    .iter()
                    .find(|s| s.slot == *slot)
                    .cloned()
                    .unwrap_or(LinkStats {
                        slot: *slot,
                        click_count: 0,
                        distinct_users: 0,
                    })
            })
            .collect();
        Ok(UsageReport {
            total_users,
            total_clicks,
            per_link,
        })
    }

    /// Every known user with their click count, followed by ids that only
    /// appear in the click log.
    pub fn user_activity(&self) -> Result<Vec<UserActivity>, CoreError> {
        let mut counts = self.clicks.clicks_by_user()?;
        let mut out: Vec<UserActivity> = self
            .users
            .list_users()?
            .into_iter()
            .map(|user| {
                let click_count = match counts.iter().position(|(id, _)| *id == user.user_id) {
                    Some(idx) => counts.swap_remove(idx).1,
                    None => 0,
                };
                UserActivity {
                    user_id: user.user_id,
                    user: Some(user),
                    click_count,
                }
            })
            .collect();
        counts.sort_by_key(|(id, _)| *id);
        out.extend(counts.into_iter().map(|(user_id, click_count)| UserActivity {
            user_id,
            user: None,
            click_count,
        }));
        Ok(out)
    }
}
