//! Per-administrator conversation state for the edit workflow.
//!
//! The store is plain bookkeeping keyed by administrator id; all transition
//! and validation logic lives in [`crate::workflow`].

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::SystemTime;

use crate::{CoreError, Slot, UserId};

/// Where an in-progress edit is waiting for input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EditStep {
    AwaitingUrl,
    /// Url accepted; waiting for "change the label too?" answer.
    AwaitingTextChoice,
    AwaitingNewLabel,
}

impl EditStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditStep::AwaitingUrl => "awaiting_url",
            EditStep::AwaitingTextChoice => "awaiting_text_choice",
            EditStep::AwaitingNewLabel => "awaiting_new_label",
        }
    }
}

/// An administrator's in-progress edit of one slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditSession {
    pub owner: UserId,
    pub slot: Slot,
    pub step: EditStep,
    pub pending_url: Option<String>,
    pub pending_label: Option<String>,
    /// Last time the administrator advanced the session.
    pub touched_at: SystemTime,
}

impl EditSession {
    pub fn new(owner: UserId, slot: Slot, now: SystemTime) -> Self {
        Self {
            owner,
            slot,
            step: EditStep::AwaitingUrl,
            pending_url: None,
            pending_label: None,
            touched_at: now,
        }
    }
}

/// Keyed session storage. Distinct administrators never share an entry.
pub trait SessionStore: Send + Sync {
    fn get(&self, admin: UserId) -> Result<Option<EditSession>, CoreError>;
    /// Create or replace the administrator's session.
    fn set(&self, admin: UserId, session: EditSession) -> Result<(), CoreError>;
    fn clear(&self, admin: UserId) -> Result<(), CoreError>;
}

/// Process-local session store.
#[derive(Default)]
pub struct InMemorySessionStore {
    inner: Mutex<HashMap<UserId, EditSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, admin: UserId) -> Result<Option<EditSession>, CoreError> {
        let map = self
            .inner
            .lock()
            .map_err(|_| CoreError::StoreUnavailable("mutex poisoned".into()))?;
        Ok(map.get(&admin).cloned())
    }

    fn set(&self, admin: UserId, session: EditSession) -> Result<(), CoreError> {
        let mut map = self
            .inner
            .lock()
            .map_err(|_| CoreError::StoreUnavailable("mutex poisoned".into()))?;
        map.insert(admin, session);
        Ok(())
    }

    fn clear(&self, admin: UserId) -> Result<(), CoreError> {
        let mut map = self
            .inner
            .lock()
            .map_err(|_| CoreError::StoreUnavailable("mutex poisoned".into()))?;
        map.remove(&admin);
        Ok(())
    }
}
