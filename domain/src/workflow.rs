//! Admin link-editing conversation.
//!
//! ```text
//! Idle --select_slot--> AwaitingUrl --url--> AwaitingTextChoice --affirm--> AwaitingNewLabel
//!                          |  ^                     |                          |
//!                     cancel  invalid url      other text: commit        any text: commit
//! ```
//!
//! Every commit or cancel removes the session, returning the administrator to idle.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::service::ConfigStore;
use crate::session::{EditSession, EditStep, SessionStore};
use crate::{AdminList, Clock, CoreError, LinkConfig, Slot, UserId};

/// Reply words recognised during an edit, compared case-insensitively.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Keywords {
    pub cancel: String,
    pub affirm: String,
}

impl Default for Keywords {
    fn default() -> Self {
        Self {
            cancel: "отмена".into(),
            affirm: "да".into(),
        }
    }
}

impl Keywords {
    pub fn is_cancel(&self, text: &str) -> bool {
        same_word(text, &self.cancel)
    }

    pub fn is_affirm(&self, text: &str) -> bool {
        same_word(text, &self.affirm)
    }
}

fn same_word(text: &str, word: &str) -> bool {
    text.trim().to_lowercase() == word.trim().to_lowercase()
}

#[derive(Clone, Debug)]
pub struct WorkflowOptions {
    pub keywords: Keywords,
    /// Sessions idle for longer than this are dropped. `None` keeps them forever.
    pub session_ttl: Option<Duration>,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self {
            keywords: Keywords::default(),
            session_ttl: Some(Duration::from_secs(15 * 60)),
        }
    }
}

/// What a workflow step produced; the router turns it into a prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EditOutcome {
    /// Session created; ask for the new url.
    Started { slot: Slot, current: LinkConfig },
    /// Url accepted; ask whether to change the label.
    UrlAccepted { slot: Slot, url: String },
    /// Ask for the new label.
    AwaitingLabel { slot: Slot },
    Committed(LinkConfig),
    Cancelled { slot: Slot },
}

pub struct EditWorkflow {
    admins: AdminList,
    sessions: Arc<dyn SessionStore>,
    store: ConfigStore,
    clock: Arc<dyn Clock>,
    options: WorkflowOptions,
}

impl EditWorkflow {
    pub fn new(
        admins: AdminList,
        sessions: Arc<dyn SessionStore>,
        store: ConfigStore,
        clock: Arc<dyn Clock>,
        options: WorkflowOptions,
    ) -> Self {
        Self {
            admins,
            sessions,
            store,
            clock,
            options,
        }
    }

    pub fn keywords(&self) -> &Keywords {
        &self.options.keywords
    }

    /// Start editing `slot`, replacing any session the administrator already has.
    pub fn select_slot(&self, admin: UserId, slot: Slot) -> Result<EditOutcome, CoreError> {
        self.admins.ensure(admin)?;
        if let Some(stale) = self.sessions.get(admin)? {
            debug!(admin = %admin, slot = %stale.slot, "replacing unfinished edit session");
        }
        self.sessions
            .set(admin, EditSession::new(admin, slot, self.clock.now()))?;
        info!(admin = %admin, slot = %slot, "edit session started");
        Ok(EditOutcome::Started {
            slot,
            current: self.store.get(slot),
        })
    }

    /// [`EditWorkflow::select_slot`] for an unparsed slot name.
    pub fn select_slot_named(&self, admin: UserId, name: &str) -> Result<EditOutcome, CoreError> {
        self.admins.ensure(admin)?;
        self.select_slot(admin, Slot::parse(name)?)
    }

    /// The administrator's live session, dropping it first if it has expired.
    pub fn session(&self, admin: UserId) -> Result<Option<EditSession>, CoreError> {
        let Some(session) = self.sessions.get(admin)? else {
            return Ok(None);
        };
        if let Some(ttl) = self.options.session_ttl {
            let idle = self
                .clock
                .now()
                .duration_since(session.touched_at)
                .unwrap_or_default();
            if idle > ttl {
                debug!(admin = %admin, slot = %session.slot, "edit session expired");
                self.sessions.clear(admin)?;
                return Ok(None);
            }
        }
        Ok(Some(session))
    }

    /// Feed one text message into the administrator's session.
    ///
    /// Returns `Ok(None)` when there is no live session, so the caller can
    /// route the text elsewhere. An invalid url is reported as `InvalidUrl`
    /// and leaves the session as it was.
    pub fn submit_text(&self, admin: UserId, text: &str) -> Result<Option<EditOutcome>, CoreError> {
        let Some(mut session) = self.session(admin)? else {
            return Ok(None);
        };
        let keywords = &self.options.keywords;

        match session.step {
            EditStep::AwaitingUrl => {
                if keywords.is_cancel(text) {
                    self.sessions.clear(admin)?;
                    info!(admin = %admin, slot = %session.slot, "edit session cancelled");
                    return Ok(Some(EditOutcome::Cancelled { slot: session.slot }));
                }
                let url = self.store.policy().validate(text)?;
                session.pending_url = Some(url.clone());
                session.step = EditStep::AwaitingTextChoice;
                session.touched_at = self.clock.now();
                let slot = session.slot;
                self.sessions.set(admin, session)?;
                Ok(Some(EditOutcome::UrlAccepted { slot, url }))
            }
            EditStep::AwaitingTextChoice => {
                if keywords.is_affirm(text) {
                    session.step = EditStep::AwaitingNewLabel;
                    session.touched_at = self.clock.now();
                    let slot = session.slot;
                    self.sessions.set(admin, session)?;
                    return Ok(Some(EditOutcome::AwaitingLabel { slot }));
                }
                self.commit(session).map(Some)
            }
            EditStep::AwaitingNewLabel => {
                session.pending_label = Some(text.to_string());
                self.commit(session).map(Some)
            }
        }
    }

    /// Whether `text` would end `session` with a write to the config store.
    pub fn commits_on(&self, session: &EditSession, text: &str) -> bool {
        match session.step {
            EditStep::AwaitingUrl => false,
            EditStep::AwaitingTextChoice => !self.options.keywords.is_affirm(text),
            EditStep::AwaitingNewLabel => true,
        }
    }

    /// Drop the administrator's session at whatever step it is.
    pub fn cancel(&self, admin: UserId) -> Result<Option<EditOutcome>, CoreError> {
        let Some(session) = self.session(admin)? else {
            return Ok(None);
        };
        self.sessions.clear(admin)?;
        info!(admin = %admin, slot = %session.slot, "edit session cancelled");
        Ok(Some(EditOutcome::Cancelled { slot: session.slot }))
    }

    // The session is discarded whether or not the write succeeds; there is no resume path.
    fn commit(&self, session: EditSession) -> Result<EditOutcome, CoreError> {
        let admin = session.owner;
        let result = match session.pending_url.as_deref() {
            Some(url) => self
                .store
                .upsert(session.slot, url, admin, session.pending_label.as_deref()),
            None => Err(CoreError::InvalidUrl("no url collected".into())),
        };
        if let Err(e) = self.sessions.clear(admin) {
            warn!(admin = %admin, slot = %session.slot, err = ?e, "edit session not cleared after commit");
        }
        match result {
            Ok(saved) => Ok(EditOutcome::Committed(saved)),
            Err(e) => {
                error!(admin = %admin, slot = %session.slot, err = ?e, "edit commit failed");
                Err(e)
            }
        }
    }
}
