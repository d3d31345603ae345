//! Typed commands and the handler registry that answers them.
//!
//! Raw message text or button callback data is parsed into a [`Command`] once,
//! at the transport boundary. [`MenuRouter`] then looks the command's kind up
//! in a table built at construction and runs the matching handler.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, warn};

use crate::export::ExportService;
use crate::render;
use crate::service::ConfigStore;
use crate::stats::ClickLog;
use crate::workflow::EditWorkflow;
use crate::{AdminList, Clock, CoreError, Slot, User};

const CLICK_PREFIX: &str = "click:";
const EDIT_PREFIX: &str = "edit:";

/// An incoming user action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Greet the user and show the link menu.
    Start,
    /// Statistics plus the edit keyboard (admins).
    Admin,
    Stats,
    /// Stored configuration of every slot (admins).
    Buttons,
    Export,
    /// Abandon the current edit at any step.
    Cancel,
    EditLink(Slot),
    OpenLink(Slot),
    /// Free text; feeds an active edit session.
    Text(String),
}

/// Discriminant of [`Command`], used as the registry key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Start,
    Admin,
    Stats,
    Buttons,
    Export,
    Cancel,
    EditLink,
    OpenLink,
    Text,
}

impl CommandKind {
    pub const ALL: [CommandKind; 9] = [
        CommandKind::Start,
        CommandKind::Admin,
        CommandKind::Stats,
        CommandKind::Buttons,
        CommandKind::Export,
        CommandKind::Cancel,
        CommandKind::EditLink,
        CommandKind::OpenLink,
        CommandKind::Text,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Start => "start",
            CommandKind::Admin => "admin",
            CommandKind::Stats => "stats",
            CommandKind::Buttons => "buttons",
            CommandKind::Export => "export",
            CommandKind::Cancel => "cancel",
            CommandKind::EditLink => "edit_link",
            CommandKind::OpenLink => "open_link",
            CommandKind::Text => "text",
        }
    }
}

impl Command {
    /// Parse message text or callback data.
    ///
    /// Slash commands may carry a `@botname` suffix. `/edit` without an
    /// argument opens the admin panel. Unknown slash commands are plain text.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let trimmed = raw.trim();
        if let Some(name) = trimmed.strip_prefix(CLICK_PREFIX) {
            return Ok(Command::OpenLink(Slot::parse(name)?));
        }
        if let Some(name) = trimmed.strip_prefix(EDIT_PREFIX) {
            return Ok(Command::EditLink(Slot::parse(name)?));
        }
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Ok(Command::Text(raw.to_string()));
        };
        let (head, arg) = match rest.split_once(char::is_whitespace) {
            Some((h, a)) => (h, a.trim()),
            None => (rest, ""),
        };
        let name = head.split('@').next().unwrap_or(head).to_lowercase();
        let cmd = match name.as_str() {
            "start" => Command::Start,
            "admin" => Command::Admin,
            "stats" => Command::Stats,
            "buttons" => Command::Buttons,
            "export" => Command::Export,
            "cancel" => Command::Cancel,
            "edit" if arg.is_empty() => Command::Admin,
            "edit" => Command::EditLink(Slot::parse(arg)?),
            _ => Command::Text(raw.to_string()),
        };
        Ok(cmd)
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Start => CommandKind::Start,
            Command::Admin => CommandKind::Admin,
            Command::Stats => CommandKind::Stats,
            Command::Buttons => CommandKind::Buttons,
            Command::Export => CommandKind::Export,
            Command::Cancel => CommandKind::Cancel,
            Command::EditLink(_) => CommandKind::EditLink,
            Command::OpenLink(_) => CommandKind::OpenLink,
            Command::Text(_) => CommandKind::Text,
        }
    }
}

/// A parsed command together with the user who sent it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub user: User,
    pub command: Command,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonAction {
    Url(String),
    Callback(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Button {
    pub label: String,
    #[serde(flatten)]
    pub action: ButtonAction,
}

/// Something for the transport to send back to the user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    Text { text: String },
    /// Text with one button per row.
    Menu { text: String, buttons: Vec<Button> },
    Document { filename: String, content: String },
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Reply::Text { text: text.into() }
    }
}

type Handler = fn(&MenuRouter, &Event) -> Result<Vec<Reply>, CoreError>;

pub struct MenuRouter {
    config: ConfigStore,
    log: ClickLog,
    workflow: EditWorkflow,
    exporter: ExportService,
    admins: AdminList,
    clock: Arc<dyn Clock>,
    handlers: HashMap<CommandKind, Handler>,
}

impl MenuRouter {
    pub fn new(
        config: ConfigStore,
        log: ClickLog,
        workflow: EditWorkflow,
        admins: AdminList,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let exporter = ExportService::new(log.clone());
        Self {
            config,
            log,
            workflow,
            exporter,
            admins,
            clock,
            handlers: Self::registry(),
        }
    }

    fn registry() -> HashMap<CommandKind, Handler> {
        let mut table: HashMap<CommandKind, Handler> = HashMap::new();
        table.insert(CommandKind::Start, Self::handle_start);
        table.insert(CommandKind::Admin, Self::handle_admin);
        table.insert(CommandKind::Stats, Self::handle_stats);
        table.insert(CommandKind::Buttons, Self::handle_buttons);
        table.insert(CommandKind::Export, Self::handle_export);
        table.insert(CommandKind::Cancel, Self::handle_cancel);
        table.insert(CommandKind::EditLink, Self::handle_edit);
        table.insert(CommandKind::OpenLink, Self::handle_open);
        table.insert(CommandKind::Text, Self::handle_text);
        table
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn is_admin(&self, user: &User) -> bool {
        self.admins.contains(user.user_id)
    }

    /// Parse `raw` and dispatch it; parse errors become replies too.
    ///
    /// While the sender has a live edit session, everything except `/cancel`
    /// and a restart on another slot is fed to the session as plain text.
    pub fn handle_raw(&self, user: User, raw: &str) -> Vec<Reply> {
        let parsed = Command::parse(raw);
        let editing = match self.has_live_session(&user) {
            Ok(editing) => editing,
            Err(e) => {
                error!(user = %user.user_id, err = ?e, "session lookup failed");
                return vec![self.error_reply(&e)];
            }
        };
        let command = match parsed {
            Ok(cmd @ (Command::Cancel | Command::EditLink(_))) => cmd,
            _ if editing => Command::Text(raw.to_string()),
            Ok(cmd) => cmd,
            Err(e) => {
                debug!(user = %user.user_id, err = %e, "unparseable input");
                return vec![self.error_reply(&e)];
            }
        };
        self.dispatch(&Event { user, command })
    }

    fn has_live_session(&self, user: &User) -> Result<bool, CoreError> {
        if !self.is_admin(user) {
            return Ok(false);
        }
        Ok(self.workflow.session(user.user_id)?.is_some())
    }

    pub fn dispatch(&self, event: &Event) -> Vec<Reply> {
        let kind = event.command.kind();
        let Some(handler) = self.handlers.get(&kind) else {
            warn!(kind = kind.as_str(), "no handler registered");
            return Vec::new();
        };
        debug!(user = %event.user.user_id, kind = kind.as_str(), "dispatch");
        match handler(self, event) {
            Ok(replies) => replies,
            Err(e) => {
                match &e {
                    CoreError::StoreUnavailable(_) | CoreError::Export(_) => {
                        error!(user = %event.user.user_id, kind = kind.as_str(), err = ?e, "handler failed")
                    }
                    _ => debug!(user = %event.user.user_id, kind = kind.as_str(), err = %e, "handler rejected"),
                }
                vec![self.error_reply(&e)]
            }
        }
    }

    fn error_reply(&self, e: &CoreError) -> Reply {
        Reply::text(render::error_text(
            e,
            self.workflow.keywords(),
            self.config.policy(),
        ))
    }

    fn handle_start(&self, event: &Event) -> Result<Vec<Reply>, CoreError> {
        if let Err(e) = self.log.upsert_user(&event.user) {
            warn!(user = %event.user.user_id, err = ?e, "user upsert failed");
        }
        let buttons = Slot::ALL
            .iter()
            .map(|slot| Button {
                label: self.config.get(*slot).label,
                action: ButtonAction::Callback(format!("{CLICK_PREFIX}{slot}")),
            })
            .collect();
        Ok(vec![Reply::Menu {
            text: render::greeting(&event.user),
            buttons,
        }])
    }

    fn handle_open(&self, event: &Event) -> Result<Vec<Reply>, CoreError> {
        let &Command::OpenLink(slot) = &event.command else {
            return Ok(Vec::new());
        };
        if let Err(e) = self
            .log
            .record_click(event.user.user_id, slot, self.clock.now())
        {
            error!(user = %event.user.user_id, slot = %slot, err = ?e, "click not recorded");
        }
        let cfg = self.config.get(slot);
        Ok(vec![Reply::Menu {
            text: cfg.label.clone(),
            buttons: vec![Button {
                label: cfg.label,
                action: ButtonAction::Url(cfg.url),
            }],
        }])
    }

    fn handle_admin(&self, event: &Event) -> Result<Vec<Reply>, CoreError> {
        self.admins.ensure(event.user.user_id)?;
        let configs: Vec<_> = Slot::ALL.iter().map(|s| self.config.get(*s)).collect();
        let report = self.log.aggregate()?;
        let buttons = configs
            .iter()
            .map(|cfg| Button {
                label: format!("✏️ {}", cfg.label),
                action: ButtonAction::Callback(format!("{EDIT_PREFIX}{}", cfg.slot)),
            })
            .collect();
        Ok(vec![Reply::Menu {
            text: render::usage_report(&report, &configs),
            buttons,
        }])
    }

    fn handle_stats(&self, event: &Event) -> Result<Vec<Reply>, CoreError> {
        self.admins.ensure(event.user.user_id)?;
        let configs: Vec<_> = Slot::ALL.iter().map(|s| self.config.get(*s)).collect();
        let report = self.log.aggregate()?;
        Ok(vec![Reply::text(render::usage_report(&report, &configs))])
    }

    fn handle_buttons(&self, event: &Event) -> Result<Vec<Reply>, CoreError> {
        self.admins.ensure(event.user.user_id)?;
        let summary = self.config.summary()?;
        Ok(vec![Reply::text(render::buttons_summary(&summary))])
    }

    fn handle_export(&self, event: &Event) -> Result<Vec<Reply>, CoreError> {
        self.admins.ensure(event.user.user_id)?;
        let file = self.exporter.export_users()?;
        Ok(vec![
            Reply::text("Начинаю выгрузку..."),
            Reply::Document {
                filename: file.filename,
                content: file.content,
            },
        ])
    }

    fn handle_cancel(&self, event: &Event) -> Result<Vec<Reply>, CoreError> {
        let text = match self.workflow.cancel(event.user.user_id)? {
            Some(outcome) => render::edit_outcome(&outcome, self.workflow.keywords()),
            None => render::no_active_edit(),
        };
        Ok(vec![Reply::text(text)])
    }

    fn handle_edit(&self, event: &Event) -> Result<Vec<Reply>, CoreError> {
        let &Command::EditLink(slot) = &event.command else {
            return Ok(Vec::new());
        };
        let outcome = self.workflow.select_slot(event.user.user_id, slot)?;
        Ok(vec![Reply::text(render::edit_outcome(
            &outcome,
            self.workflow.keywords(),
        ))])
    }

    fn handle_text(&self, event: &Event) -> Result<Vec<Reply>, CoreError> {
        let Command::Text(text) = &event.command else {
            return Ok(Vec::new());
        };
        let admin = event.user.user_id;
        let Some(session) = self.workflow.session(admin)? else {
            return Ok(vec![Reply::text(render::unrouted_text())]);
        };
        let committing = self.workflow.commits_on(&session, text);
        match self.workflow.submit_text(admin, text) {
            Ok(Some(outcome)) => Ok(vec![Reply::text(render::edit_outcome(
                &outcome,
                self.workflow.keywords(),
            ))]),
            Ok(None) => Ok(vec![Reply::text(render::unrouted_text())]),
            Err(CoreError::StoreUnavailable(_)) if committing => {
                Ok(vec![Reply::text(render::commit_failed())])
            }
            Err(e) => Err(e),
        }
    }
}
