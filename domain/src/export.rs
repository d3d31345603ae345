//! Spreadsheet export of the user directory.

use csv::WriterBuilder;
use serde::Serialize;
use tracing::info;

use crate::stats::{ClickLog, UserActivity};
use crate::CoreError;

pub const EXPORT_FILENAME: &str = "users_export.csv";

const HEADER: [&str; 5] = ["user_id", "username", "first_name", "last_name", "clicks"];

/// CSV row (serialization only).
#[derive(Debug, Serialize)]
struct UserCsvRow<'a> {
    user_id: i64,
    username: &'a str,
    first_name: &'a str,
    last_name: &'a str,
    clicks: u64,
}

impl<'a> From<&'a UserActivity> for UserCsvRow<'a> {
    fn from(row: &'a UserActivity) -> Self {
        let user = row.user.as_ref();
        Self {
            user_id: row.user_id.get(),
            username: user.and_then(|u| u.username.as_deref()).unwrap_or(""),
            first_name: user.and_then(|u| u.first_name.as_deref()).unwrap_or(""),
            last_name: user.and_then(|u| u.last_name.as_deref()).unwrap_or(""),
            clicks: row.click_count,
        }
    }
}

/// A rendered export ready to hand to the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportFile {
    pub filename: String,
    pub content: String,
}

#[derive(Clone)]
pub struct ExportService {
    log: ClickLog,
}

impl ExportService {
    pub fn new(log: ClickLog) -> Self {
        Self { log }
    }

    /// Snapshot users (and click-only ids) with their click counts as CSV.
    pub fn export_users(&self) -> Result<ExportFile, CoreError> {
        let rows = self.log.user_activity()?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(Vec::new());
        writer
            .write_record(HEADER)
            .map_err(|e| CoreError::Export(e.to_string()))?;
        for row in &rows {
            writer
                .serialize(UserCsvRow::from(row))
                .map_err(|e| CoreError::Export(e.to_string()))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| CoreError::Export(e.error().to_string()))?;
        let content = String::from_utf8(bytes).map_err(|e| CoreError::Export(e.to_string()))?;
        info!(rows = rows.len(), "users exported");
        Ok(ExportFile {
            filename: EXPORT_FILENAME.to_string(),
            content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_repo::{InMemoryClickRepo, InMemoryUserRepo};
    use crate::{Slot, User, UserId};
    use std::sync::Arc;
    use std::time::UNIX_EPOCH;

    #[test]
    fn export_writes_header_and_rows() {
        let log = ClickLog::new(
            Arc::new(InMemoryClickRepo::new()),
            Arc::new(InMemoryUserRepo::new()),
        );
        let mut u = User::new(UserId::new(10));
        u.username = Some("anna_k".into());
        u.first_name = Some("Anna".into());
        log.upsert_user(&u).unwrap();
        log.record_click(UserId::new(10), Slot::Support, UNIX_EPOCH).unwrap();

        let file = ExportService::new(log).export_users().unwrap();
        assert_eq!(file.filename, EXPORT_FILENAME);
        let lines: Vec<&str> = file.content.lines().collect();
        assert_eq!(lines[0], "user_id,username,first_name,last_name,clicks");
        assert_eq!(lines[1], "10,anna_k,Anna,,1");
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn empty_directory_exports_header_only() {
        let log = ClickLog::new(
            Arc::new(InMemoryClickRepo::new()),
            Arc::new(InMemoryUserRepo::new()),
        );
        let file = ExportService::new(log).export_users().unwrap();
        assert_eq!(file.content, "user_id,username,first_name,last_name,clicks\n");
    }
}
