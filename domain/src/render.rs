//! User-facing message text. Kept apart from routing so wording can change
//! without touching control flow.

use std::fmt::Write;
use std::time::SystemTime;

use chrono::{DateTime, Utc};

use crate::validate::UrlPolicy;
use crate::workflow::{EditOutcome, Keywords};
use crate::{CoreError, LinkConfig, UsageReport, User};

pub fn greeting(user: &User) -> String {
    format!("Привет, {}!", user.full_name())
}

pub fn unrouted_text() -> String {
    "Выберите пункт меню или отправьте /start.".to_string()
}

pub fn no_active_edit() -> String {
    "Нет активного редактирования.".to_string()
}

/// Prompt shown after a workflow step.
pub fn edit_outcome(outcome: &EditOutcome, keywords: &Keywords) -> String {
    match outcome {
        EditOutcome::Started { current, .. } => format!(
            "Редактирование кнопки «{}».\nТекущий URL: {}\n\nВведите новый URL или «{}» для отмены.",
            current.label, current.url, keywords.cancel
        ),
        EditOutcome::UrlAccepted { url, .. } => format!(
            "Новый URL: {}\n\nИзменить текст кнопки? Ответьте «{}», любой другой ответ оставит текущий текст.",
            url, keywords.affirm
        ),
        EditOutcome::AwaitingLabel { .. } => "Введите новый текст кнопки:".to_string(),
        EditOutcome::Committed(cfg) => format!(
            "✅ Кнопка «{}» обновлена.\nURL: {}",
            cfg.label, cfg.url
        ),
        EditOutcome::Cancelled { .. } => "❌ Редактирование отменено.".to_string(),
    }
}

pub fn error_text(err: &CoreError, keywords: &Keywords, policy: &UrlPolicy) -> String {
    match err {
        CoreError::Forbidden => "У вас нет прав для выполнения этой команды.".to_string(),
        CoreError::UnknownSlot(name) => format!("Неизвестная кнопка: {name}"),
        CoreError::InvalidUrl(_) => format!(
            "Некорректный URL. Ссылка должна начинаться с {}.\nПопробуйте ещё раз или введите «{}».",
            policy.prefixes().join(", "),
            keywords.cancel
        ),
        CoreError::StoreUnavailable(_) => "Хранилище временно недоступно, попробуйте позже.".to_string(),
        CoreError::Export(_) => "Не удалось создать файл для выгрузки.".to_string(),
    }
}

pub fn commit_failed() -> String {
    "❗ Не удалось сохранить изменения. Начните редактирование заново.".to_string()
}

/// Aggregate statistics; `configs` supplies the labels, in menu order.
pub fn usage_report(report: &UsageReport, configs: &[LinkConfig]) -> String {
    let mut out = String::from("📊 Статистика\n\n");
    let _ = writeln!(out, "👥 Пользователей: {}", report.total_users);
    let _ = writeln!(out, "🔗 Переходов: {}\n", report.total_clicks);
    for stats in &report.per_link {
        let label = configs
            .iter()
            .find(|c| c.slot == stats.slot)
            .map(|c| c.label.as_str())
            .unwrap_or(stats.slot.as_str());
        let _ = writeln!(
            out,
            "{label}: {} переходов, {} уникальных",
            stats.click_count, stats.distinct_users
        );
    }
    out
}

/// Admin view of every slot's stored configuration.
pub fn buttons_summary(configs: &[LinkConfig]) -> String {
    if configs.is_empty() {
        return "❌ Нет настроенных кнопок".to_string();
    }
    let mut out = String::from("🔘 Настройки кнопок:\n\n");
    for cfg in configs {
        let status = if cfg.is_active { "✅" } else { "❌" };
        let _ = writeln!(out, "{status} {} ({})", cfg.label, cfg.slot);
        let _ = writeln!(out, "   📍 URL: {}", cfg.url);
        let _ = writeln!(out, "   📝 Описание: {}", cfg.description);
        let updated = cfg
            .updated_at
            .map(format_time)
            .unwrap_or_else(|| "никогда".to_string());
        let _ = writeln!(out, "   🕒 Обновлено: {updated}\n");
    }
    out
}

fn format_time(t: SystemTime) -> String {
    let dt: DateTime<Utc> = t.into();
    dt.format("%d.%m.%Y %H:%M").to_string()
}
