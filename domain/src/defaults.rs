//! Compiled-in slot configuration used when no record is stored.

use crate::{LinkConfig, Slot};

/// Default label, url and description for `slot`.
pub fn default_config(slot: Slot) -> LinkConfig {
    let (label, url, description) = match slot {
        Slot::Support => (
            "📝 Написать в поддержку",
            "https://t.me/sam_soberu",
            "Ссылка на поддержку",
        ),
        Slot::Contest => (
            "🎁 Конкурс с крутыми призами",
            "https://gravtool.ru/contest",
            "Страница конкурса",
        ),
        Slot::Videos => (
            "🎬 Ролики по работе с гравером",
            "https://t.me/grav_tool/86",
            "Обучающие видео",
        ),
        Slot::Catalog => (
            "🛍 Каталог товаров",
            "https://gravtool.ru/catalog",
            "Каталог товаров",
        ),
        Slot::Channel => (
            "📢 Наш телеграм канал",
            "https://t.me/grav_tool",
            "Основной Telegram канал",
        ),
    };
    LinkConfig {
        slot,
        label: label.to_string(),
        url: url.to_string(),
        description: description.to_string(),
        is_active: true,
        updated_by: None,
        updated_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::UrlPolicy;

    #[test]
    fn every_slot_has_a_valid_default() {
        let policy = UrlPolicy::default();
        for slot in Slot::ALL {
            let cfg = default_config(slot);
            assert_eq!(cfg.slot, slot);
            assert!(!cfg.label.is_empty());
            assert!(policy.validate(&cfg.url).is_ok(), "bad default url for {slot}");
            assert!(cfg.is_active);
            assert!(cfg.updated_by.is_none());
        }
    }
}
