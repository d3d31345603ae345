//! Lightweight input validation helpers. Keep logic minimal and deterministic.

use crate::CoreError;

const MAX_URL_LEN: usize = 2048;

/// Accepted url prefixes. Links are only checked by prefix, never fetched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UrlPolicy {
    prefixes: Vec<String>,
}

impl Default for UrlPolicy {
    fn default() -> Self {
        Self::new(["http://", "https://", "t.me/"])
    }
}

impl UrlPolicy {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(Into::into)
                .filter(|p: &String| !p.is_empty())
                .collect(),
        }
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Validate a submitted url and return it trimmed.
    pub fn validate(&self, s: &str) -> Result<String, CoreError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidUrl("empty".into()));
        }
        if !self.prefixes.iter().any(|p| trimmed.starts_with(p.as_str())) {
            return Err(CoreError::InvalidUrl(format!(
                "must start with one of: {}",
                self.prefixes.join(", ")
            )));
        }
        if trimmed.len() > MAX_URL_LEN {
            return Err(CoreError::InvalidUrl("too long".into()));
        }
        Ok(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_validation_basic() {
        let policy = UrlPolicy::default();
        assert!(policy.validate("https://example.com").is_ok());
        assert!(policy.validate("http://example.com").is_ok());
        assert!(policy.validate("t.me/grav_tool").is_ok());
        assert!(policy.validate("").is_err());
        assert!(policy.validate("   ").is_err());
        assert!(policy.validate("ftp://example.com").is_err());
        assert!(policy.validate("not-a-url").is_err());
    }

    #[test]
    fn url_is_trimmed() {
        let policy = UrlPolicy::default();
        assert_eq!(policy.validate("  https://e.com/x \n").unwrap(), "https://e.com/x");
    }

    #[test]
    fn custom_prefixes() {
        let policy = UrlPolicy::new(["https://"]);
        assert!(policy.validate("https://ok").is_ok());
        assert!(matches!(policy.validate("http://no"), Err(CoreError::InvalidUrl(_))));
        assert_eq!(policy.prefixes(), ["https://".to_string()]);
    }

    #[test]
    fn rejects_overlong() {
        let policy = UrlPolicy::default();
        let long = format!("https://{}", "a".repeat(MAX_URL_LEN));
        assert!(policy.validate(&long).is_err());
    }
}
