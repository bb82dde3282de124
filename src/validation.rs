use std::collections::BTreeMap;
use thiserror::Error;

use crate::config;

/// Field-level validation failures, keyed by field name
#[derive(Debug, Error, Default, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationErrors {
    pub message: String,
    pub fields: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self {
            message: "Validation failed".to_string(),
            ..Default::default()
        };
        errors.fields.insert(field.to_string(), message.into());
        errors
    }
}

/// Collects field errors; `finish` turns them into a result
#[derive(Debug, Default)]
pub struct Validator {
    fields: BTreeMap<String, String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) -> &mut Self {
        // first failure per field wins
        self.fields.entry(field.to_string()).or_insert_with(|| message.into());
        self
    }

    pub fn required(&mut self, field: &str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.add(field, "This field is required");
        }
        self
    }

    pub fn max_len(&mut self, field: &str, value: &str, max: usize) -> &mut Self {
        if value.chars().count() > max {
            self.add(field, format!("Must be at most {} characters", max));
        }
        self
    }

    pub fn email(&mut self, field: &str, value: &str) -> &mut Self {
        if !is_valid_email(value) {
            self.add(field, "Must be a valid email address");
        }
        self
    }

    pub fn password(&mut self, field: &str, value: &str) -> &mut Self {
        let min = config::config().security.min_password_length;
        self.password_with_min(field, value, min)
    }

    fn password_with_min(&mut self, field: &str, value: &str, min: usize) -> &mut Self {
        if value.chars().count() < min {
            self.add(field, format!("Must be at least {} characters", min));
        }
        self
    }

    pub fn rating(&mut self, field: &str, value: i16) -> &mut Self {
        if !(1..=5).contains(&value) {
            self.add(field, "Must be between 1 and 5");
        }
        self
    }

    pub fn optional_rating(&mut self, field: &str, value: Option<i16>) -> &mut Self {
        if let Some(value) = value {
            self.rating(field, value);
        }
        self
    }

    pub fn optional_color(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        if let Some(value) = value {
            if !is_hex_color(value) {
                self.add(field, "Must be a hex colour like #1a2b3c");
            }
        }
        self
    }

    pub fn optional_url(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        if let Some(value) = value {
            if !is_http_url(value) {
                self.add(field, "Must be an http(s) URL");
            }
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn finish(&mut self) -> Result<(), ValidationErrors> {
        if self.fields.is_empty() {
            return Ok(());
        }
        Err(ValidationErrors {
            message: "Validation failed".to_string(),
            fields: std::mem::take(&mut self.fields),
        })
    }
}

/// Trim an optional string and drop it when empty
pub fn clean_optional(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Apply a PATCH value to an optional column: absent keeps, blank clears
pub fn patch_optional(target: &mut Option<String>, patch: Option<String>) {
    if let Some(value) = patch {
        *target = clean_optional(Some(value));
    }
}

/// ILIKE pattern matching `q` anywhere, with `%`, `_` and `\` taken literally
pub fn contains_pattern(q: &str) -> String {
    let mut pattern = String::with_capacity(q.len() + 2);
    pattern.push('%');
    for c in q.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.len() > 254 || email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
}

pub fn is_hex_color(value: &str) -> bool {
    match value.strip_prefix('#') {
        Some(hex) => (hex.len() == 3 || hex.len() == 6) && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

pub fn is_http_url(value: &str) -> bool {
    match url::Url::parse(value.trim()) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host().is_some(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_wildcards_are_escaped() {
        assert_eq!(contains_pattern("acme"), "%acme%");
        assert_eq!(contains_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(contains_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("rep@example.com"));
        assert!(is_valid_email("  first.last+tag@sub.example.co  "));
        assert!(!is_valid_email("no-at-sign.example.com"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a@@b.com"));
        assert!(!is_valid_email("a b@c.com"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("a@example..com"));
    }

    #[test]
    fn colours_and_urls() {
        assert!(is_hex_color("#fff"));
        assert!(is_hex_color("#1A2b3C"));
        assert!(!is_hex_color("1a2b3c"));
        assert!(!is_hex_color("#12345"));
        assert!(is_http_url("https://acme.example.com/logo.png"));
        assert!(!is_http_url("file:///etc/passwd"));
    }

    #[test]
    fn validator_collects_first_error_per_field() {
        let mut v = Validator::new();
        v.required("name", "  ")
            .max_len("name", "x", 0)
            .email("email", "nope")
            .rating("overall_rating", 6)
            .optional_rating("relevance_rating", Some(3))
            .password_with_min("password", "short", 8);

        let err = v.finish().unwrap_err();
        assert_eq!(err.fields.len(), 4);
        assert_eq!(err.fields["name"], "This field is required");
        assert_eq!(err.fields["overall_rating"], "Must be between 1 and 5");
        assert_eq!(err.fields["password"], "Must be at least 8 characters");
        assert!(v.is_empty());
    }

    #[test]
    fn validator_passes_clean_input() {
        let mut v = Validator::new();
        v.required("title", "Onboarding tour")
            .optional_color("primary_color", Some("#0af"))
            .optional_url("website_url", None);
        assert!(v.finish().is_ok());
    }

    #[test]
    fn cleans_optional_strings() {
        assert_eq!(clean_optional(Some("  Acme ".into())), Some("Acme".into()));
        assert_eq!(clean_optional(Some("   ".into())), None);
        assert_eq!(normalize_email(" Rep@Example.COM "), "rep@example.com");

        let mut company = Some("Acme".to_string());
        patch_optional(&mut company, None);
        assert_eq!(company.as_deref(), Some("Acme"));
        patch_optional(&mut company, Some(" Globex ".into()));
        assert_eq!(company.as_deref(), Some("Globex"));
        patch_optional(&mut company, Some("".into()));
        assert_eq!(company, None);
    }
}
