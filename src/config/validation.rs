use crate::config::types::{
    ArchiveConfig, CategoryEntry, Config, CrawlConfig, FieldEntry, GovernorConfig,
    UserAgentConfig,
};
use crate::extract::selector::validate_expr;
use crate::ConfigError;
use regex::Regex;
use std::collections::HashSet;
use url::Url;

/// Field names produced by the pipeline itself
const RESERVED_FIELD_NAMES: &[&str] = &["id", "url", "category", "date_iso"];

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawl_config(&config.crawl)?;
    validate_categories(&config.categories)?;
    validate_archive_config(&config.archive)?;
    validate_fields(&config.fields)?;
    validate_date_field(config)?;
    validate_governor_config(&config.governor)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates the date range and progress settings
fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    // Parsed here only to reject invalid dates early; start > end is allowed
    config
        .start_date
        .parse::<crate::LocalDate>()
        .map_err(|e| ConfigError::InvalidDate(format!("start-date '{}': {}", config.start_date, e)))?;
    config
        .end_date
        .parse::<crate::LocalDate>()
        .map_err(|e| ConfigError::InvalidDate(format!("end-date '{}': {}", config.end_date, e)))?;

    if config.max_pages_per_target < 1 {
        return Err(ConfigError::Validation(
            "max-pages-per-target must be >= 1".to_string(),
        ));
    }

    if config.batch_size < 1 {
        return Err(ConfigError::Validation("batch-size must be >= 1".to_string()));
    }

    if config.max_sink_failures < 1 {
        return Err(ConfigError::Validation(
            "max-sink-failures must be >= 1".to_string(),
        ));
    }

    if config.run_timeout_secs == Some(0) {
        return Err(ConfigError::Validation(
            "run-timeout-secs must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates the category set
fn validate_categories(categories: &[CategoryEntry]) -> Result<(), ConfigError> {
    if categories.is_empty() {
        return Err(ConfigError::Validation(
            "At least one [[category]] is required".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for category in categories {
        if category.id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Category id cannot be empty".to_string(),
            ));
        }
        if !seen.insert(category.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Duplicate category id '{}'",
                category.id
            )));
        }
    }

    Ok(())
}

/// Validates the archive URL template and link discovery settings
fn validate_archive_config(config: &ArchiveConfig) -> Result<(), ConfigError> {
    if !config.url_template.contains("{page}") {
        return Err(ConfigError::Validation(format!(
            "url-template must contain a {{page}} placeholder, got '{}'",
            config.url_template
        )));
    }

    // Substitute placeholders with sample values so the rest parses as a URL
    let sample = config
        .url_template
        .replace("{year}", "1403")
        .replace("{month}", "07")
        .replace("{day}", "13")
        .replace("{date}", "1403/07/13")
        .replace("{category}", "category")
        .replace("{page}", "1");
    let url = Url::parse(&sample)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid url-template: {}", e)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "url-template must be http or https, got '{}'",
            url.scheme()
        )));
    }

    validate_selector_list("link-selectors", &config.link_selectors)?;

    if let Some(next) = &config.next_page_selector {
        validate_expr(next)?;
    }

    if let Some(pattern) = &config.link_pattern {
        validate_pattern(pattern)?;
    }

    Ok(())
}

/// Validates field contracts
fn validate_fields(fields: &[FieldEntry]) -> Result<(), ConfigError> {
    if fields.is_empty() {
        return Err(ConfigError::Validation(
            "At least one [[field]] is required".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for field in fields {
        if field.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Field name cannot be empty".to_string(),
            ));
        }
        if RESERVED_FIELD_NAMES.contains(&field.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Field name '{}' is reserved",
                field.name
            )));
        }
        if !seen.insert(field.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Duplicate field name '{}'",
                field.name
            )));
        }

        validate_selector_list(&format!("field '{}' selectors", field.name), &field.selectors)?;

        for pattern in &field.strip_patterns {
            validate_pattern(pattern)?;
        }
    }

    Ok(())
}

/// The date rule must point at a configured field
fn validate_date_field(config: &Config) -> Result<(), ConfigError> {
    if !config.fields.iter().any(|f| f.name == config.date.field) {
        return Err(ConfigError::Validation(format!(
            "[date] field '{}' does not name a [[field]]",
            config.date.field
        )));
    }
    Ok(())
}

/// Validates governor ceilings and delays
fn validate_governor_config(config: &GovernorConfig) -> Result<(), ConfigError> {
    let ceilings = [
        ("max-in-flight", config.max_in_flight),
        ("max-concurrent-targets", config.max_concurrent_targets),
        ("max-concurrent-items", config.max_concurrent_items),
        ("failure-window", config.failure_window),
    ];
    for (name, value) in ceilings {
        if value < 1 {
            return Err(ConfigError::Validation(format!(
                "{} must be >= 1, got {}",
                name, value
            )));
        }
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.target_concurrency.is_nan() || config.target_concurrency <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "target-concurrency must be > 0, got {}",
            config.target_concurrency
        )));
    }

    if config.min_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "min-delay-ms ({}) must not exceed max-delay-ms ({})",
            config.min_delay_ms, config.max_delay_ms
        )));
    }

    if !(0.0..=1.0).contains(&config.failure_rate_threshold) {
        return Err(ConfigError::Validation(format!(
            "failure-rate-threshold must be between 0 and 1, got {}",
            config.failure_rate_threshold
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &crate::config::types::OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_selector_list(what: &str, selectors: &[String]) -> Result<(), ConfigError> {
    if selectors.is_empty() {
        return Err(ConfigError::Validation(format!("{} cannot be empty", what)));
    }
    for expr in selectors {
        validate_expr(expr)?;
    }
    Ok(())
}

fn validate_pattern(pattern: &str) -> Result<(), ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;
    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    // Basic email format check: must contain @ and have text on both sides
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("admin@sub.example.com").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("invalid").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("user@domain").is_err());
    }

    #[test]
    fn test_validate_pattern() {
        assert!(validate_pattern(r"/news/\d+/").is_ok());
        assert!(matches!(
            validate_pattern(r"(unclosed"),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_governor_defaults_are_valid() {
        assert!(validate_governor_config(&GovernorConfig::default()).is_ok());
    }

    #[test]
    fn test_governor_rejects_bad_values() {
        let mut config = GovernorConfig::default();
        config.max_in_flight = 0;
        assert!(validate_governor_config(&config).is_err());

        let mut config = GovernorConfig::default();
        config.min_delay_ms = 20_000;
        assert!(validate_governor_config(&config).is_err());

        let mut config = GovernorConfig::default();
        config.target_concurrency = 0.0;
        assert!(validate_governor_config(&config).is_err());

        let mut config = GovernorConfig::default();
        config.failure_rate_threshold = 1.5;
        assert!(validate_governor_config(&config).is_err());
    }

    #[test]
    fn test_categories() {
        let entry = |id: &str| CategoryEntry {
            id: id.to_string(),
            name: None,
        };
        assert!(validate_categories(&[entry("a"), entry("b")]).is_ok());
        assert!(validate_categories(&[]).is_err());
        assert!(validate_categories(&[entry("a"), entry("a")]).is_err());
        assert!(validate_categories(&[entry(" ")]).is_err());
    }
}
