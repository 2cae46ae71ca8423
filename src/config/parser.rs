use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use archive_harvester::config::load_config;
///
/// let config = load_config(Path::new("harvest.toml")).unwrap();
/// println!("Crawling from {}", config.crawl.start_date);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// This is used to detect if the configuration has changed between crawl runs.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::DateFormat;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const VALID: &str = r#"
[crawl]
start-date = "1403/07/01"
end-date = "1403/07/03"
max-pages-per-target = 5

[[category]]
id = "1"
name = "politics"

[[category]]
id = "2"

[archive]
url-template = "https://news.example/archive?date={date}&cat={category}&page={page}"
link-selectors = ["h3 a::attr(href)"]
next-page-selector = "a.next"
link-pattern = "/news/\\d+/"

[[field]]
name = "title"
selectors = ["h1.title", "h1"]
required = true

[[field]]
name = "body"
selectors = ["div.body p"]
required = true
multiple = true
strip-patterns = ["var .*?\\}\\);"]

[[field]]
name = "published"
selectors = ["div.date"]
required = true

[date]
field = "published"
format = "local-month-name"

[governor]
max-in-flight = 4
min-delay-ms = 100

[output]
database-path = "./harvest.db"
"#;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn with(replace: &str, by: &str) -> String {
        assert!(VALID.contains(replace), "fixture lacks '{}'", replace);
        VALID.replace(replace, by)
    }

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(VALID);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawl.max_pages_per_target, 5);
        assert_eq!(config.categories.len(), 2);
        assert_eq!(config.fields.len(), 3);
        assert_eq!(config.date.format, DateFormat::LocalMonthName);
        assert_eq!(config.user_agent.crawler_name, "ArchiveHarvester");
    }

    #[test]
    fn test_documented_defaults() {
        let config = parse_config(VALID).unwrap();

        assert_eq!(config.crawl.batch_size, 20);
        assert_eq!(config.crawl.max_sink_failures, 3);
        assert!(config.crawl.run_timeout_secs.is_none());
        assert_eq!(config.governor.max_in_flight, 4);
        assert_eq!(config.governor.min_delay_ms, 100);
        assert_eq!(config.governor.max_delay_ms, 10_000);
        assert_eq!(config.governor.max_retries, 5);
        assert_eq!(config.governor.max_concurrent_targets, 2);
        assert_eq!(config.governor.max_concurrent_items, 8);
        assert_eq!(config.governor.request_timeout_secs, 30);
    }

    #[test]
    fn test_derived_values() {
        let config = parse_config(VALID).unwrap();

        let space = config.query_space().unwrap();
        assert_eq!(space.len_hint(), 6);
        assert_eq!(space.categories()[0].as_str(), "1");

        let specs = config.field_specs().unwrap();
        assert!(specs[1].multiple);
        assert_eq!(specs[1].strip_patterns.len(), 1);

        assert!(config.link_pattern().unwrap().is_some());
        assert!(config.selector_exprs().contains(&"a.next"));
        assert!(config.extractor().is_ok());
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        assert!(matches!(
            load_config(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_invalid_start_date() {
        let content = with(r#"start-date = "1403/07/01""#, r#"start-date = "1403/07/31""#);
        assert!(matches!(
            parse_config(&content),
            Err(ConfigError::InvalidDate(_))
        ));
    }

    #[test]
    fn test_start_after_end_is_allowed() {
        let content = with(r#"start-date = "1403/07/01""#, r#"start-date = "1403/08/01""#);
        let config = parse_config(&content).unwrap();
        assert_eq!(config.query_space().unwrap().iter().count(), 0);
    }

    #[test]
    fn test_template_without_page() {
        let content = with("&page={page}", "");
        assert!(matches!(
            parse_config(&content),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_invalid_selector() {
        let content = with(r#"["h1.title", "h1"]"#, r#"["h1[[[", "h1"]"#);
        assert!(matches!(
            parse_config(&content),
            Err(ConfigError::InvalidSelector { .. })
        ));
    }

    #[test]
    fn test_invalid_link_pattern() {
        let content = with(r#"link-pattern = "/news/\\d+/""#, r#"link-pattern = "(""#);
        assert!(matches!(
            parse_config(&content),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_date_field_must_exist() {
        let content = with(r#"field = "published""#, r#"field = "missing""#);
        assert!(matches!(
            parse_config(&content),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_reserved_field_name() {
        let content = with(r#"name = "title""#, r#"name = "url""#);
        assert!(matches!(
            parse_config(&content),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_duplicate_category() {
        let content = with(r#"id = "2""#, r#"id = "1""#);
        assert!(matches!(
            parse_config(&content),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_zero_ceiling() {
        let content = with("max-in-flight = 4", "max-in-flight = 0");
        assert!(matches!(
            parse_config(&content),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_load_with_hash() {
        let file = create_temp_config(VALID);
        let (config, hash) = load_config_with_hash(file.path()).unwrap();
        assert_eq!(config.categories.len(), 2);
        assert_eq!(hash.len(), 64);
    }
}
