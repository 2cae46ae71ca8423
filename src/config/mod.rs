//! Configuration module for Archive-Harvester
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use archive_harvester::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("{} categories per day", config.categories.len());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ArchiveConfig, CategoryEntry, Config, CrawlConfig, DateConfig, FieldEntry, GovernorConfig,
    OutputConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
