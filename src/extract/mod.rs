//! Extraction pipeline: selectors, field contracts, text cleaning and records
//!
//! Extraction is synchronous and pure with respect to the page it is given;
//! fetching item pages is done by the crawler before calling [`Extractor::extract`].

pub mod field;
pub mod pipeline;
pub mod selector;
pub mod text;

pub use field::FieldSpec;
pub use pipeline::{record_id, DateRule, Extractor, Record, SkipReason};
pub use selector::{CssSelector, PageQuery, Selector};
pub use text::clean_text;
