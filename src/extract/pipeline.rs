//! Record extraction: fields, validation and date conversion

use super::field::FieldSpec;
use super::selector::PageQuery;
use crate::calendar::{parse_iso_date, DateFormat, IsoDate};
use crate::crawler::FetchFailure;
use crate::query::CategoryId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// An extracted, validated output unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Hex SHA-256 of the normalized item URL
    pub id: String,
    pub url: String,
    pub category: CategoryId,
    pub fields: BTreeMap<String, String>,
    pub date_iso: IsoDate,
}

/// Derives the stable record id from a normalized item URL
pub fn record_id(normalized_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_url.as_bytes());
    hex::encode(hasher.finalize())
}

/// Why an item produced no record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingRequiredField(String),
    DateConversionFailed(String),
    FetchFailed(FetchFailure),
}

impl SkipReason {
    /// Short stable label, used as a counter key
    pub fn kind(&self) -> &'static str {
        match self {
            SkipReason::MissingRequiredField(_) => "missing-required-field",
            SkipReason::DateConversionFailed(_) => "date-conversion-failed",
            SkipReason::FetchFailed(_) => "fetch-failed",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingRequiredField(name) => write!(f, "missing required field '{}'", name),
            SkipReason::DateConversionFailed(detail) => {
                write!(f, "date conversion failed: {}", detail)
            }
            SkipReason::FetchFailed(failure) => write!(f, "fetch failed: {}", failure),
        }
    }
}

/// Which field holds the publication date and how it is written
#[derive(Debug, Clone)]
pub struct DateRule {
    pub field: String,
    pub format: DateFormat,
}

/// Turns a parsed item page into a [`Record`] or a [`SkipReason`]
#[derive(Debug, Clone)]
pub struct Extractor {
    fields: Vec<FieldSpec>,
    date_rule: DateRule,
}

impl Extractor {
    pub fn new(fields: Vec<FieldSpec>, date_rule: DateRule) -> Self {
        Self { fields, date_rule }
    }

    /// Extracts one record from an item page
    ///
    /// # Arguments
    ///
    /// * `page` - The parsed item page
    /// * `item_url` - Normalized item URL; the record id is derived from it
    /// * `category` - Category of the archive target the link came from
    ///
    /// # Returns
    ///
    /// * `Ok(Record)` - Every required field present and the date converted
    /// * `Err(SkipReason)` - The record must be discarded
    pub fn extract(
        &self,
        page: &dyn PageQuery,
        item_url: &str,
        category: &CategoryId,
    ) -> Result<Record, SkipReason> {
        let mut fields = BTreeMap::new();

        for spec in &self.fields {
            match spec.resolve(page) {
                Some(value) => {
                    fields.insert(spec.name.clone(), value);
                }
                None if spec.required => {
                    return Err(SkipReason::MissingRequiredField(spec.name.clone()));
                }
                None => {}
            }
        }

        let raw_date = fields.get(&self.date_rule.field).ok_or_else(|| {
            SkipReason::DateConversionFailed(format!(
                "date field '{}' is empty",
                self.date_rule.field
            ))
        })?;

        let date_iso = parse_iso_date(raw_date, self.date_rule.format)
            .map_err(|e| SkipReason::DateConversionFailed(e.to_string()))?;

        Ok(Record {
            id: record_id(item_url),
            url: item_url.to_string(),
            category: category.clone(),
            fields,
            date_iso,
        })
    }
}
