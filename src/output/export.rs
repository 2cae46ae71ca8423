//! CSV export of harvested records
//!
//! Writes one row per stored record: the fixed `id, url, category, date_iso`
//! columns followed by one column per configured field.

use crate::storage::SqliteSink;
use crate::Result;
use std::fs::File;
use std::io::Write;
use std::path::Path;

const FIXED_COLUMNS: [&str; 4] = ["id", "url", "category", "date_iso"];

/// Exports every stored record to a CSV file
///
/// # Arguments
///
/// * `sink` - The database to read records from
/// * `fields` - Configured field names, in column order
/// * `output_path` - Path of the CSV file to create
///
/// # Returns
///
/// * `Ok(u64)` - Number of records written
/// * `Err(HarvestError)` - Failed to read records or write the file
pub fn export_csv(sink: &SqliteSink, fields: &[String], output_path: &Path) -> Result<u64> {
    let file = File::create(output_path)?;
    write_csv(sink, fields, file)
}

/// Writes every stored record as CSV to `writer`
///
/// Fields a record lacks are written as empty cells.
pub fn write_csv<W: Write>(sink: &SqliteSink, fields: &[String], writer: W) -> Result<u64> {
    let mut csv = csv::Writer::from_writer(writer);

    csv.write_record(FIXED_COLUMNS.iter().copied().chain(fields.iter().map(String::as_str)))?;

    let written = sink.for_each_record(|record| -> Result<()> {
        let date_iso = record.date_iso.to_string();
        let fixed = [
            record.id.as_str(),
            record.url.as_str(),
            record.category.as_str(),
            date_iso.as_str(),
        ];
        let values = fields
            .iter()
            .map(|name| record.fields.get(name).map(String::as_str).unwrap_or(""));
        csv.write_record(fixed.into_iter().chain(values))?;
        Ok(())
    })?;

    csv.flush()?;
    tracing::info!("Exported {} records", written);

    Ok(written)
}
