//! CSV export of computed features in destination column order.

use crate::domain::types::FeatureRow;
use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

/// Write `rows` as CSV with a header matching [`FeatureRow::COLUMNS`].
pub fn write_csv<W: Write>(writer: W, rows: &[FeatureRow]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(row).context("Failed to serialize feature row")?;
    }
    if rows.is_empty() {
        wtr.write_record(FeatureRow::COLUMNS)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_csv_file(path: &Path, rows: &[FeatureRow]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    write_csv(file, rows)
}
