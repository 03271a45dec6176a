// File exports: per-binding CSV tables and the whole result document as JSON

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde_json::Value;

use crate::error::Result;
use crate::metrics::series::SeriesMap;

/// `<thread-name><tid>.csv`
pub fn csv_file_name(name: &str, tid: i32) -> String {
    format!("{name}{tid}.csv")
}

/// Write `series` as a table: a header of series names, then one row per
/// collection round. Cells past the end of a shorter series stay empty.
pub fn write_series_csv(path: &Path, series: &SeriesMap) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(series.keys())?;

    let rows = series.values().map(|s| s.len()).max().unwrap_or(0);
    for row in 0..rows {
        let record = series.values().map(|s| {
            s.values()
                .get(row)
                .map(|v| v.to_string())
                .unwrap_or_default()
        });
        writer.write_record(record)?;
    }
    writer.flush()?;
    tracing::debug!("Wrote {} rows to {}", rows, path.display());
    Ok(())
}

pub fn write_json(path: &Path, value: &Value) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}
