use std::path::Path;

use anyhow::Context as _;

use crate::formats::ExtractedRecord;

/// Writes `records` as CSV to `path`, replacing any existing file.
///
/// The header row is always written. List fields are stored as JSON arrays
/// inside a single cell.
pub fn export_csv(records: &[ExtractedRecord], path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create export output dir: {}", parent.display()))?;
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("open output: {}", path.display()))?;

    writer
        .write_record(ExtractedRecord::COLUMNS)
        .context("write csv header")?;
    for (idx, record) in records.iter().enumerate() {
        let row = to_row(record).with_context(|| format!("format row {idx}"))?;
        writer
            .write_record(&row)
            .with_context(|| format!("write csv row {idx}"))?;
    }
    writer
        .flush()
        .with_context(|| format!("flush output: {}", path.display()))?;

    tracing::info!(rows = records.len(), out = %path.display(), "export csv");
    Ok(())
}

fn to_row(record: &ExtractedRecord) -> anyhow::Result<[String; 12]> {
    Ok([
        record.author_name.clone(),
        record.title.clone(),
        record.description.clone(),
        record.hourly_rate.clone(),
        serde_json::to_string(&record.prices_in_dollar).context("encode prices_in_dollar")?,
        record.review_count.to_string(),
        record.overall_rating.to_string(),
        serde_json::to_string(&record.comments).context("encode comments")?,
        record.author_location.clone(),
        record.author_job_success_rate.to_string(),
        record.author_bio.clone(),
        record.whats_included.clone(),
    ])
}
