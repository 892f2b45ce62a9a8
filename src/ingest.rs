use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use rusqlite::Connection;
use serde_json::Value;
use tracing::{info, warn};

use crate::db::{self, TeamRecord};
use crate::extract::CANONICAL_FIELD;

/// Itemized outcome of one ingestion run. Built by `ingest_dir`, returned to
/// the caller, and written to the upload log in a fixed section order.
#[derive(Debug, Default)]
pub struct IngestSummary {
    pub total_uploaded: usize,
    /// (path, reason) for files that could not be read or parsed.
    pub skipped_files: Vec<(String, String)>,
    /// Files that parsed but held neither an array nor the known object shape.
    pub empty_files: Vec<String>,
    /// (id or "unknown", reason) for records dropped during projection.
    pub skipped_records: Vec<(String, String)>,
    /// Ids that appeared more than once, each listed once.
    pub duplicate_ids: Vec<i64>,
    pub upsert_error: Option<String>,
}

impl IngestSummary {
    pub fn write_log(&self, dir: &Path) -> Result<PathBuf> {
        let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
        let path = dir.join(format!("upload_log_{}.txt", timestamp));

        let mut out = String::new();
        let _ = writeln!(out, "Upload Summary ({})", timestamp);
        let _ = writeln!(out, "{}", "=".repeat(40));
        let _ = writeln!(out, "Total teams uploaded: {}", self.total_uploaded);
        if let Some(err) = &self.upsert_error {
            let _ = writeln!(out, "Upload failed: {}", err);
        }

        let _ = writeln!(out, "\nSkipped Files:");
        for (file, reason) in &self.skipped_files {
            let _ = writeln!(out, "  {} - {}", file, reason);
        }
        if self.skipped_files.is_empty() {
            let _ = writeln!(out, "  None");
        }

        let _ = writeln!(out, "\nEmpty or unrecognized files:");
        for file in &self.empty_files {
            let _ = writeln!(out, "  {}", file);
        }
        if self.empty_files.is_empty() {
            let _ = writeln!(out, "  None");
        }

        let _ = writeln!(out, "\nTeams skipped due to missing fields:");
        for (id, reason) in &self.skipped_records {
            let _ = writeln!(out, "  ID {} - {}", id, reason);
        }
        if self.skipped_records.is_empty() {
            let _ = writeln!(out, "  None");
        }

        let _ = writeln!(out, "\nDuplicate team IDs (last occurrence used):");
        for id in &self.duplicate_ids {
            let _ = writeln!(out, "  ID {}", id);
        }
        if self.duplicate_ids.is_empty() {
            let _ = writeln!(out, "  None");
        }

        fs::write(&path, out).with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }
}

/// Read every `.json` file under `dir`, project and deduplicate the records,
/// and upsert the result as one batch. The summary is always written to
/// `log_dir` before returning, upsert failure included.
pub fn ingest_dir(
    conn: &Connection,
    dir: &Path,
    log_dir: &Path,
) -> Result<(usize, IngestSummary)> {
    let mut summary = IngestSummary::default();
    info!("Starting ingestion from {}", dir.display());

    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("reading source directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    let mut all_records = Vec::new();
    for path in &files {
        info!("Processing: {}", path.display());
        all_records.extend(process_file(path, &mut summary));
    }

    if all_records.is_empty() {
        warn!("No valid team data found");
        let log_path = summary.write_log(log_dir)?;
        info!("Log saved to {}", log_path.display());
        return Ok((0, summary));
    }

    info!("Found {} records total", all_records.len());
    let deduped = dedupe_records(all_records, &mut summary);
    if !summary.duplicate_ids.is_empty() {
        warn!(
            "{} duplicate team ids (last occurrence kept)",
            summary.duplicate_ids.len()
        );
    }

    info!("Upserting {} unique records", deduped.len());
    match db::upsert_teams(conn, &deduped) {
        Ok(count) => {
            summary.total_uploaded = count;
            info!("Upload successful");
        }
        Err(e) => {
            warn!("Upload failed: {}", e);
            summary.upsert_error = Some(e.to_string());
        }
    }

    let log_path = summary.write_log(log_dir)?;
    info!("Log saved to {}", log_path.display());
    Ok((summary.total_uploaded, summary))
}

/// One file through the state machine: read, parse, then array-shaped |
/// object-with-known-field | unrecognized. Failures are recorded on the
/// summary and never abort the run.
fn process_file(path: &Path, summary: &mut IngestSummary) -> Vec<TeamRecord> {
    let name = path.display().to_string();

    let raw = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            summary.skipped_files.push((name, e.to_string()));
            return Vec::new();
        }
    };
    let parsed: Value = match serde_json::from_str(&raw) {
        Ok(v) => v,
        Err(e) => {
            summary.skipped_files.push((name, e.to_string()));
            return Vec::new();
        }
    };

    let teams = if let Some(list) = parsed.as_array() {
        list
    } else if let Some(list) = parsed.get(CANONICAL_FIELD).and_then(Value::as_array) {
        list
    } else {
        summary.empty_files.push(name);
        return Vec::new();
    };

    let mut records = Vec::new();
    for team in teams {
        match project_team(team) {
            Ok(record) => records.push(record),
            Err(field) => {
                let id_hint = team
                    .get("id")
                    .and_then(Value::as_i64)
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "unknown".into());
                summary
                    .skipped_records
                    .push((id_hint, format!("missing field `{}`", field)));
            }
        }
    }
    records
}

/// Project one raw record onto the canonical schema. A missing or
/// wrongly-typed required field fails the whole record; nothing is defaulted.
fn project_team(raw: &Value) -> Result<TeamRecord, &'static str> {
    let id = raw.get("id").and_then(Value::as_i64).ok_or("id")?;
    let team_name = raw
        .get("team_name")
        .and_then(Value::as_str)
        .ok_or("team_name")?;
    let total_points = raw
        .get("total_points")
        .and_then(Value::as_f64)
        .ok_or("total_points")?;
    let age = raw.get("age").and_then(Value::as_i64).ok_or("age")?;
    let gender = raw.get("gender").and_then(Value::as_str).ok_or("gender")?;
    let national_rank = raw.get("national_rank").and_then(Value::as_i64);

    Ok(TeamRecord {
        id,
        team_name: team_name.to_string(),
        total_points,
        age,
        gender: gender.to_string(),
        national_rank,
    })
}

/// Last occurrence wins, first-seen position kept, every overwritten id
/// reported exactly once.
fn dedupe_records(records: Vec<TeamRecord>, summary: &mut IngestSummary) -> Vec<TeamRecord> {
    let mut index: HashMap<i64, usize> = HashMap::new();
    let mut unique: Vec<TeamRecord> = Vec::new();
    let mut duplicates: BTreeSet<i64> = BTreeSet::new();

    for record in records {
        match index.get(&record.id) {
            Some(&slot) => {
                duplicates.insert(record.id);
                unique[slot] = record;
            }
            None => {
                index.insert(record.id, unique.len());
                unique.push(record);
            }
        }
    }

    summary.duplicate_ids.extend(duplicates);
    unique
}
