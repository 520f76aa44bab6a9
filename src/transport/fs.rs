use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::constants::dumps::{GEL_DUMP_FILENAME, INSITU_DUMP_FILENAME};
use crate::data::{GelResultRow, InsituResultRow};
use crate::errors::CacheError;
use crate::source::InMemorySource;
use crate::types::LogMessage;

/// Result rows read from a dump directory plus the lines that were skipped.
#[derive(Debug)]
pub struct DumpLoad {
    pub source: InMemorySource,
    /// One diagnostic per malformed line.
    pub skipped: Vec<LogMessage>,
}

/// Load `insitu.jsonl` and `gel.jsonl` from `dir` into an in-memory source.
///
/// A missing dump file counts as an empty shape. Malformed lines are logged
/// and skipped.
pub fn load_dump_dir(dir: impl AsRef<Path>) -> Result<DumpLoad, CacheError> {
    let dir = dir.as_ref();
    let source_id = format!("dump:{}", dir.display());
    if !dir.is_dir() {
        return Err(CacheError::SourceUnavailable {
            source_id,
            reason: "dump directory does not exist".into(),
        });
    }
    let mut skipped = Vec::new();
    let insitu: Vec<InsituResultRow> =
        read_jsonl_if_present(&dir.join(INSITU_DUMP_FILENAME), &mut skipped)?;
    let gel: Vec<GelResultRow> =
        read_jsonl_if_present(&dir.join(GEL_DUMP_FILENAME), &mut skipped)?;
    info!(
        "[gxd:source] loaded dump {} (insitu_rows={}, gel_rows={}, skipped_lines={})",
        dir.display(),
        insitu.len(),
        gel.len(),
        skipped.len()
    );
    Ok(DumpLoad {
        source: InMemorySource::new(source_id, insitu, gel),
        skipped,
    })
}

fn read_jsonl_if_present<T: DeserializeOwned>(
    path: &Path,
    skipped: &mut Vec<LogMessage>,
) -> Result<Vec<T>, CacheError> {
    if !path.exists() {
        warn!(
            "[gxd:source] dump file {} not found; treating as empty",
            path.display()
        );
        return Ok(Vec::new());
    }
    read_jsonl(path, skipped)
}

/// Read one JSON value per non-blank line.
pub fn read_jsonl<T: DeserializeOwned>(
    path: &Path,
    skipped: &mut Vec<LogMessage>,
) -> Result<Vec<T>, CacheError> {
    let reader = BufReader::new(File::open(path)?);
    let mut rows = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(&line) {
            Ok(row) => rows.push(row),
            Err(err) => {
                let message = format!(
                    "{}:{}: skipping malformed row: {}",
                    path.display(),
                    idx + 1,
                    err
                );
                warn!("[gxd:source] {}", message);
                skipped.push(message);
            }
        }
    }
    Ok(rows)
}

/// Write one JSON value per line.
pub fn write_jsonl<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), CacheError> {
    ensure_parent_dir(path)?;
    let mut writer = BufWriter::new(File::create(path)?);
    for row in rows {
        serde_json::to_writer(&mut writer, row)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Write a dump directory readable by `load_dump_dir`.
pub fn write_dump_dir(
    dir: impl AsRef<Path>,
    insitu: &[InsituResultRow],
    gel: &[GelResultRow],
) -> Result<(), CacheError> {
    let dir = dir.as_ref();
    write_jsonl(&dir.join(INSITU_DUMP_FILENAME), insitu)?;
    write_jsonl(&dir.join(GEL_DUMP_FILENAME), gel)?;
    Ok(())
}

/// Create the parent directory of `path` if needed.
pub fn ensure_parent_dir(path: &Path) -> Result<(), CacheError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)?,
        _ => {}
    }
    Ok(())
}

/// Output path for a BCP file inside `dir` (current directory when `None`).
pub fn bcp_path_in_dir(dir: Option<&Path>, filename: &str) -> PathBuf {
    match dir {
        Some(dir) => dir.join(filename),
        None => PathBuf::from(filename),
    }
}
