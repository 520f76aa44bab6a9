use std::error::Error;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use clap::{Parser, ValueEnum, error::ErrorKind};
use tempfile::NamedTempFile;
use tracing::info;

use crate::config::{CacheConfig, CacheMode, Delimiters, RecombinaseRule};
use crate::constants::bcp::{BCP_DIR_ENV, DEFAULT_BCP_FILENAME};
use crate::constants::reload::DEFAULT_BATCH_SIZE;
use crate::errors::CacheError;
use crate::metrics::{ReloadSummary, UpdateSummary};
use crate::reload::full_reload;
use crate::source::ResultSource;
use crate::store::{BcpCacheTable, CacheTable, SqlScriptTable};
use crate::transport::bcp::BcpWriter;
use crate::transport::fs::{bcp_path_in_dir, ensure_parent_dir, load_dump_dir};
use crate::types::AssayKey;
use crate::update::update_assay;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RecombinaseRuleArg {
    Driver,
    ReporterGene,
}

impl From<RecombinaseRuleArg> for RecombinaseRule {
    fn from(value: RecombinaseRuleArg) -> Self {
        match value {
            RecombinaseRuleArg::Driver => RecombinaseRule::DriverRelationship,
            RecombinaseRuleArg::ReporterGene => RecombinaseRule::ReporterGene,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "gxdexpression",
    disable_help_subcommand = true,
    about = "Load the GXD_Expression cache",
    long_about = "Rebuild the whole GXD_Expression cache as a BCP file (assay key 0), or replace the cache rows of one assay.",
    after_help = "Source rows are read from insitu.jsonl and gel.jsonl in --input-dir. Set RUST_LOG=info for progress output."
)]
struct CacheLoadCli {
    #[arg(
        short = 'K',
        long = "assay-key",
        default_value_t = 0,
        allow_negative_numbers = true,
        help = "Assay to update; 0 rebuilds the whole cache"
    )]
    assay_key: AssayKey,
    #[arg(
        long = "input-dir",
        value_name = "PATH",
        help = "Directory holding the insitu.jsonl and gel.jsonl result dumps"
    )]
    input_dir: PathBuf,
    #[arg(
        long = "output-dir",
        value_name = "PATH",
        env = BCP_DIR_ENV,
        help = "Directory for BCP output (current directory when unset)"
    )]
    output_dir: Option<PathBuf>,
    #[arg(
        long = "batch-size",
        value_parser = parse_positive_key,
        default_value_t = DEFAULT_BATCH_SIZE,
        help = "Assays per full-reload batch"
    )]
    batch_size: AssayKey,
    #[arg(long = "legacy-delimiters", help = "Write tab-delimited BCP records")]
    legacy_delimiters: bool,
    #[arg(
        long = "recombinase-rule",
        value_enum,
        default_value = "driver",
        help = "How reporter assays are classified as recombinase assays"
    )]
    recombinase_rule: RecombinaseRuleArg,
    #[arg(
        long = "cache-file",
        value_name = "PATH",
        help = "Cache table file updated in place by an incremental run (defaults to the BCP output path)"
    )]
    cache_file: Option<PathBuf>,
    #[arg(
        long = "sql-out",
        value_name = "PATH",
        help = "Write the incremental update as SQL to this file instead of applying it"
    )]
    sql_out: Option<PathBuf>,
}

impl CacheLoadCli {
    fn config(&self) -> CacheConfig {
        let delimiters = if self.legacy_delimiters {
            Delimiters::legacy()
        } else {
            Delimiters::default()
        };
        CacheConfig::default()
            .with_batch_size(self.batch_size)
            .with_delimiters(delimiters)
            .with_recombinase_rule(self.recombinase_rule.into())
    }

    fn bcp_path(&self) -> PathBuf {
        bcp_path_in_dir(self.output_dir.as_deref(), DEFAULT_BCP_FILENAME)
    }
}

/// Entry point of the `gxdexpression` binary.
pub fn run_cache_load<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let Some(cli) = parse_cli::<CacheLoadCli, _>(
        std::iter::once("gxdexpression".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let mode = CacheMode::from_assay_key(cli.assay_key)?;
    let config = cli.config().validated()?;
    let load = load_dump_dir(&cli.input_dir)?;

    println!("start: {}", timestamp());
    match mode {
        CacheMode::FullReload => {
            let path = cli.bcp_path();
            let summary = write_full_reload(&load.source, config, &path)?;
            for line in reload_report(&summary, &path) {
                println!("{line}");
            }
        }
        CacheMode::Incremental(assay_key) => {
            let cache_file = cli.cache_file.clone().unwrap_or_else(|| cli.bcp_path());
            let summary = match &cli.sql_out {
                Some(sql_path) => write_update_script(
                    &load.source,
                    config,
                    &cache_file,
                    sql_path,
                    assay_key,
                )?,
                None => {
                    let mut table = BcpCacheTable::open(&cache_file, config.delimiters.clone())?;
                    update_assay(&load.source, config, &mut table, assay_key)?
                }
            };
            println!(
                "assay {}: deleted {} rows, inserted {} rows",
                summary.assay_key, summary.deleted, summary.inserted
            );
        }
    }
    if !load.skipped.is_empty() {
        println!("skipped {} malformed source lines", load.skipped.len());
    }
    println!("end: {}", timestamp());
    Ok(())
}

/// Full reload into the BCP file at `path`.
///
/// Rows are staged in a temporary file next to `path` and renamed into place
/// only after the last batch succeeds.
pub fn write_full_reload<S: ResultSource + ?Sized>(
    source: &S,
    config: CacheConfig,
    path: &Path,
) -> Result<ReloadSummary, CacheError> {
    ensure_parent_dir(path)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let staged = NamedTempFile::new_in(&dir)?;
    let mut writer = BcpWriter::new(BufWriter::new(staged.as_file()), config.delimiters.clone());
    let summary = full_reload(source, config, &mut writer)?;
    let mut inner = writer.into_inner();
    inner.flush()?;
    drop(inner);
    staged
        .persist(path)
        .map_err(|err| CacheError::Io(err.error))?;
    info!(
        "[gxd:reload] wrote {} rows to {}",
        summary.records(),
        path.display()
    );
    Ok(summary)
}

/// Render the update of `assay_key` as a SQL script at `sql_path`.
///
/// Identifiers continue after the largest key in `cache_file` (an absent file
/// counts as an empty table).
pub fn write_update_script<S: ResultSource + ?Sized>(
    source: &S,
    config: CacheConfig,
    cache_file: &Path,
    sql_path: &Path,
    assay_key: AssayKey,
) -> Result<UpdateSummary, CacheError> {
    let persisted = BcpCacheTable::open(cache_file, config.delimiters.clone())?;
    let max_key = persisted.max_expression_key()?;
    ensure_parent_dir(sql_path)?;
    let mut table = SqlScriptTable::new(BufWriter::new(File::create(sql_path)?), max_key);
    let summary = update_assay(source, config, &mut table, assay_key)?;
    table.into_inner().flush()?;
    Ok(summary)
}

/// Lines printed after a successful full reload.
pub fn reload_report(summary: &ReloadSummary, path: &Path) -> Vec<String> {
    let mut lines = vec![format!(
        "wrote {} rows in {} batches to {}",
        summary.records(),
        summary.batches.len(),
        path.display()
    )];
    if summary.records() > 0 {
        lines.push(format!(
            "{:.2} source rows per cache row, {} anomalous rows",
            summary.rows_per_record(),
            summary.anomalies()
        ));
    }
    if let Some(batch) = summary.busiest_batch() {
        lines.push(format!(
            "busiest batch: assays [{}, {}) with {} rows",
            batch.start, batch.end, batch.records
        ));
    }
    lines
}

fn timestamp() -> String {
    Local::now().format("%m/%d/%Y %H:%M:%S").to_string()
}

fn parse_positive_key(raw: &str) -> Result<AssayKey, String> {
    let parsed = raw.parse::<AssayKey>().map_err(|_| {
        format!(
            "Could not parse --batch-size value '{}' as a positive integer",
            raw
        )
    })?;
    if parsed <= 0 {
        return Err("--batch-size must be greater than zero".to_string());
    }
    Ok(parsed)
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::InsituResultRow;
    use crate::source::InMemorySource;
    use crate::store::read_bcp_file;
    use crate::transport::fs::write_dump_dir;
    use tempfile::tempdir;

    fn insitu(assay_key: AssayKey, result_key: i64) -> InsituResultRow {
        InsituResultRow {
            assay_key,
            refs_key: 1,
            assay_type_key: 1,
            genotype_key: Some(2),
            marker_key: 3,
            structure_key: 4,
            emaps_key: None,
            stage_key: None,
            strength: "Present".into(),
            age: "embryonic day 12.5".into(),
            age_min: Some(12.5),
            age_max: Some(12.5),
            specimen_key: 5,
            sex: None,
            result_key,
            image_pane_key: None,
            image_key: None,
            image_xdim: None,
            reporter_gene: None,
            has_driver: false,
            result_note: None,
        }
    }

    fn args(items: &[&str]) -> impl Iterator<Item = String> {
        items
            .iter()
            .map(|item| item.to_string())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn cli_defaults() {
        let cli = parse_cli::<CacheLoadCli, _>(["gxdexpression", "--input-dir", "/data"])
            .unwrap()
            .unwrap();
        assert_eq!(cli.assay_key, 0);
        assert_eq!(cli.batch_size, 1000);
        let config = cli.config();
        assert_eq!(config.delimiters, Delimiters::default());
        assert_eq!(config.recombinase_rule, RecombinaseRule::DriverRelationship);
    }

    #[test]
    fn cli_rejects_zero_batch_size() {
        let result = parse_cli::<CacheLoadCli, _>([
            "gxdexpression",
            "--input-dir",
            "/data",
            "--batch-size",
            "0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_help_is_not_an_error() {
        let parsed = parse_cli::<CacheLoadCli, _>(["gxdexpression", "--help"]).unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn full_reload_then_incremental_run_end_to_end() {
        let temp = tempdir().unwrap();
        let input = temp.path().join("dump");
        let output = temp.path().join("out");
        write_dump_dir(&input, &[insitu(1, 10), insitu(2, 20)], &[]).unwrap();

        run_cache_load(args(&[
            "--input-dir",
            input.to_str().unwrap(),
            "--output-dir",
            output.to_str().unwrap(),
        ]))
        .unwrap();
        let bcp = output.join(DEFAULT_BCP_FILENAME);
        let rows = read_bcp_file(&bcp, &Delimiters::default()).unwrap();
        assert_eq!(rows.len(), 2);

        run_cache_load(args(&[
            "-K",
            "2",
            "--input-dir",
            input.to_str().unwrap(),
            "--output-dir",
            output.to_str().unwrap(),
        ]))
        .unwrap();
        let rows = read_bcp_file(&bcp, &Delimiters::default()).unwrap();
        let keys: Vec<i64> = rows.iter().map(|row| row.expression_key).collect();
        assert_eq!(keys, vec![1, 3]);
    }

    #[test]
    fn update_script_numbers_after_cache_file() {
        let temp = tempdir().unwrap();
        let cache_file = temp.path().join(DEFAULT_BCP_FILENAME);
        let source = InMemorySource::new("test", vec![insitu(1, 10), insitu(2, 20)], Vec::new());
        write_full_reload(&source, CacheConfig::default(), &cache_file).unwrap();

        let sql_path = temp.path().join("update.sql");
        let summary =
            write_update_script(&source, CacheConfig::default(), &cache_file, &sql_path, 2)
                .unwrap();
        assert_eq!(summary.first_key, Some(3));
        let script = std::fs::read_to_string(&sql_path).unwrap();
        assert!(script.contains("delete from GXD_Expression where _assay_key = 2;"));
        assert!(script.contains("values (3,2,"));
        assert_eq!(read_bcp_file(&cache_file, &Delimiters::default()).unwrap().len(), 2);
    }

    #[test]
    fn reload_report_names_the_busiest_batch() {
        let source = InMemorySource::new(
            "test",
            vec![insitu(1, 10), insitu(1, 10), insitu(4, 40), insitu(5, 50)],
            Vec::new(),
        );
        let mut rows: Vec<crate::data::CacheRow> = Vec::new();
        let config = CacheConfig::default().with_batch_size(3);
        let summary = full_reload(&source, config, &mut rows).unwrap();

        let report = reload_report(&summary, Path::new("GXD_Expression.bcp"));
        assert_eq!(report[0], "wrote 3 rows in 2 batches to GXD_Expression.bcp");
        assert_eq!(report[1], "1.33 source rows per cache row, 0 anomalous rows");
        assert_eq!(report[2], "busiest batch: assays [3, 6) with 2 rows");

        let empty = reload_report(&ReloadSummary::default(), Path::new("x.bcp"));
        assert_eq!(empty, vec!["wrote 0 rows in 0 batches to x.bcp".to_string()]);
    }

    #[test]
    fn negative_assay_key_fails() {
        let temp = tempdir().unwrap();
        write_dump_dir(temp.path(), &[insitu(1, 10)], &[]).unwrap();
        let result = run_cache_load(args(&[
            "--assay-key",
            "-4",
            "--input-dir",
            temp.path().to_str().unwrap(),
        ]));
        assert!(result.is_err());
    }
}
