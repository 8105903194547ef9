use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};

use collator_pdf::archive::{build_archive, ArchiveEntry};
use collator_pdf::config::{GroupStrategy, RunConfig, StampPosition, BLACK};
use collator_pdf::manifest::{auto_map_columns, bind_pending_rows, Field, RawRow};
use collator_pdf::report::DatasetStats;
use collator_pdf::schedule::{RunOutcome, TracingSink};
use collator_pdf::{prepare_rows, process_rows};

#[derive(Parser, Debug)]
#[clap(
    author,
    version,
    about,
    long_about = "Merge manifest-referenced PDF pages into grouped composites with sequential page stamps.",
    arg_required_else_help = true
)]
pub struct Args {
    /// Path to the CSV manifest (one row per output page reference)
    pub manifest: String,

    /// Directory containing the source PDFs, referenced by file name
    #[clap(short, long)]
    pub sources: String,

    /// Output ZIP path
    #[clap(short, long)]
    pub output: String,

    /// Text prepended to every sequence number
    #[clap(long, default_value = "DOC-")]
    pub prefix: String,

    /// First sequence number of the run
    #[clap(long, default_value_t = 1)]
    pub start_number: u64,

    /// Zero-padding width for sequence numbers
    #[clap(long, default_value_t = 6)]
    pub digits: u32,

    /// Identifier stamp anchor
    #[clap(long, value_enum, default_value = "bottom-right")]
    pub position: StampPosition,

    /// Grouping strategy
    #[clap(long, value_enum, default_value = "date-and-type")]
    pub group_by: GroupStrategy,

    /// Ignore row priority when ordering pages
    #[clap(long)]
    pub no_priority_ordering: bool,

    /// Skip the per-page metadata annotation
    #[clap(long)]
    pub no_metadata: bool,

    /// Upper bound on groups assembled in parallel
    #[clap(long, default_value_t = 4)]
    pub max_concurrent_groups: usize,

    /// Rows handled per chunk inside a group
    #[clap(long, default_value_t = 50)]
    pub rows_per_chunk: usize,

    /// Directory for rolling log files
    #[clap(long)]
    pub log_dir: Option<PathBuf>,

    /// Enable debug logging
    #[clap(long)]
    pub verbose: bool,
}

impl Args {
    fn run_config(&self) -> RunConfig {
        RunConfig {
            prefix: self.prefix.clone(),
            start_number: self.start_number,
            digits: self.digits,
            position: self.position,
            group_by: self.group_by,
            priority_ordering: !self.no_priority_ordering,
            metadata_enabled: !self.no_metadata,
            max_concurrent_groups: self.max_concurrent_groups,
            rows_per_chunk: self.rows_per_chunk,
            stamp_font_size: 10.0,
            stamp_color: BLACK,
        }
    }
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

fn read_manifest(path: &Path) -> Result<(Vec<String>, Vec<RawRow>)> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open manifest {}", path.display()))?;
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut row = RawRow::new();
        for (index, column) in headers.iter().enumerate() {
            row.insert(column.clone(), record.get(index).unwrap_or("").to_string());
        }
        rows.push(row);
    }
    Ok((headers, rows))
}

fn load_sources(dir: &Path) -> Result<HashMap<String, Vec<u8>>> {
    let mut sources = HashMap::new();
    let entries = fs::read_dir(dir)
        .with_context(|| format!("failed to read sources directory {}", dir.display()))?;

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let is_pdf = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);
        if !is_pdf {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let bytes = fs::read(&path)
            .with_context(|| format!("failed to read source {}", path.display()))?;
        sources.insert(name, bytes);
    }
    Ok(sources)
}

fn manifest_csv(outcome: &RunOutcome) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for entry in &outcome.manifest {
        writer.serialize(entry)?;
    }
    Ok(writer.into_inner()?)
}

fn summary_text(outcome: &RunOutcome, stats: &DatasetStats, config: &RunConfig) -> String {
    let mut lines = vec![
        "PROCESSING SUMMARY".to_string(),
        "==================".to_string(),
        format!("Run id:            {}", outcome.run_id),
        format!("Rows processed:    {}", stats.row_count),
        format!("Rows skipped:      {}", outcome.skipped_rows),
        format!("Groups produced:   {}", outcome.documents.len()),
        format!("Groups failed:     {}", outcome.failures.len()),
        format!("Total value:       {:.2}", stats.total_value),
        format!("Grouping strategy: {:?}", config.group_by),
        format!("Elapsed:           {:.2}s", outcome.elapsed.as_secs_f64()),
    ];

    if let Some((min, max)) = stats.date_range {
        lines.push(format!("Date range:        {min} to {max}"));
    }
    if !outcome.missing_sources.is_empty() {
        lines.push(String::new());
        lines.push("Missing sources:".to_string());
        for source in &outcome.missing_sources {
            lines.push(format!("  - {source}"));
        }
    }
    if !outcome.key_collisions.is_empty() {
        lines.push(String::new());
        lines.push("Group key collisions (rows merged):".to_string());
        for (first, second) in &outcome.key_collisions {
            lines.push(format!("  - '{first}' / '{second}'"));
        }
    }
    if !outcome.failures.is_empty() {
        lines.push(String::new());
        lines.push("Failed groups:".to_string());
        for failure in &outcome.failures {
            lines.push(format!("  - {}: {}", failure.key, failure.error));
        }
    }

    lines.join("\n") + "\n"
}

fn run_report_json(outcome: &RunOutcome, stats: &DatasetStats) -> Result<Vec<u8>> {
    let report = serde_json::json!({
        "run_id": outcome.run_id,
        "stats": stats,
        "skipped_rows": outcome.skipped_rows,
        "missing_sources": outcome.missing_sources,
        "groups_succeeded": outcome.documents.keys().collect::<Vec<_>>(),
        "groups_failed": outcome
            .failures
            .iter()
            .map(|failure| serde_json::json!({
                "key": failure.key,
                "error": failure.error.to_string(),
            }))
            .collect::<Vec<_>>(),
        "elapsed_ms": outcome.elapsed.as_millis() as u64,
    });
    Ok(serde_json::to_vec_pretty(&report)?)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let _guard = if let Some(log_dir) = args.log_dir.clone() {
        collator_pdf::logging::init_logging_with_dir(args.verbose, log_dir)
    } else {
        collator_pdf::logging::init_logging(args.verbose)
    };

    let manifest_path = expand_path(&args.manifest);
    let sources_dir = expand_path(&args.sources);
    let output_path = expand_path(&args.output);

    let (headers, raw_rows) = read_manifest(&manifest_path)?;
    info!(rows = raw_rows.len(), "manifest loaded");

    let sources = load_sources(&sources_dir)?;
    if sources.is_empty() {
        bail!("no PDF files found in {}", sources_dir.display());
    }
    info!(sources = sources.len(), "source documents loaded");

    // Resolve the column mapping up front; a lone missing source id means
    // single-source mode rather than a hard failure.
    let mapped = auto_map_columns(&headers);
    let single_source_mode = mapped.missing == [Field::SourceId];
    if !mapped.missing.is_empty() && !single_source_mode {
        bail!(
            "could not map required fields [{}] from columns [{}]",
            mapped
                .missing
                .iter()
                .map(|field| field.label())
                .collect::<Vec<_>>()
                .join(", "),
            headers.join(", ")
        );
    }

    let config = args.run_config();
    let (mut rows, dropped) = prepare_rows(&raw_rows, &mapped.mapping)?;

    if single_source_mode {
        // Bind every pending row to the alphabetically first source; any
        // other PDFs in the directory stay unbound.
        let mut names: Vec<&String> = sources.keys().collect();
        names.sort();
        let first = names[0].clone();
        if names.len() > 1 {
            warn!(
                chosen = %first,
                ignored = names.len() - 1,
                "single-source mode with multiple PDFs; binding the first only"
            );
        }
        let bound = bind_pending_rows(&mut rows, &first);
        info!(source = %first, bound, "single-source mode");
    }

    let sink = TracingSink;
    let mut outcome = process_rows(rows.clone(), &sources, &config, &sink)?;
    outcome.skipped_rows += dropped;
    let stats = DatasetStats::collect(&rows);

    let mut entries: Vec<ArchiveEntry> = outcome
        .documents
        .iter()
        .map(|(key, bytes)| ArchiveEntry::new(format!("{key}.pdf"), bytes.clone()))
        .collect();
    entries.push(ArchiveEntry::new(
        "DOCUMENT_MANIFEST.csv",
        manifest_csv(&outcome)?,
    ));
    entries.push(ArchiveEntry::new(
        "PROCESSING_SUMMARY.txt",
        summary_text(&outcome, &stats, &config).into_bytes(),
    ));
    entries.push(ArchiveEntry::new(
        "run_report.json",
        run_report_json(&outcome, &stats)?,
    ));

    let archive_bytes = build_archive(&entries)?;
    fs::write(&output_path, &archive_bytes)
        .with_context(|| format!("failed to write {}", output_path.display()))?;
    info!(
        output = %output_path.display(),
        bytes = archive_bytes.len(),
        "archive written"
    );

    if outcome.skipped_rows > 0 {
        eprintln!(
            "warning: {} row(s) skipped (missing sources: {})",
            outcome.skipped_rows,
            outcome
                .missing_sources
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    if outcome.is_failed() {
        for failure in &outcome.failures {
            eprintln!("failed group '{}': {}", failure.key, failure.error);
        }
        bail!(
            "{} of {} group(s) failed; archive contains the groups that succeeded",
            outcome.failures.len(),
            outcome.failures.len() + outcome.documents.len()
        );
    }

    println!(
        "Processed {} page(s) into {} composite(s) in {:.2}s",
        outcome.manifest.len(),
        outcome.documents.len(),
        outcome.elapsed.as_secs_f64()
    );
    Ok(())
}
