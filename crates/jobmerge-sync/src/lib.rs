//! Record linkage and change tracking for the two listing sources, plus the
//! file-based run pipeline around the engine.
//!
//! Stages, in order: [`matcher::find_candidate_pairs`] scores the full cross
//! product, [`merge::resolve_merges`] claims pairs greedily, and
//! [`differ::diff_against_prior`] classifies the result against the last
//! persisted state. [`engine::Engine`] chains them; [`SyncPipeline`] feeds it
//! from disk and writes reports, parquet exports and the new state.

pub mod differ;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod merge;
pub mod scoring;

#[cfg(test)]
mod testutil;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use arrow_array::{ArrayRef, BooleanArray, RecordBatch, StringArray, UInt64Array, UInt8Array};
use arrow_schema::{DataType, Field as ArrowField, Schema};
use chrono::{DateTime, NaiveDate, Utc};
use jobmerge_adapters::{
    adapter_for_source, deterministic_batch_id, load_input_bundle, InputBundle, SourceBatch,
};
use jobmerge_core::{CandidatePair, RecordStatus, RunContext, SourceKind, TrackedRecord};
use jobmerge_storage::{SavedState, StateSnapshot, StateStore};
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use crate::engine::{Engine, RunOutput, RunStats};
pub use crate::error::{EngineError, EngineWarning, Side};
pub use crate::matcher::{audit_pairs, find_candidate_pairs, CandidatePairAudit, MatchPolicy, MatchRule};

pub const CRATE_NAME: &str = "jobmerge-sync";

pub const SOURCES_FILE: &str = "sources.yaml";
pub const MATCHING_RULES_FILE: &str = "rules/matching.yaml";
/// Parquet exports and their manifest, inside a run's report directory.
pub const SNAPSHOT_DIR: &str = "snapshots";
/// Report directories still being written; skipped by the recent-runs digest.
const STAGING_PREFIX: &str = ".staging-";

#[derive(Debug, Clone, Deserialize)]
pub struct SourceRegistry {
    pub sources: Vec<SourceConfig>,
}

impl SourceRegistry {
    pub fn get(&self, source: SourceKind) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.source_id == source)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub source_id: SourceKind,
    pub display_name: String,
    pub enabled: bool,
    /// Relative paths resolve against the workspace root.
    #[serde(default)]
    pub bundle_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub workspace_root: PathBuf,
    pub state_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub match_workers: usize,
    pub export_parquet: bool,
}

impl SyncConfig {
    pub fn for_workspace(root: impl Into<PathBuf>) -> Self {
        let workspace_root = root.into();
        Self {
            state_dir: workspace_root.join("state"),
            reports_dir: workspace_root.join("reports"),
            workspace_root,
            match_workers: 1,
            export_parquet: true,
        }
    }

    pub fn from_env() -> Self {
        let defaults = Self::for_workspace(
            std::env::var("JOBMERGE_WORKSPACE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".")),
        );
        Self {
            state_dir: std::env::var("JOBMERGE_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.state_dir),
            reports_dir: std::env::var("JOBMERGE_REPORTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.reports_dir),
            match_workers: std::env::var("JOBMERGE_MATCH_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.match_workers),
            export_parquet: std::env::var("JOBMERGE_EXPORT_PARQUET")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(defaults.export_parquet),
            workspace_root: defaults.workspace_root,
        }
    }
}

pub async fn load_source_registry(workspace_root: &Path) -> Result<SourceRegistry> {
    let path = workspace_root.join(SOURCES_FILE);
    let text = fs::read_to_string(&path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Thresholds from `rules/matching.yaml`, or the defaults when the file is absent.
pub async fn load_match_policy(workspace_root: &Path) -> Result<MatchPolicy> {
    let path = workspace_root.join(MATCHING_RULES_FILE);
    if !fs::try_exists(&path)
        .await
        .with_context(|| format!("checking {}", path.display()))?
    {
        debug!(path = %path.display(), "no matching rules file; using default policy");
        return Ok(MatchPolicy::default());
    }
    let text = fs::read_to_string(&path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stats: RunStats,
    pub warnings: Vec<EngineWarning>,
    pub reports_dir: String,
    pub parquet_manifest: Option<String>,
    pub state_path: String,
    pub state_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParquetManifest {
    pub schema_version: u32,
    pub files: Vec<ParquetManifestFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParquetManifestFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

/// Header fields of `tracked_delta.json`, enough to summarize a past run.
#[derive(Debug, Clone, Deserialize)]
struct DeltaHeader {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    stats: RunStats,
    #[serde(default)]
    warnings: Vec<EngineWarning>,
}

pub struct SyncPipeline {
    config: SyncConfig,
    state: StateStore,
}

impl SyncPipeline {
    pub fn new(config: SyncConfig) -> Self {
        let state = StateStore::new(config.state_dir.clone());
        Self { config, state }
    }

    pub async fn run_once(&self) -> Result<SyncRunSummary> {
        self.run_with_context(RunContext::start()).await
    }

    /// Loads inputs and prior state, runs the engine, stages reports and
    /// exports, saves the new state, then publishes the staged reports under
    /// the run id. A failure anywhere leaves the prior state and the reports
    /// directory as they were.
    pub async fn run_with_context(&self, ctx: RunContext) -> Result<SyncRunSummary> {
        let root = &self.config.workspace_root;
        let registry = load_source_registry(root).await?;
        let policy = load_match_policy(root)
            .await?
            .with_workers(self.config.match_workers);

        let left = self.load_batch(&registry, SourceKind::Military).await?;
        let right = self.load_batch(&registry, SourceKind::RndJob).await?;

        let prior = self.state.load().await.context("loading prior tracking state")?;
        let output = Engine::new(policy)
            .run(&ctx, &left, &right, prior.as_ref().map(|s| s.records.as_slice()))
            .context("running merge engine")?;

        let finished_at = Utc::now();
        let staging_dir = self
            .config
            .reports_dir
            .join(format!("{STAGING_PREFIX}{}", ctx.run_id));
        let reports_dir = self.config.reports_dir.join(ctx.run_id.to_string());

        let staged = self
            .stage_and_save(&ctx, finished_at, &policy, &output, &staging_dir)
            .await;
        let saved = match staged {
            Ok(saved) => saved,
            Err(err) => {
                discard_staging(&staging_dir).await;
                return Err(err);
            }
        };
        if let Err(err) = fs::rename(&staging_dir, &reports_dir).await {
            discard_staging(&staging_dir).await;
            return Err(err).with_context(|| format!("publishing reports to {}", reports_dir.display()));
        }
        let manifest_path = self
            .config
            .export_parquet
            .then(|| reports_dir.join(SNAPSHOT_DIR).join("manifest.json"));

        Ok(SyncRunSummary {
            run_id: ctx.run_id,
            started_at: ctx.started_at,
            finished_at,
            stats: output.stats,
            warnings: output.warnings,
            reports_dir: reports_dir.display().to_string(),
            parquet_manifest: manifest_path.map(|p| p.display().to_string()),
            state_path: saved.current_path.display().to_string(),
            state_hash: saved.content_hash,
        })
    }

    fn bundle_path_for(&self, source: &SourceConfig) -> PathBuf {
        match &source.bundle_path {
            Some(path) => self.config.workspace_root.join(path),
            None => self
                .config
                .workspace_root
                .join("inputs")
                .join(source.source_id.as_str())
                .join("latest.json"),
        }
    }

    async fn load_batch(&self, registry: &SourceRegistry, source: SourceKind) -> Result<SourceBatch> {
        let Some(config) = registry.get(source).filter(|c| c.enabled) else {
            info!(source = %source, "source disabled or unregistered; contributing no records");
            return Ok(SourceBatch::empty(source));
        };

        let path = self.bundle_path_for(config);
        let text = fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let bundle: InputBundle =
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        ensure!(
            bundle.source_id == source,
            "{} holds a {} bundle but is registered for {}",
            path.display(),
            bundle.source_id,
            source
        );

        info!(
            source = %source,
            bundle_id = %bundle.bundle_id,
            batch_id = %deterministic_batch_id(&bundle),
            basic = bundle.basic.len(),
            detail = bundle.detail.len(),
            "loaded input bundle"
        );
        Ok(bundle.into_batch())
    }

    /// Writes every report into `staging_dir`, then saves state. The caller
    /// publishes the directory only once both succeeded.
    async fn stage_and_save(
        &self,
        ctx: &RunContext,
        finished_at: DateTime<Utc>,
        policy: &MatchPolicy,
        output: &RunOutput,
        staging_dir: &Path,
    ) -> Result<SavedState> {
        write_reports(staging_dir, ctx, finished_at, policy, output).await?;
        if self.config.export_parquet {
            export_parquet_snapshots(staging_dir, output).await?;
        }
        self.state
            .save(&StateSnapshot::new(ctx, output.records.clone()))
            .await
            .context("saving tracking state")
    }
}

async fn discard_staging(staging_dir: &Path) {
    if let Err(err) = fs::remove_dir_all(staging_dir).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(dir = %staging_dir.display(), error = %err, "could not remove staged reports");
        }
    }
}

async fn write_reports(
    reports_dir: &Path,
    ctx: &RunContext,
    finished_at: DateTime<Utc>,
    policy: &MatchPolicy,
    output: &RunOutput,
) -> Result<()> {
    fs::create_dir_all(reports_dir)
        .await
        .with_context(|| format!("creating {}", reports_dir.display()))?;

    fs::write(
        reports_dir.join("run_summary.md"),
        run_summary_markdown(ctx, finished_at, output),
    )
    .await
    .context("writing run_summary.md")?;

    let pairs_json = serde_json::to_vec_pretty(&serde_json::json!({
        "run_id": ctx.run_id,
        "policy": policy,
        "pairs": audit_pairs(policy, &output.left, &output.right, &output.candidate_pairs),
    }))
    .context("serializing candidate pairs")?;
    fs::write(reports_dir.join("candidate_pairs.json"), pairs_json)
        .await
        .context("writing candidate_pairs.json")?;

    let changed = output
        .records
        .iter()
        .filter(|r| r.status != RecordStatus::Unchanged)
        .collect::<Vec<_>>();
    let delta_json = serde_json::to_vec_pretty(&serde_json::json!({
        "run_id": ctx.run_id,
        "started_at": ctx.started_at,
        "finished_at": finished_at,
        "stats": output.stats,
        "warnings": output.warnings,
        "records": changed,
    }))
    .context("serializing tracked delta")?;
    fs::write(reports_dir.join("tracked_delta.json"), delta_json)
        .await
        .context("writing tracked_delta.json")?;

    Ok(())
}

async fn export_parquet_snapshots(reports_dir: &Path, output: &RunOutput) -> Result<()> {
    let snapshot_dir = reports_dir.join(SNAPSHOT_DIR);
    fs::create_dir_all(&snapshot_dir)
        .await
        .with_context(|| format!("creating {}", snapshot_dir.display()))?;

    let manifest = ParquetManifest {
        schema_version: 1,
        files: vec![
            write_snapshot_table(&snapshot_dir, "tracked_jobs", tracked_jobs_batch(&output.records)?).await?,
            write_snapshot_table(
                &snapshot_dir,
                "candidate_pairs",
                candidate_pairs_batch(&output.candidate_pairs)?,
            )
            .await?,
        ],
    };

    let manifest_path = snapshot_dir.join("manifest.json");
    let bytes = serde_json::to_vec_pretty(&manifest).context("serializing parquet manifest")?;
    fs::write(&manifest_path, bytes)
        .await
        .with_context(|| format!("writing {}", manifest_path.display()))
}

pub async fn run_sync_once_from_env() -> Result<SyncRunSummary> {
    SyncPipeline::new(SyncConfig::from_env()).run_once().await
}

/// Scores two bundles without touching state. The left bundle must be the
/// military extract and the right one the rndjob extract.
pub fn match_bundles(left_path: &Path, right_path: &Path, policy: &MatchPolicy) -> Result<Vec<CandidatePairAudit>> {
    let ctx = RunContext::start();
    let mut sides = Vec::with_capacity(2);
    for (path, expected) in [(left_path, SourceKind::Military), (right_path, SourceKind::RndJob)] {
        let bundle = load_input_bundle(path)?;
        ensure!(
            bundle.source_id == expected,
            "{} holds a {} bundle, expected {}",
            path.display(),
            bundle.source_id,
            expected
        );
        let records = adapter_for_source(expected)
            .normalize_batch(&ctx, &bundle.into_batch())
            .with_context(|| format!("normalizing {}", path.display()))?;
        sides.push(records);
    }
    let right = sides.pop().unwrap_or_default();
    let left = sides.pop().unwrap_or_default();

    let pairs = find_candidate_pairs(&left, &right, policy);
    Ok(audit_pairs(policy, &left, &right, &pairs))
}

fn run_summary_markdown(ctx: &RunContext, finished_at: DateTime<Utc>, output: &RunOutput) -> String {
    let stats = &output.stats;
    let mut source_counts: BTreeMap<SourceKind, usize> = BTreeMap::new();
    for record in &output.records {
        *source_counts.entry(record.record.source_type).or_default() += 1;
    }
    let warnings = if output.warnings.is_empty() {
        "- none".to_string()
    } else {
        output
            .warnings
            .iter()
            .map(|w| format!("- {w}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "# Job Merge Run Summary\n\n- Run ID: `{}`\n- Started: {}\n- Finished: {}\n- Military records: {}\n- Rndjob records: {}\n- Candidate pairs: {}\n- Merged pairs: {}\n\n## Status Counts\n- new: {}\n- updated: {}\n- unchanged: {}\n\n## Source Counts\n{}\n\n## Warnings\n{}\n",
        ctx.run_id,
        ctx.started_at,
        finished_at,
        stats.left_records,
        stats.right_records,
        stats.candidate_pairs,
        stats.merged_pairs,
        stats.new,
        stats.updated,
        stats.unchanged,
        source_counts
            .iter()
            .map(|(k, v)| format!("- {k}: {v}"))
            .collect::<Vec<_>>()
            .join("\n"),
        warnings
    )
}

/// Markdown digest of the most recent `runs` run directories under `reports_root`.
pub fn report_recent_markdown(runs: usize, reports_root: &Path) -> Result<String> {
    let mut headers = Vec::new();
    for entry in std::fs::read_dir(reports_root)
        .with_context(|| format!("reading {}", reports_root.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
    {
        if entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX) {
            continue;
        }
        let delta_path = entry.path().join("tracked_delta.json");
        if !delta_path.exists() {
            debug!(dir = %entry.path().display(), "skipping directory without tracked_delta.json");
            continue;
        }
        let header: DeltaHeader = serde_json::from_str(
            &std::fs::read_to_string(&delta_path)
                .with_context(|| format!("reading {}", delta_path.display()))?,
        )
        .with_context(|| format!("parsing {}", delta_path.display()))?;
        headers.push((header, entry.path()));
    }
    headers.sort_by(|a, b| b.0.started_at.cmp(&a.0.started_at));

    let mut lines = vec!["# Job Merge Recent Runs".to_string(), String::new()];
    for (header, dir) in headers.into_iter().take(runs.max(1)) {
        let stats = header.stats;
        lines.push(format!("## Run `{}` ({})", header.run_id, header.started_at));
        lines.push(format!(
            "- records: new {}, updated {}, unchanged {}",
            stats.new, stats.updated, stats.unchanged
        ));
        lines.push(format!(
            "- candidate pairs: {} (merged {})",
            stats.candidate_pairs, stats.merged_pairs
        ));
        lines.push(format!("- warnings: {}", header.warnings.len()));
        let summary_path = dir.join("run_summary.md");
        if summary_path.exists() {
            lines.push(format!("- summary: `{}`", summary_path.display()));
        }
        let manifest_path = dir.join(SNAPSHOT_DIR).join("manifest.json");
        if manifest_path.exists() {
            lines.push(format!("- parquet manifest: `{}`", manifest_path.display()));
        }
        lines.push(String::new());
    }

    Ok(lines.join("\n"))
}

/// Encodes one table in memory, writes it as `<name>.parquet`, and returns its
/// manifest entry with the path relative to the run directory.
async fn write_snapshot_table(snapshot_dir: &Path, name: &str, batch: RecordBatch) -> Result<ParquetManifestFile> {
    let mut encoded: Vec<u8> = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut encoded, batch.schema(), None)
        .with_context(|| format!("opening {name} parquet writer"))?;
    writer
        .write(&batch)
        .with_context(|| format!("encoding {name} rows"))?;
    writer
        .close()
        .with_context(|| format!("finishing {name} parquet file"))?;

    let file_name = format!("{name}.parquet");
    let path = snapshot_dir.join(&file_name);
    fs::write(&path, &encoded)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(ParquetManifestFile {
        name: name.to_string(),
        path: format!("{SNAPSHOT_DIR}/{file_name}"),
        sha256: StateStore::sha256_hex(&encoded),
        bytes: encoded.len() as u64,
    })
}

fn utf8_column<'a>(values: impl Iterator<Item = Option<&'a str>>) -> ArrayRef {
    Arc::new(StringArray::from(values.collect::<Vec<_>>()))
}

fn iso_date(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

fn tracked_jobs_batch(records: &[TrackedRecord]) -> Result<RecordBatch> {
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("company_name", DataType::Utf8, false),
        ArrowField::new("post_name", DataType::Utf8, false),
        ArrowField::new("registration_date", DataType::Utf8, true),
        ArrowField::new("deadline", DataType::Utf8, true),
        ArrowField::new("qualification_agent", DataType::Utf8, true),
        ArrowField::new("qualification_education", DataType::Utf8, true),
        ArrowField::new("qualification_career", DataType::Utf8, true),
        ArrowField::new("region", DataType::Utf8, true),
        ArrowField::new("field", DataType::Utf8, true),
        ArrowField::new("keywords", DataType::Utf8, false),
        ArrowField::new("source_info", DataType::Utf8, false),
        ArrowField::new("source_type", DataType::Utf8, false),
        ArrowField::new("description", DataType::Utf8, false),
        ArrowField::new("job_key", DataType::Utf8, false),
        ArrowField::new("update_date", DataType::Utf8, false),
        ArrowField::new("status", DataType::Utf8, false),
    ]));

    let attrs = records.iter().map(|r| &r.record.attributes).collect::<Vec<_>>();
    let registration_dates = records
        .iter()
        .map(|r| iso_date(r.record.registration_date))
        .collect::<Vec<_>>();
    let deadlines = records
        .iter()
        .map(|r| iso_date(r.record.deadline))
        .collect::<Vec<_>>();
    let keywords = attrs.iter().map(|a| a.keywords.join(", ")).collect::<Vec<_>>();
    let update_dates = records
        .iter()
        .map(|r| r.update_date.to_rfc3339())
        .collect::<Vec<_>>();

    let columns: Vec<ArrayRef> = vec![
        utf8_column(records.iter().map(|r| Some(r.record.company_name.as_str()))),
        utf8_column(records.iter().map(|r| Some(r.record.post_name.as_str()))),
        utf8_column(registration_dates.iter().map(|d| d.as_deref())),
        utf8_column(deadlines.iter().map(|d| d.as_deref())),
        utf8_column(attrs.iter().map(|a| a.qualification_agent.as_deref())),
        utf8_column(attrs.iter().map(|a| a.qualification_education.as_deref())),
        utf8_column(attrs.iter().map(|a| a.qualification_career.as_deref())),
        utf8_column(attrs.iter().map(|a| a.region.as_deref())),
        utf8_column(attrs.iter().map(|a| a.field.as_deref())),
        utf8_column(keywords.iter().map(|k| Some(k.as_str()))),
        utf8_column(records.iter().map(|r| Some(r.record.source_info.as_str()))),
        utf8_column(records.iter().map(|r| Some(r.record.source_type.as_str()))),
        utf8_column(records.iter().map(|r| Some(r.record.description.as_str()))),
        utf8_column(records.iter().map(|r| Some(r.job_key.as_str()))),
        utf8_column(update_dates.iter().map(|d| Some(d.as_str()))),
        utf8_column(records.iter().map(|r| Some(r.status.as_str()))),
    ];

    RecordBatch::try_new(schema, columns).context("building tracked_jobs record batch")
}

fn candidate_pairs_batch(pairs: &[CandidatePair]) -> Result<RecordBatch> {
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("left_index", DataType::UInt64, false),
        ArrowField::new("right_index", DataType::UInt64, false),
        ArrowField::new("combined_text_score", DataType::UInt8, false),
        ArrowField::new("company_score", DataType::UInt8, false),
        ArrowField::new("dates_equal", DataType::Boolean, false),
    ]));

    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(UInt64Array::from(
                pairs.iter().map(|p| p.left_index as u64).collect::<Vec<_>>(),
            )),
            Arc::new(UInt64Array::from(
                pairs.iter().map(|p| p.right_index as u64).collect::<Vec<_>>(),
            )),
            Arc::new(UInt8Array::from(
                pairs.iter().map(|p| p.combined_text_score).collect::<Vec<_>>(),
            )),
            Arc::new(UInt8Array::from(
                pairs.iter().map(|p| p.company_score).collect::<Vec<_>>(),
            )),
            Arc::new(BooleanArray::from(
                pairs.iter().map(|p| p.dates_equal).collect::<Vec<_>>(),
            )),
        ],
    )
    .context("building candidate_pairs record batch")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_rules_file_means_default_policy() {
        let dir = tempdir().expect("tempdir");
        let policy = load_match_policy(dir.path()).await.expect("policy");
        assert_eq!(policy, MatchPolicy::default());
    }

    #[tokio::test]
    async fn rules_file_overrides_thresholds() {
        let dir = tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("rules")).expect("mkdir");
        std::fs::write(dir.path().join(MATCHING_RULES_FILE), "text_threshold: 70\n").expect("write");
        let policy = load_match_policy(dir.path()).await.expect("policy");
        assert_eq!(policy.text_threshold, 70);
        assert_eq!(policy.company_threshold, 40);
        assert_eq!(policy.workers, 1);
    }

    #[tokio::test]
    async fn malformed_rules_file_is_an_error() {
        let dir = tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("rules")).expect("mkdir");
        std::fs::write(dir.path().join(MATCHING_RULES_FILE), "text_threshold: [oops\n").expect("write");
        let err = load_match_policy(dir.path()).await.unwrap_err();
        assert!(format!("{err:#}").contains("parsing"));
    }

    #[test]
    fn registry_parses_and_defaults_bundle_paths() {
        let registry: SourceRegistry = serde_yaml::from_str(
            "sources:\n  - source_id: military\n    display_name: 병역일터\n    enabled: true\n  - source_id: rndjob\n    display_name: 연구개발특구 인재채용\n    enabled: false\n    bundle_path: fixtures/rndjob/sample/bundle.json\n",
        )
        .expect("registry");
        assert!(registry.get(SourceKind::Military).expect("military").enabled);
        let pipeline = SyncPipeline::new(SyncConfig::for_workspace("/ws"));
        assert_eq!(
            pipeline.bundle_path_for(registry.get(SourceKind::Military).expect("military")),
            PathBuf::from("/ws/inputs/military/latest.json")
        );
        assert_eq!(
            pipeline.bundle_path_for(registry.get(SourceKind::RndJob).expect("rndjob")),
            PathBuf::from("/ws/fixtures/rndjob/sample/bundle.json")
        );
    }

    #[test]
    fn unknown_source_id_is_rejected() {
        let parsed = serde_yaml::from_str::<SourceRegistry>(
            "sources:\n  - source_id: saramin\n    display_name: x\n    enabled: true\n",
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn workspace_config_places_state_and_reports_under_root() {
        let config = SyncConfig::for_workspace("/ws");
        assert_eq!(config.state_dir, PathBuf::from("/ws/state"));
        assert_eq!(config.reports_dir, PathBuf::from("/ws/reports"));
        assert!(config.export_parquet);
    }
}
