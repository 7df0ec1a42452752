use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use jobmerge_core::{RecordStatus, RunContext, SourceKind};
use jobmerge_storage::StateStore;
use jobmerge_sync::{
    match_bundles, report_recent_markdown, EngineWarning, MatchPolicy, MatchRule, ParquetManifest, SyncConfig,
    SyncPipeline,
};
use serde_json::Value;
use tempfile::TempDir;

fn fixtures_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures")
}

fn fixture_bundle(source: SourceKind) -> PathBuf {
    fixtures_root().join(source.as_str()).join("sample/bundle.json")
}

fn input_path(root: &Path, source: SourceKind) -> PathBuf {
    root.join("inputs").join(source.as_str()).join("latest.json")
}

fn workspace(rndjob_enabled: bool) -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    for source in SourceKind::ALL {
        let target = input_path(dir.path(), source);
        std::fs::create_dir_all(target.parent().expect("parent")).expect("mkdir inputs");
        std::fs::copy(fixture_bundle(source), &target).expect("copy bundle");
    }
    std::fs::write(
        dir.path().join("sources.yaml"),
        format!(
            "sources:\n  - source_id: military\n    display_name: 병역일터\n    enabled: true\n  - source_id: rndjob\n    display_name: 연구개발특구 인재채용\n    enabled: {rndjob_enabled}\n"
        ),
    )
    .expect("write sources.yaml");
    dir
}

fn edit_bundle(root: &Path, source: SourceKind, edit: impl FnOnce(&mut Value)) {
    let path = input_path(root, source);
    let mut bundle: Value = serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("json");
    edit(&mut bundle);
    std::fs::write(&path, serde_json::to_vec_pretty(&bundle).expect("encode")).expect("write");
}

fn ctx(day: u32) -> RunContext {
    RunContext::new(Utc.with_ymd_and_hms(2025, 4, day, 23, 0, 0).unwrap())
}

#[tokio::test]
async fn first_run_merges_cross_source_duplicates_and_rerun_is_unchanged() {
    let ws = workspace(true);
    let pipeline = SyncPipeline::new(SyncConfig::for_workspace(ws.path()));

    let first = pipeline.run_with_context(ctx(23)).await.expect("first run");
    assert_eq!(first.stats.left_records, 3);
    assert_eq!(first.stats.right_records, 3);
    assert_eq!(first.stats.candidate_pairs, 2);
    assert_eq!(first.stats.merged_pairs, 2);
    assert_eq!(first.stats.new, 4);
    assert!(first.warnings.is_empty());

    let state = StateStore::new(ws.path().join("state"))
        .load()
        .await
        .expect("load state")
        .expect("state saved");
    assert_eq!(state.records.len(), 4);
    assert_eq!(state.run_id, first.run_id);
    let merged = state.records.iter().filter(|r| r.record.is_merged()).count();
    assert_eq!(merged, 2);
    assert_eq!(state.records[0].record.company_name, "주식회사 한빛테크");
    assert!(state.records[0]
        .record
        .description
        .contains("[다른 사이트의 상세 정보]"));

    let second = pipeline.run_with_context(ctx(24)).await.expect("second run");
    assert_eq!(second.stats.unchanged, 4);
    assert_eq!(second.stats.new + second.stats.updated, 0);
    assert_ne!(second.state_hash, first.state_hash);
}

#[tokio::test]
async fn reports_and_parquet_manifest_are_written_per_run() {
    let ws = workspace(true);
    let pipeline = SyncPipeline::new(SyncConfig::for_workspace(ws.path()));
    let summary = pipeline.run_with_context(ctx(23)).await.expect("run");

    let reports_dir = PathBuf::from(&summary.reports_dir);
    let run_summary = std::fs::read_to_string(reports_dir.join("run_summary.md")).expect("summary");
    assert!(run_summary.contains("- Merged pairs: 2"));
    assert!(run_summary.contains("- new: 4"));

    let pairs: Value =
        serde_json::from_str(&std::fs::read_to_string(reports_dir.join("candidate_pairs.json")).expect("pairs"))
            .expect("pairs json");
    let pairs = pairs["pairs"].as_array().expect("pairs array");
    let rules = pairs.iter().map(|p| p["rule"].as_str().unwrap_or_default()).collect::<Vec<_>>();
    assert_eq!(rules, vec!["same_deadline", "textual_agreement"]);

    let delta: Value =
        serde_json::from_str(&std::fs::read_to_string(reports_dir.join("tracked_delta.json")).expect("delta"))
            .expect("delta json");
    assert_eq!(delta["records"].as_array().map(Vec::len), Some(4));

    let manifest_path = PathBuf::from(summary.parquet_manifest.expect("manifest written"));
    let manifest: ParquetManifest =
        serde_json::from_str(&std::fs::read_to_string(&manifest_path).expect("manifest")).expect("manifest json");
    let names = manifest.files.iter().map(|f| f.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["tracked_jobs", "candidate_pairs"]);
    for file in &manifest.files {
        let bytes = std::fs::read(reports_dir.join(&file.path)).expect("parquet file");
        assert_eq!(bytes.len() as u64, file.bytes);
        assert_eq!(StateStore::sha256_hex(&bytes), file.sha256);
    }
}

#[tokio::test]
async fn changed_description_is_reported_as_updated() {
    let ws = workspace(true);
    let pipeline = SyncPipeline::new(SyncConfig::for_workspace(ws.path()));
    pipeline.run_with_context(ctx(23)).await.expect("first run");

    edit_bundle(ws.path(), SourceKind::Military, |bundle| {
        bundle["basic"][2]["담당업무"] = Value::from("단일세포 유전체 분석");
    });
    let second = pipeline.run_with_context(ctx(24)).await.expect("second run");
    assert_eq!(second.stats.updated, 1);
    assert_eq!(second.stats.unchanged, 3);

    let state = StateStore::new(ws.path().join("state"))
        .load()
        .await
        .expect("load")
        .expect("state");
    let updated = state
        .records
        .iter()
        .find(|r| r.status == RecordStatus::Updated)
        .expect("updated record");
    assert_eq!(updated.record.company_name, "다온바이오");
    assert!(updated.record.description.contains("단일세포 유전체 분석"));
}

#[tokio::test]
async fn failed_run_leaves_prior_state_untouched() {
    let ws = workspace(true);
    let pipeline = SyncPipeline::new(SyncConfig::for_workspace(ws.path()));
    pipeline.run_with_context(ctx(23)).await.expect("first run");
    let state_path = ws.path().join("state").join("tracked_jobs.json");
    let before = std::fs::read(&state_path).expect("state bytes");

    edit_bundle(ws.path(), SourceKind::RndJob, |bundle| {
        bundle["detail"].as_array_mut().expect("detail rows").remove(0);
    });
    let err = pipeline.run_with_context(ctx(24)).await.unwrap_err();
    assert!(format!("{err:#}").contains("no detail row"));
    assert_eq!(std::fs::read(&state_path).expect("state bytes"), before);
}

#[tokio::test]
async fn failed_state_save_publishes_no_reports() {
    let ws = workspace(true);
    let state_dir = ws.path().join("state");
    std::fs::create_dir_all(&state_dir).expect("state dir");
    std::fs::write(state_dir.join("history"), b"not a directory").expect("block archive dir");

    let pipeline = SyncPipeline::new(SyncConfig::for_workspace(ws.path()));
    let err = pipeline.run_with_context(ctx(23)).await.unwrap_err();
    assert!(format!("{err:#}").contains("saving tracking state"));
    assert!(!state_dir.join("tracked_jobs.json").exists());

    let reports = ws.path().join("reports");
    let leftovers = std::fs::read_dir(&reports)
        .map(|entries| entries.filter_map(Result::ok).count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);

    std::fs::create_dir_all(&reports).expect("reports dir");
    let digest = report_recent_markdown(5, &reports).expect("report");
    assert!(!digest.contains("## Run"));
}

#[tokio::test]
async fn schema_mismatch_skips_the_source_and_finishes() {
    let ws = workspace(true);
    edit_bundle(ws.path(), SourceKind::RndJob, |bundle| {
        for row in bundle["basic"].as_array_mut().expect("basic rows") {
            row.as_object_mut().expect("row").remove("기업명");
        }
    });
    let pipeline = SyncPipeline::new(SyncConfig::for_workspace(ws.path()));
    let summary = pipeline.run_with_context(ctx(23)).await.expect("run");
    assert_eq!(summary.stats.right_records, 0);
    assert_eq!(summary.stats.new, 3);
    assert!(matches!(
        summary.warnings.as_slice(),
        [EngineWarning::SourceSkipped { source: SourceKind::RndJob, .. }]
    ));
}

#[tokio::test]
async fn disabled_source_contributes_nothing() {
    let ws = workspace(false);
    std::fs::remove_file(input_path(ws.path(), SourceKind::RndJob)).expect("remove bundle");
    let mut config = SyncConfig::for_workspace(ws.path());
    config.export_parquet = false;
    let summary = SyncPipeline::new(config).run_with_context(ctx(23)).await.expect("run");
    assert_eq!(summary.stats.right_records, 0);
    assert_eq!(summary.stats.new, 3);
    assert!(summary.parquet_manifest.is_none());
}

#[tokio::test]
async fn recent_report_lists_newest_runs_first() {
    let ws = workspace(true);
    let pipeline = SyncPipeline::new(SyncConfig::for_workspace(ws.path()));
    let first = pipeline.run_with_context(ctx(23)).await.expect("first run");
    let second = pipeline.run_with_context(ctx(24)).await.expect("second run");

    let reports = ws.path().join("reports");
    let latest_only = report_recent_markdown(1, &reports).expect("report");
    assert!(latest_only.contains(&second.run_id.to_string()));
    assert!(!latest_only.contains(&first.run_id.to_string()));

    let both = report_recent_markdown(5, &reports).expect("report");
    let second_at = both.find(&second.run_id.to_string()).expect("second listed");
    let first_at = both.find(&first.run_id.to_string()).expect("first listed");
    assert!(second_at < first_at);
    assert!(both.contains("- records: new 0, updated 0, unchanged 4"));
}

#[test]
fn match_bundles_audits_fixture_pairs_without_state() {
    let audit = match_bundles(
        &fixture_bundle(SourceKind::Military),
        &fixture_bundle(SourceKind::RndJob),
        &MatchPolicy::default(),
    )
    .expect("match");
    let summary = audit
        .iter()
        .map(|a| (a.pair.left_index, a.pair.right_index, a.rule))
        .collect::<Vec<_>>();
    assert_eq!(
        summary,
        vec![
            (0, 0, Some(MatchRule::SameDeadline)),
            (1, 1, Some(MatchRule::TextualAgreement)),
        ]
    );
    assert_eq!(audit[1].pair.combined_text_score, 100);

    let swapped = match_bundles(
        &fixture_bundle(SourceKind::RndJob),
        &fixture_bundle(SourceKind::Military),
        &MatchPolicy::default(),
    );
    assert!(swapped.is_err());
}
