use jobmerge_adapters::{adapter_for_source, AdapterError, SourceBatch};
use jobmerge_core::{CandidatePair, NormalizedRecord, RecordStatus, RunContext, TrackedRecord};
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn};

use crate::differ::diff_against_prior;
use crate::error::{EngineError, EngineWarning};
use crate::matcher::{find_candidate_pairs, MatchPolicy};
use crate::merge::resolve_merges;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub left_records: usize,
    pub right_records: usize,
    pub candidate_pairs: usize,
    pub merged_pairs: usize,
    pub new: usize,
    pub updated: usize,
    pub unchanged: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    pub records: Vec<TrackedRecord>,
    pub candidate_pairs: Vec<CandidatePair>,
    pub warnings: Vec<EngineWarning>,
    pub stats: RunStats,
    /// Normalized inputs the pair indices refer to.
    #[serde(skip)]
    pub left: Vec<NormalizedRecord>,
    #[serde(skip)]
    pub right: Vec<NormalizedRecord>,
}

/// Normalize, match, merge and diff one run, entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    policy: MatchPolicy,
}

impl Engine {
    pub fn new(policy: MatchPolicy) -> Self {
        Self { policy }
    }

    /// Either the full tracked collection plus warnings, or an error before
    /// any record is produced.
    pub fn run(
        &self,
        ctx: &RunContext,
        left: &SourceBatch,
        right: &SourceBatch,
        prior: Option<&[TrackedRecord]>,
    ) -> Result<RunOutput, EngineError> {
        let span = info_span!("engine_run", run_id = %ctx.run_id);
        let _guard = span.enter();

        let mut warnings = Vec::new();
        let left_records = normalize_or_skip(ctx, left, &mut warnings)?;
        let right_records = normalize_or_skip(ctx, right, &mut warnings)?;

        let candidate_pairs = find_candidate_pairs(&left_records, &right_records, &self.policy);
        let merged = resolve_merges(&left_records, &right_records, &candidate_pairs)?;
        let merged_pairs = merged.iter().filter(|m| m.is_merged()).count();

        let diff = diff_against_prior(ctx, merged, prior);
        warnings.extend(diff.warnings);

        let count = |status: RecordStatus| diff.records.iter().filter(|r| r.status == status).count();
        let stats = RunStats {
            left_records: left_records.len(),
            right_records: right_records.len(),
            candidate_pairs: candidate_pairs.len(),
            merged_pairs,
            new: count(RecordStatus::New),
            updated: count(RecordStatus::Updated),
            unchanged: count(RecordStatus::Unchanged),
        };
        info!(
            left = stats.left_records,
            right = stats.right_records,
            candidate_pairs = stats.candidate_pairs,
            merged_pairs = stats.merged_pairs,
            new = stats.new,
            updated = stats.updated,
            unchanged = stats.unchanged,
            warnings = warnings.len(),
            "engine run complete"
        );

        Ok(RunOutput {
            records: diff.records,
            candidate_pairs,
            warnings,
            stats,
            left: left_records,
            right: right_records,
        })
    }
}

/// A schema mismatch drops that source for the run; every other adapter
/// failure aborts it.
fn normalize_or_skip(
    ctx: &RunContext,
    batch: &SourceBatch,
    warnings: &mut Vec<EngineWarning>,
) -> Result<Vec<NormalizedRecord>, EngineError> {
    match adapter_for_source(batch.source).normalize_batch(ctx, batch) {
        Ok(records) => Ok(records),
        Err(err @ AdapterError::SchemaMismatch { .. }) => {
            warn!(source = %batch.source, error = %err, "skipping source for this run");
            warnings.push(EngineWarning::SourceSkipped {
                source: batch.source,
                reason: err.to_string(),
            });
            Ok(Vec::new())
        }
        Err(err) => Err(err.into()),
    }
}
