//! Incremental Differ: classifies the run's merged records against the
//! previously persisted collection.

use std::collections::{BTreeMap, HashMap, HashSet};

use jobmerge_core::{MergedRecord, RecordStatus, RunContext, TrackedRecord};
use tracing::warn;

use crate::error::EngineWarning;

pub const JOB_KEY_DELIMITER: &str = "::";

/// Cross-run identity: company, post title and source locator.
pub fn job_key(record: &MergedRecord) -> String {
    [
        record.company_name.as_str(),
        record.post_name.as_str(),
        record.source_info.as_str(),
    ]
    .join(JOB_KEY_DELIMITER)
}

#[derive(Debug, Clone, Default)]
pub struct DiffOutcome {
    pub records: Vec<TrackedRecord>,
    pub warnings: Vec<EngineWarning>,
}

/// Current-run records first (in merge order), then prior records whose key
/// the run no longer produces.
///
/// A key present in both is `updated` when any field changed and `unchanged`
/// otherwise; the current values always win. Every emitted record is stamped
/// with the run's start time. Duplicate keys within the run are reported and
/// all colliding records are kept.
pub fn diff_against_prior(
    ctx: &RunContext,
    current: Vec<MergedRecord>,
    prior: Option<&[TrackedRecord]>,
) -> DiffOutcome {
    let prior = prior.unwrap_or_default();
    let mut prior_by_key: HashMap<&str, &TrackedRecord> = HashMap::with_capacity(prior.len());
    for tracked in prior {
        prior_by_key.entry(tracked.job_key.as_str()).or_insert(tracked);
    }

    let mut key_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut records = Vec::with_capacity(current.len() + prior.len());
    for record in current {
        let key = job_key(&record);
        *key_counts.entry(key.clone()).or_default() += 1;
        let status = match prior_by_key.get(key.as_str()) {
            None => RecordStatus::New,
            Some(previous) if previous.record.same_content(&record) => RecordStatus::Unchanged,
            Some(_) => RecordStatus::Updated,
        };
        records.push(TrackedRecord {
            record,
            job_key: key,
            status,
            update_date: ctx.started_at,
        });
    }

    let current_keys: HashSet<&str> = key_counts.keys().map(String::as_str).collect();
    let carried = prior
        .iter()
        .filter(|tracked| !current_keys.contains(tracked.job_key.as_str()))
        .map(|tracked| TrackedRecord {
            status: RecordStatus::Unchanged,
            update_date: ctx.started_at,
            ..tracked.clone()
        })
        .collect::<Vec<_>>();
    records.extend(carried);

    let warnings = key_counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(job_key, count)| {
            warn!(run_id = %ctx.run_id, job_key = %job_key, count, "duplicate job key in run output");
            EngineWarning::DuplicateKey { job_key, count }
        })
        .collect();

    DiffOutcome { records, warnings }
}
