//! Candidate Matcher: exhaustive cross-product scoring under the dual-rule
//! policy.
//!
//! Emission is left-row-major. Merge precedence depends on that order, so the
//! parallel path splits the left collection into contiguous blocks and
//! concatenates block results in block order.

use std::thread;

use jobmerge_core::{CandidatePair, NormalizedRecord};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::scoring::{score_pair, SimilarityScores};

pub const DEFAULT_TEXT_THRESHOLD: u8 = 60;
pub const DEFAULT_COMPANY_THRESHOLD: u8 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchPolicy {
    /// Rule B requires `combined_text_score` strictly above this.
    pub text_threshold: u8,
    /// Rule B requires `company_score` strictly above this.
    pub company_threshold: u8,
    /// Scoring threads; 1 scans on the calling thread.
    #[serde(skip)]
    pub workers: usize,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            text_threshold: DEFAULT_TEXT_THRESHOLD,
            company_threshold: DEFAULT_COMPANY_THRESHOLD,
            workers: 1,
        }
    }
}

/// The rule a qualifying pair satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    /// Rule A: identical deadline plus any textual overlap.
    SameDeadline,
    /// Rule B: no shared deadline, strong text and company agreement.
    TextualAgreement,
}

impl MatchPolicy {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn rule_for(&self, scores: &SimilarityScores) -> Option<MatchRule> {
        if scores.dates_equal {
            (scores.combined_text_score > 0 || scores.company_score > 0).then_some(MatchRule::SameDeadline)
        } else {
            (scores.combined_text_score > self.text_threshold && scores.company_score > self.company_threshold)
                .then_some(MatchRule::TextualAgreement)
        }
    }

    pub fn qualifies(&self, scores: &SimilarityScores) -> bool {
        self.rule_for(scores).is_some()
    }

    pub fn rule_for_pair(&self, pair: &CandidatePair) -> Option<MatchRule> {
        self.rule_for(&SimilarityScores {
            combined_text_score: pair.combined_text_score,
            company_score: pair.company_score,
            dates_equal: pair.dates_equal,
        })
    }
}

/// A candidate pair as written to audit reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidatePairAudit {
    #[serde(flatten)]
    pub pair: CandidatePair,
    pub rule: Option<MatchRule>,
    pub left_source_info: String,
    pub left_label: String,
    pub right_source_info: String,
    pub right_label: String,
}

pub fn audit_pairs(
    policy: &MatchPolicy,
    left: &[NormalizedRecord],
    right: &[NormalizedRecord],
    pairs: &[CandidatePair],
) -> Vec<CandidatePairAudit> {
    let describe = |record: Option<&NormalizedRecord>| {
        record
            .map(|r| (r.source_info.clone(), format!("{} / {}", r.company, r.title)))
            .unwrap_or_default()
    };
    pairs
        .iter()
        .map(|pair| {
            let (left_source_info, left_label) = describe(left.get(pair.left_index));
            let (right_source_info, right_label) = describe(right.get(pair.right_index));
            CandidatePairAudit {
                pair: *pair,
                rule: policy.rule_for_pair(pair),
                left_source_info,
                left_label,
                right_source_info,
                right_label,
            }
        })
        .collect()
}

fn scan_block(
    left: &[NormalizedRecord],
    offset: usize,
    right: &[NormalizedRecord],
    policy: &MatchPolicy,
) -> Vec<CandidatePair> {
    let mut pairs = Vec::new();
    for (i, left_record) in left.iter().enumerate() {
        for (right_index, right_record) in right.iter().enumerate() {
            let scores = score_pair(left_record, right_record);
            if policy.qualifies(&scores) {
                pairs.push(CandidatePair {
                    left_index: offset + i,
                    right_index,
                    combined_text_score: scores.combined_text_score,
                    company_score: scores.company_score,
                    dates_equal: scores.dates_equal,
                });
            }
        }
    }
    pairs
}

/// Every qualifying `(left, right)` pair in left-row-major order.
pub fn find_candidate_pairs(
    left: &[NormalizedRecord],
    right: &[NormalizedRecord],
    policy: &MatchPolicy,
) -> Vec<CandidatePair> {
    let workers = policy.workers.clamp(1, left.len().max(1));
    let pairs = if workers == 1 || right.is_empty() {
        scan_block(left, 0, right, policy)
    } else {
        let block_len = left.len().div_ceil(workers);
        thread::scope(|scope| {
            let handles = left
                .chunks(block_len)
                .enumerate()
                .map(|(block, chunk)| scope.spawn(move || scan_block(chunk, block * block_len, right, policy)))
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .flat_map(|handle| handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        })
    };

    debug!(
        left = left.len(),
        right = right.len(),
        workers,
        pairs = pairs.len(),
        "scored candidate cross product"
    );
    pairs
}
