//! Merge Resolver: greedy, single-pass, order-dependent one-to-one merging.
//!
//! The first qualifying pair in emission order wins. This is deliberately not
//! a best-match assignment: a record may merge with a weaker partner when an
//! earlier pair claims its stronger one.

use jobmerge_adapters::compose::{compose_detail, compose_merged};
use jobmerge_core::{CandidatePair, MergedRecord, NormalizedRecord, Provenance};
use tracing::debug;

use crate::error::{EngineError, Side};

fn base_record(record: &NormalizedRecord, provenance: Provenance, description: String) -> MergedRecord {
    MergedRecord {
        company_name: record.company.clone(),
        post_name: record.title.clone(),
        registration_date: record.registration_date,
        deadline: record.deadline,
        attributes: record.raw_detail.attributes.clone(),
        source_info: record.source_info.clone(),
        source_type: record.source,
        description,
        provenance,
    }
}

fn check_index(side: Side, index: usize, len: usize) -> Result<(), EngineError> {
    if index < len {
        Ok(())
    } else {
        Err(EngineError::Alignment { side, index, len })
    }
}

/// Merged pairs in scan order, then unclaimed left records, then unclaimed
/// right records.
///
/// Every pair is checked against both collections before anything is
/// emitted; an out-of-range index is an alignment failure.
pub fn resolve_merges(
    left: &[NormalizedRecord],
    right: &[NormalizedRecord],
    pairs: &[CandidatePair],
) -> Result<Vec<MergedRecord>, EngineError> {
    for pair in pairs {
        check_index(Side::Left, pair.left_index, left.len())?;
        check_index(Side::Right, pair.right_index, right.len())?;
    }

    let mut used_left = vec![false; left.len()];
    let mut used_right = vec![false; right.len()];
    let mut merged = Vec::with_capacity(left.len() + right.len());

    for pair in pairs {
        if used_left[pair.left_index] || used_right[pair.right_index] {
            continue;
        }
        let l = &left[pair.left_index];
        let r = &right[pair.right_index];
        merged.push(base_record(
            l,
            Provenance {
                left_index: Some(pair.left_index),
                right_index: Some(pair.right_index),
            },
            compose_merged(&l.raw_detail.sections, &r.raw_detail.sections),
        ));
        used_left[pair.left_index] = true;
        used_right[pair.right_index] = true;
    }
    let merged_pairs = merged.len();

    for (index, record) in left.iter().enumerate().filter(|(i, _)| !used_left[*i]) {
        merged.push(base_record(
            record,
            Provenance {
                left_index: Some(index),
                right_index: None,
            },
            compose_detail(&record.raw_detail.sections),
        ));
    }
    for (index, record) in right.iter().enumerate().filter(|(i, _)| !used_right[*i]) {
        merged.push(base_record(
            record,
            Provenance {
                left_index: None,
                right_index: Some(index),
            },
            compose_detail(&record.raw_detail.sections),
        ));
    }

    debug!(
        candidate_pairs = pairs.len(),
        merged_pairs,
        output = merged.len(),
        "resolved merges"
    );
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{find_candidate_pairs, MatchPolicy};
    use crate::scoring::score_pair;
    use crate::testutil::record;
    use jobmerge_adapters::compose::OTHER_SOURCE_BANNER;
    use jobmerge_core::SourceKind;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn pair(left_index: usize, right_index: usize) -> CandidatePair {
        CandidatePair {
            left_index,
            right_index,
            combined_text_score: 80,
            company_score: 80,
            dates_equal: true,
        }
    }

    #[test]
    fn first_qualifying_pair_wins_over_a_better_later_one() {
        let left = vec![record(SourceKind::Military, "Hanbit", "AI Researcher", Some("2025-01-31"))];
        let right = vec![
            record(SourceKind::RndJob, "Zeta", "Chef", Some("2025-06-30")),
            record(SourceKind::RndJob, "Hanbit Labs", "Research Intern", Some("2025-01-31")),
            record(SourceKind::RndJob, "Hanbit", "AI Researcher", Some("2025-01-31")),
        ];
        let pairs = find_candidate_pairs(&left, &right, &MatchPolicy::default());
        let order = pairs.iter().map(|p| (p.left_index, p.right_index)).collect::<Vec<_>>();
        assert_eq!(order, vec![(0, 1), (0, 2)]);
        assert!(
            score_pair(&left[0], &right[1]).combined_text_score
                < score_pair(&left[0], &right[2]).combined_text_score
        );

        let merged = resolve_merges(&left, &right, &pairs).unwrap();
        assert_eq!(merged[0].provenance.right_index, Some(1));
        let singles = merged[1..]
            .iter()
            .map(|m| m.provenance.right_index)
            .collect::<Vec<_>>();
        assert_eq!(singles, vec![Some(0), Some(2)]);
    }

    #[test]
    fn merged_record_takes_left_fields_and_combined_description() {
        let left = vec![record(SourceKind::Military, "ACME Inc", "Engineer", Some("2025-03-01"))];
        let right = vec![record(SourceKind::RndJob, "ACME Inc", "Software Engineer", Some("2025-03-01"))];
        let pairs = find_candidate_pairs(&left, &right, &MatchPolicy::default());
        let merged = resolve_merges(&left, &right, &pairs).unwrap();

        assert_eq!(merged.len(), 1);
        let m = &merged[0];
        assert!(m.is_merged());
        assert_eq!(m.post_name, "Engineer");
        assert_eq!(m.source_type, SourceKind::Military);
        assert_eq!(
            m.description,
            format!(
                "[담당업무]\nEngineer at ACME Inc\n\n{OTHER_SOURCE_BANNER}\n[담당업무]\nSoftware Engineer at ACME Inc"
            )
        );
    }

    #[test]
    fn unmatched_records_pass_through_left_then_right() {
        let left = vec![
            record(SourceKind::Military, "A", "x", None),
            record(SourceKind::Military, "B", "y", None),
        ];
        let right = vec![
            record(SourceKind::RndJob, "C", "z", None),
            record(SourceKind::RndJob, "D", "w", None),
        ];
        let merged = resolve_merges(&left, &right, &[pair(1, 0)]).unwrap();
        let names = merged.iter().map(|m| m.company_name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["B", "A", "D"]);
        assert_eq!(merged[1].description, "[담당업무]\nx at A");
    }

    #[test]
    fn out_of_range_pair_is_an_alignment_error() {
        let left = vec![record(SourceKind::Military, "A", "x", None)];
        let right = vec![record(SourceKind::RndJob, "C", "z", None)];
        let err = resolve_merges(&left, &right, &[pair(0, 0), pair(0, 3)]).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Alignment {
                side: Side::Right,
                index: 3,
                len: 1
            }
        ));
    }

    proptest! {
        #[test]
        fn no_index_is_claimed_twice(
            n_left in 0usize..8,
            n_right in 0usize..8,
            raw_pairs in prop::collection::vec((0usize..8, 0usize..8), 0..24),
        ) {
            let left = (0..n_left)
                .map(|i| record(SourceKind::Military, &format!("L{i}"), "t", None))
                .collect::<Vec<_>>();
            let right = (0..n_right)
                .map(|i| record(SourceKind::RndJob, &format!("R{i}"), "t", None))
                .collect::<Vec<_>>();
            let pairs = raw_pairs
                .into_iter()
                .filter(|(l, r)| *l < n_left && *r < n_right)
                .map(|(l, r)| pair(l, r))
                .collect::<Vec<_>>();

            let merged = resolve_merges(&left, &right, &pairs).unwrap();
            let mut seen_left = HashSet::new();
            let mut seen_right = HashSet::new();
            for m in &merged {
                if let Some(l) = m.provenance.left_index {
                    prop_assert!(seen_left.insert(l));
                }
                if let Some(r) = m.provenance.right_index {
                    prop_assert!(seen_right.insert(r));
                }
            }
            prop_assert_eq!(seen_left.len(), n_left);
            prop_assert_eq!(seen_right.len(), n_right);
            let merged_pairs = merged.iter().filter(|m| m.is_merged()).count();
            prop_assert_eq!(merged.len(), n_left + n_right - merged_pairs);
        }
    }
}
