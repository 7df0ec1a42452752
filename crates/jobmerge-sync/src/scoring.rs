//! Similarity Scorer: token-sorted text similarity, company similarity and
//! deadline equality for one cross-source pair.

use jobmerge_core::NormalizedRecord;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilarityScores {
    pub combined_text_score: u8,
    pub company_score: u8,
    pub dates_equal: bool,
}

/// Lowercases, drops Latin-1 supplement characters, turns every char that is
/// neither alphanumeric nor `_` into a break, and sorts the resulting tokens.
/// Word order, case and punctuation stop mattering.
pub fn token_sort(input: &str) -> String {
    let cleaned = input
        .chars()
        .filter(|c| !('\u{80}'..='\u{ff}').contains(c))
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { ' ' })
        .collect::<String>()
        .to_lowercase();
    let mut tokens = cleaned.split_whitespace().collect::<Vec<_>>();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Length of the longest common subsequence, over chars.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            cur[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(cur[j])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

/// Indel similarity `2 * lcs / (len_a + len_b)` on a 0-100 scale, rounded
/// half to even. Equal strings score 100; otherwise an empty side scores 0.
pub fn ratio(a: &str, b: &str) -> u8 {
    if a == b {
        return 100;
    }
    let a = a.chars().collect::<Vec<_>>();
    let b = b.chars().collect::<Vec<_>>();
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let total = a.len() + b.len();
    let scaled = 200 * lcs_len(&a, &b);
    let (quotient, remainder) = (scaled / total, scaled % total);
    let rounded = match (2 * remainder).cmp(&total) {
        std::cmp::Ordering::Greater => quotient + 1,
        std::cmp::Ordering::Equal => quotient + quotient % 2,
        std::cmp::Ordering::Less => quotient,
    };
    rounded.min(100) as u8
}

pub fn token_sort_ratio(a: &str, b: &str) -> u8 {
    ratio(&token_sort(a), &token_sort(b))
}

pub fn score_pair(left: &NormalizedRecord, right: &NormalizedRecord) -> SimilarityScores {
    let left_text = format!("{} {}", left.company, left.title);
    let right_text = format!("{} {}", right.company, right.title);
    SimilarityScores {
        combined_text_score: token_sort_ratio(&left_text, &right_text),
        company_score: ratio(&left.company, &right.company),
        dates_equal: matches!((left.deadline, right.deadline), (Some(a), Some(b)) if a == b),
    }
}
