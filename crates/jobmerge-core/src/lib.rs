//! Core domain model for the job posting merge engine.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CRATE_NAME: &str = "jobmerge-core";

/// The two listing sources the engine links. `Military` is always the left
/// collection and `RndJob` the right one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Military,
    #[serde(rename = "rndjob")]
    RndJob,
}

impl SourceKind {
    pub const ALL: [SourceKind; 2] = [SourceKind::Military, SourceKind::RndJob];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Military => "military",
            SourceKind::RndJob => "rndjob",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "military" => Some(SourceKind::Military),
            "rndjob" => Some(SourceKind::RndJob),
            _ => None,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One extracted row as handed over by a source scraper: column name to
/// optional cell text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    pub source: SourceKind,
    pub fields: BTreeMap<String, Option<String>>,
}

impl RawRecord {
    pub fn new(source: SourceKind) -> Self {
        Self {
            source,
            fields: BTreeMap::new(),
        }
    }

    pub fn with(mut self, column: &str, value: impl Into<String>) -> Self {
        self.fields.insert(column.to_string(), Some(value.into()));
        self
    }

    pub fn with_null(mut self, column: &str) -> Self {
        self.fields.insert(column.to_string(), None);
        self
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.fields.contains_key(column)
    }

    /// Cell text with surrounding whitespace removed; blank cells read as `None`.
    pub fn text(&self, column: &str) -> Option<&str> {
        self.fields
            .get(column)
            .and_then(|v| v.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Labeled free-text sections of a detail page, already mapped from the
/// source-specific column names.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DetailSections {
    pub duties: Option<String>,
    pub requirements: Option<String>,
    pub preferred: Option<String>,
    pub notes: Option<String>,
}

/// Enrichment columns carried through to the persisted dataset.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PostingAttributes {
    pub qualification_agent: Option<String>,
    pub qualification_education: Option<String>,
    pub qualification_career: Option<String>,
    pub region: Option<String>,
    pub field: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DetailPayload {
    pub sections: DetailSections,
    pub attributes: PostingAttributes,
}

/// Cross-source canonical representation of one posting.
///
/// `deadline` is either a valid calendar date or `None`; malformed date text
/// never survives normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub source: SourceKind,
    pub source_info: String,
    pub company: String,
    pub title: String,
    pub registration_date: Option<NaiveDate>,
    pub deadline: Option<NaiveDate>,
    pub raw_detail: DetailPayload,
}

/// Two records, one per source, that satisfied the matching policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidatePair {
    pub left_index: usize,
    pub right_index: usize,
    pub combined_text_score: u8,
    pub company_score: u8,
    pub dates_equal: bool,
}

/// Which input rows contributed to a merged record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Provenance {
    pub left_index: Option<usize>,
    pub right_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedRecord {
    pub company_name: String,
    pub post_name: String,
    pub registration_date: Option<NaiveDate>,
    pub deadline: Option<NaiveDate>,
    pub attributes: PostingAttributes,
    pub source_info: String,
    pub source_type: SourceKind,
    pub description: String,
    pub provenance: Provenance,
}

impl MergedRecord {
    pub fn is_merged(&self) -> bool {
        self.provenance.left_index.is_some() && self.provenance.right_index.is_some()
    }

    /// Field-level equality ignoring provenance, which only describes row
    /// positions inside a single run.
    pub fn same_content(&self, other: &MergedRecord) -> bool {
        self.company_name == other.company_name
            && self.post_name == other.post_name
            && self.registration_date == other.registration_date
            && self.deadline == other.deadline
            && self.attributes == other.attributes
            && self.source_info == other.source_info
            && self.source_type == other.source_type
            && self.description == other.description
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    New,
    Updated,
    Unchanged,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::New => "new",
            RecordStatus::Updated => "updated",
            RecordStatus::Unchanged => "unchanged",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted row: a merged record plus its cross-run identity and status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedRecord {
    #[serde(flatten)]
    pub record: MergedRecord,
    pub job_key: String,
    pub status: RecordStatus,
    pub update_date: DateTime<Utc>,
}

/// Values scoped to one engine invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
}

impl RunContext {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at,
        }
    }

    pub fn start() -> Self {
        Self::new(Utc::now())
    }
}
