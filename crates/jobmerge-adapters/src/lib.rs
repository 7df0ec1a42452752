//! Per-source schema contracts and the field normalizer boundary.
//!
//! Each listing source ships two tables, a basic listing and a detail table,
//! keyed by the detail-page locator. Adapters validate the source schema,
//! join the two tables, and canonicalize each joined row into a
//! [`NormalizedRecord`].

pub mod compose;
pub mod composite;
pub mod normalize;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use jobmerge_core::{DetailPayload, DetailSections, NormalizedRecord, PostingAttributes, RawRecord, RunContext, SourceKind};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info_span};
use uuid::Uuid;

use crate::composite::parse_composite;
use crate::normalize::{
    canonical_company, canonical_title, extract_deadline, extract_embedded_registration, extract_first_date,
};

pub const CRATE_NAME: &str = "jobmerge-adapters";

/// Column holding the detail-page locator in both tables of both sources.
pub const LOCATOR_COLUMN: &str = "상세정보_URL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Basic,
    Detail,
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Table::Basic => f.write_str("basic"),
            Table::Detail => f.write_str("detail"),
        }
    }
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{source_kind} {table} table is missing required columns: {}", .missing.join(", "))]
    SchemaMismatch {
        source_kind: SourceKind,
        table: Table,
        missing: Vec<String>,
    },
    #[error("{source_kind}: no detail row for locator {locator}")]
    Alignment { source_kind: SourceKind, locator: String },
    #[error("batch for {found} handed to the {expected} adapter")]
    SourceMismatch { expected: SourceKind, found: SourceKind },
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Both extracted tables of one source for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceBatch {
    pub source: SourceKind,
    pub basic: Vec<RawRecord>,
    pub detail: Vec<RawRecord>,
}

impl SourceBatch {
    pub fn empty(source: SourceKind) -> Self {
        Self {
            source,
            basic: Vec::new(),
            detail: Vec::new(),
        }
    }
}

/// On-disk handoff written by the scrapers: one file per source and run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputBundle {
    pub bundle_id: String,
    pub source_id: SourceKind,
    pub extracted_at: DateTime<Utc>,
    pub extractor_version: String,
    pub basic: Vec<BTreeMap<String, Option<String>>>,
    pub detail: Vec<BTreeMap<String, Option<String>>>,
}

impl InputBundle {
    pub fn into_batch(self) -> SourceBatch {
        let source = self.source_id;
        let rows = |table: Vec<BTreeMap<String, Option<String>>>| {
            table
                .into_iter()
                .map(|fields| RawRecord { source, fields })
                .collect::<Vec<_>>()
        };
        SourceBatch {
            source,
            basic: rows(self.basic),
            detail: rows(self.detail),
        }
    }
}

pub fn load_input_bundle(path: impl AsRef<Path>) -> Result<InputBundle> {
    read_json_file(path)
}

fn read_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

/// Stable id for a bundle, independent of where it was loaded from.
pub fn deterministic_batch_id(bundle: &InputBundle) -> Uuid {
    let name = format!(
        "{}:{}:{}",
        bundle.source_id,
        bundle.bundle_id,
        bundle.extracted_at.to_rfc3339()
    );
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes())
}

/// Required columns of one source's two tables.
#[derive(Debug, Clone, Copy)]
pub struct SourceSchema {
    pub basic_required: &'static [&'static str],
    pub detail_required: &'static [&'static str],
}

/// Reports every required column no row carries. An empty table has no
/// schema to violate.
pub fn validate_columns(
    source_kind: SourceKind,
    table: Table,
    rows: &[RawRecord],
    required: &[&str],
) -> Result<(), AdapterError> {
    if rows.is_empty() {
        return Ok(());
    }
    let missing = required
        .iter()
        .filter(|column| !rows.iter().any(|row| row.has_column(column)))
        .map(|column| column.to_string())
        .collect::<Vec<_>>();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AdapterError::SchemaMismatch {
            source_kind,
            table,
            missing,
        })
    }
}

/// Joins each basic row with its detail row on [`LOCATOR_COLUMN`].
///
/// Basic values win; detail values only fill columns the basic row lacks or
/// leaves null. A basic row without a detail row is an alignment failure.
pub fn join_on_locator(batch: &SourceBatch) -> Result<Vec<RawRecord>, AdapterError> {
    let mut details: HashMap<&str, &RawRecord> = HashMap::new();
    for row in &batch.detail {
        if let Some(locator) = row.text(LOCATOR_COLUMN) {
            details.entry(locator).or_insert(row);
        }
    }

    let mut joined = Vec::with_capacity(batch.basic.len());
    for basic in &batch.basic {
        let locator = basic.text(LOCATOR_COLUMN).ok_or_else(|| AdapterError::Alignment {
            source_kind: batch.source,
            locator: "<missing>".to_string(),
        })?;
        let detail = details.get(locator).ok_or_else(|| AdapterError::Alignment {
            source_kind: batch.source,
            locator: locator.to_string(),
        })?;

        let mut row = basic.clone();
        for (column, value) in &detail.fields {
            let slot = row.fields.entry(column.clone()).or_insert(None);
            if slot.is_none() {
                slot.clone_from(value);
            }
        }
        joined.push(row);
    }

    let orphaned = orphaned_detail_locators(batch);
    if orphaned > 0 {
        debug!(source = %batch.source, orphaned, "detail rows without a basic listing row");
    }
    Ok(joined)
}

/// Distinct detail locators that no basic row refers to.
fn orphaned_detail_locators(batch: &SourceBatch) -> usize {
    let referenced = batch
        .basic
        .iter()
        .filter_map(|row| row.text(LOCATOR_COLUMN))
        .collect::<HashSet<_>>();
    batch
        .detail
        .iter()
        .filter_map(|row| row.text(LOCATOR_COLUMN))
        .filter(|locator| !referenced.contains(locator))
        .collect::<HashSet<_>>()
        .len()
}

/// Section text: composite lists render one item per line, plain text passes through.
fn section_text(row: &RawRecord, column: &str) -> Option<String> {
    let text = row.text(column)?;
    match parse_composite(text) {
        Some(value) => Some(value.render_lines()).filter(|s| !s.is_empty()),
        None => Some(text.to_string()),
    }
}

fn column_string(row: &RawRecord, column: &str) -> Option<String> {
    row.text(column).map(ToString::to_string)
}

pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> SourceKind;

    fn schema(&self) -> SourceSchema;

    /// Canonicalizes one joined row. Never fails: malformed cells degrade to
    /// empty strings or absent dates.
    fn normalize(&self, ctx: &RunContext, row: &RawRecord) -> NormalizedRecord;

    fn normalize_batch(&self, ctx: &RunContext, batch: &SourceBatch) -> Result<Vec<NormalizedRecord>, AdapterError> {
        if batch.source != self.source() {
            return Err(AdapterError::SourceMismatch {
                expected: self.source(),
                found: batch.source,
            });
        }
        let span = info_span!("normalize", run_id = %ctx.run_id, source = %batch.source);
        let _guard = span.enter();

        let schema = self.schema();
        validate_columns(batch.source, Table::Basic, &batch.basic, schema.basic_required)?;
        validate_columns(batch.source, Table::Detail, &batch.detail, schema.detail_required)?;

        let joined = join_on_locator(batch)?;
        let records = joined.iter().map(|row| self.normalize(ctx, row)).collect::<Vec<_>>();
        let undated = records.iter().filter(|r| r.deadline.is_none()).count();
        debug!(records = records.len(), undated, "normalized source batch");
        Ok(records)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MilitaryAdapter;

#[derive(Debug, Clone, Copy, Default)]
pub struct RndJobAdapter;

impl SourceAdapter for MilitaryAdapter {
    fn source(&self) -> SourceKind {
        SourceKind::Military
    }

    fn schema(&self) -> SourceSchema {
        SourceSchema {
            basic_required: &[
                LOCATOR_COLUMN,
                "업체명",
                "채용제목",
                "작성일",
                "마감일",
                "요원형태",
                "최종학력",
                "자격요원",
                "주소",
                "담당업무",
                "비고",
            ],
            detail_required: &[LOCATOR_COLUMN],
        }
    }

    fn normalize(&self, _ctx: &RunContext, row: &RawRecord) -> NormalizedRecord {
        let deadline_text = row.text("마감일");
        NormalizedRecord {
            source: SourceKind::Military,
            source_info: column_string(row, LOCATOR_COLUMN).unwrap_or_default(),
            company: canonical_company(row.text("업체명")),
            title: canonical_title(row.text("채용제목")),
            registration_date: extract_first_date(row.text("작성일"))
                .or_else(|| extract_embedded_registration(deadline_text)),
            deadline: extract_deadline(deadline_text),
            raw_detail: DetailPayload {
                sections: DetailSections {
                    duties: section_text(row, "담당업무"),
                    requirements: section_text(row, "자격요원"),
                    preferred: section_text(row, "우대사항"),
                    notes: section_text(row, "비고"),
                },
                attributes: PostingAttributes {
                    qualification_agent: column_string(row, "요원형태"),
                    qualification_education: column_string(row, "최종학력"),
                    qualification_career: column_string(row, "자격요원"),
                    region: column_string(row, "주소"),
                    field: column_string(row, "담당업무"),
                    keywords: column_string(row, "비고").into_iter().collect(),
                },
            },
        }
    }
}

impl SourceAdapter for RndJobAdapter {
    fn source(&self) -> SourceKind {
        SourceKind::RndJob
    }

    fn schema(&self) -> SourceSchema {
        SourceSchema {
            basic_required: &[
                LOCATOR_COLUMN,
                "기업명",
                "공고명",
                "등록일",
                "마감일",
                "학력",
                "경력",
                "지역",
                "근무환경",
                "모집_분야_및_인원",
            ],
            detail_required: &[LOCATOR_COLUMN, "담당업무", "자격사항", "우대사항"],
        }
    }

    fn normalize(&self, _ctx: &RunContext, row: &RawRecord) -> NormalizedRecord {
        // Older extracts only carry the combined listing column.
        let deadline_text = row.text("마감일").or_else(|| row.text("등록일/마감일"));
        let keywords = ["담당업무", "자격사항", "우대사항"]
            .into_iter()
            .filter_map(|column| row.text(column).and_then(parse_composite))
            .flat_map(|value| value.items())
            .collect();
        let employment_type = row
            .text("근무환경")
            .and_then(parse_composite)
            .and_then(|env| env.get("고용형태").map(str::trim).map(ToString::to_string))
            .filter(|s| !s.is_empty());

        NormalizedRecord {
            source: SourceKind::RndJob,
            source_info: column_string(row, LOCATOR_COLUMN).unwrap_or_default(),
            company: canonical_company(row.text("기업명")),
            title: canonical_title(row.text("공고명")),
            registration_date: extract_first_date(row.text("등록일"))
                .or_else(|| extract_embedded_registration(deadline_text)),
            deadline: extract_deadline(deadline_text),
            raw_detail: DetailPayload {
                sections: DetailSections {
                    duties: section_text(row, "담당업무"),
                    requirements: section_text(row, "자격사항"),
                    preferred: section_text(row, "우대사항"),
                    notes: section_text(row, "기타사항"),
                },
                attributes: PostingAttributes {
                    qualification_agent: employment_type,
                    qualification_education: column_string(row, "학력"),
                    qualification_career: column_string(row, "경력"),
                    region: column_string(row, "지역"),
                    field: column_string(row, "모집_분야_및_인원"),
                    keywords,
                },
            },
        }
    }
}

pub fn military_adapter() -> impl SourceAdapter {
    MilitaryAdapter
}

pub fn rndjob_adapter() -> impl SourceAdapter {
    RndJobAdapter
}

pub fn adapter_for_source(source: SourceKind) -> Box<dyn SourceAdapter> {
    match source {
        SourceKind::Military => Box::new(MilitaryAdapter),
        SourceKind::RndJob => Box::new(RndJobAdapter),
    }
}
