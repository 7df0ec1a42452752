//! Description text composed from detail-page sections.

use jobmerge_core::DetailSections;

pub const LABEL_DUTIES: &str = "[담당업무]";
pub const LABEL_REQUIREMENTS: &str = "[자격요건]";
pub const LABEL_PREFERRED: &str = "[우대사항]";
pub const LABEL_NOTES: &str = "[기타사항]";

/// Banner between the two halves of a merged description.
pub const OTHER_SOURCE_BANNER: &str = "[다른 사이트의 상세 정보]";

const SECTION_SEPARATOR: &str = "\n\n";

/// Present, non-empty sections in fixed order, each as `[label]\ncontent`,
/// separated by a blank line.
pub fn compose_detail(sections: &DetailSections) -> String {
    [
        (LABEL_DUTIES, &sections.duties),
        (LABEL_REQUIREMENTS, &sections.requirements),
        (LABEL_PREFERRED, &sections.preferred),
        (LABEL_NOTES, &sections.notes),
    ]
    .into_iter()
    .filter_map(|(label, content)| {
        let content = content.as_deref()?.trim();
        (!content.is_empty()).then(|| format!("{label}\n{content}"))
    })
    .collect::<Vec<_>>()
    .join(SECTION_SEPARATOR)
}

/// Left description, the banner, then the right description.
pub fn compose_merged(left: &DetailSections, right: &DetailSections) -> String {
    format!(
        "{}{SECTION_SEPARATOR}{OTHER_SOURCE_BANNER}\n{}",
        compose_detail(left),
        compose_detail(right)
    )
}
