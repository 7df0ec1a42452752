use chrono::NaiveDate;
use jobmerge_core::{DetailPayload, DetailSections, NormalizedRecord, SourceKind};

pub fn record(source: SourceKind, company: &str, title: &str, deadline: Option<&str>) -> NormalizedRecord {
    NormalizedRecord {
        source,
        source_info: format!("https://{source}.example/{company}/{title}"),
        company: company.to_string(),
        title: title.to_string(),
        registration_date: None,
        deadline: deadline.map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").expect("test date")),
        raw_detail: DetailPayload {
            sections: DetailSections {
                duties: Some(format!("{title} at {company}")),
                ..Default::default()
            },
            ..Default::default()
        },
    }
}
