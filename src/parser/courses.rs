use super::{element_text, path_segments, selector};
use crate::models::{SectionCatalog, SectionEntry};
use indexmap::IndexMap;
use scraper::Html;

/// Extract every section and its classes from the teacher course page.
///
/// Section names are the first word of the course title; classes are keyed by
/// the period number from labels like `P3 Intro to CS`.
pub fn parse_course_list(markup: &str) -> SectionCatalog {
    let document = Html::parse_document(markup);
    let header_sel = selector(".teachercourse-header");
    let title_sel = selector(".course-title");
    let class_sel = selector("[data-teacher-course-id]");

    let mut catalog = SectionCatalog::new();

    for header in document.select(&header_sel) {
        let Some(title) = header.select(&title_sel).next() else {
            continue;
        };
        let title_text = element_text(title);
        let Some(name) = title_text.split_whitespace().next() else {
            continue;
        };
        let Some(section_id) = title
            .value()
            .attr("href")
            .and_then(|href| path_segments(href).pop())
        else {
            continue;
        };

        let mut classes = IndexMap::new();
        for class in document.select(&class_sel) {
            if class.value().attr("data-teacher-course-id") != Some(section_id.as_str()) {
                continue;
            }
            let (Some(label), Some(class_id)) = (
                class.value().attr("data-dropdown-section-name"),
                class.value().attr("data-class-id"),
            ) else {
                continue;
            };
            if let Some(period) = period_from_label(label) {
                classes.entry(period).or_insert_with(|| class_id.to_string());
            }
        }

        catalog.entry(name.to_string()).or_insert(SectionEntry {
            id: section_id,
            classes,
        });
    }

    catalog
}

/// `"P3 Intro to CS"` -> `"3"`.
fn period_from_label(label: &str) -> Option<String> {
    let first = label.split_whitespace().next()?;
    let period = first.strip_prefix(['P', 'p']).unwrap_or(first);
    (!period.is_empty()).then(|| period.to_string())
}
