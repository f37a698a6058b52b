use super::{path_segments, selector};
use crate::models::AssignmentSpec;
use scraper::Html;

/// One student row of the progress table, before any submission data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterStudent {
    pub first_name: String,
    pub last_name: String,
    pub portal_id: Option<String>,
}

/// Assignments and students found on a class progress page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressPage {
    /// Resolved assignments, in the order they were requested.
    pub assignments: Vec<AssignmentSpec>,
    pub students: Vec<RosterStudent>,
}

// Path segment of an activity tile link that carries the assignment id:
// /lms/assignments/{section}/section/{class}/{assignment}/...
const ASSIGNMENT_SEGMENT: usize = 5;

/// Resolve requested assignment names and the student roster from a class
/// progress page.
pub fn parse_progress_page(markup: &str, requested: &[String]) -> ProgressPage {
    let document = Html::parse_document(markup);

    let mut remaining: Vec<(usize, &String)> = requested.iter().enumerate().collect();
    let mut resolved: Vec<(usize, AssignmentSpec)> = Vec::new();

    for tile in document.select(&selector(".activity-item[data-original-title]")) {
        if remaining.is_empty() {
            break;
        }
        let tooltip = tile
            .value()
            .attr("data-original-title")
            .unwrap_or_default()
            .to_lowercase();

        let Some(pos) = remaining
            .iter()
            .position(|(_, name)| tooltip.contains(&name.to_lowercase()))
        else {
            continue;
        };

        let Some(assignment_id) = tile
            .select(&selector("a[href]"))
            .next()
            .and_then(|link| link.value().attr("href"))
            .and_then(assignment_id_from_href)
        else {
            continue;
        };
        if resolved.iter().any(|(_, spec)| spec.assignment_id == assignment_id) {
            continue;
        }

        let (index, name) = remaining.remove(pos);
        resolved.push((
            index,
            AssignmentSpec {
                display_name: name.clone(),
                assignment_id,
            },
        ));
    }
    resolved.sort_by_key(|(index, _)| *index);

    let students = document
        .select(&selector("#activity-progress-table .student-row"))
        .map(|row| {
            let attr = |name: &str| row.value().attr(name).unwrap_or_default().trim().to_string();
            let portal_id = row
                .select(&selector(".progress-circle[href]"))
                .filter_map(|circle| circle.value().attr("href"))
                .find(|href| href.split('/').count() >= 4)
                .and_then(student_id_from_href);
            RosterStudent {
                first_name: attr("data-first-name"),
                last_name: attr("data-last-name"),
                portal_id,
            }
        })
        .collect();

    ProgressPage {
        assignments: resolved.into_iter().map(|(_, spec)| spec).collect(),
        students,
    }
}

fn assignment_id_from_href(href: &str) -> Option<String> {
    path_segments(href)
        .into_iter()
        .nth(ASSIGNMENT_SEGMENT)
        .filter(|segment| segment.chars().all(|c| c.is_ascii_digit()))
}

/// First path segment of at least three characters with no letters or colons.
fn student_id_from_href(href: &str) -> Option<String> {
    href.split('/')
        .map(str::trim)
        .find(|segment| {
            segment.len() >= 3 && !segment.chars().any(|c| c.is_ascii_alphabetic() || c == ':')
        })
        .map(str::to_string)
}
