use super::{element_text, path_segments, selector};
use crate::models::SubmissionSnapshot;
use scraper::{ElementRef, Html};
use serde::Deserialize;
use serde_json::Value;

const ASSIGNMENT_ID_LABEL: &str = "studentAssignmentID";

/// (item, user) pair read from the page's "print code" link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeLocator {
    pub item: String,
    pub user: String,
}

/// Everything the submission detail page says about one student's attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionDetail {
    pub problem_name: String,
    /// Raw "started" text; `None` when the problem no longer exists.
    pub started_text: Option<String>,
    pub problem_status: String,
    pub student_assignment_id: Option<String>,
    /// Texts of the submission selector; `None` when nothing was submitted.
    pub submissions: Option<Vec<String>>,
    pub code: Option<CodeLocator>,
}

/// Extract problem name, timing, status and code location from a submission page.
pub fn parse_submission_detail(markup: &str) -> SubmissionDetail {
    let document = Html::parse_document(markup);

    let problem_name = document
        .select(&selector("title"))
        .next()
        .map(element_text)
        .map(|title| title.split('|').next().unwrap_or_default().trim().to_string())
        .unwrap_or_default();

    let started_text = document
        .select(&selector("#started-time .msg-content p"))
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty());

    let problem_status = document
        .select(&selector("#status-message"))
        .next()
        .and_then(|status| {
            status
                .children()
                .filter_map(ElementRef::wrap)
                .map(element_text)
                .find(|text| !text.is_empty())
        })
        .map(|text| match text.split_once(':') {
            Some((_, rest)) => rest.split(':').next().unwrap_or_default().trim().to_string(),
            // Example programs are not graded.
            None => "Finalized".to_string(),
        })
        .unwrap_or_else(|| "Finalized".to_string());

    let student_assignment_id = document
        .select(&selector("script"))
        .map(|script| script.text().collect::<String>())
        .find_map(|text| student_assignment_id(&text));

    let submissions = document
        .select(&selector("#assignment-submission-select"))
        .next()
        .map(|select| {
            select
                .select(&selector("option"))
                .map(element_text)
                .filter(|text| !text.is_empty())
                .collect()
        });

    let code = document
        .select(&selector("#print-code[href]"))
        .next()
        .and_then(|link| link.value().attr("href"))
        .and_then(code_locator);

    SubmissionDetail {
        problem_name,
        started_text,
        problem_status,
        student_assignment_id,
        submissions,
        code,
    }
}

/// Integer following the last `studentAssignmentID:` label in a script body.
fn student_assignment_id(script: &str) -> Option<String> {
    let label = script.rfind(ASSIGNMENT_ID_LABEL)?;
    let after_label = &script[label + ASSIGNMENT_ID_LABEL.len()..];
    let colon = after_label.find(':')?;
    let digits: String = after_label[colon + 1..]
        .trim_start()
        .trim_start_matches(['"', '\''])
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    (!digits.is_empty()).then_some(digits)
}

/// `/editor/print/{item}/{user}` -> (item, user).
fn code_locator(href: &str) -> Option<CodeLocator> {
    let segments = path_segments(href);
    let item = segments.get(2)?.clone();
    let user = segments.get(3)?.clone();
    Some(CodeLocator { item, user })
}

/// Current grade from the grading history endpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradeSummary {
    pub score: f64,
    pub out_of: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct GradingHistory {
    current_status: CurrentStatus,
}

#[derive(Debug, Deserialize)]
struct CurrentStatus {
    #[serde(default)]
    score: Value,
    #[serde(default)]
    out_of: Value,
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse the grading history JSON. Negative or missing scores mean
/// "ungraded" and are reported as zero.
pub fn parse_grading_history(body: &str) -> serde_json::Result<GradeSummary> {
    let history: GradingHistory = serde_json::from_str(body)?;
    let score = numeric(&history.current_status.score)
        .filter(|score| *score >= 0.0)
        .unwrap_or(0.0);
    Ok(GradeSummary {
        score,
        out_of: numeric(&history.current_status.out_of),
    })
}

#[derive(Debug, Deserialize)]
struct SnapshotResponse {
    #[serde(default)]
    text: Value,
}

#[derive(Debug, Deserialize)]
struct RawSnapshot {
    #[serde(alias = "time", alias = "created", alias = "submission_time", default)]
    timestamp: Value,
    #[serde(alias = "text", alias = "source", default)]
    code: Value,
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Parse the snapshot history response. `text` may hold a JSON list of
/// snapshots or a single block of code; `fallback_time` labels the latter.
pub fn parse_snapshots(
    body: &str,
    fallback_time: &str,
) -> serde_json::Result<Vec<SubmissionSnapshot>> {
    let response: SnapshotResponse = serde_json::from_str(body)?;

    let entries = match &response.text {
        Value::Array(items) => Some(items.clone()),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(items)) => Some(items),
            _ => None,
        },
        _ => None,
    };

    let snapshots = match entries {
        Some(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value::<RawSnapshot>(item).ok())
            .filter_map(|raw| {
                let source = as_text(&raw.code)?;
                let submitted_at =
                    as_text(&raw.timestamp).unwrap_or_else(|| fallback_time.to_string());
                Some(SubmissionSnapshot {
                    submitted_at,
                    source,
                })
            })
            .collect(),
        None => as_text(&response.text)
            .filter(|code| !code.is_empty())
            .map(|source| {
                vec![SubmissionSnapshot {
                    submitted_at: fallback_time.to_string(),
                    source,
                }]
            })
            .unwrap_or_default(),
    };
    Ok(snapshots)
}
