use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder used for every text field of a sentinel record.
pub const PLACEHOLDER: &str = "--";

/// Source text of the snapshot emitted when no code could be recovered.
pub const NO_CODE_AVAILABLE: &str = "--- --- --- NO CODE AVAILABLE --- --- ---";

pub const STATUS_PROBLEM_REMOVED: &str = "Problem Removed";
pub const STATUS_UNAVAILABLE: &str = "Unavailable";

// ============================================================================
// Credentials and Session
// ============================================================================

/// How the saved portal secret is protected at rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtectionMethod {
    None,
    Pin,
    Password,
}

impl ProtectionMethod {
    pub fn label(&self) -> &'static str {
        match self {
            ProtectionMethod::None => "none",
            ProtectionMethod::Pin => "pin",
            ProtectionMethod::Password => "password",
        }
    }
}

impl std::str::FromStr for ProtectionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(ProtectionMethod::None),
            "pin" => Ok(ProtectionMethod::Pin),
            "password" | "pwd" => Ok(ProtectionMethod::Password),
            other => Err(format!("unknown protection method '{}'", other)),
        }
    }
}

/// Credential record as persisted on disk. `secret` is plaintext only when
/// `method` is `None`, otherwise it is the vault ciphertext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub method: ProtectionMethod,
    pub identity: String,
    pub secret: String,
}

/// Decrypted portal login.
#[derive(Clone)]
pub struct Credential {
    pub identity: String,
    pub secret: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Authenticated session context. Built once after login and only read from
/// then on.
#[derive(Debug, Clone)]
pub struct Session {
    pub credential: Credential,
    pub teacher_id: String,
}

/// Contents of `teacher.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeacherIdentity {
    #[serde(rename = "teacherID")]
    pub teacher_id: String,
}

// ============================================================================
// Section Catalog
// ============================================================================

/// One section of a teacher and its classes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionEntry {
    pub id: String,
    /// Period label -> class id, in page order.
    pub classes: IndexMap<String, String>,
}

/// Section name -> entry, in page order.
pub type SectionCatalog = IndexMap<String, SectionEntry>;

// ============================================================================
// Crawl Work
// ============================================================================

/// One class queued for crawling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTask {
    pub teacher_name: String,
    pub section_id: String,
    pub class_id: String,
    pub period: String,
    pub url: String,
}

impl CrawlTask {
    /// Short label used in logs and output paths, e.g. `Smith_P3`.
    pub fn label(&self) -> String {
        format!("{}_P{}", self.teacher_name, self.period)
    }
}

/// A requested assignment resolved to its portal id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentSpec {
    pub display_name: String,
    pub assignment_id: String,
}

/// Which outputs a run writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct DownloadOptions {
    #[serde(default)]
    pub score: bool,
    #[serde(default)]
    pub code: bool,
}

// ============================================================================
// Student Records
// ============================================================================

/// Submission timing against the due date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnTimeStatus {
    OnTime,
    Late,
    NotSubmitted,
    Unknown,
}

impl OnTimeStatus {
    /// Text used in the gradebook.
    pub fn as_str(&self) -> &'static str {
        match self {
            OnTimeStatus::OnTime => "on time",
            OnTimeStatus::Late => "late",
            OnTimeStatus::NotSubmitted => "not submitted",
            OnTimeStatus::Unknown => PLACEHOLDER,
        }
    }
}

impl fmt::Display for OnTimeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One saved version of a student's code.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionSnapshot {
    pub submitted_at: String,
    pub source: String,
}

impl SubmissionSnapshot {
    /// Snapshot standing in for code that could not be recovered.
    pub fn placeholder() -> Self {
        Self {
            submitted_at: PLACEHOLDER.to_string(),
            source: NO_CODE_AVAILABLE.to_string(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.source.contains(NO_CODE_AVAILABLE)
    }
}

/// Everything extracted about one student's work on one assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentRecord {
    pub problem_name: String,
    pub first_attempt_date: String,
    pub first_attempt_time: String,
    pub time_worked_by_due: String,
    pub time_worked_total: String,
    pub on_time: OnTimeStatus,
    pub problem_status: String,
    pub points_awarded: Option<f64>,
    pub max_points: Option<f64>,
    pub snapshots: Vec<SubmissionSnapshot>,
}

impl AssignmentRecord {
    /// Well-formed placeholder used when the detail page has nothing to offer.
    pub fn sentinel(problem_name: &str, status: &str) -> Self {
        let problem_name = if problem_name.trim().is_empty() {
            STATUS_PROBLEM_REMOVED.to_string()
        } else {
            problem_name.trim().to_string()
        };
        Self {
            problem_name,
            first_attempt_date: PLACEHOLDER.to_string(),
            first_attempt_time: PLACEHOLDER.to_string(),
            time_worked_by_due: PLACEHOLDER.to_string(),
            time_worked_total: PLACEHOLDER.to_string(),
            on_time: OnTimeStatus::Unknown,
            problem_status: status.to_string(),
            points_awarded: None,
            max_points: None,
            snapshots: vec![SubmissionSnapshot::placeholder()],
        }
    }

    /// Whether the record is a placeholder for a removed or unavailable problem.
    pub fn is_sentinel(&self) -> bool {
        self.problem_status == STATUS_PROBLEM_REMOVED || self.problem_status == STATUS_UNAVAILABLE
    }
}

/// A student of one class and their assignment records.
#[derive(Debug, Clone, PartialEq)]
pub struct Student {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub portal_id: Option<String>,
    /// Assignment id -> record, in requested assignment order.
    pub assignments: IndexMap<String, AssignmentRecord>,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Points awarded over every recorded assignment; placeholders count as 0.
    pub fn total_awarded(&self) -> f64 {
        self.assignments
            .values()
            .filter_map(|a| a.points_awarded)
            .fold(0.0, |acc, p| acc + p)
    }

    /// Points possible over every recorded assignment; placeholders count as 0.
    pub fn total_possible(&self) -> f64 {
        self.assignments
            .values()
            .filter_map(|a| a.max_points)
            .fold(0.0, |acc, p| acc + p)
    }

    /// True when at least one assignment is recorded and all are on time.
    pub fn all_on_time(&self) -> bool {
        !self.assignments.is_empty()
            && self
                .assignments
                .values()
                .all(|a| a.on_time == OnTimeStatus::OnTime)
    }
}

/// A fully extracted class, ready to be written.
#[derive(Debug, Clone)]
pub struct ClassResult {
    pub task: CrawlTask,
    pub assignments: Vec<AssignmentSpec>,
    pub students: Vec<Student>,
}

/// Everything a class run needs to know about what the user asked for.
#[derive(Debug, Clone)]
pub struct CrawlPlan {
    pub assignments: Vec<String>,
    pub due: NaiveDateTime,
    pub download: DownloadOptions,
    pub use_cache: bool,
}
