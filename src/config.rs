use crate::error::CrawlError;
use crate::models::{CrawlPlan, DownloadOptions};
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

/// Format of due dates in plans and on the command line.
pub const DUE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Portal endpoints as templates with positional `{0}`, `{1}`... placeholders.
#[derive(Debug, Clone)]
pub struct PortalUrls {
    pub base: String,
    pub login: String,
    /// {0} = teacher id
    pub teacher_courses: String,
    /// {0} = section id, {1} = class id
    pub class_home: String,
    /// {0} = section id, {1} = class id
    pub class_progress: String,
    /// {0} = class id
    pub roster: String,
    /// {0} = student id, {1} = class id, {2} = assignment id
    pub submission: String,
    /// {0} = student assignment id
    pub grading_history: String,
    pub snapshots: String,
}

impl PortalUrls {
    /// Default endpoint templates rooted at `base`.
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            login: format!("{}/login", base),
            teacher_courses: format!("{}/lms/teacher/{{0}}/courses", base),
            class_home: format!("{}/lms/assignments/{{0}}/section/{{1}}", base),
            class_progress: format!(
                "{}/lms/assignments/{{0}}/section/{{1}}/progress/module/0",
                base
            ),
            roster: format!("{}/lms/section/{{0}}/roster", base),
            submission: format!(
                "{}/student/{{0}}/section/{{1}}/assignment/{{2}}",
                base
            ),
            grading_history: format!(
                "{}/lms/ajax/get_grading_history?student_assignment_id={{0}}&method=get_grading_history",
                base
            ),
            snapshots: format!("{}/editor/ajax/get_snapshots", base),
            base,
        }
    }
}

/// Substitute positional `{N}` placeholders. Placeholders without a matching
/// argument are left untouched.
pub fn fill_template(template: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replaced = after.find('}').and_then(|close| {
            let index: usize = after[..close].parse().ok()?;
            args.get(index).map(|value| (value, close))
        });
        match replaced {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Runtime configuration read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub urls: PortalUrls,
    pub state_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub out_dir: PathBuf,
    /// Pin/password for unattended runs; prompted for when absent.
    pub factor: Option<String>,
}

impl Config {
    /// Load configuration from `.env` and environment variables.
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        let base = env::var("HW_CRAWLER_BASE_URL").unwrap_or_else(|_| "https://codehs.com".to_string());
        if base.trim().is_empty() {
            anyhow::bail!("HW_CRAWLER_BASE_URL is empty");
        }
        url::Url::parse(&base).with_context(|| format!("HW_CRAWLER_BASE_URL '{}' is not a URL", base))?;

        let dir = |name: &str, default: &str| {
            env::var(name)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(default))
        };

        Ok(Config {
            urls: PortalUrls::with_base(&base),
            state_dir: dir("HW_CRAWLER_STATE_DIR", "secrets"),
            cache_dir: dir("HW_CRAWLER_CACHE_DIR", "cached"),
            out_dir: dir("HW_CRAWLER_OUT_DIR", "out"),
            factor: env::var("HW_CRAWLER_FACTOR").ok().filter(|f| !f.is_empty()),
        })
    }
}

/// Crawl plan as written in a YAML file. Every field may be overridden on the
/// command line.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanFile {
    #[serde(default)]
    pub assignments: Vec<String>,
    pub due: Option<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub download: Vec<String>,
    #[serde(default)]
    pub no_cache: bool,
}

impl PlanFile {
    /// Read a YAML plan file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan file {}", path.display()))?;
        serde_yaml::from_str(&text).context("Failed to parse plan YAML")
    }

    /// Validate and convert into the plan the pipeline runs with.
    pub fn into_plan(self) -> std::result::Result<(CrawlPlan, Vec<String>), CrawlError> {
        let assignments: Vec<String> = self
            .assignments
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        if assignments.is_empty() {
            return Err(CrawlError::Config("enter at least one assignment".into()));
        }
        if self.classes.is_empty() {
            return Err(CrawlError::Config("pick at least one class".into()));
        }

        let due_text = self
            .due
            .ok_or_else(|| CrawlError::Config("a due date is required".into()))?;
        let due = parse_due(&due_text)?;

        let download = parse_download(&self.download)?;

        Ok((
            CrawlPlan {
                assignments,
                due,
                download,
                use_cache: !self.no_cache,
            },
            self.classes,
        ))
    }
}

/// Parse a `YYYY-MM-DD HH:MM` due date.
pub fn parse_due(text: &str) -> std::result::Result<NaiveDateTime, CrawlError> {
    NaiveDateTime::parse_from_str(text.trim(), DUE_FORMAT).map_err(|e| {
        CrawlError::Config(format!("due date '{}' must look like YYYY-MM-DD HH:MM ({})", text, e))
    })
}

/// Both outputs are produced when nothing is specified.
pub fn parse_download(options: &[String]) -> std::result::Result<DownloadOptions, CrawlError> {
    if options.is_empty() {
        return Ok(DownloadOptions { score: true, code: true });
    }
    let mut download = DownloadOptions::default();
    for option in options.iter().flat_map(|o| o.split(',')) {
        match option.trim().to_ascii_lowercase().as_str() {
            "score" | "scores" | "grades" => download.score = true,
            "code" => download.code = true,
            "" => {}
            other => {
                return Err(CrawlError::Config(format!("unknown download option '{}'", other)))
            }
        }
    }
    Ok(download)
}
