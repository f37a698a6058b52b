use crate::api::{GradeHistoryResolver, PortalTransport};
use crate::config::{fill_template, PortalUrls};
use crate::crawler::CrawledClass;
use crate::error::Result;
use crate::limiter::RateLimiter;
use crate::models::{
    AssignmentRecord, AssignmentSpec, ClassResult, OnTimeStatus, PLACEHOLDER,
    STATUS_PROBLEM_REMOVED, STATUS_UNAVAILABLE,
};
use crate::parser::{self, timestamps::parse_meridiem_timestamp, SubmissionDetail};
use chrono::NaiveDateTime;
use futures::future::join_all;
use tracing::{debug, info, warn};

/// On-time status from the submission selector texts.
///
/// Nothing submitted -> not submitted; any submission after `due` -> late.
pub fn classify_submissions(submissions: Option<&[String]>, due: NaiveDateTime) -> OnTimeStatus {
    let Some(submissions) = submissions else {
        return OnTimeStatus::NotSubmitted;
    };
    if submissions.is_empty() {
        return OnTimeStatus::NotSubmitted;
    }

    let mut late = false;
    for text in submissions {
        match parse_meridiem_timestamp(text, due) {
            Some(submitted) if submitted > due => late = true,
            Some(_) => {}
            None => warn!(text = %text, "could not parse submission time"),
        }
    }
    if late {
        OnTimeStatus::Late
    } else {
        OnTimeStatus::OnTime
    }
}

/// Build the record for one detail page, without grade or code.
///
/// A page with no "started" marker belongs to a problem that was removed from
/// the portal and yields a sentinel record named after the requested
/// assignment, since the page title is then the portal's error title.
pub fn assemble_record(detail: &SubmissionDetail, display_name: &str, due: NaiveDateTime) -> AssignmentRecord {
    let Some(started_text) = detail.started_text.as_deref() else {
        return AssignmentRecord::sentinel(display_name, STATUS_PROBLEM_REMOVED);
    };

    let (first_attempt_date, first_attempt_time) = match parse_meridiem_timestamp(started_text, due) {
        Some(started) => (
            started.format("%m/%d/%Y").to_string(),
            started.format("%H:%M").to_string(),
        ),
        None => {
            warn!(text = %started_text, "could not parse first attempt time");
            (PLACEHOLDER.to_string(), PLACEHOLDER.to_string())
        }
    };

    AssignmentRecord {
        problem_name: detail.problem_name.clone(),
        first_attempt_date,
        first_attempt_time,
        time_worked_by_due: String::new(),
        time_worked_total: String::new(),
        on_time: classify_submissions(detail.submissions.as_deref(), due),
        problem_status: detail.problem_status.clone(),
        points_awarded: None,
        max_points: None,
        snapshots: Vec::new(),
    }
}

/// Fetches every student's submission state for every resolved assignment of
/// one class.
pub struct StudentExtractor<'a, T: PortalTransport + ?Sized> {
    transport: &'a T,
    urls: &'a PortalUrls,
    limiter: &'a RateLimiter,
    due: NaiveDateTime,
    download_code: bool,
}

impl<'a, T: PortalTransport + ?Sized> StudentExtractor<'a, T> {
    /// Create an extractor. `download_code` also fetches code snapshots.
    pub fn new(
        transport: &'a T,
        urls: &'a PortalUrls,
        limiter: &'a RateLimiter,
        due: NaiveDateTime,
        download_code: bool,
    ) -> Self {
        Self {
            transport,
            urls,
            limiter,
            due,
            download_code,
        }
    }

    /// One rate-limited job per (student, assignment), joined before the class
    /// result is assembled. Only a limiter failure aborts the class.
    pub async fn extract(&self, class: CrawledClass) -> Result<ClassResult> {
        let CrawledClass {
            task,
            assignments,
            mut students,
        } = class;
        info!(class = %task.label(), "calculating student grades");

        let jobs = students.iter().enumerate().flat_map(|(index, student)| {
            let task = &task;
            assignments.iter().map(move |assignment| async move {
                let record = match student.portal_id.as_deref() {
                    Some(student_id) => {
                        self.limiter
                            .schedule(self.fetch_record(student_id, &task.class_id, assignment))
                            .await?
                    }
                    None => {
                        warn!(student = %student.full_name(), "no portal id, skipping submissions");
                        AssignmentRecord::sentinel(&assignment.display_name, STATUS_UNAVAILABLE)
                    }
                };
                Ok::<_, crate::error::CrawlError>((index, assignment.assignment_id.clone(), record))
            })
        });
        let results = join_all(jobs).await;

        let mut records = Vec::with_capacity(results.len());
        for result in results {
            records.push(result?);
        }
        for (index, assignment_id, record) in records {
            students[index].assignments.insert(assignment_id, record);
        }

        Ok(ClassResult {
            task,
            assignments,
            students,
        })
    }

    async fn fetch_record(
        &self,
        student_id: &str,
        class_id: &str,
        assignment: &AssignmentSpec,
    ) -> AssignmentRecord {
        let url = fill_template(
            &self.urls.submission,
            &[student_id, class_id, &assignment.assignment_id],
        );
        debug!(url = %url, "fetching submission");

        let markup = match self.transport.fetch(&url).await {
            Ok(markup) => markup,
            Err(e) => {
                warn!(error = %e, "submission page unavailable");
                return AssignmentRecord::sentinel(&assignment.display_name, STATUS_UNAVAILABLE);
            }
        };

        let detail = parser::parse_submission_detail(&markup);
        let mut record = assemble_record(&detail, &assignment.display_name, self.due);
        if record.is_sentinel() {
            return record;
        }

        let resolver = GradeHistoryResolver::new(self.transport, self.urls);
        match detail.student_assignment_id.as_deref() {
            Some(id) => match resolver.resolve_score(id).await {
                Ok(grade) => {
                    record.points_awarded = Some(grade.score);
                    record.max_points = grade.out_of;
                }
                Err(e) => warn!(error = %e, "grading history unavailable"),
            },
            None => warn!(url = %url, "no student assignment id on submission page"),
        }

        if self.download_code {
            if let Some(code) = detail.code.as_ref() {
                let fallback_time = detail
                    .submissions
                    .as_ref()
                    .and_then(|s| s.last())
                    .cloned()
                    .unwrap_or_else(|| PLACEHOLDER.to_string());
                match resolver.resolve_snapshots(code, &fallback_time).await {
                    Ok(snapshots) => record.snapshots = snapshots,
                    Err(e) => warn!(error = %e, "code snapshots unavailable"),
                }
            }
        }

        record
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::api::fake::FakePortal;
    use crate::crawler::{tests as crawl, ClassCrawler};
    use chrono::NaiveDate;

    pub(crate) fn due() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(23, 59, 0)
            .unwrap()
    }

    pub(crate) fn detail_page(submitted: &str, assignment_id: &str) -> String {
        format!(
            r#"<html><head><title>FizzBuzz | CodeHS</title>
<script>window.cfg = {{ studentAssignmentID: {assignment_id}, x: 1 }};</script></head>
<body>
<div id="started-time"><div class="msg-content"><p>Started on: Jan. 14, 2024, 3:00 p.m. PST</p></div></div>
<div id="status-message"><p>Status: Submitted</p></div>
<select id="assignment-submission-select"><option>{submitted} PST</option></select>
<a id="print-code" href="/editor/print/113/{assignment_id}">print</a>
</body></html>"#
        )
    }

    #[test]
    fn test_missing_first_attempt_yields_sentinel() {
        let detail = parser::parse_submission_detail("<html><head><title>Page Not Found | 2019</title></head></html>");
        let record = assemble_record(&detail, "FizzBuzz", due());
        assert_eq!(record.problem_name, "FizzBuzz");
        assert_eq!(record.problem_status, STATUS_PROBLEM_REMOVED);
        assert_eq!(record.on_time, OnTimeStatus::Unknown);
        assert_eq!(record.first_attempt_date, PLACEHOLDER);
        assert_eq!(record.points_awarded, None);
        assert_eq!(record.snapshots.len(), 1);
        assert!(record.snapshots[0].is_placeholder());
    }

    #[test]
    fn test_first_attempt_is_24_hour() {
        let detail = parser::parse_submission_detail(&detail_page("Jan. 15, 2024, 10:00 p.m.", "1"));
        let record = assemble_record(&detail, "fizz", due());
        assert_eq!(record.problem_name, "FizzBuzz");
        assert_eq!(record.first_attempt_date, "01/14/2024");
        assert_eq!(record.first_attempt_time, "15:00");
        assert_eq!(record.problem_status, "Submitted");
    }

    #[test]
    fn test_classify_submissions() {
        let on_time = vec!["Jan. 15, 2024, 10:00 p.m. PST".to_string()];
        let late = vec![
            "Jan. 14, 2024, 9:00 a.m. PST".to_string(),
            "Jan. 16, 2024, 8:00 a.m. PST".to_string(),
        ];
        assert_eq!(classify_submissions(Some(on_time.as_slice()), due()), OnTimeStatus::OnTime);
        assert_eq!(classify_submissions(Some(late.as_slice()), due()), OnTimeStatus::Late);
        assert_eq!(classify_submissions(None, due()), OnTimeStatus::NotSubmitted);
        assert_eq!(classify_submissions(Some(&[][..]), due()), OnTimeStatus::NotSubmitted);
    }

    /// Portal with one class of two students and one assignment. Ada submits
    /// before the deadline, Alan the morning after.
    pub(crate) fn class_portal(urls: &PortalUrls) -> FakePortal {
        crawl::portal(urls)
            .with_page(
                fill_template(&urls.submission, &["70001", "9003", "113"]),
                detail_page("Jan. 15, 2024, 10:00 p.m.", "501"),
            )
            .with_page(
                fill_template(&urls.submission, &["70002", "9003", "113"]),
                detail_page("Jan. 16, 2024, 8:00 a.m.", "502"),
            )
            .with_page(
                fill_template(&urls.grading_history, &["501"]),
                r#"{"current_status":{"score":8,"out_of":10}}"#,
            )
            .with_page(
                fill_template(&urls.grading_history, &["502"]),
                r#"{"current_status":{"score":-1,"out_of":10}}"#,
            )
            .with_page(
                urls.snapshots.clone(),
                r#"{"text":"[{\"time\":\"Jan. 15, 2024, 10:00 p.m.\",\"code\":\"print('fizz')\"}]"}"#,
            )
    }

    #[tokio::test]
    async fn test_extract_class() {
        let urls = PortalUrls::with_base("https://p.test");
        let portal = class_portal(&urls);
        let class = ClassCrawler::new(&portal, &urls, None)
            .crawl(&crawl::task(), &["FizzBuzz".to_string()])
            .await;

        let limiter = RateLimiter::for_portal().unwrap();
        let extractor = StudentExtractor::new(&portal, &urls, &limiter, due(), true);
        let result = extractor.extract(class).await.unwrap();

        let ada = &result.students[0].assignments["113"];
        assert_eq!(ada.on_time, OnTimeStatus::OnTime);
        assert_eq!(ada.points_awarded, Some(8.0));
        assert_eq!(ada.max_points, Some(10.0));
        assert_eq!(ada.snapshots.len(), 1);
        assert_eq!(ada.snapshots[0].source, "print('fizz')");

        let alan = &result.students[1].assignments["113"];
        assert_eq!(alan.on_time, OnTimeStatus::Late);
        assert_eq!(alan.points_awarded, Some(0.0));
    }

    #[tokio::test]
    async fn test_unreachable_submission_pages_do_not_fail_students() {
        let urls = PortalUrls::with_base("https://p.test");
        // No submission pages registered: every detail fetch fails.
        let portal = crawl::portal(&urls);
        let class = ClassCrawler::new(&portal, &urls, None)
            .crawl(&crawl::task(), &["FizzBuzz".to_string()])
            .await;

        let limiter = RateLimiter::for_portal().unwrap();
        let extractor = StudentExtractor::new(&portal, &urls, &limiter, due(), false);
        let result = extractor.extract(class).await.unwrap();
        assert_eq!(result.students.len(), 2);
        for student in &result.students {
            let record = &student.assignments["113"];
            assert!(record.is_sentinel());
            assert_eq!(record.snapshots.len(), 1);
        }
    }
}
