use super::PortalTransport;
use crate::config::{fill_template, PortalUrls};
use crate::error::{CrawlError, Result};
use crate::models::SubmissionSnapshot;
use crate::parser::{self, CodeLocator, GradeSummary};

/// Looks up the authoritative score and the code history of one submission.
pub struct GradeHistoryResolver<'a, T: PortalTransport + ?Sized> {
    transport: &'a T,
    urls: &'a PortalUrls,
}

impl<'a, T: PortalTransport + ?Sized> GradeHistoryResolver<'a, T> {
    /// Create a resolver over an authenticated transport.
    pub fn new(transport: &'a T, urls: &'a PortalUrls) -> Self {
        Self { transport, urls }
    }

    /// Fetch the grading history and return the current score, negatives clamped to 0.
    pub async fn resolve_score(&self, student_assignment_id: &str) -> Result<GradeSummary> {
        let url = fill_template(&self.urls.grading_history, &[student_assignment_id]);
        let body = self.transport.fetch(&url).await?;
        parser::parse_grading_history(&body).map_err(|e| CrawlError::Response {
            url,
            reason: e.to_string(),
        })
    }

    /// Fetch every saved code snapshot of one submission.
    pub async fn resolve_snapshots(
        &self,
        code: &CodeLocator,
        fallback_time: &str,
    ) -> Result<Vec<SubmissionSnapshot>> {
        let form = [
            ("item", code.item.as_str()),
            ("user", code.user.as_str()),
            ("course", "0"),
            ("method", "get_snapshots"),
        ];
        let body = self.transport.post_form(&self.urls.snapshots, &form).await?;
        parser::parse_snapshots(&body, fallback_time).map_err(|e| CrawlError::Response {
            url: self.urls.snapshots.clone(),
            reason: e.to_string(),
        })
    }
}
