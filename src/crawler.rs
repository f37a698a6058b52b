use crate::api::{PageOrigin, PortalTransport};
use crate::config::{fill_template, PortalUrls};
use crate::models::{AssignmentSpec, CrawlTask, Student};
use crate::parser;
use crate::store::CacheEntry;
use indexmap::IndexMap;
use std::path::Path;
use tracing::{info, warn};

/// A class whose roster and assignment ids are known but whose submissions
/// have not been fetched yet.
#[derive(Debug, Clone)]
pub struct CrawledClass {
    pub task: CrawlTask,
    pub assignments: Vec<AssignmentSpec>,
    pub students: Vec<Student>,
}

/// Resolves the roster and assignment ids of one class.
pub struct ClassCrawler<'a, T: PortalTransport + ?Sized> {
    transport: &'a T,
    urls: &'a PortalUrls,
    /// `None` disables the page cache.
    cache_dir: Option<&'a Path>,
}

impl<'a, T: PortalTransport + ?Sized> ClassCrawler<'a, T> {
    /// Create a crawler. Pass `None` as `cache_dir` to always load live.
    pub fn new(transport: &'a T, urls: &'a PortalUrls, cache_dir: Option<&'a Path>) -> Self {
        Self {
            transport,
            urls,
            cache_dir,
        }
    }

    /// Load the progress page and roster of `task` and resolve `requested` assignments.
    pub async fn crawl(&self, task: &CrawlTask, requested: &[String]) -> CrawledClass {
        let label = task.label();
        info!(class = %label, url = %task.url, "preparing");

        let progress_url = fill_template(&self.urls.class_progress, &[&task.section_id, &task.class_id]);
        let cache = self
            .cache_dir
            .map(|dir| CacheEntry::for_class(dir, &task.section_id, &task.class_id));
        let page = self.transport.fetch_document(&progress_url, cache.as_ref()).await;
        if page.origin == PageOrigin::Degraded {
            warn!(class = %label, url = %page.url, "progress page unavailable, class will be empty");
        }

        info!(class = %label, "downloading student emails");
        let emails = self.roster_emails(task).await;

        let progress = parser::parse_progress_page(&page.markup, requested);
        if progress.assignments.len() < requested.len() {
            let missing: Vec<&String> = requested
                .iter()
                .filter(|name| !progress.assignments.iter().any(|a| &a.display_name == *name))
                .collect();
            warn!(class = %label, ?missing, "some assignments were not found on the progress page");
        }

        let students = progress
            .students
            .into_iter()
            .map(|row| {
                let key = format!("{} {}", row.first_name, row.last_name);
                Student {
                    email: emails.get(&key).cloned().unwrap_or_else(|| "none".to_string()),
                    first_name: row.first_name,
                    last_name: row.last_name,
                    portal_id: row.portal_id,
                    assignments: IndexMap::new(),
                }
            })
            .collect::<Vec<_>>();

        info!(
            class = %label,
            students = students.len(),
            assignments = progress.assignments.len(),
            "class roster resolved"
        );

        CrawledClass {
            task: task.clone(),
            assignments: progress.assignments,
            students,
        }
    }

    /// The roster is always fetched live; it is small and changes often.
    async fn roster_emails(&self, task: &CrawlTask) -> IndexMap<String, String> {
        let url = fill_template(&self.urls.roster, &[&task.class_id]);
        match self.transport.fetch(&url).await {
            Ok(markup) => parser::parse_roster_emails(&markup),
            Err(e) => {
                warn!(class = %task.label(), error = %e, "roster unavailable, emails will be 'none'");
                IndexMap::new()
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::api::fake::FakePortal;

    pub(crate) fn task() -> CrawlTask {
        CrawlTask {
            teacher_name: "Smith".into(),
            section_id: "5001".into(),
            class_id: "9003".into(),
            period: "3".into(),
            url: "https://p.test/lms/assignments/5001/section/9003".into(),
        }
    }

    pub(crate) const PROGRESS: &str = r#"<html><body>
<div class="activity-item" data-original-title="1.3.2 FizzBuzz (Exercise)">
  <a href="/lms/assignments/5001/section/9003/113/grade"></a>
</div>
<table id="activity-progress-table"><tbody>
  <tr class="student-row" data-first-name="Ada" data-last-name="Lovelace">
    <td><a class="progress-circle" href="/student/70001/section/9003/assignment/113"></a></td>
  </tr>
  <tr class="student-row" data-first-name="Alan" data-last-name="Turing">
    <td><a class="progress-circle" href="/student/70002/section/9003/assignment/113"></a></td>
  </tr>
</tbody></table>
</body></html>"#;

    pub(crate) const ROSTER: &str = r#"<div id="classset-progress"><table>
<tr><td><a href="/s/1">Ada Lovelace</a></td><td>ada@student.school.org</td></tr>
</table></div>"#;

    pub(crate) fn portal(urls: &PortalUrls) -> FakePortal {
        FakePortal::new()
            .with_page(fill_template(&urls.class_progress, &["5001", "9003"]), PROGRESS)
            .with_page(fill_template(&urls.roster, &["9003"]), ROSTER)
    }

    #[tokio::test]
    async fn test_crawl_resolves_roster_and_assignments() {
        let urls = PortalUrls::with_base("https://p.test");
        let portal = portal(&urls);
        let crawler = ClassCrawler::new(&portal, &urls, None);

        let class = crawler.crawl(&task(), &["fizzbuzz".to_string()]).await;
        assert_eq!(class.assignments.len(), 1);
        assert_eq!(class.assignments[0].assignment_id, "113");
        assert_eq!(class.students.len(), 2);
        assert_eq!(class.students[0].email, "ada@student.school.org");
        assert_eq!(class.students[0].portal_id.as_deref(), Some("70001"));
        assert_eq!(class.students[1].email, "none");
        assert!(class.students.iter().all(|s| s.assignments.is_empty()));
    }

    #[tokio::test]
    async fn test_second_crawl_uses_cache_without_navigation() {
        let dir = tempfile::tempdir().unwrap();
        let urls = PortalUrls::with_base("https://p.test");
        let portal = portal(&urls);
        let crawler = ClassCrawler::new(&portal, &urls, Some(dir.path()));
        let requested = vec!["FizzBuzz".to_string()];
        let cache_file = dir.path().join("5001/9003/index.html");

        let first = crawler.crawl(&task(), &requested).await;
        assert_eq!(portal.navigation_count(), 1);
        let cached_once = std::fs::read(&cache_file).unwrap();

        let second = crawler.crawl(&task(), &requested).await;
        assert_eq!(portal.navigation_count(), 1);
        let cached_twice = std::fs::read(&cache_file).unwrap();

        assert_eq!(cached_once, cached_twice);
        assert_eq!(first.students, second.students);
        assert_eq!(first.assignments, second.assignments);
    }

    #[tokio::test]
    async fn test_unreachable_class_yields_empty_roster() {
        let urls = PortalUrls::with_base("https://p.test");
        let portal = FakePortal::new();
        let crawler = ClassCrawler::new(&portal, &urls, None);
        let class = crawler.crawl(&task(), &["x".to_string()]).await;
        assert!(class.students.is_empty());
        assert!(class.assignments.is_empty());
    }
}
