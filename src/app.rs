use crate::api::PortalTransport;
use crate::config::PortalUrls;
use crate::crawler::ClassCrawler;
use crate::error::{CrawlError, Result};
use crate::export::OutputWriter;
use crate::fetcher::StudentExtractor;
use crate::limiter::RateLimiter;
use crate::models::{CrawlPlan, CrawlTask};
use chrono::NaiveDate;
use futures::future::join_all;
use std::path::{Path, PathBuf};
use tokio::sync::Semaphore;
use tracing::{error, info};

/// What happened to one class of the run.
#[derive(Debug)]
pub struct ClassOutcome {
    pub label: String,
    pub outputs: Vec<PathBuf>,
    pub error: Option<CrawlError>,
}

impl ClassOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Drives every queued class through crawl, extraction and output.
pub struct CrawlRun<'a, T: PortalTransport + ?Sized> {
    transport: &'a T,
    urls: &'a PortalUrls,
    plan: &'a CrawlPlan,
    cache_dir: &'a Path,
    out_dir: &'a Path,
    run_date: NaiveDate,
}

impl<'a, T: PortalTransport + ?Sized> CrawlRun<'a, T> {
    /// Create a run over `transport` for the given plan.
    pub fn new(
        transport: &'a T,
        urls: &'a PortalUrls,
        plan: &'a CrawlPlan,
        cache_dir: &'a Path,
        out_dir: &'a Path,
        run_date: NaiveDate,
    ) -> Self {
        Self {
            transport,
            urls,
            plan,
            cache_dir,
            out_dir,
            run_date,
        }
    }

    /// Process `tasks` one class at a time.
    ///
    /// A class that fails to write is reported in its outcome and the others
    /// carry on. Fatal errors end the run.
    pub async fn execute(&self, tasks: &[CrawlTask]) -> Result<Vec<ClassOutcome>> {
        let limiter = RateLimiter::for_portal()?;
        let class_slot = Semaphore::new(1);

        let runs = tasks.iter().map(|task| {
            let (limiter, class_slot) = (&limiter, &class_slot);
            async move {
                let _slot = class_slot
                    .acquire()
                    .await
                    .map_err(|_| CrawlError::MissingAsset("class queue was closed".into()))?;
                Ok::<_, CrawlError>(self.run_class(task, limiter).await)
            }
        });
        let results = join_all(runs).await;

        let mut outcomes = Vec::with_capacity(results.len());
        for result in results {
            let mut outcome = result?;
            match outcome.error.take() {
                Some(e) if e.is_fatal() => return Err(e),
                error => outcome.error = error,
            }
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    async fn run_class(&self, task: &CrawlTask, limiter: &RateLimiter) -> ClassOutcome {
        let label = task.label();
        let mut outcome = ClassOutcome {
            label: label.clone(),
            outputs: Vec::new(),
            error: None,
        };

        if let Err(e) = self.process(task, limiter, &mut outcome.outputs).await {
            error!(class = %label, error = %e, "class failed");
            outcome.error = Some(e);
        } else {
            info!(class = %label, files = outcome.outputs.len(), "class done");
        }
        outcome
    }

    async fn process(&self, task: &CrawlTask, limiter: &RateLimiter, outputs: &mut Vec<PathBuf>) -> Result<()> {
        let cache_dir = self.plan.use_cache.then_some(self.cache_dir);
        let crawled = ClassCrawler::new(self.transport, self.urls, cache_dir)
            .crawl(task, &self.plan.assignments)
            .await;

        let extractor = StudentExtractor::new(
            self.transport,
            self.urls,
            limiter,
            self.plan.due,
            self.plan.download.code,
        );
        let class = extractor.extract(crawled).await?;

        let writer = OutputWriter::new(self.out_dir, &self.plan.assignments, self.plan.due, self.run_date);
        if self.plan.download.score {
            outputs.push(writer.write_grades(&class)?);
        }
        if self.plan.download.code {
            outputs.push(writer.write_code(&class)?);
        }
        Ok(())
    }
}

/// One line per class for the end-of-run report.
pub fn summarize(outcomes: &[ClassOutcome]) -> Vec<String> {
    outcomes
        .iter()
        .map(|outcome| match &outcome.error {
            None => {
                let paths: Vec<String> = outcome.outputs.iter().map(|p| p.display().to_string()).collect();
                format!("{}: {}", outcome.label, paths.join(", "))
            }
            Some(e) => format!("{}: FAILED ({})", outcome.label, e),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::tests as crawl;
    use crate::fetcher::tests::{class_portal, due};
    use crate::models::DownloadOptions;

    fn plan(download: DownloadOptions) -> CrawlPlan {
        CrawlPlan {
            assignments: vec!["FizzBuzz".to_string()],
            due: due(),
            download,
            use_cache: true,
        }
    }

    fn run_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 16).unwrap()
    }

    #[tokio::test]
    async fn test_end_to_end_classifies_on_time_and_late() {
        let dir = tempfile::tempdir().unwrap();
        let urls = PortalUrls::with_base("https://p.test");
        let portal = class_portal(&urls);
        let plan = plan(DownloadOptions { score: true, code: true });
        let cache = dir.path().join("cached");
        let out = dir.path().join("out");

        let run = CrawlRun::new(&portal, &urls, &plan, &cache, &out, run_date());
        let outcomes = run.execute(&[crawl::task()]).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].succeeded());
        assert_eq!(outcomes[0].outputs.len(), 2);

        let csv_path = out.join("grades/Smith_P3/FizzBuzz_2024-1-16.csv");
        let text = std::fs::read_to_string(&csv_path).unwrap();
        let rows: Vec<&str> = text.lines().collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[1].starts_with("\"Lovelace, Ada\",3,ada@student.school.org,FizzBuzz,"));
        assert!(rows[1].contains(",on time,Submitted,8,"));
        assert!(rows[1].ends_with(",8,10,yes"));
        assert!(rows[2].starts_with("\"Turing, Alan\",3,none,"));
        assert!(rows[2].contains(",late,Submitted,0,"));
        assert!(rows[2].ends_with(",0,10,no"));

        assert!(out.join("code/Smith_P3/FizzBuzz_2024-1-16.zip").is_file());
        assert!(cache.join("5001/9003/index.html").is_file());
    }

    #[tokio::test]
    async fn test_write_failure_is_reported_per_class() {
        let dir = tempfile::tempdir().unwrap();
        let urls = PortalUrls::with_base("https://p.test");
        let portal = class_portal(&urls);
        let plan = plan(DownloadOptions { score: true, code: false });
        // A plain file where the output directory should be.
        let out = dir.path().join("out");
        std::fs::write(&out, "not a directory").unwrap();

        let mut other = crawl::task();
        other.class_id = "9004".into();
        other.period = "4".into();

        let run = CrawlRun::new(&portal, &urls, &plan, dir.path(), &out, run_date());
        let outcomes = run.execute(&[crawl::task(), other]).await.unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| matches!(o.error, Some(CrawlError::Write { .. }))));

        let summary = summarize(&outcomes);
        assert!(summary[0].starts_with("Smith_P3: FAILED"));
        assert!(summary[1].starts_with("Smith_P4: FAILED"));
    }

    #[test]
    fn test_summarize_lists_outputs() {
        let outcomes = vec![ClassOutcome {
            label: "Smith_P3".into(),
            outputs: vec![PathBuf::from("out/grades/a.csv")],
            error: None,
        }];
        assert_eq!(summarize(&outcomes), vec!["Smith_P3: out/grades/a.csv"]);
    }
}
