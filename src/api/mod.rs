mod grading;
mod session;

pub use grading::GradeHistoryResolver;
pub use session::RemoteSession;

use crate::error::Result;
use crate::store::CacheEntry;
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Where the markup of a loaded page came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOrigin {
    Live,
    Cached,
    /// Navigation failed; the page is empty but processing continues.
    Degraded,
}

/// A loaded page and where its markup came from.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    pub markup: String,
    pub origin: PageOrigin,
}

/// Requests made against the portal over the authenticated session.
///
/// `navigate` is a full page load; `fetch` and `post_form` are the lighter
/// in-page requests issued while a page is open. All share one cookie jar.
#[async_trait]
pub trait PortalTransport: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<String>;

    async fn fetch(&self, url: &str) -> Result<String>;

    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<String>;

    /// Load a page, preferring `cache` when it already holds a snapshot.
    ///
    /// A failed live navigation is logged and yields an empty page. The first
    /// successful live load is written to `cache`.
    async fn fetch_document(&self, url: &str, cache: Option<&CacheEntry>) -> Page {
        if let Some(entry) = cache {
            if let Some(markup) = entry.read().await {
                debug!(url, path = %entry.path().display(), "using cached page");
                return Page {
                    url: url.to_string(),
                    markup,
                    origin: PageOrigin::Cached,
                };
            }
            info!(url, "no cached copy, loading live (first run may take several minutes)");
        }

        match self.navigate(url).await {
            Ok(markup) => {
                if let Some(entry) = cache {
                    if let Err(e) = entry.write(&markup).await {
                        warn!(error = %e, "failed to write page cache");
                    }
                }
                Page {
                    url: url.to_string(),
                    markup,
                    origin: PageOrigin::Live,
                }
            }
            Err(e) => {
                warn!(error = %e, "navigation failed, continuing with an empty page");
                Page {
                    url: url.to_string(),
                    markup: String::new(),
                    origin: PageOrigin::Degraded,
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fake::FakePortal;
    use super::*;

    #[tokio::test]
    async fn test_fetch_document_builds_then_uses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let entry = CacheEntry::for_class(dir.path(), "1", "2");
        let portal = FakePortal::new().with_page("https://p.test/x", "<p>live</p>");

        let first = portal.fetch_document("https://p.test/x", Some(&entry)).await;
        assert_eq!(first.origin, PageOrigin::Live);
        assert_eq!(portal.navigation_count(), 1);

        let second = portal.fetch_document("https://p.test/x", Some(&entry)).await;
        assert_eq!(second.origin, PageOrigin::Cached);
        assert_eq!(second.markup, "<p>live</p>");
        assert_eq!(portal.navigation_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_navigation_degrades() {
        let portal = FakePortal::new();
        let page = portal.fetch_document("https://p.test/missing", None).await;
        assert_eq!(page.origin, PageOrigin::Degraded);
        assert!(page.markup.is_empty());
    }

    #[tokio::test]
    async fn test_degraded_page_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let entry = CacheEntry::for_class(dir.path(), "1", "2");
        let portal = FakePortal::new();
        portal.fetch_document("https://p.test/missing", Some(&entry)).await;
        assert!(!entry.path().exists());
    }
}
