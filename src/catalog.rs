use crate::api::{PageOrigin, PortalTransport};
use crate::config::{fill_template, PortalUrls};
use crate::error::{CrawlError, Result};
use crate::models::SectionCatalog;
use crate::parser;
use crate::store;
use std::path::{Path, PathBuf};
use tracing::info;

/// Teacher -> section -> class hierarchy, cached at `<state_dir>/sections.json`.
pub struct CatalogStore {
    path: PathBuf,
}

impl CatalogStore {
    /// Catalog store under `state_dir`.
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join("sections.json"),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load the cached catalog.
    pub fn load(&self) -> Result<SectionCatalog> {
        store::read_json(&self.path)
    }

    /// Save the catalog, creating the state directory if needed.
    pub fn save(&self, catalog: &SectionCatalog) -> Result<()> {
        store::write_json(&self.path, catalog)
    }

    /// Read the cached catalog, discovering and persisting it when absent or
    /// when `refresh` is set.
    pub async fn load_or_discover<T: PortalTransport + ?Sized>(
        &self,
        transport: &T,
        urls: &PortalUrls,
        teacher_id: &str,
        refresh: bool,
    ) -> Result<SectionCatalog> {
        if self.exists() && !refresh {
            return self.load();
        }
        let catalog = discover(transport, urls, teacher_id).await?;
        self.save(&catalog)?;
        info!(path = %self.path.display(), sections = catalog.len(), "section ids saved");
        Ok(catalog)
    }
}

/// Read every section and class id from the teacher course page.
pub async fn discover<T: PortalTransport + ?Sized>(
    transport: &T,
    urls: &PortalUrls,
    teacher_id: &str,
) -> Result<SectionCatalog> {
    info!(teacher_id, "parsing section ids");
    let url = fill_template(&urls.teacher_courses, &[teacher_id]);
    let page = transport.fetch_document(&url, None).await;
    if page.origin == PageOrigin::Degraded {
        return Err(CrawlError::navigation(&url, "teacher course page could not be loaded"));
    }

    let catalog = parser::parse_course_list(&page.markup);
    if catalog.is_empty() {
        return Err(CrawlError::Response {
            url,
            reason: "no sections found on the teacher course page".into(),
        });
    }
    Ok(catalog)
}
