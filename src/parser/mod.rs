//! Page parsers. Each page type the portal serves has one function here that
//! turns raw markup into a typed record; nothing in this module performs I/O.

mod courses;
mod login;
mod progress;
mod roster;
mod submission;
pub mod timestamps;

pub use courses::parse_course_list;
pub use login::{parse_login_form, parse_login_result};
pub use progress::parse_progress_page;
pub use roster::parse_roster_emails;
pub use submission::{
    parse_grading_history, parse_snapshots, parse_submission_detail, CodeLocator, GradeSummary,
    SubmissionDetail,
};

use scraper::{ElementRef, Selector};

/// Parse a selector known at compile time.
pub(crate) fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector must be valid")
}

/// Whitespace-collapsed text content of an element.
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Path segments of an absolute or root-relative href.
pub(crate) fn path_segments(href: &str) -> Vec<String> {
    let path = match url::Url::parse(href) {
        Ok(url) => url.path().to_string(),
        Err(_) => href.split(['?', '#']).next().unwrap_or_default().to_string(),
    };
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
