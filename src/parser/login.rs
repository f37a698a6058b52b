use super::{element_text, path_segments, selector};
use scraper::Html;

/// Fields of the login form the session has to echo back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginForm {
    pub action: Option<String>,
    pub csrf_token: Option<String>,
}

/// Read the form action and CSRF token from the login page.
pub fn parse_login_form(markup: &str) -> LoginForm {
    let document = Html::parse_document(markup);
    let csrf = document
        .select(&selector("input[name=csrfmiddlewaretoken]"))
        .next()
        .and_then(|input| input.value().attr("value"))
        .map(str::to_string);
    let action = document
        .select(&selector("form#login-form, form"))
        .next()
        .and_then(|form| form.value().attr("action"))
        .filter(|action| !action.is_empty())
        .map(str::to_string);

    LoginForm {
        action,
        csrf_token: csrf,
    }
}

/// Decide whether a login attempt succeeded.
///
/// Only inline warnings next to the form mean rejection. On success the
/// teacher id is the last path segment of the landing URL when it is numeric;
/// `None` when the portal landed somewhere else.
pub fn parse_login_result(final_url: &str, markup: &str) -> Result<Option<String>, Vec<String>> {
    let document = Html::parse_document(markup);
    let warnings: Vec<String> = document
        .select(&selector(".form-alert-red"))
        .map(element_text)
        .collect();
    if !warnings.is_empty() {
        return Err(warnings);
    }

    Ok(path_segments(final_url)
        .pop()
        .filter(|id| id.chars().all(|c| c.is_ascii_digit())))
}
