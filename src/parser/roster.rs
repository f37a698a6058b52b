use super::{element_text, selector};
use indexmap::IndexMap;
use scraper::Html;

/// Map of "First Last" -> email from the class roster page. Students without an
/// email cell map to `"none"`.
pub fn parse_roster_emails(markup: &str) -> IndexMap<String, String> {
    let document = Html::parse_document(markup);
    let row_sel = selector("#classset-progress table tr");
    let link_sel = selector("a");
    let cell_sel = selector("td");

    let mut emails = IndexMap::new();
    for row in document.select(&row_sel) {
        let Some(link) = row.select(&link_sel).next() else {
            continue;
        };
        let name = element_text(link);
        if name.is_empty() {
            continue;
        }
        let email = row
            .select(&cell_sel)
            .map(element_text)
            .filter(|text| text.contains('@'))
            .last()
            .unwrap_or_else(|| "none".to_string());
        emails.insert(name, email);
    }
    emails
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roster_emails() {
        let markup = r#"
<div id="classset-progress"><table>
  <tr><th>Name</th><th>Email</th></tr>
  <tr><td><a href="/s/1"> Ada  Lovelace </a></td><td>ada@student.school.org</td></tr>
  <tr><td><a href="/s/2">Alan Turing</a></td><td>--</td></tr>
</table></div>"#;
        let emails = parse_roster_emails(markup);
        assert_eq!(emails.len(), 2);
        assert_eq!(emails["Ada Lovelace"], "ada@student.school.org");
        assert_eq!(emails["Alan Turing"], "none");
    }
}
