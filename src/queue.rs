use crate::config::{fill_template, PortalUrls};
use crate::error::{CrawlError, Result};
use crate::models::{CrawlTask, SectionCatalog};
use std::collections::HashSet;

/// Period token meaning "every class of this teacher".
pub const ALL_CLASSES: &str = "0";

/// A parsed `teacher|period` selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub teacher: String,
    pub period: String,
}

impl std::str::FromStr for Selection {
    type Err = CrawlError;

    fn from_str(token: &str) -> Result<Self> {
        let (teacher, period) = token
            .split_once('|')
            .ok_or_else(|| CrawlError::InvalidSelection(token.to_string()))?;
        let (teacher, period) = (teacher.trim(), period.trim());
        if teacher.is_empty() || period.is_empty() {
            return Err(CrawlError::InvalidSelection(token.to_string()));
        }
        Ok(Selection {
            teacher: teacher.to_string(),
            period: period.to_string(),
        })
    }
}

/// Every selectable token for a catalog: "all classes" per teacher first, then
/// each individual class.
pub fn selection_options(catalog: &SectionCatalog) -> Vec<(String, String)> {
    let all = catalog
        .keys()
        .map(|teacher| (format!("All {} Classes", teacher), format!("{}|{}", teacher, ALL_CLASSES)));
    let single = catalog.iter().flat_map(|(teacher, entry)| {
        entry
            .classes
            .keys()
            .map(move |period| (format!("P{} {}", period, teacher), format!("{}|{}", teacher, period)))
    });
    all.chain(single).collect()
}

/// Expand selections into crawl tasks.
///
/// A `teacher|0` selection queues every class of that teacher and makes later
/// selections for the same teacher no-ops. No (teacher, class) pair is queued
/// twice; order follows first occurrence.
pub fn build(
    selections: &[Selection],
    catalog: &SectionCatalog,
    urls: &PortalUrls,
) -> Result<Vec<CrawlTask>> {
    let mut covered: HashSet<&str> = HashSet::new();
    let mut queued: HashSet<(String, String)> = HashSet::new();
    let mut tasks = Vec::new();

    for selection in selections {
        let invalid = || CrawlError::InvalidSelection(format!("{}|{}", selection.teacher, selection.period));
        let section = catalog.get(&selection.teacher).ok_or_else(invalid)?;

        if covered.contains(selection.teacher.as_str()) {
            continue;
        }

        let periods: Vec<&String> = if selection.period == ALL_CLASSES {
            covered.insert(selection.teacher.as_str());
            section.classes.keys().collect()
        } else {
            if !section.classes.contains_key(&selection.period) {
                return Err(invalid());
            }
            vec![&selection.period]
        };

        for period in periods {
            let class_id = &section.classes[period];
            if !queued.insert((selection.teacher.clone(), class_id.clone())) {
                continue;
            }
            tasks.push(CrawlTask {
                teacher_name: selection.teacher.clone(),
                section_id: section.id.clone(),
                class_id: class_id.clone(),
                period: period.clone(),
                url: fill_template(&urls.class_home, &[&section.id, class_id]),
            });
        }
    }

    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SectionEntry;
    use indexmap::IndexMap;

    fn catalog() -> SectionCatalog {
        let mut catalog = SectionCatalog::new();
        let mut a = IndexMap::new();
        a.insert("1".to_string(), "101".to_string());
        a.insert("3".to_string(), "103".to_string());
        a.insert("5".to_string(), "105".to_string());
        catalog.insert("A".into(), SectionEntry { id: "10".into(), classes: a });
        let mut b = IndexMap::new();
        b.insert("2".to_string(), "202".to_string());
        catalog.insert("B".into(), SectionEntry { id: "20".into(), classes: b });
        catalog
    }

    fn parse(tokens: &[&str]) -> Vec<Selection> {
        tokens.iter().map(|t| t.parse().unwrap()).collect()
    }

    fn periods(tasks: &[CrawlTask]) -> Vec<String> {
        tasks.iter().map(|t| format!("{}{}", t.teacher_name, t.period)).collect()
    }

    #[test]
    fn test_all_supersedes_later_single() {
        let urls = PortalUrls::with_base("https://p.test");
        let tasks = build(&parse(&["A|0", "A|3"]), &catalog(), &urls).unwrap();
        assert_eq!(periods(&tasks), vec!["A1", "A3", "A5"]);
        assert_eq!(tasks[1].class_id, "103");
        assert_eq!(tasks[1].section_id, "10");
        assert_eq!(tasks[1].url, "https://p.test/lms/assignments/10/section/103");
    }

    #[test]
    fn test_single_before_all_is_not_duplicated() {
        let urls = PortalUrls::with_base("https://p.test");
        let tasks = build(&parse(&["B|2", "A|3", "A|0", "A|3"]), &catalog(), &urls).unwrap();
        assert_eq!(periods(&tasks), vec!["B2", "A3", "A1", "A5"]);
    }

    #[test]
    fn test_unknown_selection_is_rejected() {
        let urls = PortalUrls::with_base("https://p.test");
        assert!(matches!(
            build(&parse(&["C|0"]), &catalog(), &urls),
            Err(CrawlError::InvalidSelection(_))
        ));
        assert!(matches!(
            build(&parse(&["A|4"]), &catalog(), &urls),
            Err(CrawlError::InvalidSelection(_))
        ));
    }

    #[test]
    fn test_parse_selection() {
        assert_eq!(
            "Smith|3".parse::<Selection>().unwrap(),
            Selection { teacher: "Smith".into(), period: "3".into() }
        );
        assert!("Smith".parse::<Selection>().is_err());
        assert!("|3".parse::<Selection>().is_err());
    }

    #[test]
    fn test_selection_options() {
        let options = selection_options(&catalog());
        let values: Vec<&str> = options.iter().map(|(_, v)| v.as_str()).collect();
        assert_eq!(values, vec!["A|0", "B|0", "A|1", "A|3", "A|5", "B|2"]);
        assert_eq!(options[2].0, "P1 A");
    }
}
