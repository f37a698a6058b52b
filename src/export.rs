use crate::error::{CrawlError, Result};
use crate::models::{AssignmentRecord, ClassResult, STATUS_UNAVAILABLE};
use crate::store::ensure_parent_dir;
use chrono::{NaiveDate, NaiveDateTime};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const ASSIGNMENT_COLUMNS: [&str; 9] = [
    "Problem",
    "Due",
    "First Try",
    "First Time",
    "Time Worked By Due Date",
    "Total Time Worked",
    "On Time Status",
    "Problem Status",
    "Points",
];

/// Render points without a trailing `.0` for whole numbers.
pub fn format_points(points: Option<f64>) -> String {
    match points {
        Some(p) if p.fract() == 0.0 => format!("{:.0}", p),
        Some(p) => format!("{}", p),
        None => crate::models::PLACEHOLDER.to_string(),
    }
}

// Characters a browser's `encodeURIComponent` leaves alone.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Percent-encode a zip entry component like a browser's `encodeURIComponent`.
pub fn encode_component(text: &str) -> String {
    utf8_percent_encode(text, URI_COMPONENT).to_string()
}

fn sanitize(component: &str) -> String {
    component
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c => c,
        })
        .collect()
}

/// Writes finished class results to disk.
pub struct OutputWriter {
    out_dir: PathBuf,
    requested: Vec<String>,
    due: NaiveDateTime,
    run_date: NaiveDate,
}

impl OutputWriter {
    /// Writer for one run. `requested` names the output files.
    pub fn new(out_dir: &Path, requested: &[String], due: NaiveDateTime, run_date: NaiveDate) -> Self {
        Self {
            out_dir: out_dir.to_path_buf(),
            requested: requested.to_vec(),
            due,
            run_date,
        }
    }

    /// `Hello-World_FizzBuzz_2024-1-15`
    fn file_stem(&self) -> String {
        let mut parts: Vec<String> = self
            .requested
            .iter()
            .map(|name| sanitize(name.trim()).replace(' ', "-"))
            .collect();
        parts.push(self.run_date.format("%Y-%-m-%-d").to_string());
        parts.join("_")
    }

    /// Where the gradebook CSV of `class` is written.
    pub fn grades_path(&self, class: &ClassResult) -> PathBuf {
        self.out_dir
            .join("grades")
            .join(sanitize(&class.task.label()))
            .join(format!("{}.csv", self.file_stem()))
    }

    /// Where the code archive of `class` is written.
    pub fn code_path(&self, class: &ClassResult) -> PathBuf {
        self.out_dir
            .join("code")
            .join(sanitize(&class.task.label()))
            .join(format!("{}.zip", self.file_stem()))
    }

    /// Write one gradebook row per student.
    pub fn write_grades(&self, class: &ClassResult) -> Result<PathBuf> {
        let path = self.grades_path(class);
        ensure_parent_dir(&path)?;
        let fail = |e: csv::Error| CrawlError::write(&path, e);

        // Create CSV writer
        let mut wtr = csv::Writer::from_path(&path).map_err(fail)?;

        // Build CSV headers, one column group per resolved assignment
        let mut headers = vec!["Name".to_string(), "Period".to_string(), "E-mail".to_string()];
        for _ in &class.assignments {
            headers.extend(ASSIGNMENT_COLUMNS.iter().map(|c| c.to_string()));
        }
        headers.extend_from_slice(&[
            "Total Points Awarded".to_string(),
            "Total Points Possible".to_string(),
            "On Time?".to_string(),
        ]);
        wtr.write_record(&headers).map_err(fail)?;

        let due = self.due.format("%m/%d/%Y %H:%M:%S").to_string();

        // Write each student's row
        for student in &class.students {
            let mut record = vec![
                format!("{}, {}", student.last_name, student.first_name),
                class.task.period.clone(),
                student.email.clone(),
            ];

            for assignment in &class.assignments {
                let fallback;
                let entry = match student.assignments.get(&assignment.assignment_id) {
                    Some(entry) => entry,
                    None => {
                        fallback = AssignmentRecord::sentinel(&assignment.display_name, STATUS_UNAVAILABLE);
                        &fallback
                    }
                };

                record.extend([
                    entry.problem_name.clone(),
                    due.clone(),
                    entry.first_attempt_date.clone(),
                    entry.first_attempt_time.clone(),
                    entry.time_worked_by_due.clone(),
                    entry.time_worked_total.clone(),
                    entry.on_time.to_string(),
                    entry.problem_status.clone(),
                    format_points(entry.points_awarded),
                ]);
            }

            // Add totals
            record.push(format_points(Some(student.total_awarded())));
            record.push(format_points(Some(student.total_possible())));
            record.push(if student.all_on_time() { "yes" } else { "no" }.to_string());

            wtr.write_record(&record).map_err(fail)?;
        }

        wtr.flush().map_err(|e| CrawlError::write(&path, e))?;
        info!(path = %path.display(), "grades written");
        Ok(path)
    }

    /// Write every recovered code snapshot into one zip archive. Placeholder
    /// snapshots are skipped.
    pub fn write_code(&self, class: &ClassResult) -> Result<PathBuf> {
        let path = self.code_path(class);
        ensure_parent_dir(&path)?;

        let file = std::fs::File::create(&path).map_err(|e| CrawlError::write(&path, e))?;
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut used = HashSet::new();

        for student in &class.students {
            let prefix = format!(
                "P{}_{}-{}",
                class.task.period,
                sanitize(&student.first_name),
                sanitize(&student.last_name)
            );
            for assignment in &class.assignments {
                let Some(entry) = student.assignments.get(&assignment.assignment_id) else {
                    continue;
                };
                for snapshot in entry.snapshots.iter().filter(|s| !s.is_placeholder()) {
                    let base = format!("{}_{}", prefix, encode_component(&snapshot.submitted_at));
                    let mut name = format!("{}.txt", base);
                    let mut n = 2;
                    while !used.insert(name.clone()) {
                        name = format!("{}_{}.txt", base, n);
                        n += 1;
                    }

                    zip.start_file(name, options)
                        .map_err(|e| CrawlError::write(&path, e))?;
                    zip.write_all(snapshot.source.as_bytes())
                        .map_err(|e| CrawlError::write(&path, e))?;
                }
            }
        }

        zip.finish().map_err(|e| CrawlError::write(&path, e))?;
        info!(path = %path.display(), entries = used.len(), "code archive written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AssignmentSpec, CrawlTask, OnTimeStatus, Student, SubmissionSnapshot, STATUS_PROBLEM_REMOVED,
    };
    use indexmap::IndexMap;

    fn due() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(23, 59, 0)
            .unwrap()
    }

    fn record(awarded: f64, max: f64, snapshots: Vec<SubmissionSnapshot>) -> AssignmentRecord {
        AssignmentRecord {
            problem_name: "Problem".into(),
            first_attempt_date: "01/14/2024".into(),
            first_attempt_time: "15:00".into(),
            time_worked_by_due: String::new(),
            time_worked_total: String::new(),
            on_time: OnTimeStatus::OnTime,
            problem_status: "Submitted".into(),
            points_awarded: Some(awarded),
            max_points: Some(max),
            snapshots,
        }
    }

    fn class() -> ClassResult {
        let mut assignments = IndexMap::new();
        assignments.insert(
            "1".to_string(),
            record(
                8.0,
                10.0,
                vec![
                    SubmissionSnapshot {
                        submitted_at: "Jan. 15, 10:00 p.m.".into(),
                        source: "print(1)".into(),
                    },
                    SubmissionSnapshot {
                        submitted_at: "Jan. 15, 10:00 p.m.".into(),
                        source: "print(2)".into(),
                    },
                ],
            ),
        );
        assignments.insert("2".to_string(), record(0.0, 10.0, vec![SubmissionSnapshot::placeholder()]));

        ClassResult {
            task: CrawlTask {
                teacher_name: "Smith".into(),
                section_id: "10".into(),
                class_id: "103".into(),
                period: "3".into(),
                url: String::new(),
            },
            assignments: vec![
                AssignmentSpec {
                    display_name: "Hello World".into(),
                    assignment_id: "1".into(),
                },
                AssignmentSpec {
                    display_name: "FizzBuzz".into(),
                    assignment_id: "2".into(),
                },
            ],
            students: vec![Student {
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                email: "ada@student.school.org".into(),
                portal_id: Some("70001".into()),
                assignments,
            }],
        }
    }

    fn writer(dir: &Path) -> OutputWriter {
        OutputWriter::new(
            dir,
            &["Hello World".to_string(), "FizzBuzz".to_string()],
            due(),
            NaiveDate::from_ymd_opt(2024, 1, 16).unwrap(),
        )
    }

    #[test]
    fn test_write_grades_totals() {
        let dir = tempfile::tempdir().unwrap();
        let path = writer(dir.path()).write_grades(&class()).unwrap();
        assert!(path.ends_with("grades/Smith_P3/Hello-World_FizzBuzz_2024-1-16.csv"));

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("Name,Period,E-mail,Problem,Due,First Try,First Time,"));
        assert!(header.ends_with("Points,Total Points Awarded,Total Points Possible,On Time?"));
        assert_eq!(header.split(',').count(), 3 + 9 * 2 + 3);

        let row = lines.next().unwrap();
        assert!(row.starts_with("\"Lovelace, Ada\",3,ada@student.school.org,Problem,01/15/2024 23:59:00,"));
        assert!(row.ends_with(",8,20,yes"));
    }

    #[test]
    fn test_missing_record_renders_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let mut class = class();
        class.students[0].assignments.shift_remove("2");
        class.students[0].assignments.insert(
            "1".to_string(),
            AssignmentRecord::sentinel("Hello World", STATUS_PROBLEM_REMOVED),
        );
        let path = writer(dir.path()).write_grades(&class).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        let row = text.lines().nth(1).unwrap();
        assert!(row.contains("Problem Removed"));
        assert!(row.contains("Unavailable"));
        assert!(row.ends_with(",0,0,no"));
    }

    #[test]
    fn test_write_code_skips_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let path = writer(dir.path()).write_code(&class()).unwrap();
        assert!(path.ends_with("code/Smith_P3/Hello-World_FizzBuzz_2024-1-16.zip"));
        let bytes = std::fs::read(&path).unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("P3_Ada-Lovelace_Jan.%2015%2C%2010%3A00%20p.m..txt"));
        assert!(text.contains("P3_Ada-Lovelace_Jan.%2015%2C%2010%3A00%20p.m._2.txt"));
    }

    #[test]
    fn test_format_points() {
        assert_eq!(format_points(Some(8.0)), "8");
        assert_eq!(format_points(Some(7.5)), "7.5");
        assert_eq!(format_points(None), "--");
    }

    #[test]
    fn test_encode_component() {
        assert_eq!(encode_component("Jan. 15, 10:00 p.m."), "Jan.%2015%2C%2010%3A00%20p.m.");
        assert_eq!(encode_component("Jan. 15 (v2)~!'*"), "Jan.%2015%20(v2)~!'*");
        assert_eq!(encode_component("a/b?c=d&e"), "a%2Fb%3Fc%3Dd%26e");
    }
}
