//! Report rows and CSV sinks.
//!
//! The reporter writes classified members verbatim: never-posted and
//! inactive members go to the inactive sink, active members go to the active
//! sink when one is configured.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::SecondsFormat;

use crate::classify::{Activity, ClassifiedMember};

pub const HEADER: [&str; 2] = ["Username", "Last Message Time"];

/// Written in place of a timestamp for members with no message.
pub const NEVER_POSTED: &str = "Never sent a message";

/// One output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub display_name: String,
    pub last_message: String,
}

impl ReportRow {
    pub fn from_classified(classified: &ClassifiedMember) -> Self {
        let last_message = match classified.activity.last_seen() {
            Some(at) => at.to_rfc3339_opts(SecondsFormat::Secs, true),
            None => NEVER_POSTED.to_string(),
        };
        Self {
            display_name: classified.member.display_name.clone(),
            last_message,
        }
    }
}

/// Destination for report rows.
pub trait ReportSink {
    fn write_row(&mut self, row: &ReportRow) -> Result<()>;

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// CSV sink with the `Username, Last Message Time` header.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
}

impl CsvSink<File> {
    /// Create (or truncate) `path` and write the header row.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Could not create report file: {}", path.display()))?;
        Self::new(file)
    }
}

impl<W: Write> CsvSink<W> {
    pub fn new(inner: W) -> Result<Self> {
        let mut writer = csv::Writer::from_writer(inner);
        writer.write_record(HEADER)?;
        Ok(Self { writer })
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush report: {}", e.error()))
    }
}

impl<W: Write> ReportSink for CsvSink<W> {
    fn write_row(&mut self, row: &ReportRow) -> Result<()> {
        self.writer
            .write_record([row.display_name.as_str(), row.last_message.as_str()])?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Rows handed to each sink by `Report::write`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportCounts {
    pub inactive_rows: usize,
    pub active_rows: usize,
}

/// Routes classified members to their sinks.
pub struct Report<'a> {
    inactive: &'a mut dyn ReportSink,
    active: Option<&'a mut dyn ReportSink>,
}

impl<'a> Report<'a> {
    pub fn new(inactive: &'a mut dyn ReportSink, active: Option<&'a mut dyn ReportSink>) -> Self {
        Self { inactive, active }
    }

    pub fn write(mut self, results: &[ClassifiedMember]) -> Result<ReportCounts> {
        let mut counts = ReportCounts::default();

        for classified in results {
            let row = ReportRow::from_classified(classified);
            match classified.activity {
                Activity::NeverPosted | Activity::Inactive(_) => {
                    self.inactive.write_row(&row)?;
                    counts.inactive_rows += 1;
                }
                Activity::Active(_) => {
                    if let Some(active) = self.active.as_mut() {
                        active.write_row(&row)?;
                        counts.active_rows += 1;
                    }
                }
            }
        }

        self.inactive.finish()?;
        if let Some(active) = self.active.as_mut() {
            active.finish()?;
        }

        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Member;
    use chrono::{TimeZone, Utc};

    #[derive(Default)]
    struct VecSink {
        rows: Vec<ReportRow>,
        finished: bool,
    }

    impl ReportSink for VecSink {
        fn write_row(&mut self, row: &ReportRow) -> Result<()> {
            self.rows.push(row.clone());
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            self.finished = true;
            Ok(())
        }
    }

    fn classified(name: &str, activity: Activity) -> ClassifiedMember {
        ClassifiedMember {
            member: Member::human(name, name),
            activity,
        }
    }

    fn sample() -> Vec<ClassifiedMember> {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        vec![
            classified("ghost", Activity::NeverPosted),
            classified("busy", Activity::Active(at)),
            classified("quiet", Activity::Inactive(at)),
        ]
    }

    #[test]
    fn test_row_formatting() {
        let rows: Vec<_> = sample().iter().map(ReportRow::from_classified).collect();
        assert_eq!(rows[0].last_message, NEVER_POSTED);
        assert_eq!(rows[1].last_message, "2024-05-01T12:00:00Z");
        assert_eq!(rows[2].display_name, "quiet");
    }

    #[test]
    fn test_routes_rows_by_activity() {
        let mut inactive = VecSink::default();
        let mut active = VecSink::default();

        let counts = Report::new(&mut inactive, Some(&mut active as &mut dyn ReportSink))
            .write(&sample())
            .unwrap();

        let names: Vec<_> = inactive.rows.iter().map(|r| r.display_name.as_str()).collect();
        assert_eq!(names, vec!["ghost", "quiet"]);
        assert_eq!(active.rows.len(), 1);
        assert_eq!(active.rows[0].display_name, "busy");
        assert_eq!(counts, ReportCounts { inactive_rows: 2, active_rows: 1 });
        assert!(inactive.finished && active.finished);
    }

    #[test]
    fn test_active_rows_dropped_without_active_sink() {
        let mut inactive = VecSink::default();
        let counts = Report::new(&mut inactive, None).write(&sample()).unwrap();

        assert_eq!(inactive.rows.len(), 2);
        assert_eq!(counts.active_rows, 0);
    }

    #[test]
    fn test_csv_output() {
        let mut sink = CsvSink::new(Vec::new()).unwrap();
        Report::new(&mut sink, None).write(&sample()).unwrap();

        let bytes = sink.into_inner().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            "Username,Last Message Time\nghost,Never sent a message\nquiet,2024-05-01T12:00:00Z\n"
        );
    }

    #[test]
    fn test_csv_quotes_awkward_names() {
        let mut sink = CsvSink::new(Vec::new()).unwrap();
        sink.write_row(&ReportRow {
            display_name: "smith, jr".to_string(),
            last_message: NEVER_POSTED.to_string(),
        })
        .unwrap();

        let text = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        assert!(text.ends_with("\"smith, jr\",Never sent a message\n"));
    }

    #[test]
    fn test_create_file_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inactive.csv");

        let mut sink = CsvSink::create(&path).unwrap();
        Report::new(&mut sink, None).write(&sample()).unwrap();
        drop(sink);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Username,Last Message Time\n"));
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_create_fails_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("inactive.csv");
        assert!(CsvSink::create(&path).is_err());
    }
}
