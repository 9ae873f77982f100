//! Point-in-time summaries of the cache directory.

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use time::UtcDateTime;
use time::macros::format_description;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Outcome of [`CacheStore::sweep()`](crate::CacheStore::sweep).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Expired entries deleted.
    pub removed: usize,
    /// Entries still within their max age.
    pub kept: usize,
    /// Entries that couldn't be inspected or deleted.
    pub errors: usize,
    /// Temporary files abandoned by interrupted writes and deleted.
    pub temporaries: usize,
}
impl Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "removed {}, kept {}, errors {}", self.removed, self.kept, self.errors)?;
        if self.temporaries > 0 {
            write!(f, ", stale temporaries {}", self.temporaries)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindStatistics {
    pub files: usize,
    pub bytes: u64,
}

/// A cache entry singled out in [`CacheStatistics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryStamp {
    pub file_name: String,
    pub modified: UtcDateTime,
}

/// Aggregate counts and sizes, computed on demand by
/// [`CacheStore::statistics()`](crate::CacheStore::statistics).
///
/// The [`Display`] implementation renders the health report printed at the
/// end of an extraction run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStatistics {
    pub total_files: usize,
    pub total_bytes: u64,
    /// Keyed by kind name. Built-in kinds are always present, even if empty.
    pub by_kind: BTreeMap<String, KindStatistics>,
    pub oldest: Option<EntryStamp>,
    pub newest: Option<EntryStamp>,
    /// Entries skipped because their metadata couldn't be read.
    pub errors: usize,
    /// Configured max age, carried along for the report.
    pub max_age_days: u32,
}
impl CacheStatistics {
    pub(crate) fn record(&mut self, kind: &str, file_name: String, bytes: u64, modified: UtcDateTime) {
        let entry = self.by_kind.entry(kind.to_string()).or_default();
        entry.files += 1;
        entry.bytes += bytes;
        self.total_files += 1;
        self.total_bytes += bytes;
        if self.oldest.as_ref().is_none_or(|oldest| modified < oldest.modified) {
            self.oldest = Some(EntryStamp { file_name: file_name.clone(), modified });
        }
        if self.newest.as_ref().is_none_or(|newest| modified > newest.modified) {
            self.newest = Some(EntryStamp { file_name, modified });
        }
    }
}

fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

fn write_stamp(f: &mut fmt::Formatter<'_>, label: &str, stamp: Option<&EntryStamp>) -> fmt::Result {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second] UTC");
    match stamp {
        Some(stamp) => {
            let when = stamp.modified.format(&format).map_err(|_| fmt::Error)?;
            writeln!(f, "{label}: {} ({when})", stamp.file_name)
        },
        None => writeln!(f, "{label}: none"),
    }
}

impl Display for CacheStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CACHE HEALTH REPORT")?;
        writeln!(f, "{}", "=".repeat(50))?;
        writeln!(f, "Total Files: {}", self.total_files)?;
        writeln!(f, "Total Size: {:.2} MB", megabytes(self.total_bytes))?;
        writeln!(f, "Max Age: {} days", self.max_age_days)?;
        if self.errors > 0 {
            writeln!(f, "Unreadable: {}", self.errors)?;
        }
        writeln!(f)?;
        writeln!(f, "By Kind:")?;
        let count = self.by_kind.len();
        for (i, (kind, stats)) in self.by_kind.iter().enumerate() {
            let branch = if i + 1 == count { "└──" } else { "├──" };
            writeln!(f, "{branch} {kind}: {} files ({:.2} MB)", stats.files, megabytes(stats.bytes))?;
        }
        writeln!(f)?;
        write_stamp(f, "Oldest", self.oldest.as_ref())?;
        write_stamp(f, "Newest", self.newest.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn test_record_tracks_extremes() {
        let now = UtcDateTime::now();
        let mut stats = CacheStatistics::default();
        stats.record("commits", "project_1.json".to_string(), 100, now - Duration::days(2));
        stats.record("commits", "project_2.json".to_string(), 50, now);
        stats.record("pipelines", "project_1.json".to_string(), 25, now - Duration::days(5));

        assert_eq!(stats.total_files, 3);
        assert_eq!(stats.total_bytes, 175);
        assert_eq!(stats.by_kind["commits"], KindStatistics { files: 2, bytes: 150 });
        assert_eq!(stats.by_kind["pipelines"], KindStatistics { files: 1, bytes: 25 });
        assert_eq!(stats.oldest.as_ref().unwrap().modified, now - Duration::days(5));
        assert_eq!(stats.newest.as_ref().unwrap().file_name, "project_2.json");
    }

    #[test]
    fn test_display() {
        let modified = UtcDateTime::new(
            time::Date::from_calendar_date(2026, time::Month::March, 2).unwrap(),
            time::Time::from_hms(9, 30, 0).unwrap(),
        );
        let mut stats = CacheStatistics { max_age_days: 7, ..Default::default() };
        stats.by_kind.insert("projects".to_string(), KindStatistics::default());
        stats.record("commits", "project_1.json".to_string(), 2 * 1024 * 1024, modified);

        let report = stats.to_string();
        assert!(report.starts_with("CACHE HEALTH REPORT\n"));
        assert!(report.contains("Total Files: 1\n"));
        assert!(report.contains("Total Size: 2.00 MB\n"));
        assert!(report.contains("Max Age: 7 days\n"));
        assert!(report.contains("├── commits: 1 files (2.00 MB)\n"));
        assert!(report.contains("└── projects: 0 files (0.00 MB)\n"));
        assert!(report.contains("Oldest: project_1.json (2026-03-02 09:30:00 UTC)\n"));
        assert!(!report.contains("Unreadable"));
    }

    #[test]
    fn test_display_empty() {
        let report = CacheStatistics::default().to_string();
        assert!(report.contains("Oldest: none\n"));
        assert!(report.contains("Newest: none\n"));
    }

    #[test]
    fn test_sweep_report_display() {
        let report = SweepReport { removed: 3, kept: 10, errors: 1, temporaries: 0 };
        assert_eq!(report.to_string(), "removed 3, kept 10, errors 1");
        let report = SweepReport { temporaries: 2, ..report };
        assert_eq!(report.to_string(), "removed 3, kept 10, errors 1, stale temporaries 2");
    }
}
