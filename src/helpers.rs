//! Shared utility helpers for trash bookkeeping and path text.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use std::time::SystemTime;

/// File extension used by trash info files.
pub const TRASHINFO_EXTENSION: &str = ".trashinfo";

/// Deletion date format used by Trash info metadata (local time, no zone).
pub const TRASHINFO_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Group header of a `.trashinfo` record.
pub const TRASHINFO_GROUP: &str = "[Trash Info]";

/// Builds the `.trashinfo` file name for the `attempt`-th allocation of `basename`.
///
/// The first attempt uses the plain name, later ones `<basename>$<n>`.
pub fn build_unique_basename(basename: &OsStr, attempt: u32) -> PathBuf {
    let mut name = basename.to_os_string();
    if attempt > 0 {
        name.push(format!("${attempt}"));
    }
    name.push(TRASHINFO_EXTENSION);
    PathBuf::from(name)
}

/// Parses a deletion date, accepting both the trashinfo format and RFC 3339.
pub fn parse_trash_datetime(value: &str) -> Option<DateTime<Local>> {
    NaiveDateTime::parse_from_str(value.trim(), TRASHINFO_TIME_FORMAT)
        .ok()
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .or_else(|| DateTime::parse_from_rfc3339(value.trim()).ok().map(|dt| dt.with_timezone(&Local)))
}

/// Serializes a timestamp into the trashinfo deletion date format (local time).
pub fn serialize_system_time(time: SystemTime) -> String {
    let dt = DateTime::<Local>::from(time);
    dt.format(TRASHINFO_TIME_FORMAT).to_string()
}

/// Human readable size rendering.
pub fn print_size(bytes: u64) -> String {
    const SUFFIXES: [&str; 5] = ["B", "K", "M", "G", "T"];
    let mut value = bytes as f64;
    let mut idx = 0usize;

    while value >= 1024.0 && idx < SUFFIXES.len() - 1 {
        value /= 1024.0;
        idx += 1;
    }

    if idx == 0 {
        format!("{:.0} {}", value, SUFFIXES[idx])
    } else {
        format!("{:.1} {}", value, SUFFIXES[idx])
    }
}

/// Splits `filename` into its lexically canonical components.
///
/// Repeated separators and `.` are dropped, `..` removes the previous
/// component (never climbing above the root).
pub fn canonical_components(filename: &[u8]) -> Vec<Vec<u8>> {
    let mut components: Vec<Vec<u8>> = Vec::new();
    for name in filename.split(|&c| c == b'/') {
        match name {
            b"" | b"." => {}
            b".." => {
                components.pop();
            }
            name => components.push(name.to_vec()),
        }
    }
    components
}

/// Lexically canonicalizes an absolute filename without touching the disk.
pub fn canonicalize_filename(filename: &OsStr) -> PathBuf {
    let mut out = Vec::with_capacity(filename.len());
    for name in canonical_components(filename.as_bytes()) {
        out.push(b'/');
        out.extend_from_slice(&name);
    }
    if out.is_empty() {
        out.push(b'/');
    }
    PathBuf::from(OsStr::from_bytes(&out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use std::time::Duration;

    #[test]
    fn unique_basenames() {
        let name = OsStr::new("report.pdf");
        assert_eq!(build_unique_basename(name, 0), PathBuf::from("report.pdf.trashinfo"));
        assert_eq!(build_unique_basename(name, 3), PathBuf::from("report.pdf$3.trashinfo"));
    }

    #[test]
    fn deletion_dates_round_trip() {
        let time = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let text = serialize_system_time(time);
        assert_eq!(text.len(), "2023-11-14T22:13:20".len());

        let parsed = parse_trash_datetime(&text).unwrap();
        assert_eq!(SystemTime::from(parsed), time);
    }

    #[test]
    fn parses_known_formats() {
        let dt = parse_trash_datetime("2004-08-31T22:32:08").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2004, 8, 31));
        assert_eq!((dt.hour(), dt.minute(), dt.second()), (22, 32, 8));
        assert!(parse_trash_datetime("2004-08-31T22:32:08+00:00").is_some());
        assert!(parse_trash_datetime("yesterday").is_none());
    }

    #[test]
    fn canonicalization() {
        let cases = [
            ("/", "/"),
            ("//a//b/", "/a/b"),
            ("/a/./b/../c", "/a/c"),
            ("/../../x", "/x"),
            ("/a/b/..", "/a"),
        ];
        for (input, expected) in cases {
            assert_eq!(canonicalize_filename(OsStr::new(input)), PathBuf::from(expected));
        }
    }

    #[test]
    fn sizes() {
        assert_eq!(print_size(12), "12 B");
        assert_eq!(print_size(2048), "2.0 K");
    }
}
