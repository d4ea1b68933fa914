//! Commit-log naming and record parsing for versioned lake tables.
//!
//! A lake table keeps its history under `_delta_log/`: one immutable entry per
//! commit, named with a fixed-width, zero-padded version number and a `.json`
//! extension so lexicographic order equals numeric order. Each entry body is
//! newline-delimited JSON; the records that matter here carry an `add` or
//! `remove` file action, everything else (protocol, metadata, commit info) is
//! skipped.

use serde::Deserialize;

use crate::error::{ErrorKind, SyncResult};
use crate::sync_error;

/// Directory under the table root that holds commit entries.
pub const COMMIT_LOG_DIR: &str = "_delta_log";

/// Fixed width of the zero-padded commit version in entry names.
pub const COMMIT_VERSION_WIDTH: usize = 20;

/// Extension of commit entries.
const COMMIT_EXTENSION: &str = "json";

/// Parses a commit entry filename into its version number.
///
/// Returns [`None`] for anything that does not match the fixed-width pattern
/// (`00000000000000000001.json`); such entries are checkpoint files or other
/// log artifacts and must be skipped, not errored on.
pub fn parse_commit_version(filename: &str) -> Option<i64> {
    let stem = filename.strip_suffix(&format!(".{COMMIT_EXTENSION}"))?;

    if stem.len() != COMMIT_VERSION_WIDTH || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    // Fixed width keeps the value far below i64::MAX, but the parse can still
    // overflow on 20 nines; treat that as non-matching.
    stem.parse::<i64>().ok()
}

/// Renders the commit entry filename for a version.
pub fn commit_filename(version: i64) -> String {
    format!("{version:020}.{COMMIT_EXTENSION}")
}

/// A file added to the table by a commit.
#[derive(Debug, Clone, Deserialize)]
pub struct AddFile {
    /// Data file path, relative to the table root.
    pub path: String,
}

/// A file removed from the table by a commit.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoveFile {
    /// Data file path, relative to the table root.
    pub path: String,
}

/// One newline-delimited record of a commit entry.
///
/// Unknown record shapes deserialize with both actions absent and are ignored
/// by the replay.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommitRecord {
    pub add: Option<AddFile>,
    pub remove: Option<RemoveFile>,
}

/// Parses a commit entry body into its records.
///
/// Blank lines are skipped; a line that is not a JSON object makes the whole
/// commit invalid, since commit entries are immutable and never half-written
/// once their rename lands.
pub fn parse_commit_body(version: i64, body: &str) -> SyncResult<Vec<CommitRecord>> {
    let mut records = Vec::new();

    for line in body.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let record: CommitRecord = serde_json::from_str(line).map_err(|err| {
            sync_error!(
                ErrorKind::InvalidCommitLog,
                "Commit entry contains an unparseable record",
                format!("version {version}: {err}")
            )
        })?;

        records.push(record);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_width_commit_names_parse() {
        assert_eq!(parse_commit_version("00000000000000000000.json"), Some(0));
        assert_eq!(parse_commit_version("00000000000000000001.json"), Some(1));
        assert_eq!(parse_commit_version("00000000000000000042.json"), Some(42));
    }

    #[test]
    fn non_matching_names_are_skipped() {
        assert_eq!(parse_commit_version("garbage.txt"), None);
        assert_eq!(parse_commit_version("1.json"), None);
        assert_eq!(parse_commit_version("00000000000000000001.parquet"), None);
        assert_eq!(parse_commit_version("0000000000000000000a.json"), None);
        assert_eq!(
            parse_commit_version("00000000000000000001.checkpoint.json"),
            None
        );
        assert_eq!(parse_commit_version(""), None);
    }

    #[test]
    fn filenames_round_trip() {
        assert_eq!(commit_filename(7), "00000000000000000007.json");
        assert_eq!(parse_commit_version(&commit_filename(7)), Some(7));
    }

    #[test]
    fn commit_body_records_parse_and_skip_unknown_shapes() {
        let body = concat!(
            r#"{"commitInfo":{"operation":"WRITE"}}"#,
            "\n",
            r#"{"add":{"path":"part-0000.json","size":128}}"#,
            "\n\n",
            r#"{"remove":{"path":"part-old.json","deletionTimestamp":1700000000}}"#,
            "\n",
        );

        let records = parse_commit_body(1, body).unwrap();
        assert_eq!(records.len(), 3);
        assert!(records[0].add.is_none() && records[0].remove.is_none());
        assert_eq!(records[1].add.as_ref().unwrap().path, "part-0000.json");
        assert_eq!(records[2].remove.as_ref().unwrap().path, "part-old.json");
    }

    #[test]
    fn malformed_commit_body_is_invalid() {
        let err = parse_commit_body(3, "not json\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCommitLog);
    }
}
