//! Load session report
//!
//! Data-quality problems do not stop a load. They are collected here and
//! handed back with the merged data once the session finishes.

use std::collections::BTreeMap;
use std::fmt;

use esmweave_core::Tag;
use serde::Serialize;

use crate::loader::FileRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// A deletion named an identity no earlier file defined
    DeleteOfUnknown,
    /// A response whose chain neighbours never appeared
    UnresolvedInfoNeighbor,
    /// A top-level record kind with no model, skipped
    UnsupportedRecord,
    /// A response with no preceding topic in its file
    InfoWithoutTopic,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            WarningKind::DeleteOfUnknown => "delete of unknown record",
            WarningKind::UnresolvedInfoNeighbor => "unresolved response neighbour",
            WarningKind::UnsupportedRecord => "unsupported record",
            WarningKind::InfoWithoutTopic => "response without topic",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadWarning {
    pub kind: WarningKind,
    /// File the problem was found in; `None` for session-wide checks
    pub file: Option<String>,
    pub offset: Option<u64>,
    pub record: Option<Tag>,
    pub message: String,
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.offset) {
            (Some(file), Some(offset)) => write!(f, "{file}@{offset}: ")?,
            (Some(file), None) => write!(f, "{file}: ")?,
            _ => {}
        }
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// One content file of the session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileSummary {
    pub name: String,
    pub role: FileRole,
    /// Position in the global load order
    pub index: u32,
    pub masters: Vec<String>,
    /// Record count declared in the file header
    pub declared_records: u32,
    /// Top-level records actually read
    pub records_read: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub files: Vec<FileSummary>,
    pub warnings: Vec<LoadWarning>,
    /// Skipped top-level records per tag
    pub skipped: BTreeMap<String, u64>,
    /// Fallback records added because no file supplied them
    pub defaults_added: Vec<String>,
}

impl LoadReport {
    pub fn warn(&mut self, warning: LoadWarning) {
        self.warnings.push(warning);
    }

    pub fn count(&self, kind: WarningKind) -> usize {
        self.warnings.iter().filter(|w| w.kind == kind).count()
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub(crate) fn note_skipped(&mut self, tag: Tag) {
        *self.skipped.entry(tag.to_string()).or_default() += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_display() {
        let warning = LoadWarning {
            kind: WarningKind::DeleteOfUnknown,
            file: Some("patch.esp".into()),
            offset: Some(1024),
            record: Some(Tag::new(b"CREA")),
            message: "rat_02".into(),
        };
        assert_eq!(warning.to_string(), "patch.esp@1024: delete of unknown record: rat_02");
    }

    #[test]
    fn test_counts() {
        let mut report = LoadReport::default();
        assert!(report.is_clean());
        report.note_skipped(Tag::new(b"BOOK"));
        report.note_skipped(Tag::new(b"BOOK"));
        report.warn(LoadWarning {
            kind: WarningKind::UnsupportedRecord,
            file: None,
            offset: None,
            record: None,
            message: "BOOK".into(),
        });
        assert_eq!(report.skipped["BOOK"], 2);
        assert_eq!(report.count(WarningKind::UnsupportedRecord), 1);
        assert_eq!(report.count(WarningKind::DeleteOfUnknown), 0);
    }
}
