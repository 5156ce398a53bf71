//! Per-file version history and the diff-line classifier.
//!
//! The backend authors the "diff" text; nothing here computes one.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{BasedFile, FileVersion};

impl BasedFile {
    /// New file whose only version is the seed content.
    pub fn seeded(id: impl Into<String>, name: impl Into<String>, content: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            latest_content: content.to_string(),
            versions: vec![new_version(content, now)],
        }
    }

    /// Appends a version holding `content` and makes it the latest.
    pub fn record(&mut self, content: &str, now: DateTime<Utc>) -> &FileVersion {
        self.versions.push(new_version(content, now));
        self.latest_content = content.to_string();
        // Just pushed.
        &self.versions[self.versions.len() - 1]
    }

    pub fn version(&self, version_id: &str) -> Option<&FileVersion> {
        self.versions.iter().find(|v| v.version_id == version_id)
    }
}

fn new_version(content: &str, now: DateTime<Utc>) -> FileVersion {
    FileVersion { version_id: Uuid::new_v4().to_string(), timestamp: now, diff: content.to_string() }
}

/// Versions newest first. Equal timestamps keep append order.
pub fn versions_of(file: &BasedFile) -> Vec<&FileVersion> {
    let mut versions: Vec<&FileVersion> = file.versions.iter().collect();
    versions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    versions
}

/// The stored diff of `version_id`, verbatim.
pub fn diff_against_latest<'a>(file: &'a BasedFile, version_id: &str) -> Option<&'a str> {
    file.version(version_id).map(|v| v.diff.as_str())
}

/// `Latest` for the newest entry of a newest-first list, `v{n}` otherwise.
pub fn version_label(index: usize, total: usize) -> String {
    if index == 0 {
        "Latest".to_string()
    } else {
        format!("v{}", total.saturating_sub(index))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffLineKind {
    Addition,
    Deletion,
    Normal,
}

impl DiffLineKind {
    pub fn marker(&self) -> char {
        match self {
            DiffLineKind::Addition => '+',
            DiffLineKind::Deletion => '-',
            DiffLineKind::Normal => ' ',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub kind: DiffLineKind,
    pub text: String,
}

impl DiffLine {
    fn new(kind: DiffLineKind, text: &str) -> Self {
        Self { kind, text: text.to_string() }
    }
}

/// Classifies diff-formatted text line by line for display. Without a diff
/// the original is shown as a single normal block.
pub fn render_diff(original: &str, diff: Option<&str>) -> Vec<DiffLine> {
    let Some(diff) = diff.filter(|d| !d.is_empty()) else {
        return vec![DiffLine::new(DiffLineKind::Normal, original)];
    };

    diff.split('\n')
        .filter_map(|line| {
            if line.starts_with("+++") || line.starts_with("---") || line.starts_with("@@") {
                None
            } else if let Some(rest) = line.strip_prefix('+') {
                Some(DiffLine::new(DiffLineKind::Addition, rest))
            } else if let Some(rest) = line.strip_prefix('-') {
                Some(DiffLine::new(DiffLineKind::Deletion, rest))
            } else if line.starts_with('\\') {
                None
            } else {
                Some(DiffLine::new(DiffLineKind::Normal, line.strip_prefix(' ').unwrap_or(line)))
            }
        })
        .collect()
}
