use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};

/// Stand-in shown for tracked files whose bytes are not valid UTF-8.
pub const BINARY_SENTINEL: &str = "[Binary File]";

/// Width of the abbreviated commit hash used for display.
pub const SHORT_HASH_LEN: usize = 7;

/// Commit metadata, in the order produced by [`crate::HistoryReader::list_history`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    /// Full hex object id; the handle passed back to `snapshot_at`.
    pub id: String,
    /// Abbreviated id for display.
    pub hash: String,
    pub author_name: String,
    pub author_email: String,
    pub time: DateTime<FixedOffset>,
    pub message: String,
}

impl CommitInfo {
    /// First line of the message, which is all a frame has room for.
    pub fn subject(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

/// Content of one tracked file at a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    Text(String),
    Binary,
}

impl FileContent {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(s) => Self::Text(s.to_owned()),
            Err(_) => Self::Binary,
        }
    }

    /// Text as it should appear on a frame.
    pub fn display(&self) -> &str {
        match self {
            Self::Text(s) => s,
            Self::Binary => BINARY_SENTINEL,
        }
    }
}

/// Repository-relative path -> content. `BTreeMap` keeps display order lexicographic.
pub type Snapshot = BTreeMap<String, FileContent>;

/// One file as it is drawn on a frame.
///
/// A list of these keeps the snapshot's path order even when the displayed paths have been
/// rewritten, so two entries may share a `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameFile {
    pub path: String,
    pub content: FileContent,
}
