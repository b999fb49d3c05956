//! Secret redaction applied to everything that reaches a rendered frame.
//!
//! Rules run in a fixed order, each exactly once over the whole string, and every match is
//! replaced by `[REDACTED_<RULE_NAME>]`. The rule list is built once and never mutated;
//! custom rules are merged at construction time.

use std::borrow::Cow;

use regex::Regex;

use crate::foundation::error::{ChronoError, ChronoResult};
use crate::history::snapshot::{CommitInfo, FileContent, FrameFile, Snapshot};

/// A named pattern for one class of secret.
#[derive(Debug, Clone)]
pub struct RedactionRule {
    name: String,
    pattern: Regex,
    placeholder: String,
}

impl RedactionRule {
    pub fn new(name: impl Into<String>, pattern: &str) -> ChronoResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ChronoError::invalid_option("redaction rule name must be non-empty"));
        }
        let pattern = Regex::new(pattern).map_err(|e| {
            ChronoError::invalid_option(format!("redaction rule '{name}' has a bad pattern: {e}"))
        })?;
        let placeholder = format!("[REDACTED_{}]", name.to_uppercase());
        Ok(Self {
            name,
            pattern,
            placeholder,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }
}

const DEFAULT_RULES: &[(&str, &str)] = &[
    ("aws_access_key", r"(?:AKIA|ASIA)[0-9A-Z]{16}"),
    ("github_token", r"gh[pousr]_[0-9A-Za-z]{36,255}"),
    (
        "private_key",
        r"-----(?:BEGIN|END) (?:RSA |EC |DSA |PGP |OPENSSH |ENCRYPTED )?PRIVATE KEY(?: BLOCK)?-----",
    ),
    // Catch-all for unrecognized token formats; false positives are accepted.
    ("generic_api_key", r"[A-Za-z0-9_]{32,64}"),
];

#[derive(Debug, Clone)]
pub struct ContentRedactor {
    rules: Vec<RedactionRule>,
}

impl Default for ContentRedactor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentRedactor {
    pub fn new() -> Self {
        let rules = DEFAULT_RULES
            .iter()
            .filter_map(|(name, pattern)| match RedactionRule::new(*name, pattern) {
                Ok(rule) => Some(rule),
                Err(e) => {
                    tracing::error!("built-in redaction rule rejected: {e}");
                    None
                }
            })
            .collect();
        Self { rules }
    }

    /// Defaults plus `custom`. A custom rule whose name matches an existing one replaces it in
    /// place; new names are appended in the order given.
    pub fn with_rules(custom: impl IntoIterator<Item = RedactionRule>) -> Self {
        let mut out = Self::new();
        for rule in custom {
            match out.rules.iter_mut().find(|r| r.name == rule.name) {
                Some(slot) => *slot = rule,
                None => out.rules.push(rule),
            }
        }
        out
    }

    pub fn rules(&self) -> &[RedactionRule] {
        &self.rules
    }

    pub fn redact(&self, text: &str) -> String {
        let mut out: Option<String> = None;
        for rule in &self.rules {
            let current = out.as_deref().unwrap_or(text);
            let next = match rule.pattern.replace_all(current, rule.placeholder.as_str()) {
                Cow::Owned(replaced) => Some(replaced),
                Cow::Borrowed(_) => None,
            };
            if next.is_some() {
                out = next;
            }
        }
        out.unwrap_or_else(|| text.to_owned())
    }

    /// Binary entries carry only the sentinel and pass through untouched.
    pub fn redact_content(&self, content: &FileContent) -> FileContent {
        match content {
            FileContent::Text(s) => FileContent::Text(self.redact(s)),
            FileContent::Binary => FileContent::Binary,
        }
    }

    /// Redact every displayed metadata field. Ids are hex and never displayed in full.
    pub fn redact_commit(&self, commit: &CommitInfo) -> CommitInfo {
        CommitInfo {
            id: commit.id.clone(),
            hash: commit.hash.clone(),
            author_name: self.redact(&commit.author_name),
            author_email: self.redact(&commit.author_email),
            time: commit.time,
            message: self.redact(&commit.message),
        }
    }

    /// Redact every path and every text file, keeping the snapshot's original path order.
    ///
    /// Paths that redact to the same text stay separate entries.
    pub fn redact_snapshot(&self, snapshot: &Snapshot) -> Vec<FrameFile> {
        snapshot
            .iter()
            .map(|(path, content)| FrameFile {
                path: self.redact(path),
                content: self.redact_content(content),
            })
            .collect()
    }
}
