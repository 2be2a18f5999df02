use crate::error::ListError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// One line of a list, addressed by its position at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub index: usize,
    pub value: String,
}

/// SHA-256 of a list's exact bytes. Any write changes it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    pub fn of(bytes: &[u8]) -> Self {
        Revision(format!("{:x}", Sha256::digest(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Revision {
    fn from(value: String) -> Self {
        Revision(value)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trims a candidate value and rejects it if nothing is left or if it would span
/// more than one line.
pub fn normalize(list: &str, raw: &str) -> crate::Result<String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ListError::EmptyEntry(list.to_string()));
    }
    if value.contains(['\n', '\r']) {
        return Err(ListError::InvalidEntry {
            list: list.to_string(),
            reason: "entries cannot contain line breaks".to_string(),
        });
    }
    Ok(value.to_string())
}

/// Non-blank lines of a list file with their line terminators removed.
pub fn parse_lines(content: &str) -> Vec<String> {
    content
        .split('\n')
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.trim_end_matches(['\r', '\n']).to_string())
        .collect()
}

/// On-disk form: one value per line, trailing newline iff non-empty.
pub fn render_lines(lines: &[String]) -> String {
    let mut out = lines.join("\n");
    if !lines.is_empty() {
        out.push('\n');
    }
    out
}
