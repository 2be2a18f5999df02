use crate::error::ListError;
use chrono::{Local, NaiveDateTime};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditAction {
    Add,
    Update,
    Delete,
}

impl AuditAction {
    pub fn tag(&self) -> &'static str {
        match self {
            AuditAction::Add => "ADD",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "ADD" => Some(AuditAction::Add),
            "UPDATE" => Some(AuditAction::Update),
            "DELETE" => Some(AuditAction::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One ledger line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: NaiveDateTime,
    pub list: String,
    pub action: AuditAction,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl AuditRecord {
    pub fn new(list: &str, action: AuditAction, old_value: Option<&str>, new_value: Option<&str>) -> Self {
        let keep = |v: Option<&str>| v.filter(|s| !s.is_empty()).map(str::to_string);
        Self {
            timestamp: Local::now().naive_local(),
            list: list.to_string(),
            action,
            old_value: keep(old_value),
            new_value: keep(new_value),
        }
    }

    /// `[ts] [list] [ACTION] [payload]` plus newline. The payload bracket is absent
    /// when there is no value at all.
    pub fn to_line(&self) -> String {
        let head = format!(
            "[{}] [{}] [{}]",
            self.timestamp.format(TIME_FORMAT),
            self.list,
            self.action
        );
        match (&self.old_value, &self.new_value) {
            (Some(old), Some(new)) => format!("{} [{} -> {}]\n", head, old, new),
            (Some(value), None) | (None, Some(value)) => format!("{} [{}]\n", head, value),
            (None, None) => format!("{}\n", head),
        }
    }

    /// Best-effort inverse of [`AuditRecord::to_line`]. An update payload is split at
    /// the first ` -> `.
    pub fn parse(line: &str) -> Option<Self> {
        let body = line.trim_end_matches(['\r', '\n']).strip_prefix('[')?.strip_suffix(']')?;
        let mut parts = body.splitn(4, "] [");
        let timestamp = NaiveDateTime::parse_from_str(parts.next()?, TIME_FORMAT).ok()?;
        let list = parts.next()?.to_string();
        let action = AuditAction::from_tag(parts.next()?)?;
        let payload = parts.next();

        let (old_value, new_value) = match (action, payload) {
            (_, None) => (None, None),
            (AuditAction::Update, Some(p)) => match p.split_once(" -> ") {
                Some((old, new)) => (Some(old.to_string()), Some(new.to_string())),
                None => (Some(p.to_string()), None),
            },
            (AuditAction::Add, Some(p)) => (None, Some(p.to_string())),
            (AuditAction::Delete, Some(p)) => (Some(p.to_string()), None),
        };

        Some(Self {
            timestamp,
            list,
            action,
            old_value,
            new_value,
        })
    }
}

/// Append-only ledger shared by every process using the storage root.
///
/// Each append holds an exclusive advisory lock on the ledger for the duration of
/// the write. Reads take no lock.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(
        &self,
        list: &str,
        action: AuditAction,
        old_value: Option<&str>,
        new_value: Option<&str>,
    ) -> crate::Result<AuditRecord> {
        let record = AuditRecord::new(list, action, old_value, new_value);
        self.append(&record)?;
        Ok(record)
    }

    pub fn append(&self, record: &AuditRecord) -> crate::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ListError::io(format!("create {}", parent.display()), e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| ListError::io(format!("open ledger {}", self.path.display()), e))?;

        FileExt::lock_exclusive(&file)
            .map_err(|e| ListError::io(format!("lock ledger {}", self.path.display()), e))?;
        let written = file.write_all(record.to_line().as_bytes());
        if let Err(e) = FileExt::unlock(&file) {
            warn!("Failed to release ledger lock on {}: {}", self.path.display(), e);
        }
        written.map_err(|e| ListError::io(format!("append ledger {}", self.path.display()), e))
    }

    /// Every parseable record, oldest first.
    pub fn records(&self) -> crate::Result<Vec<AuditRecord>> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ListError::io(format!("read ledger {}", self.path.display()), e)),
        };

        Ok(data
            .lines()
            .filter(|line| !line.is_empty())
            .filter_map(|line| {
                let parsed = AuditRecord::parse(line);
                if parsed.is_none() {
                    debug!("Skipping unreadable ledger line: {}", line);
                }
                parsed
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn at(list: &str, action: AuditAction, old: Option<&str>, new: Option<&str>) -> AuditRecord {
        let mut record = AuditRecord::new(list, action, old, new);
        record.timestamp =
            NaiveDateTime::parse_from_str("2024-05-06 07:08:09", TIME_FORMAT).unwrap();
        record
    }

    #[test]
    fn test_line_format() {
        assert_eq!(
            at("a.txt", AuditAction::Add, None, Some("1.2.3.4")).to_line(),
            "[2024-05-06 07:08:09] [a.txt] [ADD] [1.2.3.4]\n"
        );
        assert_eq!(
            at("a.txt", AuditAction::Update, Some("1.2.3.4"), Some("5.6.7.8")).to_line(),
            "[2024-05-06 07:08:09] [a.txt] [UPDATE] [1.2.3.4 -> 5.6.7.8]\n"
        );
        assert_eq!(
            at("a.txt", AuditAction::Delete, Some("5.6.7.8"), None).to_line(),
            "[2024-05-06 07:08:09] [a.txt] [DELETE] [5.6.7.8]\n"
        );
        assert_eq!(
            at("a.txt", AuditAction::Delete, Some(""), None).to_line(),
            "[2024-05-06 07:08:09] [a.txt] [DELETE]\n"
        );
    }

    #[test]
    fn test_parse_reads_back_lines() {
        let update = at("feeds.txt", AuditAction::Update, Some("a.test"), Some("b.test"));
        assert_eq!(AuditRecord::parse(&update.to_line()).unwrap(), update);

        let bare = at("feeds.txt", AuditAction::Add, None, None);
        assert_eq!(AuditRecord::parse(&bare.to_line()).unwrap(), bare);

        assert!(AuditRecord::parse("garbage").is_none());
        assert!(AuditRecord::parse("[2024-05-06 07:08:09] [a.txt] [RENAME] [x]").is_none());
    }

    #[test]
    fn test_record_appends_in_order() {
        let tmp_dir = TempDir::new().unwrap();
        let log = AuditLog::new(tmp_dir.path().join("nested").join("change.log"));
        log.record("a.txt", AuditAction::Add, None, Some("one")).unwrap();
        log.record("a.txt", AuditAction::Delete, Some("one"), None).unwrap();

        let records = log.records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].action, AuditAction::Add);
        assert_eq!(records[1].old_value.as_deref(), Some("one"));
    }

    #[test]
    fn test_concurrent_appends_stay_whole() {
        let tmp_dir = TempDir::new().unwrap();
        let log = Arc::new(AuditLog::new(tmp_dir.path().join("change.log")));

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let log = log.clone();
                thread::spawn(move || {
                    for i in 0..25 {
                        let value = format!("host-{}-{}.example", w, i);
                        log.record("a.txt", AuditAction::Add, None, Some(&value)).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let raw = fs::read_to_string(log.path()).unwrap();
        assert_eq!(raw.lines().count(), 100);
        assert_eq!(log.records().unwrap().len(), 100);
    }

    #[test]
    fn test_missing_ledger_reads_empty() {
        let tmp_dir = TempDir::new().unwrap();
        let log = AuditLog::new(tmp_dir.path().join("change.log"));
        assert!(log.records().unwrap().is_empty());
    }
}
