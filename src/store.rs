use crate::audit::{AuditAction, AuditLog};
use crate::backup::{BackupManager, BACKUP_MARKER};
use crate::config::StoreConfig;
use crate::entry::{self, Entry, Revision};
use crate::error::ListError;
use crate::lock::LockRegistry;
use crate::paths::PathValidator;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct ListIndex {
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListSnapshot {
    pub filename: String,
    pub entries: Vec<Entry>,
    pub count: usize,
    pub revision: Revision,
}

impl ListSnapshot {
    pub fn values(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.value.as_str()).collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AddOutcome {
    pub index: usize,
    pub value: String,
    pub revision: Revision,
    pub audited: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateOutcome {
    pub index: usize,
    pub old_value: String,
    pub new_value: String,
    pub revision: Revision,
    pub audited: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutcome {
    pub index: usize,
    pub deleted_value: String,
    pub revision: Revision,
    pub audited: bool,
}

/// What a mutation wants written to the ledger.
struct LedgerNote {
    action: AuditAction,
    old_value: Option<String>,
    new_value: Option<String>,
}

struct Committed<T> {
    value: T,
    revision: Revision,
    audited: bool,
}

/// Line-oriented lists under one storage root.
///
/// Every operation on a list runs under that list's lock from the registry. A
/// mutation backs the file up, rewrites it in full and then appends one ledger line,
/// all before the lock is released.
pub struct ListStore {
    config: StoreConfig,
    validator: PathValidator,
    locks: Arc<LockRegistry>,
    backups: BackupManager,
    audit: AuditLog,
}

impl ListStore {
    /// A store sharing the process-wide lock registry.
    pub fn new(config: StoreConfig) -> crate::Result<Self> {
        Self::with_registry(config, LockRegistry::global())
    }

    pub fn with_root(root: impl Into<PathBuf>) -> crate::Result<Self> {
        Self::new(StoreConfig::with_root(root))
    }

    // Stores built here only exclude each other if they are given the same registry.
    pub fn with_registry(config: StoreConfig, locks: Arc<LockRegistry>) -> crate::Result<Self> {
        // The root must exist before paths are resolved, or lock keys would change
        // once it is created.
        fs::create_dir_all(&config.root)
            .map_err(|e| ListError::io(format!("create {}", config.root.display()), e))?;
        let validator = PathValidator::new(&config.root, &config.suffix)?;
        let audit = AuditLog::new(config.ledger_path());
        Ok(Self {
            config,
            validator,
            locks,
            backups: BackupManager::new(),
            audit,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    pub fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    pub fn resolve(&self, name: &str) -> crate::Result<PathBuf> {
        self.validator.validate(name)
    }

    /// List files in the root, sorted. Backups and the ledger are left out.
    /// Unlocked: a list created concurrently may or may not show up.
    pub fn list_lists(&self) -> crate::Result<Vec<String>> {
        let suffix = glob::Pattern::escape(&self.config.suffix);
        let pattern = glob::Pattern::new(&format!("*{}", suffix))
            .map_err(|e| ListError::invalid_name(&self.config.suffix, &e.to_string()))?;

        let read_dir = match fs::read_dir(&self.config.root) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(ListError::io(
                    format!("list {}", self.config.root.display()),
                    e,
                ))
            }
        };

        let mut names: Vec<String> = read_dir
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| !t.is_dir()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| {
                pattern.matches(name)
                    && !name.contains(BACKUP_MARKER)
                    && *name != self.config.ledger_name
            })
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn index(&self) -> crate::Result<ListIndex> {
        Ok(ListIndex {
            files: self.list_lists()?,
        })
    }

    pub fn read(&self, name: &str) -> crate::Result<ListSnapshot> {
        let path = self.validator.validate(name)?;
        let _guard = self.locks.acquire(&path);

        let bytes = load(&path)?.ok_or_else(|| ListError::NotFound(name.to_string()))?;
        let revision = Revision::of(&bytes);
        let entries: Vec<Entry> = entry::parse_lines(&decode(&path, bytes)?)
            .into_iter()
            .enumerate()
            .map(|(index, value)| Entry { index, value })
            .collect();
        debug!("Read {} entries from {}", entries.len(), name);

        Ok(ListSnapshot {
            filename: name.to_string(),
            count: entries.len(),
            entries,
            revision,
        })
    }

    /// Appends `raw` (trimmed) and returns its index. Creates the list if needed.
    pub fn add(&self, name: &str, raw: &str) -> crate::Result<AddOutcome> {
        let path = self.validator.validate(name)?;
        let value = entry::normalize(name, raw)?;

        let committed = self.mutate(name, &path, None, |lines, _existed| {
            if lines.iter().any(|line| line.trim() == value) {
                return Err(ListError::DuplicateEntry {
                    list: name.to_string(),
                    value: value.clone(),
                });
            }
            lines.push(value.clone());
            let note = LedgerNote {
                action: AuditAction::Add,
                old_value: None,
                new_value: Some(value.clone()),
            };
            Ok((lines.len() - 1, note))
        })?;

        info!("Added '{}' to {} at index {}", value, name, committed.value);
        Ok(AddOutcome {
            index: committed.value,
            value,
            revision: committed.revision,
            audited: committed.audited,
        })
    }

    pub fn update(&self, name: &str, index: i64, raw: &str) -> crate::Result<UpdateOutcome> {
        self.update_inner(name, index, raw, None)
    }

    /// Like [`ListStore::update`], but refuses with `Conflict` unless the list still
    /// has the bytes `expected` was computed from.
    pub fn update_checked(
        &self,
        name: &str,
        index: i64,
        raw: &str,
        expected: &Revision,
    ) -> crate::Result<UpdateOutcome> {
        self.update_inner(name, index, raw, Some(expected))
    }

    fn update_inner(
        &self,
        name: &str,
        index: i64,
        raw: &str,
        expected: Option<&Revision>,
    ) -> crate::Result<UpdateOutcome> {
        let path = self.validator.validate(name)?;
        let value = entry::normalize(name, raw)?;

        let committed = self.mutate(name, &path, expected, |lines, existed| {
            if !existed {
                return Err(ListError::NotFound(name.to_string()));
            }
            let position = position(name, index, lines.len())?;
            let taken_elsewhere = lines
                .iter()
                .enumerate()
                .any(|(i, line)| i != position && line.trim() == value);
            if taken_elsewhere {
                return Err(ListError::DuplicateEntry {
                    list: name.to_string(),
                    value: value.clone(),
                });
            }
            let old_value = std::mem::replace(&mut lines[position], value.clone());
            let note = LedgerNote {
                action: AuditAction::Update,
                old_value: Some(old_value.clone()),
                new_value: Some(value.clone()),
            };
            Ok(((position, old_value), note))
        })?;

        let (position, old_value) = committed.value;
        info!("Updated {}[{}]: '{}' -> '{}'", name, position, old_value, value);
        Ok(UpdateOutcome {
            index: position,
            old_value,
            new_value: value,
            revision: committed.revision,
            audited: committed.audited,
        })
    }

    pub fn delete(&self, name: &str, index: i64) -> crate::Result<DeleteOutcome> {
        self.delete_inner(name, index, None)
    }

    pub fn delete_checked(
        &self,
        name: &str,
        index: i64,
        expected: &Revision,
    ) -> crate::Result<DeleteOutcome> {
        self.delete_inner(name, index, Some(expected))
    }

    fn delete_inner(
        &self,
        name: &str,
        index: i64,
        expected: Option<&Revision>,
    ) -> crate::Result<DeleteOutcome> {
        let path = self.validator.validate(name)?;

        let committed = self.mutate(name, &path, expected, |lines, existed| {
            if !existed {
                return Err(ListError::NotFound(name.to_string()));
            }
            let position = position(name, index, lines.len())?;
            let deleted = lines.remove(position);
            let note = LedgerNote {
                action: AuditAction::Delete,
                old_value: Some(deleted.clone()),
                new_value: None,
            };
            Ok(((position, deleted), note))
        })?;

        let (position, deleted_value) = committed.value;
        info!("Deleted '{}' from {} (was index {})", deleted_value, name, position);
        Ok(DeleteOutcome {
            index: position,
            deleted_value,
            revision: committed.revision,
            audited: committed.audited,
        })
    }

    /// Exact file bytes for feed consumers; empty when the list does not exist.
    pub fn export_raw(&self, name: &str) -> crate::Result<Vec<u8>> {
        let path = self.validator.validate(name)?;
        let _guard = self.locks.acquire(&path);
        Ok(load(&path)?.unwrap_or_default())
    }

    /// Lock, back up, read, apply, rewrite, record. `apply` sees the current lines and
    /// whether the file existed; an error from it leaves the file untouched.
    fn mutate<T>(
        &self,
        name: &str,
        path: &Path,
        expected: Option<&Revision>,
        apply: impl FnOnce(&mut Vec<String>, bool) -> crate::Result<(T, LedgerNote)>,
    ) -> crate::Result<Committed<T>> {
        let guard = self.locks.acquire(path);
        self.backups.snapshot(&guard)?;

        let current = load(path)?;
        let existed = current.is_some();
        let bytes = current.unwrap_or_default();
        if let Some(expected) = expected {
            let actual = Revision::of(&bytes);
            if actual != *expected {
                return Err(ListError::Conflict {
                    list: name.to_string(),
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
        }

        let mut lines = entry::parse_lines(&decode(path, bytes)?);
        let (value, note) = apply(&mut lines, existed)?;

        let content = entry::render_lines(&lines);
        self.persist(path, content.as_bytes())?;

        let audited = match self.audit.record(
            name,
            note.action,
            note.old_value.as_deref(),
            note.new_value.as_deref(),
        ) {
            Ok(_) => true,
            Err(e) => {
                warn!("{} on {} committed but not recorded in ledger: {}", note.action, name, e);
                false
            }
        };
        drop(guard);

        Ok(Committed {
            value,
            revision: Revision::of(content.as_bytes()),
            audited,
        })
    }

    fn persist(&self, path: &Path, content: &[u8]) -> crate::Result<()> {
        fs::create_dir_all(&self.config.root)
            .map_err(|e| ListError::io(format!("create {}", self.config.root.display()), e))?;
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| ListError::io(format!("open {} for writing", path.display()), e))?;
        file.write_all(content)
            .and_then(|_| file.sync_data())
            .map_err(|e| ListError::io(format!("write {}", path.display()), e))
    }
}

fn load(path: &Path) -> crate::Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ListError::io(format!("read {}", path.display()), e)),
    }
}

fn decode(path: &Path, bytes: Vec<u8>) -> crate::Result<String> {
    String::from_utf8(bytes).map_err(|e| {
        ListError::io(
            format!("decode {}", path.display()),
            std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        )
    })
}

fn position(list: &str, index: i64, len: usize) -> crate::Result<usize> {
    match usize::try_from(index) {
        Ok(i) if i < len => Ok(i),
        _ => Err(ListError::IndexOutOfRange {
            list: list.to_string(),
            index,
            len,
        }),
    }
}
