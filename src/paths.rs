use crate::error::ListError;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Turns untrusted list names into absolute paths confined to the storage root.
#[derive(Debug, Clone)]
pub struct PathValidator {
    root: PathBuf,
    suffix: String,
    allowed: Regex,
}

impl PathValidator {
    pub fn new(root: impl Into<PathBuf>, suffix: &str) -> crate::Result<Self> {
        let pattern = format!(r"^[a-zA-Z0-9_\-\.]+{}$", regex::escape(suffix));
        let allowed = Regex::new(&pattern)
            .map_err(|e| ListError::invalid_name(suffix, &format!("unusable list suffix: {}", e)))?;
        Ok(Self {
            root: root.into(),
            suffix: suffix.to_string(),
            allowed,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Character-level checks only; no file system access.
    pub fn check_name(&self, name: &str) -> crate::Result<()> {
        if !name.ends_with(&self.suffix) {
            return Err(ListError::invalid_name(
                name,
                &format!("only {} files are allowed", self.suffix),
            ));
        }
        if name.contains("..") || name.contains('/') || name.contains('\\') {
            return Err(ListError::invalid_name(name, "path segments are not allowed"));
        }
        if !self.allowed.is_match(name) {
            return Err(ListError::invalid_name(name, "invalid filename characters"));
        }
        Ok(())
    }

    /// Validates `name` and returns its path under the resolved storage root.
    ///
    /// The joined path is resolved (following symlinks where they exist) and must
    /// still sit inside the root, so a symlinked list pointing elsewhere is refused
    /// even though its name is well formed.
    pub fn validate(&self, name: &str) -> crate::Result<PathBuf> {
        self.check_name(name)?;

        let root = resolve(&self.root)
            .map_err(|e| ListError::io(format!("resolve {}", self.root.display()), e))?;
        let candidate = root.join(name);
        let resolved = resolve(&candidate)
            .map_err(|e| ListError::io(format!("resolve {}", candidate.display()), e))?;
        if !resolved.starts_with(&root) {
            return Err(ListError::invalid_name(name, "invalid file path"));
        }
        Ok(candidate)
    }
}

pub(crate) fn resolve(path: &Path) -> std::io::Result<PathBuf> {
    if let Ok(canonical) = path.canonicalize() {
        return Ok(canonical);
    }
    // The leaf may not exist yet; resolve what does.
    if let (Some(parent), Some(leaf)) = (path.parent(), path.file_name()) {
        if let Ok(parent) = parent.canonicalize() {
            return Ok(parent.join(leaf));
        }
    }
    std::path::absolute(path)
}
