use once_cell::sync::Lazy;
use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

static GLOBAL_REGISTRY: Lazy<Arc<LockRegistry>> = Lazy::new(|| Arc::new(LockRegistry::new()));

/// In-process mutual exclusion per list file.
///
/// Handles are keyed by canonical path and kept until [`LockRegistry::prune`] drops the
/// ones nobody holds. This does not coordinate with other processes.
#[derive(Default)]
pub struct LockRegistry {
    handles: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

/// Proof that the caller holds the lock for `path`. Released on drop.
pub struct ListGuard {
    path: PathBuf,
    _guard: ArcMutexGuard<RawMutex, ()>,
}

impl ListGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by every store in this process.
    pub fn global() -> Arc<LockRegistry> {
        GLOBAL_REGISTRY.clone()
    }

    /// Blocks until the lock for `path` is free. The guard keeps the path it was
    /// acquired with, not the canonical key.
    pub fn acquire(&self, path: &Path) -> ListGuard {
        let handle = self.handle(path);
        let guard = handle.lock_arc();
        ListGuard {
            path: path.to_path_buf(),
            _guard: guard,
        }
    }

    fn handle(&self, path: &Path) -> Arc<Mutex<()>> {
        let key = canonical_key(path);
        let mut handles = self.handles.lock();
        handles
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops handles that no guard or waiter references. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let mut handles = self.handles.lock();
        let before = handles.len();
        handles.retain(|_, handle| Arc::strong_count(handle) > 1);
        let removed = before - handles.len();
        if removed > 0 {
            debug!("Pruned {} idle list lock(s)", removed);
        }
        removed
    }
}

fn canonical_key(path: &Path) -> PathBuf {
    crate::paths::resolve(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_same_path_shares_handle() {
        let tmp_dir = TempDir::new().unwrap();
        let registry = LockRegistry::new();
        let a = tmp_dir.path().join("a.txt");
        let dotted = tmp_dir.path().join(".").join("a.txt");

        drop(registry.acquire(&a));
        drop(registry.acquire(&dotted));
        drop(registry.acquire(&tmp_dir.path().join("b.txt")));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_excludes_concurrent_holders() {
        let tmp_dir = TempDir::new().unwrap();
        let registry = Arc::new(LockRegistry::new());
        let path = tmp_dir.path().join("shared.txt");
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let path = path.clone();
                let inside = inside.clone();
                let max_inside = max_inside.clone();
                thread::spawn(move || {
                    for _ in 0..20 {
                        let _guard = registry.acquire(&path);
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_micros(50));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_different_paths_do_not_block() {
        let tmp_dir = TempDir::new().unwrap();
        let registry = LockRegistry::new();
        let _a = registry.acquire(&tmp_dir.path().join("a.txt"));
        let b = registry.acquire(&tmp_dir.path().join("b.txt"));
        assert!(b.path().ends_with("b.txt"));
    }

    #[test]
    fn test_prune_keeps_held_handles() {
        let tmp_dir = TempDir::new().unwrap();
        let registry = LockRegistry::new();
        let held = registry.acquire(&tmp_dir.path().join("held.txt"));
        drop(registry.acquire(&tmp_dir.path().join("idle.txt")));

        assert_eq!(registry.prune(), 1);
        assert_eq!(registry.len(), 1);
        drop(held);
        assert_eq!(registry.prune(), 1);
        assert!(registry.is_empty());
    }
}
