pub mod audit;
pub mod backup;
pub mod config;
pub mod entry;
pub mod error;
pub mod lock;
pub mod paths;
pub mod store;

pub use audit::{AuditAction, AuditLog, AuditRecord};
pub use backup::BackupManager;
pub use config::StoreConfig;
pub use entry::{Entry, Revision};
pub use error::ListError;
pub use lock::{ListGuard, LockRegistry};
pub use paths::PathValidator;
pub use store::{AddOutcome, DeleteOutcome, ListIndex, ListSnapshot, ListStore, UpdateOutcome};

/// Re-export commonly used types
pub type Result<T> = std::result::Result<T, ListError>;
