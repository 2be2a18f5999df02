use thiserror::Error;

#[derive(Error, Debug)]
pub enum ListError {
    #[error("Invalid list name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Empty entries are not allowed in {0}")]
    EmptyEntry(String),

    #[error("Invalid entry for {list}: {reason}")]
    InvalidEntry { list: String, reason: String },

    #[error("List not found: {0}")]
    NotFound(String),

    #[error("Invalid line index {index} for {list} ({len} entries)")]
    IndexOutOfRange { list: String, index: i64, len: usize },

    #[error("Entry already exists in {list}: {value}")]
    DuplicateEntry { list: String, value: String },

    #[error("List {list} changed since it was read (expected revision {expected}, found {actual})")]
    Conflict {
        list: String,
        expected: String,
        actual: String,
    },

    #[error("File system error ({context}): {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ListError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ListError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn invalid_name(name: &str, reason: &str) -> Self {
        ListError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// HTTP status an outer routing layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            ListError::InvalidName { .. }
            | ListError::EmptyEntry(_)
            | ListError::InvalidEntry { .. }
            | ListError::IndexOutOfRange { .. }
            | ListError::DuplicateEntry { .. } => 400,
            ListError::NotFound(_) => 404,
            ListError::Conflict { .. } => 409,
            ListError::Io { .. } | ListError::Serialization(_) => 500,
        }
    }
}
