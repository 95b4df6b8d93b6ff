use thiserror::Error;

use crate::task_manager::TaskStatus;

/// Errors raised by the virtual file system in [`crate::code_manager::CodeManager`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeManagerError {
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("file already exists: {0}")]
    DuplicatePath(String),
    #[error("content not found in file: {0}")]
    ContentNotFound(String),
    #[error("path {path} conflicts with existing file {existing}")]
    PathConflict { path: String, existing: String },
}

/// Errors that fail a single generation task.
///
/// None of these abort a whole run; the orchestrator records the message on
/// the task that raised it and moves on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    CodeManager(#[from] CodeManagerError),
    #[error("generation service error: {0}")]
    Service(String),
    #[error("prompt error: {0}")]
    Prompt(String),
    #[error("unsupported entity '{id}' of type '{kind}'")]
    UnsupportedEntity { id: String, kind: String },
    #[error("generation cancelled")]
    Cancelled,
}

/// Rejected task bookkeeping in [`crate::task_manager::TaskManager`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("unknown task: {0}")]
    UnknownTask(String),
    #[error("task {task} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        task: String,
        from: TaskStatus,
        to: TaskStatus,
    },
}

/// Errors from the file-backed stores (workspace sessions, configuration).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {message}")]
    Decode { path: String, message: String },
    #[error("failed to encode {0}")]
    Encode(String),
}
