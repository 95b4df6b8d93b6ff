//! Incremental code generation from an authored application specification.
//!
//! [`contexts::CodeGenerator`] drives a run: it diffs the specification
//! against the previous one ([`change_detector`]), plans staged tasks
//! ([`task_manager`]), renders or requests code for each task and collects
//! the files in a virtual file system ([`code_manager`]).

pub mod change_detector;
pub mod code_manager;
pub mod config;
pub mod contexts;
pub mod data;
pub mod error;
pub mod fingerprint;
pub mod registries;
pub mod task_manager;
pub mod workspace_store;
