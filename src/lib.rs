//! Capstan - a workflow orchestrator for AI coding agents and humans.
//!
//! This library provides the core functionality for the `cap` CLI tool:
//! ticket and epic lifecycle management, branch coordination against a git
//! working tree, review gating, and audit sessions.

pub mod action_log;
pub mod cli;
pub mod commands;
pub mod git;
pub mod github;
pub mod lock;
pub mod models;
pub mod session;
pub mod storage;
pub mod workflow;

/// Library-level error type for Capstan operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Not initialized: run `cap system init` first")]
    NotInitialized,

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Precondition violated: {0}")]
    Precondition(String),

    #[error("Git command failed ({command}): {stderr}")]
    Git { command: String, stderr: String },

    #[error(
        "Epic {epic} records branch '{branch}' which no longer exists; \
         restore the branch or re-run epic initialization"
    )]
    EpicBranchMissing { epic: String, branch: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for Capstan operations.
pub type Result<T> = std::result::Result<T, Error>;
