use std::path::PathBuf;

use thiserror::Error;

/// Failures that abort the startup sequence. Every variant is fatal: the
/// coordinator stops whatever backend it already started and the process
/// exits with [`StartupError::exit_code`].
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid backend port in {env_name}: '{raw}' (expected 1-65535)")]
    InvalidPort { env_name: &'static str, raw: String },

    #[error("invalid backend address: {0}")]
    InvalidAddress(String),

    #[error("invalid backend command override: {0}")]
    InvalidCommand(String),

    #[error("packaged backend not found: {}", path.display())]
    BackendExecutableMissing { path: PathBuf },

    #[error(
        "cannot locate the project root (main.py + src/wechat_decrypt_tool); set WECHAT_TOOL_PROJECT_ROOT"
    )]
    ProjectRootNotFound,

    #[error("failed to prepare backend data directory {}: {reason}", path.display())]
    DataDirUnavailable { path: PathBuf, reason: String },

    #[error("failed to spawn backend {command}: {reason}")]
    SpawnFailed { command: String, reason: String },

    #[error("backend did not become ready in {elapsed_ms}ms: {url}")]
    ReadinessTimeout { url: String, elapsed_ms: u128 },

    #[error("failed to create main window: {0}")]
    WindowCreation(String),

    #[error("failed to load {url} within {elapsed_ms}ms: {last_error}")]
    LoadTimeout {
        url: String,
        elapsed_ms: u128,
        last_error: String,
    },

    #[error("startup task failed: {0}")]
    Runtime(String),
}

impl StartupError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidPort { .. }
            | Self::InvalidAddress(_)
            | Self::InvalidCommand(_)
            | Self::BackendExecutableMissing { .. }
            | Self::ProjectRootNotFound
            | Self::DataDirUnavailable { .. } => 2,
            _ => 1,
        }
    }
}
