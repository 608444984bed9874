use std::{
    env,
    path::{Path, PathBuf},
    sync::OnceLock,
};
use tauri::{AppHandle, Manager};

static USER_DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

#[cfg(target_os = "windows")]
pub const BACKEND_EXECUTABLE_NAME: &str = "wechat-backend.exe";
#[cfg(not(target_os = "windows"))]
pub const BACKEND_EXECUTABLE_NAME: &str = "wechat-backend";

pub const BACKEND_RESOURCE_DIR: &str = "backend";
pub const UI_RESOURCE_DIR: &str = "ui";

/// Remembers the per-user data directory once the Tauri path resolver is
/// available, so log helpers without an `AppHandle` can find it.
pub fn remember_user_data_dir(path: PathBuf) {
    let _ = USER_DATA_DIR.set(path);
}

pub fn user_data_dir() -> Option<PathBuf> {
    USER_DATA_DIR.get().cloned()
}

pub fn resolve_user_data_dir(app: &AppHandle, explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    app.path().app_data_dir().ok()
}

/// Directory the bundler copies `backend/` and `ui/` into.
pub fn resource_dir(app: &AppHandle) -> Option<PathBuf> {
    app.path().resource_dir().ok()
}

pub fn workspace_root_dir() -> PathBuf {
    let candidate = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("..");
    candidate
        .canonicalize()
        .unwrap_or_else(|_| candidate.to_path_buf())
}

pub fn detect_project_root(explicit_root: Option<&Path>) -> Option<PathBuf> {
    detect_project_root_with(workspace_root_dir(), explicit_root.map(Path::to_path_buf))
}

fn detect_project_root_with(
    workspace_root: PathBuf,
    explicit_root: Option<PathBuf>,
) -> Option<PathBuf> {
    if let Some(candidate) = explicit_root {
        if is_project_root(&candidate) {
            return Some(candidate.canonicalize().unwrap_or(candidate));
        }
    }

    workspace_root
        .ancestors()
        .take(3)
        .find(|candidate| is_project_root(candidate))
        .map(|candidate| {
            candidate
                .canonicalize()
                .unwrap_or_else(|_| candidate.to_path_buf())
        })
}

fn is_project_root(candidate: &Path) -> bool {
    candidate.join("main.py").is_file()
        && candidate.join("src").join("wechat_decrypt_tool").is_dir()
}
