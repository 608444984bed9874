use std::{
    env,
    path::PathBuf,
    sync::{Mutex, OnceLock},
};

use crate::{
    logging, renderer_console, runtime_paths, DESKTOP_LOG_FILE, DESKTOP_LOG_MAX_BYTES,
    LOG_BACKUP_COUNT,
};

static DESKTOP_LOG_WRITE_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

pub(crate) fn renderer_console_path() -> PathBuf {
    let data_dir = runtime_paths::user_data_dir()
        .unwrap_or_else(|| env::temp_dir().join("wechat-data-analysis"));
    renderer_console::renderer_console_log_path(&data_dir)
}

pub(crate) fn append_desktop_log(message: &str) {
    append_desktop_log_with_category(logging::DesktopLogCategory::Runtime, message);
}

pub(crate) fn append_startup_log(message: &str) {
    append_desktop_log_with_category(logging::DesktopLogCategory::Startup, message);
}

pub(crate) fn append_shutdown_log(message: &str) {
    append_desktop_log_with_category(logging::DesktopLogCategory::Shutdown, message);
}

fn append_desktop_log_with_category(category: logging::DesktopLogCategory, message: &str) {
    logging::append_desktop_log(
        category,
        message,
        runtime_paths::user_data_dir(),
        DESKTOP_LOG_FILE,
        DESKTOP_LOG_MAX_BYTES,
        LOG_BACKUP_COUNT,
        &DESKTOP_LOG_WRITE_LOCK,
    )
}
