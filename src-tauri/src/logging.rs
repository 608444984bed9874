use std::{
    env,
    ffi::OsString,
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::{Mutex, OnceLock},
};

pub const DESKTOP_LOG_PATH_ENV: &str = "WECHAT_DESKTOP_LOG_PATH";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesktopLogCategory {
    Startup,
    Runtime,
    Shutdown,
}

impl DesktopLogCategory {
    fn as_label(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Runtime => "runtime",
            Self::Shutdown => "shutdown",
        }
    }
}

pub fn rotate_log_if_needed(path: &Path, max_bytes: u64, backup_count: usize, log_scope: &str) {
    if max_bytes == 0 || backup_count == 0 {
        return;
    }

    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(error) => {
            if error.kind() != std::io::ErrorKind::NotFound {
                eprintln!(
                    "[log rotation:{log_scope}] failed to read metadata for {}: {}",
                    path.display(),
                    error
                );
            }
            return;
        }
    };
    if metadata.len() < max_bytes {
        return;
    }

    // Shift .N-1 -> .N down to .1 -> .2; the oldest backup falls off the end.
    for index in (1..backup_count).rev() {
        let source = rotated_log_path(path, index);
        if !source.exists() {
            continue;
        }
        let target = rotated_log_path(path, index + 1);
        remove_if_present(&target, log_scope);
        if let Err(error) = fs::rename(&source, &target) {
            eprintln!(
                "[log rotation:{log_scope}] failed to rename {} to {}: {}",
                source.display(),
                target.display(),
                error
            );
        }
    }

    let rotated = rotated_log_path(path, 1);
    remove_if_present(&rotated, log_scope);
    if let Err(error) = fs::rename(path, &rotated) {
        eprintln!(
            "[log rotation:{log_scope}] failed to rotate {} to {}: {}",
            path.display(),
            rotated.display(),
            error
        );
    }
}

fn remove_if_present(path: &Path, log_scope: &str) {
    if let Err(error) = fs::remove_file(path) {
        if error.kind() != std::io::ErrorKind::NotFound {
            eprintln!(
                "[log rotation:{log_scope}] failed to remove {}: {}",
                path.display(),
                error
            );
        }
    }
}

fn rotated_log_path(path: &Path, index: usize) -> PathBuf {
    let mut value = OsString::from(path.as_os_str());
    value.push(format!(".{index}"));
    PathBuf::from(value)
}

pub fn resolve_desktop_log_path(data_dir: Option<PathBuf>, desktop_log_file: &str) -> PathBuf {
    if let Ok(custom) = env::var(DESKTOP_LOG_PATH_ENV) {
        let candidate = PathBuf::from(custom.trim());
        if !candidate.as_os_str().is_empty() {
            return candidate;
        }
    }

    if let Some(root) = data_dir {
        return root.join("logs").join(desktop_log_file);
    }

    env::temp_dir()
        .join("wechat-data-analysis")
        .join("logs")
        .join(desktop_log_file)
}

pub fn backend_log_path(data_dir: &Path) -> PathBuf {
    data_dir.join("logs").join("backend.log")
}

pub fn append_desktop_log(
    category: DesktopLogCategory,
    message: &str,
    data_dir: Option<PathBuf>,
    desktop_log_file: &str,
    max_bytes: u64,
    backup_count: usize,
    write_lock: &OnceLock<Mutex<()>>,
) {
    let path = resolve_desktop_log_path(data_dir, desktop_log_file);
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let _guard = match write_lock.get_or_init(|| Mutex::new(())).lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    rotate_log_if_needed(&path, max_bytes, backup_count, "desktop");
    let timestamp = chrono::Local::now()
        .format("%Y-%m-%d %H:%M:%S%.3f %z")
        .to_string();
    let line = format!("[{}] [{}] {}\n", timestamp, category.as_label(), message);
    let _ = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| file.write_all(line.as_bytes()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime_paths::tests::create_temp_case_dir;

    #[test]
    fn rotate_log_shifts_backups_once_over_limit() {
        let dir = create_temp_case_dir("rotate");
        let log = dir.join("desktop.log");
        fs::write(&log, b"0123456789").expect("write active log");
        fs::write(rotated_log_path(&log, 1), b"older").expect("write first backup");

        rotate_log_if_needed(&log, 5, 3, "test");

        assert!(!log.exists());
        assert_eq!(
            fs::read(rotated_log_path(&log, 1)).expect("read .1"),
            b"0123456789"
        );
        assert_eq!(fs::read(rotated_log_path(&log, 2)).expect("read .2"), b"older");
        fs::remove_dir_all(&dir).expect("cleanup rotate dir");
    }

    #[test]
    fn rotate_log_leaves_small_files_alone() {
        let dir = create_temp_case_dir("rotate-small");
        let log = dir.join("desktop.log");
        fs::write(&log, b"tiny").expect("write active log");

        rotate_log_if_needed(&log, 1024, 3, "test");

        assert_eq!(fs::read(&log).expect("read active log"), b"tiny");
        assert!(!rotated_log_path(&log, 1).exists());
        fs::remove_dir_all(&dir).expect("cleanup rotate dir");
    }

    #[test]
    fn append_desktop_log_writes_categorized_line() {
        let dir = create_temp_case_dir("append");
        let lock = OnceLock::new();
        append_desktop_log(
            DesktopLogCategory::Shutdown,
            "backend stop requested",
            Some(dir.clone()),
            "unit.log",
            1024 * 1024,
            2,
            &lock,
        );

        let text = fs::read_to_string(dir.join("logs").join("unit.log")).expect("read log");
        assert!(text.ends_with("[shutdown] backend stop requested\n"));
        fs::remove_dir_all(&dir).expect("cleanup append dir");
    }
}
