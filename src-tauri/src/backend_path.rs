use std::{
    collections::HashSet,
    env,
    ffi::OsString,
    path::{Path, PathBuf},
};

pub const EXTRA_PATH_ENV: &str = "WECHAT_DESKTOP_EXTRA_PATH";

// Keys are component-normalized so `/a/../b` and `/b` collapse; Windows PATH
// lookups are case-insensitive, so fold ASCII case there.
fn path_key(path: &Path) -> Option<OsString> {
    if path.as_os_str().is_empty() {
        return None;
    }
    let normalized: PathBuf = path.components().collect();
    #[cfg(target_os = "windows")]
    {
        Some(OsString::from(
            normalized.to_string_lossy().to_ascii_lowercase(),
        ))
    }
    #[cfg(not(target_os = "windows"))]
    {
        Some(normalized.into_os_string())
    }
}

/// Directories where `uv` lands when installed through its standalone
/// installer, cargo, or a package manager. GUI launchers rarely inherit a
/// login shell PATH, so development launches would otherwise fail to find it.
fn uv_install_dirs(home_dir: Option<PathBuf>) -> Vec<PathBuf> {
    let mut result = Vec::new();

    if let Some(home_dir) = home_dir {
        result.push(home_dir.join(".local").join("bin"));
        result.push(home_dir.join(".cargo").join("bin"));
    }

    #[cfg(target_os = "macos")]
    {
        result.push(PathBuf::from("/opt/homebrew/bin"));
        result.push(PathBuf::from("/usr/local/bin"));
    }

    #[cfg(target_os = "windows")]
    {
        if let Some(local_app_data) = env::var_os("LOCALAPPDATA") {
            result.push(
                PathBuf::from(local_app_data)
                    .join("Programs")
                    .join("uv"),
            );
        }
    }

    result
}

fn collect_prepend_entries(
    extra: impl IntoIterator<Item = PathBuf>,
    existing_entries: &[PathBuf],
) -> Vec<PathBuf> {
    let mut seen_keys: HashSet<OsString> = existing_entries
        .iter()
        .filter_map(|path| path_key(path))
        .collect();
    extra
        .into_iter()
        .filter(|candidate| candidate.is_dir())
        .filter(|candidate| path_key(candidate).is_some_and(|key| seen_keys.insert(key)))
        .collect()
}

/// Builds a PATH for the development backend with missing tool directories
/// prepended. Returns `None` when nothing needs to change.
pub fn build_backend_path_override<F>(mut log: F) -> Option<OsString>
where
    F: FnMut(String),
{
    let existing_path = env::var_os("PATH").unwrap_or_default();
    let existing_entries: Vec<PathBuf> = env::split_paths(&existing_path).collect();

    let explicit = env::var_os(EXTRA_PATH_ENV)
        .map(|raw| env::split_paths(&raw).collect::<Vec<_>>())
        .unwrap_or_default();
    let prepend_entries = collect_prepend_entries(
        explicit.into_iter().chain(uv_install_dirs(home::home_dir())),
        &existing_entries,
    );
    if prepend_entries.is_empty() {
        return None;
    }

    match env::join_paths(prepend_entries.iter().chain(existing_entries.iter())) {
        Ok(path_override) => {
            let preview = prepend_entries
                .iter()
                .map(|entry| entry.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            log(format!(
                "backend PATH augmented with {} prepended directories: {preview}",
                prepend_entries.len()
            ));
            Some(path_override)
        }
        Err(error) => {
            log(format!("failed to build backend PATH override: {error}"));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime_paths::tests::create_temp_case_dir;
    use std::fs;

    #[test]
    fn collect_prepend_entries_skips_existing_and_missing_dirs() {
        let root = create_temp_case_dir("path-override");
        let present = root.join("present");
        let already_listed = root.join("listed");
        fs::create_dir_all(&present).expect("create present dir");
        fs::create_dir_all(&already_listed).expect("create listed dir");

        let entries = collect_prepend_entries(
            vec![
                present.clone(),
                root.join("missing"),
                already_listed.clone(),
                present.clone(),
            ],
            &[already_listed],
        );
        assert_eq!(entries, vec![present]);

        fs::remove_dir_all(&root).expect("cleanup path override dir");
    }

    #[test]
    fn uv_install_dirs_include_user_local_bin() {
        let dirs = uv_install_dirs(Some(PathBuf::from("/home/analyst")));
        assert!(dirs.contains(&PathBuf::from("/home/analyst/.local/bin")));
        assert!(dirs.contains(&PathBuf::from("/home/analyst/.cargo/bin")));
    }
}
