use std::{
    collections::BTreeMap,
    env,
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

use crate::{
    backend_path, logging,
    runtime_paths::{BACKEND_EXECUTABLE_NAME, BACKEND_RESOURCE_DIR, UI_RESOURCE_DIR},
    shell_config::{DeploymentMode, ShellConfig, DATA_DIR_ENV, HOST_ENV, PORT_ENV, UI_DIR_ENV},
    startup_error::StartupError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendOutput {
    /// Development: the backend shares the developer's console output.
    Inherit,
    AppendTo(PathBuf),
}

/// Everything needed to spawn the backend once. Computed once per run.
#[derive(Debug, Clone)]
pub struct BackendLaunchSpec {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
    pub path_override: Option<OsString>,
    pub output: BackendOutput,
    pub mode: DeploymentMode,
}

impl BackendLaunchSpec {
    pub fn display_command(&self) -> Vec<String> {
        let mut parts = vec![self.command.clone()];
        parts.extend(self.args.iter().cloned());
        parts
    }
}

/// Filesystem locations the Tauri runtime resolves for the locator.
#[derive(Debug, Clone, Default)]
pub struct LocatorPaths {
    pub resource_dir: Option<PathBuf>,
    pub user_data_dir: Option<PathBuf>,
    pub project_root: Option<PathBuf>,
}

pub fn resolve_launch_spec<F>(
    config: &ShellConfig,
    paths: &LocatorPaths,
    log: F,
) -> Result<BackendLaunchSpec, StartupError>
where
    F: Fn(&str) + Copy,
{
    if let Some(custom_cmd) = &config.backend_cmd_override {
        return resolve_custom_launch(custom_cmd, config, paths);
    }

    match config.mode {
        DeploymentMode::Packaged => resolve_packaged_launch(config, paths),
        DeploymentMode::Development => resolve_dev_launch(config, paths, log),
    }
}

fn base_backend_env(config: &ShellConfig) -> BTreeMap<String, String> {
    BTreeMap::from([
        (HOST_ENV.to_string(), config.host.clone()),
        (PORT_ENV.to_string(), config.port.to_string()),
    ])
}

fn path_env_value(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn split_custom_command(custom_cmd: &str) -> Result<(String, Vec<String>), StartupError> {
    let mut pieces = shlex::split(custom_cmd)
        .ok_or_else(|| StartupError::InvalidCommand(custom_cmd.to_string()))?;
    if pieces.is_empty() {
        return Err(StartupError::InvalidCommand("command is empty".to_string()));
    }
    let command = pieces.remove(0);
    Ok((command, pieces))
}

/// The override replaces the command line only; a packaged run still gets
/// its data directory, asset environment and backend log.
pub fn resolve_custom_launch(
    custom_cmd: &str,
    config: &ShellConfig,
    paths: &LocatorPaths,
) -> Result<BackendLaunchSpec, StartupError> {
    let (command, args) = split_custom_command(custom_cmd)?;

    if config.mode.is_packaged() {
        let mut spec = packaged_launch_for(command, config, paths)?;
        spec.args = args;
        return Ok(spec);
    }

    let cwd = paths
        .project_root
        .clone()
        .or_else(|| env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    Ok(BackendLaunchSpec {
        command,
        args,
        cwd,
        env: base_backend_env(config),
        path_override: None,
        output: BackendOutput::Inherit,
        mode: config.mode,
    })
}

pub fn resolve_packaged_launch(
    config: &ShellConfig,
    paths: &LocatorPaths,
) -> Result<BackendLaunchSpec, StartupError> {
    let executable = match (&config.backend_exe_override, &paths.resource_dir) {
        (Some(explicit), _) => explicit.clone(),
        (None, Some(resources)) => resources
            .join(BACKEND_RESOURCE_DIR)
            .join(BACKEND_EXECUTABLE_NAME),
        (None, None) => PathBuf::from(BACKEND_RESOURCE_DIR).join(BACKEND_EXECUTABLE_NAME),
    };
    if !executable.is_file() {
        return Err(StartupError::BackendExecutableMissing { path: executable });
    }

    packaged_launch_for(path_env_value(&executable), config, paths)
}

fn packaged_launch_for(
    command: String,
    config: &ShellConfig,
    paths: &LocatorPaths,
) -> Result<BackendLaunchSpec, StartupError> {
    let data_dir = config
        .data_dir_override
        .clone()
        .or_else(|| paths.user_data_dir.clone())
        .ok_or_else(|| StartupError::DataDirUnavailable {
            path: PathBuf::new(),
            reason: "no per-user data directory could be resolved".to_string(),
        })?;
    fs::create_dir_all(&data_dir).map_err(|error| StartupError::DataDirUnavailable {
        path: data_dir.clone(),
        reason: error.to_string(),
    })?;

    let ui_dir = config.ui_dir_override.clone().or_else(|| {
        paths
            .resource_dir
            .as_ref()
            .map(|resources| resources.join(UI_RESOURCE_DIR))
    });

    let mut backend_env = base_backend_env(config);
    if let Some(ui_dir) = &ui_dir {
        backend_env.insert(UI_DIR_ENV.to_string(), path_env_value(ui_dir));
    }
    backend_env.insert(DATA_DIR_ENV.to_string(), path_env_value(&data_dir));

    Ok(BackendLaunchSpec {
        command,
        args: Vec::new(),
        output: BackendOutput::AppendTo(logging::backend_log_path(&data_dir)),
        cwd: data_dir,
        env: backend_env,
        path_override: None,
        mode: DeploymentMode::Packaged,
    })
}

pub fn resolve_dev_launch<F>(
    config: &ShellConfig,
    paths: &LocatorPaths,
    log: F,
) -> Result<BackendLaunchSpec, StartupError>
where
    F: Fn(&str) + Copy,
{
    let project_root = paths
        .project_root
        .clone()
        .ok_or(StartupError::ProjectRootNotFound)?;

    Ok(BackendLaunchSpec {
        command: "uv".to_string(),
        args: vec!["run".to_string(), "main.py".to_string()],
        cwd: project_root,
        env: base_backend_env(config),
        path_override: backend_path::build_backend_path_override(|message| log(&message)),
        output: BackendOutput::Inherit,
        mode: DeploymentMode::Development,
    })
}
