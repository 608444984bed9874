#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;
use std::{
    fs::{self, OpenOptions},
    process::{Child, Command, ExitStatus, Stdio},
    sync::{Arc, Mutex, MutexGuard},
    thread,
};

use serde::Serialize;

use crate::{
    launch_plan::{BackendLaunchSpec, BackendOutput},
    logging,
    process_control::{self, TerminationStrategy},
    startup_error::StartupError,
    BACKEND_LOG_MAX_BYTES, LOG_BACKUP_COUNT,
};
#[cfg(target_os = "windows")]
use crate::{process_control::CREATE_NO_WINDOW, CREATE_NEW_PROCESS_GROUP};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BackendHandle {
    pub pid: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExitReport {
    pub pid: u32,
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitReport {
    fn from_status(pid: u32, status: &ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            pid,
            code: status.code(),
            signal,
        }
    }
}

pub type ExitObserver = Box<dyn Fn(&ExitReport) + Send + Sync>;

#[derive(Debug, Default)]
struct SupervisorSlot {
    current: Option<BackendHandle>,
    /// Stopped but not yet reaped; holds the port until its observer fires.
    terminating: Option<BackendHandle>,
    last_exit: Option<ExitReport>,
}

/// Sole owner of the backend process. At most one process is live at a
/// time; every access to it goes through `start`, `stop` and the getters.
pub struct ProcessSupervisor {
    slot: Arc<Mutex<SupervisorSlot>>,
    observers: Arc<Mutex<Vec<ExitObserver>>>,
    strategy: Box<dyn TerminationStrategy>,
    log: fn(&str),
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl ProcessSupervisor {
    pub fn new(log: fn(&str)) -> Self {
        Self::with_strategy(process_control::platform_strategy(), log)
    }

    pub fn with_strategy(strategy: Box<dyn TerminationStrategy>, log: fn(&str)) -> Self {
        Self {
            slot: Arc::new(Mutex::new(SupervisorSlot::default())),
            observers: Arc::new(Mutex::new(Vec::new())),
            strategy,
            log,
        }
    }

    pub fn on_exit<F>(&self, observer: F)
    where
        F: Fn(&ExitReport) + Send + Sync + 'static,
    {
        lock_or_recover(&self.observers).push(Box::new(observer));
    }

    pub fn current(&self) -> Option<BackendHandle> {
        lock_or_recover(&self.slot).current
    }

    pub fn is_live(&self) -> bool {
        self.current().is_some()
    }

    pub fn last_exit(&self) -> Option<ExitReport> {
        lock_or_recover(&self.slot).last_exit
    }

    pub fn start(&self, spec: &BackendLaunchSpec) -> Result<BackendHandle, StartupError> {
        let log = self.log;
        let mut slot = lock_or_recover(&self.slot);
        if let Some(existing) = slot.current {
            log(&format!(
                "backend already running, skip re-spawn: pid={}",
                existing.pid
            ));
            return Ok(existing);
        }
        if let Some(previous) = slot.terminating {
            return Err(StartupError::SpawnFailed {
                command: format!("{:?}", spec.display_command()),
                reason: format!("previous backend pid={} is still shutting down", previous.pid),
            });
        }

        let mut command = build_command(spec)?;
        let child = command.spawn().map_err(|error| StartupError::SpawnFailed {
            command: format!("{:?}", spec.display_command()),
            reason: error.to_string(),
        })?;
        let handle = BackendHandle { pid: child.id() };
        log(&format!(
            "spawned backend: pid={}, mode={}, cmd={:?}, cwd={}",
            handle.pid,
            spec.mode.as_str(),
            spec.display_command(),
            spec.cwd.display()
        ));
        slot.current = Some(handle);
        // The observer blocks on the slot lock until this guard drops, so an
        // instant exit cannot be recorded before the handle is.
        self.spawn_exit_observer(child);
        Ok(handle)
    }

    /// Fire-and-forget termination of the current process. Repeated or
    /// concurrent calls collapse: only the caller that takes the handle
    /// issues a termination. `start` refuses to spawn again until the
    /// stopped process has been reaped.
    ///
    /// The pid is signalled without holding the slot lock, so a process that
    /// exits on its own at the same instant may already be reaped when the
    /// signal is sent.
    pub fn stop(&self) {
        let log = self.log;
        let handle = {
            let mut slot = lock_or_recover(&self.slot);
            let Some(handle) = slot.current.take() else {
                return;
            };
            slot.terminating = Some(handle);
            handle
        };
        log(&format!(
            "stopping backend: pid={}, strategy={}",
            handle.pid,
            self.strategy.name()
        ));
        self.strategy
            .terminate(handle.pid, &|message: &str| log(message));
    }

    fn spawn_exit_observer(&self, mut child: Child) {
        let log = self.log;
        let pid = child.id();
        let slot = Arc::clone(&self.slot);
        let observers = Arc::clone(&self.observers);

        let spawned = thread::Builder::new()
            .name(format!("backend-exit-{pid}"))
            .spawn(move || {
                let report = match child.wait() {
                    Ok(status) => ExitReport::from_status(pid, &status),
                    Err(error) => {
                        log(&format!("failed to wait for backend pid={pid}: {error}"));
                        ExitReport {
                            pid,
                            code: None,
                            signal: None,
                        }
                    }
                };
                {
                    let mut slot = lock_or_recover(&slot);
                    if slot.current.is_some_and(|handle| handle.pid == pid) {
                        slot.current = None;
                    }
                    if slot.terminating.is_some_and(|handle| handle.pid == pid) {
                        slot.terminating = None;
                    }
                    slot.last_exit = Some(report);
                }
                log(&format!(
                    "backend exited: pid={pid}, code={:?}, signal={:?}",
                    report.code, report.signal
                ));
                for observer in lock_or_recover(&observers).iter() {
                    observer(&report);
                }
            });
        if let Err(error) = spawned {
            log(&format!(
                "failed to start backend exit observer for pid={pid}: {error}"
            ));
        }
    }
}

fn build_command(spec: &BackendLaunchSpec) -> Result<Command, StartupError> {
    let mut command = Command::new(&spec.command);
    command
        .args(&spec.args)
        .current_dir(&spec.cwd)
        .envs(&spec.env)
        .stdin(Stdio::null());
    if let Some(path_override) = &spec.path_override {
        command.env("PATH", path_override);
    }
    #[cfg(target_os = "windows")]
    {
        // Packaged backend stays fully backgrounded; dev keeps its console.
        if spec.mode.is_packaged() {
            command.creation_flags(CREATE_NO_WINDOW | CREATE_NEW_PROCESS_GROUP);
        }
    }

    match &spec.output {
        BackendOutput::Inherit => {}
        BackendOutput::AppendTo(log_path) => {
            let spawn_error = |reason: String| StartupError::SpawnFailed {
                command: format!("{:?}", spec.display_command()),
                reason,
            };
            if let Some(log_parent) = log_path.parent() {
                fs::create_dir_all(log_parent).map_err(|error| {
                    spawn_error(format!(
                        "failed to create backend log directory {}: {error}",
                        log_parent.display()
                    ))
                })?;
            }
            logging::rotate_log_if_needed(
                log_path,
                BACKEND_LOG_MAX_BYTES,
                LOG_BACKUP_COUNT,
                "backend",
            );
            let stdout_file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_path)
                .map_err(|error| {
                    spawn_error(format!(
                        "failed to open backend log {}: {error}",
                        log_path.display()
                    ))
                })?;
            let stderr_file = stdout_file
                .try_clone()
                .map_err(|error| spawn_error(format!("failed to clone backend log handle: {error}")))?;
            command
                .stdout(Stdio::from(stdout_file))
                .stderr(Stdio::from(stderr_file));
        }
    }
    Ok(command)
}
