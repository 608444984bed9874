#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;
use std::{
    io,
    process::{Command, ExitStatus, Stdio},
    thread,
};

#[cfg(target_os = "windows")]
pub const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// How the supervisor asks a backend process (and whatever it spawned) to go
/// away. Implementations must never panic and never block on the target's
/// exit; failures are reported through `log` only.
pub trait TerminationStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn terminate(&self, pid: u32, log: &(dyn Fn(&str) + Sync));
}

/// `taskkill /T /F`: the only reliable way to take down the PyInstaller
/// bootloader together with the child it unpacks on Windows.
#[derive(Debug, Default, Clone, Copy)]
pub struct TreeKillByPid;

/// SIGTERM straight to the backend pid.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectSignal;

pub fn platform_strategy() -> Box<dyn TerminationStrategy> {
    if cfg!(target_os = "windows") {
        Box::new(TreeKillByPid)
    } else {
        Box::new(DirectSignal)
    }
}

fn stop_command(program: &str, args: &[&str]) -> Command {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .stdin(Stdio::null());
    #[cfg(target_os = "windows")]
    {
        // Avoid flashing transient console windows when invoking taskkill.
        command.creation_flags(CREATE_NO_WINDOW);
    }
    command
}

fn log_stop_status(
    pid: u32,
    label: &str,
    status: &io::Result<ExitStatus>,
    log: &(dyn Fn(&str) + Sync),
) {
    match status {
        Ok(exit_status) if exit_status.success() => {}
        Ok(exit_status) => log(&format!(
            "{label} returned non-zero: pid={pid}, status={exit_status:?}"
        )),
        Err(error) => log(&format!("{label} failed to start: pid={pid}, error={error}")),
    }
}

impl TerminationStrategy for TreeKillByPid {
    fn name(&self) -> &'static str {
        "tree-kill-by-pid"
    }

    fn terminate(&self, pid: u32, log: &(dyn Fn(&str) + Sync)) {
        let pid_arg = pid.to_string();
        let label = "taskkill tree stop";
        match stop_command("taskkill", &["/pid", &pid_arg, "/T", "/F"]).spawn() {
            Ok(mut killer) => {
                log(&format!("{label} issued: pid={pid}"));
                // Reap taskkill off the shutdown path; nobody waits on this thread.
                let _ = thread::Builder::new()
                    .name("taskkill-reaper".to_string())
                    .spawn(move || {
                        let _ = killer.wait();
                    });
            }
            Err(error) => {
                log_stop_status(pid, label, &Err(error), log);
            }
        }
    }
}

impl TerminationStrategy for DirectSignal {
    fn name(&self) -> &'static str {
        "direct-signal"
    }

    fn terminate(&self, pid: u32, log: &(dyn Fn(&str) + Sync)) {
        let pid_arg = pid.to_string();
        let status = stop_command("kill", &["-TERM", &pid_arg]).status();
        log_stop_status(pid, "kill -TERM", &status, log);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn platform_strategy_matches_target() {
        let expected = if cfg!(target_os = "windows") {
            "tree-kill-by-pid"
        } else {
            "direct-signal"
        };
        assert_eq!(platform_strategy().name(), expected);
    }

    #[test]
    fn failed_stop_command_is_logged_not_raised() {
        let logs = Mutex::new(Vec::new());
        let status: io::Result<ExitStatus> = Err(io::Error::other("simulated failure"));
        log_stop_status(42, "kill -TERM", &status, &|message| {
            logs.lock().expect("lock logs").push(message.to_string())
        });

        let snapshot = logs.lock().expect("lock logs");
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].contains("failed to start: pid=42"));
    }

    #[cfg(unix)]
    #[test]
    fn direct_signal_to_gone_pid_does_not_panic() {
        let logs = Mutex::new(Vec::new());
        // Far above any default pid_max; `kill` reports "no such process".
        DirectSignal.terminate(999_999_999, &|message| {
            logs.lock().expect("lock logs").push(message.to_string())
        });
        assert!(logs
            .lock()
            .expect("lock logs")
            .iter()
            .any(|line| line.contains("kill -TERM")));
    }
}
