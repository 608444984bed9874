use std::sync::{Mutex, MutexGuard};

use url::Url;

use crate::{
    backend_readiness::{self, Clock, HealthProbe, ReadinessOutcome, ReadinessPolicy},
    backend_supervisor::{BackendHandle, ExitReport, ProcessSupervisor},
    launch_plan::BackendLaunchSpec,
    main_window::{self, LoadPolicy, WindowSession},
    startup_error::StartupError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecyclePhase {
    #[default]
    Idle,
    Locating,
    Starting,
    Probing,
    WindowCreating,
    Loading,
    Running,
    ShuttingDown,
    Stopped,
    Failed {
        exit_code: i32,
    },
}

impl LifecyclePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Locating => "locating",
            Self::Starting => "starting",
            Self::Probing => "probing",
            Self::WindowCreating => "window-creating",
            Self::Loading => "loading",
            Self::Running => "running",
            Self::ShuttingDown => "shutting-down",
            Self::Stopped => "stopped",
            Self::Failed { .. } => "failed",
        }
    }

    /// Once shutdown has begun no trigger may start it again.
    pub fn is_shutdown_started(self) -> bool {
        matches!(self, Self::ShuttingDown | Self::Stopped | Self::Failed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownTrigger {
    WindowDestroyed,
    ExitRequested,
    RuntimeExit,
}

impl ShutdownTrigger {
    fn as_str(self) -> &'static str {
        match self {
            Self::WindowDestroyed => "window destroyed",
            Self::ExitRequested => "exit requested",
            Self::RuntimeExit => "runtime exit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendExitKind {
    /// Exit caused by our own shutdown.
    Expected,
    /// Died before the UI was up; the readiness probe reports it.
    DuringStartup,
    /// Died on its own while the UI was in use.
    WhileRunning,
}

pub trait BackendControl {
    fn start(&self, spec: &BackendLaunchSpec) -> Result<BackendHandle, StartupError>;
    fn stop(&self);
}

impl BackendControl for ProcessSupervisor {
    fn start(&self, spec: &BackendLaunchSpec) -> Result<BackendHandle, StartupError> {
        ProcessSupervisor::start(self, spec)
    }

    fn stop(&self) {
        ProcessSupervisor::stop(self)
    }
}

/// The UI side of startup. Implemented over the Tauri main window in
/// production.
pub trait WindowHost {
    fn create_window(&self) -> Result<WindowSession, StartupError>;
    /// One navigation attempt; `Err` is retried until the load budget is spent.
    fn load(&self, url: &Url) -> Result<(), String>;
    fn on_first_load(&self, session: &WindowSession);
}

#[derive(Debug, Clone)]
pub struct StartupPlan {
    pub readiness: ReadinessPolicy,
    pub load: LoadPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupOutcome {
    Running(WindowSession),
    /// A shutdown trigger arrived while startup was still in flight.
    Aborted,
}

#[derive(Debug, Default)]
struct CoordinatorState {
    phase: LifecyclePhase,
    exit_request_allowed: bool,
}

pub struct LifecycleCoordinator {
    state: Mutex<CoordinatorState>,
    log: fn(&str),
}

impl LifecycleCoordinator {
    pub fn new(log: fn(&str)) -> Self {
        Self {
            state: Mutex::new(CoordinatorState::default()),
            log,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, CoordinatorState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.lock_state().phase
    }

    pub fn is_shutdown_started(&self) -> bool {
        self.phase().is_shutdown_started()
    }

    /// 0 after a graceful stop, the failing step's code otherwise.
    pub fn exit_code(&self) -> i32 {
        match self.phase() {
            LifecyclePhase::Failed { exit_code } => exit_code,
            _ => 0,
        }
    }

    fn transition(state: &mut CoordinatorState, next: LifecyclePhase, log: fn(&str)) {
        log(&format!(
            "lifecycle: {} -> {}",
            state.phase.as_str(),
            next.as_str()
        ));
        state.phase = next;
    }

    fn enter(&self, next: LifecyclePhase) -> bool {
        let mut state = self.lock_state();
        if state.phase.is_shutdown_started() {
            (self.log)(&format!(
                "lifecycle: skip {} because shutdown already started",
                next.as_str()
            ));
            return false;
        }
        Self::transition(&mut state, next, self.log);
        true
    }

    pub fn run_startup<L, B, W, P, C>(
        &self,
        locate: L,
        backend: &B,
        window: &W,
        probe: &P,
        clock: &C,
        plan: &StartupPlan,
    ) -> Result<StartupOutcome, StartupError>
    where
        L: FnOnce() -> Result<BackendLaunchSpec, StartupError>,
        B: BackendControl + ?Sized,
        W: WindowHost + ?Sized,
        P: HealthProbe + ?Sized,
        C: Clock + ?Sized,
    {
        let log = self.log;

        if !self.enter(LifecyclePhase::Locating) {
            return Ok(StartupOutcome::Aborted);
        }
        let spec = match locate() {
            Ok(spec) => spec,
            Err(error) => return self.fail_startup(error, backend),
        };

        // Spawning under the state lock: a concurrent shutdown either sees
        // no backend and wins, or waits and then stops the one spawned here.
        let started = {
            let mut state = self.lock_state();
            if state.phase.is_shutdown_started() {
                return Ok(StartupOutcome::Aborted);
            }
            Self::transition(&mut state, LifecyclePhase::Starting, log);
            backend.start(&spec)
        };
        if let Err(error) = started {
            return self.fail_startup(error, backend);
        }

        if !self.enter(LifecyclePhase::Probing) {
            return Ok(StartupOutcome::Aborted);
        }
        match backend_readiness::wait_until_ready(probe, clock, &plan.readiness, log) {
            ReadinessOutcome::Ready {
                status,
                attempts,
                elapsed,
            } => log(&format!(
                "backend ready: url={}, status={status}, attempts={attempts}, elapsed_ms={}",
                plan.readiness.url,
                elapsed.as_millis()
            )),
            ReadinessOutcome::TimedOut {
                attempts,
                elapsed,
                last,
            } => {
                log(&format!(
                    "backend readiness timed out: url={}, elapsed_ms={}, attempts={attempts}, last={last}",
                    plan.readiness.url,
                    elapsed.as_millis()
                ));
                let error = StartupError::ReadinessTimeout {
                    url: plan.readiness.url.to_string(),
                    elapsed_ms: elapsed.as_millis(),
                };
                return self.fail_startup(error, backend);
            }
        }

        if !self.enter(LifecyclePhase::WindowCreating) {
            return Ok(StartupOutcome::Aborted);
        }
        let session = match window.create_window() {
            Ok(session) => session,
            Err(error) => return self.fail_startup(error, backend),
        };

        if !self.enter(LifecyclePhase::Loading) {
            return Ok(StartupOutcome::Aborted);
        }
        match main_window::load_initial_content(|url| window.load(url), clock, &plan.load, log) {
            Ok(outcome) if outcome.attempts > 1 => log(&format!(
                "start url needed {} attempts over {}ms",
                outcome.attempts,
                outcome.elapsed.as_millis()
            )),
            Ok(_) => {}
            Err(error) => return self.fail_startup(error, backend),
        }
        window.on_first_load(&session);

        if !self.enter(LifecyclePhase::Running) {
            return Ok(StartupOutcome::Aborted);
        }
        Ok(StartupOutcome::Running(session))
    }

    /// Moves to `ShuttingDown`, stops the backend, then settles in `Failed`.
    pub fn fail_startup<B>(
        &self,
        error: StartupError,
        backend: &B,
    ) -> Result<StartupOutcome, StartupError>
    where
        B: BackendControl + ?Sized,
    {
        let log = self.log;
        {
            let mut state = self.lock_state();
            if state.phase.is_shutdown_started() {
                log(&format!("startup error after shutdown began, ignored: {error}"));
                return Ok(StartupOutcome::Aborted);
            }
            Self::transition(&mut state, LifecyclePhase::ShuttingDown, log);
        }

        log(&format!("startup failed: {error}"));
        backend.stop();

        let exit_code = error.exit_code();
        let mut state = self.lock_state();
        Self::transition(&mut state, LifecyclePhase::Failed { exit_code }, log);
        Err(error)
    }

    /// Routes every exit trigger to a single backend stop. Returns `false`
    /// when shutdown already ran (or is running) for an earlier trigger.
    pub fn request_shutdown<B>(&self, trigger: ShutdownTrigger, backend: &B) -> bool
    where
        B: BackendControl + ?Sized,
    {
        let log = self.log;
        {
            let mut state = self.lock_state();
            if state.phase.is_shutdown_started() {
                log(&format!(
                    "{} ignored: shutdown already {}",
                    trigger.as_str(),
                    state.phase.as_str()
                ));
                return false;
            }
            log(&format!("{}: stopping backend", trigger.as_str()));
            Self::transition(&mut state, LifecyclePhase::ShuttingDown, log);
        }

        backend.stop();

        let mut state = self.lock_state();
        if state.phase == LifecyclePhase::ShuttingDown {
            Self::transition(&mut state, LifecyclePhase::Stopped, log);
        }
        true
    }

    pub fn classify_backend_exit(&self, report: &ExitReport) -> BackendExitKind {
        let kind = match self.phase() {
            LifecyclePhase::Running => BackendExitKind::WhileRunning,
            phase if phase.is_shutdown_started() => BackendExitKind::Expected,
            _ => BackendExitKind::DuringStartup,
        };
        if kind != BackendExitKind::Expected {
            (self.log)(&format!(
                "backend exited unexpectedly ({kind:?}): pid={}, code={:?}, signal={:?}",
                report.pid, report.code, report.signal
            ));
        }
        kind
    }

    /// Lets the next runtime exit request pass once our own cleanup is done.
    pub fn allow_next_exit_request(&self) {
        self.lock_state().exit_request_allowed = true;
    }

    pub fn take_exit_request_allowance(&self) -> bool {
        let mut state = self.lock_state();
        std::mem::take(&mut state.exit_request_allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend_readiness::{test_support::FakeClock, ProbeResult},
        launch_plan::BackendOutput,
        shell_config::DeploymentMode,
    };
    use std::{
        cell::{Cell, RefCell},
        collections::BTreeMap,
        path::PathBuf,
        time::Duration,
    };

    fn quiet(_: &str) {}

    #[derive(Default)]
    struct FakeBackend {
        starts: Cell<u32>,
        stops: Cell<u32>,
    }

    impl BackendControl for FakeBackend {
        fn start(&self, _spec: &BackendLaunchSpec) -> Result<BackendHandle, StartupError> {
            self.starts.set(self.starts.get() + 1);
            Ok(BackendHandle { pid: 4242 })
        }

        fn stop(&self) {
            self.stops.set(self.stops.get() + 1);
        }
    }

    #[derive(Default)]
    struct FakeWindow {
        created: Cell<bool>,
        refusals_left: Cell<u32>,
        loads: RefCell<Vec<String>>,
        first_loads: Cell<u32>,
    }

    impl WindowHost for FakeWindow {
        fn create_window(&self) -> Result<WindowSession, StartupError> {
            self.created.set(true);
            Ok(WindowSession {
                label: "main".to_string(),
                maximized: false,
                debug_enabled: true,
            })
        }

        fn load(&self, url: &Url) -> Result<(), String> {
            self.loads.borrow_mut().push(url.to_string());
            if self.refusals_left.get() > 0 {
                self.refusals_left.set(self.refusals_left.get() - 1);
                return Err("connection refused".to_string());
            }
            Ok(())
        }

        fn on_first_load(&self, _session: &WindowSession) {
            self.first_loads.set(self.first_loads.get() + 1);
        }
    }

    fn spec() -> BackendLaunchSpec {
        BackendLaunchSpec {
            command: "uv".to_string(),
            args: vec!["run".to_string(), "main.py".to_string()],
            cwd: PathBuf::from("."),
            env: BTreeMap::new(),
            path_override: None,
            output: BackendOutput::Inherit,
            mode: DeploymentMode::Development,
        }
    }

    fn plan(ready_budget_ms: u64) -> StartupPlan {
        StartupPlan {
            readiness: ReadinessPolicy::new(
                Url::parse("http://127.0.0.1:8000/api/health").expect("parse health url"),
                ready_budget_ms,
            ),
            load: LoadPolicy::new(
                Url::parse("http://localhost:3000/").expect("parse start url"),
                60_000,
            ),
        }
    }

    fn healthy(_: &Url, _: Duration) -> ProbeResult {
        ProbeResult::from_status(200)
    }

    #[test]
    fn happy_path_reaches_running_after_retried_load() {
        let coordinator = LifecycleCoordinator::new(quiet);
        let backend = FakeBackend::default();
        let window = FakeWindow {
            refusals_left: Cell::new(2),
            ..FakeWindow::default()
        };
        let clock = FakeClock::new();

        let outcome = coordinator
            .run_startup(|| Ok(spec()), &backend, &window, &healthy, &clock, &plan(30_000))
            .expect("startup succeeds");

        assert!(matches!(outcome, StartupOutcome::Running(_)));
        assert_eq!(coordinator.phase(), LifecyclePhase::Running);
        assert_eq!(backend.starts.get(), 1);
        assert_eq!(window.loads.borrow().len(), 3);
        assert_eq!(window.first_loads.get(), 1);
    }

    #[test]
    fn window_closed_while_running_stops_once_and_exits_zero() {
        let coordinator = LifecycleCoordinator::new(quiet);
        let backend = FakeBackend::default();
        let window = FakeWindow::default();
        let clock = FakeClock::new();
        coordinator
            .run_startup(|| Ok(spec()), &backend, &window, &healthy, &clock, &plan(30_000))
            .expect("startup succeeds");

        assert!(coordinator.request_shutdown(ShutdownTrigger::WindowDestroyed, &backend));
        assert!(!coordinator.request_shutdown(ShutdownTrigger::ExitRequested, &backend));
        assert!(!coordinator.request_shutdown(ShutdownTrigger::RuntimeExit, &backend));

        assert_eq!(backend.stops.get(), 1);
        assert_eq!(coordinator.phase(), LifecyclePhase::Stopped);
        assert_eq!(coordinator.exit_code(), 0);
    }

    #[test]
    fn unhealthy_backend_fails_within_budget_and_is_stopped() {
        let coordinator = LifecycleCoordinator::new(quiet);
        let backend = FakeBackend::default();
        let window = FakeWindow::default();
        let clock = FakeClock::new();
        let unavailable = |_: &Url, _: Duration| ProbeResult::from_status(503);

        let error = coordinator
            .run_startup(|| Ok(spec()), &backend, &window, &unavailable, &clock, &plan(1_000))
            .expect_err("readiness must time out");

        assert!(matches!(error, StartupError::ReadinessTimeout { .. }));
        let elapsed = clock.elapsed();
        assert!(elapsed >= Duration::from_millis(1_000));
        assert!(elapsed <= Duration::from_millis(1_600));
        assert_eq!(coordinator.phase(), LifecyclePhase::Failed { exit_code: 1 });
        assert_ne!(coordinator.exit_code(), 0);
        assert_eq!(backend.stops.get(), 1);
        assert!(!window.created.get());

        // The window-closed path after a failure must not stop again.
        assert!(!coordinator.request_shutdown(ShutdownTrigger::RuntimeExit, &backend));
        assert_eq!(backend.stops.get(), 1);
    }

    #[test]
    fn missing_executable_never_spawns_or_creates_window() {
        let coordinator = LifecycleCoordinator::new(quiet);
        let backend = FakeBackend::default();
        let window = FakeWindow::default();
        let clock = FakeClock::new();

        let error = coordinator
            .run_startup(
                || {
                    Err(StartupError::BackendExecutableMissing {
                        path: PathBuf::from("/opt/app/backend/wechat-backend"),
                    })
                },
                &backend,
                &window,
                &healthy,
                &clock,
                &plan(30_000),
            )
            .expect_err("locate must fail");

        assert!(error.to_string().contains("wechat-backend"));
        assert_eq!(backend.starts.get(), 0);
        assert!(!window.created.get());
        assert_eq!(coordinator.exit_code(), 2);
    }

    #[test]
    fn load_timeout_is_fatal() {
        let coordinator = LifecycleCoordinator::new(quiet);
        let backend = FakeBackend::default();
        let window = FakeWindow {
            refusals_left: Cell::new(u32::MAX),
            ..FakeWindow::default()
        };
        let clock = FakeClock::new();

        let error = coordinator
            .run_startup(|| Ok(spec()), &backend, &window, &healthy, &clock, &plan(30_000))
            .expect_err("load must time out");

        assert!(matches!(error, StartupError::LoadTimeout { .. }));
        assert_eq!(coordinator.phase(), LifecyclePhase::Failed { exit_code: 1 });
        assert_eq!(backend.stops.get(), 1);
        assert_eq!(window.first_loads.get(), 0);
    }

    #[test]
    fn shutdown_during_probing_aborts_before_window() {
        let coordinator = LifecycleCoordinator::new(quiet);
        let backend = FakeBackend::default();
        let window = FakeWindow::default();
        let clock = FakeClock::new();
        let probe = |_: &Url, _: Duration| {
            coordinator.request_shutdown(ShutdownTrigger::ExitRequested, &backend);
            ProbeResult::from_status(200)
        };

        let outcome = coordinator
            .run_startup(|| Ok(spec()), &backend, &window, &probe, &clock, &plan(30_000))
            .expect("aborted startup is not an error");

        assert_eq!(outcome, StartupOutcome::Aborted);
        assert!(!window.created.get());
        assert_eq!(backend.stops.get(), 1);
        assert_eq!(coordinator.exit_code(), 0);
    }

    #[test]
    fn backend_exit_is_classified_by_phase() {
        let coordinator = LifecycleCoordinator::new(quiet);
        let backend = FakeBackend::default();
        let report = ExitReport {
            pid: 4242,
            code: Some(1),
            signal: None,
        };
        assert_eq!(
            coordinator.classify_backend_exit(&report),
            BackendExitKind::DuringStartup
        );

        coordinator
            .run_startup(
                || Ok(spec()),
                &backend,
                &FakeWindow::default(),
                &healthy,
                &FakeClock::new(),
                &plan(30_000),
            )
            .expect("startup succeeds");
        assert_eq!(
            coordinator.classify_backend_exit(&report),
            BackendExitKind::WhileRunning
        );

        coordinator.request_shutdown(ShutdownTrigger::WindowDestroyed, &backend);
        assert_eq!(
            coordinator.classify_backend_exit(&report),
            BackendExitKind::Expected
        );
    }

    #[test]
    fn exit_request_allowance_is_single_use() {
        let coordinator = LifecycleCoordinator::new(quiet);
        assert!(!coordinator.take_exit_request_allowance());
        coordinator.allow_next_exit_request();
        assert!(coordinator.take_exit_request_allowance());
        assert!(!coordinator.take_exit_request_allowance());
    }
}
