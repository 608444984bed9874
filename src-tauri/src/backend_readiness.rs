use std::{
    fmt, thread,
    time::{Duration, Instant},
};

use url::Url;

pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 1_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 300;

/// Time source for the polling loops. Production uses [`SystemClock`];
/// tests drive virtual time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Ready(u16),
    ServerError(u16),
    Unreachable(String),
}

impl ProbeResult {
    /// Anything below 500 means the backend is answering HTTP, even a 404
    /// from an older build without the health route.
    pub fn from_status(status: u16) -> Self {
        if (200..500).contains(&status) {
            Self::Ready(status)
        } else {
            Self::ServerError(status)
        }
    }
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(status) => write!(f, "ready (HTTP {status})"),
            Self::ServerError(status) => write!(f, "not ready (HTTP {status})"),
            Self::Unreachable(reason) => write!(f, "unreachable ({reason})"),
        }
    }
}

pub trait HealthProbe {
    fn probe(&self, url: &Url, timeout: Duration) -> ProbeResult;
}

impl<F> HealthProbe for F
where
    F: Fn(&Url, Duration) -> ProbeResult,
{
    fn probe(&self, url: &Url, timeout: Duration) -> ProbeResult {
        self(url, timeout)
    }
}

#[derive(Debug, Clone)]
pub struct ReadinessPolicy {
    pub url: Url,
    pub probe_timeout: Duration,
    pub poll_interval: Duration,
    pub budget: Duration,
}

impl ReadinessPolicy {
    pub fn new(url: Url, budget_ms: u64) -> Self {
        Self {
            url,
            probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            budget: Duration::from_millis(budget_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessOutcome {
    Ready {
        status: u16,
        attempts: u32,
        elapsed: Duration,
    },
    TimedOut {
        attempts: u32,
        elapsed: Duration,
        last: ProbeResult,
    },
}

/// Polls `policy.url` until it answers below 500 or the budget runs out.
/// The budget is checked after every probe, so the worst case overshoots it
/// by one probe timeout plus one poll interval.
pub fn wait_until_ready<P, C, F>(
    probe: &P,
    clock: &C,
    policy: &ReadinessPolicy,
    log: F,
) -> ReadinessOutcome
where
    P: HealthProbe + ?Sized,
    C: Clock + ?Sized,
    F: Fn(&str),
{
    let started = clock.now();
    let mut attempts = 0_u32;
    let mut last_logged: Option<ProbeResult> = None;

    loop {
        attempts += 1;
        let result = probe.probe(&policy.url, policy.probe_timeout);
        let elapsed = clock.now().saturating_duration_since(started);
        if let ProbeResult::Ready(status) = result {
            return ReadinessOutcome::Ready {
                status,
                attempts,
                elapsed,
            };
        }

        if last_logged.as_ref() != Some(&result) {
            log(&format!("backend not ready yet: {result}"));
            last_logged = Some(result.clone());
        }

        if elapsed >= policy.budget {
            return ReadinessOutcome::TimedOut {
                attempts,
                elapsed,
                last: result,
            };
        }

        clock.sleep(policy.poll_interval);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// Virtual clock: `sleep` advances time instantly.
    pub(crate) struct FakeClock {
        origin: Instant,
        offset: Mutex<Duration>,
    }

    impl FakeClock {
        pub(crate) fn new() -> Self {
            Self {
                origin: Instant::now(),
                offset: Mutex::new(Duration::ZERO),
            }
        }

        pub(crate) fn advance(&self, duration: Duration) {
            *self.offset.lock().expect("lock fake clock") += duration;
        }

        pub(crate) fn elapsed(&self) -> Duration {
            *self.offset.lock().expect("lock fake clock")
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            self.origin + self.elapsed()
        }

        fn sleep(&self, duration: Duration) {
            self.advance(duration);
        }
    }
}
