use std::{env, net::Ipv6Addr, path::PathBuf};

use url::Url;

use crate::startup_error::StartupError;

pub const HOST_ENV: &str = "WECHAT_TOOL_HOST";
pub const PORT_ENV: &str = "WECHAT_TOOL_PORT";
pub const UI_DIR_ENV: &str = "WECHAT_TOOL_UI_DIR";
pub const DATA_DIR_ENV: &str = "WECHAT_TOOL_DATA_DIR";
pub const BACKEND_EXE_ENV: &str = "WECHAT_TOOL_BACKEND_EXE";
pub const PROJECT_ROOT_ENV: &str = "WECHAT_TOOL_PROJECT_ROOT";
pub const BACKEND_CMD_ENV: &str = "WECHAT_DESKTOP_BACKEND_CMD";
pub const START_URL_ENV: &str = "WECHAT_DESKTOP_START_URL";
pub const DEBUG_ENV: &str = "WECHAT_DESKTOP_DEBUG";
pub const MODE_ENV: &str = "WECHAT_DESKTOP_MODE";
pub const READY_TIMEOUT_ENV: &str = "WECHAT_DESKTOP_READY_TIMEOUT_MS";
pub const LOAD_TIMEOUT_ENV: &str = "WECHAT_DESKTOP_LOAD_TIMEOUT_MS";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEV_FRONTEND_URL: &str = "http://localhost:3000";
pub const HEALTH_PATH: &str = "api/health";

pub const DEFAULT_READY_TIMEOUT_MS: u64 = 30_000;
pub const READY_TIMEOUT_MIN_MS: u64 = 1_000;
pub const READY_TIMEOUT_MAX_MS: u64 = 10 * 60 * 1000;
pub const DEFAULT_LOAD_TIMEOUT_MS: u64 = 60_000;
pub const LOAD_TIMEOUT_MIN_MS: u64 = 1_000;
pub const LOAD_TIMEOUT_MAX_MS: u64 = 10 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentMode {
    Development,
    Packaged,
}

impl DeploymentMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Packaged => "packaged",
        }
    }

    pub fn is_packaged(self) -> bool {
        self == Self::Packaged
    }
}

#[derive(Debug, Clone)]
pub struct ShellConfig {
    pub mode: DeploymentMode,
    pub host: String,
    pub port: u16,
    pub backend_cmd_override: Option<String>,
    pub backend_exe_override: Option<PathBuf>,
    pub data_dir_override: Option<PathBuf>,
    pub ui_dir_override: Option<PathBuf>,
    pub project_root_override: Option<PathBuf>,
    pub start_url_override: Option<String>,
    pub debug_enabled: bool,
    pub ready_timeout_ms: u64,
    pub load_timeout_ms: u64,
}

impl ShellConfig {
    pub fn from_env<F>(log: F) -> Result<Self, StartupError>
    where
        F: FnMut(String),
    {
        Self::from_lookup(
            |name| env::var(name).ok(),
            cfg!(debug_assertions),
            log,
        )
    }

    pub fn from_lookup<L, F>(lookup: L, debug_build: bool, mut log: F) -> Result<Self, StartupError>
    where
        L: Fn(&str) -> Option<String>,
        F: FnMut(String),
    {
        let non_empty = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mode = resolve_deployment_mode(non_empty(MODE_ENV).as_deref(), debug_build, &mut log);
        let host = non_empty(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match non_empty(PORT_ENV) {
            Some(raw) => parse_port(&raw, PORT_ENV)?,
            None => DEFAULT_PORT,
        };
        let debug_enabled = resolve_debug_enabled(mode, non_empty(DEBUG_ENV).as_deref());

        let ready_timeout_ms = match non_empty(READY_TIMEOUT_ENV) {
            Some(raw) => parse_clamped_timeout_env(
                &raw,
                READY_TIMEOUT_ENV,
                DEFAULT_READY_TIMEOUT_MS,
                READY_TIMEOUT_MIN_MS,
                READY_TIMEOUT_MAX_MS,
                &mut log,
            ),
            None => DEFAULT_READY_TIMEOUT_MS,
        };
        let load_timeout_ms = match non_empty(LOAD_TIMEOUT_ENV) {
            Some(raw) => parse_clamped_timeout_env(
                &raw,
                LOAD_TIMEOUT_ENV,
                DEFAULT_LOAD_TIMEOUT_MS,
                LOAD_TIMEOUT_MIN_MS,
                LOAD_TIMEOUT_MAX_MS,
                &mut log,
            ),
            None => DEFAULT_LOAD_TIMEOUT_MS,
        };

        let config = Self {
            mode,
            host,
            port,
            backend_cmd_override: non_empty(BACKEND_CMD_ENV),
            backend_exe_override: non_empty(BACKEND_EXE_ENV).map(PathBuf::from),
            data_dir_override: non_empty(DATA_DIR_ENV).map(PathBuf::from),
            ui_dir_override: non_empty(UI_DIR_ENV).map(PathBuf::from),
            project_root_override: non_empty(PROJECT_ROOT_ENV).map(PathBuf::from),
            start_url_override: non_empty(START_URL_ENV),
            debug_enabled,
            ready_timeout_ms,
            load_timeout_ms,
        };
        // Reject a host that cannot form a URL before anything is spawned.
        config.backend_base_url()?;
        Ok(config)
    }

    pub fn backend_base_url(&self) -> Result<Url, StartupError> {
        let host = match self.host.parse::<Ipv6Addr>() {
            Ok(_) => format!("[{}]", self.host),
            Err(_) => self.host.clone(),
        };
        Url::parse(&format!("http://{host}:{}/", self.port))
            .map_err(|error| StartupError::InvalidAddress(format!("{host}:{}: {error}", self.port)))
    }

    pub fn health_url(&self) -> Result<Url, StartupError> {
        let base = self.backend_base_url()?;
        base.join(HEALTH_PATH)
            .map_err(|error| StartupError::InvalidAddress(format!("{base}{HEALTH_PATH}: {error}")))
    }

    /// Page the main window loads once the backend is ready: the explicit
    /// override, the backend-served UI in packaged builds, or the frontend dev
    /// server otherwise.
    pub fn start_url(&self) -> Result<Url, StartupError> {
        if let Some(raw) = &self.start_url_override {
            return Url::parse(raw)
                .map_err(|error| StartupError::InvalidAddress(format!("{START_URL_ENV}={raw}: {error}")));
        }
        if self.mode.is_packaged() {
            return self.backend_base_url();
        }
        Url::parse(DEV_FRONTEND_URL)
            .map_err(|error| StartupError::InvalidAddress(format!("{DEV_FRONTEND_URL}: {error}")))
    }
}

pub fn resolve_deployment_mode<F>(raw: Option<&str>, debug_build: bool, mut log: F) -> DeploymentMode
where
    F: FnMut(String),
{
    let detected = if debug_build {
        DeploymentMode::Development
    } else {
        DeploymentMode::Packaged
    };
    match raw {
        None => detected,
        Some(value) if value.eq_ignore_ascii_case("packaged") => DeploymentMode::Packaged,
        Some(value) if value.eq_ignore_ascii_case("development") || value.eq_ignore_ascii_case("dev") => {
            DeploymentMode::Development
        }
        Some(value) => {
            log(format!(
                "invalid {MODE_ENV}='{value}', fallback to {}",
                detected.as_str()
            ));
            detected
        }
    }
}

pub fn resolve_debug_enabled(mode: DeploymentMode, raw: Option<&str>) -> bool {
    match mode {
        DeploymentMode::Development => raw != Some("0"),
        DeploymentMode::Packaged => raw == Some("1"),
    }
}

pub fn parse_port(raw: &str, env_name: &'static str) -> Result<u16, StartupError> {
    match raw.trim().parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(StartupError::InvalidPort {
            env_name,
            raw: raw.to_string(),
        }),
    }
}

pub fn parse_clamped_timeout_env<F>(
    raw: &str,
    env_name: &str,
    fallback_ms: u64,
    min_ms: u64,
    max_ms: u64,
    mut log: F,
) -> u64
where
    F: FnMut(String),
{
    match raw.trim().parse::<u128>() {
        Ok(parsed) if parsed > 0 => {
            if parsed < min_ms as u128 {
                log(format!(
                    "{}='{}' is below minimum {}ms, clamped to {}ms",
                    env_name, raw, min_ms, min_ms
                ));
                min_ms
            } else if parsed > max_ms as u128 {
                log(format!(
                    "{}='{}' is above maximum {}ms, clamped to {}ms",
                    env_name, raw, max_ms, max_ms
                ));
                max_ms
            } else {
                parsed as u64
            }
        }
        _ => {
            log(format!(
                "invalid {}='{}', fallback to {}ms",
                env_name, raw, fallback_ms
            ));
            fallback_ms
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)], debug_build: bool) -> Result<ShellConfig, StartupError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        ShellConfig::from_lookup(|name| vars.get(name).cloned(), debug_build, |_| {})
    }

    #[test]
    fn parse_clamped_timeout_returns_value_in_range() {
        let value = parse_clamped_timeout_env("1200", "TEST_ENV", 500, 100, 5_000, |_| {});
        assert_eq!(value, 1200);
    }

    #[test]
    fn parse_clamped_timeout_clamps_too_small_value() {
        let mut logs = Vec::new();
        let value = parse_clamped_timeout_env("20", "TEST_ENV", 500, 100, 5_000, |message| {
            logs.push(message)
        });
        assert_eq!(value, 100);
        assert!(logs.iter().any(|line| line.contains("below minimum")));
    }

    #[test]
    fn parse_clamped_timeout_falls_back_on_invalid_value() {
        let mut logs = Vec::new();
        let value = parse_clamped_timeout_env("invalid", "TEST_ENV", 500, 100, 5_000, |message| {
            logs.push(message)
        });
        assert_eq!(value, 500);
        assert!(logs.iter().any(|line| line.contains("invalid TEST_ENV")));
    }

    #[test]
    fn defaults_match_backend_entry_point() {
        let config = config_from(&[], true).expect("default config");
        assert_eq!(config.mode, DeploymentMode::Development);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8000);
        assert!(config.debug_enabled);
        assert_eq!(config.ready_timeout_ms, DEFAULT_READY_TIMEOUT_MS);
        assert_eq!(config.load_timeout_ms, DEFAULT_LOAD_TIMEOUT_MS);
        assert_eq!(
            config.health_url().expect("health url").as_str(),
            "http://127.0.0.1:8000/api/health"
        );
        assert_eq!(
            config.start_url().expect("start url").as_str(),
            "http://localhost:3000/"
        );
    }

    #[test]
    fn malformed_port_is_a_configuration_error() {
        for raw in ["abc", "0", "70000", "-1"] {
            let error = config_from(&[(PORT_ENV, raw)], true).expect_err("port must be rejected");
            assert!(matches!(error, StartupError::InvalidPort { .. }), "{raw}: {error}");
        }
    }

    #[test]
    fn packaged_builds_require_explicit_debug_opt_in() {
        let quiet = config_from(&[], false).expect("packaged config");
        assert_eq!(quiet.mode, DeploymentMode::Packaged);
        assert!(!quiet.debug_enabled);

        let opted_in = config_from(&[(DEBUG_ENV, "1")], false).expect("packaged debug config");
        assert!(opted_in.debug_enabled);
    }

    #[test]
    fn packaged_start_url_points_at_backend() {
        let config = config_from(&[(HOST_ENV, "::1"), (PORT_ENV, "8123")], false)
            .expect("ipv6 config");
        assert_eq!(
            config.start_url().expect("start url").as_str(),
            "http://[::1]:8123/"
        );
    }

    #[test]
    fn start_url_override_wins() {
        let config = config_from(
            &[(START_URL_ENV, "http://127.0.0.1:4000/chat"), (MODE_ENV, "packaged")],
            true,
        )
        .expect("override config");
        assert_eq!(config.mode, DeploymentMode::Packaged);
        assert_eq!(
            config.start_url().expect("start url").as_str(),
            "http://127.0.0.1:4000/chat"
        );
    }

    #[test]
    fn unknown_mode_falls_back_to_build_detection() {
        let mut logs = Vec::new();
        let mode = resolve_deployment_mode(Some("staging"), false, |line| logs.push(line));
        assert_eq!(mode, DeploymentMode::Packaged);
        assert!(logs.iter().any(|line| line.contains("invalid WECHAT_DESKTOP_MODE")));
    }
}
