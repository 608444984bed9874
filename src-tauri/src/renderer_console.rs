use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local, SecondsFormat};
use serde::Deserialize;

pub const RENDERER_CONSOLE_LOG_FILE: &str = "renderer-console.log";

const KNOWN_LEVELS: [&str; 5] = ["log", "info", "warn", "error", "debug"];

/// One `console.*` call forwarded by the bridge script.
#[derive(Debug, Clone, Deserialize)]
pub struct RendererConsoleEntry {
    pub level: String,
    pub message: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub line: Option<u32>,
}

pub fn renderer_console_log_path(data_dir: &Path) -> PathBuf {
    data_dir.join(RENDERER_CONSOLE_LOG_FILE)
}

fn normalize_level(raw: &str) -> &str {
    let trimmed = raw.trim();
    KNOWN_LEVELS
        .iter()
        .find(|level| level.eq_ignore_ascii_case(trimmed))
        .copied()
        .unwrap_or("log")
}

pub fn format_renderer_console_line(timestamp: &DateTime<Local>, entry: &RendererConsoleEntry) -> String {
    // A message must stay on one line so the file parses line by line.
    let message = entry.message.replace('\r', "\\r").replace('\n', "\\n");
    let source = entry
        .source
        .as_deref()
        .map(str::trim)
        .filter(|source| !source.is_empty())
        .unwrap_or("unknown");
    format!(
        "[{}] [renderer] level={} {} ({}:{})\n",
        timestamp.to_rfc3339_opts(SecondsFormat::Millis, false),
        normalize_level(&entry.level),
        message,
        source,
        entry.line.unwrap_or(0)
    )
}

/// Opens a console session; written once per main window.
pub fn format_session_header(timestamp: &DateTime<Local>, path: &Path) -> String {
    format!(
        "[{}] [main] renderer console -> {}\n",
        timestamp.to_rfc3339_opts(SecondsFormat::Millis, false),
        path.display()
    )
}

pub fn append_session_header(path: &Path) -> Result<(), String> {
    append_line(path, &format_session_header(&Local::now(), path))
}

/// Appends one entry. The file is never truncated or rotated.
pub fn append_renderer_console_entry(path: &Path, entry: &RendererConsoleEntry) -> Result<(), String> {
    append_line(path, &format_renderer_console_line(&Local::now(), entry))
}

fn append_line(path: &Path, line: &str) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|error| format!("failed to create {}: {error}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| file.write_all(line.as_bytes()))
        .map_err(|error| format!("failed to append to {}: {error}", path.display()))
}
