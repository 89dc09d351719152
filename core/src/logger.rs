//! Kernel log
//!
//! In-process ring buffer of human-readable log lines, optionally mirrored to
//! a file. `WriteLog` kernel outputs land here; so do the `*_log!` macros.
//! Diagnostics meant for operators go through `tracing` instead.

use chrono::Local;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::config::LoggingConfig;
use crate::kernel::LogLevel;

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: LogLevel,
    pub module: String,
    pub message: String,
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] [{}] [{}] {}",
            self.timestamp,
            self.level.as_str(),
            self.module,
            self.message
        )
    }
}

pub struct KernelLog {
    ring_buffer: VecDeque<LogEntry>,
    max_entries: usize,
    file_path: Option<PathBuf>,
}

static LOG: OnceLock<Mutex<KernelLog>> = OnceLock::new();

fn global() -> &'static Mutex<KernelLog> {
    LOG.get_or_init(|| Mutex::new(KernelLog::new(LoggingConfig::default().ring_buffer_size)))
}

impl KernelLog {
    pub fn new(max_entries: usize) -> Self {
        let max_entries = max_entries.max(1);
        Self {
            ring_buffer: VecDeque::with_capacity(max_entries.min(1024)),
            max_entries,
            file_path: None,
        }
    }

    pub fn set_file_path(&mut self, path: PathBuf) {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        self.file_path = Some(path);
    }

    pub fn set_capacity(&mut self, max_entries: usize) {
        self.max_entries = max_entries.max(1);
        while self.ring_buffer.len() > self.max_entries {
            self.ring_buffer.pop_front();
        }
    }

    pub fn log(&mut self, level: LogLevel, module: &str, message: &str) {
        let entry = LogEntry {
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
            level,
            module: module.to_string(),
            message: message.to_string(),
        };

        if let Some(path) = &self.file_path {
            if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
                let _ = writeln!(file, "{}", entry);
            }
        }

        if self.ring_buffer.len() >= self.max_entries {
            self.ring_buffer.pop_front();
        }
        self.ring_buffer.push_back(entry);
    }

    /// Newest first
    pub fn recent(&self, n: usize) -> Vec<LogEntry> {
        self.ring_buffer.iter().rev().take(n).cloned().collect()
    }
}

/// Apply logging config to the process-wide kernel log
pub fn init(config: &LoggingConfig) {
    let mut log = global().lock();
    log.set_capacity(config.ring_buffer_size);
    if let Some(path) = &config.log_file {
        log.set_file_path(path.clone());
    }
}

pub fn log(level: LogLevel, module: &str, message: impl Into<String>) {
    global().lock().log(level, module, &message.into());
}

/// Most recent kernel log lines, newest first
pub fn recent_logs(n: usize) -> Vec<LogEntry> {
    global().lock().recent(n)
}

#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        $crate::logger::log($crate::kernel::LogLevel::Debug, module_path!(), format!($($arg)*));
    };
}

#[macro_export]
macro_rules! info_log {
    ($($arg:tt)*) => {
        $crate::logger::log($crate::kernel::LogLevel::Info, module_path!(), format!($($arg)*));
    };
}

#[macro_export]
macro_rules! warn_log {
    ($($arg:tt)*) => {
        $crate::logger::log($crate::kernel::LogLevel::Warn, module_path!(), format!($($arg)*));
    };
}

#[macro_export]
macro_rules! error_log {
    ($($arg:tt)*) => {
        $crate::logger::log($crate::kernel::LogLevel::Error, module_path!(), format!($($arg)*));
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let mut log = KernelLog::new(2);
        log.log(LogLevel::Info, "t", "one");
        log.log(LogLevel::Warn, "t", "two");
        log.log(LogLevel::Error, "t", "three");

        let recent = log.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "three");
        assert_eq!(recent[1].message, "two");
    }

    #[test]
    fn test_file_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("kernel.log");
        let mut log = KernelLog::new(4);
        log.set_file_path(path.clone());
        log.log(LogLevel::Info, "animus_core::test", "sleep started");

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("[INFO] [animus_core::test] sleep started"));
    }

    #[test]
    fn test_macros_reach_global_log() {
        crate::info_log!("macro line {}", 42);
        assert!(recent_logs(50).iter().any(|e| e.message == "macro line 42"));
    }
}
