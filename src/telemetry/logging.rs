//! Logging
//!
//! Structured logging for device authorization operations.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "TRACE"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Short, non-reversible identifier for a secret (device code, state, token).
pub fn fingerprint(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    hex::encode(&digest[..6])
}

/// Log context.
#[derive(Debug, Clone, Default)]
pub struct DeviceAuthLogContext {
    /// Provider name.
    pub provider: Option<String>,
    /// Operation name.
    pub operation: Option<String>,
    /// Fingerprint of the device code involved.
    pub session: Option<String>,
    /// Additional context.
    pub extra: BTreeMap<String, String>,
}

impl DeviceAuthLogContext {
    /// Create new log context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set provider.
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Set operation.
    pub fn operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Identify the session by a fingerprint of its device code.
    pub fn device_code(mut self, device_code: &str) -> Self {
        self.session = Some(fingerprint(device_code));
        self
    }

    /// Add extra context.
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    fn extra_fields(&self) -> String {
        self.extra
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Logger interface.
pub trait Logger: Send + Sync {
    fn trace(&self, message: &str, context: &DeviceAuthLogContext);

    fn debug(&self, message: &str, context: &DeviceAuthLogContext);

    fn info(&self, message: &str, context: &DeviceAuthLogContext);

    fn warn(&self, message: &str, context: &DeviceAuthLogContext);

    fn error(&self, message: &str, context: &DeviceAuthLogContext);
}

/// No-op logger implementation.
pub struct NoOpLogger;

impl Logger for NoOpLogger {
    fn trace(&self, _message: &str, _context: &DeviceAuthLogContext) {}
    fn debug(&self, _message: &str, _context: &DeviceAuthLogContext) {}
    fn info(&self, _message: &str, _context: &DeviceAuthLogContext) {}
    fn warn(&self, _message: &str, _context: &DeviceAuthLogContext) {}
    fn error(&self, _message: &str, _context: &DeviceAuthLogContext) {}
}

/// Logger forwarding to the `tracing` ecosystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

macro_rules! forward {
    ($level:ident, $message:expr, $context:expr) => {
        tracing::$level!(
            provider = $context.provider.as_deref().unwrap_or("-"),
            operation = $context.operation.as_deref().unwrap_or("-"),
            session = $context.session.as_deref().unwrap_or("-"),
            extra = %$context.extra_fields(),
            "{}",
            $message
        )
    };
}

impl Logger for TracingLogger {
    fn trace(&self, message: &str, context: &DeviceAuthLogContext) {
        forward!(trace, message, context);
    }

    fn debug(&self, message: &str, context: &DeviceAuthLogContext) {
        forward!(debug, message, context);
    }

    fn info(&self, message: &str, context: &DeviceAuthLogContext) {
        forward!(info, message, context);
    }

    fn warn(&self, message: &str, context: &DeviceAuthLogContext) {
        forward!(warn, message, context);
    }

    fn error(&self, message: &str, context: &DeviceAuthLogContext) {
        forward!(error, message, context);
    }
}

/// Log entry for in-memory storage.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub context: DeviceAuthLogContext,
}

/// In-memory logger for testing.
pub struct InMemoryLogger {
    entries: Mutex<Vec<LogEntry>>,
    min_level: LogLevel,
}

impl InMemoryLogger {
    /// Create new in-memory logger.
    pub fn new() -> Self {
        Self::with_level(LogLevel::Trace)
    }

    /// Create in-memory logger with minimum level.
    pub fn with_level(min_level: LogLevel) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            min_level,
        }
    }

    /// Get all log entries.
    pub fn get_entries(&self) -> Vec<LogEntry> {
        self.lock().clone()
    }

    /// Get entries by level.
    pub fn get_entries_by_level(&self, level: LogLevel) -> Vec<LogEntry> {
        self.lock()
            .iter()
            .filter(|e| e.level == level)
            .cloned()
            .collect()
    }

    /// Check whether any message or context field contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lock().iter().any(|e| {
            e.message.contains(needle)
                || e.context.session.as_deref().unwrap_or("").contains(needle)
                || e.context.extra.values().any(|v| v.contains(needle))
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LogEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn log(&self, level: LogLevel, message: &str, context: &DeviceAuthLogContext) {
        if level >= self.min_level {
            self.lock().push(LogEntry {
                level,
                message: message.to_string(),
                context: context.clone(),
            });
        }
    }
}

impl Default for InMemoryLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger for InMemoryLogger {
    fn trace(&self, message: &str, context: &DeviceAuthLogContext) {
        self.log(LogLevel::Trace, message, context);
    }

    fn debug(&self, message: &str, context: &DeviceAuthLogContext) {
        self.log(LogLevel::Debug, message, context);
    }

    fn info(&self, message: &str, context: &DeviceAuthLogContext) {
        self.log(LogLevel::Info, message, context);
    }

    fn warn(&self, message: &str, context: &DeviceAuthLogContext) {
        self.log(LogLevel::Warn, message, context);
    }

    fn error(&self, message: &str, context: &DeviceAuthLogContext) {
        self.log(LogLevel::Error, message, context);
    }
}
