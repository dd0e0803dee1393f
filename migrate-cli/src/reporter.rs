//! Diagnostic output channels
//!
//! Commands never print directly. They write to a [`Reporter`], which the
//! binary backs with the console and tests back with a [`CapturingReporter`].

use parking_lot::Mutex;
use std::path::Path;

/// Output channel of a diagnostic line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Info,
    Log,
    Error,
}

/// Sink for user-facing diagnostics
pub trait Reporter: Send + Sync {
    /// Informational line, e.g. which schema file was loaded
    fn info(&self, message: &str);

    /// Command output
    fn log(&self, message: &str);

    /// Failure description
    fn error(&self, message: &str);
}

/// Writes info and log lines to stdout, errors to stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn info(&self, message: &str) {
        println!("{message}");
    }

    fn log(&self, message: &str) {
        println!("{message}");
    }

    fn error(&self, message: &str) {
        eprintln!("{message}");
    }
}

/// Records every line in memory
#[derive(Debug, Default)]
pub struct CapturingReporter {
    lines: Mutex<Vec<(Channel, String)>>,
}

impl CapturingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All lines written to `channel`, oldest first
    pub fn lines(&self, channel: Channel) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, line)| line.clone())
            .collect()
    }

    pub fn info_lines(&self) -> Vec<String> {
        self.lines(Channel::Info)
    }

    pub fn log_lines(&self) -> Vec<String> {
        self.lines(Channel::Log)
    }

    pub fn error_lines(&self) -> Vec<String> {
        self.lines(Channel::Error)
    }

    fn push(&self, channel: Channel, message: &str) {
        self.lines.lock().push((channel, message.to_string()));
    }
}

impl Reporter for CapturingReporter {
    fn info(&self, message: &str) {
        self.push(Channel::Info, message);
    }

    fn log(&self, message: &str) {
        self.push(Channel::Log, message);
    }

    fn error(&self, message: &str) {
        self.push(Channel::Error, message);
    }
}

/// The line announcing which schema file is in use
pub fn schema_loaded(path: &Path) -> String {
    format!("Prisma schema loaded from {}", path.display())
}
