use std::{
    cell::RefCell,
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use jiff::Zoned;
use log::Level;

/// Where the ingestion loop reports what happened to each file.
pub trait EventLog {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// Append-only log file with lines like
/// `2024-03-01 10:15:02,117 - WARNING - No CSV found in https://...`.
///
/// Every event is also passed on to the `log` facade.
#[derive(Debug)]
pub struct FileEventLog {
    path: PathBuf,
    file: File,
}

impl FileEventLog {
    /// Open the log file for appending, creating it (and its directory) if needed.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(FileEventLog {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, level: Level, message: &str) {
        log::log!(level, "{}", message);
        let line = format_line(&Zoned::now(), level, message);
        if let Err(e) = (&self.file).write_all(line.as_bytes()) {
            log::error!("failed to write to log file {}: {}", self.path.display(), e);
        }
    }
}

impl EventLog for FileEventLog {
    fn info(&self, message: &str) {
        self.append(Level::Info, message);
    }

    fn warn(&self, message: &str) {
        self.append(Level::Warn, message);
    }

    fn error(&self, message: &str) {
        self.append(Level::Error, message);
    }
}

/// Keeps events in memory, handy to inspect what a run reported.
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    events: RefCell<Vec<(Level, String)>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(Level, String)> {
        self.events.borrow().clone()
    }
}

impl EventLog for MemoryEventLog {
    fn info(&self, message: &str) {
        self.events.borrow_mut().push((Level::Info, message.to_string()));
    }

    fn warn(&self, message: &str) {
        self.events.borrow_mut().push((Level::Warn, message.to_string()));
    }

    fn error(&self, message: &str) {
        self.events.borrow_mut().push((Level::Error, message.to_string()));
    }
}

pub fn level_name(level: Level) -> &'static str {
    match level {
        Level::Warn => "WARNING",
        level => level.as_str(),
    }
}

/// One line of the log file, newline included.
pub fn format_line(now: &Zoned, level: Level, message: &str) -> String {
    format!(
        "{},{:03} - {} - {}\n",
        now.strftime("%Y-%m-%d %H:%M:%S"),
        now.subsec_nanosecond() / 1_000_000,
        level_name(level),
        message
    )
}
