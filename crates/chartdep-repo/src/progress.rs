//! Progress reporting for update runs

use std::fmt;
use std::io::Write;
use std::sync::Mutex;

/// One user-facing progress message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateEvent {
    RefreshStarted,
    RepositoryRefreshed {
        name: String,
    },
    RepositoryRefreshFailed {
        name: String,
        url: String,
        error: String,
    },
    RefreshComplete,
    Saving {
        count: usize,
    },
    Downloading {
        name: String,
        repository: String,
    },
    Archiving {
        name: String,
        path: String,
    },
    DeletingOutdated,
    Removed {
        file: String,
    },
}

impl fmt::Display for UpdateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateEvent::RefreshStarted => {
                write!(f, "Hang tight while we grab the latest from your chart repositories...")
            }
            UpdateEvent::RepositoryRefreshed { name } => write!(
                f,
                "...Successfully got an update from the \"{}\" chart repository",
                name
            ),
            UpdateEvent::RepositoryRefreshFailed { name, url, error } => write!(
                f,
                "...Unable to get an update from the \"{}\" chart repository ({}): {}",
                name, url, error
            ),
            UpdateEvent::RefreshComplete => write!(f, "Update Complete."),
            UpdateEvent::Saving { count } => write!(f, "Saving {} charts", count),
            UpdateEvent::Downloading { name, repository } => {
                write!(f, "Downloading {} from repo {}", name, repository)
            }
            UpdateEvent::Archiving { name, path } => {
                write!(f, "Archiving {} from repo {}", name, path)
            }
            UpdateEvent::DeletingOutdated => write!(f, "Deleting outdated charts"),
            UpdateEvent::Removed { file } => write!(f, "Removed {}", file),
        }
    }
}

/// Receiver of progress events
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: &UpdateEvent);
}

/// Writes one line per event
pub struct WriterSink<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

impl WriterSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ProgressSink for WriterSink<W> {
    fn emit(&self, event: &UpdateEvent) {
        if let Ok(mut out) = self.out.lock() {
            let _ = writeln!(out, "{}", event);
        }
    }
}

/// Forwards events to `tracing` at info level
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn emit(&self, event: &UpdateEvent) {
        tracing::info!("{}", event);
    }
}

/// Keeps every event in memory
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<UpdateEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<UpdateEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Rendered events, one line each
    pub fn lines(&self) -> Vec<String> {
        self.events().iter().map(ToString::to_string).collect()
    }
}

impl ProgressSink for MemorySink {
    fn emit(&self, event: &UpdateEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
