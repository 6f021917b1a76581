//! Decoupled logging pipeline for packaging runs.
//!
//! Every line a step prints, and every `log::*` record once the collector is
//! installed as the global logger, is persisted to disk by a background
//! thread. The build never blocks on disk I/O.
//!
//! # Architecture
//!
//! ```text
//! Step output / log::info!()
//!     |
//! [LogCollector] (non-blocking send)
//!     | (crossbeam unbounded channel)
//!     v
//! [DiskPersister thread] ----> terminal echo (optional)
//!     |
//! logs/full/<ts>_full.log
//! logs/parsed/<ts>_parsed.log   (milestones only)
//! ```

use chrono::Local;
use crossbeam_channel::{unbounded, Sender};
use log::{Log, Metadata, Record};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Internal log line or special marker
enum LogMessage {
    Line(LogLine),
    /// Flush marker with channel sender to signal completion
    Flush(std::sync::mpsc::Sender<()>),
}

/// Which log file a line belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogKind {
    /// Everything
    Full,
    /// High-level milestones; also written to the full log
    Parsed,
}

impl LogKind {
    fn dir_name(&self) -> &'static str {
        match self {
            LogKind::Full => "full",
            LogKind::Parsed => "parsed",
        }
    }
}

/// Session state with generation tracking for detecting session changes
#[derive(Clone, Debug, Default)]
struct SessionState {
    /// Dedicated full-log path for the current run
    path: Option<PathBuf>,
    /// Incremented on every new session so the writer reopens its files
    generation: u64,
}

/// A log line with metadata
#[derive(Clone, Debug)]
pub struct LogLine {
    pub message: String,
    pub kind: LogKind,
    /// Wall-clock time the line was created
    pub timestamp: String,
}

impl LogLine {
    pub fn new(message: String) -> Self {
        LogLine {
            message,
            kind: LogKind::Full,
            timestamp: Local::now().format("%H:%M:%S%.3f").to_string(),
        }
    }

    pub fn parsed(message: String) -> Self {
        LogLine {
            kind: LogKind::Parsed,
            ..LogLine::new(message)
        }
    }

    fn formatted(&self) -> String {
        format!("[{}] {}\n", self.timestamp, self.message)
    }
}

/// Unified logger that persists to disk and optionally echoes to the terminal
#[derive(Clone)]
pub struct LogCollector {
    tx: Sender<LogMessage>,
    log_dir: PathBuf,
    session_state: Arc<Mutex<SessionState>>,
}

impl LogCollector {
    /// Create the `full/` and `parsed/` directories and start the writer thread.
    ///
    /// With `echo` set, every line is also printed to stderr.
    pub fn new(log_dir: PathBuf, echo: bool) -> io::Result<Self> {
        std::fs::create_dir_all(log_dir.join(LogKind::Full.dir_name()))?;
        std::fs::create_dir_all(log_dir.join(LogKind::Parsed.dir_name()))?;

        let (tx, rx) = unbounded::<LogMessage>();
        let session_state = Arc::new(Mutex::new(SessionState::default()));

        let writer_dir = log_dir.clone();
        let writer_session = Arc::clone(&session_state);

        // OS thread rather than a tokio task: it must keep draining even
        // while the runtime is shutting down.
        std::thread::spawn(move || {
            let mut files: HashMap<LogKind, File> = HashMap::new();
            let mut seen_generation = 0_u64;

            while let Ok(msg) = rx.recv() {
                match msg {
                    LogMessage::Line(line) => {
                        let session_path = match writer_session.lock() {
                            Ok(session) => {
                                if session.generation != seen_generation {
                                    files.clear();
                                    seen_generation = session.generation;
                                }
                                session.path.clone()
                            }
                            Err(_) => None,
                        };

                        let formatted = line.formatted();
                        if echo {
                            eprint!("{}", formatted);
                        }

                        let mut kinds = vec![LogKind::Full];
                        if line.kind == LogKind::Parsed {
                            kinds.push(LogKind::Parsed);
                        }

                        for kind in kinds {
                            if !files.contains_key(&kind) {
                                let path = match (kind, &session_path) {
                                    (LogKind::Full, Some(p)) => Some(p.clone()),
                                    (LogKind::Parsed, Some(p)) => Some(parsed_path_for(&writer_dir, p)),
                                    _ => get_or_create_latest_log(&writer_dir.join(kind.dir_name()), kind).ok(),
                                };
                                if let Some(path) = path {
                                    if let Ok(file) = OpenOptions::new().create(true).append(true).open(&path) {
                                        files.insert(kind, file);
                                    }
                                }
                            }
                            if let Some(file) = files.get_mut(&kind) {
                                let _ = file.write_all(formatted.as_bytes());
                            }
                        }
                    }
                    LogMessage::Flush(done) => {
                        for file in files.values_mut() {
                            let _ = file.flush();
                            let _ = file.sync_data();
                        }
                        let _ = done.send(());
                    }
                }
            }
        });

        Ok(LogCollector {
            tx,
            log_dir,
            session_state,
        })
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Start a new session with a dedicated full log file.
    ///
    /// Bumps the generation so the writer thread reopens its handles.
    pub fn start_new_session(&self, filename: &str) -> io::Result<PathBuf> {
        let log_path = self.log_dir.join(LogKind::Full.dir_name()).join(filename);

        let mut session = self
            .session_state
            .lock()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        session.path = Some(log_path.clone());
        session.generation = session.generation.wrapping_add(1);

        Ok(log_path)
    }

    /// Get the current session log file path
    pub fn session_log_path(&self) -> Option<PathBuf> {
        self.session_state
            .lock()
            .ok()
            .and_then(|session| session.path.clone())
    }

    /// Send a log line. Never blocks.
    pub fn log(&self, line: LogLine) {
        let _ = self.tx.send(LogMessage::Line(line));
    }

    pub fn log_str(&self, message: impl Into<String>) {
        self.log(LogLine::new(message.into()));
    }

    /// Send a milestone line.
    pub fn log_parsed(&self, message: impl Into<String>) {
        self.log(LogLine::parsed(message.into()));
    }

    /// Wait until every line sent before this call is on disk.
    pub async fn wait_for_empty(&self) -> io::Result<()> {
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();
        self.tx
            .send(LogMessage::Flush(done_tx))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "log writer stopped"))?;

        tokio::task::spawn_blocking(move || done_rx.recv())
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "flush signal interrupted"))
    }
}

/// Wires `log::info!()` and friends into the collector.
impl Log for LogCollector {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let message = format!("[{}] {}", record.level(), record.args());
        if record.target() == "parsed" {
            self.log_parsed(message);
        } else {
            self.log_str(message);
        }
    }

    fn flush(&self) {}
}

/// Parsed-log path paired with a session's full-log path.
fn parsed_path_for(log_dir: &Path, full_path: &Path) -> PathBuf {
    let stem = full_path
        .file_stem()
        .map(|s| s.to_string_lossy().replace("_full", ""))
        .unwrap_or_else(|| "session".to_string());
    log_dir
        .join(LogKind::Parsed.dir_name())
        .join(format!("{}_parsed.log", stem))
}

/// Get the latest log file, or create a new one if none exist
fn get_or_create_latest_log(dir: &Path, kind: LogKind) -> io::Result<PathBuf> {
    if let Ok(entries) = std::fs::read_dir(dir) {
        let latest = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map_or(false, |ext| ext == "log"))
            .max_by_key(|e| e.metadata().ok().and_then(|m| m.modified().ok()));
        if let Some(entry) = latest {
            return Ok(entry.path());
        }
    }

    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("{}_{}.log", timestamp, kind.dir_name()));
    File::create(&path)?;
    Ok(path)
}

/// Session log file name for a run starting now.
pub fn session_file_name() -> String {
    format!("{}_full.log", Local::now().format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_log_collector_creates_directories() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let logs = dir.path().join("logs");

        LogCollector::new(logs.clone(), false).expect("collector");

        assert!(logs.join("full").is_dir());
        assert!(logs.join("parsed").is_dir());
    }

    #[tokio::test]
    async fn test_session_routes_full_and_parsed() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let collector = LogCollector::new(dir.path().to_path_buf(), false).expect("collector");

        let full = collector
            .start_new_session("20260101_000000_full.log")
            .expect("session");
        collector.log_str("go test ./...");
        collector.log_parsed("Package bn256 passed");
        collector.wait_for_empty().await.expect("flush");

        let full_content = fs::read_to_string(&full).expect("full log");
        assert!(full_content.contains("go test ./..."));
        assert!(full_content.contains("Package bn256 passed"));

        let parsed = dir.path().join("parsed/20260101_000000_parsed.log");
        let parsed_content = fs::read_to_string(parsed).expect("parsed log");
        assert!(parsed_content.contains("Package bn256 passed"));
        assert!(!parsed_content.contains("go test ./..."));
    }

    #[tokio::test]
    async fn test_new_session_switches_files() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let collector = LogCollector::new(dir.path().to_path_buf(), false).expect("collector");

        let first = collector.start_new_session("a_full.log").unwrap();
        collector.log_str("first run");
        collector.wait_for_empty().await.unwrap();

        let second = collector.start_new_session("b_full.log").unwrap();
        collector.log_str("second run");
        collector.wait_for_empty().await.unwrap();

        let a = fs::read_to_string(first).unwrap();
        let b = fs::read_to_string(second).unwrap();
        assert!(a.contains("first run") && !a.contains("second run"));
        assert!(b.contains("second run") && !b.contains("first run"));
        assert_eq!(
            collector.session_log_path(),
            Some(dir.path().join("full/b_full.log"))
        );
    }

    #[tokio::test]
    async fn test_without_session_uses_latest_log() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let collector = LogCollector::new(dir.path().to_path_buf(), false).expect("collector");

        for i in 0..100 {
            collector.log_str(format!("Log message {}", i));
        }
        collector.wait_for_empty().await.unwrap();

        let files: Vec<_> = fs::read_dir(dir.path().join("full"))
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(files.len(), 1);
        let content = fs::read_to_string(files[0].path()).unwrap();
        assert!(content.contains("Log message 99"));
    }

    #[test]
    fn test_parsed_path_for_session() {
        let p = parsed_path_for(Path::new("/logs"), Path::new("/logs/full/20260101_120000_full.log"));
        assert_eq!(p, PathBuf::from("/logs/parsed/20260101_120000_parsed.log"));
    }
}
