use super::checkpoint::ReaderCheckpoint;
use super::config::{ReaderConfig, ReaderMode};
use super::ftp::FtpSource;
use super::http::HttpSource;
use super::source::{LocalFileSource, LogSource};
use crate::dispatch::LineSender;
use crate::error::{ConfigError, TransportError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Follows one log file and pushes every new, non-empty line into the
/// dispatch queue in file order.
///
/// The byte offset only moves forward, except when the file shrinks
/// (rotation/truncation) where it resets to 0. It is checkpointed on a timer
/// and on `unwatch`.
pub struct LogReader {
    inner: Arc<ReaderInner>,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    stop: watch::Sender<bool>,
}

struct ReaderInner {
    name: String,
    source_path: String,
    checkpoint_path: PathBuf,
    config: ReaderConfig,
    source: Mutex<Box<dyn LogSource>>,
    lines: LineSender,
    offset: AtomicU64,
    /// Offset was loaded from (or may be written to) the checkpoint
    resumed: AtomicBool,
    watching: AtomicBool,
}

impl LogReader {
    /// Build a reader for the configured mode. Fails on invalid config.
    pub fn new(config: ReaderConfig, lines: LineSender) -> Result<Self, ConfigError> {
        config.validate()?;

        let source: Box<dyn LogSource> = match config.mode {
            ReaderMode::Tail | ReaderMode::Custom => {
                let dir = PathBuf::from(config.log_dir.as_deref().unwrap_or("."));
                Box::new(LocalFileSource::new(dir.join(&config.file_name)))
            }
            ReaderMode::Ftp => {
                let settings = config.ftp.clone().ok_or(ConfigError::Missing("ftp settings"))?;
                Box::new(FtpSource::new(settings, config.source_path()))
            }
            ReaderMode::Http => {
                let settings = config
                    .http
                    .as_ref()
                    .ok_or(ConfigError::Missing("http settings"))?;
                Box::new(HttpSource::new(settings, &config.file_name)?)
            }
        };

        Ok(Self::with_source(config, source, lines))
    }

    /// Build a reader over an arbitrary source. The config is not validated.
    pub fn with_source(config: ReaderConfig, source: Box<dyn LogSource>, lines: LineSender) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            inner: Arc::new(ReaderInner {
                name: config.name.clone(),
                source_path: config.source_path(),
                checkpoint_path: config.checkpoint_path(),
                config,
                source: Mutex::new(source),
                lines,
                offset: AtomicU64::new(0),
                resumed: AtomicBool::new(false),
                watching: AtomicBool::new(false),
            }),
            task: parking_lot::Mutex::new(None),
            stop,
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn offset(&self) -> u64 {
        self.inner.offset.load(Ordering::SeqCst)
    }

    pub fn is_watching(&self) -> bool {
        self.inner.watching.load(Ordering::SeqCst)
    }

    /// Load the checkpoint and start polling. A second call is a no-op.
    pub fn watch(&self) {
        if self.inner.watching.swap(true, Ordering::SeqCst) {
            warn!("Reader {} is already watching", self.inner.name);
            return;
        }

        self.inner.resume();
        self.stop.send_replace(false);

        let inner = self.inner.clone();
        let mut stop = self.stop.subscribe();
        let handle = tokio::spawn(async move {
            let mut poll = interval(inner.config.poll_interval);
            poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut save = interval(inner.config.state_save_interval);
            save.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First save tick fires immediately; skip it
            save.tick().await;

            info!(
                "Watching {} (mode: {}, every {:?}, will wait for it if not found)",
                inner.source_path,
                inner.config.mode.as_str(),
                inner.config.poll_interval
            );

            loop {
                tokio::select! {
                    _ = poll.tick() => {
                        if let Err(e) = inner.scan().await {
                            warn!("Reader {} poll failed, retrying next tick: {}", inner.name, e);
                        }
                    }
                    _ = save.tick() => {
                        inner.save_checkpoint();
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }

            debug!("Reader {} loop exited", inner.name);
        });

        *self.task.lock() = Some(handle);
    }

    /// Stop polling, close the source and flush the checkpoint.
    ///
    /// Safe to call repeatedly and without a prior `watch`.
    pub async fn unwatch(&self) {
        self.stop.send_replace(true);

        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Reader {} task ended abnormally: {}", self.inner.name, e);
            }
        }

        self.inner.source.lock().await.close().await;

        if self.inner.watching.swap(false, Ordering::SeqCst) {
            self.inner.save_checkpoint();
            info!("Stopped watching {}", self.inner.source_path);
        }
    }

    /// Run one poll tick. Returns the number of lines queued.
    pub async fn scan_once(&self) -> Result<usize, TransportError> {
        self.inner.scan().await
    }

    /// Load the checkpoint without starting the poll loop.
    pub fn resume(&self) {
        self.inner.resume();
    }

    pub fn save_checkpoint(&self) {
        self.inner.save_checkpoint();
    }
}

impl ReaderInner {
    fn resume(&self) {
        let offset = ReaderCheckpoint::resume_offset(&self.checkpoint_path, &self.source_path);
        self.offset.store(offset, Ordering::SeqCst);
        self.resumed.store(true, Ordering::SeqCst);
    }

    fn save_checkpoint(&self) {
        if !self.resumed.load(Ordering::SeqCst) {
            // Never loaded: writing 0 would clobber a valid checkpoint
            return;
        }

        let checkpoint =
            ReaderCheckpoint::new(self.source_path.clone(), self.offset.load(Ordering::SeqCst));
        match checkpoint.save(&self.checkpoint_path) {
            Ok(()) => debug!(
                "Saved checkpoint for {} at offset {}",
                self.name, checkpoint.last_file_size
            ),
            Err(e) => warn!("Failed to save checkpoint for {}: {}", self.name, e),
        }
    }

    async fn scan(&self) -> Result<usize, TransportError> {
        // Holding the source lock serializes ticks
        let mut source = self.source.lock().await;

        let size = match source.size().await? {
            Some(size) => size,
            None => {
                debug!("{} not found yet, will keep polling", source.describe());
                return Ok(0);
            }
        };

        let mut offset = self.offset.load(Ordering::SeqCst);
        if size < offset {
            info!(
                "{} appears to have been truncated or rotated ({} < {}). Resetting position.",
                source.describe(),
                size,
                offset
            );
            offset = 0;
            self.offset.store(0, Ordering::SeqCst);
        }

        if size == offset {
            return Ok(0);
        }

        let bytes = source.read_range(offset, size).await?;

        // Only consume through the last complete line
        let complete = match bytes.iter().rposition(|b| *b == b'\n') {
            Some(idx) => &bytes[..=idx],
            None => return Ok(0),
        };

        let text = String::from_utf8_lossy(complete);
        let mut queued = 0;
        for line in text.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.trim().is_empty() {
                continue;
            }
            if self.lines.send(line.to_string()).await.is_err() {
                warn!("Line queue closed; reader {} dropping remaining input", self.name);
                return Ok(queued);
            }
            queued += 1;
        }

        self.offset
            .store(offset + complete.len() as u64, Ordering::SeqCst);
        Ok(queued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::line_queue;
    use std::io::Write;
    use std::time::Duration;

    fn config_for(dir: &std::path::Path) -> ReaderConfig {
        let mut config = ReaderConfig::local("main", dir.to_string_lossy(), "console.log");
        config.state_dir = dir.join("state");
        config.poll_interval = Duration::from_millis(20);
        config
    }

    fn append(path: &std::path::Path, data: &str) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(data.as_bytes()).unwrap();
    }

    #[tokio::test]
    async fn test_scan_reads_only_new_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("console.log");
        let (tx, mut rx) = line_queue(64);
        let reader = LogReader::new(config_for(dir.path()), tx).unwrap();

        // Missing file is not an error
        assert_eq!(reader.scan_once().await.unwrap(), 0);

        append(&log, "one\r\n\n  \ntwo\n");
        assert_eq!(reader.scan_once().await.unwrap(), 2);
        assert_eq!(rx.recv().await.unwrap(), "one");
        assert_eq!(rx.recv().await.unwrap(), "two");

        append(&log, "three\n");
        assert_eq!(reader.scan_once().await.unwrap(), 1);
        assert_eq!(rx.recv().await.unwrap(), "three");
        assert_eq!(reader.offset(), std::fs::metadata(&log).unwrap().len());
    }

    #[tokio::test]
    async fn test_partial_line_waits_for_newline() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("console.log");
        let (tx, mut rx) = line_queue(64);
        let reader = LogReader::new(config_for(dir.path()), tx).unwrap();

        append(&log, "complete\nhalf");
        assert_eq!(reader.scan_once().await.unwrap(), 1);
        assert_eq!(reader.offset(), 9);

        append(&log, " done\n");
        assert_eq!(reader.scan_once().await.unwrap(), 1);
        assert_eq!(rx.recv().await.unwrap(), "complete");
        assert_eq!(rx.recv().await.unwrap(), "half done");
    }

    #[tokio::test]
    async fn test_truncation_resets_offset() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("console.log");
        let (tx, mut rx) = line_queue(64);
        let reader = LogReader::new(config_for(dir.path()), tx).unwrap();

        append(&log, "old line one\nold line two\n");
        reader.scan_once().await.unwrap();
        let before = reader.offset();

        std::fs::write(&log, "new\n").unwrap();
        assert_eq!(reader.scan_once().await.unwrap(), 1);
        assert!(reader.offset() < before);
        assert_eq!(reader.offset(), 4);

        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line);
        }
        assert_eq!(lines, vec!["old line one", "old line two", "new"]);
    }

    #[tokio::test]
    async fn test_resume_from_checkpoint_skips_processed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("console.log");
        append(&log, "before one\nbefore two\n");

        {
            let (tx, _rx) = line_queue(64);
            let reader = LogReader::new(config_for(dir.path()), tx).unwrap();
            reader.resume();
            reader.scan_once().await.unwrap();
            reader.save_checkpoint();
        }

        append(&log, "after\n");

        let (tx, mut rx) = line_queue(64);
        let reader = LogReader::new(config_for(dir.path()), tx).unwrap();
        reader.resume();
        assert_eq!(reader.scan_once().await.unwrap(), 1);
        assert_eq!(rx.recv().await.unwrap(), "after");
    }

    #[tokio::test]
    async fn test_watch_is_idempotent_and_unwatch_persists() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("console.log");
        append(&log, "hello\n");

        let config = config_for(dir.path());
        let checkpoint = config.checkpoint_path();
        let (tx, mut rx) = line_queue(64);
        let reader = LogReader::new(config, tx).unwrap();

        reader.watch();
        reader.watch();
        assert!(reader.is_watching());

        let line = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(line, "hello");

        reader.unwatch().await;
        reader.unwatch().await;
        assert!(!reader.is_watching());

        let saved = ReaderCheckpoint::load(&checkpoint).unwrap().unwrap();
        assert_eq!(saved.last_file_size, 6);
        // No duplicate delivery from the second watch call
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unwatch_without_watch_leaves_checkpoint_alone() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path());
        let checkpoint = config.checkpoint_path();
        ReaderCheckpoint::new(config.source_path(), 1234)
            .save(&checkpoint)
            .unwrap();

        let (tx, _rx) = line_queue(8);
        let reader = LogReader::new(config, tx).unwrap();
        reader.unwatch().await;

        let saved = ReaderCheckpoint::load(&checkpoint).unwrap().unwrap();
        assert_eq!(saved.last_file_size, 1234);
    }

    #[tokio::test]
    async fn test_invalid_config_refuses_to_build() {
        let (tx, _rx) = line_queue(8);
        let config = ReaderConfig::local("main", "", "console.log");
        assert!(LogReader::new(config, tx).is_err());
    }
}
