//! Custom parser registry
//!
//! Each `*.json` file in the custom parser directory defines one parser.
//! An enabled parser gets its own `LogReader` (mode `custom`), its own line
//! queue and its own `HandlerChain`; matches are published to the shared
//! sink as `DomainEvent::Custom`. Instances are built, replaced and torn
//! down explicitly through the registry.

use crate::dispatch::{line_queue, EventSink, LineDispatcher, LineReceiver, DEFAULT_QUEUE_CAPACITY};
use crate::error::ConfigError;
use crate::log_reader::config::{DEFAULT_LOG_FILE, DEFAULT_STATE_SAVE_MS};
use crate::log_reader::{LogReader, ReaderConfig, ReaderMode};
use crate::parser::{CustomParserDefinition, HandlerChain};
use anyhow::{Context, Result};
use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub struct CustomParser {
    definition: CustomParserDefinition,
    reader: LogReader,
    chain: Arc<HandlerChain>,
    sink: Arc<dyn EventSink>,
    lines: Mutex<Option<LineReceiver>>,
    dispatch_stop: watch::Sender<bool>,
    dispatch_task: Mutex<Option<JoinHandle<()>>>,
}

impl CustomParser {
    pub fn new(
        definition: CustomParserDefinition,
        state_dir: &Path,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, ConfigError> {
        let log_dir = definition
            .log_dir
            .as_ref()
            .ok_or(ConfigError::Missing("logDir"))?;

        let config = ReaderConfig {
            name: definition.name.clone(),
            mode: ReaderMode::Custom,
            log_dir: Some(log_dir.to_string_lossy().into_owned()),
            file_name: definition
                .file_name
                .clone()
                .unwrap_or_else(|| DEFAULT_LOG_FILE.to_string()),
            poll_interval: definition
                .scan_interval_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| ReaderMode::Custom.default_poll_interval()),
            state_save_interval: Duration::from_millis(
                definition.state_save_interval_ms.unwrap_or(DEFAULT_STATE_SAVE_MS),
            ),
            state_dir: state_dir.to_path_buf(),
            ftp: None,
            http: None,
        };

        let chain = Arc::new(definition.build_chain()?);
        let (tx, rx) = line_queue(DEFAULT_QUEUE_CAPACITY);
        let reader = LogReader::new(config, tx)?;
        let (dispatch_stop, _) = watch::channel(false);

        Ok(Self {
            definition,
            reader,
            chain,
            sink,
            lines: Mutex::new(Some(rx)),
            dispatch_stop,
            dispatch_task: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn event_names(&self) -> Vec<&str> {
        self.definition.event_names()
    }

    pub fn is_watching(&self) -> bool {
        self.reader.is_watching()
    }

    pub fn chain(&self) -> &Arc<HandlerChain> {
        &self.chain
    }

    pub fn watch(&self) {
        if let Some(lines) = self.lines.lock().take() {
            let dispatcher = LineDispatcher::new(
                format!("custom:{}", self.definition.name),
                self.chain.clone(),
                self.sink.clone(),
            );
            let task = dispatcher.spawn(lines, self.dispatch_stop.subscribe());
            *self.dispatch_task.lock() = Some(task);
        }
        self.reader.watch();
    }

    /// Stop the reader and flush its checkpoint. The line consumer keeps
    /// draining until `shutdown`.
    pub async fn unwatch(&self) {
        self.reader.unwatch().await;
    }

    /// Unwatch and stop the line consumer. The instance cannot be restarted.
    pub async fn shutdown(&self) {
        self.unwatch().await;
        self.dispatch_stop.send_replace(true);
        let task = self.dispatch_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

pub struct CustomParserRegistry {
    state_dir: PathBuf,
    sink: Arc<dyn EventSink>,
    parsers: RwLock<BTreeMap<String, Arc<CustomParser>>>,
}

impl CustomParserRegistry {
    pub fn new(state_dir: impl Into<PathBuf>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            state_dir: state_dir.into(),
            sink,
            parsers: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.parsers.read().keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<CustomParser>> {
        self.parsers.read().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.parsers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.read().is_empty()
    }

    /// Read every `*.json` definition in `dir`, sorted by file name.
    /// Unreadable or malformed files are logged and skipped.
    pub fn read_definitions(dir: &Path) -> Result<Vec<CustomParserDefinition>> {
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read custom parser directory {}", dir.display()))?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().map_or(false, |ext| ext == "json"))
            .collect();
        paths.sort();

        let mut definitions = Vec::new();
        for path in paths {
            match read_definition(&path) {
                Ok(definition) => definitions.push(definition),
                Err(e) => error!("Skipping custom parser: {:#}", e),
            }
        }
        Ok(definitions)
    }

    /// Build, start and register one parser, replacing any with the same name.
    pub async fn insert(&self, definition: CustomParserDefinition) -> Result<(), ConfigError> {
        if definition.events.is_empty() {
            warn!(
                "Custom parser {} declares no events and will never emit anything",
                definition.name
            );
        }

        let parser = Arc::new(CustomParser::new(
            definition,
            &self.state_dir,
            self.sink.clone(),
        )?);
        let name = parser.name().to_string();

        self.remove(&name).await;
        parser.watch();
        info!(
            "Custom parser {} started (events: {})",
            name,
            parser.event_names().join(", ")
        );
        self.parsers.write().insert(name, parser);
        Ok(())
    }

    /// Load every enabled definition in `dir`. Returns how many started.
    pub async fn load_dir(&self, dir: &Path) -> Result<usize> {
        let mut started = 0;
        for definition in Self::read_definitions(dir)? {
            if !definition.enabled {
                info!("Custom parser {} is disabled, skipping", definition.name);
                continue;
            }
            let name = definition.name.clone();
            match self.insert(definition).await {
                Ok(()) => started += 1,
                Err(e) => error!("Failed to initialize custom parser {}: {}", name, e),
            }
        }
        info!("Custom parser registry initialized with {} parsers", started);
        Ok(started)
    }

    /// Tear down one parser. Returns false if it was not registered.
    pub async fn remove(&self, name: &str) -> bool {
        let parser = self.parsers.write().remove(name);
        match parser {
            Some(parser) => {
                parser.shutdown().await;
                info!("Custom parser {} stopped", name);
                true
            }
            None => false,
        }
    }

    pub async fn stop_all(&self) {
        let parsers: Vec<Arc<CustomParser>> = {
            let mut map = self.parsers.write();
            std::mem::take(&mut *map).into_values().collect()
        };
        if parsers.is_empty() {
            return;
        }
        join_all(parsers.iter().map(|p| p.shutdown())).await;
        info!("Stopped {} custom parsers", parsers.len());
    }

    /// Replace every running parser with a fresh set from `dir`.
    pub async fn reload(&self, dir: &Path) -> Result<usize> {
        self.stop_all().await;
        self.load_dir(dir).await
    }
}

fn read_definition(path: &Path) -> Result<CustomParserDefinition> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid definition in {}", path.display()))
}
