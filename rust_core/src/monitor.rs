//! Server monitor
//!
//! Wires one server instance together:
//! reader -> line queue -> handler chain -> fan-out -> bus / roster,
//! plus the RCON manager, the vote-kick sweep timer and custom parsers.
//! `shutdown()` is the single exit path and runs its cleanup once.

use crate::bus::{EventBus, EventSubscriber};
use crate::correlation::{VoteKickBuffer, DEFAULT_SWEEP_INTERVAL};
use crate::custom_parsers::CustomParserRegistry;
use crate::dispatch::{
    line_queue, spawn_stats_reporter, EventSink, LineDispatcher, LineReceiver,
    DEFAULT_QUEUE_CAPACITY, STATS_LOG_INTERVAL,
};
use crate::error::ConfigError;
use crate::fanout::EventFanout;
use crate::log_reader::{LogReader, ReaderConfig};
use crate::models::PlayerRecord;
use crate::parser::{HandlerChain, ParseStatsSnapshot};
use crate::rcon::{RconConfig, RconManager};
use crate::roster::Roster;
use crate::server_stats::{ServerStats, ServerStatsTracker};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub reader: ReaderConfig,
    /// RCON is optional; without it the roster is built from logs only
    pub rcon: Option<RconConfig>,
    pub custom_parsers_dir: Option<PathBuf>,
    pub vote_kick_sweep_interval: Duration,
    pub queue_capacity: usize,
    pub stats_log_interval: Duration,
}

impl MonitorConfig {
    pub fn new(reader: ReaderConfig) -> Self {
        Self {
            reader,
            rcon: None,
            custom_parsers_dir: None,
            vote_kick_sweep_interval: DEFAULT_SWEEP_INTERVAL,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            stats_log_interval: STATS_LOG_INTERVAL,
        }
    }
}

pub struct ServerMonitor {
    config: MonitorConfig,
    bus: EventBus,
    roster: Arc<Roster>,
    server_stats: Arc<ServerStatsTracker>,
    fanout: Arc<EventFanout>,
    chain: Arc<HandlerChain>,
    reader: LogReader,
    lines: Mutex<Option<LineReceiver>>,
    rcon: Option<RconManager>,
    custom_parsers: CustomParserRegistry,
    stop: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    shut_down: AtomicBool,
}

impl ServerMonitor {
    /// Build every component. Invalid configuration fails here, before
    /// anything is started.
    pub fn new(config: MonitorConfig) -> Result<Self, ConfigError> {
        if config.vote_kick_sweep_interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "VOTEKICK_SWEEP_SECS",
                reason: "must be greater than zero".to_string(),
            });
        }
        if let Some(rcon) = &config.rcon {
            rcon.validate()?;
        }

        let bus = EventBus::default();
        let roster = Arc::new(Roster::new());
        let server_stats = Arc::new(ServerStatsTracker::new());
        let fanout = Arc::new(EventFanout::new(
            bus.clone(),
            roster.clone(),
            Arc::new(VoteKickBuffer::default()),
            server_stats.clone(),
        ));

        let (tx, rx) = line_queue(config.queue_capacity);
        let reader = LogReader::new(config.reader.clone(), tx)?;

        let rcon = config
            .rcon
            .clone()
            .map(|rcon| RconManager::new(rcon, roster.clone(), bus.clone()));

        let custom_parsers =
            CustomParserRegistry::new(config.reader.state_dir.clone(), Arc::new(bus.clone()));
        let (stop, _) = watch::channel(false);

        Ok(Self {
            config,
            bus,
            roster,
            server_stats,
            fanout,
            chain: Arc::new(HandlerChain::with_defaults()),
            reader,
            lines: Mutex::new(Some(rx)),
            rcon,
            custom_parsers,
            stop,
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn subscribe(&self) -> EventSubscriber {
        self.bus.subscribe()
    }

    pub fn roster(&self) -> Arc<Roster> {
        self.roster.clone()
    }

    pub fn players(&self) -> Vec<PlayerRecord> {
        self.roster.players()
    }

    pub fn server_stats(&self) -> ServerStats {
        self.server_stats.snapshot()
    }

    pub fn parse_stats(&self) -> ParseStatsSnapshot {
        self.chain.stats().snapshot()
    }

    pub fn reader(&self) -> &LogReader {
        &self.reader
    }

    pub fn rcon(&self) -> Option<&RconManager> {
        self.rcon.as_ref()
    }

    pub fn custom_parsers(&self) -> &CustomParserRegistry {
        &self.custom_parsers
    }

    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Server monitor already started");
            return;
        }

        let mut tasks = Vec::new();
        if let Some(lines) = self.lines.lock().take() {
            let sink: Arc<dyn EventSink> = self.fanout.clone();
            let dispatcher = LineDispatcher::new(self.reader.name(), self.chain.clone(), sink);
            tasks.push(dispatcher.spawn(lines, self.stop.subscribe()));
        }
        tasks.push(spawn_stats_reporter(
            self.reader.name().to_string(),
            self.chain.stats().clone(),
            self.config.stats_log_interval,
            self.stop.subscribe(),
        ));
        tasks.push(self.spawn_vote_kick_sweeper());
        self.tasks.lock().extend(tasks);

        self.reader.watch();

        if let Some(rcon) = &self.rcon {
            rcon.start().await;
            rcon.start_roster_query(None);
        }

        if let Some(dir) = &self.config.custom_parsers_dir {
            if let Err(e) = self.custom_parsers.load_dir(dir).await {
                error!("Custom parsers not loaded: {:#}", e);
            }
        }

        info!("Server monitor started for {}", self.reader.name());
    }

    fn spawn_vote_kick_sweeper(&self) -> JoinHandle<()> {
        let fanout = self.fanout.clone();
        let period = self.config.vote_kick_sweep_interval;
        let mut stop = self.stop.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let outcome = fanout.sweep_vote_kicks(Instant::now());
                        if outcome.pending > 0 {
                            debug!("{} vote kick(s) still awaiting a roster match", outcome.pending);
                        }
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Stop every component and flush checkpoints. Runs once; later calls
    /// return immediately.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down server monitor for {}", self.reader.name());

        if let Some(rcon) = &self.rcon {
            rcon.stop().await;
        }
        self.custom_parsers.stop_all().await;
        self.reader.unwatch().await;

        self.stop.send_replace(true);
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                error!("Monitor task ended abnormally: {}", e);
            }
        }

        let stats = self.parse_stats();
        info!(
            "Server monitor stopped ({} lines, {} matched)",
            stats.lines_total, stats.matched_total
        );
    }
}

impl Drop for ServerMonitor {
    fn drop(&mut self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        warn!("Server monitor dropped without shutdown, flushing what it can");

        self.reader.save_checkpoint();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        if let Some(rcon) = self.rcon.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move { rcon.stop().await });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_reader::ReaderCheckpoint;
    use crate::models::EventKind;
    use std::io::Write;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> MonitorConfig {
        let mut reader = ReaderConfig::local("console", dir.path().to_string_lossy(), "console.log");
        reader.poll_interval = Duration::from_millis(20);
        reader.state_dir = dir.path().join("state");
        MonitorConfig::new(reader)
    }

    #[tokio::test]
    async fn test_log_lines_reach_roster_and_bus() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("console.log"), "").unwrap();

        let monitor = ServerMonitor::new(config(&dir)).unwrap();
        let mut joins = monitor.bus().subscribe_kinds(&[EventKind::PlayerJoined]);
        monitor.start().await;

        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join("console.log"))
            .unwrap();
        writeln!(
            file,
            "10:00:00.000 DEFAULT : BattlEye Server: 'Player #2 Ann (10.1.1.1:2001) connected'"
        )
        .unwrap();
        writeln!(file, "10:00:00.500 unrelated engine chatter").unwrap();

        tokio::time::timeout(Duration::from_secs(2), joins.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(monitor.players()[0].ip.as_deref(), Some("10.1.1.1"));

        monitor.shutdown().await;
        monitor.shutdown().await;

        let checkpoint = ReaderCheckpoint::load(&dir.path().join("state").join("console_state.json"))
            .unwrap()
            .unwrap();
        let size = std::fs::metadata(dir.path().join("console.log")).unwrap().len();
        assert_eq!(checkpoint.last_file_size, size);
        assert!(monitor.parse_stats().matched_total >= 1);
    }

    #[test]
    fn test_invalid_config_fails_at_construction() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.reader.log_dir = None;
        assert!(ServerMonitor::new(config).is_err());

        let mut config = self::config(&dir);
        config.rcon = Some(RconConfig::new("", 19999, "pw"));
        assert!(matches!(
            ServerMonitor::new(config),
            Err(ConfigError::Missing("RCON_HOST"))
        ));
    }
}
