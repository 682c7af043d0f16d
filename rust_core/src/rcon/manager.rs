//! RCON connection lifecycle
//!
//! `Disconnected -> Connecting -> Connected -> Reconnecting -> Connecting ...`
//! with `Closing` entered only by `stop()` and terminal for the instance.
//!
//! Any session loss, including a rejected login, enters the reconnect loop.
//! The loop retries forever with exponential backoff until it succeeds or the
//! manager is stopped, and at most one loop runs at a time.

use super::config::RconConfig;
use super::protocol;
use super::session::{BattlEyeSession, Session, SessionEvent, SessionEvents, SessionTimeouts};
use crate::bus::{BusEvent, EventBus};
use crate::error::RconError;
use crate::models::{ConnectionState, PlayerRecord};
use crate::roster::Roster;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Opens logged-in sessions
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, events: SessionEvents) -> Result<Arc<dyn Session>, RconError>;
}

pub struct BattlEyeConnector {
    address: String,
    password: String,
    timeouts: SessionTimeouts,
}

impl BattlEyeConnector {
    pub fn new(config: &RconConfig) -> Self {
        Self {
            address: config.address(),
            password: config.password.clone(),
            timeouts: SessionTimeouts {
                login: config.login_timeout,
                command: config.command_timeout,
                keepalive: config.keepalive_interval,
                idle: config.idle_timeout,
            },
        }
    }
}

#[async_trait]
impl Connector for BattlEyeConnector {
    async fn connect(&self, events: SessionEvents) -> Result<Arc<dyn Session>, RconError> {
        let session =
            BattlEyeSession::connect(&self.address, &self.password, self.timeouts.clone(), events)
                .await?;
        Ok(Arc::new(session))
    }
}

/// Statistics for monitoring reconnection behavior
#[derive(Debug, Default)]
pub struct ReconnectStats {
    /// Total reconnection attempts
    pub reconnect_attempts: AtomicU64,
    /// Successful reconnections
    pub successful_reconnects: AtomicU64,
    /// Failed reconnection attempts
    pub failed_reconnects: AtomicU64,
    /// Current consecutive failures
    pub consecutive_failures: AtomicU32,
}

impl ReconnectStats {
    pub fn record_attempt(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.successful_reconnects.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed_reconnects.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }
}

struct Inner {
    config: RconConfig,
    connector: Arc<dyn Connector>,
    roster: Arc<Roster>,
    bus: EventBus,
    state: watch::Sender<ConnectionState>,
    session: Mutex<Option<Arc<dyn Session>>>,
    /// Bumped per established session; stale close events are ignored
    generation: AtomicU64,
    reconnecting: AtomicBool,
    roster_query_active: AtomicBool,
    roster_task: Mutex<Option<JoinHandle<()>>>,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<ReconnectStats>,
    shutdown: watch::Sender<bool>,
}

#[derive(Clone)]
pub struct RconManager {
    inner: Arc<Inner>,
}

impl RconManager {
    pub fn new(config: RconConfig, roster: Arc<Roster>, bus: EventBus) -> Self {
        let connector = Arc::new(BattlEyeConnector::new(&config));
        Self::with_connector(config, connector, roster, bus)
    }

    pub fn with_connector(
        config: RconConfig,
        connector: Arc<dyn Connector>,
        roster: Arc<Roster>,
        bus: EventBus,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                roster,
                bus,
                state,
                session: Mutex::new(None),
                generation: AtomicU64::new(0),
                reconnecting: AtomicBool::new(false),
                roster_query_active: AtomicBool::new(false),
                roster_task: Mutex::new(None),
                reconnect_task: Mutex::new(None),
                stats: Arc::new(ReconnectStats::default()),
                shutdown,
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn stats(&self) -> Arc<ReconnectStats> {
        self.inner.stats.clone()
    }

    pub fn roster(&self) -> Arc<Roster> {
        self.inner.roster.clone()
    }

    /// First connection attempt. A failure hands over to the reconnect loop.
    pub async fn start(&self) {
        if self.state() != ConnectionState::Disconnected {
            debug!("RCON start ignored in state {}", self.state());
            return;
        }
        if let Err(e) = self.inner.connect_once().await {
            error!("RCON connection to {} failed: {}", self.inner.config.address(), e);
            self.inner.on_session_lost();
        }
    }

    /// Drop the current session and connect again right away. A reconnect
    /// loop waiting out its backoff is cancelled first.
    pub async fn restart(&self) {
        let inner = &self.inner;
        if inner.is_closing() {
            return;
        }

        let pending = inner.reconnect_task.lock().take();
        if let Some(task) = pending {
            if !task.is_finished() {
                task.abort();
                let _ = task.await;
                inner.reconnecting.store(false, Ordering::SeqCst);
                debug!("Pending RCON reconnect cancelled by restart");
            }
        }

        if inner.reconnecting.swap(true, Ordering::SeqCst) {
            debug!("RCON restart ignored, reconnect already in progress");
            return;
        }

        warn!("Restarting RCON...");
        inner.close_session().await;
        match inner.connect_once().await {
            Ok(()) => inner.resume_roster_query().await,
            Err(e) => {
                error!("RCON restart failed: {}", e);
                inner.reconnecting.store(false, Ordering::SeqCst);
                inner.on_session_lost();
            }
        }
    }

    /// Terminal shutdown. Safe to call more than once.
    pub async fn stop(&self) {
        let inner = &self.inner;
        if !inner.set_state(ConnectionState::Closing) {
            return;
        }
        inner.shutdown.send_replace(true);
        inner.roster_query_active.store(false, Ordering::SeqCst);

        if let Some(task) = inner.roster_task.lock().take() {
            task.abort();
        }
        let reconnect = inner.reconnect_task.lock().take();
        if let Some(task) = reconnect {
            let _ = task.await;
        }
        inner.close_session().await;
        info!("RCON manager stopped");
    }

    /// Query the roster now, then every `interval` while connected.
    pub fn start_roster_query(&self, interval: Option<Duration>) {
        let interval = interval.unwrap_or(self.inner.config.players_interval);
        self.inner.roster_query_active.store(true, Ordering::SeqCst);

        let inner = self.inner.clone();
        let mut shutdown = self.inner.shutdown.subscribe();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if *inner.state.borrow() == ConnectionState::Connected {
                            if let Err(e) = inner.query_roster().await {
                                warn!("Roster query failed: {}", e);
                            }
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        if let Some(previous) = self.inner.roster_task.lock().replace(task) {
            previous.abort();
        }
        info!("Roster query every {:?}", interval);
    }

    pub fn stop_roster_query(&self) {
        self.inner.roster_query_active.store(false, Ordering::SeqCst);
        if let Some(task) = self.inner.roster_task.lock().take() {
            task.abort();
        }
    }

    /// Send the roster command and replace the roster with the reply.
    pub async fn query_roster(&self) -> Result<Vec<PlayerRecord>, RconError> {
        self.inner.query_roster().await
    }

    /// Send an arbitrary command. Rejected unless `Connected`.
    pub async fn send_command(&self, command: &str) -> Result<String, RconError> {
        self.inner.send_command(command).await
    }
}

impl Inner {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn is_closing(&self) -> bool {
        self.state() == ConnectionState::Closing
    }

    /// Returns false if nothing changed. `Closing` is never left.
    fn set_state(&self, next: ConnectionState) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == next || *current == ConnectionState::Closing {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            info!("RCON state -> {}", next);
            self.bus.publish(BusEvent::ConnectionState(next));
        }
        changed
    }

    async fn connect_once(self: &Arc<Self>) -> Result<(), RconError> {
        if !self.set_state(ConnectionState::Connecting) && self.state() != ConnectionState::Connecting {
            return Err(RconError::NotConnected(self.state().to_string()));
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = self.connector.connect(events_tx).await?;

        if self.is_closing() {
            session.close().await;
            return Err(RconError::SessionClosed);
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.session.lock() = Some(session);
        self.reconnecting.store(false, Ordering::SeqCst);
        self.set_state(ConnectionState::Connected);
        info!("RCON connected successfully to {}", self.config.address());

        tokio::spawn(self.clone().watch_session(events_rx, generation));
        Ok(())
    }

    async fn watch_session(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<SessionEvent>, generation: u64) {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::ServerMessage(message) => {
                    debug!("RCON message: {}", message);
                    self.bus.publish(BusEvent::RconMessage(message));
                }
                SessionEvent::Closed(e) => {
                    if self.generation.load(Ordering::SeqCst) == generation {
                        warn!("RCON connection closed: {}", e);
                        self.on_session_lost();
                    }
                    break;
                }
            }
        }
    }

    async fn close_session(&self) {
        let session = self.session.lock().take();
        if let Some(session) = session {
            session.close().await;
        }
    }

    fn on_session_lost(self: &Arc<Self>) {
        if self.is_closing() {
            return;
        }
        if self.reconnecting.swap(true, Ordering::SeqCst) {
            debug!("RCON already reconnecting");
            return;
        }

        // Drop without waiting; the session task is already gone or going.
        self.session.lock().take();
        self.set_state(ConnectionState::Reconnecting);

        let task = tokio::spawn(self.clone().reconnect_loop());
        if let Some(previous) = self.reconnect_task.lock().replace(task) {
            // A finished loop from an earlier drop
            previous.abort();
        }
    }

    async fn reconnect_loop(self: Arc<Self>) {
        let mut shutdown = self.shutdown.subscribe();
        let mut attempt: u32 = 0;

        loop {
            if self.is_closing() {
                break;
            }
            attempt += 1;
            let delay = self.config.reconnect.calculate_delay(attempt);
            info!("Attempting to reconnect to RCON. Attempt {} in {:?}...", attempt, delay);

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
            if self.is_closing() {
                break;
            }

            self.stats.record_attempt();
            match self.connect_once().await {
                Ok(()) => {
                    self.stats.record_success();
                    info!("RCON reconnected after {} attempt(s)", attempt);
                    self.resume_roster_query().await;
                    return;
                }
                Err(e) => {
                    self.stats.record_failure();
                    error!(
                        "RCON reconnect attempt {} failed: {} (consecutive failures: {})",
                        attempt,
                        e,
                        self.stats.get_consecutive_failures()
                    );
                    self.set_state(ConnectionState::Reconnecting);
                }
            }
        }

        self.reconnecting.store(false, Ordering::SeqCst);
    }

    /// Immediate roster refresh after a new session, if the timer is on.
    async fn resume_roster_query(&self) {
        if self.roster_query_active.load(Ordering::SeqCst) {
            if let Err(e) = self.query_roster().await {
                warn!("Roster query after reconnect failed: {}", e);
            }
        }
    }

    async fn send_command(&self, command: &str) -> Result<String, RconError> {
        let state = self.state();
        if state != ConnectionState::Connected {
            return Err(RconError::NotConnected(state.to_string()));
        }
        let session = self
            .session
            .lock()
            .clone()
            .ok_or_else(|| RconError::NotConnected(state.to_string()))?;
        session.command(command).await
    }

    async fn query_roster(&self) -> Result<Vec<PlayerRecord>, RconError> {
        let reply = self.send_command(&self.config.players_command).await?;
        let entries = protocol::parse_players(&reply);
        let players = self.roster.apply_snapshot(entries);
        debug!("Roster updated from RCON: {} players", players.len());
        self.bus.publish(BusEvent::RosterUpdated(players.clone()));
        Ok(players)
    }
}
