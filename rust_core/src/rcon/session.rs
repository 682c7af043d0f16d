//! One logged-in BattlEye RCON session over UDP.
//!
//! The socket is owned by a single task. Callers submit commands over a
//! channel and wait on a oneshot for the (reassembled) reply. The task also
//! acknowledges server messages, sends keep-alives and reports loss of the
//! session through `SessionEvent::Closed`.

use super::protocol::{self, Multipart, Packet};
use crate::error::RconError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

const MAX_DATAGRAM: usize = 65_507;

/// Emitted by a live session to its owner
#[derive(Debug)]
pub enum SessionEvent {
    /// Unsolicited server message (already acknowledged)
    ServerMessage(String),
    /// The session died; not sent after an explicit `close()`
    Closed(RconError),
}

pub type SessionEvents = mpsc::UnboundedSender<SessionEvent>;

#[async_trait]
pub trait Session: Send + Sync {
    async fn command(&self, command: &str) -> Result<String, RconError>;
    async fn close(&self);
}

#[derive(Debug, Clone)]
pub struct SessionTimeouts {
    pub login: Duration,
    pub command: Duration,
    pub keepalive: Duration,
    pub idle: Duration,
}

struct Request {
    command: String,
    reply: oneshot::Sender<Result<String, RconError>>,
}

struct Pending {
    reply: oneshot::Sender<Result<String, RconError>>,
    deadline: Instant,
    multipart: Option<Multipart>,
}

pub struct BattlEyeSession {
    requests: mpsc::Sender<Request>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BattlEyeSession {
    /// Open a socket, log in and start the session task.
    pub async fn connect(
        address: &str,
        password: &str,
        timeouts: SessionTimeouts,
        events: SessionEvents,
    ) -> Result<Self, RconError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(address).await?;
        socket.send(&protocol::login_packet(password)).await?;

        let login_timeout = timeouts.login;
        timeout(login_timeout, wait_for_login(&socket))
            .await
            .map_err(|_| RconError::Timeout(login_timeout))??;
        info!("RCON logged in to {}", address);

        let (requests, rx) = mpsc::channel(64);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(socket, rx, shutdown_rx, timeouts, events));

        Ok(Self {
            requests,
            shutdown,
            task: Mutex::new(Some(task)),
        })
    }
}

async fn wait_for_login(socket: &UdpSocket) -> Result<(), RconError> {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let n = socket.recv(&mut buf).await?;
        match protocol::decode(&buf[..n]) {
            Ok(Packet::Login { success: true }) => return Ok(()),
            Ok(Packet::Login { success: false }) => return Err(RconError::LoginRejected),
            Ok(other) => debug!("Ignoring packet before login: {:?}", other),
            Err(e) => debug!("Ignoring datagram before login: {}", e),
        }
    }
}

#[async_trait]
impl Session for BattlEyeSession {
    async fn command(&self, command: &str) -> Result<String, RconError> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(Request {
                command: command.to_string(),
                reply,
            })
            .await
            .map_err(|_| RconError::SessionClosed)?;
        rx.await.map_err(|_| RconError::SessionClosed)?
    }

    async fn close(&self) {
        self.shutdown.send_replace(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for BattlEyeSession {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

struct SessionLoop {
    socket: UdpSocket,
    timeouts: SessionTimeouts,
    events: SessionEvents,
    next_seq: u8,
    pending: HashMap<u8, Pending>,
    last_sent: Instant,
    last_received: Instant,
}

impl SessionLoop {
    fn take_seq(&mut self) -> u8 {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        seq
    }

    async fn send(&mut self, packet: &[u8]) -> Result<(), RconError> {
        self.socket.send(packet).await?;
        self.last_sent = Instant::now();
        Ok(())
    }

    async fn submit(&mut self, request: Request) -> Result<(), RconError> {
        let seq = self.take_seq();
        if let Some(stale) = self.pending.remove(&seq) {
            let _ = stale.reply.send(Err(RconError::Timeout(self.timeouts.command)));
        }
        self.send(&protocol::command_packet(seq, &request.command))
            .await?;
        self.pending.insert(
            seq,
            Pending {
                reply: request.reply,
                deadline: Instant::now() + self.timeouts.command,
                multipart: None,
            },
        );
        Ok(())
    }

    async fn on_datagram(&mut self, datagram: &[u8]) -> Result<(), RconError> {
        self.last_received = Instant::now();

        let packet = match protocol::decode(datagram) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("Dropping RCON datagram: {}", e);
                return Ok(());
            }
        };

        match packet {
            Packet::Command {
                seq,
                fragment,
                body,
            } => {
                let complete = match (self.pending.get_mut(&seq), fragment) {
                    // Keep-alive replies have no waiter
                    (None, _) => None,
                    (Some(_), None) => Some(body),
                    (Some(pending), Some(fragment)) => pending
                        .multipart
                        .get_or_insert_with(|| Multipart::new(fragment.total))
                        .add(fragment, body),
                };
                if let Some(body) = complete {
                    if let Some(pending) = self.pending.remove(&seq) {
                        let text = String::from_utf8_lossy(&body).into_owned();
                        let _ = pending.reply.send(Ok(text));
                    }
                }
            }
            Packet::ServerMessage { seq, message } => {
                self.send(&protocol::ack_packet(seq)).await?;
                let _ = self.events.send(SessionEvent::ServerMessage(message));
            }
            Packet::Login { .. } => debug!("Unexpected login reply mid-session"),
        }
        Ok(())
    }

    async fn housekeeping(&mut self) -> Result<(), RconError> {
        let now = Instant::now();

        let expired: Vec<u8> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(seq, _)| *seq)
            .collect();
        for seq in expired {
            if let Some(pending) = self.pending.remove(&seq) {
                let _ = pending.reply.send(Err(RconError::Timeout(self.timeouts.command)));
            }
        }

        if now.duration_since(self.last_received) >= self.timeouts.idle {
            return Err(RconError::Timeout(self.timeouts.idle));
        }
        if now.duration_since(self.last_sent) >= self.timeouts.keepalive {
            let seq = self.take_seq();
            debug!("Sending RCON keep-alive (seq {})", seq);
            self.send(&protocol::command_packet(seq, "")).await?;
        }
        Ok(())
    }
}

fn housekeeping_period(timeouts: &SessionTimeouts) -> Duration {
    let shortest = timeouts
        .command
        .min(timeouts.keepalive)
        .min(timeouts.idle);
    (shortest / 4).max(Duration::from_millis(10))
}

async fn run(
    socket: UdpSocket,
    mut requests: mpsc::Receiver<Request>,
    mut shutdown: watch::Receiver<bool>,
    timeouts: SessionTimeouts,
    events: SessionEvents,
) {
    let mut ticker = tokio::time::interval(housekeeping_period(&timeouts));
    let now = Instant::now();
    let mut session = SessionLoop {
        socket,
        timeouts,
        events,
        next_seq: 0,
        pending: HashMap::new(),
        last_sent: now,
        last_received: now,
    };
    let mut buf = vec![0u8; MAX_DATAGRAM];

    let failure = loop {
        let step = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break None;
                }
                Ok(())
            }
            request = requests.recv() => match request {
                Some(request) => session.submit(request).await,
                None => break None,
            },
            received = session.socket.recv(&mut buf) => match received {
                Ok(n) => session.on_datagram(&buf[..n]).await,
                Err(e) => Err(RconError::Io(e)),
            },
            _ = ticker.tick() => session.housekeeping().await,
        };
        if let Err(e) = step {
            break Some(e);
        }
    };

    for (_, pending) in session.pending.drain() {
        let _ = pending.reply.send(Err(RconError::SessionClosed));
    }

    match failure {
        Some(e) => {
            warn!("RCON session lost: {}", e);
            let _ = session.events.send(SessionEvent::Closed(e));
        }
        None => debug!("RCON session closed"),
    }
}
