//! Line dispatch queue
//!
//! A bounded FIFO between a reader and its classifier. One consumer task
//! pulls lines in push order and classifies each to completion before taking
//! the next, so downstream state sees log lines in file order.

use crate::models::DomainEvent;
use crate::parser::{HandlerChain, ParseStats};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub type LineSender = mpsc::Sender<String>;
pub type LineReceiver = mpsc::Receiver<String>;

/// Default queue depth; a full queue makes the reader wait.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Interval for the lines-per-minute log
pub const STATS_LOG_INTERVAL: Duration = Duration::from_secs(60);

pub fn line_queue(capacity: usize) -> (LineSender, LineReceiver) {
    mpsc::channel(capacity)
}

/// Receiver of classified events
pub trait EventSink: Send + Sync {
    fn publish(&self, event: DomainEvent);
}

pub struct LineDispatcher {
    name: String,
    chain: Arc<HandlerChain>,
    sink: Arc<dyn EventSink>,
}

impl LineDispatcher {
    pub fn new(name: impl Into<String>, chain: Arc<HandlerChain>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            name: name.into(),
            chain,
            sink,
        }
    }

    /// Classify one line and publish the event, if any.
    pub fn dispatch(&self, line: &str) -> bool {
        match self.chain.classify(line) {
            Some(event) => {
                self.sink.publish(event);
                true
            }
            None => false,
        }
    }

    /// Run the single consumer until the queue closes or `stop` flips.
    ///
    /// On stop, lines already queued are still classified. The reader is
    /// stopped first, so its checkpoint covers exactly those lines.
    pub fn spawn(self, mut lines: LineReceiver, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Line dispatcher {} started", self.name);
            loop {
                tokio::select! {
                    biased;
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            self.drain(&mut lines);
                            break;
                        }
                    }
                    line = lines.recv() => match line {
                        Some(line) => {
                            self.dispatch(&line);
                        }
                        None => break,
                    },
                }
            }
            debug!("Line dispatcher {} stopped", self.name);
        })
    }

    fn drain(&self, lines: &mut LineReceiver) {
        lines.close();
        let mut drained = 0usize;
        while let Ok(line) = lines.try_recv() {
            self.dispatch(&line);
            drained += 1;
        }
        if drained > 0 {
            debug!("Line dispatcher {} drained {} queued lines", self.name, drained);
        }
    }
}

/// Log lines/min and matching lines/min, then reset the window.
pub fn spawn_stats_reporter(
    name: String,
    stats: Arc<ParseStats>,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let (lines, matched) = stats.take_window();
                    let per_minute = |n: u64| n as f64 * 60.0 / period.as_secs_f64();
                    info!(
                        "[{}] Lines per minute: {:.0} | Matching lines per minute: {:.0}",
                        name,
                        per_minute(lines),
                        per_minute(matched)
                    );
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
