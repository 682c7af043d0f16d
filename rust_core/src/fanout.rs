//! Event fan-out
//!
//! Sink for the main handler chain. Applies each classified event to the
//! state it owns (roster, vote-kick buffer, server stats), then publishes the
//! event and anything derived from it on the bus.

use crate::bus::{BusEvent, EventBus};
use crate::correlation::{SweepOutcome, VoteKickBuffer};
use crate::dispatch::EventSink;
use crate::models::DomainEvent;
use crate::roster::Roster;
use crate::server_stats::ServerStatsTracker;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct EventFanout {
    bus: EventBus,
    roster: Arc<Roster>,
    vote_kicks: Arc<VoteKickBuffer>,
    server_stats: Arc<ServerStatsTracker>,
}

impl EventFanout {
    pub fn new(
        bus: EventBus,
        roster: Arc<Roster>,
        vote_kicks: Arc<VoteKickBuffer>,
        server_stats: Arc<ServerStatsTracker>,
    ) -> Self {
        Self {
            bus,
            roster,
            vote_kicks,
            server_stats,
        }
    }

    /// Retry buffered vote kicks against the roster and publish resolutions.
    pub fn sweep_vote_kicks(&self, now: Instant) -> SweepOutcome {
        let outcome = self.vote_kicks.sweep(&self.roster, now);
        for attribution in &outcome.resolved {
            self.bus
                .publish(BusEvent::VoteKickAttributed(attribution.clone()));
        }
        outcome
    }

    fn apply(&self, event: &DomainEvent) -> Vec<BusEvent> {
        let mut derived = Vec::new();

        match event {
            DomainEvent::PlayerJoined(e) => {
                self.roster.apply_joined(e);
                info!(
                    "Player joined: #{} {} ({})",
                    e.player_number, e.player_name, e.player_ip
                );
            }
            DomainEvent::PlayerUpdate(e) => {
                self.roster.apply_update(e);
            }
            DomainEvent::ServerHealth(e) => {
                self.server_stats.record(e);
                debug!(
                    "Server health: {:.1} fps, {} kB, {} players",
                    e.fps, e.memory_kb, e.player_count
                );
            }
            DomainEvent::VoteKickStart(e) => {
                match self.vote_kicks.observe(e.clone(), &self.roster, Instant::now()) {
                    Some(attribution) => {
                        info!(
                            "Votekick started by {} [ID={}] against ID {}",
                            attribution.starter.name, e.player_id, e.victim_id
                        );
                        derived.push(BusEvent::VoteKickAttributed(attribution));
                    }
                    None => info!(
                        "Votekick started by ID {} against ID {} (unresolved)",
                        e.player_id, e.victim_id
                    ),
                }
            }
            DomainEvent::VoteKickVictim(e) => {
                info!(
                    "Vote kick succeeded against player {} (ID: {})",
                    e.victim_name, e.victim_id
                );
            }
            DomainEvent::GameStart(e) => info!("Game started at {}", e.time),
            DomainEvent::GameEnd(e) => {
                if e.is_admin_tools() {
                    info!(
                        "Game ended at {} (reason: {}, winner: {})",
                        e.time,
                        e.reason.as_deref().unwrap_or_default(),
                        e.winner.as_deref().unwrap_or_default()
                    );
                } else {
                    info!("Game ended at {}", e.time);
                }
            }
            DomainEvent::ApplicationHang(e) => {
                warn!("Application hang at {} ({}s): {}", e.time, e.duration_secs, e.message);
            }
            DomainEvent::PlayerKilled(e) => {
                if e.friendly_fire {
                    info!(
                        "Friendly fire: {} killed by {}",
                        e.player_name, e.instigator_name
                    );
                    derived.push(BusEvent::FriendlyFire(e.clone()));
                }
            }
            DomainEvent::AdminAction(e) => {
                info!("Admin {} {} {}", e.admin_name, e.action, e.player_name);
            }
            DomainEvent::GmStatus(e) => {
                info!("GM {} {:?} (ID: {})", e.player_name, e.status, e.player_id);
            }
            DomainEvent::BaseCapture(_)
            | DomainEvent::GmTime(_)
            | DomainEvent::Chat(_)
            | DomainEvent::Custom(_) => {}
        }

        derived
    }
}

impl EventSink for EventFanout {
    fn publish(&self, event: DomainEvent) {
        let derived = self.apply(&event);
        let sweep_after = matches!(event, DomainEvent::PlayerUpdate(_));

        self.bus.publish(BusEvent::Log(event));
        for extra in derived {
            self.bus.publish(extra);
        }

        // A new identity may unblock buffered vote kicks
        if sweep_after && !self.vote_kicks.is_empty() {
            self.sweep_vote_kicks(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventKind, PlayerKilled, PlayerUpdate, ServerHealth, VoteKickStart};

    fn fanout() -> (EventFanout, EventBus) {
        let bus = EventBus::default();
        let fanout = EventFanout::new(
            bus.clone(),
            Arc::new(Roster::new()),
            Arc::new(VoteKickBuffer::default()),
            Arc::new(ServerStatsTracker::new()),
        );
        (fanout, bus)
    }

    fn update(name: &str, id: u32) -> DomainEvent {
        DomainEvent::PlayerUpdate(PlayerUpdate {
            time: "t".to_string(),
            player_id: Some(id),
            player_name: Some(name.to_string()),
            player_uid: Some(format!("uid-{}", id)),
        })
    }

    #[tokio::test]
    async fn test_buffered_vote_kick_resolved_by_later_update() {
        let (fanout, bus) = fanout();
        let mut sub = bus.subscribe();

        fanout.publish(DomainEvent::VoteKickStart(VoteKickStart {
            time: "t".to_string(),
            player_id: 5,
            victim_id: 9,
            votes: 1,
            votes_required: 4,
        }));
        assert_eq!(sub.recv().await.unwrap().kind(), EventKind::VoteKickStart);
        assert!(sub.try_recv().is_none());

        fanout.publish(update("Alice", 5));
        assert_eq!(sub.recv().await.unwrap().kind(), EventKind::PlayerUpdate);

        let attributed = sub.recv().await.unwrap();
        match attributed.as_ref() {
            BusEvent::VoteKickAttributed(a) => {
                assert_eq!(a.starter.name, "Alice");
                assert!(a.buffered);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_friendly_fire_is_derived() {
        let (fanout, bus) = fanout();
        let mut ff = bus.subscribe_kinds(&[EventKind::FriendlyFire]);

        let kill = |friendly_fire| {
            DomainEvent::PlayerKilled(PlayerKilled {
                time: "t".to_string(),
                player_name: "Bob".to_string(),
                instigator_name: "Carl".to_string(),
                friendly_fire,
                is_ai: false,
            })
        };
        fanout.publish(kill(false));
        fanout.publish(kill(true));

        assert_eq!(ff.recv().await.unwrap().kind(), EventKind::FriendlyFire);
        assert!(ff.try_recv().is_none());
    }

    #[test]
    fn test_health_updates_snapshot() {
        let bus = EventBus::default();
        let stats = Arc::new(ServerStatsTracker::new());
        let fanout = EventFanout::new(
            bus,
            Arc::new(Roster::new()),
            Arc::new(VoteKickBuffer::default()),
            stats.clone(),
        );

        fanout.publish(DomainEvent::ServerHealth(ServerHealth {
            time: "t".to_string(),
            fps: 30.0,
            memory_kb: 2048,
            player_count: 12,
        }));

        assert_eq!(stats.snapshot().player_count, Some(12));
    }
}
