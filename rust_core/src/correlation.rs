//! Vote-kick correlation buffer
//!
//! A vote-kick start line names the voter only by numeric id. If the roster
//! cannot resolve that id yet (the identity line often comes later), the
//! event is parked here and retried on every sweep. Entries never live longer
//! than the TTL, resolved or not.

use crate::models::{PlayerRecord, VoteKickStart};
use crate::roster::Roster;
use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Maximum time an unresolved vote kick is retained
pub const VOTE_KICK_TTL: Duration = Duration::from_secs(30 * 60);

/// Default sweep interval
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct BufferedVoteKick {
    pub event: VoteKickStart,
    pub enqueued_at: Instant,
}

/// A vote-kick start joined with the players it references
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteKickAttribution {
    pub event: VoteKickStart,
    pub starter: PlayerRecord,
    pub victim: Option<PlayerRecord>,
    /// Resolved from the buffer rather than on arrival
    pub buffered: bool,
}

#[derive(Debug, Default)]
pub struct SweepOutcome {
    pub resolved: Vec<VoteKickAttribution>,
    pub expired: usize,
    pub pending: usize,
}

pub struct VoteKickBuffer {
    entries: Mutex<Vec<BufferedVoteKick>>,
    ttl: Duration,
}

impl VoteKickBuffer {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Resolve immediately if possible, otherwise buffer.
    pub fn observe(
        &self,
        event: VoteKickStart,
        roster: &Roster,
        now: Instant,
    ) -> Option<VoteKickAttribution> {
        if let Some(attribution) = resolve(&event, roster, false) {
            return Some(attribution);
        }

        debug!(
            "No player with ID {} yet, buffering vote kick start",
            event.player_id
        );
        self.enqueue(event, now);
        None
    }

    pub fn enqueue(&self, event: VoteKickStart, now: Instant) {
        self.entries.lock().push(BufferedVoteKick {
            event,
            enqueued_at: now,
        });
    }

    /// Drop expired entries, then try to resolve the rest.
    pub fn sweep(&self, roster: &Roster, now: Instant) -> SweepOutcome {
        let mut entries = self.entries.lock();
        let mut outcome = SweepOutcome::default();

        let before = entries.len();
        entries.retain(|e| now.saturating_duration_since(e.enqueued_at) < self.ttl);
        outcome.expired = before - entries.len();
        if outcome.expired > 0 {
            warn!(
                "Discarded {} unresolved vote kick(s) older than {:?}",
                outcome.expired, self.ttl
            );
        }

        entries.retain(|entry| match resolve(&entry.event, roster, true) {
            Some(attribution) => {
                info!(
                    "Votekick started by {} (buffered) [ID={}]",
                    attribution.starter.name, entry.event.player_id
                );
                outcome.resolved.push(attribution);
                false
            }
            None => true,
        });

        outcome.pending = entries.len();
        outcome
    }
}

impl Default for VoteKickBuffer {
    fn default() -> Self {
        Self::new(VOTE_KICK_TTL)
    }
}

fn resolve(event: &VoteKickStart, roster: &Roster, buffered: bool) -> Option<VoteKickAttribution> {
    let starter = roster.find_by_id(event.player_id)?;
    Some(VoteKickAttribution {
        event: event.clone(),
        starter,
        victim: roster.find_by_id(event.victim_id),
        buffered,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlayerUpdate;

    fn vote(player_id: u32, victim_id: u32) -> VoteKickStart {
        VoteKickStart {
            time: "11:00:00.000".to_string(),
            player_id,
            victim_id,
            votes: 1,
            votes_required: 5,
        }
    }

    fn add_player(roster: &Roster, name: &str, id: u32) {
        roster.apply_update(&PlayerUpdate {
            time: "11:00:00.000".to_string(),
            player_id: Some(id),
            player_name: Some(name.to_string()),
            player_uid: Some(format!("uid-{}", id)),
        });
    }

    #[test]
    fn test_immediate_resolution_skips_buffer() {
        let roster = Roster::new();
        add_player(&roster, "Alice", 5);
        add_player(&roster, "Mallory", 7);

        let buffer = VoteKickBuffer::default();
        let attribution = buffer.observe(vote(5, 7), &roster, Instant::now()).unwrap();

        assert_eq!(attribution.starter.name, "Alice");
        assert_eq!(attribution.victim.unwrap().name, "Mallory");
        assert!(!attribution.buffered);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_resolved_entry_removed_on_sweep() {
        let roster = Roster::new();
        let buffer = VoteKickBuffer::default();
        let t0 = Instant::now();

        assert!(buffer.observe(vote(5, 7), &roster, t0).is_none());
        assert_eq!(buffer.len(), 1);

        // Identity arrives later
        add_player(&roster, "Alice", 5);
        let outcome = buffer.sweep(&roster, t0 + Duration::from_secs(60));

        assert_eq!(outcome.resolved.len(), 1);
        assert!(outcome.resolved[0].buffered);
        assert!(outcome.resolved[0].victim.is_none());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_unresolved_entry_expires_at_ttl() {
        let roster = Roster::new();
        let buffer = VoteKickBuffer::default();
        let t0 = Instant::now();
        buffer.enqueue(vote(5, 7), t0);

        let outcome = buffer.sweep(&roster, t0 + VOTE_KICK_TTL - Duration::from_secs(1));
        assert_eq!(outcome.expired, 0);
        assert_eq!(outcome.pending, 1);

        // Resolvable now, but too late
        add_player(&roster, "Alice", 5);
        let outcome = buffer.sweep(&roster, t0 + VOTE_KICK_TTL);
        assert_eq!(outcome.expired, 1);
        assert!(outcome.resolved.is_empty());
        assert!(buffer.is_empty());
    }
}
