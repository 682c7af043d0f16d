//! Canonical player list
//!
//! Player facts arrive from three sources in no guaranteed order:
//! - RCON roster snapshots (name, number, id, uid)
//! - log join events (name, number, ip, optional BE GUID / SteamID / device)
//! - log identity updates (name, id, uid)
//!
//! `Roster` is the only writer of the list. Records are keyed by name, and
//! `id` / `uid` are never changed once set. Every mutation happens under a
//! single write lock so readers never observe a half-applied snapshot.

use crate::models::{PlayerJoined, PlayerRecord, PlayerUpdate};
use parking_lot::RwLock;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// One row of an RCON player list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub name: String,
    pub number: Option<u32>,
    pub id: Option<u32>,
    pub uid: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Filled a previously unset id and/or uid
    Enriched,
    /// Record exists and already had everything the event carried
    Unchanged,
    Created,
    /// Not enough data to create a record
    Dropped,
}

#[derive(Debug, Default)]
pub struct Roster {
    players: RwLock<Vec<PlayerRecord>>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current list
    pub fn players(&self) -> Vec<PlayerRecord> {
        self.players.read().clone()
    }

    pub fn len(&self) -> usize {
        self.players.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.read().is_empty()
    }

    pub fn find_by_name(&self, name: &str) -> Option<PlayerRecord> {
        self.players.read().iter().find(|p| p.name == name).cloned()
    }

    pub fn find_by_id(&self, id: u32) -> Option<PlayerRecord> {
        self.players.read().iter().find(|p| p.id == Some(id)).cloned()
    }

    /// Replace the list with an RCON snapshot. Returns the new list.
    ///
    /// Names absent from the snapshot are dropped. Names still present keep
    /// their log-derived fields (ip, BE GUID, SteamID, device) and any id/uid
    /// already set, so the result does not depend on whether the join line
    /// or the snapshot arrived first.
    pub fn apply_snapshot(&self, entries: Vec<RosterEntry>) -> Vec<PlayerRecord> {
        let mut players = self.players.write();

        let mut seen = HashSet::new();
        let mut next = Vec::with_capacity(entries.len());
        for entry in entries {
            if !seen.insert(entry.name.clone()) {
                warn!("Duplicate name '{}' in roster snapshot, keeping first", entry.name);
                continue;
            }

            let record = match players.iter().find(|p| p.name == entry.name) {
                Some(prev) => {
                    if let (Some(old), Some(new)) = (prev.id, entry.id) {
                        if old != new {
                            debug!("Keeping id {} for {} (snapshot reported {})", old, prev.name, new);
                        }
                    }
                    PlayerRecord {
                        name: entry.name,
                        number: entry.number.or(prev.number),
                        ip: prev.ip.clone(),
                        be_guid: prev.be_guid.clone(),
                        steam_id: prev.steam_id.clone(),
                        device: prev.device.clone(),
                        id: prev.id.or(entry.id),
                        uid: prev.uid.clone().or(entry.uid),
                    }
                }
                None => PlayerRecord {
                    name: entry.name,
                    number: entry.number,
                    id: entry.id,
                    uid: entry.uid,
                    ..PlayerRecord::default()
                },
            };
            next.push(record);
        }

        debug!(
            "Roster snapshot applied: {} -> {} players",
            players.len(),
            next.len()
        );
        *players = next;
        players.clone()
    }

    /// Merge a log join event.
    pub fn apply_joined(&self, event: &PlayerJoined) {
        let mut players = self.players.write();

        match players.iter_mut().find(|p| p.name == event.player_name) {
            Some(existing) => {
                existing.ip = Some(event.player_ip.clone());
                if event.be_guid.is_some() {
                    existing.be_guid = event.be_guid.clone();
                }
                if event.steam_id.is_some() {
                    existing.steam_id = event.steam_id.clone();
                }
                if event.device.is_some() {
                    existing.device = event.device.clone();
                }
            }
            None => {
                players.push(PlayerRecord {
                    name: event.player_name.clone(),
                    number: Some(event.player_number),
                    ip: Some(event.player_ip.clone()),
                    be_guid: event.be_guid.clone(),
                    steam_id: event.steam_id.clone(),
                    device: event.device.clone(),
                    ..PlayerRecord::default()
                });
            }
        }
    }

    /// Merge a log identity update.
    pub fn apply_update(&self, event: &PlayerUpdate) -> UpdateOutcome {
        let mut players = self.players.write();

        let existing = match event.player_name.as_deref() {
            Some(name) => players.iter_mut().find(|p| p.name == name),
            None => None,
        };

        if let Some(record) = existing {
            let mut changed = false;
            if record.id.is_none() && event.player_id.is_some() {
                record.id = event.player_id;
                changed = true;
            }
            if record.uid.is_none() && event.player_uid.is_some() {
                record.uid = event.player_uid.clone();
                changed = true;
            }
            return if changed {
                UpdateOutcome::Enriched
            } else {
                UpdateOutcome::Unchanged
            };
        }

        match (&event.player_name, event.player_id, &event.player_uid) {
            (Some(name), Some(id), Some(uid)) => {
                players.push(PlayerRecord {
                    name: name.clone(),
                    id: Some(id),
                    uid: Some(uid.clone()),
                    ..PlayerRecord::default()
                });
                info!("Added player from identity update: {} (ID={}, UID={})", name, id, uid);
                UpdateOutcome::Created
            }
            _ => {
                warn!(
                    "Cannot create player from update, missing fields: name={:?} id={:?} uid={:?}",
                    event.player_name, event.player_id, event.player_uid
                );
                UpdateOutcome::Dropped
            }
        }
    }
}
