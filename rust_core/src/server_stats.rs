//! Latest server health sample (FPS, memory, player count).

use crate::models::ServerHealth;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStats {
    pub fps: Option<f64>,
    pub memory_kb: Option<u64>,
    pub player_count: Option<u32>,
    /// Log-local time of the sample
    pub sample_time: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Owner of the health snapshot; everyone else reads copies.
#[derive(Debug, Default)]
pub struct ServerStatsTracker {
    current: RwLock<ServerStats>,
}

impl ServerStatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, sample: &ServerHealth) {
        let mut current = self.current.write();
        current.fps = Some(sample.fps);
        current.memory_kb = Some(sample.memory_kb);
        current.player_count = Some(sample.player_count);
        current.sample_time = Some(sample.time.clone());
        current.updated_at = Some(Utc::now());
    }

    pub fn snapshot(&self) -> ServerStats {
        self.current.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_replaces_snapshot() {
        let tracker = ServerStatsTracker::new();
        assert_eq!(tracker.snapshot(), ServerStats::default());

        tracker.record(&ServerHealth {
            time: "10:00:00.000".to_string(),
            fps: 48.5,
            memory_kb: 1024,
            player_count: 3,
        });

        let stats = tracker.snapshot();
        assert_eq!(stats.fps, Some(48.5));
        assert_eq!(stats.memory_kb, Some(1024));
        assert_eq!(stats.player_count, Some(3));
        assert_eq!(stats.sample_time.as_deref(), Some("10:00:00.000"));
        assert!(stats.updated_at.is_some());
    }
}
