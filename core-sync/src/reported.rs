//! Push-fed playback source
//!
//! The browser extension reports what the user is listening to; workers of
//! `browser` sessions read the latest report instead of calling an API.

use async_trait::async_trait;
use bridge_traits::playback::{PlaybackError, PlaybackSnapshot, PlaybackSource};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

struct Report {
    snapshot: PlaybackSnapshot,
    received_at: Instant,
}

/// Latest reported snapshot per user.
///
/// A report older than `staleness` reads as "not playing", so a closed tab
/// eventually restores the original status. Stale reports are dropped on
/// the next `report` from anyone.
pub struct ReportedPlaybackSource {
    reports: RwLock<HashMap<String, Report>>,
    staleness: Duration,
}

impl ReportedPlaybackSource {
    pub fn new(staleness: Duration) -> Self {
        Self {
            reports: RwLock::new(HashMap::new()),
            staleness,
        }
    }

    pub fn report(&self, user_id: &str, snapshot: PlaybackSnapshot) {
        debug!(
            user_id,
            is_playing = snapshot.is_playing,
            "Received playback report"
        );

        let mut reports = match self.reports.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let staleness = self.staleness;
        reports.retain(|_, report| report.received_at.elapsed() <= staleness);
        reports.insert(
            user_id.to_string(),
            Report {
                snapshot,
                received_at: Instant::now(),
            },
        );
    }

    pub fn forget(&self, user_id: &str) {
        let mut reports = match self.reports.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        reports.remove(user_id);
    }

    fn latest(&self, user_id: &str) -> PlaybackSnapshot {
        let reports = match self.reports.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        match reports.get(user_id) {
            Some(report) if report.received_at.elapsed() <= self.staleness => {
                report.snapshot.clone()
            }
            Some(_) => {
                debug!(user_id, "Playback report is stale");
                PlaybackSnapshot::not_playing()
            }
            None => PlaybackSnapshot::not_playing(),
        }
    }
}

#[async_trait]
impl PlaybackSource for ReportedPlaybackSource {
    async fn current_playback(
        &self,
        user_id: &str,
        _access_token: &str,
    ) -> Result<PlaybackSnapshot, PlaybackError> {
        Ok(self.latest(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::TrackInfo;

    #[tokio::test]
    async fn test_unknown_user_is_not_playing() {
        let source = ReportedPlaybackSource::new(Duration::from_secs(90));
        let snapshot = source.current_playback("U1", "").await.unwrap();
        assert_eq!(snapshot, PlaybackSnapshot::not_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_expires_after_staleness() {
        let source = ReportedPlaybackSource::new(Duration::from_secs(90));
        let playing = PlaybackSnapshot::playing(TrackInfo::new("Song A", ["Artist X"]));
        source.report("U1", playing.clone());

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(source.current_playback("U1", "").await.unwrap(), playing);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(
            source.current_playback("U1", "").await.unwrap(),
            PlaybackSnapshot::not_playing()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_reports_are_evicted() {
        let source = ReportedPlaybackSource::new(Duration::from_secs(90));
        for user in ["U1", "U2", "U3"] {
            source.report(user, PlaybackSnapshot::not_playing());
        }

        tokio::time::advance(Duration::from_secs(60)).await;
        source.report(
            "U2",
            PlaybackSnapshot::playing(TrackInfo::new("Song A", ["Artist X"])),
        );

        tokio::time::advance(Duration::from_secs(31)).await;
        source.report("U4", PlaybackSnapshot::not_playing());

        let mut kept: Vec<String> = source.reports.read().unwrap().keys().cloned().collect();
        kept.sort();
        assert_eq!(kept, vec!["U2".to_string(), "U4".to_string()]);
        assert!(source.current_playback("U2", "").await.unwrap().is_playing);
    }

    #[tokio::test]
    async fn test_reports_are_per_user() {
        let source = ReportedPlaybackSource::new(Duration::from_secs(90));
        source.report(
            "U1",
            PlaybackSnapshot::playing(TrackInfo::new("Song A", ["Artist X"])),
        );

        assert!(source.current_playback("U1", "").await.unwrap().is_playing);
        assert!(!source.current_playback("U2", "").await.unwrap().is_playing);

        source.forget("U1");
        assert!(!source.current_playback("U1", "").await.unwrap().is_playing);
    }
}
