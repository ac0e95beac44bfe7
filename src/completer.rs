use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::engine::Engine;

/// Background task that periodically completes confirmed bookings whose end
/// time has passed.
pub async fn run_completer(engine: Arc<Engine>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let completed = engine.complete_elapsed().await;
        if completed > 0 {
            info!("completed {completed} elapsed bookings");
        }
    }
}

/// Background task that rewrites the WAL once enough appends piled up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        if let Err(e) = engine.compact_wal().await {
            warn!("WAL compaction after {appends} appends failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::EngineConfig;
    use crate::model::*;
    use chrono::{NaiveDate, NaiveTime};
    use std::path::PathBuf;
    use tokio_test::assert_ok;
    use ulid::Ulid;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("roombook_test_completer");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[tokio::test]
    async fn completes_only_elapsed_confirmed_bookings() {
        let date = NaiveDate::from_ymd_opt(2026, 11, 2).unwrap();
        let clock = Arc::new(ManualClock::at(date.and_time(t(8, 0))));
        let engine =
            Engine::new(test_wal_path("elapsed.wal"), EngineConfig::default(), clock.clone())
                .unwrap();

        let admin = Actor::user(1, Role::Admin);
        let alice = Actor::user(2, Role::RegularUser);
        let room = Ulid::new();
        engine
            .upsert_room(&admin, room, Some("Oak".into()), 6, RoomStatus::Available)
            .await
            .unwrap();

        let early = Ulid::new();
        let late = Ulid::new();
        let cancelled = Ulid::new();
        engine
            .create_booking(&alice, early, room, date, Span::new(t(9, 0), t(10, 0)), None)
            .await
            .unwrap();
        engine
            .create_booking(&alice, late, room, date, Span::new(t(14, 0), t(15, 0)), None)
            .await
            .unwrap();
        engine
            .create_booking(&alice, cancelled, room, date, Span::new(t(10, 0), t(11, 0)), None)
            .await
            .unwrap();
        assert_ok!(engine.cancel_booking(&alice, cancelled).await);

        assert_eq!(engine.complete_elapsed().await, 0);

        clock.set(date.and_time(t(12, 0)));
        assert_eq!(engine.complete_elapsed().await, 1);
        assert_eq!(
            engine.get_booking(&admin, early).await.unwrap().status,
            BookingStatus::Completed
        );
        assert_eq!(
            engine.get_booking(&admin, late).await.unwrap().status,
            BookingStatus::Confirmed
        );
        assert_eq!(
            engine.get_booking(&admin, cancelled).await.unwrap().status,
            BookingStatus::Cancelled
        );

        let history = engine.get_booking_history(&admin, early).await.unwrap();
        let last = history.last().unwrap();
        assert_eq!(last.action, HistoryAction::Completed);
        assert_eq!(last.changed_by, None);

        // A second pass finds nothing new.
        assert_eq!(engine.complete_elapsed().await, 0);
    }
}
