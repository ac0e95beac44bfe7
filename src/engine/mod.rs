pub mod analytics;
mod availability;
mod conflict;
mod error;
mod guard;
mod history;
mod mutations;
pub mod policy;
mod queries;
pub mod transitions;

pub use availability::{free_gaps, merge_overlapping, subtract_intervals};
pub use error::EngineError;
pub use transitions::{Transition, TransitionDenied};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::model::*;
use crate::wal::Wal;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders with the batch result.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_non_append(&mut wal, cmd);
            continue;
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    // Compaction must see every append queued before it.
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }
        commit_batch(&mut wal, &mut batch);
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
    debug!("WAL writer stopped");
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(ref e) = result {
        warn!("WAL flush of {} records failed: {e}", batch.len());
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so stray buffered bytes don't leak
    // into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result =
                Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let mut batch = vec![(event, response)];
            commit_batch(wal, &mut batch);
        }
    }
}

/// The booking core. Rooms are independent: every admission decision for a
/// room runs under that room's write lock, never a global one.
pub struct Engine {
    pub rooms: DashMap<Ulid, SharedRoomState>,
    /// Reverse lookup: booking id → room id.
    pub(super) booking_to_room: DashMap<Ulid, Ulid>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Serializes room creation with compaction.
    pub(super) room_creation: Mutex<()>,
    pub config: EngineConfig,
    pub clock: Arc<dyn Clock>,
}

/// Apply an event to a room (no locking: caller holds the write guard).
fn apply_to_room(rs: &mut RoomState, event: &Event, index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::RoomUpserted {
            name,
            capacity,
            status,
            ..
        } => {
            rs.name = name.clone();
            rs.capacity = *capacity;
            rs.status = *status;
        }
        Event::RoomStatusChanged { status, .. } => rs.status = *status,
        Event::BookingTransition { booking, entry } => {
            index.insert(booking.id, rs.id);
            rs.upsert_booking(booking.clone());
            rs.append_history(entry.clone());
        }
        Event::BookingRestored { booking, history } => {
            index.insert(booking.id, rs.id);
            rs.upsert_booking(booking.clone());
            rs.history.insert(booking.id, history.clone());
        }
        Event::UserForgotten { user_id } => {
            rs.anonymize(*user_id);
        }
    }
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            rooms: DashMap::new(),
            booking_to_room: DashMap::new(),
            wal_tx,
            room_creation: Mutex::new(()),
            config,
            clock,
        };

        // We are the sole owner of these Arcs during replay, so try_write
        // always succeeds. Never block here: this runs inside a runtime.
        for event in &events {
            engine.replay_event(event);
        }
        debug!(
            "replayed {} WAL records into {} rooms",
            events.len(),
            engine.rooms.len()
        );

        Ok(engine)
    }

    fn replay_event(&self, event: &Event) {
        match event {
            Event::RoomUpserted {
                id,
                name,
                capacity,
                status,
            } => {
                let rs = self.rooms.entry(*id).or_insert_with(|| {
                    Arc::new(RwLock::new(RoomState::new(*id, None, 0, *status)))
                });
                if let Ok(mut guard) = rs.try_write() {
                    guard.name = name.clone();
                    guard.capacity = *capacity;
                    guard.status = *status;
                }
            }
            Event::UserForgotten { .. } => {
                for entry in self.rooms.iter() {
                    if let Ok(mut guard) = entry.value().try_write() {
                        apply_to_room(&mut guard, event, &self.booking_to_room);
                    }
                }
            }
            other => {
                let Some(room_id) = other.room_id() else { return };
                let Some(rs) = self.get_room(&room_id) else {
                    warn!("replay: record for unknown room {room_id} skipped");
                    return;
                };
                if let Ok(mut guard) = rs.try_write() {
                    apply_to_room(&mut guard, other, &self.booking_to_room);
                }
            }
        }
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Persistence("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Persistence("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Persistence(e.to_string()))
    }

    pub fn get_room(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn room_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_room.get(booking_id).map(|e| *e.value())
    }

    /// WAL-append, then apply. Nothing touches memory if the
    /// append fails.
    pub(super) async fn persist_and_apply(
        &self,
        rs: &mut RoomState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_room(rs, event, &self.booking_to_room);
        if let Event::BookingTransition { entry, .. } = event {
            metrics::counter!(
                crate::observability::BOOKING_TRANSITIONS_TOTAL,
                "action" => entry.action.as_str()
            )
            .increment(1);
        }
        Ok(())
    }
}
