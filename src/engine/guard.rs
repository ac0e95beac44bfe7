//! Per-room admission guard. Every acquisition is bounded by the configured
//! lock timeout; running out of time is the retryable `Busy` error.

use std::time::Instant;

use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard};
use tracing::debug;
use ulid::Ulid;

use crate::model::RoomState;
use crate::observability::{GUARD_BUSY_TOTAL, GUARD_WAIT_SECONDS};

use super::{Engine, EngineError};

pub(crate) type RoomWriteGuard = OwnedRwLockWriteGuard<RoomState>;
pub(crate) type RoomReadGuard = OwnedRwLockReadGuard<RoomState>;

impl Engine {
    /// Exclusive access to one room, or `Busy` after `lock_timeout`.
    pub(crate) async fn lock_room(&self, room_id: &Ulid) -> Result<RoomWriteGuard, EngineError> {
        let rs = self
            .get_room(room_id)
            .ok_or(EngineError::RoomNotFound(*room_id))?;
        let started = Instant::now();
        let acquired = tokio::time::timeout(self.config.lock_timeout, rs.write_owned()).await;
        metrics::histogram!(GUARD_WAIT_SECONDS).record(started.elapsed().as_secs_f64());
        acquired.map_err(|_| {
            metrics::counter!(GUARD_BUSY_TOTAL).increment(1);
            debug!("guard timeout on room {room_id}");
            EngineError::Busy(*room_id)
        })
    }

    /// Shared access for reads. Readers wait behind a writer, so they get the
    /// same bound.
    pub(crate) async fn read_room(&self, room_id: &Ulid) -> Result<RoomReadGuard, EngineError> {
        let rs = self
            .get_room(room_id)
            .ok_or(EngineError::RoomNotFound(*room_id))?;
        tokio::time::timeout(self.config.lock_timeout, rs.read_owned())
            .await
            .map_err(|_| {
                metrics::counter!(GUARD_BUSY_TOTAL).increment(1);
                EngineError::Busy(*room_id)
            })
    }

    /// Resolve booking → room and take the room's write guard.
    pub(crate) async fn lock_booking(
        &self,
        booking_id: &Ulid,
    ) -> Result<(Ulid, RoomWriteGuard), EngineError> {
        let room_id = self
            .room_for_booking(booking_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        let guard = self.lock_room(&room_id).await?;
        Ok((room_id, guard))
    }

    pub(crate) async fn read_booking(&self, booking_id: &Ulid) -> Result<RoomReadGuard, EngineError> {
        let room_id = self
            .room_for_booking(booking_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        self.read_room(&room_id).await
    }

    /// Write guards on every room, taken in id order so two callers can
    /// never deadlock against each other.
    pub(crate) async fn lock_all_rooms(&self) -> Result<Vec<RoomWriteGuard>, EngineError> {
        let mut ids: Vec<Ulid> = self.rooms.iter().map(|e| *e.key()).collect();
        ids.sort();
        let mut guards = Vec::with_capacity(ids.len());
        for id in &ids {
            guards.push(self.lock_room(id).await?);
        }
        Ok(guards)
    }

    /// Read guards on every room in id order.
    pub(crate) async fn read_all_rooms(&self) -> Result<Vec<RoomReadGuard>, EngineError> {
        let mut ids: Vec<Ulid> = self.rooms.iter().map(|e| *e.key()).collect();
        ids.sort();
        let mut guards = Vec::with_capacity(ids.len());
        for id in &ids {
            guards.push(self.read_room(id).await?);
        }
        Ok(guards)
    }
}
