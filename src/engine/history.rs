use ulid::Ulid;

use crate::limits::MAX_HISTORY_PER_BOOKING;
use crate::model::*;

use super::policy::{authorize, Capability};
use super::{Engine, EngineError};

/// Build the audit entry for a transition of `booking`. The timestamp never
/// runs behind the booking's last entry, even if the clock stepped back.
pub(crate) fn record(
    rs: &RoomState,
    booking: &Booking,
    action: HistoryAction,
    actor: &Actor,
    previous: Option<Span>,
    new: Option<Span>,
    now: Ms,
) -> Result<HistoryEntry, EngineError> {
    let trail = rs.history_of(&booking.id);
    // Only edits are capped: approve, cancel and complete happen at most once
    // and must stay reachable from a booking at the limit.
    if action == HistoryAction::Updated && trail.len() >= MAX_HISTORY_PER_BOOKING {
        return Err(EngineError::LimitExceeded("too many history entries for booking"));
    }
    let floor = trail.last().map_or(now, |last| last.timestamp);
    Ok(HistoryEntry {
        id: Ulid::new(),
        booking_id: booking.id,
        room_id: booking.room_id,
        user_id: booking.user_id,
        action,
        changed_by: actor.user_id,
        previous,
        new,
        timestamp: now.max(floor),
    })
}

impl Engine {
    /// The booking's audit trail in commit order.
    pub async fn get_booking_history(
        &self,
        actor: &Actor,
        booking_id: Ulid,
    ) -> Result<Vec<HistoryEntry>, EngineError> {
        let guard = self.read_booking(&booking_id).await?;
        let booking = guard
            .booking(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        authorize(actor, Some(booking.user_id), Capability::ViewHistory)?;
        Ok(guard.history_of(&booking_id).to_vec())
    }
}
