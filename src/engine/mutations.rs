use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{oneshot, RwLock};
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{
    check_no_conflict, check_room_open, validate_date, validate_name, validate_purpose,
    validate_span,
};
use super::history::record;
use super::policy::{allows, authorize, authorize_transition, Capability};
use super::transitions::{Transition, TransitionDenied};
use super::{Engine, EngineError, WalCommand};

/// A booking id reserved in the index. Released on drop unless the booking
/// was committed, including when the create future is dropped mid-flight.
struct IdClaim<'a> {
    index: &'a DashMap<Ulid, Ulid>,
    id: Ulid,
    committed: bool,
}

impl Drop for IdClaim<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.index.remove(&self.id);
        }
    }
}

impl Engine {
    /// Create or refresh a room in the mirror. Returns `true` if it was new.
    pub async fn upsert_room(
        &self,
        actor: &Actor,
        id: Ulid,
        name: Option<String>,
        capacity: u32,
        status: RoomStatus,
    ) -> Result<bool, EngineError> {
        authorize(actor, None, Capability::ManageRooms)?;
        validate_name(name.as_deref())?;
        let event = Event::RoomUpserted {
            id,
            name: name.clone(),
            capacity,
            status,
        };

        if !self.rooms.contains_key(&id) {
            let creating = self.room_creation.lock().await;
            if !self.rooms.contains_key(&id) {
                if self.rooms.len() >= MAX_ROOMS {
                    return Err(EngineError::LimitExceeded("too many rooms"));
                }
                // Publish the room already write-locked so nobody books it
                // before its record is durable.
                let rs = Arc::new(RwLock::new(RoomState::new(id, name, capacity, status)));
                let Ok(mut guard) = rs.clone().try_write_owned() else {
                    return Err(EngineError::Busy(id));
                };
                self.rooms.insert(id, rs);
                if let Err(e) = self.persist_and_apply(&mut guard, &event).await {
                    drop(guard);
                    self.rooms.remove(&id);
                    return Err(e);
                }
                info!("room {id} registered");
                return Ok(true);
            }
            drop(creating);
        }

        let mut guard = self.lock_room(&id).await?;
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(false)
    }

    /// Existing bookings are kept when a room closes; it only stops admitting.
    pub async fn set_room_status(
        &self,
        actor: &Actor,
        id: Ulid,
        status: RoomStatus,
    ) -> Result<(), EngineError> {
        authorize(actor, None, Capability::ManageRooms)?;
        let mut guard = self.lock_room(&id).await?;
        let event = Event::RoomStatusChanged { id, status };
        self.persist_and_apply(&mut guard, &event).await
    }

    pub async fn create_booking(
        &self,
        actor: &Actor,
        id: Ulid,
        room_id: Ulid,
        date: NaiveDate,
        span: Span,
        purpose: Option<String>,
    ) -> Result<Booking, EngineError> {
        authorize(actor, None, Capability::Create)?;
        let user_id = actor
            .user_id
            .ok_or_else(|| EngineError::Validation("booking requires a user id".into()))?;
        validate_span(&span, &self.config)?;
        validate_date(date, self.clock.today())?;
        validate_purpose(purpose.as_deref())?;

        // Claim the id before any await so the same id can't be admitted
        // into two rooms at once.
        let mut claim = match self.booking_to_room.entry(id) {
            Entry::Occupied(_) => return Err(EngineError::AlreadyExists(id)),
            Entry::Vacant(slot) => {
                slot.insert(room_id);
                IdClaim {
                    index: &self.booking_to_room,
                    id,
                    committed: false,
                }
            }
        };
        let booking = self
            .admit_booking(actor, user_id, id, room_id, date, span, purpose)
            .await?;
        claim.committed = true;
        Ok(booking)
    }

    #[allow(clippy::too_many_arguments)]
    async fn admit_booking(
        &self,
        actor: &Actor,
        user_id: UserId,
        id: Ulid,
        room_id: Ulid,
        date: NaiveDate,
        span: Span,
        purpose: Option<String>,
    ) -> Result<Booking, EngineError> {
        let mut guard = self.lock_room(&room_id).await?;
        check_room_open(&guard)?;
        if guard.active_count_on(&date) >= MAX_ACTIVE_BOOKINGS_PER_ROOM_DAY {
            return Err(EngineError::LimitExceeded("too many bookings for room on date"));
        }
        check_no_conflict(&guard, &date, &span, None)?;

        let now = self.clock.now_ms();
        let status = if self.config.approval_required {
            BookingStatus::Pending
        } else {
            BookingStatus::Confirmed
        };
        let booking = Booking {
            id,
            room_id,
            user_id,
            date,
            span,
            status,
            purpose: purpose.filter(|p| !p.is_empty()),
            created_at: now,
            updated_at: now,
            cancelled_at: None,
            cancelled_by: None,
        };
        let entry = record(&guard, &booking, HistoryAction::Created, actor, None, Some(span), now)?;
        let event = Event::BookingTransition {
            booking: booking.clone(),
            entry,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        debug!("booking {id} created in room {room_id} on {date} {span} as {status}");
        Ok(booking)
    }

    /// Reschedule within the same day and/or change the purpose.
    pub async fn update_booking(
        &self,
        actor: &Actor,
        id: Ulid,
        update: BookingUpdate,
    ) -> Result<Booking, EngineError> {
        if update.is_empty() {
            return Err(EngineError::Validation("nothing to update".into()));
        }
        validate_purpose(update.purpose.as_deref())?;

        let (_, mut guard) = self.lock_booking(&id).await?;
        let current = guard.booking(&id).cloned().ok_or(EngineError::NotFound(id))?;
        let deny = |reason: TransitionDenied| EngineError::IllegalTransition {
            booking_id: id,
            reason,
        };
        Transition::Modify.target(current.status).map_err(deny)?;
        authorize_transition(actor, current.user_id, Transition::Modify, false).map_err(deny)?;

        let span = Span::new(
            update.start.unwrap_or(current.span.start),
            update.end.unwrap_or(current.span.end),
        );
        let purpose = match update.purpose {
            Some(p) => (!p.is_empty()).then_some(p),
            None => current.purpose.clone(),
        };
        let span_changed = span != current.span;
        if !span_changed && purpose == current.purpose {
            return Err(EngineError::Validation("update changes nothing".into()));
        }
        if span_changed {
            validate_span(&span, &self.config)?;
            validate_date(current.date, self.clock.today())?;
            check_room_open(&guard)?;
            check_no_conflict(&guard, &current.date, &span, Some(id))?;
        }

        let now = self.clock.now_ms();
        let updated = Booking {
            span,
            purpose,
            updated_at: now,
            ..current.clone()
        };
        let (previous, new) = if span_changed {
            (Some(current.span), Some(span))
        } else {
            (None, None)
        };
        let entry = record(&guard, &updated, HistoryAction::Updated, actor, previous, new, now)?;
        let event = Event::BookingTransition {
            booking: updated.clone(),
            entry,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(updated)
    }

    pub async fn approve_booking(&self, actor: &Actor, id: Ulid) -> Result<Booking, EngineError> {
        self.apply_transition(actor, id, Transition::Approve).await
    }

    pub async fn cancel_booking(&self, actor: &Actor, id: Ulid) -> Result<Booking, EngineError> {
        self.apply_transition(actor, id, Transition::Cancel).await
    }

    pub async fn complete_booking(&self, actor: &Actor, id: Ulid) -> Result<Booking, EngineError> {
        self.apply_transition(actor, id, Transition::Complete).await
    }

    /// Status-only transitions: approve, cancel, complete.
    async fn apply_transition(
        &self,
        actor: &Actor,
        id: Ulid,
        transition: Transition,
    ) -> Result<Booking, EngineError> {
        let (_, mut guard) = self.lock_booking(&id).await?;
        let current = guard.booking(&id).cloned().ok_or(EngineError::NotFound(id))?;
        let deny = |reason: TransitionDenied| EngineError::IllegalTransition {
            booking_id: id,
            reason,
        };
        let to = transition.target(current.status).map_err(deny)?;

        let ends_at = current.ends_at();
        let elapsed = self.clock.now() >= ends_at;
        if let Err(denied) = authorize_transition(actor, current.user_id, transition, elapsed) {
            let early = transition == Transition::Complete
                && !elapsed
                && allows(actor, Some(current.user_id), Capability::Complete { elapsed: true });
            return Err(deny(if early {
                TransitionDenied::NotElapsed { ends_at }
            } else {
                denied
            }));
        }
        if transition.needs_conflict_check() {
            check_no_conflict(&guard, &current.date, &current.span, Some(id))?;
        }

        let now = self.clock.now_ms();
        let mut next = Booking {
            status: to,
            updated_at: now,
            ..current
        };
        if transition == Transition::Cancel {
            next.cancelled_at = Some(now);
            next.cancelled_by = actor.user_id;
        }
        let entry = record(&guard, &next, transition.action(), actor, None, None, now)?;
        let event = Event::BookingTransition {
            booking: next.clone(),
            entry,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        debug!("booking {id} {transition} by {actor}: now {to}");
        Ok(next)
    }

    /// Drop every actor reference to `user_id` from bookings and history.
    /// Returns how many references were cleared.
    pub async fn forget_user(&self, actor: &Actor, user_id: UserId) -> Result<usize, EngineError> {
        authorize(actor, None, Capability::ForgetUsers)?;
        let mut guards = self.lock_all_rooms().await?;
        let event = Event::UserForgotten { user_id };
        self.wal_append(&event).await?;
        let cleared: usize = guards.iter_mut().map(|g| g.anonymize(user_id)).sum();
        info!("forgot user {user_id}: {cleared} references cleared");
        Ok(cleared)
    }

    /// Confirmed bookings whose end is at or before `now`. Rooms that are
    /// locked right now are skipped until the next pass.
    pub fn collect_elapsed_bookings(&self, now: NaiveDateTime) -> Vec<Ulid> {
        let mut elapsed = Vec::new();
        for entry in self.rooms.iter() {
            let Ok(guard) = entry.value().try_read() else {
                continue;
            };
            for day in guard.days.range(..=now.date()).map(|(_, day)| day) {
                elapsed.extend(
                    day.iter()
                        .filter(|b| b.status == BookingStatus::Confirmed && b.ends_at() <= now)
                        .map(|b| b.id),
                );
            }
        }
        elapsed
    }

    /// Complete every elapsed confirmed booking as the system actor.
    pub async fn complete_elapsed(&self) -> usize {
        let system = Actor::system();
        let mut completed = 0;
        for id in self.collect_elapsed_bookings(self.clock.now()) {
            match self.complete_booking(&system, id).await {
                Ok(_) => completed += 1,
                // Someone else may have cancelled or completed it meanwhile.
                Err(e) => debug!("completer skip {id}: {e}"),
            }
        }
        completed
    }

    /// Rewrite the WAL with only what is needed to rebuild the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        // Holding every room's read guard (and the creation gate) until the
        // swap finishes keeps concurrent commits out of the old file.
        let _creating = self.room_creation.lock().await;
        let guards = self.read_all_rooms().await?;
        let mut events = Vec::new();
        for rs in &guards {
            events.push(Event::RoomUpserted {
                id: rs.id,
                name: rs.name.clone(),
                capacity: rs.capacity,
                status: rs.status,
            });
            for booking in rs.all_bookings() {
                events.push(Event::BookingRestored {
                    booking: booking.clone(),
                    history: rs.history_of(&booking.id).to_vec(),
                });
            }
        }
        let records = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Persistence("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Persistence("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Persistence(e.to_string()))?;
        info!("WAL compacted to {records} records");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
