use std::cmp::Reverse;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::availability::free_gaps;
use super::conflict::{find_conflict, validate_span};
use super::policy::{allows, authorize, Capability};
use super::{Engine, EngineError};

impl Engine {
    pub async fn get_booking(&self, actor: &Actor, id: Ulid) -> Result<Booking, EngineError> {
        let guard = self.read_booking(&id).await?;
        let booking = guard.booking(&id).ok_or(EngineError::NotFound(id))?;
        authorize(actor, Some(booking.user_id), Capability::View)?;
        Ok(booking.clone())
    }

    /// Bookings matching `filter`, newest date first and latest start first
    /// within a day. Actors that may not list everything only see their own.
    pub async fn list_bookings(
        &self,
        actor: &Actor,
        mut filter: BookingFilter,
    ) -> Result<Vec<Booking>, EngineError> {
        if !allows(actor, None, Capability::ListAll) {
            match (filter.user_id, actor.user_id) {
                (Some(wanted), Some(me)) if wanted != me => {
                    return Err(EngineError::Forbidden(format!(
                        "{actor} may only list their own bookings"
                    )));
                }
                (_, Some(me)) => filter.user_id = Some(me),
                (_, None) => return Ok(Vec::new()),
            }
        }

        let room_ids: Vec<Ulid> = match filter.room_id {
            Some(id) => vec![id],
            None => self.rooms.iter().map(|e| *e.key()).collect(),
        };
        let mut out = Vec::new();
        for room_id in &room_ids {
            let guard = match self.read_room(room_id).await {
                Ok(g) => g,
                Err(EngineError::RoomNotFound(_)) if filter.room_id.is_none() => continue,
                Err(e) => return Err(e),
            };
            match filter.date {
                Some(date) => out.extend(
                    guard
                        .bookings_on(&date)
                        .iter()
                        .filter(|b| filter.matches(b))
                        .cloned(),
                ),
                None => out.extend(guard.all_bookings().filter(|b| filter.matches(b)).cloned()),
            }
        }
        out.sort_by_key(|b| Reverse((b.date, b.span.start, b.id)));
        Ok(out)
    }

    /// Everything still occupying or having occupied the room that day,
    /// i.e. all non-cancelled bookings, by start time.
    pub async fn room_schedule(
        &self,
        room_id: Ulid,
        date: NaiveDate,
    ) -> Result<Vec<Booking>, EngineError> {
        let guard = self.read_room(&room_id).await?;
        Ok(guard
            .bookings_on(&date)
            .iter()
            .filter(|b| b.status != BookingStatus::Cancelled)
            .cloned()
            .collect())
    }

    /// Point-in-time probe. Takes only the read guard, so the answer can be
    /// stale by the time a create runs.
    pub async fn check_room_availability(
        &self,
        room_id: Ulid,
        date: NaiveDate,
        span: Span,
    ) -> Result<AvailabilityReport, EngineError> {
        validate_span(&span, &self.config)?;
        let guard = self.read_room(&room_id).await?;
        let conflict = find_conflict(&guard, &date, &span, None).map(|b| (b.id, b.span));
        Ok(AvailabilityReport {
            room_id,
            date,
            span,
            room_status: guard.status,
            conflict,
        })
    }

    pub async fn free_slots(
        &self,
        room_id: Ulid,
        date: NaiveDate,
        min_minutes: Option<i64>,
    ) -> Result<Vec<Span>, EngineError> {
        if min_minutes.is_some_and(|m| m < 0) {
            return Err(EngineError::Validation("min_duration must not be negative".into()));
        }
        let guard = self.read_room(&room_id).await?;
        Ok(free_gaps(&guard, &date, min_minutes))
    }

    pub async fn list_rooms(&self) -> Result<Vec<RoomInfo>, EngineError> {
        let guards = self.read_all_rooms().await?;
        Ok(guards
            .iter()
            .map(|rs| RoomInfo {
                id: rs.id,
                name: rs.name.clone(),
                capacity: rs.capacity,
                status: rs.status,
            })
            .collect())
    }
}
