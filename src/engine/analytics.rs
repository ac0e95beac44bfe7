//! Aggregate views over the bookings an actor is allowed to list.
//!
//! Listers (staff and auditors) aggregate over every booking, everyone else
//! over their own. The scope is reported with each result so a caller can
//! tell the two apart.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime, Timelike, Weekday};

use crate::model::*;

use super::policy::{allows, authorize, Capability};
use super::{Engine, EngineError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    AllBookings,
    MyBookings,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::AllBookings => "all_bookings",
            Scope::MyBookings => "my_bookings",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookingSummary {
    pub scope: Scope,
    pub total: usize,
    pub pending: usize,
    pub confirmed: usize,
    pub cancelled: usize,
    pub completed: usize,
    /// Bookings created since the first of the current month.
    pub this_month: usize,
    pub last_month: usize,
    pub growth_percent: f64,
    /// Only reported for the all-bookings scope.
    pub avg_per_user: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationHealth {
    Healthy,
    Moderate,
    High,
    Critical,
}

impl CancellationHealth {
    pub fn from_rate(rate_percent: f64) -> Self {
        if rate_percent > 25.0 {
            CancellationHealth::Critical
        } else if rate_percent > 15.0 {
            CancellationHealth::High
        } else if rate_percent > 10.0 {
            CancellationHealth::Moderate
        } else {
            CancellationHealth::Healthy
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CancellationHealth::Healthy => "healthy",
            CancellationHealth::Moderate => "moderate",
            CancellationHealth::High => "high",
            CancellationHealth::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CancellationReport {
    pub scope: Scope,
    pub total: usize,
    pub cancelled: usize,
    pub rate_percent: f64,
    pub health: CancellationHealth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Popularity {
    Low,
    Medium,
    High,
}

impl Popularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Popularity::Low => "low",
            Popularity::Medium => "medium",
            Popularity::High => "high",
        }
    }
}

/// Bookings starting within one hour of the day.
#[derive(Debug, Clone, PartialEq)]
pub struct HourBucket {
    pub hour: u32,
    pub bookings: usize,
    pub percent: f64,
    pub popularity: Popularity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeekdayBucket {
    pub weekday: Weekday,
    pub bookings: usize,
    pub percent: f64,
}

impl WeekdayBucket {
    pub fn day_name(&self) -> &'static str {
        match self.weekday {
            Weekday::Mon => "Monday",
            Weekday::Tue => "Tuesday",
            Weekday::Wed => "Wednesday",
            Weekday::Thu => "Thursday",
            Weekday::Fri => "Friday",
            Weekday::Sat => "Saturday",
            Weekday::Sun => "Sunday",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserActivity {
    pub user_id: UserId,
    pub bookings: usize,
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        round2(part as f64 / total as f64 * 100.0)
    }
}

fn created_on(booking: &Booking) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(booking.created_at).map(|dt| dt.naive_utc().date())
}

pub fn summarize(scope: Scope, bookings: &[Booking], now: NaiveDateTime) -> BookingSummary {
    let count = |status: BookingStatus| bookings.iter().filter(|b| b.status == status).count();

    let month_start = now.date().with_day(1).unwrap_or(now.date());
    let last_month_start = month_start
        .checked_sub_days(Days::new(1))
        .and_then(|d| d.with_day(1))
        .unwrap_or(month_start);
    let (mut this_month, mut last_month) = (0, 0);
    for created in bookings.iter().filter_map(created_on) {
        if created >= month_start {
            this_month += 1;
        } else if created >= last_month_start {
            last_month += 1;
        }
    }
    let growth_percent = if last_month > 0 {
        round2((this_month as f64 - last_month as f64) / last_month as f64 * 100.0)
    } else if this_month > 0 {
        100.0
    } else {
        0.0
    };

    let avg_per_user = (scope == Scope::AllBookings).then(|| {
        let users = per_user_counts(bookings).len();
        if users == 0 {
            0.0
        } else {
            round2(bookings.len() as f64 / users as f64)
        }
    });

    BookingSummary {
        scope,
        total: bookings.len(),
        pending: count(BookingStatus::Pending),
        confirmed: count(BookingStatus::Confirmed),
        cancelled: count(BookingStatus::Cancelled),
        completed: count(BookingStatus::Completed),
        this_month,
        last_month,
        growth_percent,
        avg_per_user,
    }
}

pub fn cancellation_report(scope: Scope, bookings: &[Booking]) -> CancellationReport {
    let cancelled = bookings
        .iter()
        .filter(|b| b.status == BookingStatus::Cancelled)
        .count();
    let rate_percent = percent(cancelled, bookings.len());
    CancellationReport {
        scope,
        total: bookings.len(),
        cancelled,
        rate_percent,
        health: CancellationHealth::from_rate(rate_percent),
    }
}

/// Bookings grouped by start hour, busy hours only, in hour order.
/// Popularity compares each hour against the mean over all 24.
pub fn hourly_distribution(bookings: &[Booking]) -> Vec<HourBucket> {
    let mut by_hour: BTreeMap<u32, usize> = BTreeMap::new();
    for b in bookings {
        *by_hour.entry(b.span.start.hour()).or_default() += 1;
    }
    let total = bookings.len();
    let mean = total as f64 / 24.0;
    by_hour
        .into_iter()
        .map(|(hour, n)| {
            let n_f = n as f64;
            let popularity = if n_f >= mean * 1.5 {
                Popularity::High
            } else if n_f >= mean * 0.5 {
                Popularity::Medium
            } else {
                Popularity::Low
            };
            HourBucket {
                hour,
                bookings: n,
                percent: percent(n, total),
                popularity,
            }
        })
        .collect()
}

/// Bookings grouped by the weekday of their date, Sunday first.
pub fn weekday_distribution(bookings: &[Booking]) -> Vec<WeekdayBucket> {
    let mut by_day: BTreeMap<u32, (Weekday, usize)> = BTreeMap::new();
    for b in bookings {
        let wd = b.date.weekday();
        by_day.entry(wd.num_days_from_sunday()).or_insert((wd, 0)).1 += 1;
    }
    let total = bookings.len();
    by_day
        .into_values()
        .map(|(weekday, n)| WeekdayBucket {
            weekday,
            bookings: n,
            percent: percent(n, total),
        })
        .collect()
}

fn per_user_counts(bookings: &[Booking]) -> BTreeMap<UserId, usize> {
    let mut counts = BTreeMap::new();
    for b in bookings {
        *counts.entry(b.user_id).or_default() += 1;
    }
    counts
}

/// Most active users, busiest first; ties go to the lower user id.
pub fn most_active(bookings: &[Booking], limit: usize) -> Vec<UserActivity> {
    let mut users: Vec<UserActivity> = per_user_counts(bookings)
        .into_iter()
        .map(|(user_id, bookings)| UserActivity { user_id, bookings })
        .collect();
    users.sort_by(|a, b| b.bookings.cmp(&a.bookings).then(a.user_id.cmp(&b.user_id)));
    users.truncate(limit);
    users
}

impl Engine {
    async fn scoped_bookings(&self, actor: &Actor) -> Result<(Scope, Vec<Booking>), EngineError> {
        let scope = if allows(actor, None, Capability::ListAll) {
            Scope::AllBookings
        } else {
            Scope::MyBookings
        };
        let bookings = self.list_bookings(actor, BookingFilter::default()).await?;
        Ok((scope, bookings))
    }

    pub async fn booking_summary(&self, actor: &Actor) -> Result<BookingSummary, EngineError> {
        let (scope, bookings) = self.scoped_bookings(actor).await?;
        Ok(summarize(scope, &bookings, self.clock.now()))
    }

    pub async fn cancellation_rate(&self, actor: &Actor) -> Result<CancellationReport, EngineError> {
        let (scope, bookings) = self.scoped_bookings(actor).await?;
        Ok(cancellation_report(scope, &bookings))
    }

    pub async fn peak_hours(&self, actor: &Actor) -> Result<(Scope, Vec<HourBucket>), EngineError> {
        let (scope, bookings) = self.scoped_bookings(actor).await?;
        Ok((scope, hourly_distribution(&bookings)))
    }

    pub async fn bookings_by_weekday(
        &self,
        actor: &Actor,
    ) -> Result<(Scope, Vec<WeekdayBucket>), EngineError> {
        let (scope, bookings) = self.scoped_bookings(actor).await?;
        Ok((scope, weekday_distribution(&bookings)))
    }

    /// Listers only: ranking users exposes other people's activity.
    pub async fn top_users(
        &self,
        actor: &Actor,
        limit: usize,
    ) -> Result<Vec<UserActivity>, EngineError> {
        authorize(actor, None, Capability::ListAll)?;
        let bookings = self.list_bookings(actor, BookingFilter::default()).await?;
        Ok(most_active(&bookings, limit))
    }
}
