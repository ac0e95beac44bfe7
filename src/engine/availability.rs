use chrono::NaiveDate;

use crate::model::*;

// ── Free-slot algorithm ───────────────────────────────────────────

/// Gaps of the bookable day on `date` not covered by active bookings,
/// dropping any gap shorter than `min_minutes` (at least one minute).
pub fn free_gaps(rs: &RoomState, date: &NaiveDate, min_minutes: Option<i64>) -> Vec<Span> {
    let day = Span::whole_day();
    // Days are kept sorted by start, so the occupied spans already are too.
    let occupied: Vec<Span> = rs
        .bookings_on(date)
        .iter()
        .filter(|b| b.is_active())
        .map(|b| b.span)
        .collect();
    let occupied = merge_overlapping(&occupied);
    let mut free = subtract_intervals(&[day], &occupied);
    // Slivers under a minute, like the tail after a booking that ends at
    // 23:59:59, are not bookable.
    let min = min_minutes.unwrap_or(0).max(1);
    free.retain(|s| s.duration_minutes() >= min);
    free
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}

/// `base` minus `to_remove`. Both inputs sorted by start and disjoint.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}
