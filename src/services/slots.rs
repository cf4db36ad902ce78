use chrono::{DateTime, Datelike, Duration, LocalResult, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{AvailabilityWindow, Meeting, MeetingStatus};

/// A slot must start at least this far in the future to be offered.
pub const MIN_LEAD_MINUTES: i64 = 15;

/// A candidate bookable interval. Ephemeral: derived from availability
/// minus existing bookings, never persisted, referenced by option index
/// while offered to a prospect.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Slot {
    pub start: DateTime<Utc>,
    pub duration_minutes: i64,
}

impl Slot {
    pub fn end(&self) -> DateTime<Utc> {
        self.start + Duration::minutes(self.duration_minutes)
    }

    pub fn overlaps(&self, other_start: DateTime<Utc>, other_end: DateTime<Utc>) -> bool {
        self.start < other_end && self.end() > other_start
    }
}

/// Expand availability windows into ordered, conflict-free candidate slots.
///
/// Candidates are sorted by start ascending; ties keep window declaration
/// order; duplicate starts from overlapping windows are collapsed. Returns
/// an empty vector when nothing is available; callers treat that as a
/// normal outcome, not an error.
///
/// Pure with respect to its inputs; `booked` is a snapshot, and the ledger
/// re-validates at commit time.
pub fn compute_slots(
    windows: &[AvailabilityWindow],
    booked: &[Meeting],
    duration_minutes: i64,
    horizon_days: i64,
    now: DateTime<Utc>,
) -> Vec<Slot> {
    let earliest = now + Duration::minutes(MIN_LEAD_MINUTES);

    let taken: Vec<(DateTime<Utc>, DateTime<Utc>)> = booked
        .iter()
        .filter(|m| m.status == MeetingStatus::Booked)
        .map(|m| (m.start_at, m.end_at()))
        .collect();

    let mut slots: Vec<Slot> = (0..horizon_days)
        .flat_map(|offset| {
            let day = (now + Duration::days(offset)).date_naive();
            windows
                .iter()
                .filter_map(move |w| expand_window(w, day, duration_minutes))
                .flatten()
        })
        .filter(|slot| slot.start >= earliest)
        .filter(|slot| !taken.iter().any(|(s, e)| slot.overlaps(*s, *e)))
        .collect();

    slots.sort_by_key(|s| s.start);
    slots.dedup_by_key(|s| s.start);
    slots
}

/// Candidate starts for one window on one calendar day, in UTC.
/// Yields nothing when the day-of-week does not match or local times
/// do not resolve (e.g. a DST gap).
fn expand_window(
    window: &AvailabilityWindow,
    day: chrono::NaiveDate,
    duration_minutes: i64,
) -> Option<Vec<Slot>> {
    let weekday = window.day().ok()?;
    let tz = window.tz().ok()?;
    let start = window.start_time().ok()?;
    let end = window.end_time().ok()?;

    if day.weekday() != weekday {
        return None;
    }

    let window_start = resolve_local(&tz, day.and_time(start))?;
    let window_end = resolve_local(&tz, day.and_time(end))?;

    let step = Duration::minutes(duration_minutes);
    let mut cursor = window_start;
    let mut out = vec![];
    while cursor + step <= window_end {
        out.push(Slot {
            start: cursor,
            duration_minutes,
        });
        cursor += step;
    }
    Some(out)
}

fn resolve_local(tz: &chrono_tz::Tz, local: chrono::NaiveDateTime) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earlier, _) => Some(earlier.with_timezone(&Utc)),
        LocalResult::None => None,
    }
}

/// Spoken/display form, rendered in the company's timezone.
pub fn format_slot(slot: &Slot, tz: &chrono_tz::Tz) -> String {
    slot.start
        .with_timezone(tz)
        .format("%A, %B %-d at %-I:%M %p")
        .to_string()
}
