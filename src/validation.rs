//! Booking validation: window sanity, advance-notice rule and
//! half-open interval conflict detection.
//!
//! The checks here are pure; callers run them inside the same database
//! transaction that inserts or updates the booking, with the unique
//! constraint on (resource, start, end, user) as the backstop for races
//! the application-level check cannot see.

use chrono::{DateTime, Duration, Utc};

use crate::errors::ApiError;
use crate::models::Booking;

pub const DEFAULT_LEAD_TIME_MINUTES: i64 = 30;

#[derive(Debug, Clone, Copy)]
pub struct ValidationPolicy {
    pub lead_time: Duration,
    pub enforce_lead_time: bool,
}

impl ValidationPolicy {
    pub fn standard(lead_time_minutes: i64) -> Self {
        ValidationPolicy {
            lead_time: Duration::minutes(lead_time_minutes),
            enforce_lead_time: true,
        }
    }

    /// Soft validation for privileged update paths: the overlap check
    /// still runs, the lead-time check does not.
    pub fn relaxed(lead_time_minutes: i64) -> Self {
        ValidationPolicy {
            lead_time: Duration::minutes(lead_time_minutes),
            enforce_lead_time: false,
        }
    }
}

pub fn check_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), ApiError> {
    if start >= end {
        return Err(ApiError::validation("End time must be after start time."));
    }
    Ok(())
}

/// Rejects starts closer than `lead_time` to `now`. A start exactly at
/// `now + lead_time` is allowed.
pub fn check_lead_time(
    now: DateTime<Utc>,
    start: DateTime<Utc>,
    lead_time: Duration,
) -> Result<(), ApiError> {
    let earliest = now + lead_time;
    if start < earliest {
        return Err(ApiError::LeadTime {
            minutes: lead_time.num_minutes(),
            earliest,
        });
    }
    Ok(())
}

/// Finds a booking whose [start, end) window overlaps the candidate
/// window: existing.start < end AND existing.end > start. Touching
/// endpoints do not overlap. Cancelled and rejected bookings never
/// block, and `exclude_id` skips the booking being updated.
pub fn find_conflict<'a>(
    existing: &'a [Booking],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exclude_id: Option<i32>,
) -> Option<&'a Booking> {
    existing.iter().find(|b| {
        exclude_id != Some(b.id)
            && b.status.blocks_window()
            && b.start_time < end
            && b.end_time > start
    })
}

pub fn check_conflict(
    existing: &[Booking],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exclude_id: Option<i32>,
) -> Result<(), ApiError> {
    if let Some(conflict) = find_conflict(existing, start, end, exclude_id) {
        return Err(ApiError::conflict(format!(
            "This resource is already booked from {} to {}.",
            conflict.start_time.format("%Y-%m-%d %H:%M"),
            conflict.end_time.format("%H:%M"),
        )));
    }
    Ok(())
}

pub fn validate_booking(
    now: DateTime<Utc>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    existing: &[Booking],
    exclude_id: Option<i32>,
    policy: ValidationPolicy,
) -> Result<(), ApiError> {
    check_window(start, end)?;
    if policy.enforce_lead_time {
        check_lead_time(now, start, policy.lead_time)?;
    }
    check_conflict(existing, start, end, exclude_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BookingStatus;
    use chrono::TimeZone;

    fn t(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, 1, hour, minute, 0).unwrap()
    }

    fn booking(id: i32, start: DateTime<Utc>, end: DateTime<Utc>, status: BookingStatus) -> Booking {
        Booking {
            id,
            user_id: 1,
            resource_id: 1,
            start_time: start,
            end_time: end,
            status,
            notes: String::new(),
            created_at: t(0, 0),
            updated_at: t(0, 0),
        }
    }

    #[test]
    fn rejects_inverted_or_empty_window() {
        assert!(check_window(t(10, 0), t(9, 0)).is_err());
        assert!(check_window(t(10, 0), t(10, 0)).is_err());
        assert!(check_window(t(9, 0), t(10, 0)).is_ok());
    }

    #[test]
    fn lead_time_boundary_is_inclusive() {
        let now = t(12, 0);
        let lead = Duration::minutes(30);
        assert!(check_lead_time(now, t(12, 30), lead).is_ok());
        assert!(matches!(
            check_lead_time(now, t(12, 29), lead),
            Err(ApiError::LeadTime { minutes: 30, .. })
        ));
    }

    #[test]
    fn overlapping_active_booking_conflicts() {
        let existing = vec![booking(1, t(14, 0), t(16, 0), BookingStatus::Confirmed)];
        assert!(find_conflict(&existing, t(15, 0), t(17, 0), None).is_some());
        assert!(find_conflict(&existing, t(13, 0), t(15, 0), None).is_some());
        // fully contained and fully containing windows
        assert!(find_conflict(&existing, t(14, 30), t(15, 30), None).is_some());
        assert!(find_conflict(&existing, t(13, 0), t(18, 0), None).is_some());
    }

    #[test]
    fn touching_endpoints_do_not_conflict() {
        let existing = vec![booking(1, t(14, 0), t(16, 0), BookingStatus::Confirmed)];
        assert!(find_conflict(&existing, t(16, 0), t(18, 0), None).is_none());
        assert!(find_conflict(&existing, t(13, 0), t(14, 0), None).is_none());
    }

    #[test]
    fn cancelled_and_rejected_bookings_free_their_window() {
        let existing = vec![
            booking(1, t(14, 0), t(16, 0), BookingStatus::Cancelled),
            booking(2, t(14, 0), t(16, 0), BookingStatus::Rejected),
        ];
        assert!(find_conflict(&existing, t(14, 0), t(16, 0), None).is_none());
    }

    #[test]
    fn updating_to_own_window_is_allowed() {
        let existing = vec![booking(7, t(14, 0), t(16, 0), BookingStatus::Pending)];
        assert!(find_conflict(&existing, t(14, 0), t(16, 0), Some(7)).is_none());
        // but another booking's identical window still conflicts
        assert!(find_conflict(&existing, t(14, 0), t(16, 0), Some(8)).is_some());
    }

    #[test]
    fn reviving_a_booking_into_a_taken_window_conflicts() {
        // booking 7 was cancelled and booking 8 has since claimed its window;
        // flipping 7 back to an active status must not slip past the scan
        let existing = vec![booking(8, t(14, 0), t(16, 0), BookingStatus::Pending)];
        assert!(matches!(
            check_conflict(&existing, t(14, 0), t(16, 0), Some(7)),
            Err(ApiError::Conflict(_))
        ));
        // an untouched window stays revivable
        assert!(check_conflict(&[], t(14, 0), t(16, 0), Some(7)).is_ok());
    }

    #[test]
    fn validate_booking_composes_all_checks() {
        let now = t(12, 0);
        let policy = ValidationPolicy::standard(30);
        let existing = vec![booking(1, t(14, 0), t(16, 0), BookingStatus::Confirmed)];

        assert!(matches!(
            validate_booking(now, t(15, 0), t(17, 0), &existing, None, policy),
            Err(ApiError::Conflict(_))
        ));
        assert!(validate_booking(now, t(16, 0), t(18, 0), &existing, None, policy).is_ok());
        assert!(validate_booking(now, t(13, 0), t(14, 0), &existing, None, policy).is_ok());
        assert!(matches!(
            validate_booking(now, t(17, 0), t(16, 0), &existing, None, policy),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn relaxed_policy_skips_only_the_lead_time_check() {
        let now = t(12, 0);
        let existing = vec![booking(1, t(12, 0), t(13, 0), BookingStatus::Confirmed)];

        // too soon for the standard policy
        assert!(matches!(
            validate_booking(
                now,
                t(12, 10),
                t(12, 40),
                &[],
                None,
                ValidationPolicy::standard(30)
            ),
            Err(ApiError::LeadTime { .. })
        ));
        // relaxed policy lets the same window through
        assert!(validate_booking(
            now,
            t(12, 10),
            t(12, 40),
            &[],
            None,
            ValidationPolicy::relaxed(30)
        )
        .is_ok());
        // conflicts are still rejected under the relaxed policy
        assert!(matches!(
            validate_booking(
                now,
                t(12, 10),
                t(12, 40),
                &existing,
                None,
                ValidationPolicy::relaxed(30)
            ),
            Err(ApiError::Conflict(_))
        ));
    }
}
