use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::auth::AuthUser;
use crate::email::BookingNotification;
use crate::errors::ApiError;
use crate::models::{
    Booking, BookingChangeset, BookingResponse, BookingStatus, BookingUpdateRequest, NewBooking,
    NewBookingRequest, NewUser, Resource, ResourceInput, ResourceRecord, ResourceResponse, User,
    UserProfile,
};
use crate::validation::{self, ValidationPolicy};

const ACTIVE_STATUSES: [BookingStatus; 2] = [BookingStatus::Pending, BookingStatus::Confirmed];

// --- users ---

pub fn create_user(
    conn: &mut PgConnection,
    username_input: &str,
    email_input: &str,
    password_hash_input: &str,
) -> Result<User, ApiError> {
    use crate::schema::{user_profiles, users};

    // Create the user and its profile atomically
    conn.transaction(|conn| {
        let username_taken = users::table
            .filter(users::username.eq(username_input))
            .select(users::id)
            .first::<i32>(conn)
            .optional()?
            .is_some();
        if username_taken {
            return Err(ApiError::validation(
                "A user with this username already exists.",
            ));
        }

        let email_taken = users::table
            .filter(users::email.eq(email_input))
            .select(users::id)
            .first::<i32>(conn)
            .optional()?
            .is_some();
        if email_taken {
            return Err(ApiError::validation(
                "This email is already in use. Please use another email or login to your existing account.",
            ));
        }

        let user: User = diesel::insert_into(users::table)
            .values(&NewUser {
                username: username_input,
                email: email_input,
                password_hash: password_hash_input,
                is_admin: false,
            })
            .get_result(conn)?;

        diesel::insert_into(user_profiles::table)
            .values(user_profiles::user_id.eq(user.id))
            .execute(conn)?;

        Ok(user)
    })
}

pub fn find_user_by_username(
    conn: &mut PgConnection,
    username_input: &str,
) -> Result<Option<User>, ApiError> {
    use crate::schema::users;

    let user = users::table
        .filter(users::username.eq(username_input))
        .select(User::as_select())
        .first(conn)
        .optional()?;
    Ok(user)
}

pub fn get_user(conn: &mut PgConnection, user_id: i32) -> Result<User, ApiError> {
    use crate::schema::users;

    users::table
        .find(user_id)
        .select(User::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::not_found("User not found"))
}

pub fn get_profile(
    conn: &mut PgConnection,
    owner_id: i32,
) -> Result<Option<UserProfile>, ApiError> {
    use crate::schema::user_profiles;

    let profile = user_profiles::table
        .filter(user_profiles::user_id.eq(owner_id))
        .select(UserProfile::as_select())
        .first(conn)
        .optional()?;
    Ok(profile)
}

// --- resources ---

pub fn get_resource(conn: &mut PgConnection, resource_id: i32) -> Result<Resource, ApiError> {
    use crate::schema::resources;

    resources::table
        .find(resource_id)
        .select(Resource::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::not_found("Resource not found"))
}

/// Derived availability for listings: "unavailable" when the resource is
/// disabled or a confirmed booking still occupies it, "pending" when only
/// pending bookings do, "available" otherwise. A booking ending at or
/// before `now` no longer occupies the resource.
fn classify_availability(
    is_available: bool,
    active: &[(BookingStatus, DateTime<Utc>)],
    now: DateTime<Utc>,
) -> &'static str {
    if !is_available {
        return "unavailable";
    }

    let mut pending_only = false;
    for (status, end_time) in active {
        if *end_time <= now {
            continue;
        }
        match status {
            BookingStatus::Confirmed => return "unavailable",
            _ => pending_only = true,
        }
    }

    if pending_only {
        "pending"
    } else {
        "available"
    }
}

fn availability_status(
    conn: &mut PgConnection,
    resource: &Resource,
    now: DateTime<Utc>,
) -> Result<&'static str, ApiError> {
    use crate::schema::bookings;

    if !resource.is_available {
        return Ok("unavailable");
    }

    let active: Vec<(BookingStatus, DateTime<Utc>)> = bookings::table
        .filter(bookings::resource_id.eq(resource.id))
        .filter(bookings::status.eq_any(ACTIVE_STATUSES))
        .filter(bookings::end_time.gt(now))
        .select((bookings::status, bookings::end_time))
        .load(conn)?;

    Ok(classify_availability(resource.is_available, &active, now))
}

fn to_resource_response(
    conn: &mut PgConnection,
    resource: Resource,
    now: DateTime<Utc>,
) -> Result<ResourceResponse, ApiError> {
    let status = availability_status(conn, &resource, now)?;
    Ok(ResourceResponse {
        id: resource.id,
        name: resource.name,
        description: resource.description,
        capacity: resource.capacity,
        is_available: resource.is_available,
        availability_status: status,
    })
}

pub fn list_resources(
    conn: &mut PgConnection,
    now: DateTime<Utc>,
) -> Result<Vec<ResourceResponse>, ApiError> {
    use crate::schema::resources;

    let rows: Vec<Resource> = resources::table
        .order(resources::name.asc())
        .select(Resource::as_select())
        .load(conn)?;

    rows.into_iter()
        .map(|r| to_resource_response(conn, r, now))
        .collect()
}

pub fn get_resource_response(
    conn: &mut PgConnection,
    resource_id: i32,
    now: DateTime<Utc>,
) -> Result<ResourceResponse, ApiError> {
    let resource = get_resource(conn, resource_id)?;
    to_resource_response(conn, resource, now)
}

pub fn create_resource(
    conn: &mut PgConnection,
    input: &ResourceInput,
) -> Result<Resource, ApiError> {
    use crate::schema::resources;

    let created = diesel::insert_into(resources::table)
        .values(&ResourceRecord::from(input))
        .get_result(conn)?;
    Ok(created)
}

pub fn update_resource(
    conn: &mut PgConnection,
    resource_id: i32,
    input: &ResourceInput,
) -> Result<Resource, ApiError> {
    use crate::schema::resources;

    diesel::update(resources::table.find(resource_id))
        .set(&ResourceRecord::from(input))
        .get_result(conn)
        .optional()?
        .ok_or_else(|| ApiError::not_found("Resource not found"))
}

pub fn delete_resource(conn: &mut PgConnection, resource_id: i32) -> Result<(), ApiError> {
    use crate::schema::resources;

    let deleted = diesel::delete(resources::table.find(resource_id)).execute(conn)?;
    if deleted == 0 {
        return Err(ApiError::not_found("Resource not found"));
    }
    Ok(())
}

// --- bookings ---

/// Bookings for `resource_id` whose [start, end) window overlaps the
/// candidate window, restricted to statuses that occupy the window.
pub fn find_overlapping(
    conn: &mut PgConnection,
    resource_id: i32,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exclude_id: Option<i32>,
) -> Result<Vec<Booking>, ApiError> {
    use crate::schema::bookings;

    let mut query = bookings::table
        .filter(bookings::resource_id.eq(resource_id))
        .filter(bookings::status.eq_any(ACTIVE_STATUSES))
        .filter(bookings::start_time.lt(end))
        .filter(bookings::end_time.gt(start))
        .select(Booking::as_select())
        .into_boxed();

    if let Some(id) = exclude_id {
        query = query.filter(bookings::id.ne(id));
    }

    let rows = query.order(bookings::start_time.asc()).load(conn)?;
    Ok(rows)
}

fn map_booking_write_error(e: diesel::result::Error) -> ApiError {
    match e {
        diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        ) => ApiError::conflict(
            "An identical booking already exists for this resource, window and user.",
        ),
        other => ApiError::Database(other),
    }
}

/// Creates a booking for `user_id`. The availability check, the overlap
/// check and the insert run in one transaction; the unique constraint on
/// (resource, start, end, user) catches races the check misses.
pub fn create_booking(
    conn: &mut PgConnection,
    user_id: i32,
    req: &NewBookingRequest,
    now: DateTime<Utc>,
    policy: ValidationPolicy,
) -> Result<Booking, ApiError> {
    use crate::schema::bookings;

    conn.transaction(|conn| {
        let resource = get_resource(conn, req.resource)?;
        if !resource.is_available {
            return Err(ApiError::validation(format!(
                "Resource '{}' is currently unavailable.",
                resource.name
            )));
        }

        let existing = find_overlapping(conn, resource.id, req.start_time, req.end_time, None)?;
        validation::validate_booking(now, req.start_time, req.end_time, &existing, None, policy)?;

        diesel::insert_into(bookings::table)
            .values(&NewBooking {
                user_id,
                resource_id: resource.id,
                start_time: req.start_time,
                end_time: req.end_time,
                status: BookingStatus::Pending,
                notes: req.notes.clone(),
            })
            .get_result(conn)
            .map_err(map_booking_write_error)
    })
}

/// Applies a partial update. Only owners and admins may touch a booking,
/// only admins may change its status, and a changed window is revalidated
/// with the booking's own id excluded from the overlap scan. Reviving a
/// cancelled or rejected booking re-checks the window too: cancellation
/// frees it, and another booking may have taken it since.
pub fn update_booking(
    conn: &mut PgConnection,
    booking_id: i32,
    actor: &AuthUser,
    changes: &BookingUpdateRequest,
    now: DateTime<Utc>,
    policy: ValidationPolicy,
) -> Result<Booking, ApiError> {
    use crate::schema::bookings;

    conn.transaction(|conn| {
        let booking = get_booking(conn, booking_id)?;

        if booking.user_id != actor.id && !actor.is_admin {
            return Err(ApiError::forbidden(
                "You do not have permission to modify this booking.",
            ));
        }
        if changes.status.is_some() && !actor.is_admin {
            return Err(ApiError::forbidden(
                "Only administrators can change booking status.",
            ));
        }

        let resource_id = changes.resource.unwrap_or(booking.resource_id);
        let start = changes.start_time.unwrap_or(booking.start_time);
        let end = changes.end_time.unwrap_or(booking.end_time);
        let window_changed = resource_id != booking.resource_id
            || start != booking.start_time
            || end != booking.end_time;
        let new_status = changes.status.unwrap_or(booking.status);
        let reactivated = new_status.blocks_window() && !booking.status.blocks_window();

        if window_changed {
            let resource = get_resource(conn, resource_id)?;
            if !resource.is_available {
                return Err(ApiError::validation(format!(
                    "Resource '{}' is currently unavailable.",
                    resource.name
                )));
            }
            let existing = find_overlapping(conn, resource_id, start, end, Some(booking.id))?;
            validation::validate_booking(now, start, end, &existing, Some(booking.id), policy)?;
        } else if reactivated {
            let existing = find_overlapping(conn, resource_id, start, end, Some(booking.id))?;
            validation::check_conflict(&existing, start, end, Some(booking.id))?;
        }

        diesel::update(bookings::table.find(booking.id))
            .set(&BookingChangeset {
                resource_id: changes.resource,
                start_time: changes.start_time,
                end_time: changes.end_time,
                status: changes.status,
                notes: changes.notes.clone(),
                updated_at: now,
            })
            .get_result(conn)
            .map_err(map_booking_write_error)
    })
}

/// Cancellation is a status change; bookings are never hard-deleted.
pub fn cancel_booking(
    conn: &mut PgConnection,
    booking_id: i32,
    actor: &AuthUser,
    now: DateTime<Utc>,
) -> Result<Booking, ApiError> {
    use crate::schema::bookings;

    conn.transaction(|conn| {
        let booking = get_booking(conn, booking_id)?;

        if booking.user_id != actor.id && !actor.is_admin {
            return Err(ApiError::forbidden(
                "You do not have permission to cancel this booking.",
            ));
        }
        if booking.status == BookingStatus::Cancelled {
            return Err(ApiError::validation("Booking is already cancelled."));
        }

        let cancelled = diesel::update(bookings::table.find(booking.id))
            .set((
                bookings::status.eq(BookingStatus::Cancelled),
                bookings::updated_at.eq(now),
            ))
            .get_result(conn)?;
        Ok(cancelled)
    })
}

pub fn get_booking(conn: &mut PgConnection, booking_id: i32) -> Result<Booking, ApiError> {
    use crate::schema::bookings;

    bookings::table
        .find(booking_id)
        .select(Booking::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::not_found("Booking not found"))
}

pub fn get_booking_response(
    conn: &mut PgConnection,
    booking_id: i32,
) -> Result<BookingResponse, ApiError> {
    use crate::schema::{bookings, resources, users};

    let row: Option<(Booking, String, String)> = bookings::table
        .inner_join(resources::table)
        .inner_join(users::table)
        .filter(bookings::id.eq(booking_id))
        .select((Booking::as_select(), resources::name, users::username))
        .first(conn)
        .optional()?;

    row.map(|(booking, resource_name, username)| {
        BookingResponse::from_parts(booking, resource_name, username)
    })
    .ok_or_else(|| ApiError::not_found("Booking not found"))
}

/// Regular users see only their own bookings; admins see all of them.
pub fn list_bookings(
    conn: &mut PgConnection,
    actor: &AuthUser,
) -> Result<Vec<BookingResponse>, ApiError> {
    use crate::schema::{bookings, resources, users};

    let base = bookings::table
        .inner_join(resources::table)
        .inner_join(users::table)
        .order(bookings::start_time.asc())
        .select((Booking::as_select(), resources::name, users::username));

    let rows: Vec<(Booking, String, String)> = if actor.is_admin {
        base.load(conn)?
    } else {
        base.filter(bookings::user_id.eq(actor.id)).load(conn)?
    };

    Ok(rows
        .into_iter()
        .map(|(booking, resource_name, username)| {
            BookingResponse::from_parts(booking, resource_name, username)
        })
        .collect())
}

/// Gathers the pieces the notification dispatcher needs.
pub fn booking_notification(
    conn: &mut PgConnection,
    booking: &Booking,
) -> Result<BookingNotification, ApiError> {
    let user = get_user(conn, booking.user_id)?;
    let resource = get_resource(conn, booking.resource_id)?;

    Ok(BookingNotification {
        recipient_email: user.email,
        recipient_name: user.username,
        resource_name: resource.name,
        start_time: booking.start_time,
        end_time: booking.end_time,
        status: booking.status,
        notes: booking.notes.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn disabled_resource_is_unavailable() {
        assert_eq!(classify_availability(false, &[], t(12)), "unavailable");
        // even with no bookings at all
        assert_eq!(
            classify_availability(false, &[(BookingStatus::Pending, t(14))], t(12)),
            "unavailable"
        );
    }

    #[test]
    fn confirmed_booking_makes_resource_unavailable() {
        let active = [
            (BookingStatus::Pending, t(14)),
            (BookingStatus::Confirmed, t(16)),
        ];
        assert_eq!(classify_availability(true, &active, t(12)), "unavailable");
    }

    #[test]
    fn pending_bookings_alone_mark_resource_pending() {
        let active = [(BookingStatus::Pending, t(14))];
        assert_eq!(classify_availability(true, &active, t(12)), "pending");
    }

    #[test]
    fn no_active_bookings_means_available() {
        assert_eq!(classify_availability(true, &[], t(12)), "available");
    }

    #[test]
    fn bookings_ending_at_or_before_now_are_ignored() {
        // a confirmed booking that just ended frees the resource
        let active = [(BookingStatus::Confirmed, t(12))];
        assert_eq!(classify_availability(true, &active, t(12)), "available");
        let active = [(BookingStatus::Confirmed, t(10))];
        assert_eq!(classify_availability(true, &active, t(12)), "available");
        // one still running does not
        let active = [(BookingStatus::Confirmed, t(13))];
        assert_eq!(classify_availability(true, &active, t(12)), "unavailable");
    }
}
