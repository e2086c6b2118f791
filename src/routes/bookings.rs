use actix_web::{delete, get, patch, post, web, HttpResponse};
use chrono::Utc;

use crate::auth::AuthUser;
use crate::config::Config;
use crate::email::{self, BookingEvent, BookingNotification, Notifier};
use crate::errors::ApiError;
use crate::models::{BookingResponse, BookingUpdateRequest, NewBookingRequest};
use crate::validation::ValidationPolicy;
use crate::{actions, DbPool};

/// Lead-time enforcement is relaxed for admin update paths when the
/// configured policy allows it; creation always enforces it.
fn update_policy(user: &AuthUser, config: &Config) -> ValidationPolicy {
    if user.is_admin && config.admin_update_skip_lead_time {
        ValidationPolicy::relaxed(config.lead_time_minutes)
    } else {
        ValidationPolicy::standard(config.lead_time_minutes)
    }
}

#[get("/api/bookings")]
pub async fn list_bookings(
    pool: web::Data<DbPool>,
    user: AuthUser,
) -> Result<HttpResponse, ApiError> {
    let bookings = web::block(move || -> Result<Vec<BookingResponse>, ApiError> {
        let mut conn = pool.get()?;
        actions::list_bookings(&mut conn, &user)
    })
    .await??;

    Ok(HttpResponse::Ok().json(bookings))
}

#[post("/api/bookings")]
pub async fn create_booking(
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    notifier: web::Data<dyn Notifier>,
    user: AuthUser,
    form: web::Json<NewBookingRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = form.into_inner();
    let policy = ValidationPolicy::standard(config.lead_time_minutes);
    let user_id = user.id;

    let (response, notification) =
        web::block(move || -> Result<(BookingResponse, BookingNotification), ApiError> {
            let mut conn = pool.get()?;
            let booking = actions::create_booking(&mut conn, user_id, &req, Utc::now(), policy)?;
            let notification = actions::booking_notification(&mut conn, &booking)?;
            let response = actions::get_booking_response(&mut conn, booking.id)?;
            Ok((response, notification))
        })
        .await??;

    log::info!(
        "user '{}' booked '{}' from {} to {}",
        user.username,
        notification.resource_name,
        response.start_time,
        response.end_time
    );
    email::dispatch(notifier.into_inner(), BookingEvent::Created, notification);

    Ok(HttpResponse::Created().json(response))
}

#[get("/api/bookings/{id}")]
pub async fn get_booking(
    pool: web::Data<DbPool>,
    user: AuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let booking_id = path.into_inner();

    let response = web::block(move || -> Result<BookingResponse, ApiError> {
        let mut conn = pool.get()?;
        let response = actions::get_booking_response(&mut conn, booking_id)?;
        // Regular users only see their own bookings
        if response.user != user.id && !user.is_admin {
            return Err(ApiError::not_found("Booking not found"));
        }
        Ok(response)
    })
    .await??;

    Ok(HttpResponse::Ok().json(response))
}

#[patch("/api/bookings/{id}")]
pub async fn update_booking(
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    notifier: web::Data<dyn Notifier>,
    user: AuthUser,
    path: web::Path<i32>,
    form: web::Json<BookingUpdateRequest>,
) -> Result<HttpResponse, ApiError> {
    let booking_id = path.into_inner();
    let changes = form.into_inner();
    let policy = update_policy(&user, &config);
    let actor = user.clone();

    let (response, notification) =
        web::block(move || -> Result<(BookingResponse, BookingNotification), ApiError> {
            let mut conn = pool.get()?;
            let booking = actions::update_booking(
                &mut conn,
                booking_id,
                &actor,
                &changes,
                Utc::now(),
                policy,
            )?;
            let notification = actions::booking_notification(&mut conn, &booking)?;
            let response = actions::get_booking_response(&mut conn, booking.id)?;
            Ok((response, notification))
        })
        .await??;

    log::info!("user '{}' updated booking {}", user.username, booking_id);
    email::dispatch(notifier.into_inner(), BookingEvent::Updated, notification);

    Ok(HttpResponse::Ok().json(response))
}

#[delete("/api/bookings/{id}")]
pub async fn cancel_booking(
    pool: web::Data<DbPool>,
    notifier: web::Data<dyn Notifier>,
    user: AuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let booking_id = path.into_inner();
    let actor = user.clone();

    let (response, notification) =
        web::block(move || -> Result<(BookingResponse, BookingNotification), ApiError> {
            let mut conn = pool.get()?;
            let booking = actions::cancel_booking(&mut conn, booking_id, &actor, Utc::now())?;
            let notification = actions::booking_notification(&mut conn, &booking)?;
            let response = actions::get_booking_response(&mut conn, booking.id)?;
            Ok((response, notification))
        })
        .await??;

    log::info!("user '{}' cancelled booking {}", user.username, booking_id);
    email::dispatch(notifier.into_inner(), BookingEvent::Cancelled, notification);

    Ok(HttpResponse::Ok().json(response))
}
