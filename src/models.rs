use crate::schema::{bookings, resources, user_profiles, users};
use chrono::{DateTime, Utc};
use diesel::{
    deserialize::{self, FromSql},
    pg::{Pg, PgValue},
    serialize::{self, Output, ToSql},
    sql_types::Text,
    Insertable, Selectable,
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = users)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = user_profiles)]
pub struct UserProfile {
    pub id: i32,
    pub user_id: i32,
    pub picture_url: Option<String>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = resources)]
pub struct Resource {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub capacity: i32,
    pub is_available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Copy, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = crate::schema::sql_types::BookingStatus)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Rejected,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Rejected => "rejected",
        }
    }

    /// Statuses that occupy a resource's time window.
    pub fn blocks_window(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql<crate::schema::sql_types::BookingStatus, Pg> for BookingStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        <str as ToSql<Text, Pg>>::to_sql(self.as_str(), out)
    }
}

impl FromSql<crate::schema::sql_types::BookingStatus, Pg> for BookingStatus {
    fn from_sql(bytes: PgValue) -> deserialize::Result<Self> {
        match <String as FromSql<Text, Pg>>::from_sql(bytes)?.as_str() {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "rejected" => Ok(BookingStatus::Rejected),
            s => Err(format!("Unrecognized booking status: {}", s).into()),
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = bookings)]
pub struct Booking {
    pub id: i32,
    pub user_id: i32,
    pub resource_id: i32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: BookingStatus,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = bookings)]
pub struct NewBooking {
    pub user_id: i32,
    pub resource_id: i32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: BookingStatus,
    pub notes: String,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = bookings)]
pub struct BookingChangeset {
    pub resource_id: Option<i32>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: Option<BookingStatus>,
    pub notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

// Request/Response models for the API

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub auth_token: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.id,
            username: user.username,
            email: user.email,
            is_admin: user.is_admin,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
    pub picture_url: Option<String>,
}

impl MeResponse {
    pub fn from_parts(user: User, profile: Option<UserProfile>) -> Self {
        MeResponse {
            id: user.id,
            username: user.username,
            email: user.email,
            is_admin: user.is_admin,
            picture_url: profile.and_then(|p| p.picture_url),
        }
    }
}

fn default_capacity() -> i32 {
    1
}

fn default_available() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_capacity")]
    pub capacity: i32,
    #[serde(default = "default_available")]
    pub is_available: bool,
}

#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = resources)]
pub struct ResourceRecord<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub capacity: i32,
    pub is_available: bool,
}

impl<'a> From<&'a ResourceInput> for ResourceRecord<'a> {
    fn from(input: &'a ResourceInput) -> Self {
        ResourceRecord {
            name: &input.name,
            description: &input.description,
            capacity: input.capacity,
            is_available: input.is_available,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ResourceResponse {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub capacity: i32,
    pub is_available: bool,
    pub availability_status: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewBookingRequest {
    pub resource: i32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingUpdateRequest {
    pub resource: Option<i32>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: Option<BookingStatus>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub id: i32,
    pub user: i32,
    pub username: String,
    pub resource: i32,
    pub resource_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: BookingStatus,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BookingResponse {
    pub fn from_parts(booking: Booking, resource_name: String, username: String) -> Self {
        BookingResponse {
            id: booking.id,
            user: booking.user_id,
            username,
            resource: booking.resource_id,
            resource_name,
            start_time: booking.start_time,
            end_time: booking.end_time,
            status: booking.status,
            notes: booking.notes,
            created_at: booking.created_at,
            updated_at: booking.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiMessage {
    pub message: String,
}
