use std::env;

use crate::validation::DEFAULT_LEAD_TIME_MINUTES;

/// Runtime configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub lead_time_minutes: i64,
    /// When set, administrators skip the lead-time check on update paths.
    /// The overlap check always runs.
    pub admin_update_skip_lead_time: bool,
    pub email: EmailConfig,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub backend: EmailBackend,
    pub from_address: String,
}

#[derive(Debug, Clone)]
pub enum EmailBackend {
    /// Logs rendered messages instead of sending them.
    Console,
    Smtp {
        host: String,
        port: u16,
        username: String,
        password: String,
    },
}

impl Config {
    pub fn from_env() -> Config {
        let backend = match env::var("EMAIL_BACKEND").as_deref() {
            Ok("smtp") => EmailBackend::Smtp {
                host: env::var("SMTP_HOST").expect("SMTP_HOST should be set for the smtp backend"),
                port: env::var("SMTP_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(587),
                username: env::var("SMTP_USERNAME").unwrap_or_default(),
                password: env::var("SMTP_PASSWORD").unwrap_or_default(),
            },
            _ => EmailBackend::Console,
        };

        Config {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL should be set"),
            jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET should be set"),
            token_ttl_hours: env::var("TOKEN_TTL_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(24),
            lead_time_minutes: env::var("BOOKING_LEAD_TIME_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_LEAD_TIME_MINUTES),
            admin_update_skip_lead_time: env::var("ADMIN_UPDATE_SKIP_LEAD_TIME")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            email: EmailConfig {
                backend,
                from_address: env::var("EMAIL_FROM")
                    .unwrap_or_else(|_| "bookings@example.com".to_string()),
            },
        }
    }
}
