#[macro_use]
extern crate diesel;

use std::sync::Arc;

use actix_web::{error, get, middleware, web, App, HttpResponse, HttpServer, Responder};
use diesel::{prelude::*, r2d2};

mod actions;
mod auth;
mod config;
mod email;
mod errors;
mod models;
mod routes;
mod schema;
mod validation;

use email::{EmailNotifier, Notifier};
use models::ApiMessage;

pub type DbPool = r2d2::Pool<r2d2::ConnectionManager<PgConnection>>;

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = config::Config::from_env();
    let bind_addr = config.bind_addr.clone();

    // initialize DB pool outside of `HttpServer::new` so that it is shared across all workers
    let pool = initialize_db_pool(&config.database_url);

    let notifier: Arc<dyn Notifier> = Arc::new(
        EmailNotifier::new(&config.email).expect("email transport configuration should be valid"),
    );
    let notifier = web::Data::from(notifier);
    let config = web::Data::new(config);

    log::info!("starting HTTP server at http://{}", bind_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(pool.clone()))
            .app_data(config.clone())
            .app_data(notifier.clone())
            .wrap(middleware::Logger::default())
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                let detail = err.to_string();
                let response = match err {
                    error::JsonPayloadError::ContentType => {
                        HttpResponse::UnsupportedMediaType().body("Unsupported Media Type")
                    }
                    error::JsonPayloadError::Deserialize(ref err) => {
                        HttpResponse::BadRequest().json(ApiMessage {
                            message: err.to_string(),
                        })
                    }
                    _ => HttpResponse::BadRequest().json(ApiMessage { message: detail }),
                };
                error::InternalError::from_response(err, response).into()
            }))
            .service(health)
            .service(routes::auth::register)
            .service(routes::auth::login)
            .service(routes::auth::me)
            .service(routes::resources::list_resources)
            .service(routes::resources::get_resource)
            .service(routes::resources::create_resource)
            .service(routes::resources::update_resource)
            .service(routes::resources::delete_resource)
            .service(routes::bookings::list_bookings)
            .service(routes::bookings::create_booking)
            .service(routes::bookings::get_booking)
            .service(routes::bookings::update_booking)
            .service(routes::bookings::cancel_booking)
    })
    .bind(bind_addr)?
    .run()
    .await
}

fn initialize_db_pool(database_url: &str) -> DbPool {
    let manager = r2d2::ConnectionManager::<PgConnection>::new(database_url);
    r2d2::Pool::builder()
        .build(manager)
        .expect("database URL should be a valid Postgres connection string")
}
