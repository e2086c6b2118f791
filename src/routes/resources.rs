use actix_web::{delete, get, post, put, web, HttpResponse};
use chrono::Utc;

use crate::auth::{require_admin, AuthUser};
use crate::errors::ApiError;
use crate::models::{Resource, ResourceInput, ResourceResponse};
use crate::{actions, DbPool};

fn check_input(input: &ResourceInput) -> Result<(), ApiError> {
    if input.name.trim().is_empty() {
        return Err(ApiError::validation("Resource name is required."));
    }
    if input.capacity < 1 {
        return Err(ApiError::validation("Capacity must be a positive integer."));
    }
    Ok(())
}

#[get("/api/resources")]
pub async fn list_resources(pool: web::Data<DbPool>) -> Result<HttpResponse, ApiError> {
    let resources = web::block(move || -> Result<Vec<ResourceResponse>, ApiError> {
        let mut conn = pool.get()?;
        actions::list_resources(&mut conn, Utc::now())
    })
    .await??;

    Ok(HttpResponse::Ok().json(resources))
}

#[get("/api/resources/{id}")]
pub async fn get_resource(
    pool: web::Data<DbPool>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let resource_id = path.into_inner();

    let resource = web::block(move || -> Result<ResourceResponse, ApiError> {
        let mut conn = pool.get()?;
        actions::get_resource_response(&mut conn, resource_id, Utc::now())
    })
    .await??;

    Ok(HttpResponse::Ok().json(resource))
}

#[post("/api/resources")]
pub async fn create_resource(
    pool: web::Data<DbPool>,
    user: AuthUser,
    form: web::Json<ResourceInput>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&user)?;
    let input = form.into_inner();
    check_input(&input)?;

    let resource = web::block(move || -> Result<Resource, ApiError> {
        let mut conn = pool.get()?;
        actions::create_resource(&mut conn, &input)
    })
    .await??;

    log::info!("admin '{}' created resource '{}'", user.username, resource.name);
    Ok(HttpResponse::Created().json(resource))
}

#[put("/api/resources/{id}")]
pub async fn update_resource(
    pool: web::Data<DbPool>,
    user: AuthUser,
    path: web::Path<i32>,
    form: web::Json<ResourceInput>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&user)?;
    let resource_id = path.into_inner();
    let input = form.into_inner();
    check_input(&input)?;

    let resource = web::block(move || -> Result<Resource, ApiError> {
        let mut conn = pool.get()?;
        actions::update_resource(&mut conn, resource_id, &input)
    })
    .await??;

    Ok(HttpResponse::Ok().json(resource))
}

#[delete("/api/resources/{id}")]
pub async fn delete_resource(
    pool: web::Data<DbPool>,
    user: AuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&user)?;
    let resource_id = path.into_inner();

    web::block(move || -> Result<(), ApiError> {
        let mut conn = pool.get()?;
        actions::delete_resource(&mut conn, resource_id)
    })
    .await??;

    log::info!("admin '{}' deleted resource {}", user.username, resource_id);
    Ok(HttpResponse::NoContent().finish())
}
