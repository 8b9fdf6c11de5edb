use std::sync::Arc;

use aide::axum::ApiRouter;
use aide::openapi::OpenApi;
use axum::Extension;
use log::{info, warn};
use tower_http::cors::CorsLayer;

mod api;
mod crypto;
mod database;
mod docs;
mod env;
mod error;
mod fees;
mod gateway;
#[cfg(feature = "mail")]
mod mail;
mod models;
mod qr;
mod reports;
mod request_state;
mod tipping;

use crate::crypto::password_hash_create;
use crate::database::AppState;
use crate::error::ServiceResult;
use crate::models::{Role, User};

/// Cookie that carries the session token for browser clients.
pub const SESSION_COOKIE_NAME: &str = "session";

#[tokio::main]
async fn main() {
    let result = init().await;

    let exit_code = match result {
        Ok(_) => 0,
        Err(e) => {
            eprintln!("{}", e);
            1
        }
    };

    std::process::exit(exit_code);
}

async fn init() -> ServiceResult<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let app_state = AppState::connect(env::DATABASE_URL.as_str()).await?;
    create_admin_user(&app_state).await?;

    let mut api = OpenApi::default();
    let app = ApiRouter::new()
        .nest_api_service("/api/v1", api::init(app_state.clone()))
        .nest_api_service("/docs", docs::docs_routes())
        .finish_api_with(&mut api, docs::api_docs)
        .layer(Extension(Arc::new(api)))
        .layer(CorsLayer::permissive());

    let address = format!("{}:{}", env::API_HOST.as_str(), env::API_PORT.as_str());
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Start http server at {}", address);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the platform administrator from `ADMIN_EMAIL` and `ADMIN_PASSWORD` if it does not exist.
async fn create_admin_user(app_state: &AppState) -> ServiceResult<()> {
    let email = env::ADMIN_EMAIL.trim().to_lowercase();
    if email.is_empty() || env::ADMIN_PASSWORD.is_empty() {
        warn!("ADMIN_EMAIL or ADMIN_PASSWORD is not set, no admin user is created");
        return Ok(());
    }

    let mut db = app_state.connection().await?;
    if db.get_user_by_email(&email).await?.is_some() {
        return Ok(());
    }

    let admin = db
        .store_user(User {
            id: 0,
            email: Some(email),
            phone: None,
            password_hash: Some(password_hash_create(env::ADMIN_PASSWORD.as_str())?),
            role: Role::Admin,
        })
        .await?;
    info!("Admin user {} was successfully created!", admin.id);

    Ok(())
}
