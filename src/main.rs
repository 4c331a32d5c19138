mod api;
mod auth;
mod models;
mod store;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use chrono::Utc;
use std::env;
use std::sync::Arc;

use api::AppState;
use auth::AuthService;
use models::{Role, User};
use store::Store;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    // Load environment variables
    dotenvy::dotenv().ok();

    // Get configuration from environment
    let port: u16 = env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .expect("PORT must be a number");

    let db_path = env::var("DATABASE_PATH").unwrap_or_else(|_| "booklib.db".to_string());

    let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| {
        log::warn!("JWT_SECRET not set, using default (not secure for production!)");
        "default_jwt_secret_change_me".to_string()
    });

    // Initialize store
    let store = Arc::new(Store::new(&db_path).expect("Failed to initialize database"));

    // Initialize auth service
    let auth_service = Arc::new(AuthService::new(jwt_secret, store.clone()));

    // Auto-create admin user from environment variables if no users exist
    let admin_username = env::var("ADMIN_USERNAME").ok();
    let admin_password = env::var("ADMIN_PASSWORD").ok();

    if let (Some(username), Some(password)) = (admin_username, admin_password) {
        let user_count = store.count_users().expect("Failed to count users");
        if user_count == 0 {
            log::info!("Creating admin user from environment: {}", username);
            let password_hash = auth_service
                .hash_password(&password)
                .expect("Failed to hash password");

            let mut admin = User {
                id: String::new(),
                username: username.clone(),
                password_hash,
                display_name: username,
                role: Role::Admin,
                is_locked: false,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };

            store
                .create_user(&mut admin)
                .expect("Failed to create admin user");
            log::info!("Admin user created successfully");
        }
    }

    log::info!("Database: {}", db_path);
    log::info!("Starting booklib server on port {}", port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            // Register Store and AuthService individually for the auth middleware
            .app_data(web::Data::new(store.clone()))
            .app_data(web::Data::new(auth_service.clone()))
            // Also keep AppState for handlers that need both
            .app_data(web::Data::new(AppState {
                store: store.clone(),
                auth_service: auth_service.clone(),
            }))
            .configure(api::configure_routes)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
