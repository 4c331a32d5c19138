use actix_web::cookie::{time::Duration as CookieDuration, Cookie};
use actix_web::http::header;
use actix_web::{web, HttpResponse, Responder};
use chrono::Utc;
use std::sync::Arc;

use crate::auth::{AuthService, AuthUser, RequireAuth, AUTH_COOKIE};
use crate::models::*;
use crate::store::{Store, StoreError};

pub struct AppState {
    pub store: Arc<Store>,
    pub auth_service: Arc<AuthService>,
}

fn redirect_to(location: &str) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, location.to_string()))
        .finish()
}

fn forbidden() -> HttpResponse {
    HttpResponse::Forbidden().json(ApiResponse::<()>::error("Admin role required"))
}

// ==================== Health Check ====================

pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

// ==================== Auth Endpoints ====================

pub async fn login_page() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "login": "/login",
        "method": "POST",
        "fields": ["username", "password"]
    }))
}

pub async fn login(state: web::Data<AppState>, form: web::Form<LoginForm>) -> impl Responder {
    let user = match state.store.get_user_by_username(&form.username) {
        Ok(u) => u,
        Err(StoreError::NotFound(_)) => {
            return HttpResponse::Unauthorized()
                .json(ApiResponse::<()>::error("Invalid credentials"));
        }
        Err(_) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Database error"));
        }
    };

    if user.is_locked {
        return HttpResponse::Forbidden().json(ApiResponse::<()>::error("Account is locked"));
    }

    let valid = state
        .auth_service
        .verify_password(&form.password, &user.password_hash)
        .unwrap_or(false);

    if !valid {
        return HttpResponse::Unauthorized().json(ApiResponse::<()>::error("Invalid credentials"));
    }

    let token = match state.auth_service.generate_token(&user.id) {
        Ok(t) => t,
        Err(_) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to generate token"));
        }
    };

    let cookie = Cookie::build(AUTH_COOKIE, token)
        .path("/")
        .http_only(true)
        .finish();

    HttpResponse::Found()
        .insert_header((header::LOCATION, "/comments"))
        .cookie(cookie)
        .finish()
}

pub async fn logout() -> impl Responder {
    let mut cookie = Cookie::build(AUTH_COOKIE, "")
        .path("/")
        .http_only(true)
        .finish();
    cookie.set_max_age(CookieDuration::ZERO);

    HttpResponse::Found()
        .insert_header((header::LOCATION, "/login"))
        .cookie(cookie)
        .finish()
}

pub async fn current_user(
    state: web::Data<AppState>,
    auth_user: web::ReqData<AuthUser>,
) -> impl Responder {
    match state.store.get_user(&auth_user.user_id) {
        Ok(user) => HttpResponse::Ok().json(ApiResponse::success(user)),
        Err(_) => HttpResponse::NotFound().json(ApiResponse::<()>::error("User not found")),
    }
}

// ==================== Comment Endpoints ====================

pub async fn list_comments(state: web::Data<AppState>) -> impl Responder {
    match state.store.list_comments() {
        Ok(comments) => HttpResponse::Ok().json(ApiResponse::success(comments)),
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to list comments: {}", e))),
    }
}

pub async fn get_comment(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let content = path.into_inner();
    match state.store.get_comment_by_content(&content) {
        Ok(comment) => HttpResponse::Ok().json(ApiResponse::success(comment)),
        Err(StoreError::NotFound(_)) => {
            HttpResponse::NotFound().json(ApiResponse::<()>::error("Comment not found"))
        }
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to get comment: {}", e))),
    }
}

pub async fn get_comments_by_book(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let title = path.into_inner();
    match state.store.list_comments_by_book(&title) {
        Ok(comments) => HttpResponse::Ok().json(ApiResponse::success(comments)),
        Err(StoreError::NotFound(_)) => {
            HttpResponse::NotFound().json(ApiResponse::<()>::error("Book not found"))
        }
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to list comments: {}", e))),
    }
}

pub async fn add_comment(
    state: web::Data<AppState>,
    auth_user: web::ReqData<AuthUser>,
    form: web::Form<AddCommentForm>,
) -> impl Responder {
    if !auth_user.is_admin() {
        return forbidden();
    }

    let mut comment = Comment {
        id: String::new(),
        content: form.comment.clone(),
        book_title: form.book.clone(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    match state.store.add_comment(&mut comment) {
        Ok(_) => redirect_to("/comments"),
        Err(StoreError::NotFound(_)) => {
            HttpResponse::NotFound().json(ApiResponse::<()>::error("Book not found"))
        }
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to add comment: {}", e))),
    }
}

pub async fn edit_comment(
    state: web::Data<AppState>,
    auth_user: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Form<EditCommentForm>,
) -> impl Responder {
    if !auth_user.is_admin() {
        return forbidden();
    }

    let content = path.into_inner();
    match state.store.update_comment(&content, &form.comment) {
        Ok(_) => redirect_to("/comments"),
        Err(StoreError::NotFound(_)) => {
            HttpResponse::NotFound().json(ApiResponse::<()>::error("Comment not found"))
        }
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to update comment: {}", e))),
    }
}

pub async fn delete_comment(
    state: web::Data<AppState>,
    auth_user: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> impl Responder {
    if !auth_user.is_admin() {
        return forbidden();
    }

    let content = path.into_inner();
    match state.store.delete_comment_by_content(&content) {
        Ok(_) => redirect_to("/comments"),
        Err(StoreError::NotFound(_)) => {
            HttpResponse::NotFound().json(ApiResponse::<()>::error("Comment not found"))
        }
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to delete comment: {}", e))),
    }
}

// ==================== Book Endpoints ====================

pub async fn list_books(state: web::Data<AppState>) -> impl Responder {
    match state.store.list_books() {
        Ok(books) => HttpResponse::Ok().json(ApiResponse::success(books)),
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to list books: {}", e))),
    }
}

pub async fn get_book(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let title = path.into_inner();
    match state.store.get_book_by_title(&title) {
        Ok(book) => HttpResponse::Ok().json(ApiResponse::success(book)),
        Err(StoreError::NotFound(_)) => {
            HttpResponse::NotFound().json(ApiResponse::<()>::error("Book not found"))
        }
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to get book: {}", e))),
    }
}

pub async fn add_book(
    state: web::Data<AppState>,
    auth_user: web::ReqData<AuthUser>,
    form: web::Form<BookForm>,
) -> impl Responder {
    if !auth_user.is_admin() {
        return forbidden();
    }

    let mut book = Book {
        id: String::new(),
        title: form.title.clone(),
        author: form.author.clone(),
        genre: form.genre.clone(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    match state.store.create_book(&mut book) {
        Ok(_) => redirect_to("/books"),
        Err(e) => HttpResponse::BadRequest()
            .json(ApiResponse::<()>::error(format!("Failed to add book: {}", e))),
    }
}

pub async fn edit_book(
    state: web::Data<AppState>,
    auth_user: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Form<BookForm>,
) -> impl Responder {
    if !auth_user.is_admin() {
        return forbidden();
    }

    let title = path.into_inner();
    match state.store.update_book(&title, &form) {
        Ok(_) => redirect_to("/books"),
        Err(StoreError::NotFound(_)) => {
            HttpResponse::NotFound().json(ApiResponse::<()>::error("Book not found"))
        }
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to update book: {}", e))),
    }
}

pub async fn delete_book(
    state: web::Data<AppState>,
    auth_user: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> impl Responder {
    if !auth_user.is_admin() {
        return forbidden();
    }

    let title = path.into_inner();
    match state.store.delete_book_by_title(&title) {
        Ok(_) => redirect_to("/books"),
        Err(StoreError::NotFound(_)) => {
            HttpResponse::NotFound().json(ApiResponse::<()>::error("Book not found"))
        }
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to delete book: {}", e))),
    }
}

// ==================== Route Configuration ====================

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Open routes
        .route("/health", web::get().to(health))
        .route("/login", web::get().to(login_page))
        .route("/login", web::post().to(login))
        .route("/logout", web::post().to(logout))
        // Everything else requires a signed-in user; writes additionally
        // check the admin role inside the handler.
        .service(
            web::scope("")
                .wrap(RequireAuth)
                .route("/me", web::get().to(current_user))
                .route("/comments", web::get().to(list_comments))
                .route("/comments/add", web::post().to(add_comment))
                .route("/comments/edit/{content}", web::post().to(edit_comment))
                .route("/comments/book/{title}", web::get().to(get_comments_by_book))
                .route("/comments/{content}", web::get().to(get_comment))
                .route("/comments/{content}", web::post().to(delete_comment))
                .route("/books", web::get().to(list_books))
                .route("/books/add", web::post().to(add_book))
                .route("/books/edit/{title}", web::post().to(edit_book))
                .route("/books/{title}", web::get().to(get_book))
                .route("/books/{title}", web::post().to(delete_book)),
        );
}
