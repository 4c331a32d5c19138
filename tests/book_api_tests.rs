use actix_web::http::header;
use actix_web::{test, web, App};
use chrono::Utc;
use std::sync::Arc;

use booklib::api::{self, AppState};
use booklib::auth::AuthService;
use booklib::models::{Book, Comment, Role, User};
use booklib::store::Store;

fn create_app_state(store: Arc<Store>, auth_service: Arc<AuthService>) -> AppState {
    AppState {
        store,
        auth_service,
    }
}

fn create_user_with_token(
    store: &Arc<Store>,
    auth_service: &Arc<AuthService>,
    username: &str,
    role: Role,
) -> (User, String) {
    let password_hash = auth_service.hash_password("testpass123").unwrap();

    let mut user = User {
        id: String::new(),
        username: username.to_string(),
        password_hash,
        display_name: username.to_string(),
        role,
        is_locked: false,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    store.create_user(&mut user).unwrap();
    let token = auth_service.generate_token(&user.id).unwrap();
    (user, token)
}

fn seed_book(store: &Arc<Store>, title: &str, author: &str) {
    let mut book = Book {
        id: String::new(),
        title: title.to_string(),
        author: author.to_string(),
        genre: "Novel".to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    store.create_book(&mut book).unwrap();
}

macro_rules! init_app {
    ($store:expr, $auth_service:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($store.clone()))
                .app_data(web::Data::new($auth_service.clone()))
                .app_data(web::Data::new(create_app_state(
                    $store.clone(),
                    $auth_service.clone(),
                )))
                .configure(api::configure_routes),
        )
        .await
    };
}

#[actix_web::test]
async fn test_list_books_authenticated() {
    let store = Arc::new(Store::in_memory().unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string(), store.clone()));
    let (_, token) = create_user_with_token(&store, &auth_service, "reader", Role::User);
    seed_book(&store, "Ulysses", "James Joyce");
    seed_book(&store, "Book", "Author");

    let app = init_app!(store, auth_service);

    let req = test::TestRequest::get()
        .uri("/books")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = test::read_body_json(resp).await;
    let books = body["data"].as_array().unwrap();
    assert_eq!(books.len(), 2);
}

#[actix_web::test]
async fn test_list_books_anonymous_redirects() {
    let store = Arc::new(Store::in_memory().unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string(), store.clone()));

    let app = init_app!(store, auth_service);

    let req = test::TestRequest::get().uri("/books").to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 302);
    assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/login");
}

#[actix_web::test]
async fn test_get_book_by_title() {
    let store = Arc::new(Store::in_memory().unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string(), store.clone()));
    let (_, token) = create_user_with_token(&store, &auth_service, "reader", Role::User);
    seed_book(&store, "Ulysses", "James Joyce");

    let app = init_app!(store, auth_service);

    let req = test::TestRequest::get()
        .uri("/books/Ulysses")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["title"], "Ulysses");
    assert_eq!(body["data"]["author"], "James Joyce");
}

#[actix_web::test]
async fn test_get_book_not_found() {
    let store = Arc::new(Store::in_memory().unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string(), store.clone()));
    let (_, token) = create_user_with_token(&store, &auth_service, "reader", Role::User);

    let app = init_app!(store, auth_service);

    let req = test::TestRequest::get()
        .uri("/books/Nothing")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn test_add_book_as_admin_redirects() {
    let store = Arc::new(Store::in_memory().unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string(), store.clone()));
    let (_, token) = create_user_with_token(&store, &auth_service, "admin", Role::Admin);

    let app = init_app!(store, auth_service);

    let req = test::TestRequest::post()
        .uri("/books/add")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_form([
            ("title", "Ulysses"),
            ("author", "James Joyce"),
            ("genre", "Modernist"),
        ])
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 302);
    assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/books");

    let saved = store.get_book_by_title("Ulysses").unwrap();
    assert_eq!(saved.author, "James Joyce");
}

#[actix_web::test]
async fn test_add_book_as_user_forbidden() {
    let store = Arc::new(Store::in_memory().unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string(), store.clone()));
    let (_, token) = create_user_with_token(&store, &auth_service, "reader", Role::User);

    let app = init_app!(store, auth_service);

    let req = test::TestRequest::post()
        .uri("/books/add")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_form([("title", "Ulysses")])
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
    assert!(store.get_book_by_title("Ulysses").is_err());
}

#[actix_web::test]
async fn test_add_duplicate_book_rejected() {
    let store = Arc::new(Store::in_memory().unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string(), store.clone()));
    let (_, token) = create_user_with_token(&store, &auth_service, "admin", Role::Admin);
    seed_book(&store, "Ulysses", "James Joyce");

    let app = init_app!(store, auth_service);

    let req = test::TestRequest::post()
        .uri("/books/add")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_form([("title", "Ulysses")])
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn test_edit_book_as_admin_redirects() {
    let store = Arc::new(Store::in_memory().unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string(), store.clone()));
    let (_, token) = create_user_with_token(&store, &auth_service, "admin", Role::Admin);
    seed_book(&store, "Ulysses", "Unknown");

    let app = init_app!(store, auth_service);

    let req = test::TestRequest::post()
        .uri("/books/edit/Ulysses")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_form([("title", ""), ("author", "James Joyce"), ("genre", "")])
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 302);

    let updated = store.get_book_by_title("Ulysses").unwrap();
    assert_eq!(updated.author, "James Joyce");
}

#[actix_web::test]
async fn test_edit_book_as_user_forbidden() {
    let store = Arc::new(Store::in_memory().unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string(), store.clone()));
    let (_, token) = create_user_with_token(&store, &auth_service, "reader", Role::User);
    seed_book(&store, "Ulysses", "James Joyce");

    let app = init_app!(store, auth_service);

    let req = test::TestRequest::post()
        .uri("/books/edit/Ulysses")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_form([("title", "Renamed")])
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
    assert!(store.get_book_by_title("Ulysses").is_ok());
}

#[actix_web::test]
async fn test_delete_book_as_admin_removes_comments() {
    let store = Arc::new(Store::in_memory().unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string(), store.clone()));
    let (_, token) = create_user_with_token(&store, &auth_service, "admin", Role::Admin);
    seed_book(&store, "Ulysses", "James Joyce");

    let mut comment = Comment {
        id: String::new(),
        content: "Published in 1922".to_string(),
        book_title: "Ulysses".to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    store.add_comment(&mut comment).unwrap();

    let app = init_app!(store, auth_service);

    let req = test::TestRequest::post()
        .uri("/books/Ulysses")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 302);
    assert!(store.get_book_by_title("Ulysses").is_err());
    assert!(store.get_comment_by_content("Published in 1922").is_err());
}

#[actix_web::test]
async fn test_delete_book_as_user_forbidden() {
    let store = Arc::new(Store::in_memory().unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string(), store.clone()));
    let (_, token) = create_user_with_token(&store, &auth_service, "reader", Role::User);
    seed_book(&store, "Ulysses", "James Joyce");

    let app = init_app!(store, auth_service);

    let req = test::TestRequest::post()
        .uri("/books/Ulysses")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
    assert!(store.get_book_by_title("Ulysses").is_ok());
}
