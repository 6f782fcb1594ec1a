// src/main.rs

mod access;
mod api;
mod app_state;
mod auth;
mod category;
mod config;
mod db;
mod error;
mod hierarchy;
mod membership;
mod memory_store;
mod models;
mod project;
mod store;
mod subtask;
mod tag;
mod task;
mod team_management;
mod user_management;
mod validation;

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};

use actix_cors::Cors;
use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http,
    middleware::Logger,
    web, App, Error, HttpMessage, HttpResponse, HttpServer, ResponseError,
};
use env_logger::Env;
use futures::future::{ok, Ready};
use log::{info, warn};

use crate::api::Requester;
use crate::app_state::AppState;
use crate::auth::validate_jwt;
use crate::config::{Config, StoreBackend};
use crate::error::ApiError;
use crate::store::Store;

/// Decodes `Authorization: Bearer <jwt>` and records the caller as a
/// [`Requester`] extension. Requests without a token pass through; handlers
/// that need a caller reject them.
#[derive(Debug, Clone)]
pub struct Authentication {
    secret: Rc<String>,
}

impl Authentication {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: Rc::new(secret.into()) }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = AuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddleware {
            service,
            secret: self.secret.clone(),
        })
    }
}

pub struct AuthMiddleware<S> {
    service: S,
    secret: Rc<String>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let token = req
            .headers()
            .get(http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string());

        if let Some(token) = token {
            match validate_jwt(&token, &self.secret) {
                Ok(claims) => {
                    req.extensions_mut().insert(Requester(claims.sub));
                }
                Err(e) => {
                    warn!("Rejected bearer token: {}", e);
                    let resp = ApiError::Unauthorized("Not authorized, token failed".into())
                        .error_response();
                    let (req_parts, _payload) = req.into_parts();
                    let srv_resp = ServiceResponse::new(req_parts, resp);
                    return Box::pin(async move { Ok(srv_resp) });
                }
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            Ok(res.map_into_boxed_body())
        })
    }
}

async fn health() -> HttpResponse {
    api::ok(serde_json::json!({ "status": "ok" }))
}

async fn not_found() -> HttpResponse {
    ApiError::NotFound("Route not found".into()).error_response()
}

/// Every route of the service. Fixed paths are registered ahead of `/{id}`
/// within each scope.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _| ApiError::Validation(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _| ApiError::Validation(err.to_string()).into()),
    )
    .route("/health", web::get().to(health))
    .service(
        web::scope("/api/auth")
            .route("/register", web::post().to(auth::register))
            .route("/login", web::post().to(auth::login))
            .route("/refresh-token", web::post().to(auth::refresh_token))
            .route("/me", web::get().to(auth::me))
            .route("/me", web::put().to(auth::update_me))
            .route("/password", web::put().to(auth::change_password)),
    )
    // TASKS
    .service(
        web::scope("/api/tasks")
            .route("", web::get().to(task::list_tasks))
            .route("", web::post().to(task::create_task))
            .route("/with-subtasks", web::get().to(task::tasks_with_subtasks))
            .service(
                web::scope("/{id}/subtasks")
                    .route("", web::get().to(subtask::list_subtasks))
                    .route("", web::post().to(subtask::create_subtask))
                    .route("/status", web::get().to(subtask::subtask_status))
                    .route("/complete-all", web::patch().to(subtask::complete_all))
                    .route("/{subtask_id}", web::get().to(subtask::get_subtask))
                    .route("/{subtask_id}", web::put().to(subtask::update_subtask))
                    .route("/{subtask_id}", web::delete().to(subtask::delete_subtask)),
            )
            .route("/{id}", web::get().to(task::get_task))
            .route("/{id}", web::put().to(task::update_task))
            .route("/{id}", web::delete().to(task::delete_task))
            .route("/{id}/with-subtasks", web::delete().to(task::delete_task_with_subtasks))
            .route("/{id}/duplicate", web::post().to(task::duplicate_task))
            .route("/{id}/status", web::patch().to(task::update_status))
            .route("/{id}/parent", web::patch().to(task::update_parent))
            .route("/{id}/archive", web::post().to(task::archive_task)),
    )
    // TAXONOMY
    .service(
        web::scope("/api/categories")
            .route("", web::get().to(category::list_categories))
            .route("", web::post().to(category::create_category))
            .route("/{id}", web::get().to(category::get_category))
            .route("/{id}", web::put().to(category::update_category))
            .route("/{id}", web::delete().to(category::delete_category))
            .route("/{id}/tasks", web::get().to(category::category_tasks)),
    )
    .service(
        web::scope("/api/tags")
            .route("", web::get().to(tag::list_tags))
            .route("", web::post().to(tag::create_tag))
            .route("/{id}", web::get().to(tag::get_tag))
            .route("/{id}", web::put().to(tag::update_tag))
            .route("/{id}", web::delete().to(tag::delete_tag))
            .route("/{id}/tasks", web::get().to(tag::tag_tasks)),
    )
    // PROJECTS
    .service(
        web::scope("/api/projects")
            .route("", web::get().to(project::list_projects))
            .route("", web::post().to(project::create_project))
            .route("/{id}", web::get().to(project::get_project))
            .route("/{id}", web::put().to(project::update_project))
            .route("/{id}", web::delete().to(project::delete_project))
            .route("/{id}/tasks", web::get().to(project::project_tasks))
            .route("/{id}/members", web::post().to(project::add_project_member))
            .route(
                "/{id}/members/{user_id}",
                web::delete().to(project::remove_project_member),
            )
            .route(
                "/{id}/members/{user_id}",
                web::patch().to(project::update_project_member_role),
            ),
    )
    // TEAMS
    .service(
        web::scope("/api/teams")
            .route("", web::get().to(team_management::list_teams))
            .route("", web::post().to(team_management::create_team))
            .route("/{id}", web::get().to(team_management::get_team))
            .route("/{id}", web::put().to(team_management::update_team))
            .route("/{id}", web::delete().to(team_management::delete_team))
            .route("/{id}/members", web::get().to(team_management::get_team_members))
            .route("/{id}/members", web::post().to(team_management::add_team_member))
            .route(
                "/{id}/members/{user_id}",
                web::delete().to(team_management::remove_team_member),
            )
            .route(
                "/{id}/members/{user_id}",
                web::patch().to(team_management::update_team_member_role),
            )
            .route("/{id}/projects", web::get().to(team_management::get_team_projects))
            .route("/{id}/projects", web::post().to(team_management::create_team_project)),
    )
    // USERS
    .service(
        web::scope("/api/users")
            .route("/find", web::get().to(user_management::find_user_email))
            .route("/{id}", web::get().to(user_management::get_user_by_id)),
    )
    .default_service(web::to(not_found));
}

async fn open_store(config: &Config) -> io::Result<Arc<dyn Store>> {
    match config.store_backend {
        StoreBackend::Memory => {
            warn!("Using the in-memory store; data is lost on shutdown");
            Ok(Arc::new(memory_store::MemoryStore::new()))
        }
        StoreBackend::Mongo => {
            let uri = config.mongo_uri.as_deref().unwrap_or_default();
            let mongodb = db::MongoDB::init(uri, &config.database_name)
                .await
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
            Ok(Arc::new(mongodb))
        }
    }
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = Config::from_env()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
    let store = open_store(&config).await?;

    let state = AppState {
        store,
        config: config.clone(),
    };
    let frontend_origin = config.frontend_origin.clone();
    let jwt_secret = config.jwt_secret.clone();

    info!("Server running at http://{}:{}", config.bind_address, config.port);
    info!("Allowed CORS Origin: {}", frontend_origin);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend_origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                http::header::CONTENT_TYPE,
                http::header::ACCEPT,
                http::header::AUTHORIZATION,
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Authentication::new(jwt_secret.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .app_data(web::Data::new(state.clone()))
            .configure(configure_routes)
    })
    .bind((config.bind_address.as_str(), config.port))?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::test;
    use serde_json::{json, Value};

    fn test_state() -> AppState {
        AppState {
            store: Arc::new(memory_store::MemoryStore::new()),
            config: Config::for_tests(),
        }
    }

    macro_rules! spawn_app {
        ($state:expr) => {{
            let state: AppState = $state;
            test::init_service(
                App::new()
                    .wrap(Authentication::new(state.config.jwt_secret.clone()))
                    .app_data(web::Data::new(state))
                    .configure(configure_routes),
            )
            .await
        }};
    }

    macro_rules! register {
        ($app:expr, $name:expr, $email:expr) => {{
            let req = test::TestRequest::post()
                .uri("/api/auth/register")
                .set_json(json!({ "name": $name, "email": $email, "password": "secret123" }))
                .to_request();
            let resp = test::call_service($app, req).await;
            assert_eq!(resp.status(), StatusCode::CREATED);
            let body: Value = test::read_body_json(resp).await;
            body["data"]["token"].as_str().unwrap().to_string()
        }};
    }

    /// Sends the request with a bearer token; yields (status, json body).
    macro_rules! send {
        ($app:expr, $req:expr, $token:expr $(,)?) => {{
            let req = $req
                .insert_header((http::header::AUTHORIZATION, format!("Bearer {}", $token)))
                .to_request();
            let resp = test::call_service($app, req).await;
            let status = resp.status();
            let body: Value = test::read_body_json(resp).await;
            (status, body)
        }};
    }

    #[actix_web::test]
    async fn health_is_public() {
        let app = spawn_app!(test_state());
        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn task_routes_require_a_token() {
        let app = spawn_app!(test_state());
        let req = test::TestRequest::get().uri("/api/tasks").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);

        let (status, _) = send!(&app, test::TestRequest::get().uri("/api/tasks"), "garbage");
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn unknown_routes_answer_with_json() {
        let app = spawn_app!(test_state());
        let req = test::TestRequest::get().uri("/api/nowhere").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Route not found");
    }

    #[actix_web::test]
    async fn registration_seeds_taxonomy_and_rejects_duplicates() {
        let app = spawn_app!(test_state());
        let token = register!(&app, "Ada", "Ada@Example.com");

        let (status, body) = send!(&app, test::TestRequest::get().uri("/api/categories"), &token);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 5);
        let (_, body) = send!(&app, test::TestRequest::get().uri("/api/tags"), &token);
        assert_eq!(body["count"], 5);

        let req = test::TestRequest::post()
            .uri("/api/auth/register")
            .set_json(json!({ "name": "Ada", "email": "ada@example.com", "password": "secret123" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[actix_web::test]
    async fn subtasks_block_plain_delete() {
        let app = spawn_app!(test_state());
        let token = register!(&app, "Ada", "ada@example.com");

        let (status, body) = send!(
            &app,
            test::TestRequest::post().uri("/api/tasks").set_json(json!({ "title": "Parent" })),
            &token,
        );
        assert_eq!(status, StatusCode::CREATED);
        let parent = body["data"]["_id"].as_str().unwrap().to_string();

        let (status, body) = send!(
            &app,
            test::TestRequest::post()
                .uri(&format!("/api/tasks/{}/subtasks", parent))
                .set_json(json!({ "title": "Child" })),
            &token,
        );
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["parent"], parent.as_str());

        let (status, _) = send!(
            &app,
            test::TestRequest::delete().uri(&format!("/api/tasks/{}", parent)),
            &token,
        );
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send!(
            &app,
            test::TestRequest::delete().uri(&format!("/api/tasks/{}/with-subtasks", parent)),
            &token,
        );
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["deleted"], 2);

        let (status, _) = send!(
            &app,
            test::TestRequest::get().uri(&format!("/api/tasks/{}", parent)),
            &token,
        );
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn cyclic_parent_is_a_bad_request() {
        let app = spawn_app!(test_state());
        let token = register!(&app, "Ada", "ada@example.com");

        let (_, body) = send!(
            &app,
            test::TestRequest::post().uri("/api/tasks").set_json(json!({ "title": "A" })),
            &token,
        );
        let a = body["data"]["_id"].as_str().unwrap().to_string();
        let (_, body) = send!(
            &app,
            test::TestRequest::post()
                .uri("/api/tasks")
                .set_json(json!({ "title": "B", "parent": a })),
            &token,
        );
        let b = body["data"]["_id"].as_str().unwrap().to_string();

        let (status, body) = send!(
            &app,
            test::TestRequest::patch()
                .uri(&format!("/api/tasks/{}/parent", a))
                .set_json(json!({ "parent": b })),
            &token,
        );
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[actix_web::test]
    async fn other_users_cannot_touch_a_task() {
        let app = spawn_app!(test_state());
        let ada = register!(&app, "Ada", "ada@example.com");
        let bob = register!(&app, "Bob", "bob@example.com");

        let (_, body) = send!(
            &app,
            test::TestRequest::post().uri("/api/tasks").set_json(json!({ "title": "Mine" })),
            &ada,
        );
        let id = body["data"]["_id"].as_str().unwrap().to_string();

        let (status, _) = send!(
            &app,
            test::TestRequest::patch()
                .uri(&format!("/api/tasks/{}/status", id))
                .set_json(json!({ "status": "completed" })),
            &bob,
        );
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn malformed_json_is_a_validation_error() {
        let app = spawn_app!(test_state());
        let token = register!(&app, "Ada", "ada@example.com");
        let (status, body) = send!(
            &app,
            test::TestRequest::post()
                .uri("/api/tasks")
                .insert_header((http::header::CONTENT_TYPE, "application/json"))
                .set_payload("{ not json"),
            &token,
        );
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[actix_web::test]
    async fn ownership_transfer_keeps_one_owner() {
        let app = spawn_app!(test_state());
        let ada = register!(&app, "Ada", "ada@example.com");
        let _bob = register!(&app, "Bob", "bob@example.com");

        let (_, body) = send!(
            &app,
            test::TestRequest::post().uri("/api/projects").set_json(json!({ "name": "Apollo" })),
            &ada,
        );
        let project = body["data"]["_id"].as_str().unwrap().to_string();

        let (status, body) = send!(
            &app,
            test::TestRequest::post()
                .uri(&format!("/api/projects/{}/members", project))
                .set_json(json!({ "email": "bob@example.com" })),
            &ada,
        );
        assert_eq!(status, StatusCode::OK);
        let bob_id = body["data"]["members"][1]["user"]["_id"].as_str().unwrap().to_string();

        let (status, body) = send!(
            &app,
            test::TestRequest::patch()
                .uri(&format!("/api/projects/{}/members/{}", project, bob_id))
                .set_json(json!({ "role": "owner" })),
            &ada,
        );
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["owner"], bob_id.as_str());
        let owners = body["data"]["members"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|m| m["role"] == "owner")
            .count();
        assert_eq!(owners, 1);
    }

    #[actix_web::test]
    async fn deleting_a_project_keeps_its_tasks() {
        let app = spawn_app!(test_state());
        let ada = register!(&app, "Ada", "ada@example.com");
        let bob = register!(&app, "Bob", "bob@example.com");

        let (_, body) = send!(
            &app,
            test::TestRequest::post().uri("/api/projects").set_json(json!({ "name": "Apollo" })),
            &ada,
        );
        let project = body["data"]["_id"].as_str().unwrap().to_string();
        let (status, _) = send!(
            &app,
            test::TestRequest::post()
                .uri(&format!("/api/projects/{}/members", project))
                .set_json(json!({ "email": "bob@example.com", "role": "admin" })),
            &ada,
        );
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send!(
            &app,
            test::TestRequest::post()
                .uri("/api/tasks")
                .set_json(json!({ "title": "Launch", "project": project })),
            &ada,
        );
        assert_eq!(status, StatusCode::CREATED);
        let task = body["data"]["_id"].as_str().unwrap().to_string();

        let (status, _) = send!(
            &app,
            test::TestRequest::delete().uri(&format!("/api/projects/{}", project)),
            &bob,
        );
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send!(
            &app,
            test::TestRequest::delete().uri(&format!("/api/projects/{}", project)),
            &ada,
        );
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send!(
            &app,
            test::TestRequest::get().uri(&format!("/api/projects/{}", project)),
            &ada,
        );
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, body) = send!(
            &app,
            test::TestRequest::get().uri(&format!("/api/tasks/{}", task)),
            &ada,
        );
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"]["project"].is_null());
    }

    #[actix_web::test]
    async fn deleting_a_team_keeps_its_projects() {
        let app = spawn_app!(test_state());
        let ada = register!(&app, "Ada", "ada@example.com");
        let bob = register!(&app, "Bob", "bob@example.com");

        let (status, body) = send!(
            &app,
            test::TestRequest::post().uri("/api/teams").set_json(json!({ "name": "Crew" })),
            &ada,
        );
        assert_eq!(status, StatusCode::CREATED);
        let team = body["data"]["_id"].as_str().unwrap().to_string();
        let (status, _) = send!(
            &app,
            test::TestRequest::post()
                .uri(&format!("/api/teams/{}/members", team))
                .set_json(json!({ "email": "bob@example.com", "role": "admin" })),
            &ada,
        );
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send!(
            &app,
            test::TestRequest::post()
                .uri(&format!("/api/teams/{}/projects", team))
                .set_json(json!({ "name": "Gemini" })),
            &ada,
        );
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["team"], team.as_str());
        let project = body["data"]["_id"].as_str().unwrap().to_string();

        let (status, _) = send!(
            &app,
            test::TestRequest::delete().uri(&format!("/api/teams/{}", team)),
            &bob,
        );
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send!(
            &app,
            test::TestRequest::delete().uri(&format!("/api/teams/{}", team)),
            &ada,
        );
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send!(
            &app,
            test::TestRequest::get().uri(&format!("/api/teams/{}", team)),
            &ada,
        );
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, body) = send!(
            &app,
            test::TestRequest::get().uri(&format!("/api/projects/{}", project)),
            &ada,
        );
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"]["team"].is_null());
    }
}
