//! Minimal brisk example: JSON endpoints, a guarded admin area, error handling.
//!
//! Run with:
//!   RUST_LOG=brisk=debug,info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/42
//!   curl -X POST http://localhost:3000/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice"}'
//!   curl -X DELETE http://localhost:3000/users/42
//!   curl http://localhost:3000/admin/stats -H 'x-api-key: secret123'
//!   curl http://localhost:3000/nope

use std::time::Duration;

use brisk::middleware::{Cors, RateLimit, RequireHeader, SecurityHeaders, Trace};
use brisk::{Endpoint, Error, ErrorNext, Next, Request, Response, Result, Router, Server, Status};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

#[derive(Deserialize)]
struct NewUser {
    name: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let admin = Router::new()
        .middleware(RequireHeader::new("x-api-key", "secret123"))
        .get("/stats", stats);

    let app = Router::new()
        .middleware(Trace)
        .middleware(Cors::permissive())
        .middleware(SecurityHeaders)
        .middleware(RateLimit::new(100, Duration::from_secs(60)))
        .set("app.name", "basic")
        .get("/users/:id", get_user)
        .route(Endpoint::post("/users", create_user).with(require_json))
        .delete("/users/:id", delete_user)
        .mount("/admin", admin)
        .error_handler(json_errors)
        .fallback(not_found);

    Server::bind("0.0.0.0:3000").serve(app).await
}

// GET /users/:id
async fn get_user(req: Request, mut res: Response) -> Response {
    let id = req.param("id").unwrap_or("unknown");
    res.json(&serde_json::json!({ "id": id, "name": "alice" }));
    res
}

// POST /users
//
// A malformed body turns into Error::Json, which json_errors answers with 400.
async fn create_user(req: Request, mut res: Response) -> Result<Response> {
    let input: NewUser = req.json()?;
    if input.name.trim().is_empty() {
        return Err(Error::http(Status::UNPROCESSABLE_ENTITY, "name is required"));
    }
    res.status(Status::CREATED)
        .set_header("location", "/users/99")
        .json(&serde_json::json!({ "id": "99", "name": input.name }));
    Ok(res)
}

// DELETE /users/:id → 204 No Content
async fn delete_user(_req: Request, _res: Response) -> Status {
    Status::NO_CONTENT
}

// GET /admin/stats
async fn stats(req: Request, mut res: Response) -> Response {
    res.json(&serde_json::json!({ "app": req.setting("app.name"), "users": 1 }));
    res
}

async fn require_json(req: Request, res: Response, next: Next) -> Result<Response> {
    if !req.is("application/json") {
        return Ok(Response::with_status(Status::UNSUPPORTED_MEDIA_TYPE));
    }
    next.run(req, res).await
}

async fn json_errors(err: Error, _req: Request, mut res: Response, _next: ErrorNext) -> Response {
    let status = err.status();
    let message = match &err {
        Error::Http { message, .. } => message.clone(),
        _ => status.canonical_reason().unwrap_or("error").to_owned(),
    };
    res.status(status).json(&serde_json::json!({ "error": message }));
    res
}

async fn not_found(req: Request, mut res: Response) -> Response {
    res.status(Status::NOT_FOUND)
        .json(&serde_json::json!({ "error": format!("no route for {}", req.path()) }));
    res
}
