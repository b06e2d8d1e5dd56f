//! HTTP surface: `/rpc`, the streaming endpoints, and `/health`.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use strata_core::{ErrorCode, FsError};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::auth::{authenticate, JwtVerifier, TokenVerifier};
use crate::rpc::{self, status_for};
use crate::state::AppContext;
use crate::watch::watch_handler;

pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/rpc", post(post_rpc).get(get_rpc))
        .route("/stream/read", post(stream_read))
        .route("/stream/write", post(stream_write))
        .route("/watch", get(watch_handler))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

fn json_response(status: StatusCode, body: &Value) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("static response builds")
}

fn error_response(err: &FsError) -> Response {
    let status = StatusCode::from_u16(status_for(err.code)).unwrap_or(StatusCode::BAD_REQUEST);
    json_response(status, &err.to_envelope())
}

/// Accepted request content types: `application/json` (with or without a
/// charset), `text/json`, or no header at all.
fn acceptable_content_type(headers: &HeaderMap) -> bool {
    match headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        None => true,
        Some(value) => {
            let mime = value.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
            mime == "application/json" || mime == "text/json"
        }
    }
}

async fn post_rpc(State(ctx): State<AppContext>, headers: HeaderMap, body: String) -> Response {
    if !acceptable_content_type(&headers) {
        let err = FsError::new(ErrorCode::InvalidRequest, "unsupported content type");
        return error_response(&err);
    }
    if body.len() > ctx.config.server.max_body_bytes {
        let err = FsError::new(ErrorCode::InvalidRequest, "request body too large");
        return error_response(&err);
    }

    let verifier = JwtVerifier::from_config(&ctx.config.auth);
    let tool_ctx = match authenticate(&headers, verifier.as_ref().map(|v| v as &dyn TokenVerifier))
    {
        Ok(ctx) => ctx,
        Err(e) => return error_response(&e),
    };

    // Dispatch on a blocking thread under the request deadline.
    let timeout = std::time::Duration::from_millis(ctx.config.server.request_timeout_ms);
    let dispatch_ctx = ctx.clone();
    let work = tokio::task::spawn_blocking(move || {
        rpc::handle_body(&dispatch_ctx, &body, Some(&tool_ctx))
    });

    let reply = match tokio::time::timeout(timeout, work).await {
        Ok(Ok(reply)) => reply,
        Ok(Err(join_err)) => {
            warn!(error = %join_err, "rpc dispatch task failed");
            let err = FsError::internal("request processing failed");
            return error_response(&err);
        }
        Err(_) => {
            let err = FsError::new(ErrorCode::Timeout, "request deadline exceeded");
            return error_response(&err);
        }
    };

    match reply.body {
        None => Response::builder()
            .status(StatusCode::NO_CONTENT)
            .body(Body::empty())
            .expect("static response builds"),
        Some(body) => json_response(
            StatusCode::from_u16(reply.status).unwrap_or(StatusCode::OK),
            &body,
        ),
    }
}

async fn get_rpc() -> Response {
    let err = FsError::new(ErrorCode::MethodNotFound, "use POST /rpc");
    json_response(StatusCode::NOT_FOUND, &err.to_envelope())
}

/// `POST /stream/read {path}` → raw file bytes.
async fn stream_read(State(ctx): State<AppContext>, body: String) -> Response {
    let params: Value = match serde_json::from_str(&body) {
        Ok(v) => v,
        Err(e) => {
            let err = FsError::new(ErrorCode::ParseError, format!("invalid JSON: {e}"));
            return error_response(&err);
        }
    };
    let Some(path) = params["path"].as_str() else {
        let err = FsError::invalid("'path' must be a string");
        return error_response(&err);
    };
    match ctx.fs.read_file(path) {
        Ok(bytes) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(Body::from(bytes))
            .expect("static response builds"),
        Err(e) => error_response(&e),
    }
}

/// `POST /stream/write {path, content, mode?}` → `{}` on success.
async fn stream_write(State(ctx): State<AppContext>, body: String) -> Response {
    let params: Value = match serde_json::from_str(&body) {
        Ok(v) => v,
        Err(e) => {
            let err = FsError::new(ErrorCode::ParseError, format!("invalid JSON: {e}"));
            return error_response(&err);
        }
    };
    let Some(path) = params["path"].as_str() else {
        let err = FsError::invalid("'path' must be a string");
        return error_response(&err);
    };
    let content = params["content"].as_str().unwrap_or("");
    match ctx.fs.write_file(path, content.as_bytes(), None) {
        Ok(_) => json_response(StatusCode::OK, &json!({})),
        Err(e) => error_response(&e),
    }
}

async fn health(State(ctx): State<AppContext>) -> Response {
    let body = json!({
        "status": "ok",
        "uptime_ms": ctx.started.elapsed().as_millis() as u64,
    });
    json_response(StatusCode::OK, &body)
}
