use crate::dispatch::Dispatcher;
use crate::error::{AppError, AppErrorKind};
use crate::request::{Method, Reply, Request};
use crate::server::UdsConnectInfo;
use crate::telemetry::{correlation_layer, request_span, CorrelationId};
use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use std::collections::HashMap;
use std::sync::Arc;

/// Upper bound on request bodies, matching the transport's local-socket use.
pub const MAX_REQUEST_SIZE: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .fallback(dispatch)
        .layer(middleware::from_fn(correlation_layer))
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// Adapt the HTTP exchange to the dispatcher's request model and back.
async fn dispatch(State(state): State<AppState>, req: axum::extract::Request) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<UdsConnectInfo>>()
        .and_then(|ConnectInfo(info)| info.peer);
    let correlation_id = req
        .extensions()
        .get::<CorrelationId>()
        .map(|CorrelationId(id)| id.clone())
        .unwrap_or_default();

    let request = match adapt(peer, req).await {
        Ok(request) => request,
        Err(err) => return err.into_response(),
    };
    let span = request_span(request.method.as_str(), &request.path, &correlation_id);
    let reply = span.in_scope(|| state.dispatcher.handle(&request));
    into_response(reply)
}

async fn adapt(
    peer: Option<crate::request::PeerCred>,
    req: axum::extract::Request,
) -> Result<Request, AppError> {
    let (parts, body) = req.into_parts();

    let path = parts.uri.path().to_string();
    let method = if parts.method == axum::http::Method::GET {
        if path.ends_with('/') {
            Method::List
        } else {
            Method::Read
        }
    } else if parts.method == axum::http::Method::PUT || parts.method == axum::http::Method::POST {
        Method::Write
    } else if parts.method == axum::http::Method::DELETE {
        Method::Delete
    } else {
        return Err(AppError::bad_request(format!(
            "unsupported method {}",
            parts.method
        )));
    };

    let headers: HashMap<String, String> = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect();

    let bytes = axum::body::to_bytes(body, MAX_REQUEST_SIZE)
        .await
        .map_err(|_| AppError::new(AppErrorKind::PayloadTooLarge))?;
    let body = (!bytes.is_empty()).then(|| bytes.to_vec());

    Ok(Request {
        method,
        path,
        headers,
        body,
        peer,
    })
}

fn into_response(reply: Reply) -> Response {
    let mut builder = Response::builder().status(reply.status);
    if let Some(content_type) = reply.content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    builder
        .body(Body::from(reply.body.unwrap_or_default()))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
