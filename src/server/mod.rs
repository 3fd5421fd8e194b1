//! HTTP surface
//!
//! Three JSON endpoints over a [`TransferCoordinator`]:
//! - `POST /probe` with form field `url`
//! - `POST /download` (form) or `GET /download?url=...`
//! - `GET /progress`, optionally `?id=<transfer id>`
//!
//! Callers are tracked with a session cookie. On `/probe` and `/download` a
//! missing or unknown cookie gets a fresh session and a `Set-Cookie` on the
//! response; `/progress` only reads existing sessions.

use crate::coordinator::TransferCoordinator;
use crate::error::{EngineError, ErrorCode};
use crate::protocol::{size_repr, ProgressReport, TransferId};
use crate::session::SessionId;

use axum::extract::rejection::FormRejection;
use axum::extract::{Form, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    coordinator: Arc<TransferCoordinator>,
    cookie_name: Arc<str>,
}

impl AppState {
    pub fn new(coordinator: Arc<TransferCoordinator>) -> Self {
        let cookie_name = Arc::from(coordinator.config().server.session_cookie.as_str());
        Self {
            coordinator,
            cookie_name,
        }
    }
}

/// Build the router for a coordinator
pub fn router(coordinator: Arc<TransferCoordinator>) -> Router {
    Router::new()
        .route("/probe", post(probe))
        .route("/download", get(download).post(download))
        .route("/progress", get(progress))
        .with_state(AppState::new(coordinator))
}

/// Serve on an already bound listener until `shutdown` resolves
pub async fn serve_with_shutdown<F>(
    listener: TcpListener,
    coordinator: Arc<TransferCoordinator>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Listening on http://{}", addr);
    }
    axum::serve(listener, router(coordinator))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Bind `addr` and serve until `shutdown` resolves
pub async fn serve(
    addr: SocketAddr,
    coordinator: Arc<TransferCoordinator>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_with_shutdown(listener, coordinator, shutdown).await
}

#[derive(Debug, Deserialize)]
struct UrlForm {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProgressQuery {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ProbeResponse {
    success: bool,
    file: String,
    #[serde(with = "size_repr")]
    size: Option<u64>,
    url: String,
}

#[derive(Debug, Serialize)]
struct StartResponse {
    success: bool,
    file: String,
    transfer_id: TransferId,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Error rendered as `{"error": message}` with a matching status code
#[derive(Debug)]
struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (status_for(self.0.code()), Json(body)).into_response()
    }
}

/// HTTP status for an error code
pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::InvalidUrl | ErrorCode::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorCode::UnsupportedType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        ErrorCode::ProbeFailed => StatusCode::BAD_GATEWAY,
        ErrorCode::TransferInProgress | ErrorCode::DestinationBusy => StatusCode::CONFLICT,
        ErrorCode::Shutdown => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::TransferFailed | ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn probe(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<UrlForm>, FormRejection>,
) -> Response {
    let (session, created) = state.session(&headers);
    let result = match required_url(form) {
        Ok(url) => state
            .coordinator
            .probe(session, &url)
            .await
            .map(|descriptor| ProbeResponse {
                success: true,
                file: descriptor.filename,
                size: descriptor.size_bytes,
                url: descriptor.source_url,
            }),
        Err(e) => Err(e),
    };
    state.respond(session, created, result)
}

async fn download(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<UrlForm>, FormRejection>,
) -> Response {
    let (session, created) = state.session(&headers);
    let result = match required_url(form) {
        Ok(url) => state
            .coordinator
            .start(session, &url)
            .await
            .map(|started| StartResponse {
                success: true,
                file: started.filename,
                transfer_id: started.id,
            }),
        Err(e) => Err(e),
    };
    state.respond(session, created, result)
}

async fn progress(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ProgressQuery>,
) -> Response {
    // Polling never creates a session
    let presented = session_from_headers(&headers, &state.cookie_name);
    let session = state.coordinator.known_session(presented);
    let report: ProgressReport = match query.id.as_deref().map(str::parse::<TransferId>) {
        Some(Ok(id)) => state.coordinator.progress_of(id),
        Some(Err(_)) => ProgressReport::idle(),
        None => session.map_or_else(ProgressReport::idle, |s| state.coordinator.progress(s)),
    };
    Json(report).into_response()
}

fn required_url(form: Result<Form<UrlForm>, FormRejection>) -> Result<String, EngineError> {
    match form {
        Ok(Form(UrlForm { url: Some(url) })) if !url.trim().is_empty() => Ok(url),
        Ok(_) => Err(EngineError::invalid_url("missing url")),
        Err(rejection) => Err(EngineError::invalid_url(rejection.body_text())),
    }
}

impl AppState {
    fn session(&self, headers: &HeaderMap) -> (SessionId, bool) {
        let presented = session_from_headers(headers, &self.cookie_name);
        self.coordinator.resolve_session(presented)
    }

    fn respond<T: Serialize>(
        &self,
        session: SessionId,
        created: bool,
        result: Result<T, EngineError>,
    ) -> Response {
        let mut response = match result {
            Ok(body) => Json(body).into_response(),
            Err(e) => ApiError(e).into_response(),
        };
        if created {
            if let Ok(value) = HeaderValue::from_str(&session_cookie(&self.cookie_name, session)) {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
        }
        response
    }
}

/// `Set-Cookie` value carrying a session token
pub fn session_cookie(name: &str, session: SessionId) -> String {
    format!("{}={}; HttpOnly; SameSite=Lax; Path=/", name, session)
}

/// Session token from the request's `Cookie` headers, if present and well formed
pub fn session_from_headers(headers: &HeaderMap, name: &str) -> Option<SessionId> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .and_then(|(_, value)| value.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_is_found_among_others() {
        let session = SessionId::new();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; remote_dl_session={}; x=1", session))
                .unwrap(),
        );
        assert_eq!(
            session_from_headers(&headers, "remote_dl_session"),
            Some(session)
        );
        assert_eq!(session_from_headers(&headers, "other"), None);
    }

    #[test]
    fn malformed_cookie_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("remote_dl_session=not-a-token"),
        );
        assert_eq!(session_from_headers(&headers, "remote_dl_session"), None);
    }

    #[test]
    fn set_cookie_attributes() {
        let session = SessionId::new();
        let cookie = session_cookie("remote_dl_session", session);
        assert!(cookie.starts_with(&format!("remote_dl_session={}", session)));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
    }

    #[test]
    fn validation_errors_map_to_client_statuses() {
        assert_eq!(status_for(ErrorCode::InvalidUrl), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(ErrorCode::UnsupportedType),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(status_for(ErrorCode::ProbeFailed), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(ErrorCode::TransferInProgress), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorCode::Shutdown), StatusCode::SERVICE_UNAVAILABLE);
    }
}
