//! HTTP routes and handlers.

use crate::cache::SessionCache;
use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::files::FileTreeService;
use crate::models::{
    CreateFileRequest, DataQuery, FileResponse, ListQuery, StatsResponse, StatusResponse,
};
use crate::session::SessionManager;
use crate::storage::DocumentStore;
use crate::user_models::{CreateUserRequest, TokenResponse, UserResponse};
use crate::users::UserService;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub const TOKEN_HEADER: &str = "x-token";

pub struct AppState {
    pub sessions: SessionManager,
    pub users: UserService,
    pub files: FileTreeService,
    pub store: Arc<dyn DocumentStore>,
    pub cache: Arc<dyn SessionCache>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/stats", get(get_stats))
        .route("/users", post(post_user))
        .route("/users/me", get(get_me))
        .route("/connect", get(get_connect))
        .route("/disconnect", get(get_disconnect))
        .route("/files", post(post_file).get(list_files))
        .route("/files/:id", get(get_file))
        .route("/files/:id/publish", put(put_publish))
        .route("/files/:id/unpublish", put(put_unpublish))
        .route("/files/:id/data", get(get_file_data))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|t| !t.is_empty())
}

/// Resolves the `X-Token` header to a user id.
async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<String, ApiError> {
    let token = token(headers).ok_or_else(ApiError::unauthorized)?;
    state
        .sessions
        .resolve(token)
        .await
        .ok_or_else(ApiError::unauthorized)
}

async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        redis: state.cache.is_alive().await,
        db: state.store.is_alive().await,
    })
}

async fn get_stats(State(state): State<Arc<AppState>>) -> Result<Json<StatsResponse>, ApiError> {
    let users = state.store.count_users().await.map_err(|e| {
        tracing::error!("failed to count users: {e:#}");
        ApiError::internal()
    })?;
    let files = state.store.count_files().await.map_err(|e| {
        tracing::error!("failed to count files: {e:#}");
        ApiError::internal()
    })?;

    Ok(Json(StatsResponse { users, files }))
}

async fn post_user(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let user = state
        .users
        .register(payload.email, payload.password)
        .await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(&user))))
}

async fn get_me(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<UserResponse>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let user = state
        .users
        .find(&user_id)
        .await?
        .ok_or_else(ApiError::unauthorized)?;

    Ok(Json(UserResponse::from(&user)))
}

async fn get_connect(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<TokenResponse>, ApiError> {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(ApiError::unauthorized)?;

    let token = state.sessions.login(auth).await?;
    Ok(Json(TokenResponse { token }))
}

async fn get_disconnect(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let token = token(&headers).ok_or_else(ApiError::unauthorized)?;
    state.sessions.logout(token).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn post_file(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    JsonBody(payload): JsonBody<CreateFileRequest>,
) -> Result<(StatusCode, Json<FileResponse>), ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let node = state
        .files
        .create(&user_id, payload.into_new_file())
        .await?;

    Ok((StatusCode::CREATED, Json(FileResponse::from(&node))))
}

async fn get_file(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<FileResponse>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let node = state.files.get(&user_id, &id).await?;
    Ok(Json(FileResponse::from(&node)))
}

async fn list_files(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<FileResponse>>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let nodes = state
        .files
        .list(&user_id, &query.parent_id, query.page())
        .await?;

    Ok(Json(nodes.iter().map(FileResponse::from).collect()))
}

async fn put_publish(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<FileResponse>, ApiError> {
    set_visibility(&state, &headers, &id, true).await
}

async fn put_unpublish(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<FileResponse>, ApiError> {
    set_visibility(&state, &headers, &id, false).await
}

async fn set_visibility(
    state: &AppState,
    headers: &HeaderMap,
    id: &str,
    is_public: bool,
) -> Result<Json<FileResponse>, ApiError> {
    let user_id = authenticate(state, headers).await?;
    let node = state.files.set_visibility(&user_id, id, is_public).await?;
    Ok(Json(FileResponse::from(&node)))
}

/// Content download. The token is optional: public files are served to
/// anyone.
async fn get_file_data(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<DataQuery>,
) -> Result<Response, ApiError> {
    let requester = match token(&headers) {
        Some(token) => state.sessions.resolve(token).await,
        None => None,
    };

    let (node, bytes) = state
        .files
        .read_content(requester.as_deref(), &id, query.width())
        .await?;

    let mime = mime_guess::from_path(&node.name).first_or_octet_stream();
    let content_type = HeaderValue::from_str(mime.essence_str())
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}
