//! Reference identity service: a [`UserStore`] served over HTTP/JSON.

use std::future::Future;

use {
    axum::{
        Json, Router,
        extract::State,
        http::StatusCode,
        response::IntoResponse,
        routing::{get, post},
    },
    tokio::net::TcpListener,
    tracing::{info, warn},
};

use crate::{
    Identity, StoreError, UserStore,
    types::{CREATE_PATH, CredentialsRequest, HEALTH_PATH, LOGIN_PATH, UserResponse},
};

/// Build the identity service router (shared between the CLI and tests).
pub fn identity_router(store: UserStore) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health_handler))
        .route(LOGIN_PATH, post(login_handler))
        .route(CREATE_PATH, post(create_handler))
        .with_state(store)
}

/// Serve the identity API on `listener` until `shutdown` resolves.
pub async fn serve_identity(
    listener: TcpListener,
    store: UserStore,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, "identity service listening");
    axum::serve(listener, identity_router(store))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health_handler(State(store): State<UserStore>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "users": store.len(),
    }))
}

async fn login_handler(
    State(store): State<UserStore>,
    Json(req): Json<CredentialsRequest>,
) -> (StatusCode, Json<UserResponse>) {
    info!(login = %req.login, "login request");
    handle(store, req, UserStore::authenticate_user).await
}

async fn create_handler(
    State(store): State<UserStore>,
    Json(req): Json<CredentialsRequest>,
) -> (StatusCode, Json<UserResponse>) {
    info!(login = %req.login, "create request");
    handle(store, req, UserStore::create_user).await
}

async fn handle(
    store: UserStore,
    req: CredentialsRequest,
    op: fn(&UserStore, &str, &str) -> Result<Identity, StoreError>,
) -> (StatusCode, Json<UserResponse>) {
    if req.login.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(UserResponse::rejected("Invalid login")),
        );
    }
    if req.password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(UserResponse::rejected("Invalid password")),
        );
    }

    let result = tokio::task::spawn_blocking(move || op(&store, &req.login, &req.password)).await;
    match result {
        Ok(Ok(user)) => (StatusCode::OK, Json(UserResponse::granted(user))),
        Ok(Err(e)) => (StatusCode::OK, Json(UserResponse::rejected(e.to_string()))),
        Err(e) => {
            warn!(error = %e, "identity store task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(UserResponse::rejected("internal error")),
            )
        },
    }
}
