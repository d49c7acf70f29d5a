//! Administrative HTTP surface.
//!
//! # Endpoints
//! - `GET /admin/status`: version, pool and session counts
//! - `GET /admin/pools`: per pool address, idle, leased, waiting, degraded.
//!   `on_standby` stays true after a failover; `degraded` clears once the
//!   standby answers
//! - `GET /admin/sessions`: per session target, policy, transaction, binding
//! - `POST /admin/pools/{name}/failover`: switch a pool to its standby
//!
//! Every route requires `Authorization: Bearer <api_key>`.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::coordinator::Coordinator;
use crate::lifecycle::Shutdown;

#[derive(Clone)]
pub struct AdminState {
    pub coordinator: Arc<Coordinator>,
    pub shutdown: Shutdown,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/pools", get(get_pools))
        .route("/admin/sessions", get(get_sessions))
        .route("/admin/pools/{name}/failover", post(post_failover))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the admin router until shutdown.
pub async fn serve_admin(state: AdminState, bind_address: &str) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Admin API listening");

    let mut shutdown_rx = state.shutdown.subscribe();
    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::config::{PoolerConfig, TargetConfig};
    use crate::testing::MockConnector;

    const KEY: &str = "test-key";

    fn state() -> AdminState {
        let mut primary = TargetConfig::new("app", "db:5432");
        primary.standby_address = Some("standby:5432".to_string());
        let mut config = PoolerConfig {
            targets: vec![primary, TargetConfig::new("solo", "solo:5432")],
            ..PoolerConfig::default()
        };
        config.admin.api_key = KEY.to_string();
        AdminState {
            coordinator: Coordinator::new(&config, MockConnector::new().arc()),
            shutdown: Shutdown::new(),
        }
    }

    fn request(method: &str, uri: &str, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(key) = key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn rejects_missing_or_wrong_key() {
        let app = setup_admin_router(state());
        let response = app.clone().oneshot(request("GET", "/admin/status", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app.oneshot(request("GET", "/admin/status", Some("nope"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn lists_pools() {
        let app = setup_admin_router(state());
        let response = app.oneshot(request("GET", "/admin/pools", Some(KEY))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json(response).await;
        let pools = body.as_array().unwrap();
        assert_eq!(pools.len(), 2);
        assert_eq!(pools[0]["name"], "app");
        assert_eq!(pools[0]["address"], "db:5432");
        assert_eq!(pools[0]["idle"], 0);
        assert_eq!(pools[0]["degraded"], false);
    }

    #[tokio::test]
    async fn failover_switches_once() {
        let app = setup_admin_router(state());
        let response = app
            .clone()
            .oneshot(request("POST", "/admin/pools/app/failover", Some(KEY)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["address"], "standby:5432");

        let again = app
            .clone()
            .oneshot(request("POST", "/admin/pools/app/failover", Some(KEY)))
            .await
            .unwrap();
        assert_eq!(again.status(), StatusCode::CONFLICT);

        let solo = app
            .clone()
            .oneshot(request("POST", "/admin/pools/solo/failover", Some(KEY)))
            .await
            .unwrap();
        assert_eq!(solo.status(), StatusCode::CONFLICT);

        let missing = app
            .oneshot(request("POST", "/admin/pools/ghost/failover", Some(KEY)))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn sessions_are_listed() {
        let state = state();
        let params = std::collections::HashMap::from([("database".to_string(), "app".to_string())]);
        let _session = state.coordinator.open_session(&params, None).unwrap();

        let app = setup_admin_router(state);
        let response = app.oneshot(request("GET", "/admin/sessions", Some(KEY))).await.unwrap();
        let body = json(response).await;
        assert_eq!(body[0]["target"], "app");
        assert_eq!(body[0]["policy"], "transaction");
        assert_eq!(body[0]["transaction"], "none");
        assert!(body[0]["bound_connection"].is_null());
    }
}
