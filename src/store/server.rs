use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use axum::Router;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use super::api::{self, AppState, SharedState};
use super::db::{DbHandle, TaskDb};

/// Upper bound for `session_ttl_hours`: ten years.
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 365 * 10;

/// Configuration for the task store server (`[server]` in taskboard.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub session_ttl_hours: i64,
    /// Allow any origin. Meant for a browser UI served from elsewhere.
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            db_path: PathBuf::from(".taskboard/taskboard.db"),
            session_ttl_hours: 24,
            cors_permissive: false,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Session lifetime, rejecting values that would expire tokens at once
    /// or overflow the expiry timestamp.
    pub fn session_ttl(&self) -> Result<chrono::Duration> {
        let hours = self.session_ttl_hours;
        if !(1..=MAX_SESSION_TTL_HOURS).contains(&hours) {
            bail!(
                "session_ttl_hours must be between 1 and {}, got {}",
                MAX_SESSION_TTL_HOURS,
                hours
            );
        }
        chrono::Duration::try_hours(hours)
            .with_context(|| format!("session_ttl_hours out of range: {}", hours))
    }
}

/// Open the database (creating its directory) and wrap it in shared state.
pub fn open_state(config: &ServerConfig) -> Result<SharedState> {
    let session_ttl = config.session_ttl()?;
    if let Some(parent) = config.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }
    }
    let db = TaskDb::new(&config.db_path).context("Failed to initialize task database")?;
    Ok(state_from_db(db, session_ttl))
}

pub fn state_from_db(db: TaskDb, session_ttl: chrono::Duration) -> SharedState {
    Arc::new(AppState {
        db: DbHandle::new(db),
        session_ttl,
    })
}

/// Build the full application router.
pub fn build_router(state: SharedState, cors_permissive: bool) -> Router {
    let app = api::api_router().with_state(state);
    if cors_permissive {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Start the task store server and run until Ctrl+C.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let state = open_state(&config)?;
    let app = build_router(state, config.cors_permissive);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr: SocketAddr = listener.local_addr()?;
    info!(db = %config.db_path.display(), "taskboard store listening on http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_router(cors: bool) -> Router {
        let db = TaskDb::new_in_memory().unwrap();
        build_router(state_from_db(db, chrono::Duration::hours(1)), cors)
    }

    #[tokio::test]
    async fn test_health_via_full_router() {
        let app = test_router(false);
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_api_routes_mounted() {
        let app = test_router(false);
        let req = Request::builder().uri("/api/tasks").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let app = test_router(false);
        let req = Request::builder().uri("/tasks").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_permissive_cors_answers_preflight() {
        let app = test_router(true);
        let req = Request::builder()
            .method("OPTIONS")
            .uri("/api/tasks")
            .header("origin", "http://localhost:3000")
            .header("access-control-request-method", "PUT")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert!(resp.headers().contains_key("access-control-allow-origin"));
    }

    #[test]
    fn test_open_state_creates_db_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            db_path: dir.path().join("nested/board.db"),
            ..ServerConfig::default()
        };
        open_state(&config).unwrap();
        assert!(config.db_path.exists());
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.addr(), "127.0.0.1:5000");
        assert_eq!(config.session_ttl_hours, 24);
        assert!(!config.cors_permissive);
    }

    #[test]
    fn test_session_ttl_bounds() {
        let with_ttl = |hours| ServerConfig {
            session_ttl_hours: hours,
            ..ServerConfig::default()
        };
        assert_eq!(with_ttl(24).session_ttl().unwrap(), chrono::Duration::hours(24));
        assert!(with_ttl(MAX_SESSION_TTL_HOURS).session_ttl().is_ok());
        for bad in [0, -1, MAX_SESSION_TTL_HOURS + 1, i64::MAX] {
            let err = with_ttl(bad).session_ttl().unwrap_err();
            assert!(err.to_string().contains("session_ttl_hours"), "{}", err);
        }
    }

    #[test]
    fn test_open_state_rejects_zero_ttl_before_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            db_path: dir.path().join("nested/board.db"),
            session_ttl_hours: 0,
            ..ServerConfig::default()
        };
        assert!(open_state(&config).is_err());
        assert!(!dir.path().join("nested").exists());
    }
}
