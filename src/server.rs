//! Process supervision: serve the router until a shutdown signal or the first fatal
//! failure, drain in-flight requests, then report how the process should exit.

use crate::error::AppError;
use crate::routes::router;
use crate::state::AppState;
use crate::store::ResourceStore;
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::any::Any;
use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::{mpsc, oneshot};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// How the server stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Exit {
    Graceful,
    Fatal(String),
}

impl Exit {
    pub fn code(&self) -> ExitCode {
        match self {
            Exit::Graceful => ExitCode::SUCCESS,
            Exit::Fatal(_) => ExitCode::FAILURE,
        }
    }
}

/// Cloneable sender for fatal failures. The first report stops the server.
#[derive(Clone, Debug)]
pub struct FatalHandle {
    tx: mpsc::UnboundedSender<String>,
}

impl FatalHandle {
    pub fn report(&self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::error!(%reason, "fatal failure reported");
        if self.tx.send(reason).is_err() {
            tracing::debug!("supervisor already stopped");
        }
    }
}

pub struct Supervisor {
    handle: FatalHandle,
    fatal_rx: mpsc::UnboundedReceiver<String>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub fn new() -> Self {
        let (tx, fatal_rx) = mpsc::unbounded_channel();
        Supervisor {
            handle: FatalHandle { tx },
            fatal_rx,
        }
    }

    pub fn handle(&self) -> FatalHandle {
        self.handle.clone()
    }

    /// Run a background task; an error or panic in it is fatal.
    pub fn spawn_guarded<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = Result<(), String>> + Send + 'static,
    {
        let handle = self.handle();
        tokio::spawn(async move {
            match tokio::spawn(task).await {
                Ok(Ok(())) => tracing::debug!(task = name, "background task finished"),
                Ok(Err(reason)) => handle.report(format!("{}: {}", name, reason)),
                Err(e) => handle.report(format!("{} panicked: {}", name, e)),
            }
        });
    }

    /// Serve `app` until `shutdown` resolves or a fatal failure is reported.
    pub async fn run<S>(self, listener: TcpListener, app: Router, shutdown: S) -> std::io::Result<Exit>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let Supervisor { handle, mut fatal_rx } = self;
        let (exit_tx, exit_rx) = oneshot::channel();
        let trigger = async move {
            let _keep_open = handle;
            let exit = tokio::select! {
                _ = shutdown => Exit::Graceful,
                Some(reason) = fatal_rx.recv() => {
                    tracing::error!(%reason, "shutting down after fatal failure");
                    Exit::Fatal(reason)
                }
            };
            tracing::info!("draining in-flight requests");
            let _ = exit_tx.send(exit);
        };
        tracing::info!(addr = ?listener.local_addr().ok(), "listening");
        axum::serve(listener, app).with_graceful_shutdown(trigger).await?;
        tracing::info!("server shutdown complete");
        Ok(exit_rx.await.unwrap_or(Exit::Graceful))
    }
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl+C), starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}

/// Ping the store every `interval`; fail after `max_failures` consecutive failed pings.
pub async fn watch_store(store: Arc<dyn ResourceStore>, interval: Duration, max_failures: u32) -> Result<(), String> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut failures = 0u32;
    loop {
        ticker.tick().await;
        match store.ping().await {
            Ok(()) => {
                if failures > 0 {
                    tracing::info!(failures, "store reachable again");
                }
                failures = 0;
            }
            Err(e) => {
                failures += 1;
                tracing::warn!(error = %e, failures, max_failures, "store ping failed");
                if failures >= max_failures {
                    return Err(format!("store unreachable after {} consecutive pings: {}", failures, e));
                }
            }
        }
    }
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| panic.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_else(|| "handler panicked".to_string());
    AppError::Unhandled(detail).into_response()
}

/// Full application: routes plus body limit, request tracing and panic recovery.
pub fn build_app(state: AppState, body_limit: usize) -> Router {
    router(state)
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(panic_response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::model::{IncludeSpec, Record, ResourceDef};
    use crate::query::Filter;
    use crate::store::FindQuery;
    use async_trait::async_trait;
    use axum::routing::get;
    use uuid::Uuid;

    async fn local_listener() -> TcpListener {
        TcpListener::bind("127.0.0.1:0").await.unwrap()
    }

    #[tokio::test]
    async fn graceful_when_shutdown_resolves() {
        let exit = Supervisor::new()
            .run(local_listener().await, Router::new().route("/", get(|| async { "ok" })), async {})
            .await
            .unwrap();
        assert_eq!(exit, Exit::Graceful);
    }

    #[tokio::test]
    async fn fatal_report_stops_the_server() {
        let supervisor = Supervisor::new();
        supervisor.handle().report("boom");
        let exit = supervisor
            .run(local_listener().await, Router::new(), std::future::pending())
            .await
            .unwrap();
        assert_eq!(exit, Exit::Fatal("boom".into()));
    }

    #[tokio::test]
    async fn failing_guarded_task_is_fatal() {
        let supervisor = Supervisor::new();
        supervisor.spawn_guarded("worker", async { Err("gave up".to_string()) });
        let exit = supervisor
            .run(local_listener().await, Router::new(), std::future::pending())
            .await
            .unwrap();
        assert_eq!(exit, Exit::Fatal("worker: gave up".into()));
    }

    struct DownStore;

    #[async_trait]
    impl ResourceStore for DownStore {
        async fn find(&self, _: &ResourceDef, _: &FindQuery) -> Result<Vec<Record>, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn count(&self, _: &ResourceDef, _: &Filter) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn find_by_id(&self, _: &ResourceDef, _: Uuid, _: &[IncludeSpec]) -> Result<Option<Record>, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn create(&self, _: &ResourceDef, _: Record) -> Result<Record, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn update_by_id(&self, _: &ResourceDef, _: Uuid, _: Record) -> Result<Option<Record>, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn delete_by_id(&self, _: &ResourceDef, _: Uuid) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn delete_many(&self, _: &ResourceDef, _: &Filter) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
    }

    #[tokio::test]
    async fn watchdog_gives_up_after_consecutive_failures() {
        let err = watch_store(Arc::new(DownStore), Duration::from_millis(1), 3)
            .await
            .unwrap_err();
        assert!(err.starts_with("store unreachable after 3 consecutive pings"), "{err}");
    }
}
