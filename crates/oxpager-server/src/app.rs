use crate::state::AppState;
use crate::{api, logging};
use axum::middleware;
use axum::Router;
use std::future::Future;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

pub fn build_http_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    api::routes()
        .with_state(state)
        .layer(cors)
        .layer(middleware::from_fn(logging::request_logging))
}

/// Serves `app` until `stop` resolves or `shutdown` is cancelled. Either way
/// the token ends up cancelled and open connections are drained before this
/// returns.
pub async fn serve_until<F>(
    listener: TcpListener,
    app: Router,
    shutdown: CancellationToken,
    stop: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let token = shutdown.clone();
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = stop => tracing::info!("Shutting down gracefully"),
                _ = token.cancelled() => {}
            }
            token.cancel();
        })
        .await;
    shutdown.cancel();
    result
}
