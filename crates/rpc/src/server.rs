use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use sandbox_executor::Sandbox;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;

/// Builds the HTTP routes over a shared sandbox.
pub fn router(sandbox: Arc<Sandbox>, cors: bool) -> Router {
    let app = Router::new()
        .route("/account/create", post(handlers::create_account))
        .route("/account/:address", get(handlers::get_account))
        .route("/contract/create", post(handlers::create_contract))
        .route("/contract/call", post(handlers::call_contract))
        .route("/health", get(handlers::health))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(sandbox);

    if cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

pub struct ApiServer {
    sandbox: Arc<Sandbox>,
    addr: SocketAddr,
    cors: bool,
}

impl ApiServer {
    pub fn new(addr: SocketAddr, sandbox: Arc<Sandbox>) -> Self {
        Self {
            sandbox,
            addr,
            cors: true,
        }
    }

    pub fn with_cors(mut self, cors: bool) -> Self {
        self.cors = cors;
        self
    }

    /// Serves until `shutdown` resolves.
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> std::io::Result<()> {
        let app = router(self.sandbox, self.cors);
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!(addr = %listener.local_addr()?, cors = self.cors, "sandbox API listening");

        axum::serve(listener, app).with_graceful_shutdown(shutdown).await
    }
}
