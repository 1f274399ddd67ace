//
// Copyright 2025 The sbom-provider Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! HTTP endpoints of the provider.
//!
//! * `POST /verify`: a Gatekeeper `ProviderRequest`, answered with a
//!   `ProviderResponse` holding one item per key. Failures of single keys are
//!   reported inside of the items, the status code is always 200 once the
//!   body has been parsed.
//! * `GET /health`: liveness check.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_server::tls_rustls::RustlsConfig;
use serde_json::json;
use tracing::{error, info, warn};

use crate::errors::Result;
use crate::orchestrator::Orchestrator;

pub mod protocol;
use protocol::{ProviderRequest, ProviderResponse};

/// Time given to in-flight requests once a shutdown signal is received.
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// PEM files used to serve HTTPS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFiles {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    /// Plain HTTP when `None`.
    pub tls: Option<TlsFiles>,
}

impl ServerConfig {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }
}

/// The provider endpoints.
pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/verify", post(verify))
        .route("/health", get(health))
        .with_state(orchestrator)
}

async fn verify(State(orchestrator): State<Arc<Orchestrator>>, body: Bytes) -> Response {
    let request: ProviderRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Error parsing request");
            return (StatusCode::BAD_REQUEST, "Invalid request format").into_response();
        }
    };
    info!("Received request with {} keys", request.request.keys.len());

    let items = orchestrator.process_batch(&request.request.keys).await;

    match serde_json::to_vec(&ProviderResponse::new(items)) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Error encoding response");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode response",
            )
                .into_response()
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "healthy"}))
}

/// Serves the provider until a shutdown signal is received.
pub async fn serve(orchestrator: Arc<Orchestrator>, config: ServerConfig) -> Result<()> {
    let app = router(orchestrator);
    let addr = config.listen_addr();

    match config.tls {
        Some(tls) => {
            let rustls_config = RustlsConfig::from_pem_file(&tls.cert, &tls.key).await?;
            let handle = axum_server::Handle::new();
            tokio::spawn({
                let handle = handle.clone();
                async move {
                    shutdown_signal().await;
                    handle.graceful_shutdown(Some(SHUTDOWN_GRACE_PERIOD));
                }
            });

            info!("Starting SBOM provider server on {addr} (HTTPS)");
            axum_server::bind_rustls(addr, rustls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            warn!("Starting SBOM provider server on {addr} (HTTP - not recommended for production)");
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
    }

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{CredentialResolver, CredentialSource};
    use crate::mock_client::test::{MockSecretStoreConnector, MockTrustVerifier};
    use axum::body::Body;
    use axum::http::{Method, Request};
    use tower::ServiceExt;

    fn app() -> Router {
        let orchestrator = Orchestrator::new(
            Arc::new(MockTrustVerifier::default()),
            CredentialResolver::new(Arc::new(MockSecretStoreConnector::unreachable()), ""),
            CredentialSource::anonymous(),
        );
        router(Arc::new(orchestrator))
    }

    #[tokio::test]
    async fn verify_only_accepts_post() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri("/verify")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn malformed_body_is_rejected() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/verify")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_is_always_ok() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn listens_on_all_interfaces() {
        let config = ServerConfig {
            port: 8090,
            tls: None,
        };
        assert_eq!(config.listen_addr().to_string(), "0.0.0.0:8090");
    }
}
