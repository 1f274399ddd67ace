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

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use sbom_provider::config::Config;
use sbom_provider::credentials::CredentialResolver;
use sbom_provider::errors::Result;
use sbom_provider::orchestrator::Orchestrator;
use sbom_provider::server;
use sbom_provider::verify::CosignVerifier;
use tracing::error;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
pub async fn main() -> ExitCode {
    let config = Config::parse();

    // setup logging, RUST_LOG wins over --verbose
    let level_filter = if config.verbose { "debug" } else { "info" };
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_filter));
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "provider failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<()> {
    // both ring and aws-lc-rs end up linked, rustls needs to be told which one to use
    let _ = rustls::crypto::ring::default_provider().install_default();

    config.log_summary();

    let verifier = CosignVerifier::production(config.registry_config(), config.trusted_root()).await?;
    let resolver = CredentialResolver::in_cluster(config.pod_namespace.clone());
    let default_credentials = resolver.default_source().await;

    let orchestrator = Orchestrator::new(Arc::new(verifier), resolver, default_credentials)
        .with_timeout(config.timeout())
        .with_referrers_api(config.use_referrers_api);

    server::serve(Arc::new(orchestrator), config.server_config()).await
}
