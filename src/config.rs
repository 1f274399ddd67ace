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

//! Process configuration, read once at startup from flags and environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use crate::registry::ClientConfig;
use crate::server::{ServerConfig, TlsFiles};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Config {
    /// Server port
    #[clap(long, env = "PORT", default_value_t = 8090)]
    pub port: u16,

    /// Verification timeout of each image, e.g. `30s` or `1m`. Invalid
    /// values fall back to 30s
    #[clap(long = "timeout", env = "TIMEOUT", default_value = "30s")]
    pub raw_timeout: String,

    /// Sigstore trusted root (JSON) to verify against instead of the public
    /// good instance
    #[clap(long, env = "TRUSTED_ROOT")]
    pub trusted_root: Option<PathBuf>,

    /// Path to TLS certificate
    #[clap(long, env = "TLS_CERT")]
    pub tls_cert: Option<PathBuf>,

    /// Path to TLS private key
    #[clap(long, env = "TLS_KEY")]
    pub tls_key: Option<PathBuf>,

    /// Look for attestations through the OCI 1.1 referrers API
    #[clap(long, env = "USE_REFERRERS_API")]
    pub use_referrers_api: bool,

    /// Namespace holding the image pull secrets named by the lookup keys
    #[clap(long, env = "POD_NAMESPACE", default_value = "default")]
    pub pod_namespace: String,

    /// Registry reached over plain HTTP, can be repeated
    #[clap(long = "insecure-registry")]
    pub insecure_registries: Vec<String>,

    /// Enable verbose mode
    #[clap(short, long)]
    pub verbose: bool,
}

impl Config {
    /// The verification timeout, [`DEFAULT_TIMEOUT`] when the configured
    /// value cannot be parsed.
    pub fn timeout(&self) -> Duration {
        match humantime::parse_duration(self.raw_timeout.trim()) {
            Ok(timeout) => timeout,
            Err(e) => {
                warn!(
                    value = self.raw_timeout.as_str(),
                    error = %e,
                    "invalid timeout, using {}",
                    humantime::format_duration(DEFAULT_TIMEOUT)
                );
                DEFAULT_TIMEOUT
            }
        }
    }

    /// `None` when unset or empty.
    pub fn trusted_root(&self) -> Option<&Path> {
        self.trusted_root
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }

    /// TLS is enabled only when both the certificate and the key are set.
    pub fn tls(&self) -> Option<TlsFiles> {
        match (&self.tls_cert, &self.tls_key) {
            (Some(cert), Some(key)) if !cert.as_os_str().is_empty() && !key.as_os_str().is_empty() => {
                Some(TlsFiles {
                    cert: cert.clone(),
                    key: key.clone(),
                })
            }
            _ => None,
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            port: self.port,
            tls: self.tls(),
        }
    }

    pub fn registry_config(&self) -> ClientConfig {
        ClientConfig::with_insecure_registries(&self.insecure_registries)
    }

    pub fn log_summary(&self) {
        info!("Configuration:");
        info!("  Port: {}", self.port);
        info!("  TLS Enabled: {}", self.tls().is_some());
        info!("  Timeout: {}", humantime::format_duration(self.timeout()));
        info!("  Referrers API: {}", self.use_referrers_api);
        info!("  Namespace: {}", self.pod_namespace);
        match self.trusted_root() {
            Some(path) => info!("  Trusted Root: {}", path.display()),
            None => info!("  Trusted Root: Sigstore public good instance"),
        }
    }
}
