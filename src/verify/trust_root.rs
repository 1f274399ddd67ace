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

//! The Sigstore trusted root: Fulcio certificate authorities and Rekor keys.
//!
//! <https://github.com/sigstore/protobuf-specs/blob/main/protos/sigstore_trustroot.proto>

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use rustls::pki_types::CertificateDer;
use serde::Deserialize;
use sigstore::trust::sigstore::SigstoreTrustRoot;
use tracing::{info, warn};

use super::certificate_pool::CertificatePool;
use super::keyring::{Keyring, ValidFor};
use super::models::{Base64Bytes, X509CertificateChain};
use crate::errors::{ProviderError, Result};

const TRUSTED_ROOT_FILE: &str = "trusted_root.json";

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TrustedRoot {
    #[serde(default)]
    pub tlogs: Vec<TransparencyLogInstance>,
    #[serde(default)]
    pub certificate_authorities: Vec<CertificateAuthority>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TransparencyLogInstance {
    #[serde(default)]
    pub base_url: String,
    pub public_key: PublicKey,
    #[serde(default)]
    pub log_id: Option<LogId>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PublicKey {
    #[serde(default)]
    pub raw_bytes: Option<Base64Bytes>,
    #[serde(default)]
    pub valid_for: Option<TimeRange>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LogId {
    pub key_id: Base64Bytes,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CertificateAuthority {
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub cert_chain: X509CertificateChain,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub(crate) struct TimeRange {
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

fn unix_time(timestamp: &str) -> Result<u64> {
    let time = humantime::parse_rfc3339(timestamp)
        .map_err(|e| ProviderError::TrustRootError(format!("invalid time {timestamp}: {e}")))?;
    Ok(time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default())
}

impl TimeRange {
    fn valid_for(&self) -> Result<ValidFor> {
        Ok(ValidFor {
            start: self.start.as_deref().map(unix_time).transpose()?,
            end: self.end.as_deref().map(unix_time).transpose()?,
        })
    }
}

impl TrustedRoot {
    pub fn from_json(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data)
            .map_err(|e| ProviderError::TrustRootError(format!("invalid trusted root: {e}")))
    }

    pub async fn from_file(path: &Path) -> Result<Self> {
        let data = tokio::fs::read(path).await.map_err(|e| {
            ProviderError::TrustRootError(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&data)
    }

    /// Fetches the trusted root of the Sigstore public good instance through
    /// TUF. The verified target is cached inside of `cache_dir`.
    pub async fn production(cache_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(cache_dir).await?;
        SigstoreTrustRoot::new(Some(cache_dir))
            .await
            .map_err(|e| ProviderError::TrustRootError(e.to_string()))?;
        Self::from_file(&cache_dir.join(TRUSTED_ROOT_FILE)).await
    }

    /// `path` when set, the public good instance otherwise.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                info!(path = %path.display(), "loading Sigstore trusted root");
                Self::from_file(path).await
            }
            None => {
                info!("fetching Sigstore trusted root");
                Self::production(&default_cache_dir()).await
            }
        }
    }

    /// Every certificate of every Fulcio chain is a trust anchor.
    pub fn certificate_pool(&self) -> Result<CertificatePool> {
        let certificates = self
            .certificate_authorities
            .iter()
            .flat_map(|ca| ca.cert_chain.certificates.iter())
            .map(|cert| CertificateDer::from(&*cert.raw_bytes));
        let pool = CertificatePool::from_certificates(certificates)
            .map_err(|e| ProviderError::TrustRootError(format!("invalid Fulcio certificate: {e}")))?;
        if pool.is_empty() {
            return Err(ProviderError::TrustRootError(
                "no Fulcio certificate authority".to_string(),
            ));
        }
        Ok(pool)
    }

    /// Keys of the Rekor instances. Keys of an unsupported type are skipped.
    pub fn rekor_keyring(&self) -> Result<Keyring> {
        let mut keyring = Keyring::default();
        for tlog in &self.tlogs {
            let Some(raw_bytes) = &tlog.public_key.raw_bytes else {
                continue;
            };
            let log_id = tlog
                .log_id
                .as_ref()
                .and_then(|id| <[u8; 32]>::try_from(&*id.key_id).ok());
            let valid_for = tlog
                .public_key
                .valid_for
                .as_ref()
                .map(TimeRange::valid_for)
                .transpose()?
                .unwrap_or_default();

            if let Err(e) = keyring.add(raw_bytes, log_id, valid_for) {
                warn!(log = tlog.base_url.as_str(), error = %e, "skipping transparency log key");
            }
        }
        if keyring.is_empty() {
            return Err(ProviderError::TrustRootError(
                "no usable Rekor key".to_string(),
            ));
        }
        Ok(keyring)
    }
}

fn default_cache_dir() -> PathBuf {
    std::env::temp_dir().join("sbom-provider-tuf")
}
