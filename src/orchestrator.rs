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

//! Per key verification pipeline.
//!
//! For every lookup key the [`Orchestrator`] decodes the key, builds the
//! credentials of the workload, asks the [`TrustVerifier`] for verified
//! attestations and turns the first one carrying an SBOM into a
//! [`ResultItem`].
//!
//! Attestations are first looked up with [`DiscoveryOptions::modern`]. Any
//! failure, including an empty result, triggers a second attempt with
//! [`DiscoveryOptions::legacy`], whose error is the one reported.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::attestation;
use crate::credentials::{CredentialResolver, CredentialSource};
use crate::errors::{ProviderError, Result};
use crate::key::LookupKey;
use crate::registry::OciReference;
use crate::sbom::UnifiedSbom;
use crate::verify::{
    DiscoveryOptions, IdentityConstraints, TrustVerifier, VerifiedAttestationSet,
};

/// Per image verification deadline used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const ERROR_PREFIX: &str = "Failed to verify attestation or extract SBOM";

/// Outcome of one lookup key. Exactly one of `value` and `error` is set.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ResultItem {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResultItem {
    pub fn success(key: impl Into<String>, value: String) -> Self {
        ResultItem {
            key: key.into(),
            value: Some(value),
            error: None,
        }
    }

    pub fn failure(key: impl Into<String>, error: String) -> Self {
        ResultItem {
            key: key.into(),
            value: None,
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Composes credential resolution, attestation verification and SBOM
/// extraction.
///
/// All the state is read-only, a single instance is shared by every request.
#[derive(Clone)]
pub struct Orchestrator {
    verifier: Arc<dyn TrustVerifier>,
    resolver: CredentialResolver,
    default_credentials: CredentialSource,
    timeout: Duration,
    use_referrers_api: bool,
}

impl Orchestrator {
    pub fn new(
        verifier: Arc<dyn TrustVerifier>,
        resolver: CredentialResolver,
        default_credentials: CredentialSource,
    ) -> Self {
        Orchestrator {
            verifier,
            resolver,
            default_credentials,
            timeout: DEFAULT_TIMEOUT,
            use_referrers_api: false,
        }
    }

    /// Deadline of each lookup key, credential resolution included.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Query the OCI referrers API during the first discovery attempt.
    pub fn with_referrers_api(mut self, enabled: bool) -> Self {
        self.use_referrers_api = enabled;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Processes all the keys concurrently. Results are in the same order
    /// as `keys`.
    pub async fn process_batch(&self, keys: &[String]) -> Vec<ResultItem> {
        let overrides = IdentityConstraints::default();
        let items = join_all(keys.iter().map(|key| self.process_key(key, &overrides))).await;

        let errors = items.iter().filter(|item| item.is_error()).count();
        for item in items.iter().filter(|item| item.is_error()) {
            warn!(
                key = item.key.as_str(),
                error = item.error.as_deref().unwrap_or_default(),
                "lookup failed"
            );
        }
        info!(
            "Processed {} images ({} errors, {} successful)",
            items.len(),
            errors,
            items.len() - errors
        );
        items
    }

    /// Processes one raw lookup key.
    ///
    /// `overrides` are identity constraints supplied outside of the key; each
    /// of their fields wins over the matching key segment.
    pub async fn process_key(&self, raw: &str, overrides: &IdentityConstraints) -> ResultItem {
        let span = info_span!("lookup", key = raw);
        async {
            let outcome = match tokio::time::timeout(self.timeout, self.verify_and_extract(raw, overrides)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ProviderError::Timeout(self.timeout)),
            };

            match outcome.and_then(|sbom| sbom.to_json().map(|json| (sbom, json))) {
                Ok((sbom, json)) => {
                    info!(
                        packages = sbom.packages.len(),
                        "Successfully extracted SBOM ({} bytes)",
                        json.len()
                    );
                    ResultItem::success(raw, json)
                }
                Err(e) => ResultItem::failure(raw, format!("{ERROR_PREFIX}: {e}")),
            }
        }
        .instrument(span)
        .await
    }

    async fn verify_and_extract(
        &self,
        raw: &str,
        overrides: &IdentityConstraints,
    ) -> Result<UnifiedSbom> {
        let key = LookupKey::decode(raw)?.into_inner_logged("lookup key");
        let image: OciReference = key.image_ref.parse()?;
        let identity = key.identity_constraints(overrides);

        debug!(
            image = %image,
            secrets = key.secret_names.len(),
            identity = identity.identity.as_deref().unwrap_or_default(),
            issuer = identity.issuer.as_deref().unwrap_or_default(),
            "verifying attestations"
        );

        let credentials = self
            .resolver
            .resolve(&key.secret_names, &self.default_credentials)
            .await
            .into_inner_logged("registry credentials");

        let attestations = self
            .verify_with_fallback(&image, &credentials, &identity)
            .await?;
        first_sbom(&attestations)
    }

    async fn verify_with_fallback(
        &self,
        image: &OciReference,
        credentials: &CredentialSource,
        identity: &IdentityConstraints,
    ) -> Result<VerifiedAttestationSet> {
        let modern = DiscoveryOptions::modern(self.use_referrers_api);
        match self.verify_once(image, credentials, identity, modern).await {
            Ok(attestations) => return Ok(attestations),
            Err(e) => debug!(error = %e, "modern discovery failed, trying the legacy layout"),
        }

        self.verify_once(image, credentials, identity, DiscoveryOptions::legacy())
            .await
    }

    async fn verify_once(
        &self,
        image: &OciReference,
        credentials: &CredentialSource,
        identity: &IdentityConstraints,
        discovery: DiscoveryOptions,
    ) -> Result<VerifiedAttestationSet> {
        let attestations = self
            .verifier
            .verify_attestations(image, credentials, identity, discovery)
            .await?;
        if attestations.is_empty() {
            return Err(ProviderError::NoAttestationsFound);
        }
        Ok(attestations)
    }
}

/// SBOM of the first attestation carrying one.
///
/// Later attestations are not inspected, even when they carry a different
/// SBOM of the same image.
fn first_sbom(attestations: &VerifiedAttestationSet) -> Result<UnifiedSbom> {
    for (position, attestation) in attestations.iter().enumerate() {
        match attestation::extract(&attestation.payload) {
            Ok(Some(sbom)) => {
                debug!(
                    source = attestation.source_digest.as_str(),
                    ignored = attestations.len() - position - 1,
                    "using first SBOM found"
                );
                return Ok(sbom);
            }
            Ok(None) => continue,
            Err(e) => {
                debug!(
                    source = attestation.source_digest.as_str(),
                    error = %e,
                    "skipping attestation"
                );
            }
        }
    }
    Err(ProviderError::NoSbomFound)
}
