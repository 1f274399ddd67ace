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

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use oci_client::secrets::RegistryAuth;
use tracing::{debug, info, instrument};

use super::bundle::legacy_bundle;
use super::discovery::{Candidate, Discovery};
use super::models::SigstoreBundle;
use super::trust_root::TrustedRoot;
use super::verifier::{BundleVerifier, SigstoreBundleVerifier};
use super::{
    DiscoveryOptions, IdentityConstraints, IdentityPolicy, TrustVerifier, VerifiedAttestation,
    VerifiedAttestationSet,
};
use crate::attestation::Statement;
use crate::credentials::CredentialSource;
use crate::errors::{ProviderError, Result};
use crate::registry::{ClientCapabilities, ClientConfig, OciClient, OciReference};

fn invalid_bundle(e: serde_json::Error) -> ProviderError {
    ProviderError::AttestationVerificationError(format!("invalid Sigstore bundle: {e}"))
}

/// [`TrustVerifier`] for attestations created by `cosign attest`.
///
/// The Sigstore trusted root is loaded once, when the verifier is built, and
/// shared read-only by every verification.
#[derive(Clone)]
pub struct CosignVerifier {
    bundle_verifier: Arc<dyn BundleVerifier>,
    registry_client: Arc<dyn ClientCapabilities>,
}

impl CosignVerifier {
    /// Builds a verifier trusting the Sigstore instance described by
    /// `trusted_root`, or the public good instance (fetched through TUF)
    /// when unset.
    pub async fn production(
        client_config: ClientConfig,
        trusted_root: Option<&Path>,
    ) -> Result<Self> {
        let trusted_root = TrustedRoot::load(trusted_root).await?;
        let bundle_verifier = SigstoreBundleVerifier::new(&trusted_root)?;
        info!(
            certificate_authorities = trusted_root.certificate_authorities.len(),
            transparency_logs = trusted_root.tlogs.len(),
            "Sigstore trusted root loaded"
        );

        let registry_client = OciClient {
            registry_client: oci_client::Client::new(client_config.into()),
        };

        Ok(Self::new(
            Arc::new(bundle_verifier),
            Arc::new(registry_client),
        ))
    }

    pub(crate) fn new(
        bundle_verifier: Arc<dyn BundleVerifier>,
        registry_client: Arc<dyn ClientCapabilities>,
    ) -> Self {
        CosignVerifier {
            bundle_verifier,
            registry_client,
        }
    }

    async fn verify_candidate(
        &self,
        candidate: &Candidate,
        image_digest: &str,
        policy: &IdentityPolicy,
    ) -> Result<VerifiedAttestation> {
        let bundle: SigstoreBundle = match candidate {
            Candidate::Bundle { bundle, .. } => {
                serde_json::from_slice(bundle).map_err(invalid_bundle)?
            }
            Candidate::Legacy {
                envelope,
                annotations,
                ..
            } => serde_json::from_value(legacy_bundle(envelope, annotations)?)
                .map_err(invalid_bundle)?,
        };

        let envelope = bundle.dsse_envelope.as_ref().ok_or_else(|| {
            ProviderError::AttestationVerificationError(
                "bundle does not contain a DSSE envelope".to_string(),
            )
        })?;
        let payload = envelope.decode_payload()?;

        let statement: Statement = serde_json::from_slice(&payload)
            .map_err(|e| ProviderError::StatementParseError(e.to_string()))?;
        if !statement.matches_digest(image_digest) {
            return Err(ProviderError::AttestationVerificationError(format!(
                "attestation subject does not match image digest {image_digest}"
            )));
        }

        self.bundle_verifier.verify_bundle(&bundle, policy).await?;

        Ok(VerifiedAttestation {
            payload: serde_json::to_vec(envelope)?,
            source_digest: candidate.digest().to_string(),
        })
    }
}

#[async_trait]
impl TrustVerifier for CosignVerifier {
    #[instrument(skip(self, image, credentials), fields(image = %image))]
    async fn verify_attestations(
        &self,
        image: &OciReference,
        credentials: &CredentialSource,
        identity: &IdentityConstraints,
        discovery: DiscoveryOptions,
    ) -> Result<VerifiedAttestationSet> {
        let auth: RegistryAuth = (&credentials.resolve(image)).into();
        let registry = Discovery::new(self.registry_client.as_ref(), auth);

        let image_digest = registry.resolve_digest(image).await?;
        let candidates = registry
            .candidates(image, &image_digest, discovery)
            .await?;
        debug!(
            digest = image_digest.as_str(),
            candidates = candidates.len(),
            "attestations discovered"
        );
        if candidates.is_empty() {
            return Err(ProviderError::NoAttestationsFound);
        }

        let policy = IdentityPolicy::from(identity);
        let mut verified = Vec::with_capacity(candidates.len());
        let mut last_error = None;
        for candidate in &candidates {
            match self
                .verify_candidate(candidate, &image_digest, &policy)
                .await
            {
                Ok(attestation) => verified.push(attestation),
                Err(e) => {
                    debug!(source = candidate.digest(), error = %e, "attestation rejected");
                    last_error = Some(e);
                }
            }
        }

        if verified.is_empty() {
            let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
            return Err(ProviderError::AttestationVerificationError(format!(
                "none of the {} attestations could be verified: {reason}",
                candidates.len()
            )));
        }
        Ok(VerifiedAttestationSet::new(verified))
    }
}
