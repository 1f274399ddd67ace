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

//! Discovery and verification of the attestations attached to an image.
//!
//! The rest of the crate only talks to the [`TrustVerifier`] trait. The
//! production implementation, [`CosignVerifier`], finds attestations the way
//! cosign stores them and verifies them offline against a Sigstore trusted
//! root: Fulcio certificate chain, signer identity, DSSE signature, then the
//! Rekor entry with its inclusion proof and Signed Entry Timestamp.

use async_trait::async_trait;

use crate::credentials::CredentialSource;
use crate::errors::Result;
use crate::registry::OciReference;

pub(crate) mod bundle;
pub(crate) mod certificate_pool;
pub mod cosign;
pub(crate) mod discovery;
pub(crate) mod keyring;
pub(crate) mod merkle;
pub(crate) mod models;
pub(crate) mod note;
pub mod policy;
pub(crate) mod transparency;
pub(crate) mod trust_root;
pub(crate) mod verifier;

pub use cosign::CosignVerifier;
pub use policy::IdentityPolicy;

/// Expected signer of an attestation. `None` means unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityConstraints {
    /// Subject of the signing certificate, e.g. an email or a workflow URI.
    pub identity: Option<String>,
    /// OIDC issuer that authenticated the signer.
    pub issuer: Option<String>,
}

impl IdentityConstraints {
    /// Empty strings are treated as "no constraint".
    pub fn new(identity: &str, issuer: &str) -> Self {
        IdentityConstraints {
            identity: (!identity.is_empty()).then(|| identity.to_string()),
            issuer: (!issuer.is_empty()).then(|| issuer.to_string()),
        }
    }

    pub fn is_unconstrained(&self) -> bool {
        self.identity.is_none() && self.issuer.is_none()
    }
}

/// How attestations are looked up inside of the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryOptions {
    /// Query the OCI 1.1 referrers API. When disabled, the referrers tag
    /// schema (`sha256-<hex>` tag holding an index) is used instead.
    pub use_referrers: bool,
    /// Look for Sigstore bundles attached as referrers. When disabled, only
    /// the `sha256-<hex>.att` tag with DSSE layers is inspected.
    pub new_bundle_format: bool,
}

impl DiscoveryOptions {
    /// First discovery attempt.
    pub fn modern(use_referrers_api: bool) -> Self {
        DiscoveryOptions {
            use_referrers: use_referrers_api,
            new_bundle_format: true,
        }
    }

    /// Fallback attempt: tag based discovery, legacy DSSE layers only.
    pub fn legacy() -> Self {
        DiscoveryOptions {
            use_referrers: false,
            new_bundle_format: false,
        }
    }

    pub fn is_legacy(&self) -> bool {
        !self.new_bundle_format
    }
}

/// A single attestation whose signature, signer and subject were verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedAttestation {
    /// The DSSE envelope, as JSON.
    pub payload: Vec<u8>,
    /// Digest of the registry object the attestation was read from.
    pub source_digest: String,
}

/// Attestations of one image, in the order the registry returned them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifiedAttestationSet {
    attestations: Vec<VerifiedAttestation>,
}

impl VerifiedAttestationSet {
    /// Only [`TrustVerifier`] implementations are expected to build sets.
    pub fn new(attestations: Vec<VerifiedAttestation>) -> Self {
        VerifiedAttestationSet { attestations }
    }

    pub fn len(&self) -> usize {
        self.attestations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attestations.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, VerifiedAttestation> {
        self.attestations.iter()
    }
}

impl<'a> IntoIterator for &'a VerifiedAttestationSet {
    type Item = &'a VerifiedAttestation;
    type IntoIter = std::slice::Iter<'a, VerifiedAttestation>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Proves that attestations exist for an image and are validly signed by a
/// keyless identity recorded in the transparency log.
#[async_trait]
pub trait TrustVerifier: Send + Sync {
    /// Returns the verified attestations of `image`.
    ///
    /// Implementations must only return attestations whose subject matches
    /// the digest `image` resolves to.
    async fn verify_attestations(
        &self,
        image: &OciReference,
        credentials: &CredentialSource,
        identity: &IdentityConstraints,
        discovery: DiscoveryOptions,
    ) -> Result<VerifiedAttestationSet>;
}
