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

//! Offline verification of Sigstore bundles carrying a DSSE envelope.

use async_trait::async_trait;
use sigstore::bundle::verify::policy::VerificationPolicy;
use sigstore::crypto::{CosignVerificationKey, Signature};
use tracing::debug;

use super::certificate_pool::CertificatePool;
use super::keyring::Keyring;
use super::models::{
    BundleErrorKind, CertificateErrorKind, CheckedBundle, SigstoreBundle, SignatureErrorKind,
    VerificationError,
};
use super::transparency::{self, SignedMaterial};
use super::trust_root::TrustedRoot;
use super::IdentityPolicy;
use crate::errors::{ProviderError, Result};

/// Cryptographic verification of a single Sigstore bundle.
#[async_trait]
pub(crate) trait BundleVerifier: Send + Sync {
    async fn verify_bundle(&self, bundle: &SigstoreBundle, policy: &IdentityPolicy) -> Result<()>;
}

/// Verifies bundles against a Sigstore trusted root, using only the
/// transparency log evidence embedded in the bundle.
pub(crate) struct SigstoreBundleVerifier {
    cert_pool: CertificatePool,
    rekor_keyring: Keyring,
}

impl SigstoreBundleVerifier {
    pub fn new(trusted_root: &TrustedRoot) -> Result<Self> {
        Ok(SigstoreBundleVerifier {
            cert_pool: trusted_root.certificate_pool()?,
            rekor_keyring: trusted_root.rekor_keyring()?,
        })
    }

    fn verify(
        &self,
        bundle: &SigstoreBundle,
        policy: &IdentityPolicy,
    ) -> std::result::Result<(), VerificationError> {
        let materials = CheckedBundle::try_from(bundle)?;

        // 1) The signing certificate chains back to a Fulcio root, at the
        //    time it was issued.
        let tbs_certificate = &materials.certificate.tbs_certificate;
        let not_before = tbs_certificate.validity.not_before.to_unix_duration().as_secs();
        let not_after = tbs_certificate.validity.not_after.to_unix_duration().as_secs();
        self.cert_pool
            .verify(&materials.certificate_der, &materials.intermediates, not_before)
            .map_err(CertificateErrorKind::VerificationFailed)?;
        debug!("signing certificate chains back to trusted root");

        // 2) The signing certificate belongs to the expected signer.
        policy.verify(&materials.certificate)?;
        debug!(?policy, "signing certificate conforms to policy");

        // 3) The envelope was signed by the key of the certificate.
        let signing_key = CosignVerificationKey::try_from(&tbs_certificate.subject_public_key_info)
            .map_err(|e| SignatureErrorKind::AlgoUnsupported(e.to_string()))?;
        let pae = materials
            .envelope
            .pae()
            .map_err(|e| BundleErrorKind::DsseInvalid(e.to_string()))?;
        signing_key
            .verify_signature(Signature::Raw(&materials.signature), &pae)
            .map_err(|e| SignatureErrorKind::VerificationFailed(e.to_string()))?;
        debug!("signature corresponds to public key");

        // 4) The log entry records this payload, signature and certificate.
        let entry = &materials.tlog_entry;
        let payload = materials
            .envelope
            .decode_payload()
            .map_err(|e| BundleErrorKind::DsseInvalid(e.to_string()))?;
        transparency::verify_body(
            entry,
            &SignedMaterial {
                payload: &payload,
                signature: &materials.signature,
                certificate_der: &materials.certificate_der,
            },
        )?;

        // 5) The inclusion proof leads to a checkpoint signed by the log.
        transparency::verify_inclusion_proof(entry, &self.rekor_keyring)?;

        // 6) The Signed Entry Timestamp was issued by the log.
        transparency::verify_inclusion_promise(entry, &self.rekor_keyring)?;

        // 7) The entry was logged while the certificate was valid.
        if entry.integrated_time < not_before || entry.integrated_time > not_after {
            return Err(CertificateErrorKind::Expired.into());
        }
        debug!(log_index = entry.log_index, "bundle verified");

        Ok(())
    }
}

#[async_trait]
impl BundleVerifier for SigstoreBundleVerifier {
    async fn verify_bundle(&self, bundle: &SigstoreBundle, policy: &IdentityPolicy) -> Result<()> {
        self.verify(bundle, policy)
            .map_err(|e| ProviderError::AttestationVerificationError(e.to_string()))
    }
}
