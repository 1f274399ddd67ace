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

//! Sigstore bundles and the errors raised while verifying them.
//!
//! Bundles are the protobuf-JSON encoding of
//! [`dev.sigstore.bundle.v1.Bundle`](https://github.com/sigstore/protobuf-specs/blob/main/protos/sigstore_bundle.proto):
//! `bytes` fields are base64 strings and `int64` fields may be strings.

use std::ops::Deref;

use base64::{
    engine::general_purpose::{STANDARD as BASE64_STD_ENGINE, URL_SAFE as BASE64_URL_ENGINE},
    Engine as _,
};
use rustls::pki_types::CertificateDer;
use serde::{Deserialize, Deserializer};
use sigstore::bundle::verify::policy::PolicyError;
use thiserror::Error;
use tracing::debug;
use x509_cert::{der::Decode, Certificate};

use super::transparency::TransparencyError;
use crate::attestation::Envelope;

#[derive(Error, Debug)]
pub enum BundleErrorKind {
    #[error("unknown bundle media type {0}")]
    UnknownMediaType(String),

    #[error("bundle does not contain any certificates")]
    CertificatesMissing,

    #[error("bundle's certificate(s) are malformed: {0}")]
    CertificateMalformed(#[source] x509_cert::der::Error),

    #[error("bundle does not contain a DSSE envelope")]
    DsseMissing,

    #[error("bundle DSSE envelope is invalid: {0}")]
    DsseInvalid(String),

    #[error("bundle needs 1 tlog entry, got {0}")]
    TlogEntry(usize),

    #[error("bundle must contain inclusion promise")]
    InclusionPromiseMissing,

    #[error("bundle must contain inclusion proof")]
    InclusionProofMissing,

    #[error("bundle must contain checkpoint")]
    CheckpointMissing,
}

#[derive(Error, Debug)]
pub enum CertificateErrorKind {
    #[error("certificate was not valid at the time of signing")]
    Expired,

    #[error("certificate verification failed: {0}")]
    VerificationFailed(#[source] webpki::Error),
}

#[derive(Error, Debug)]
pub enum SignatureErrorKind {
    #[error("unsupported signing key: {0}")]
    AlgoUnsupported(String),

    #[error("signature verification failed: {0}")]
    VerificationFailed(String),
}

#[derive(Error, Debug)]
#[error(transparent)]
pub enum VerificationError {
    Bundle(#[from] BundleErrorKind),

    Certificate(#[from] CertificateErrorKind),

    Signature(#[from] SignatureErrorKind),

    Transparency(#[from] TransparencyError),

    Policy(#[from] PolicyError),
}

/// Base64 encoded bytes. Both the standard and the URL safe alphabets are
/// accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Base64Bytes(pub Vec<u8>);

impl<'de> Deserialize<'de> for Base64Bytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64_STD_ENGINE
            .decode(&encoded)
            .or_else(|_| BASE64_URL_ENGINE.decode(&encoded))
            .map(Base64Bytes)
            .map_err(serde::de::Error::custom)
    }
}

impl Deref for Base64Bytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Int64 {
    Number(u64),
    Text(String),
}

fn int64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match Int64::deserialize(deserializer)? {
        Int64::Number(n) => Ok(n),
        Int64::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SigstoreBundle {
    pub media_type: String,
    pub verification_material: VerificationMaterial,
    #[serde(default)]
    pub dsse_envelope: Option<Envelope>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMaterial {
    #[serde(default)]
    pub certificate: Option<X509Certificate>,
    #[serde(default)]
    pub x509_certificate_chain: Option<X509CertificateChain>,
    #[serde(default)]
    pub tlog_entries: Vec<TransparencyLogEntry>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct X509Certificate {
    pub raw_bytes: Base64Bytes,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct X509CertificateChain {
    #[serde(default)]
    pub certificates: Vec<X509Certificate>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TransparencyLogEntry {
    #[serde(default, deserialize_with = "int64")]
    pub log_index: u64,
    pub log_id: LogId,
    pub kind_version: KindVersion,
    #[serde(default, deserialize_with = "int64")]
    pub integrated_time: u64,
    #[serde(default)]
    pub inclusion_promise: Option<InclusionPromise>,
    #[serde(default)]
    pub inclusion_proof: Option<InclusionProof>,
    pub canonicalized_body: Base64Bytes,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LogId {
    pub key_id: Base64Bytes,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct KindVersion {
    pub kind: String,
    pub version: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InclusionPromise {
    pub signed_entry_timestamp: Base64Bytes,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InclusionProof {
    /// Index of the entry in the tree the proof was computed against, which
    /// differs from [`TransparencyLogEntry::log_index`] on sharded logs.
    #[serde(default, deserialize_with = "int64")]
    pub log_index: u64,
    pub root_hash: Base64Bytes,
    #[serde(default, deserialize_with = "int64")]
    pub tree_size: u64,
    #[serde(default)]
    pub hashes: Vec<Base64Bytes>,
    #[serde(default)]
    pub checkpoint: Option<CheckpointEnvelope>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CheckpointEnvelope {
    pub envelope: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleVersion {
    Bundle0_1,
    Bundle0_2,
    Bundle0_3,
}

impl std::str::FromStr for BundleVersion {
    type Err = BundleErrorKind;

    fn from_str(media_type: &str) -> Result<Self, Self::Err> {
        match media_type {
            "application/vnd.dev.sigstore.bundle+json;version=0.1" => Ok(BundleVersion::Bundle0_1),
            "application/vnd.dev.sigstore.bundle+json;version=0.2" => Ok(BundleVersion::Bundle0_2),
            "application/vnd.dev.sigstore.bundle+json;version=0.3"
            | "application/vnd.dev.sigstore.bundle.v0.3+json" => Ok(BundleVersion::Bundle0_3),
            other => Err(BundleErrorKind::UnknownMediaType(other.to_string())),
        }
    }
}

/// A bundle whose structure matches its profile, ready to be verified.
pub struct CheckedBundle {
    pub certificate: Certificate,
    pub certificate_der: Vec<u8>,
    /// Untrusted chain certificates, self-signed ones left out.
    pub intermediates: Vec<CertificateDer<'static>>,
    pub envelope: Envelope,
    pub signature: Vec<u8>,
    pub tlog_entry: TransparencyLogEntry,
}

impl TryFrom<&SigstoreBundle> for CheckedBundle {
    type Error = BundleErrorKind;

    fn try_from(bundle: &SigstoreBundle) -> Result<Self, Self::Error> {
        let version: BundleVersion = bundle.media_type.parse()?;
        let material = &bundle.verification_material;

        let certificates: Vec<&[u8]> = match (&material.certificate, &material.x509_certificate_chain) {
            (Some(certificate), _) => vec![&*certificate.raw_bytes],
            (None, Some(chain)) => chain.certificates.iter().map(|c| &*c.raw_bytes).collect(),
            (None, None) => Vec::new(),
        };
        let [leaf, chain @ ..] = &certificates[..] else {
            return Err(BundleErrorKind::CertificatesMissing);
        };
        let certificate =
            Certificate::from_der(leaf).map_err(BundleErrorKind::CertificateMalformed)?;

        let mut intermediates = Vec::with_capacity(chain.len());
        for der in chain {
            let cert = Certificate::from_der(der).map_err(BundleErrorKind::CertificateMalformed)?;
            if cert.tbs_certificate.subject == cert.tbs_certificate.issuer {
                debug!("ignoring self-signed certificate of the bundle chain");
                continue;
            }
            intermediates.push(CertificateDer::from(der.to_vec()));
        }

        let envelope = bundle
            .dsse_envelope
            .clone()
            .ok_or(BundleErrorKind::DsseMissing)?;
        let signature = match &envelope.signatures[..] {
            [signature] => BASE64_STD_ENGINE
                .decode(&signature.sig)
                .map_err(|e| BundleErrorKind::DsseInvalid(e.to_string()))?,
            signatures => {
                return Err(BundleErrorKind::DsseInvalid(format!(
                    "expected 1 signature, got {}",
                    signatures.len()
                )))
            }
        };

        let tlog_entry = match &material.tlog_entries[..] {
            [entry] => entry.clone(),
            entries => return Err(BundleErrorKind::TlogEntry(entries.len())),
        };
        match version {
            BundleVersion::Bundle0_1 => {
                if tlog_entry.inclusion_promise.is_none() {
                    return Err(BundleErrorKind::InclusionPromiseMissing);
                }
            }
            BundleVersion::Bundle0_2 | BundleVersion::Bundle0_3 => {
                let proof = tlog_entry
                    .inclusion_proof
                    .as_ref()
                    .ok_or(BundleErrorKind::InclusionProofMissing)?;
                if proof.checkpoint.is_none() {
                    return Err(BundleErrorKind::CheckpointMissing);
                }
            }
        }

        Ok(CheckedBundle {
            certificate,
            certificate_der: leaf.to_vec(),
            intermediates,
            envelope,
            signature,
            tlog_entry,
        })
    }
}
