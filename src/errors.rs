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

//! The errors that can be raised by sbom-provider

use std::time::Duration;

use thiserror::Error;
use tracing::warn;

pub type Result<T> = std::result::Result<T, ProviderError>;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("failed to parse image reference: {reference}")]
    OciReferenceNotValidError { reference: String },

    #[error("Cannot fetch manifest of {image}: {error}")]
    RegistryFetchManifestError { image: String, error: String },

    #[error("Cannot pull manifest of {image}: {error}")]
    RegistryPullManifestError { image: String, error: String },

    #[error("Cannot pull blob {digest} of {image}: {error}")]
    RegistryPullBlobError {
        image: String,
        digest: String,
        error: String,
    },

    #[error("Cannot list referrers of {image}: {error}")]
    RegistryReferrersError { image: String, error: String },

    #[error("no attestations found")]
    NoAttestationsFound,

    #[error("no SBOM found in attestations")]
    NoSbomFound,

    #[error("failed to fetch/verify attestations: {0}")]
    AttestationVerificationError(String),

    #[error("Sigstore trust root unavailable: {0}")]
    TrustRootError(String),

    #[error("failed to decode DSSE payload: {0}")]
    EnvelopeDecodeError(#[from] base64::DecodeError),

    #[error("failed to parse attestation statement: {0}")]
    StatementParseError(String),

    #[error("failed to parse SPDX SBOM: {0}")]
    SpdxParseError(String),

    #[error("failed to parse CycloneDX SBOM: {0}")]
    CycloneDxParseError(String),

    #[error("failed to parse registry credentials: {0}")]
    DockerConfigError(String),

    #[error("failed to connect to the cluster: {0}")]
    ClusterConnectionError(String),

    #[error("Cannot get {kind} {namespace}/{name}: {error}")]
    ClusterObjectError {
        kind: &'static str,
        namespace: String,
        name: String,
        error: String,
    },

    #[error("verification timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::error::Error),

    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error("{0}")]
    UnexpectedError(String),
}

/// The outcome of an operation that can recover from failures by falling
/// back to a default value.
///
/// A `Degraded` value is still usable; the warning explains what was lost.
#[derive(Debug)]
pub enum Recovered<T> {
    Clean(T),
    Degraded { value: T, warning: String },
}

impl<T> Recovered<T> {
    pub fn degraded(value: T, warning: impl Into<String>) -> Self {
        Recovered::Degraded {
            value,
            warning: warning.into(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Recovered::Degraded { .. })
    }

    /// Unwraps the value, emitting the warning (if any) exactly once.
    pub fn into_inner_logged(self, context: &str) -> T {
        match self {
            Recovered::Clean(value) => value,
            Recovered::Degraded { value, warning } => {
                warn!(context, warning = %warning, "continuing with fallback");
                value
            }
        }
    }

    /// Unwraps the value without logging.
    pub fn into_inner(self) -> T {
        match self {
            Recovered::Clean(value) | Recovered::Degraded { value, .. } => value,
        }
    }
}
