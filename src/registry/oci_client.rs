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

use super::ClientCapabilities;
use crate::errors::{ProviderError, Result};

use async_trait::async_trait;
use oci_client::{
    manifest::{OciDescriptor, OciImageIndex, OciManifest},
    secrets::RegistryAuth,
    Reference, RegistryOperation,
};

/// Internal client for an OCI Registry. This performs actual
/// calls against the remote registry.
///
/// For testing purposes, use instead the client inside of the
/// `mock_client` module.
pub(crate) struct OciClient {
    pub registry_client: oci_client::Client,
}

impl OciClient {
    /// Blob and referrers requests reuse the token obtained here.
    async fn authenticate(&self, image: &Reference, auth: &RegistryAuth) -> Result<()> {
        self.registry_client
            .auth(image, auth, RegistryOperation::Pull)
            .await
            .map(|_| ())
            .map_err(|e| ProviderError::RegistryPullManifestError {
                image: image.whole(),
                error: e.to_string(),
            })
    }
}

#[async_trait]
impl ClientCapabilities for OciClient {
    async fn fetch_manifest_digest(&self, image: &Reference, auth: &RegistryAuth) -> Result<String> {
        self.registry_client
            .fetch_manifest_digest(image, auth)
            .await
            .map_err(|e| ProviderError::RegistryFetchManifestError {
                image: image.whole(),
                error: e.to_string(),
            })
    }

    async fn pull_manifest(
        &self,
        image: &Reference,
        auth: &RegistryAuth,
    ) -> Result<(OciManifest, String)> {
        self.registry_client
            .pull_manifest(image, auth)
            .await
            .map_err(|e| ProviderError::RegistryPullManifestError {
                image: image.whole(),
                error: e.to_string(),
            })
    }

    async fn pull_blob(
        &self,
        image: &Reference,
        auth: &RegistryAuth,
        layer: &OciDescriptor,
    ) -> Result<Vec<u8>> {
        self.authenticate(image, auth).await?;

        let mut data: Vec<u8> = Vec::with_capacity(layer.size.max(0) as usize);
        self.registry_client
            .pull_blob(image, layer, &mut data)
            .await
            .map_err(|e| ProviderError::RegistryPullBlobError {
                image: image.whole(),
                digest: layer.digest.clone(),
                error: e.to_string(),
            })?;
        Ok(data)
    }

    async fn pull_referrers(
        &self,
        image: &Reference,
        auth: &RegistryAuth,
        artifact_type: Option<&str>,
    ) -> Result<OciImageIndex> {
        self.authenticate(image, auth).await?;

        self.registry_client
            .pull_referrers(image, artifact_type)
            .await
            .map_err(|e| ProviderError::RegistryReferrersError {
                image: image.whole(),
                error: e.to_string(),
            })
    }
}
