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

pub mod config;
pub use config::*;

pub mod oci_reference;
pub use oci_reference::OciReference;

pub(crate) mod oci_client;
pub(crate) use self::oci_client::*;

use crate::errors::Result;

use async_trait::async_trait;

#[async_trait]
/// Capabilities that are expected to be provided by a registry client
pub(crate) trait ClientCapabilities: Send + Sync {
    async fn fetch_manifest_digest(
        &self,
        image: &::oci_client::Reference,
        auth: &::oci_client::secrets::RegistryAuth,
    ) -> Result<String>;

    async fn pull_manifest(
        &self,
        image: &::oci_client::Reference,
        auth: &::oci_client::secrets::RegistryAuth,
    ) -> Result<(::oci_client::manifest::OciManifest, String)>;

    async fn pull_blob(
        &self,
        image: &::oci_client::Reference,
        auth: &::oci_client::secrets::RegistryAuth,
        layer: &::oci_client::manifest::OciDescriptor,
    ) -> Result<Vec<u8>>;

    async fn pull_referrers(
        &self,
        image: &::oci_client::Reference,
        auth: &::oci_client::secrets::RegistryAuth,
        artifact_type: Option<&str>,
    ) -> Result<::oci_client::manifest::OciImageIndex>;
}
