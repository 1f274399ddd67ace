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

//! Lookup of the attestation objects cosign attaches to an image.
//!
//! Two layouts are supported:
//!
//! * Sigstore bundles stored as OCI 1.1 referrers of the image, found with the
//!   referrers API or, for registries lacking it, the referrers tag schema.
//! * The `sha256-<hex>.att` image, where every layer is a DSSE envelope and
//!   the signing material is stored inside of the layer annotations.

use std::collections::BTreeMap;

use oci_client::manifest::{OciDescriptor, OciImageIndex, OciManifest};
use oci_client::secrets::RegistryAuth;
use tracing::{debug, warn};

use super::DiscoveryOptions;
use crate::errors::{ProviderError, Result};
use crate::registry::{ClientCapabilities, OciReference};

pub(crate) const SIGSTORE_BUNDLE_MEDIA_TYPE: &str = "application/vnd.dev.sigstore.bundle.v0.3+json";
pub(crate) const DSSE_ENVELOPE_MEDIA_TYPE: &str = "application/vnd.dsse.envelope.v1+json";

pub(crate) const CERTIFICATE_ANNOTATION: &str = "dev.sigstore.cosign/certificate";
pub(crate) const CHAIN_ANNOTATION: &str = "dev.sigstore.cosign/chain";
pub(crate) const BUNDLE_ANNOTATION: &str = "dev.sigstore.cosign/bundle";

/// An attestation found in the registry, not verified yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Candidate {
    /// A Sigstore bundle.
    Bundle { digest: String, bundle: Vec<u8> },
    /// A DSSE envelope with its signing material stored as annotations.
    Legacy {
        digest: String,
        envelope: Vec<u8>,
        annotations: BTreeMap<String, String>,
    },
}

impl Candidate {
    pub(crate) fn digest(&self) -> &str {
        match self {
            Candidate::Bundle { digest, .. } | Candidate::Legacy { digest, .. } => digest,
        }
    }
}

pub(crate) struct Discovery<'a> {
    client: &'a dyn ClientCapabilities,
    auth: RegistryAuth,
}

impl<'a> Discovery<'a> {
    pub(crate) fn new(client: &'a dyn ClientCapabilities, auth: RegistryAuth) -> Self {
        Discovery { client, auth }
    }

    /// Digest of the manifest `image` points to.
    pub(crate) async fn resolve_digest(&self, image: &OciReference) -> Result<String> {
        match image.digest() {
            Some(digest) => Ok(digest.to_string()),
            None => {
                self.client
                    .fetch_manifest_digest(&image.oci_reference, &self.auth)
                    .await
            }
        }
    }

    /// Attestation candidates of the image with the given manifest digest.
    pub(crate) async fn candidates(
        &self,
        image: &OciReference,
        manifest_digest: &str,
        options: DiscoveryOptions,
    ) -> Result<Vec<Candidate>> {
        if options.new_bundle_format {
            self.referrer_bundles(image, manifest_digest, options.use_referrers)
                .await
        } else {
            self.legacy_envelopes(image, manifest_digest).await
        }
    }

    async fn referrers_index(
        &self,
        image: &OciReference,
        manifest_digest: &str,
        use_referrers_api: bool,
    ) -> Result<OciImageIndex> {
        if use_referrers_api {
            let subject = image.pinned(manifest_digest);
            return self
                .client
                .pull_referrers(
                    &subject.oci_reference,
                    &self.auth,
                    Some(SIGSTORE_BUNDLE_MEDIA_TYPE),
                )
                .await;
        }

        let tag = image.referrers_tag_reference(manifest_digest);
        match self.client.pull_manifest(&tag.oci_reference, &self.auth).await? {
            (OciManifest::ImageIndex(index), _) => Ok(index),
            (OciManifest::Image(_), _) => Err(ProviderError::RegistryReferrersError {
                image: tag.whole(),
                error: "expected an image index".to_string(),
            }),
        }
    }

    async fn referrer_bundles(
        &self,
        image: &OciReference,
        manifest_digest: &str,
        use_referrers_api: bool,
    ) -> Result<Vec<Candidate>> {
        let index = self
            .referrers_index(image, manifest_digest, use_referrers_api)
            .await?;
        debug!(referrers = index.manifests.len(), "found referrers");

        let mut candidates = Vec::new();
        for entry in &index.manifests {
            let referrer = image.pinned(&entry.digest);
            let manifest = match self
                .client
                .pull_manifest(&referrer.oci_reference, &self.auth)
                .await
            {
                Ok((OciManifest::Image(manifest), _)) => manifest,
                Ok((OciManifest::ImageIndex(_), _)) => continue,
                Err(e) => {
                    warn!(referrer = entry.digest.as_str(), error = %e, "skipping referrer");
                    continue;
                }
            };

            for layer in bundle_layers(&manifest.layers) {
                let bundle = self
                    .client
                    .pull_blob(&referrer.oci_reference, &self.auth, layer)
                    .await?;
                candidates.push(Candidate::Bundle {
                    digest: entry.digest.clone(),
                    bundle,
                });
            }
        }
        Ok(candidates)
    }

    async fn legacy_envelopes(
        &self,
        image: &OciReference,
        manifest_digest: &str,
    ) -> Result<Vec<Candidate>> {
        let attestations = image.attestation_reference(manifest_digest);
        debug!(reference = %attestations, "looking for attestation image");

        let manifest = match self
            .client
            .pull_manifest(&attestations.oci_reference, &self.auth)
            .await?
        {
            (OciManifest::Image(manifest), _) => manifest,
            (OciManifest::ImageIndex(_), _) => {
                return Err(ProviderError::RegistryPullManifestError {
                    image: attestations.whole(),
                    error: "expected an image manifest".to_string(),
                })
            }
        };

        let mut candidates = Vec::new();
        for layer in manifest
            .layers
            .iter()
            .filter(|l| l.media_type == DSSE_ENVELOPE_MEDIA_TYPE)
        {
            let envelope = self
                .client
                .pull_blob(&attestations.oci_reference, &self.auth, layer)
                .await?;
            let annotations: BTreeMap<String, String> = layer
                .annotations
                .iter()
                .flatten()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            candidates.push(Candidate::Legacy {
                digest: layer.digest.clone(),
                envelope,
                annotations,
            });
        }
        Ok(candidates)
    }
}

fn bundle_layers(layers: &[OciDescriptor]) -> impl Iterator<Item = &OciDescriptor> {
    layers
        .iter()
        .filter(|l| l.media_type == SIGSTORE_BUNDLE_MEDIA_TYPE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_client::test::MockOciClient;
    use serde_json::json;

    const IMAGE_DIGEST: &str =
        "sha256:f3cfc9d0dbf931d3db4685ec659b7ac68e2a578219da4aae65427886e649b06b";
    const REFERRER_DIGEST: &str =
        "sha256:1111111111111111111111111111111111111111111111111111111111111111";
    const BUNDLE_DIGEST: &str =
        "sha256:2222222222222222222222222222222222222222222222222222222222222222";
    const ENVELOPE_DIGEST: &str =
        "sha256:3333333333333333333333333333333333333333333333333333333333333333";

    fn image() -> OciReference {
        "ghcr.io/acme/app:1.0".parse().unwrap()
    }

    fn referrers_index() -> OciImageIndex {
        serde_json::from_value(json!({
            "schemaVersion": 2,
            "mediaType": "application/vnd.oci.image.index.v1+json",
            "manifests": [{
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "digest": REFERRER_DIGEST,
                "size": 700,
                "artifactType": SIGSTORE_BUNDLE_MEDIA_TYPE
            }]
        }))
        .unwrap()
    }

    fn image_manifest(layers: serde_json::Value) -> OciManifest {
        OciManifest::Image(
            serde_json::from_value(json!({
                "schemaVersion": 2,
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "config": {
                    "mediaType": "application/vnd.oci.empty.v1+json",
                    "digest": "sha256:44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a",
                    "size": 2
                },
                "layers": layers
            }))
            .unwrap(),
        )
    }

    fn referrer_client() -> MockOciClient {
        let mut client = MockOciClient::default();
        client.add_manifest(
            &image().pinned(REFERRER_DIGEST),
            image_manifest(json!([{
                "mediaType": SIGSTORE_BUNDLE_MEDIA_TYPE,
                "digest": BUNDLE_DIGEST,
                "size": 4
            }])),
        );
        client.add_blob(BUNDLE_DIGEST, b"{}\n\n".to_vec());
        client
    }

    #[tokio::test]
    async fn tag_digest_is_resolved() {
        let client = MockOciClient {
            fetch_manifest_digest_response: Some(Ok(IMAGE_DIGEST.to_string())),
            ..Default::default()
        };
        let discovery = Discovery::new(&client, RegistryAuth::Anonymous);
        assert_eq!(discovery.resolve_digest(&image()).await.unwrap(), IMAGE_DIGEST);

        let pinned = image().pinned(IMAGE_DIGEST);
        let client = MockOciClient::default();
        let discovery = Discovery::new(&client, RegistryAuth::Anonymous);
        assert_eq!(discovery.resolve_digest(&pinned).await.unwrap(), IMAGE_DIGEST);
    }

    #[tokio::test]
    async fn bundles_found_through_referrers_api() {
        let mut client = referrer_client();
        client.referrers_response = Some(Ok(referrers_index()));

        let discovery = Discovery::new(&client, RegistryAuth::Anonymous);
        let candidates = discovery
            .candidates(&image(), IMAGE_DIGEST, DiscoveryOptions::modern(true))
            .await
            .unwrap();

        assert_eq!(
            candidates,
            vec![Candidate::Bundle {
                digest: REFERRER_DIGEST.to_string(),
                bundle: b"{}\n\n".to_vec()
            }]
        );
    }

    #[tokio::test]
    async fn bundles_found_through_referrers_tag() {
        let mut client = referrer_client();
        client.add_manifest(
            &image().referrers_tag_reference(IMAGE_DIGEST),
            OciManifest::ImageIndex(referrers_index()),
        );

        let discovery = Discovery::new(&client, RegistryAuth::Anonymous);
        let candidates = discovery
            .candidates(&image(), IMAGE_DIGEST, DiscoveryOptions::modern(false))
            .await
            .unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].digest(), REFERRER_DIGEST);
    }

    #[tokio::test]
    async fn referrers_api_failure_is_reported() {
        let mut client = referrer_client();
        client.referrers_response = Some(Err("referrers API not supported".to_string()));

        let discovery = Discovery::new(&client, RegistryAuth::Anonymous);
        let err = discovery
            .candidates(&image(), IMAGE_DIGEST, DiscoveryOptions::modern(true))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::RegistryReferrersError { .. }));
    }

    #[tokio::test]
    async fn legacy_layers_carry_their_annotations() {
        let mut client = MockOciClient::default();
        client.add_manifest(
            &image().attestation_reference(IMAGE_DIGEST),
            image_manifest(json!([
                {
                    "mediaType": DSSE_ENVELOPE_MEDIA_TYPE,
                    "digest": ENVELOPE_DIGEST,
                    "size": 2,
                    "annotations": {
                        CERTIFICATE_ANNOTATION: "-----BEGIN CERTIFICATE-----",
                        BUNDLE_ANNOTATION: "{}",
                        "predicateType": "https://spdx.dev/Document"
                    }
                },
                {
                    "mediaType": "application/vnd.oci.image.layer.v1.tar",
                    "digest": BUNDLE_DIGEST,
                    "size": 2
                }
            ])),
        );
        client.add_blob(ENVELOPE_DIGEST, b"{}".to_vec());

        let discovery = Discovery::new(&client, RegistryAuth::Anonymous);
        let candidates = discovery
            .candidates(&image(), IMAGE_DIGEST, DiscoveryOptions::legacy())
            .await
            .unwrap();

        assert_eq!(candidates.len(), 1);
        match &candidates[0] {
            Candidate::Legacy {
                digest,
                envelope,
                annotations,
            } => {
                assert_eq!(digest, ENVELOPE_DIGEST);
                assert_eq!(envelope, b"{}");
                assert_eq!(annotations.len(), 3);
                assert!(annotations.contains_key(CERTIFICATE_ANNOTATION));
            }
            other => panic!("unexpected candidate {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_attestation_image_is_an_error() {
        let client = MockOciClient::default();
        let discovery = Discovery::new(&client, RegistryAuth::Anonymous);
        let err = discovery
            .candidates(&image(), IMAGE_DIGEST, DiscoveryOptions::legacy())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::RegistryPullManifestError { .. }));
    }
}
