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

use crate::errors::ProviderError;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Tag suffix cosign uses to store attestations next to an image.
pub(crate) const ATTESTATION_TAG_SUFFIX: &str = "att";

/// `OciReference` represents any way of referencing images within an OCI registry.
#[derive(Debug, Clone, PartialEq)]
pub struct OciReference {
    pub(crate) oci_reference: oci_client::Reference,
}

impl FromStr for OciReference {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<oci_client::Reference>()
            .map_err(|_| ProviderError::OciReferenceNotValidError {
                reference: s.to_string(),
            })
            .map(|oci_reference| OciReference { oci_reference })
    }
}

impl OciReference {
    /// Create a Reference with a registry, repository and tag.
    pub fn with_tag(registry: String, repository: String, tag: String) -> Self {
        OciReference {
            oci_reference: oci_client::Reference::with_tag(registry, repository, tag),
        }
    }

    /// Create a Reference with a registry, repository and digest.
    pub fn with_digest(registry: String, repository: String, digest: String) -> Self {
        OciReference {
            oci_reference: oci_client::Reference::with_digest(registry, repository, digest),
        }
    }

    /// The same repository, pinned to the given digest.
    pub fn pinned(&self, digest: &str) -> Self {
        Self::with_digest(
            self.registry().to_string(),
            self.repository().to_string(),
            digest.to_string(),
        )
    }

    /// Location of the attestations cosign attaches to the image with the
    /// given manifest digest, e.g. `repo:sha256-<hex>.att`.
    pub fn attestation_reference(&self, manifest_digest: &str) -> Self {
        Self::with_tag(
            self.registry().to_string(),
            self.repository().to_string(),
            format!(
                "{}.{}",
                manifest_digest.replace(':', "-"),
                ATTESTATION_TAG_SUFFIX
            ),
        )
    }

    /// Tag holding the referrers index of registries without the referrers
    /// API, e.g. `repo:sha256-<hex>`.
    pub fn referrers_tag_reference(&self, manifest_digest: &str) -> Self {
        Self::with_tag(
            self.registry().to_string(),
            self.repository().to_string(),
            manifest_digest.replace(':', "-"),
        )
    }

    /// Resolve the registry address of a given Reference.
    ///
    /// Some registries, such as docker.io, uses a different address for the actual
    /// registry. This function implements such redirection.
    pub fn resolve_registry(&self) -> &str {
        self.oci_reference.resolve_registry()
    }

    /// registry returns the name of the registry.
    pub fn registry(&self) -> &str {
        self.oci_reference.registry()
    }

    /// repository returns the name of the repository
    pub fn repository(&self) -> &str {
        self.oci_reference.repository()
    }

    /// digest returns the object's digest, if present.
    pub fn digest(&self) -> Option<&str> {
        self.oci_reference.digest()
    }

    /// tag returns the object's tag, if present.
    pub fn tag(&self) -> Option<&str> {
        self.oci_reference.tag()
    }

    /// whole returns the whole reference.
    pub fn whole(&self) -> String {
        self.oci_reference.whole()
    }
}

impl Display for OciReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.oci_reference.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "sha256:f3cfc9d0dbf931d3db4685ec659b7ac68e2a578219da4aae65427886e649b06b";

    #[test]
    fn attestation_reference_uses_tag_suffix() {
        let image: OciReference = "ghcr.io/acme/app:1.0".parse().unwrap();
        let att = image.attestation_reference(DIGEST);

        assert_eq!(att.registry(), "ghcr.io");
        assert_eq!(att.repository(), "acme/app");
        assert_eq!(
            att.tag(),
            Some("sha256-f3cfc9d0dbf931d3db4685ec659b7ac68e2a578219da4aae65427886e649b06b.att")
        );
    }

    #[test]
    fn referrers_tag_has_no_suffix() {
        let image: OciReference = "ghcr.io/acme/app:1.0".parse().unwrap();
        assert_eq!(
            image.referrers_tag_reference(DIGEST).tag(),
            Some("sha256-f3cfc9d0dbf931d3db4685ec659b7ac68e2a578219da4aae65427886e649b06b")
        );
    }

    #[test]
    fn docker_hub_short_names_are_expanded() {
        let image: OciReference = "busybox:latest".parse().unwrap();
        assert_eq!(image.registry(), "docker.io");
        assert_eq!(image.repository(), "library/busybox");
        assert_eq!(image.resolve_registry(), "index.docker.io");
    }

    #[test]
    fn pinned_reference_carries_digest() {
        let image: OciReference = "localhost:5000/test:latest".parse().unwrap();
        let pinned = image.pinned(DIGEST);
        assert_eq!(pinned.digest(), Some(DIGEST));
        assert_eq!(pinned.whole(), format!("localhost:5000/test@{DIGEST}"));
    }

    #[test]
    fn invalid_reference_is_rejected() {
        let err = "Not A Reference!".parse::<OciReference>().unwrap_err();
        assert!(matches!(
            err,
            ProviderError::OciReferenceNotValidError { .. }
        ));
    }
}
