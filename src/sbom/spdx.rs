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

//! SPDX 2.x JSON documents.
//!
//! <https://spdx.github.io/spdx-spec/v2.3/>

use serde::Deserialize;

use super::UnifiedPackage;
use crate::errors::{ProviderError, Result};

const PURL_REFERENCE_TYPE: &str = "purl";

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct SpdxDocument {
    #[serde(default, deserialize_with = "super::null_as_empty")]
    pub spdx_version: String,
    #[serde(rename = "SPDXID", default, deserialize_with = "super::null_as_empty")]
    pub spdx_id: String,
    #[serde(default, deserialize_with = "super::null_as_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "super::null_as_empty")]
    pub document_namespace: String,
    #[serde(default)]
    pub creation_info: Option<CreationInfo>,
    #[serde(default)]
    pub packages: Option<Vec<SpdxPackage>>,
}

#[derive(Deserialize, Debug, Default)]
pub struct CreationInfo {
    #[serde(default, deserialize_with = "super::null_as_empty")]
    pub created: String,
    #[serde(default)]
    pub creators: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct SpdxPackage {
    #[serde(rename = "SPDXID", default, deserialize_with = "super::null_as_empty")]
    pub spdx_id: String,
    #[serde(default, deserialize_with = "super::null_as_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "super::null_as_empty")]
    pub version_info: String,
    #[serde(default, deserialize_with = "super::null_as_empty")]
    pub license_concluded: String,
    #[serde(default, deserialize_with = "super::null_as_empty")]
    pub license_declared: String,
    #[serde(default, deserialize_with = "super::null_as_empty")]
    pub download_location: String,
    #[serde(default)]
    pub external_refs: Option<Vec<ExternalRef>>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExternalRef {
    #[serde(default, deserialize_with = "super::null_as_empty")]
    pub reference_category: String,
    #[serde(default, deserialize_with = "super::null_as_empty")]
    pub reference_type: String,
    #[serde(default, deserialize_with = "super::null_as_empty")]
    pub reference_locator: String,
}

impl SpdxPackage {
    /// `licenseConcluded`, then `licenseDeclared`, then nothing.
    pub fn license(&self) -> &str {
        if !self.license_concluded.is_empty() {
            &self.license_concluded
        } else {
            &self.license_declared
        }
    }

    /// Locator of the first `purl` external reference.
    pub fn purl(&self) -> Option<&str> {
        self.external_refs
            .iter()
            .flatten()
            .find(|r| r.reference_type == PURL_REFERENCE_TYPE)
            .map(|r| r.reference_locator.as_str())
    }
}

/// Packages of an SPDX document, in document order.
pub fn normalize(predicate: &serde_json::Value) -> Result<Vec<UnifiedPackage>> {
    let document = SpdxDocument::deserialize(predicate)
        .map_err(|e| ProviderError::SpdxParseError(e.to_string()))?;

    Ok(document
        .packages
        .unwrap_or_default()
        .into_iter()
        .map(|package| {
            let license = package.license().to_string();
            let purl = package.purl().map(str::to_string);
            UnifiedPackage::new(package.name, package.version_info, license, purl)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("", "BSD-3-Clause", "BSD-3-Clause")]
    #[case("Apache-2.0", "MIT", "Apache-2.0")]
    #[case("Apache-2.0", "", "Apache-2.0")]
    #[case("", "", "")]
    fn license_precedence(#[case] concluded: &str, #[case] declared: &str, #[case] expected: &str) {
        let predicate = json!({
            "spdxVersion": "SPDX-2.3",
            "packages": [{
                "name": "pkg",
                "versionInfo": "1.0",
                "licenseConcluded": concluded,
                "licenseDeclared": declared
            }]
        });
        let packages = normalize(&predicate).unwrap();
        assert_eq!(packages[0].license, expected);
    }

    #[test]
    fn packages_keep_document_order_without_dedup() {
        let predicate = json!({
            "spdxVersion": "SPDX-2.3",
            "SPDXID": "SPDXRef-DOCUMENT",
            "name": "ghcr.io/acme/app",
            "creationInfo": {"created": "2024-05-01T10:00:00Z", "creators": ["Tool: syft-1.4.1"]},
            "packages": [
                {"name": "zlib", "versionInfo": "1.3", "licenseConcluded": "Zlib"},
                {"name": "busybox", "versionInfo": "1.36.1", "licenseDeclared": "GPL-2.0-only"},
                {"name": "zlib", "versionInfo": "1.3", "licenseConcluded": "Zlib"}
            ]
        });
        let names: Vec<_> = normalize(&predicate)
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["zlib", "busybox", "zlib"]);
    }

    #[test]
    fn purl_comes_from_external_refs() {
        let predicate = json!({
            "packages": [{
                "name": "openssl",
                "versionInfo": "3.1.4-r5",
                "licenseConcluded": "Apache-2.0",
                "externalRefs": [
                    {
                        "referenceCategory": "SECURITY",
                        "referenceType": "cpe23Type",
                        "referenceLocator": "cpe:2.3:a:openssl:openssl:3.1.4:*:*:*:*:*:*:*"
                    },
                    {
                        "referenceCategory": "PACKAGE-MANAGER",
                        "referenceType": "purl",
                        "referenceLocator": "pkg:apk/alpine/openssl@3.1.4-r5"
                    }
                ]
            }]
        });
        let packages = normalize(&predicate).unwrap();
        assert_eq!(
            packages[0].purl.as_deref(),
            Some("pkg:apk/alpine/openssl@3.1.4-r5")
        );
    }

    #[test]
    fn document_without_packages_is_empty() {
        assert!(normalize(&json!({"spdxVersion": "SPDX-2.3"})).unwrap().is_empty());
        assert!(normalize(&json!({"packages": null})).unwrap().is_empty());
    }

    #[test]
    fn null_fields_are_empty() {
        let predicate = json!({
            "spdxVersion": "SPDX-2.3",
            "name": null,
            "creationInfo": {"created": null, "creators": null},
            "packages": [
                {
                    "SPDXID": null,
                    "name": "busybox",
                    "versionInfo": null,
                    "licenseConcluded": null,
                    "licenseDeclared": "GPL-2.0-only",
                    "downloadLocation": null,
                    "externalRefs": [{"referenceType": null, "referenceLocator": null}]
                }
            ]
        });
        let packages = normalize(&predicate).unwrap();
        assert_eq!(
            packages,
            vec![UnifiedPackage::new(
                "busybox".into(),
                "".into(),
                "GPL-2.0-only".into(),
                None
            )]
        );
    }

    #[test]
    fn wrong_shape_is_a_parse_error() {
        let err = normalize(&json!({"packages": [{"name": 42}]})).unwrap_err();
        assert!(matches!(err, ProviderError::SpdxParseError(_)));
    }
}
