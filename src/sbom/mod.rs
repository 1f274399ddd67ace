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

//! A single package model for SPDX and CycloneDX documents.
//!
//! Every supported format is a variant of [`SbomFormat`]. Supporting a new
//! format means adding a variant, its predicate types and its normalizer;
//! callers only go through [`SbomFormat::from_predicate_type`] and
//! [`SbomFormat::normalize`].

use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::Result;

pub mod cyclonedx;
pub mod spdx;

/// SBOM formats that can be normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SbomFormat {
    Spdx,
    CycloneDx,
}

/// In-toto predicate types carrying an SBOM, and the format they hold.
const PREDICATE_TYPES: &[(&str, SbomFormat)] = &[
    ("https://spdx.dev/Document", SbomFormat::Spdx),
    ("https://spdx.dev/Document/v2.3", SbomFormat::Spdx),
    ("spdx", SbomFormat::Spdx),
    ("https://cyclonedx.org/bom", SbomFormat::CycloneDx),
    ("https://cyclonedx.org/schema", SbomFormat::CycloneDx),
    ("cyclonedx", SbomFormat::CycloneDx),
];

impl SbomFormat {
    /// Exact match against the known predicate types.
    pub fn from_predicate_type(predicate_type: &str) -> Option<Self> {
        PREDICATE_TYPES
            .iter()
            .find(|(known, _)| *known == predicate_type)
            .map(|(_, format)| *format)
    }

    pub fn predicate_types(self) -> impl Iterator<Item = &'static str> {
        PREDICATE_TYPES
            .iter()
            .filter(move |(_, format)| *format == self)
            .map(|(predicate_type, _)| *predicate_type)
    }

    /// Converts an attestation predicate of this format.
    pub fn normalize(self, predicate: &serde_json::Value) -> Result<UnifiedSbom> {
        let packages = match self {
            SbomFormat::Spdx => spdx::normalize(predicate)?,
            SbomFormat::CycloneDx => cyclonedx::normalize(predicate)?,
        };
        Ok(UnifiedSbom {
            format: self,
            packages,
        })
    }
}

/// A package, whatever the document it comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedPackage {
    pub name: String,
    #[serde(rename = "versionInfo")]
    pub version: String,
    #[serde(rename = "licenseConcluded")]
    pub license: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purl: Option<String>,
}

impl UnifiedPackage {
    /// Empty purls are dropped.
    pub fn new(name: String, version: String, license: String, purl: Option<String>) -> Self {
        UnifiedPackage {
            name,
            version,
            license,
            purl: purl.filter(|p| !p.is_empty()),
        }
    }
}

/// The packages of one SBOM, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedSbom {
    pub format: SbomFormat,
    pub packages: Vec<UnifiedPackage>,
}

impl UnifiedSbom {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// SBOM generators emit `null` for absent text fields as often as they omit
/// them. Both become an empty string.
pub(crate) fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_eq;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("https://spdx.dev/Document", Some(SbomFormat::Spdx))]
    #[case("https://spdx.dev/Document/v2.3", Some(SbomFormat::Spdx))]
    #[case("spdx", Some(SbomFormat::Spdx))]
    #[case("https://cyclonedx.org/bom", Some(SbomFormat::CycloneDx))]
    #[case("https://cyclonedx.org/schema", Some(SbomFormat::CycloneDx))]
    #[case("cyclonedx", Some(SbomFormat::CycloneDx))]
    #[case("https://spdx.dev/Document/v2.2", None)]
    #[case("SPDX", None)]
    #[case("https://slsa.dev/provenance/v1", None)]
    #[case("", None)]
    fn predicate_type_lookup(#[case] predicate_type: &str, #[case] expected: Option<SbomFormat>) {
        assert_eq!(SbomFormat::from_predicate_type(predicate_type), expected);
    }

    #[test]
    fn every_format_has_predicate_types() {
        assert_eq!(SbomFormat::Spdx.predicate_types().count(), 3);
        assert_eq!(SbomFormat::CycloneDx.predicate_types().count(), 3);
    }

    #[test]
    fn serialized_shape() {
        let sbom = UnifiedSbom {
            format: SbomFormat::CycloneDx,
            packages: vec![
                UnifiedPackage::new(
                    "serde".into(),
                    "1.0.200".into(),
                    "MIT".into(),
                    Some("pkg:cargo/serde@1.0.200".into()),
                ),
                UnifiedPackage::new("musl".into(), "1.2.4".into(), "".into(), Some("".into())),
            ],
        };

        let actual: serde_json::Value = serde_json::from_str(&sbom.to_json().unwrap()).unwrap();
        assert_json_eq!(
            actual,
            json!({
                "format": "cyclonedx",
                "packages": [
                    {
                        "name": "serde",
                        "versionInfo": "1.0.200",
                        "licenseConcluded": "MIT",
                        "purl": "pkg:cargo/serde@1.0.200"
                    },
                    {"name": "musl", "versionInfo": "1.2.4", "licenseConcluded": ""}
                ]
            })
        );
    }

    #[test]
    fn normalizing_twice_is_byte_identical() {
        let predicate = json!({
            "bomFormat": "CycloneDX",
            "specVersion": "1.5",
            "components": [
                {"name": "a", "version": "1", "licenses": [{"license": {"id": "MIT"}}]},
                {"name": "b", "version": "2", "purl": "pkg:npm/b@2"}
            ]
        });
        let first = SbomFormat::CycloneDx.normalize(&predicate).unwrap();
        let second = SbomFormat::CycloneDx.normalize(&predicate).unwrap();
        assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
    }
}
