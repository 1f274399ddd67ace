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

//! CycloneDX JSON documents.

use serde::Deserialize;

use super::UnifiedPackage;
use crate::errors::{ProviderError, Result};

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct CycloneDxDocument {
    #[serde(default, deserialize_with = "super::null_as_empty")]
    pub bom_format: String,
    #[serde(default, deserialize_with = "super::null_as_empty")]
    pub spec_version: String,
    #[serde(default, deserialize_with = "super::null_as_empty")]
    pub serial_number: String,
    #[serde(default)]
    pub components: Option<Vec<Component>>,
}

#[derive(Deserialize, Debug, Default)]
pub struct Component {
    #[serde(rename = "type", default, deserialize_with = "super::null_as_empty")]
    pub component_type: String,
    #[serde(rename = "bom-ref", default, deserialize_with = "super::null_as_empty")]
    pub bom_ref: String,
    #[serde(default, deserialize_with = "super::null_as_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "super::null_as_empty")]
    pub version: String,
    #[serde(default, deserialize_with = "super::null_as_empty")]
    pub purl: String,
    #[serde(default)]
    pub licenses: Option<Vec<LicenseChoice>>,
}

#[derive(Deserialize, Debug, Default)]
pub struct LicenseChoice {
    #[serde(default)]
    pub license: Option<License>,
    #[serde(default)]
    pub expression: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct License {
    #[serde(default, deserialize_with = "super::null_as_empty")]
    pub id: String,
    #[serde(default, deserialize_with = "super::null_as_empty")]
    pub name: String,
}

impl Component {
    /// Only the first license entry is looked at: its SPDX id, else its name.
    pub fn license(&self) -> &str {
        let Some(license) = self
            .licenses
            .as_ref()
            .and_then(|licenses| licenses.first())
            .and_then(|choice| choice.license.as_ref())
        else {
            return "";
        };
        if !license.id.is_empty() {
            &license.id
        } else {
            &license.name
        }
    }
}

/// Top level components of a CycloneDX document, in document order.
pub fn normalize(predicate: &serde_json::Value) -> Result<Vec<UnifiedPackage>> {
    let document = CycloneDxDocument::deserialize(predicate)
        .map_err(|e| ProviderError::CycloneDxParseError(e.to_string()))?;

    Ok(document
        .components
        .unwrap_or_default()
        .into_iter()
        .map(|component| {
            let license = component.license().to_string();
            UnifiedPackage::new(
                component.name,
                component.version,
                license,
                Some(component.purl),
            )
        })
        .collect())
}
