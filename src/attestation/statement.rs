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

//! In-toto statements.
//!
//! Both the v0.1 statement type used by cosign and the v1 type are accepted.
//! See: <https://github.com/in-toto/attestation/blob/main/spec/v1/statement.md>

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// An in-toto statement. Missing fields deserialize to their empty value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Statement {
    #[serde(rename = "_type", default)]
    pub statement_type: String,

    #[serde(rename = "predicateType", default)]
    pub predicate_type: String,

    #[serde(default)]
    pub subject: Vec<Subject>,

    #[serde(default)]
    pub predicate: serde_json::Value,
}

/// An artifact the statement is about.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subject {
    #[serde(default)]
    pub name: String,

    /// Algorithm -> hex encoded digest
    #[serde(default)]
    pub digest: BTreeMap<String, String>,
}

impl Statement {
    /// Whether one of the subjects has the given `<algorithm>:<hex>` digest.
    pub fn matches_digest(&self, digest: &str) -> bool {
        let Some((algorithm, value)) = digest.split_once(':') else {
            return false;
        };
        self.subject.iter().any(|subject| {
            subject
                .digest
                .get(algorithm)
                .is_some_and(|d| d.eq_ignore_ascii_case(value))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DIGEST: &str = "sha256:f3cfc9d0dbf931d3db4685ec659b7ac68e2a578219da4aae65427886e649b06b";

    #[test]
    fn missing_fields_default_to_empty() {
        let statement: Statement = serde_json::from_value(json!({})).unwrap();
        assert_eq!(statement, Statement::default());
    }

    #[test]
    fn subject_digest_matching() {
        let statement: Statement = serde_json::from_value(json!({
            "_type": "https://in-toto.io/Statement/v0.1",
            "predicateType": "https://spdx.dev/Document",
            "subject": [
                {"name": "ghcr.io/acme/other", "digest": {"sha256": "00"}},
                {
                    "name": "ghcr.io/acme/app",
                    "digest": {"sha256": "F3CFC9D0DBF931D3DB4685EC659B7AC68E2A578219DA4AAE65427886E649B06B"}
                }
            ],
            "predicate": {}
        }))
        .unwrap();

        assert!(statement.matches_digest(DIGEST));
        assert!(!statement.matches_digest("sha512:f3cfc9d0"));
        assert!(!statement.matches_digest("sha256:00ff"));
        assert!(!statement.matches_digest("not-a-digest"));
    }
}
