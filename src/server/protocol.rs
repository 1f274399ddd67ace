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

//! Gatekeeper external data wire types.

use serde::{Deserialize, Serialize};

use crate::orchestrator::ResultItem;

pub const API_VERSION: &str = "externaldata.gatekeeper.sh/v1beta1";
pub const RESPONSE_KIND: &str = "ProviderResponse";

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRequest {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub request: Request,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    #[serde(default)]
    pub keys: Vec<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResponse {
    pub api_version: String,
    pub kind: String,
    pub response: Response,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub items: Vec<ResultItem>,
}

impl ProviderResponse {
    pub fn new(items: Vec<ResultItem>) -> Self {
        ProviderResponse {
            api_version: API_VERSION.to_string(),
            kind: RESPONSE_KIND.to_string(),
            response: Response { items },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    #[test]
    fn request_without_keys_is_empty() {
        let request: ProviderRequest = serde_json::from_value(json!({
            "apiVersion": API_VERSION,
            "kind": "ProviderRequest"
        }))
        .unwrap();
        assert!(request.request.keys.is_empty());
    }

    #[test]
    fn items_carry_either_value_or_error() {
        let response = ProviderResponse::new(vec![
            ResultItem::success("img-a", r#"{"format":"spdx","packages":[]}"#.to_string()),
            ResultItem::failure("img-b", "no attestations found".to_string()),
        ]);

        assert_json_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "apiVersion": "externaldata.gatekeeper.sh/v1beta1",
                "kind": "ProviderResponse",
                "response": {
                    "items": [
                        {"key": "img-a", "value": "{\"format\":\"spdx\",\"packages\":[]}"},
                        {"key": "img-b", "error": "no attestations found"}
                    ]
                }
            })
        );
    }
}
