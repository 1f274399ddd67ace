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

//! Codec for the composite lookup key sent by the policy engine.
//!
//! A key has the shape `imageRef|["secret1","secret2"]|certIdentity|certOidcIssuer`.
//! Only the image reference is mandatory; the remaining segments are positional
//! and may be omitted from the right.

use std::fmt::{Display, Formatter};

use crate::errors::{ProviderError, Recovered, Result};
use crate::verify::IdentityConstraints;

pub const KEY_DELIMITER: char = '|';
const MAX_SEGMENTS: usize = 4;

/// A decoded lookup key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupKey {
    pub image_ref: String,
    pub secret_names: Vec<String>,
    pub cert_identity: Option<String>,
    pub cert_oidc_issuer: Option<String>,
}

impl LookupKey {
    /// Decode a raw key.
    ///
    /// A malformed secret list does not fail the decoding: the key is returned
    /// as `Degraded` with an empty secret list.
    pub fn decode(raw: &str) -> Result<Recovered<LookupKey>> {
        let mut segments = raw.splitn(MAX_SEGMENTS, KEY_DELIMITER);

        let image_ref = segments.next().unwrap_or_default().trim().to_string();
        if image_ref.is_empty() {
            return Err(ProviderError::OciReferenceNotValidError {
                reference: raw.to_string(),
            });
        }

        let mut warning = None;
        let secret_names = match segments.next() {
            Some(segment) if !segment.is_empty() => {
                match serde_json::from_str::<Vec<String>>(segment) {
                    Ok(names) => names,
                    Err(e) => {
                        warning = Some(format!(
                            "failed to parse imagePullSecrets from key: {e}, using default credentials"
                        ));
                        Vec::new()
                    }
                }
            }
            _ => Vec::new(),
        };

        let cert_identity = segments.next().and_then(non_empty);
        let cert_oidc_issuer = segments.next().and_then(non_empty);

        let key = LookupKey {
            image_ref,
            secret_names,
            cert_identity,
            cert_oidc_issuer,
        };

        Ok(match warning {
            None => Recovered::Clean(key),
            Some(warning) => Recovered::degraded(key, warning),
        })
    }

    /// Encode the key back into its wire form, omitting trailing segments
    /// that carry no information.
    pub fn encode(&self) -> String {
        let mut segments = vec![self.image_ref.clone()];

        let identity = self.cert_identity.clone().unwrap_or_default();
        let issuer = self.cert_oidc_issuer.clone().unwrap_or_default();

        if !self.secret_names.is_empty() || !identity.is_empty() || !issuer.is_empty() {
            // serializing a list of strings cannot fail
            segments.push(serde_json::to_string(&self.secret_names).unwrap_or_else(|_| "[]".into()));
        }
        if !identity.is_empty() || !issuer.is_empty() {
            segments.push(identity);
        }
        if !issuer.is_empty() {
            segments.push(issuer);
        }

        segments.join(&KEY_DELIMITER.to_string())
    }

    /// Identity constraints for this key.
    ///
    /// Constraints supplied through the separate parameter channel win over
    /// the ones encoded in the key, field by field.
    pub fn identity_constraints(&self, overrides: &IdentityConstraints) -> IdentityConstraints {
        IdentityConstraints {
            identity: overrides
                .identity
                .clone()
                .or_else(|| self.cert_identity.clone()),
            issuer: overrides
                .issuer
                .clone()
                .or_else(|| self.cert_oidc_issuer.clone()),
        }
    }
}

impl Display for LookupKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn decode_image_only() {
        let key = LookupKey::decode("ghcr.io/acme/app:1.0")
            .expect("decode failed")
            .into_inner();
        assert_eq!(key.image_ref, "ghcr.io/acme/app:1.0");
        assert!(key.secret_names.is_empty());
        assert!(key.cert_identity.is_none());
        assert!(key.cert_oidc_issuer.is_none());
    }

    #[test]
    fn decode_all_segments() {
        let key = LookupKey::decode(
            r#"ghcr.io/acme/app:1.0|["pull-a","pull-b"]|dev@acme.io|https://accounts.google.com"#,
        )
        .expect("decode failed");
        assert!(!key.is_degraded());

        let key = key.into_inner();
        assert_eq!(key.secret_names, vec!["pull-a", "pull-b"]);
        assert_eq!(key.cert_identity.as_deref(), Some("dev@acme.io"));
        assert_eq!(
            key.cert_oidc_issuer.as_deref(),
            Some("https://accounts.google.com")
        );
    }

    #[test]
    fn malformed_secret_list_is_degraded_not_fatal() {
        let key = LookupKey::decode("img|[not json|id|issuer").expect("decode failed");
        assert!(key.is_degraded());

        let key = key.into_inner();
        assert_eq!(key.image_ref, "img");
        assert!(key.secret_names.is_empty());
        assert_eq!(key.cert_identity.as_deref(), Some("id"));
        assert_eq!(key.cert_oidc_issuer.as_deref(), Some("issuer"));
    }

    #[test]
    fn issuer_segment_keeps_extra_delimiters() {
        let key = LookupKey::decode("img|[]|id|issuer|with|pipes")
            .expect("decode failed")
            .into_inner();
        assert_eq!(key.cert_oidc_issuer.as_deref(), Some("issuer|with|pipes"));
    }

    #[rstest]
    #[case("")]
    #[case("|[]|id|issuer")]
    #[case("   ")]
    fn missing_image_reference_is_an_error(#[case] raw: &str) {
        assert!(LookupKey::decode(raw).is_err());
    }

    #[rstest]
    #[case("img")]
    #[case(r#"img|["a"]"#)]
    #[case("img|[]|id")]
    #[case("img|[]|id|issuer")]
    #[case(r#"img|["a","b"]||issuer"#)]
    fn encode_restores_canonical_keys(#[case] raw: &str) {
        let key = LookupKey::decode(raw).expect("decode failed").into_inner();
        assert_eq!(key.encode(), raw);
    }

    #[test]
    fn parameter_channel_takes_precedence() {
        let key = LookupKey::decode("img|[]|key-id|key-issuer")
            .expect("decode failed")
            .into_inner();

        let overrides = IdentityConstraints::new("param-id", "");
        let constraints = key.identity_constraints(&overrides);
        assert_eq!(constraints.identity.as_deref(), Some("param-id"));
        assert_eq!(constraints.issuer.as_deref(), Some("key-issuer"));

        let constraints = key.identity_constraints(&IdentityConstraints::default());
        assert_eq!(constraints.identity.as_deref(), Some("key-id"));
    }
}
