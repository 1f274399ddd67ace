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

//! Conversion of legacy cosign attestation layers into Sigstore bundles.
//!
//! A legacy layer stores the DSSE envelope as blob; the Fulcio certificate,
//! its chain and the Rekor entry (SET included) are stored as annotations.
//! Repackaging them as a v0.1 bundle lets both layouts go through the same
//! bundle verifier.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD as BASE64_STD_ENGINE, Engine as _};
use serde::Deserialize;
use serde_json::json;

use super::discovery::{BUNDLE_ANNOTATION, CERTIFICATE_ANNOTATION, CHAIN_ANNOTATION};
use crate::errors::{ProviderError, Result};

pub(crate) const BUNDLE_V01_MEDIA_TYPE: &str = "application/vnd.dev.sigstore.bundle+json;version=0.1";

/// Content of the `dev.sigstore.cosign/bundle` annotation.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct RekorBundle {
    signed_entry_timestamp: String,
    payload: RekorBundlePayload,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RekorBundlePayload {
    /// Base64 encoded canonicalized entry
    body: String,
    integrated_time: i64,
    log_index: i64,
    /// Hex encoded
    #[serde(rename = "logID")]
    log_id: String,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct EntryKind {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    api_version: String,
}

fn invalid(reason: impl std::fmt::Display) -> ProviderError {
    ProviderError::AttestationVerificationError(format!("invalid attestation layer: {reason}"))
}

/// DER certificates of the annotations, leaf first.
fn certificate_chain(annotations: &BTreeMap<String, String>) -> Result<Vec<String>> {
    let leaf = annotations
        .get(CERTIFICATE_ANNOTATION)
        .ok_or_else(|| invalid("no signing certificate"))?;

    let mut pems = pem::parse_many(leaf).map_err(invalid)?;
    if let Some(chain) = annotations.get(CHAIN_ANNOTATION) {
        pems.extend(pem::parse_many(chain).map_err(invalid)?);
    }
    if pems.is_empty() {
        return Err(invalid("no signing certificate"));
    }

    Ok(pems
        .iter()
        .map(|p| BASE64_STD_ENGINE.encode(p.contents()))
        .collect())
}

/// Builds the JSON of a v0.1 Sigstore bundle from a legacy attestation layer.
pub(crate) fn legacy_bundle(
    envelope: &[u8],
    annotations: &BTreeMap<String, String>,
) -> Result<serde_json::Value> {
    let certificates = certificate_chain(annotations)?;

    let rekor_bundle: RekorBundle = serde_json::from_str(
        annotations
            .get(BUNDLE_ANNOTATION)
            .ok_or_else(|| invalid("no transparency log bundle"))?,
    )
    .map_err(invalid)?;
    let payload = &rekor_bundle.payload;

    let body = BASE64_STD_ENGINE.decode(&payload.body).map_err(invalid)?;
    let kind: EntryKind = serde_json::from_slice(&body).map_err(invalid)?;
    let log_id = hex::decode(&payload.log_id).map_err(invalid)?;

    let envelope: serde_json::Value = serde_json::from_slice(envelope).map_err(invalid)?;

    Ok(json!({
        "mediaType": BUNDLE_V01_MEDIA_TYPE,
        "verificationMaterial": {
            "x509CertificateChain": {
                "certificates": certificates
                    .into_iter()
                    .map(|raw_bytes| json!({ "rawBytes": raw_bytes }))
                    .collect::<Vec<_>>()
            },
            "tlogEntries": [{
                "logIndex": payload.log_index.to_string(),
                "logId": { "keyId": BASE64_STD_ENGINE.encode(log_id) },
                "kindVersion": { "kind": kind.kind, "version": kind.api_version },
                "integratedTime": payload.integrated_time.to_string(),
                "inclusionPromise": {
                    "signedEntryTimestamp": rekor_bundle.signed_entry_timestamp
                },
                "canonicalizedBody": payload.body
            }]
        },
        "dsseEnvelope": envelope
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_eq;

    const CERT_BODY: &str = "MIICdzCCAfygAwIBAgITA+PsaKjaEZqn7IY94b1e/jJnizAKBggqhkjOPQQDAzAqMRUwEwYDVQQKEwxzaWdzdG9yZS5kZXYxETAPBgNVBAMTCHNpZ3N0b3JlMB4XDTIxMTAyMDA3MjUxNloXDTIxMTAyMDA3NDUxNVowADBZMBMGByqGSM49AgEGCCqGSM49AwEHA0IABINewQBS1f4AmNIENdL+U/HJotMSM7ZNnkTnYefxwV9TErpvnAZ0+DzLyfAAVaeJtKjFvbOTb8F1yhJFU0XY+RijggEpMIIBJTAOBgNVHQ8BAf8EBAMCB4AwEwYDVR0lBAwwCgYIKwYBBQUHAwMwDAYDVR0TAQH/BAIwADAdBgNVHQ4EFgQUMf1RMMsqNFBrWbx8mRNdxOkEEYswHwYDVR0jBBgwFoAUyMUdAEGaJCkyUSTrDa5K7UoG0+wwgY0GCCsGAQUFBwEBBIGAMH4wfAYIKwYBBQUHMAKGcGh0dHA6Ly9wcml2YXRlY2EtY29udGVudC02MDNmZTdlNy0wMDAwLTIyMjctYmY3NS1mNGY1ZTgwZDI5NTQuc3RvcmFnZS5nb29nbGVhcGlzLmNvbS9jYTM2YTFlOTYyNDJiOWZjYjE0Ni9jYS5jcnQwIAYDVR0RAQH/BBYwFIESZmxhdmlvQGNhc3RlbGxpLm1lMAoGCCqGSM49BAMDA2kAMGYCMQC3Y2ulPTsPmNS4czaKeje0BnOQHz5e6NBX0Bqx9Xca+t2kOi17sopc/v/xH1xLuPoCMQDKND4WjHfKqXXOeUvZ9A96DqrEwGaqGMtnIuN4JzZYaULZrx9goXqqo/C9QnOHTto=";
    const LOG_ID: &str = "c0d23d6ad406973f9559f3ba2d1ca01f84147d8ffc5b8445c224f98b9591801d";
    const SET: &str = "MEUCIDBGJijj2FqU25yRWzlEWHqE64XKwUvychBs1bSM1PaKAiEAwcR2u81c42TLBk3lWJqhtB7SnM7Lh0OYEl6Bfa7ZA4s=";

    fn cert_pem() -> String {
        pem::encode(&pem::Pem::new(
            "CERTIFICATE",
            BASE64_STD_ENGINE.decode(CERT_BODY).unwrap(),
        ))
    }

    fn entry_body() -> String {
        BASE64_STD_ENGINE.encode(r#"{"apiVersion":"0.0.1","kind":"intoto","spec":{}}"#)
    }

    fn annotations() -> BTreeMap<String, String> {
        let rekor_bundle = json!({
            "SignedEntryTimestamp": SET,
            "Payload": {
                "body": entry_body(),
                "integratedTime": 1634714717,
                "logIndex": 783607,
                "logID": LOG_ID
            }
        });
        BTreeMap::from([
            (CERTIFICATE_ANNOTATION.to_string(), cert_pem()),
            (CHAIN_ANNOTATION.to_string(), cert_pem()),
            (BUNDLE_ANNOTATION.to_string(), rekor_bundle.to_string()),
        ])
    }

    fn envelope() -> serde_json::Value {
        json!({
            "payloadType": "application/vnd.in-toto+json",
            "payload": "e30=",
            "signatures": [{"keyid": "", "sig": "MEUCIQ=="}]
        })
    }

    #[test]
    fn legacy_layer_is_repackaged() {
        let bundle = legacy_bundle(envelope().to_string().as_bytes(), &annotations()).unwrap();

        assert_json_eq!(
            bundle,
            json!({
                "mediaType": BUNDLE_V01_MEDIA_TYPE,
                "verificationMaterial": {
                    "x509CertificateChain": {
                        "certificates": [{"rawBytes": CERT_BODY}, {"rawBytes": CERT_BODY}]
                    },
                    "tlogEntries": [{
                        "logIndex": "783607",
                        "logId": {"keyId": BASE64_STD_ENGINE.encode(hex::decode(LOG_ID).unwrap())},
                        "kindVersion": {"kind": "intoto", "version": "0.0.1"},
                        "integratedTime": "1634714717",
                        "inclusionPromise": {"signedEntryTimestamp": SET},
                        "canonicalizedBody": entry_body()
                    }]
                },
                "dsseEnvelope": envelope()
            })
        );
    }

    #[test]
    fn certificate_is_required() {
        let mut annotations = annotations();
        annotations.remove(CERTIFICATE_ANNOTATION);
        let err = legacy_bundle(envelope().to_string().as_bytes(), &annotations).unwrap_err();
        assert!(err.to_string().contains("no signing certificate"));
    }

    #[test]
    fn rekor_bundle_is_required() {
        let mut annotations = annotations();
        annotations.remove(BUNDLE_ANNOTATION);
        let err = legacy_bundle(envelope().to_string().as_bytes(), &annotations).unwrap_err();
        assert!(err.to_string().contains("no transparency log bundle"));
    }

    #[test]
    fn chain_is_optional() {
        let mut annotations = annotations();
        annotations.remove(CHAIN_ANNOTATION);
        let bundle = legacy_bundle(envelope().to_string().as_bytes(), &annotations).unwrap();
        assert_eq!(
            bundle["verificationMaterial"]["x509CertificateChain"]["certificates"]
                .as_array()
                .unwrap()
                .len(),
            1
        );
    }
}
