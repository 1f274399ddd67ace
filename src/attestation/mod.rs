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

//! Extraction of SBOM documents from verified attestations.

use std::borrow::Cow;

use base64::{engine::general_purpose::STANDARD as BASE64_STD_ENGINE, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{ProviderError, Result};
use crate::sbom::{SbomFormat, UnifiedSbom};

pub mod statement;
pub use statement::{Statement, Subject};

/// Payload type of DSSE envelopes carrying in-toto statements.
pub const IN_TOTO_PAYLOAD_TYPE: &str = "application/vnd.in-toto+json";

/// A DSSE envelope.
///
/// <https://github.com/secure-systems-lab/dsse/blob/master/envelope.md>
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default)]
    pub payload_type: String,
    /// Base64 encoded
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub signatures: Vec<EnvelopeSignature>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvelopeSignature {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub keyid: String,
    /// Base64 encoded
    #[serde(default)]
    pub sig: String,
}

impl Envelope {
    pub fn decode_payload(&self) -> Result<Vec<u8>> {
        Ok(BASE64_STD_ENGINE.decode(&self.payload)?)
    }

    /// The DSSE pre-authentication encoding, i.e. the bytes that are signed:
    ///
    /// ```text
    /// "DSSEv1" SP LEN(type) SP type SP LEN(body) SP body
    /// ```
    pub fn pae(&self) -> Result<Vec<u8>> {
        let payload = self.decode_payload()?;
        let mut pae = format!(
            "DSSEv1 {} {} {} ",
            self.payload_type.len(),
            self.payload_type,
            payload.len()
        )
        .into_bytes();
        pae.extend_from_slice(&payload);
        Ok(pae)
    }
}

/// Returns the in-toto statement carried by `payload`.
///
/// `payload` is either a DSSE envelope or the bare statement. An envelope
/// whose payload is not valid base64 is an error.
pub fn unwrap_envelope(payload: &[u8]) -> Result<Cow<'_, [u8]>> {
    match serde_json::from_slice::<Envelope>(payload) {
        Ok(envelope) if !envelope.payload.is_empty() => {
            Ok(Cow::Owned(envelope.decode_payload()?))
        }
        _ => Ok(Cow::Borrowed(payload)),
    }
}

/// Parses the in-toto statement carried by `payload`.
pub fn parse_statement(payload: &[u8]) -> Result<Statement> {
    let statement = unwrap_envelope(payload)?;
    serde_json::from_slice(&statement).map_err(|e| ProviderError::StatementParseError(e.to_string()))
}

/// Extracts the SBOM of a verified attestation.
///
/// Attestations with a predicate type that isn't a known SBOM format return
/// `Ok(None)`: they are not an error, they just don't carry an SBOM.
pub fn extract(payload: &[u8]) -> Result<Option<UnifiedSbom>> {
    let statement = parse_statement(payload)?;

    let Some(format) = SbomFormat::from_predicate_type(&statement.predicate_type) else {
        debug!(
            predicate_type = statement.predicate_type.as_str(),
            "attestation does not carry an SBOM"
        );
        return Ok(None);
    };

    format.normalize(&statement.predicate).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spdx_statement() -> serde_json::Value {
        json!({
            "_type": "https://in-toto.io/Statement/v0.1",
            "predicateType": "https://spdx.dev/Document",
            "subject": [{"name": "ghcr.io/acme/app", "digest": {"sha256": "abcd"}}],
            "predicate": {
                "spdxVersion": "SPDX-2.3",
                "name": "app",
                "packages": [
                    {"name": "openssl", "versionInfo": "3.0.13", "licenseConcluded": "Apache-2.0"},
                    {"name": "zlib", "versionInfo": "1.3", "licenseDeclared": "Zlib"}
                ]
            }
        })
    }

    fn wrap(statement: &serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&Envelope {
            payload_type: IN_TOTO_PAYLOAD_TYPE.to_string(),
            payload: BASE64_STD_ENGINE.encode(statement.to_string()),
            signatures: vec![EnvelopeSignature {
                keyid: String::new(),
                sig: "MEUCIQ==".to_string(),
            }],
        })
        .unwrap()
    }

    #[test]
    fn enveloped_and_bare_statements_give_the_same_sbom() {
        let statement = spdx_statement();
        let bare = extract(statement.to_string().as_bytes()).unwrap().unwrap();
        let enveloped = extract(&wrap(&statement)).unwrap().unwrap();

        assert_eq!(bare, enveloped);
        assert_eq!(bare.to_json().unwrap(), enveloped.to_json().unwrap());
        assert_eq!(bare.packages.len(), 2);
    }

    #[test]
    fn unsupported_predicate_type_is_not_an_error() {
        let statement = json!({
            "_type": "https://in-toto.io/Statement/v0.1",
            "predicateType": "https://slsa.dev/provenance/v0.2",
            "subject": [],
            "predicate": {"builder": {"id": "https://github.com/actions"}}
        });
        assert!(extract(&wrap(&statement)).unwrap().is_none());
    }

    #[test]
    fn malformed_statement_is_an_error() {
        let err = extract(b"this is not json").unwrap_err();
        assert!(matches!(err, ProviderError::StatementParseError(_)));
    }

    #[test]
    fn envelope_with_invalid_base64_is_an_error() {
        let envelope = json!({
            "payloadType": IN_TOTO_PAYLOAD_TYPE,
            "payload": "!!! definitely not base64 !!!",
            "signatures": []
        });
        let err = extract(envelope.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, ProviderError::EnvelopeDecodeError(_)));
    }

    #[test]
    fn pae_encodes_type_and_payload_lengths() {
        let envelope = Envelope {
            payload_type: "application/test".to_string(),
            payload: BASE64_STD_ENGINE.encode("test payload"),
            signatures: vec![],
        };
        assert_eq!(
            envelope.pae().unwrap(),
            b"DSSEv1 16 application/test 12 test payload"
        );

        let envelope = Envelope {
            payload_type: IN_TOTO_PAYLOAD_TYPE.to_string(),
            payload: String::new(),
            signatures: vec![],
        };
        assert_eq!(
            envelope.pae().unwrap(),
            b"DSSEv1 28 application/vnd.in-toto+json 0 "
        );
    }

    #[test]
    fn malformed_predicate_is_an_error() {
        let statement = json!({
            "_type": "https://in-toto.io/Statement/v0.1",
            "predicateType": "https://cyclonedx.org/bom",
            "predicate": {"components": "not a list"}
        });
        let err = extract(&wrap(&statement)).unwrap_err();
        assert!(matches!(err, ProviderError::CycloneDxParseError(_)));
    }
}
