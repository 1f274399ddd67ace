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

//! Checks of the Rekor evidence carried by a bundle: the logged entry must
//! describe the attestation being verified, and the log must have promised
//! (SET) or proven (inclusion proof) that the entry is part of it.

use base64::{engine::general_purpose::STANDARD as BASE64_STD_ENGINE, Engine as _};
use olpc_cjson::CanonicalFormatter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use super::keyring::{Keyring, KeyringError};
use super::merkle::{self, Hash, MerkleProofError};
use super::models::TransparencyLogEntry;
use super::note::{NoteError, SignedNote};

#[derive(Error, Debug)]
pub enum TransparencyError {
    #[error("unsupported log entry {kind} {version}")]
    UnsupportedEntry { kind: String, version: String },

    #[error("log entry does not match the attestation: {0}")]
    InconsistentEntry(String),

    #[error("invalid signed entry timestamp: {0}")]
    SignedEntryTimestamp(#[source] KeyringError),

    #[error("invalid inclusion proof: {0}")]
    InclusionProof(#[from] MerkleProofError),

    #[error("malformed hash of {0} bytes")]
    MalformedHash(usize),

    #[error("invalid checkpoint: {0}")]
    Checkpoint(#[from] NoteError),

    #[error("checkpoint signature verification failed: {0}")]
    CheckpointSignature(String),

    #[error("checkpoint does not match the inclusion proof: {0}")]
    CheckpointMismatch(String),
}

type Result<T> = std::result::Result<T, TransparencyError>;

fn inconsistent(reason: impl Into<String>) -> TransparencyError {
    TransparencyError::InconsistentEntry(reason.into())
}

/// What the attestation says about itself, to compare with the log entry.
pub(crate) struct SignedMaterial<'a> {
    /// Decoded DSSE payload.
    pub payload: &'a [u8],
    pub signature: &'a [u8],
    pub certificate_der: &'a [u8],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryBody {
    kind: String,
    api_version: String,
    spec: serde_json::Value,
}

#[derive(Deserialize)]
struct HashValue {
    value: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DsseSpec {
    payload_hash: HashValue,
    #[serde(default)]
    signatures: Vec<DsseSignature>,
}

#[derive(Deserialize)]
struct DsseSignature {
    signature: String,
    /// Base64 encoded PEM certificate
    verifier: String,
}

#[derive(Deserialize)]
struct IntotoSpec {
    content: IntotoContent,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntotoContent {
    envelope: IntotoEnvelope,
    payload_hash: HashValue,
}

#[derive(Deserialize)]
struct IntotoEnvelope {
    #[serde(default)]
    signatures: Vec<IntotoSignature>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntotoSignature {
    /// Base64 encoded, the DSSE base64 signature being encoded a second time
    sig: String,
    /// Base64 encoded PEM certificate
    public_key: String,
}

fn parse_spec<T: for<'de> Deserialize<'de>>(spec: serde_json::Value) -> Result<T> {
    serde_json::from_value(spec).map_err(|e| inconsistent(format!("malformed entry: {e}")))
}

/// `true` when the base64 PEM `verifier` holds the DER certificate `der`.
fn same_certificate(verifier: &str, der: &[u8]) -> bool {
    BASE64_STD_ENGINE
        .decode(verifier)
        .ok()
        .and_then(|pem| pem::parse(pem).ok())
        .is_some_and(|pem| pem.contents() == der)
}

/// Intoto entries encode the already base64 encoded DSSE signature again.
fn decode_intoto_signature(sig: &str) -> Option<Vec<u8>> {
    let once = BASE64_STD_ENGINE.decode(sig).ok()?;
    match std::str::from_utf8(&once)
        .ok()
        .and_then(|s| BASE64_STD_ENGINE.decode(s).ok())
    {
        Some(twice) => Some(twice),
        None => Some(once),
    }
}

/// Ensures the log entry records this very payload, signature and signing
/// certificate.
pub(crate) fn verify_body(entry: &TransparencyLogEntry, material: &SignedMaterial) -> Result<()> {
    let body: EntryBody = serde_json::from_slice(&entry.canonicalized_body)
        .map_err(|e| inconsistent(format!("malformed entry: {e}")))?;
    let payload_hash = hex::encode(Sha256::digest(material.payload));

    match (body.kind.as_str(), body.api_version.as_str()) {
        ("dsse", "0.0.1") => {
            let spec: DsseSpec = parse_spec(body.spec)?;
            if spec.payload_hash.value != payload_hash {
                return Err(inconsistent("payload hash mismatch"));
            }
            let signature = spec
                .signatures
                .iter()
                .find(|s| {
                    BASE64_STD_ENGINE.decode(&s.signature).ok().as_deref() == Some(material.signature)
                })
                .ok_or_else(|| inconsistent("signature not found in entry"))?;
            if !same_certificate(&signature.verifier, material.certificate_der) {
                return Err(inconsistent("signing certificate mismatch"));
            }
        }
        ("intoto", "0.0.2") => {
            let spec: IntotoSpec = parse_spec(body.spec)?;
            if spec.content.payload_hash.value != payload_hash {
                return Err(inconsistent("payload hash mismatch"));
            }
            let signature = spec
                .content
                .envelope
                .signatures
                .iter()
                .find(|s| decode_intoto_signature(&s.sig).as_deref() == Some(material.signature))
                .ok_or_else(|| inconsistent("signature not found in entry"))?;
            if !same_certificate(&signature.public_key, material.certificate_der) {
                return Err(inconsistent("signing certificate mismatch"));
            }
        }
        (kind, version) => {
            return Err(TransparencyError::UnsupportedEntry {
                kind: kind.to_string(),
                version: version.to_string(),
            })
        }
    }

    debug!(kind = body.kind.as_str(), "log entry is consistent with the attestation");
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SetPayload {
    body: String,
    integrated_time: u64,
    log_index: u64,
    #[serde(rename = "logID")]
    log_id: String,
}

/// The bytes signed by the log when it issued the SET of `entry`.
fn set_payload(entry: &TransparencyLogEntry) -> Result<Vec<u8>> {
    let payload = SetPayload {
        body: BASE64_STD_ENGINE.encode(&*entry.canonicalized_body),
        integrated_time: entry.integrated_time,
        log_index: entry.log_index,
        log_id: hex::encode(&*entry.log_id.key_id),
    };

    let mut canonicalized = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut canonicalized, CanonicalFormatter::new());
    payload
        .serialize(&mut ser)
        .map_err(|e| inconsistent(format!("cannot canonicalize SET payload: {e}")))?;
    Ok(canonicalized)
}

/// Verifies the Signed Entry Timestamp, the log's promise to include the
/// entry.
pub(crate) fn verify_inclusion_promise(entry: &TransparencyLogEntry, rekor_keyring: &Keyring) -> Result<()> {
    let Some(promise) = &entry.inclusion_promise else {
        return Ok(());
    };
    rekor_keyring
        .verify(
            &entry.log_id.key_id,
            &promise.signed_entry_timestamp,
            &set_payload(entry)?,
            Some(entry.integrated_time),
        )
        .map_err(TransparencyError::SignedEntryTimestamp)?;

    debug!(log_index = entry.log_index, "signed entry timestamp verified");
    Ok(())
}

fn hash(bytes: &[u8]) -> Result<Hash> {
    bytes
        .try_into()
        .map_err(|_| TransparencyError::MalformedHash(bytes.len()))
}

/// Verifies the Merkle inclusion proof of `entry` and the signed checkpoint
/// committing to its root.
pub(crate) fn verify_inclusion_proof(entry: &TransparencyLogEntry, rekor_keyring: &Keyring) -> Result<()> {
    let Some(proof) = &entry.inclusion_proof else {
        return Ok(());
    };

    let root_hash = hash(&proof.root_hash)?;
    let hashes = proof
        .hashes
        .iter()
        .map(|h| hash(h))
        .collect::<Result<Vec<_>>>()?;
    merkle::verify_inclusion(
        proof.log_index,
        proof.tree_size,
        &merkle::hash_leaf(&*entry.canonicalized_body),
        &hashes,
        &root_hash,
    )?;
    debug!(
        index = proof.log_index,
        tree_size = proof.tree_size,
        "inclusion proof verified"
    );

    let Some(checkpoint) = &proof.checkpoint else {
        return Ok(());
    };
    let note = SignedNote::from_text(&checkpoint.envelope)?;
    if note.checkpoint.root_hash != root_hash {
        return Err(TransparencyError::CheckpointMismatch(format!(
            "root hash {} != {}",
            hex::encode(&note.checkpoint.root_hash),
            hex::encode(root_hash)
        )));
    }
    if note.checkpoint.tree_size != proof.tree_size {
        return Err(TransparencyError::CheckpointMismatch(format!(
            "tree size {} != {}",
            note.checkpoint.tree_size, proof.tree_size
        )));
    }

    let log_id = &entry.log_id.key_id;
    let mut last_error = String::from("no signature from the log");
    for signature in note.signatures_for(log_id) {
        match rekor_keyring.verify(log_id, &signature.signature, note.signed_text.as_bytes(), None) {
            Ok(()) => {
                debug!(origin = note.checkpoint.origin.as_str(), "checkpoint verified");
                return Ok(());
            }
            Err(e) => last_error = e.to_string(),
        }
    }
    Err(TransparencyError::CheckpointSignature(last_error))
}
