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

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use sigstore::crypto::{CosignVerificationKey, Signature};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeyringError {
    #[error("malformed key: {0}")]
    KeyMalformed(String),

    #[error("requested key not in keyring: {0}")]
    KeyNotFound(String),

    #[error("key {0} was not valid at the time of signing")]
    KeyExpired(String),

    #[error("verification failed: {0}")]
    VerificationFailed(String),
}

type Result<T> = std::result::Result<T, KeyringError>;

/// Validity window of a key, in seconds since the UNIX epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ValidFor {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

impl ValidFor {
    fn contains(&self, time: u64) -> bool {
        self.start.map_or(true, |start| start <= time) && self.end.map_or(true, |end| time <= end)
    }
}

struct Key {
    inner: CosignVerificationKey,
    valid_for: ValidFor,
}

/// Public keys of transparency logs, indexed by their log id.
#[derive(Default)]
pub(crate) struct Keyring(HashMap<[u8; 32], Key>);

/// The RFC 6962 key id: SHA-256 of the DER `SubjectPublicKeyInfo`.
pub(crate) fn key_id(spki_der: &[u8]) -> [u8; 32] {
    Sha256::digest(spki_der).into()
}

impl Keyring {
    /// Adds a DER encoded `SubjectPublicKeyInfo`. `log_id` defaults to the
    /// key id computed from the key itself.
    pub fn add(
        &mut self,
        spki_der: &[u8],
        log_id: Option<[u8; 32]>,
        valid_for: ValidFor,
    ) -> Result<()> {
        let inner = CosignVerificationKey::try_from_der(spki_der)
            .map_err(|e| KeyringError::KeyMalformed(e.to_string()))?;
        let id = log_id.unwrap_or_else(|| key_id(spki_der));
        self.0.insert(id, Key { inner, valid_for });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Verifies `signature` over `msg` with the key of `log_id`. When `time`
    /// is given, the key must have been valid at that time.
    pub fn verify(
        &self,
        log_id: &[u8],
        signature: &[u8],
        msg: &[u8],
        time: Option<u64>,
    ) -> Result<()> {
        let key = <[u8; 32]>::try_from(log_id)
            .ok()
            .and_then(|id| self.0.get(&id))
            .ok_or_else(|| KeyringError::KeyNotFound(hex::encode(log_id)))?;

        if let Some(time) = time {
            if !key.valid_for.contains(time) {
                return Err(KeyringError::KeyExpired(hex::encode(log_id)));
            }
        }

        key.inner
            .verify_signature(Signature::Raw(signature), msg)
            .map_err(|e| KeyringError::VerificationFailed(e.to_string()))
    }
}
