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

//! Signed checkpoints of the transparency log.
//!
//! A checkpoint is a [signed note](https://github.com/C2SP/C2SP/blob/main/signed-note.md)
//! whose body is:
//!
//! ```text
//! <origin>
//! <tree size>
//! <base64 root hash>
//! [optional extension lines]
//! ```

use base64::{engine::general_purpose::STANDARD as BASE64_STD_ENGINE, Engine as _};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NoteError {
    #[error("note missing blank line separator")]
    MissingSeparator,

    #[error("checkpoint origin is empty")]
    EmptyOrigin,

    #[error("invalid tree size: {0}")]
    InvalidTreeSize(String),

    #[error("invalid checkpoint root hash: {0}")]
    InvalidRootHash(String),

    #[error("note has no signatures")]
    NoSignatures,

    #[error("invalid signature line: {0}")]
    InvalidSignatureLine(String),
}

/// The body of a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Checkpoint {
    pub origin: String,
    pub tree_size: u64,
    pub root_hash: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NoteSignature {
    pub name: String,
    /// First four bytes of the log id of the signer.
    pub key_hint: [u8; 4],
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SignedNote {
    pub checkpoint: Checkpoint,
    /// The bytes covered by the signatures.
    pub signed_text: String,
    pub signatures: Vec<NoteSignature>,
}

impl Checkpoint {
    fn from_text(text: &str) -> Result<Self, NoteError> {
        let mut lines = text.lines();
        let origin = lines.next().unwrap_or_default();
        if origin.is_empty() {
            return Err(NoteError::EmptyOrigin);
        }
        let size = lines.next().unwrap_or_default();
        let tree_size = size
            .parse()
            .map_err(|_| NoteError::InvalidTreeSize(size.to_string()))?;
        let root_hash = BASE64_STD_ENGINE
            .decode(lines.next().unwrap_or_default())
            .map_err(|e| NoteError::InvalidRootHash(e.to_string()))?;
        if root_hash.len() != 32 {
            return Err(NoteError::InvalidRootHash(format!(
                "expected 32 bytes, got {}",
                root_hash.len()
            )));
        }

        Ok(Checkpoint {
            origin: origin.to_string(),
            tree_size,
            root_hash,
        })
    }
}

impl NoteSignature {
    /// `— <name> <base64(key hint || signature)>`
    fn from_line(line: &str) -> Result<Self, NoteError> {
        let invalid = || NoteError::InvalidSignatureLine(line.to_string());
        let rest = line.strip_prefix("\u{2014} ").ok_or_else(invalid)?;
        let (name, signature) = rest.split_once(' ').ok_or_else(invalid)?;
        let signature = BASE64_STD_ENGINE.decode(signature).map_err(|_| invalid())?;
        if name.is_empty() || signature.len() < 5 {
            return Err(invalid());
        }
        let (key_hint, signature) = signature.split_at(4);

        Ok(NoteSignature {
            name: name.to_string(),
            key_hint: [key_hint[0], key_hint[1], key_hint[2], key_hint[3]],
            signature: signature.to_vec(),
        })
    }
}

impl SignedNote {
    pub fn from_text(text: &str) -> Result<Self, NoteError> {
        let (header, signatures) = text.split_once("\n\n").ok_or(NoteError::MissingSeparator)?;
        let signatures = signatures
            .lines()
            .filter(|line| !line.is_empty())
            .map(NoteSignature::from_line)
            .collect::<Result<Vec<_>, _>>()?;
        if signatures.is_empty() {
            return Err(NoteError::NoSignatures);
        }

        Ok(SignedNote {
            checkpoint: Checkpoint::from_text(header)?,
            signed_text: format!("{header}\n"),
            signatures,
        })
    }

    /// Signatures made with the key whose log id starts with `key_hint`.
    pub fn signatures_for<'a>(
        &'a self,
        key_hint: &'a [u8],
    ) -> impl Iterator<Item = &'a NoteSignature> + 'a {
        self.signatures
            .iter()
            .filter(move |s| key_hint.starts_with(&s.key_hint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = "nBBhRakbJ/Sh+Z8FCIr+pWbsjyjvPY2F20eTfkcmlFQ=";

    fn note(signature_lines: &str) -> String {
        format!("rekor.sigstore.dev - 1193050959916656506\n42\n{ROOT}\n\n{signature_lines}")
    }

    #[test]
    fn checkpoint_is_parsed() {
        let signature = BASE64_STD_ENGINE.encode([0xc0, 0xd2, 0x3d, 0x6a, 0x30, 0x45]);
        let note = SignedNote::from_text(&note(&format!(
            "\u{2014} rekor.sigstore.dev {signature}\n"
        )))
        .unwrap();

        assert_eq!(note.checkpoint.origin, "rekor.sigstore.dev - 1193050959916656506");
        assert_eq!(note.checkpoint.tree_size, 42);
        assert_eq!(note.checkpoint.root_hash, BASE64_STD_ENGINE.decode(ROOT).unwrap());
        assert_eq!(
            note.signed_text,
            format!("rekor.sigstore.dev - 1193050959916656506\n42\n{ROOT}\n")
        );
        assert_eq!(note.signatures.len(), 1);
        assert_eq!(note.signatures[0].name, "rekor.sigstore.dev");
        assert_eq!(note.signatures[0].key_hint, [0xc0, 0xd2, 0x3d, 0x6a]);
        assert_eq!(note.signatures[0].signature, vec![0x30, 0x45]);

        let log_id = hex::decode("c0d23d6ad406973f9559f3ba2d1ca01f84147d8ffc5b8445c224f98b9591801d").unwrap();
        assert_eq!(note.signatures_for(&log_id).count(), 1);
        assert_eq!(note.signatures_for(&[0u8; 32]).count(), 0);
    }

    #[test]
    fn note_errors() {
        assert_eq!(
            SignedNote::from_text("origin\n1\nroot\n").unwrap_err(),
            NoteError::MissingSeparator
        );
        assert_eq!(SignedNote::from_text(&note("")).unwrap_err(), NoteError::NoSignatures);
        assert!(matches!(
            SignedNote::from_text(&note("- rekor.sigstore.dev AAAAAAA=\n")).unwrap_err(),
            NoteError::InvalidSignatureLine(_)
        ));
        assert!(matches!(
            SignedNote::from_text(&note("\u{2014} rekor.sigstore.dev AAAA\n")).unwrap_err(),
            NoteError::InvalidSignatureLine(_)
        ));

        let signature = "\u{2014} rekor AAAAAAA=\n";
        assert!(matches!(
            SignedNote::from_text(&format!("origin\nmany\n{ROOT}\n\n{signature}")).unwrap_err(),
            NoteError::InvalidTreeSize(_)
        ));
        assert!(matches!(
            SignedNote::from_text(&format!("origin\n1\nAAAA\n\n{signature}")).unwrap_err(),
            NoteError::InvalidRootHash(_)
        ));
        assert_eq!(
            SignedNote::from_text(&format!("\n1\n{ROOT}\n\n{signature}")).unwrap_err(),
            NoteError::EmptyOrigin
        );
    }
}
