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

//! RFC 6962 Merkle tree inclusion proofs, as served by Rekor.
//!
//! <https://www.rfc-editor.org/rfc/rfc6962.html#section-2.1>

use sha2::{Digest, Sha256};
use thiserror::Error;

pub(crate) type Hash = [u8; 32];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MerkleProofError {
    #[error("leaf index {index} is not smaller than tree size {tree_size}")]
    IndexGtTreeSize { index: u64, tree_size: u64 },

    #[error("wrong proof size: got {got}, want {want}")]
    WrongProofSize { got: usize, want: usize },

    #[error("inclusion proof leads to root {calculated}, expected {expected}")]
    MismatchedRoot { expected: String, calculated: String },
}

/// `SHA256(0x00 || leaf)`
pub(crate) fn hash_leaf(leaf: impl AsRef<[u8]>) -> Hash {
    Sha256::new()
        .chain_update([0x00])
        .chain_update(leaf)
        .finalize()
        .into()
}

/// `SHA256(0x01 || left || right)`
pub(crate) fn hash_children(left: impl AsRef<[u8]>, right: impl AsRef<[u8]>) -> Hash {
    Sha256::new()
        .chain_update([0x01])
        .chain_update(left)
        .chain_update(right)
        .finalize()
        .into()
}

/// Checks that `leaf_hash` sits at `index` of the tree of `tree_size` leaves
/// whose root is `root_hash`.
pub(crate) fn verify_inclusion(
    index: u64,
    tree_size: u64,
    leaf_hash: &Hash,
    proof_hashes: &[Hash],
    root_hash: &Hash,
) -> Result<(), MerkleProofError> {
    let calculated = root_from_inclusion_proof(index, tree_size, leaf_hash, proof_hashes)?;
    if &calculated != root_hash {
        return Err(MerkleProofError::MismatchedRoot {
            expected: hex::encode(root_hash),
            calculated: hex::encode(calculated),
        });
    }
    Ok(())
}

fn root_from_inclusion_proof(
    index: u64,
    tree_size: u64,
    leaf_hash: &Hash,
    proof_hashes: &[Hash],
) -> Result<Hash, MerkleProofError> {
    if index >= tree_size {
        return Err(MerkleProofError::IndexGtTreeSize { index, tree_size });
    }
    let (inner, border) = decomp_inclusion_proof(index, tree_size);
    if proof_hashes.len() != inner + border {
        return Err(MerkleProofError::WrongProofSize {
            got: proof_hashes.len(),
            want: inner + border,
        });
    }

    let res = chain_inner(leaf_hash, &proof_hashes[..inner], index);
    Ok(chain_border_right(&res, &proof_hashes[inner..]))
}

/// Splits the proof of leaf `index` into the part below the point where its
/// path and the path of the last leaf diverge (`inner`) and the part along
/// the right border of the tree (`border`).
fn decomp_inclusion_proof(index: u64, tree_size: u64) -> (usize, usize) {
    let inner = (u64::BITS - (index ^ (tree_size - 1)).leading_zeros()) as usize;
    let border = (index >> inner).count_ones() as usize;
    (inner, border)
}

fn chain_inner(seed: &Hash, proof_hashes: &[Hash], index: u64) -> Hash {
    proof_hashes
        .iter()
        .enumerate()
        .fold(*seed, |seed, (i, h)| {
            if (index >> i) & 1 == 0 {
                hash_children(seed, h)
            } else {
                hash_children(h, seed)
            }
        })
}

/// Border hashes are always left siblings.
fn chain_border_right(seed: &Hash, proof_hashes: &[Hash]) -> Hash {
    proof_hashes
        .iter()
        .fold(*seed, |seed, h| hash_children(h, seed))
}
