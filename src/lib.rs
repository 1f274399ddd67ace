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

//! An external data provider for [Gatekeeper](https://open-policy-agent.github.io/gatekeeper/)
//! answering the question "does this image carry a verified SBOM, and what
//! does it declare?".
//!
//! For each lookup key the provider:
//!
//! 1. decodes the key ([`key::LookupKey`]): image reference, names of the
//!    image pull secrets of the workload, expected signer;
//! 2. builds the registry credentials of the workload ([`credentials`]);
//! 3. verifies the in-toto attestations attached to the image with
//!    [Sigstore](https://sigstore.dev/) keyless signatures ([`verify`]),
//!    looking first at OCI referrers and then at the legacy cosign layout;
//! 4. extracts the first SPDX or CycloneDX SBOM found ([`attestation`]) and
//!    normalizes it into a single package model ([`sbom`]).
//!
//! The [`orchestrator::Orchestrator`] composes these steps, the [`server`]
//! module exposes them over HTTP.

pub mod attestation;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod key;
pub mod orchestrator;
pub mod registry;
pub mod sbom;
pub mod server;
pub mod verify;

mod mock_client;
