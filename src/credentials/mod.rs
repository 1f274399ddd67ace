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

//! Registry credentials.
//!
//! Credentials are looked up through a [`CredentialSource`]: an ordered list
//! of [`CredentialProvider`] objects queried in priority order, where the
//! first provider knowing the registry wins. Sources are immutable; giving a
//! workload's own pull secrets priority produces a new source, the process
//! default stays untouched.

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use docker_credential::{CredentialRetrievalError, DockerCredential};
use tracing::{debug, warn};

use crate::registry::{Auth, OciReference};

pub mod dockerconfig;
pub use dockerconfig::PullSecretProvider;

pub mod kube;
pub use kube::{
    InClusterConnector, KubeSecretStore, Secret, SecretStore, SecretStoreConnector,
    ServiceAccount,
};

pub mod resolver;
pub use resolver::CredentialResolver;

/// Anything able to provide authentication material for a registry.
pub trait CredentialProvider: Send + Sync {
    /// Human readable name, used for logging.
    fn name(&self) -> &str;

    /// Returns the credentials to use when pulling `image`, or `None` when
    /// this provider knows nothing about its registry.
    fn resolve_credentials_for(&self, image: &OciReference) -> Option<Auth>;
}

/// An ordered, priority-first list of credential providers.
#[derive(Clone, Default)]
pub struct CredentialSource {
    providers: Vec<Arc<dyn CredentialProvider>>,
}

impl CredentialSource {
    pub fn new(providers: Vec<Arc<dyn CredentialProvider>>) -> Self {
        CredentialSource { providers }
    }

    /// A source without any provider: every registry is accessed anonymously.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Returns a new source where `providers` are queried before the ones of `self`.
    pub fn with_priority(&self, providers: Vec<Arc<dyn CredentialProvider>>) -> Self {
        let mut chained = providers;
        chained.extend(self.providers.iter().cloned());
        CredentialSource { providers: chained }
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// First match wins, anonymous access when no provider matches.
    pub fn resolve(&self, image: &OciReference) -> Auth {
        for provider in &self.providers {
            if let Some(auth) = provider.resolve_credentials_for(image) {
                debug!(provider = provider.name(), registry = image.registry(), "found registry credentials");
                return auth;
            }
        }
        debug!(registry = image.registry(), "no credentials found, using anonymous access");
        Auth::Anonymous
    }
}

impl Debug for CredentialSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSource")
            .field("providers", &self.provider_names())
            .finish()
    }
}

/// Credentials of the local docker configuration (`~/.docker/config.json`,
/// `DOCKER_CONFIG`, credential helpers).
///
/// Only `UsernamePassword` credentials are supported. An `IdentityToken`
/// makes the provider report no match.
#[derive(Debug, Default)]
pub struct DockerConfigProvider;

impl CredentialProvider for DockerConfigProvider {
    fn name(&self) -> &str {
        "docker-config"
    }

    fn resolve_credentials_for(&self, image: &OciReference) -> Option<Auth> {
        let server = image
            .resolve_registry()
            .strip_suffix('/')
            .unwrap_or_else(|| image.resolve_registry());
        match docker_credential::get_credential(server) {
            Err(CredentialRetrievalError::ConfigNotFound) => None,
            Err(CredentialRetrievalError::NoCredentialConfigured) => None,
            Err(e) => {
                warn!("Error handling docker configuration file: {}", e);
                None
            }
            Ok(DockerCredential::UsernamePassword(username, password)) => {
                debug!("Found docker credentials");
                Some(Auth::Basic(username, password))
            }
            Ok(DockerCredential::IdentityToken(_)) => {
                warn!("Cannot use contents of docker config, identity token not supported");
                None
            }
        }
    }
}
