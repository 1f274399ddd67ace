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

//! Credentials stored inside of Kubernetes image pull secrets.

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD as BASE64_STD_ENGINE, Engine as _};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{kube::Secret, CredentialProvider};
use crate::errors::{ProviderError, Result};
use crate::registry::{Auth, OciReference};

pub const DOCKER_CONFIG_JSON_KEY: &str = ".dockerconfigjson";
pub const DOCKER_CFG_KEY: &str = ".dockercfg";

const DOCKER_HUB_ALIASES: [&str; 4] = [
    "docker.io",
    "index.docker.io",
    "registry-1.docker.io",
    "registry.hub.docker.com",
];

/// `.dockerconfigjson` content: `{"auths": {"<server>": {...}}}`
#[derive(Deserialize, Debug, Default)]
struct DockerConfigJson {
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
}

#[derive(Deserialize, Debug, Default, Clone)]
struct AuthEntry {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    auth: Option<String>,
    #[serde(default)]
    registrytoken: Option<String>,
}

impl AuthEntry {
    fn to_auth(&self) -> Option<Auth> {
        if let Some(token) = self.registrytoken.as_ref().filter(|t| !t.is_empty()) {
            return Some(Auth::Bearer(token.clone()));
        }
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) if !user.is_empty() => {
                return Some(Auth::Basic(user.clone(), pass.clone()))
            }
            _ => {}
        }
        let decoded = BASE64_STD_ENGINE
            .decode(self.auth.as_ref().filter(|a| !a.is_empty())?)
            .ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (user, pass) = decoded.split_once(':')?;
        Some(Auth::Basic(user.to_string(), pass.to_string()))
    }
}

/// The registry part of a docker config key, with the optional repository
/// path some keys carry (`registry.example.com/team`).
#[derive(Debug, Clone, PartialEq, Eq)]
struct ServerPattern {
    host: String,
    path: String,
}

impl ServerPattern {
    fn parse(key: &str) -> Option<Self> {
        let key = key
            .trim()
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');
        let key = key
            .strip_suffix("/v1")
            .or_else(|| key.strip_suffix("/v2"))
            .unwrap_or(key);

        let (host, path) = key.split_once('/').unwrap_or((key, ""));
        if host.is_empty() {
            return None;
        }
        Some(ServerPattern {
            host: normalize_host(host),
            path: path.trim_matches('/').to_string(),
        })
    }

    fn matches(&self, host: &str, repository: &str) -> bool {
        let host_matches = match self.host.strip_prefix("*.") {
            Some(suffix) => host
                .strip_suffix(suffix)
                .is_some_and(|prefix| prefix.len() > 1 && prefix.ends_with('.')),
            None => self.host == host,
        };
        if !host_matches {
            return false;
        }
        self.path.is_empty()
            || repository == self.path
            || repository
                .strip_prefix(self.path.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.to_ascii_lowercase();
    if DOCKER_HUB_ALIASES.contains(&host.as_str()) {
        "docker.io".to_string()
    } else {
        host
    }
}

/// Credential provider backed by the `.dockerconfigjson` or `.dockercfg`
/// payload of one or more pull secrets.
///
/// When several entries match a registry the most specific one (longest
/// repository path) wins; between equally specific entries the first secret
/// given wins.
#[derive(Debug, Default)]
pub struct PullSecretProvider {
    entries: Vec<(ServerPattern, Auth)>,
}

impl PullSecretProvider {
    /// Builds a provider from the given secrets. Secrets without a usable
    /// docker configuration are skipped with a warning.
    pub fn from_secrets(secrets: &[Secret]) -> Self {
        let mut entries = Vec::new();
        for secret in secrets {
            match Self::parse_secret(secret) {
                Ok(parsed) => entries.extend(parsed),
                Err(e) => warn!(
                    secret = secret.metadata.name.as_str(),
                    error = %e,
                    "ignoring image pull secret"
                ),
            }
        }
        PullSecretProvider { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn parse_secret(secret: &Secret) -> Result<Vec<(ServerPattern, Auth)>> {
        let auths = if let Some(raw) = secret.decoded(DOCKER_CONFIG_JSON_KEY)? {
            serde_json::from_slice::<DockerConfigJson>(&raw)
                .map_err(|e| ProviderError::DockerConfigError(e.to_string()))?
                .auths
        } else if let Some(raw) = secret.decoded(DOCKER_CFG_KEY)? {
            serde_json::from_slice::<HashMap<String, AuthEntry>>(&raw)
                .map_err(|e| ProviderError::DockerConfigError(e.to_string()))?
        } else {
            return Err(ProviderError::DockerConfigError(format!(
                "secret has neither a {DOCKER_CONFIG_JSON_KEY} nor a {DOCKER_CFG_KEY} entry"
            )));
        };

        // HashMap iteration order is random, sort to keep matching stable.
        let mut auths: Vec<_> = auths.into_iter().collect();
        auths.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(auths
            .into_iter()
            .filter_map(|(server, entry)| {
                let pattern = ServerPattern::parse(&server)?;
                match entry.to_auth() {
                    Some(auth) => Some((pattern, auth)),
                    None => {
                        debug!(server, "docker config entry has no usable credentials");
                        None
                    }
                }
            })
            .collect())
    }
}

impl CredentialProvider for PullSecretProvider {
    fn name(&self) -> &str {
        "image-pull-secrets"
    }

    fn resolve_credentials_for(&self, image: &OciReference) -> Option<Auth> {
        let host = normalize_host(image.registry());
        let repository = image.repository();

        let mut best: Option<&(ServerPattern, Auth)> = None;
        for entry in &self.entries {
            if !entry.0.matches(&host, repository) {
                continue;
            }
            if best.map_or(true, |b| entry.0.path.len() > b.0.path.len()) {
                best = Some(entry);
            }
        }
        best.map(|(_, auth)| auth.clone())
    }
}
