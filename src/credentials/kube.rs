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

//! Read access to the Kubernetes objects holding image pull secrets.
//!
//! Only the two `GET` calls needed by the provider are implemented, talking
//! to the API server's REST interface with the pod's service account.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_STD_ENGINE, Engine as _};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::debug;
use url::Url;

use crate::errors::{ProviderError, Result};

pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";
const SERVICE_HOST_ENV: &str = "KUBERNETES_SERVICE_HOST";
const SERVICE_PORT_ENV: &str = "KUBERNETES_SERVICE_PORT";

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

/// A `v1/Secret`. Values of `data` are base64 encoded.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct Secret {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(rename = "type", default)]
    pub type_: String,
    #[serde(default)]
    pub data: HashMap<String, String>,
}

impl Secret {
    /// Decoded value of `key`, `None` when the secret doesn't have it.
    pub fn decoded(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.data
            .get(key)
            .map(|value| {
                BASE64_STD_ENGINE.decode(value).map_err(|e| {
                    ProviderError::DockerConfigError(format!(
                        "secret {}: cannot decode {key}: {e}",
                        self.metadata.name
                    ))
                })
            })
            .transpose()
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalObjectReference {
    #[serde(default)]
    pub name: String,
}

/// A `v1/ServiceAccount`, reduced to the fields used here.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccount {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub image_pull_secrets: Vec<LocalObjectReference>,
}

impl ServiceAccount {
    pub fn image_pull_secret_names(&self) -> Vec<String> {
        self.image_pull_secrets
            .iter()
            .filter(|r| !r.name.is_empty())
            .map(|r| r.name.clone())
            .collect()
    }
}

/// Read access to secrets and service accounts.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret>;

    async fn get_service_account(&self, namespace: &str, name: &str) -> Result<ServiceAccount>;
}

/// Creates [`SecretStore`] instances. Connecting can fail, e.g. when the
/// process doesn't run inside of a cluster.
pub trait SecretStoreConnector: Send + Sync {
    fn connect(&self) -> Result<Arc<dyn SecretStore>>;
}

/// Connects to the API server of the cluster the pod runs in.
#[derive(Debug, Default, Clone)]
pub struct InClusterConnector;

impl SecretStoreConnector for InClusterConnector {
    fn connect(&self) -> Result<Arc<dyn SecretStore>> {
        Ok(Arc::new(KubeSecretStore::in_cluster()?))
    }
}

/// [`SecretStore`] talking to the Kubernetes REST API.
#[derive(Debug, Clone)]
pub struct KubeSecretStore {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl KubeSecretStore {
    pub fn new(base_url: Url, token: Option<String>, client: reqwest::Client) -> Self {
        KubeSecretStore {
            client,
            base_url,
            token,
        }
    }

    /// Configuration from the service account mounted inside of the pod and
    /// the `KUBERNETES_SERVICE_*` environment variables.
    pub fn in_cluster() -> Result<Self> {
        let (host, port) = match (
            std::env::var(SERVICE_HOST_ENV),
            std::env::var(SERVICE_PORT_ENV),
        ) {
            (Ok(host), Ok(port)) if !host.is_empty() && !port.is_empty() => (host, port),
            _ => {
                return Err(ProviderError::ClusterConnectionError(format!(
                    "unable to load in-cluster configuration, {SERVICE_HOST_ENV} and {SERVICE_PORT_ENV} must be defined"
                )))
            }
        };
        let host = if host.contains(':') {
            format!("[{host}]")
        } else {
            host
        };
        let base_url = Url::parse(&format!("https://{host}:{port}"))
            .map_err(|e| ProviderError::ClusterConnectionError(e.to_string()))?;

        let token = std::fs::read_to_string(format!("{SERVICE_ACCOUNT_DIR}/token"))
            .map_err(|e| {
                ProviderError::ClusterConnectionError(format!("cannot read service account token: {e}"))
            })?;
        let ca = std::fs::read(format!("{SERVICE_ACCOUNT_DIR}/ca.crt")).map_err(|e| {
            ProviderError::ClusterConnectionError(format!("cannot read cluster CA: {e}"))
        })?;
        let ca = reqwest::Certificate::from_pem(&ca)
            .map_err(|e| ProviderError::ClusterConnectionError(format!("invalid cluster CA: {e}")))?;

        let client = reqwest::Client::builder()
            .add_root_certificate(ca)
            .build()
            .map_err(|e| ProviderError::ClusterConnectionError(e.to_string()))?;

        Ok(Self::new(base_url, Some(token.trim().to_string()), client))
    }

    fn object_url(&self, namespace: &str, plural: &str, name: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ProviderError::ClusterConnectionError(format!(
                    "{} cannot be used as API server address",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(["api", "v1", "namespaces", namespace, plural, name]);
        Ok(url)
    }

    async fn get_object<T: DeserializeOwned>(
        &self,
        kind: &'static str,
        plural: &str,
        namespace: &str,
        name: &str,
    ) -> Result<T> {
        let object_error = |error: String| ProviderError::ClusterObjectError {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
            error,
        };

        let url = self.object_url(namespace, plural, name)?;
        debug!(%url, kind, "fetching object from the API server");

        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(object_error(format!("{status}: {body}")));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| object_error(e.to_string()))
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret> {
        self.get_object("Secret", "secrets", namespace, name).await
    }

    async fn get_service_account(&self, namespace: &str, name: &str) -> Result<ServiceAccount> {
        self.get_object("ServiceAccount", "serviceaccounts", namespace, name)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn store(server: &MockServer) -> KubeSecretStore {
        KubeSecretStore::new(
            Url::parse(&server.base_url()).unwrap(),
            Some("sa-token".to_string()),
            reqwest::Client::new(),
        )
    }

    #[tokio::test]
    async fn get_secret_uses_service_account_token() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v1/namespaces/apps/secrets/regcred")
                    .header("authorization", "Bearer sa-token");
                then.status(200).json_body(json!({
                    "apiVersion": "v1",
                    "kind": "Secret",
                    "metadata": {"name": "regcred", "namespace": "apps"},
                    "type": "kubernetes.io/dockerconfigjson",
                    "data": {".dockerconfigjson": BASE64_STD_ENGINE.encode("{\"auths\":{}}")}
                }));
            })
            .await;

        let secret = store(&server).get_secret("apps", "regcred").await.unwrap();
        mock.assert_async().await;
        assert_eq!(secret.metadata.name, "regcred");
        assert_eq!(secret.type_, "kubernetes.io/dockerconfigjson");
        assert_eq!(
            secret.decoded(".dockerconfigjson").unwrap(),
            Some(b"{\"auths\":{}}".to_vec())
        );
        assert_eq!(secret.decoded("missing").unwrap(), None);
    }

    #[tokio::test]
    async fn missing_secret_is_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/namespaces/apps/secrets/nope");
                then.status(404).body("secrets \"nope\" not found");
            })
            .await;

        let err = store(&server).get_secret("apps", "nope").await.unwrap_err();
        match err {
            ProviderError::ClusterObjectError {
                kind,
                namespace,
                name,
                error,
            } => {
                assert_eq!(kind, "Secret");
                assert_eq!(namespace, "apps");
                assert_eq!(name, "nope");
                assert!(error.contains("404"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn get_service_account_lists_pull_secrets() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v1/namespaces/default/serviceaccounts/default");
                then.status(200).json_body(json!({
                    "metadata": {"name": "default", "namespace": "default"},
                    "imagePullSecrets": [{"name": "regcred"}, {"name": ""}, {"name": "mirror"}]
                }));
            })
            .await;

        let sa = store(&server)
            .get_service_account("default", "default")
            .await
            .unwrap();
        assert_eq!(sa.image_pull_secret_names(), vec!["regcred", "mirror"]);
    }
}
