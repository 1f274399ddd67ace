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

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{
    CredentialProvider, CredentialSource, DockerConfigProvider, InClusterConnector,
    PullSecretProvider, Secret, SecretStore, SecretStoreConnector,
};
use crate::errors::{Recovered, Result};

pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_SERVICE_ACCOUNT: &str = "default";

/// Turns the names of image pull secrets into a [`CredentialSource`].
///
/// Resolution never fails: the caller always provides a default source and
/// every problem met while reading the secrets degrades to it.
#[derive(Clone)]
pub struct CredentialResolver {
    connector: Arc<dyn SecretStoreConnector>,
    namespace: String,
}

impl CredentialResolver {
    pub fn new(connector: Arc<dyn SecretStoreConnector>, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        CredentialResolver {
            connector,
            namespace: if namespace.is_empty() {
                DEFAULT_NAMESPACE.to_string()
            } else {
                namespace
            },
        }
    }

    /// Resolver reading secrets from the cluster the process runs in.
    pub fn in_cluster(namespace: impl Into<String>) -> Self {
        Self::new(Arc::new(InClusterConnector), namespace)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Builds the source used for one lookup key. The secrets named by the
    /// key take priority over `default_source`.
    pub async fn resolve(
        &self,
        secret_names: &[String],
        default_source: &CredentialSource,
    ) -> Recovered<CredentialSource> {
        if secret_names.is_empty() {
            return Recovered::Clean(default_source.clone());
        }

        let store = match self.connector.connect() {
            Ok(store) => store,
            Err(e) => {
                return Recovered::degraded(
                    default_source.clone(),
                    format!("failed to create cluster client: {e}, using default credentials"),
                )
            }
        };

        let secrets = self.fetch_secrets(store.as_ref(), secret_names).await;
        if secrets.is_empty() {
            return Recovered::degraded(
                default_source.clone(),
                format!(
                    "none of the {} image pull secrets could be read from namespace {}, using default credentials",
                    secret_names.len(),
                    self.namespace
                ),
            );
        }

        debug!(
            fetched = secrets.len(),
            requested = secret_names.len(),
            namespace = self.namespace.as_str(),
            "using image pull secrets"
        );
        let provider: Arc<dyn CredentialProvider> =
            Arc::new(PullSecretProvider::from_secrets(&secrets));
        Recovered::Clean(default_source.with_priority(vec![provider]))
    }

    /// The process wide default chain: local docker configuration first,
    /// then the pull secrets of the namespace's default service account.
    ///
    /// Problems reading the service account are logged and leave the chain
    /// with the docker configuration only.
    pub async fn default_source(&self) -> CredentialSource {
        let mut providers: Vec<Arc<dyn CredentialProvider>> = vec![Arc::new(DockerConfigProvider)];

        match self.service_account_provider(DEFAULT_SERVICE_ACCOUNT).await {
            Ok(Some(provider)) => providers.push(provider),
            Ok(None) => debug!(
                namespace = self.namespace.as_str(),
                "service account has no image pull secrets"
            ),
            Err(e) => warn!(
                error = %e,
                "cannot read image pull secrets of the service account, continuing without them"
            ),
        }

        info!(providers = providers.len(), "default credential chain ready");
        CredentialSource::new(providers)
    }

    async fn service_account_provider(
        &self,
        service_account: &str,
    ) -> Result<Option<Arc<dyn CredentialProvider>>> {
        let store = self.connector.connect()?;
        let sa = store
            .get_service_account(&self.namespace, service_account)
            .await?;

        let names = sa.image_pull_secret_names();
        if names.is_empty() {
            return Ok(None);
        }
        let secrets = self.fetch_secrets(store.as_ref(), &names).await;
        if secrets.is_empty() {
            return Ok(None);
        }
        Ok(Some(Arc::new(PullSecretProvider::from_secrets(&secrets))))
    }

    async fn fetch_secrets(&self, store: &dyn SecretStore, names: &[String]) -> Vec<Secret> {
        let mut secrets = Vec::with_capacity(names.len());
        for name in names {
            match store.get_secret(&self.namespace, name).await {
                Ok(secret) => secrets.push(secret),
                Err(e) => warn!(
                    secret = name.as_str(),
                    namespace = self.namespace.as_str(),
                    error = %e,
                    "failed to get image pull secret"
                ),
            }
        }
        secrets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_client::test::{MockSecretStore, MockSecretStoreConnector};
    use crate::registry::{Auth, OciReference};
    use base64::{engine::general_purpose::STANDARD as BASE64_STD_ENGINE, Engine as _};
    use std::collections::HashMap;

    struct FixedProvider;

    impl CredentialProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        fn resolve_credentials_for(&self, _image: &OciReference) -> Option<Auth> {
            Some(Auth::Basic("default".into(), "default".into()))
        }
    }

    fn default_source() -> CredentialSource {
        CredentialSource::new(vec![Arc::new(FixedProvider)])
    }

    fn pull_secret(name: &str, registry: &str, user: &str) -> Secret {
        let config = serde_json::json!({
            "auths": { registry: {"username": user, "password": "pw"} }
        });
        Secret {
            metadata: crate::credentials::kube::ObjectMeta {
                name: name.to_string(),
                namespace: "apps".to_string(),
            },
            type_: "kubernetes.io/dockerconfigjson".to_string(),
            data: HashMap::from([(
                ".dockerconfigjson".to_string(),
                BASE64_STD_ENGINE.encode(config.to_string()),
            )]),
        }
    }

    fn image() -> OciReference {
        "ghcr.io/acme/app:1.0".parse().unwrap()
    }

    #[tokio::test]
    async fn no_secret_names_returns_default_without_connecting() {
        let connector = Arc::new(MockSecretStoreConnector::unreachable());
        let resolver = CredentialResolver::new(connector.clone(), "apps");

        let recovered = resolver.resolve(&[], &default_source()).await;
        assert!(!recovered.is_degraded());
        assert_eq!(recovered.into_inner().len(), 1);
        assert_eq!(connector.connections(), 0);
    }

    #[tokio::test]
    async fn workload_secrets_take_priority() {
        let store = MockSecretStore::default().with_secret(pull_secret("regcred", "ghcr.io", "workload"));
        let resolver =
            CredentialResolver::new(Arc::new(MockSecretStoreConnector::new(store)), "apps");

        let recovered = resolver
            .resolve(&["regcred".to_string()], &default_source())
            .await;
        assert!(!recovered.is_degraded());
        let source = recovered.into_inner();
        assert_eq!(source.provider_names(), vec!["image-pull-secrets", "fixed"]);
        assert_eq!(
            source.resolve(&image()),
            Auth::Basic("workload".into(), "pw".into())
        );
    }

    #[tokio::test]
    async fn missing_secrets_are_skipped() {
        let store = MockSecretStore::default().with_secret(pull_secret("regcred", "ghcr.io", "workload"));
        let resolver =
            CredentialResolver::new(Arc::new(MockSecretStoreConnector::new(store)), "apps");

        let recovered = resolver
            .resolve(
                &["missing".to_string(), "regcred".to_string()],
                &default_source(),
            )
            .await;
        assert!(!recovered.is_degraded());
        assert_eq!(recovered.into_inner().len(), 2);
    }

    #[tokio::test]
    async fn all_fetches_failing_degrades_to_default() {
        let resolver = CredentialResolver::new(
            Arc::new(MockSecretStoreConnector::new(MockSecretStore::default())),
            "apps",
        );

        let recovered = resolver
            .resolve(&["missing".to_string()], &default_source())
            .await;
        assert!(recovered.is_degraded());
        let source = recovered.into_inner();
        assert_eq!(source.provider_names(), vec!["fixed"]);
    }

    #[tokio::test]
    async fn connection_failure_degrades_to_default() {
        let resolver =
            CredentialResolver::new(Arc::new(MockSecretStoreConnector::unreachable()), "apps");

        let recovered = resolver
            .resolve(&["regcred".to_string()], &default_source())
            .await;
        match recovered {
            Recovered::Degraded { value, warning } => {
                assert_eq!(value.provider_names(), vec!["fixed"]);
                assert!(warning.contains("failed to create cluster client"));
            }
            Recovered::Clean(_) => panic!("expected a degraded result"),
        }
    }

    #[tokio::test]
    async fn default_source_includes_service_account_secrets() {
        let store = MockSecretStore::default()
            .with_secret(pull_secret("sa-secret", "ghcr.io", "sa-user"))
            .with_service_account("default", &["sa-secret"]);
        let resolver =
            CredentialResolver::new(Arc::new(MockSecretStoreConnector::new(store)), "apps");

        let source = resolver.default_source().await;
        assert_eq!(
            source.provider_names(),
            vec!["docker-config", "image-pull-secrets"]
        );
    }

    #[tokio::test]
    async fn default_source_without_cluster_is_docker_config_only() {
        let resolver =
            CredentialResolver::new(Arc::new(MockSecretStoreConnector::unreachable()), "");
        assert_eq!(resolver.namespace(), DEFAULT_NAMESPACE);

        let source = resolver.default_source().await;
        assert_eq!(source.provider_names(), vec!["docker-config"]);
    }
}
