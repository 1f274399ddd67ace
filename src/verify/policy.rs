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

//! Signer identity checks applied to the Fulcio signing certificate.
//!
//! <https://github.com/sigstore/fulcio/blob/main/docs/oid-info.md#extension-values>

use sigstore::bundle::verify::policy::{
    Identity, OIDCIssuer, PolicyError, PolicyResult, SingleX509ExtPolicy, VerificationPolicy,
};
use x509_cert::der::oid::ObjectIdentifier;
use x509_cert::ext::pkix::{name::GeneralName, SubjectAltName};

use super::IdentityConstraints;

const OTHERNAME_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.57264.1.7");

/// The certificate checks implied by a set of [`IdentityConstraints`].
pub enum IdentityPolicy {
    /// Any keyless signer is accepted.
    Unconstrained,
    /// Only the OIDC issuer extension is checked.
    Issuer(OIDCIssuer),
    /// Only the SAN is checked, whatever the issuer.
    Subject(String),
    /// Both the SAN and the OIDC issuer are checked.
    Identity(Identity),
}

impl From<&IdentityConstraints> for IdentityPolicy {
    fn from(constraints: &IdentityConstraints) -> Self {
        match (&constraints.identity, &constraints.issuer) {
            (None, None) => IdentityPolicy::Unconstrained,
            (None, Some(issuer)) => IdentityPolicy::Issuer(OIDCIssuer::new(issuer)),
            (Some(identity), None) => IdentityPolicy::Subject(identity.clone()),
            (Some(identity), Some(issuer)) => {
                IdentityPolicy::Identity(Identity::new(identity, issuer))
            }
        }
    }
}

impl std::fmt::Debug for IdentityPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityPolicy::Unconstrained => f.write_str("Unconstrained"),
            IdentityPolicy::Issuer(issuer) => write!(f, "Issuer({})", issuer.value()),
            IdentityPolicy::Subject(subject) => write!(f, "Subject({subject})"),
            IdentityPolicy::Identity(_) => f.write_str("Identity"),
        }
    }
}

impl VerificationPolicy for IdentityPolicy {
    fn verify(&self, cert: &x509_cert::Certificate) -> PolicyResult {
        match self {
            IdentityPolicy::Unconstrained => Ok(()),
            IdentityPolicy::Issuer(issuer) => issuer.verify(cert),
            IdentityPolicy::Identity(identity) => identity.verify(cert),
            IdentityPolicy::Subject(subject) => {
                let names = subject_alternative_names(cert)?;
                if names.iter().any(|name| name == subject) {
                    Ok(())
                } else {
                    Err(PolicyError::ExtensionCheckFailed {
                        extension: "SubjectAltName".to_owned(),
                        expected: subject.clone(),
                        actual: names.join(", "),
                    })
                }
            }
        }
    }
}

/// Email, URI and Sigstore "other name" entries of the SAN extension.
fn subject_alternative_names(cert: &x509_cert::Certificate) -> Result<Vec<String>, PolicyError> {
    let (_, san): (bool, SubjectAltName) = match cert.tbs_certificate.get() {
        Ok(Some(result)) => result,
        _ => return Err(PolicyError::ExtensionNotFound),
    };

    Ok(san
        .0
        .iter()
        .filter_map(|name| match name {
            GeneralName::Rfc822Name(name) => Some(name.as_str().to_string()),
            GeneralName::UniformResourceIdentifier(name) => Some(name.as_str().to_string()),
            GeneralName::OtherName(name) if name.type_id == OTHERNAME_OID => {
                std::str::from_utf8(name.value.value()).ok().map(str::to_string)
            }
            _ => None,
        })
        .collect())
}
