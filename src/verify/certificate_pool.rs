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

use std::time::Duration;

use rustls::pki_types::{CertificateDer, TrustAnchor, UnixTime};
use webpki::{EndEntityCert, KeyUsage};

/// `id-kp-codeSigning`, 1.3.6.1.5.5.7.3.3
const EKU_CODE_SIGNING: &[u8] = &[0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x03, 0x03];

/// Fulcio certificate authorities the signing certificates must chain to.
#[derive(Default, Debug)]
pub(crate) struct CertificatePool {
    trusted_roots: Vec<TrustAnchor<'static>>,
}

impl CertificatePool {
    /// Every certificate of `trusted_roots` becomes a trust anchor.
    pub fn from_certificates<'r, R>(trusted_roots: R) -> Result<Self, webpki::Error>
    where
        R: IntoIterator<Item = CertificateDer<'r>>,
    {
        Ok(CertificatePool {
            trusted_roots: trusted_roots
                .into_iter()
                .map(|der| Ok(webpki::anchor_from_trusted_cert(&der)?.to_owned()))
                .collect::<Result<Vec<_>, webpki::Error>>()?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.trusted_roots.is_empty()
    }

    /// Ensures `leaf` is a code signing certificate issued by one of the
    /// trusted roots, possibly through `intermediates`.
    ///
    /// Fulcio certificates only live for a few minutes: `verification_time`
    /// is the UNIX time the signature was made at, not the current time.
    pub fn verify(
        &self,
        leaf: &[u8],
        intermediates: &[CertificateDer<'_>],
        verification_time: u64,
    ) -> Result<(), webpki::Error> {
        let leaf = CertificateDer::from(leaf);
        let cert = EndEntityCert::try_from(&leaf)?;

        cert.verify_for_usage(
            webpki::ALL_VERIFICATION_ALGS,
            &self.trusted_roots,
            intermediates,
            UnixTime::since_unix_epoch(Duration::from_secs(verification_time)),
            KeyUsage::required(EKU_CODE_SIGNING),
            None,
            None,
        )
        .map(|_| ())
    }
}
