// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Embedded trust anchors.
//!
//! Package signatures travel with their certificate chain, ordered
//! [signing leaf, Developer ID Certification Authority, Apple root]. The
//! two CA certificates are fixed, well-known documents, so they ship with
//! the library: signing embeds them in the emitted chain and verification
//! requires the presented chain to terminate in a byte-identical copy of
//! the root.
//!
//! The canonical source of this data is <https://www.apple.com/certificateauthority/>.

use {once_cell::sync::Lazy, x509_certificate::CapturedX509Certificate};

/// DER encoding of the Apple Inc. Root certificate.
pub static APPLE_ROOT_CA_DER: &[u8] = include_bytes!("certs/AppleIncRootCertificate.cer");

/// DER encoding of the Developer ID Certification Authority certificate.
pub static DEVELOPER_ID_CA_DER: &[u8] = include_bytes!("certs/DeveloperIDCA.cer");

static APPLE_ROOT_CA: Lazy<CapturedX509Certificate> =
    Lazy::new(|| CapturedX509Certificate::from_der(APPLE_ROOT_CA_DER.to_vec()).unwrap());

static DEVELOPER_ID_CA: Lazy<CapturedX509Certificate> =
    Lazy::new(|| CapturedX509Certificate::from_der(DEVELOPER_ID_CA_DER.to_vec()).unwrap());

/// Apple Inc. Root certificate.
///
/// Certificate chains on verified packages must end with this certificate.
pub fn apple_root_ca() -> &'static CapturedX509Certificate {
    &APPLE_ROOT_CA
}

/// Developer ID Certification Authority certificate.
///
/// The issuer of `Developer ID Installer` signing certificates. Embedded
/// into emitted chains as the intermediate between the signing leaf and the
/// root.
pub fn developer_id_ca() -> &'static CapturedX509Certificate {
    &DEVELOPER_ID_CA
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_certificates_parse() {
        assert_eq!(apple_root_ca().constructed_data(), APPLE_ROOT_CA_DER);
        assert_eq!(developer_id_ca().constructed_data(), DEVELOPER_ID_CA_DER);
    }
}
