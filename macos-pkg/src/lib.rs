// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! macOS flat package (`.pkg`) building, signing, and verification.
//!
//! # File Format
//!
//! Flat packages are Apple-flavored XAR archives. XAR is a tar-like file
//! format consisting of file records/metadata and raw file data. See the
//! `xar-archive` crate for more on this file format.
//!
//! This crate produces the payload-free *product* flavor of flat package
//! used for unattended enterprise deployment: a `Distribution` XML file
//! describing the installer, a single component whose `PackageInfo`
//! declares no payload, and a `Scripts` archive (a gzip compressed cpio
//! archive, see the `cpio-odc` crate) holding a `postinstall` script.
//!
//! # Cryptographic Signing
//!
//! Installer checks an `RSA` signature embedded in the XAR table of
//! contents. The signature is made over the ToC checksum with a raw RSA
//! PKCS#1 v1.5 primitive and travels with the full certificate chain of the
//! signing `Developer ID Installer` identity. [verify_package] accepts a
//! package when both the signature verifies against the leaf certificate
//! and the chain terminates in the embedded Apple root certificate.
//!
//! # Remote Install Manifests
//!
//! MDM `InstallApplication` and `InstallEnterpriseApplication` commands
//! fetch packages from a URL and check them against a small hash manifest.
//! [build_manifest] produces that document for a finished signed package.

pub mod certificates;
pub mod component;
pub use component::ComponentPackageReader;
pub mod distribution;
pub use distribution::Distribution;
pub mod manifest;
pub use manifest::{build_manifest, Asset, Item, Manifest, ManifestDigest};
pub mod package;
pub use package::{build_package, sign_package, verify_package};
pub mod package_info;
pub use package_info::PackageInfo;
pub mod reader;
pub use reader::{PkgFlavor, PkgReader};

#[cfg(test)]
mod testutil;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("xar error: {0}")]
    Xar(#[from] xar_archive::Error),

    #[error("cpio archive error: {0}")]
    Cpio(#[from] cpio_odc::Error),

    #[error("XML error: {0}")]
    SerdeXml(#[from] serde_xml_rs::Error),

    #[error("XML write error: {0}")]
    XmlWrite(#[from] xml::writer::Error),

    #[error("plist error: {0}")]
    Plist(#[from] plist::Error),

    #[error("package is corrupted: {0}")]
    CorruptArchive(#[source] xar_archive::Error),

    #[error("package is not signed")]
    NotSigned,

    #[error("package signature is invalid")]
    InvalidSignature,

    #[error("certificate chain does not terminate at the trusted root")]
    UntrustedRoot,

    #[error("signing certificate does not match the private key")]
    CertificateKeyMismatch,

    #[error("signing failed: {0}")]
    Signing(#[source] xar_archive::Error),

    #[error("signature of {actual} bytes does not fit reserved slot of {reserved} bytes")]
    SignatureSizeMismatch { reserved: u64, actual: u64 },
}

/// Result type for this crate.
pub type PkgResult<T> = std::result::Result<T, Error>;
