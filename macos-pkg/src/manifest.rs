// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Remote install manifests.
//!
//! MDM `InstallApplication` and `InstallEnterpriseApplication` commands
//! point a device at a package URL plus a manifest describing the expected
//! download: its size and an MD5 or SHA-256 digest. `InstallApplication`
//! checks MD5; `InstallEnterpriseApplication` checks SHA-256.

use {
    crate::PkgResult,
    md5::Md5,
    serde::{Deserialize, Serialize},
    sha2::{Digest, Sha256},
};

/// Asset kind for installer packages.
pub const ASSET_KIND_SOFTWARE_PACKAGE: &str = "software-package";

/// Which digest a manifest carries.
///
/// Use [Self::Md5] for `InstallApplication` commands and [Self::Sha256]
/// for `InstallEnterpriseApplication` commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManifestDigest {
    Md5,
    Sha256,
}

/// A downloadable artifact within a manifest item.
///
/// Exactly one of the MD5 and SHA-256 field pairs is populated; the other
/// pair is omitted from serialized output.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Asset {
    pub kind: String,

    #[serde(
        default,
        rename = "md5-size",
        skip_serializing_if = "Option::is_none"
    )]
    pub md5_size: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5s: Option<Vec<String>>,

    #[serde(
        default,
        rename = "sha256-size",
        skip_serializing_if = "Option::is_none"
    )]
    pub sha256_size: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256s: Option<Vec<String>>,

    pub url: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Item {
    pub assets: Vec<Asset>,
}

/// The manifest document consumed by MDM install commands.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Manifest {
    pub items: Vec<Item>,
}

impl Manifest {
    /// Describe a finished (signed) package hosted at `url`.
    pub fn new(pkg: &[u8], url: impl ToString, digest: ManifestDigest) -> Self {
        let mut asset = Asset {
            kind: ASSET_KIND_SOFTWARE_PACKAGE.to_string(),
            md5_size: None,
            md5s: None,
            sha256_size: None,
            sha256s: None,
            url: url.to_string(),
        };

        match digest {
            ManifestDigest::Md5 => {
                asset.md5_size = Some(pkg.len() as u64);
                asset.md5s = Some(vec![hex::encode(Md5::digest(pkg))]);
            }
            ManifestDigest::Sha256 => {
                asset.sha256_size = Some(pkg.len() as u64);
                asset.sha256s = Some(vec![hex::encode(Sha256::digest(pkg))]);
            }
        }

        Self {
            items: vec![Item {
                assets: vec![asset],
            }],
        }
    }

    /// Serialize to an XML property list.
    pub fn to_xml_plist(&self) -> PkgResult<Vec<u8>> {
        let mut buffer = Vec::new();
        plist::to_writer_xml(&mut buffer, self)?;

        Ok(buffer)
    }
}

/// Describe a finished (signed) package hosted at `url`.
pub fn build_manifest(pkg: &[u8], url: impl ToString, digest: ManifestDigest) -> Manifest {
    Manifest::new(pkg, url, digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://example.com/packages/test.pkg";

    #[test]
    fn md5_manifest_matches_independent_digest() {
        let pkg = b"not really a package".as_slice();
        let manifest = build_manifest(pkg, URL, ManifestDigest::Md5);

        let asset = &manifest.items[0].assets[0];
        assert_eq!(asset.kind, "software-package");
        assert_eq!(asset.url, URL);
        assert_eq!(asset.md5_size, Some(pkg.len() as u64));
        assert_eq!(
            asset.md5s.as_deref(),
            Some(&[hex::encode(Md5::digest(pkg))][..])
        );
        assert!(asset.sha256_size.is_none());
        assert!(asset.sha256s.is_none());
    }

    #[test]
    fn sha256_manifest_matches_independent_digest() {
        let pkg = b"not really a package".as_slice();
        let manifest = build_manifest(pkg, URL, ManifestDigest::Sha256);

        let asset = &manifest.items[0].assets[0];
        assert_eq!(asset.sha256_size, Some(pkg.len() as u64));
        assert_eq!(
            asset.sha256s.as_deref(),
            Some(&[hex::encode(Sha256::digest(pkg))][..])
        );
        assert!(asset.md5_size.is_none());
        assert!(asset.md5s.is_none());
    }

    #[test]
    fn serialized_field_names_are_exact() {
        let manifest = build_manifest(b"bytes", URL, ManifestDigest::Md5);

        let value = serde_json::to_value(&manifest).unwrap();
        let asset = &value["items"][0]["assets"][0];

        let keys = asset
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect::<Vec<_>>();
        assert_eq!(keys, vec!["kind", "md5-size", "md5s", "url"]);

        let manifest = build_manifest(b"bytes", URL, ManifestDigest::Sha256);
        let value = serde_json::to_value(&manifest).unwrap();
        let asset = &value["items"][0]["assets"][0];
        let keys = asset
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect::<Vec<_>>();
        assert_eq!(keys, vec!["kind", "sha256-size", "sha256s", "url"]);
    }

    #[test]
    fn plist_serialization_carries_digest_fields() {
        let manifest = build_manifest(b"bytes", URL, ManifestDigest::Sha256);

        let plist = manifest.to_xml_plist().unwrap();
        let text = std::str::from_utf8(&plist).unwrap();

        assert!(text.contains("<key>sha256s</key>"));
        assert!(text.contains("<key>sha256-size</key>"));
        assert!(!text.contains("<key>md5s</key>"));
    }
}
