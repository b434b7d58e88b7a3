// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Building, signing, and verifying flat packages.

use {
    crate::{
        certificates, distribution::Distribution, package_info::PackageInfo, Error, PkgResult,
    },
    cpio_odc::OdcBuilder,
    flate2::{write::GzEncoder, Compression},
    log::info,
    rsa::{pkcs1::DecodeRsaPublicKey, RsaPrivateKey, RsaPublicKey},
    std::io::{Cursor, Write},
    x509_certificate::CapturedX509Certificate,
    xar_archive::{
        reader::XarReader,
        signing::XarSigner,
        writer::{XarCompression, XarWriter},
    },
};

/// Mode recorded for the postinstall script: a regular, executable file.
const POSTINSTALL_MODE: u32 = 0o100755;

/// The `admin` group on macOS.
const POSTINSTALL_GID: u32 = 80;

/// Build an unsigned, payload-free flat package running a postinstall script.
///
/// The result is a *product* archive: a `Distribution` describing a single
/// hidden choice, and a `payload.pkg` component whose `PackageInfo` declares
/// an empty payload plus the `postinstall` script carried in `Scripts`.
pub fn build_package(
    identifier: &str,
    version: &str,
    postinstall: &[u8],
) -> PkgResult<Vec<u8>> {
    let distribution = Distribution::script_package(identifier, version).to_xml()?;
    let package_info = PackageInfo::script_package(identifier, version).to_xml()?;
    let scripts = scripts_archive(postinstall)?;

    let mut writer = XarWriter::new();
    writer.add_file("Distribution", &distribution, XarCompression::None)?;
    writer.add_file(
        "payload.pkg/PackageInfo",
        &package_info,
        XarCompression::None,
    )?;
    writer.add_file("payload.pkg/Scripts", &scripts, XarCompression::Gzip)?;

    let mut out = Vec::new();
    writer.write_to(&mut out)?;

    info!(
        "built {} byte package for {} {}",
        out.len(),
        identifier,
        version
    );

    Ok(out)
}

/// Produce the `Scripts` member: a gzip compressed odc cpio archive holding
/// the postinstall script as a root owned executable.
fn scripts_archive(postinstall: &[u8]) -> PkgResult<Vec<u8>> {
    let mut builder = OdcBuilder::new(Vec::new());
    builder.append_file(
        "./postinstall",
        POSTINSTALL_MODE,
        0,
        POSTINSTALL_GID,
        postinstall,
    )?;
    let archive = builder.finish()?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&archive)?;

    Ok(encoder.finish()?)
}

/// Sign a flat package with a `Developer ID Installer` identity.
///
/// The emitted chain is [`certificate`, Developer ID CA, Apple root]. The
/// input bytes are never modified; a freshly signed archive is returned.
pub fn sign_package(
    pkg: &[u8],
    certificate: &CapturedX509Certificate,
    key: &RsaPrivateKey,
) -> PkgResult<Vec<u8>> {
    let public_key = RsaPublicKey::from_pkcs1_der(certificate.public_key_data().as_ref())
        .map_err(|_| Error::CertificateKeyMismatch)?;
    if public_key != key.to_public_key() {
        return Err(Error::CertificateKeyMismatch);
    }

    let reader = XarReader::new(Cursor::new(pkg))?;
    let mut signer = XarSigner::new(reader);

    let chain = [
        certificates::developer_id_ca().clone(),
        certificates::apple_root_ca().clone(),
    ];

    let mut out = Vec::new();
    signer
        .sign(&mut out, key, certificate, chain.into_iter())
        .map_err(|e| match e {
            xar_archive::Error::SignatureSizeMismatch { reserved, actual } => {
                Error::SignatureSizeMismatch { reserved, actual }
            }
            e => Error::Signing(e),
        })?;

    Ok(out)
}

/// Verify a signed flat package.
///
/// Verification is two-tier and deliberately not general PKI path
/// validation. The RSA signature must verify over the recomputed ToC digest
/// against the public key of the first chain certificate, and the *last*
/// chain certificate must be byte-identical to the embedded Apple root.
/// There is no expiry, revocation, or issuer/subject chaining check beyond
/// these two.
///
/// Errors distinguish an unsigned package ([Error::NotSigned]) from a
/// signed-but-untrustworthy one ([Error::InvalidSignature],
/// [Error::UntrustedRoot]) and from corruption ([Error::CorruptArchive]).
pub fn verify_package(pkg: &[u8]) -> PkgResult<()> {
    let mut reader = XarReader::new(Cursor::new(pkg)).map_err(Error::CorruptArchive)?;

    reader
        .verify_table_of_contents_digest()
        .map_err(Error::CorruptArchive)?;
    reader
        .verify_file_checksums()
        .map_err(Error::CorruptArchive)?;

    let (signature, chain) = match reader.rsa_signature().map_err(Error::CorruptArchive)? {
        Some(present) => present,
        None => return Err(Error::NotSigned),
    };

    // A reserved slot that was never committed holds zeros: present in the
    // ToC, but not a signature.
    if signature.iter().all(|b| *b == 0) || chain.is_empty() {
        return Err(Error::NotSigned);
    }

    match reader.verify_rsa_checksum_signature() {
        Ok(true) => {}
        Ok(false) => return Err(Error::NotSigned),
        Err(xar_archive::Error::SignatureVerification | xar_archive::Error::RsaKey(_)) => {
            return Err(Error::InvalidSignature)
        }
        Err(e) => return Err(Error::CorruptArchive(e)),
    }

    if let Some(root) = chain.last() {
        if root.constructed_data() != certificates::APPLE_ROOT_CA_DER {
            return Err(Error::UntrustedRoot);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{component::ComponentPackageReader, testutil},
        rsa::Pkcs1v15Sign,
        sha1::{Digest, Sha1},
        std::io::Read,
        xar_archive::{
            signing,
            table_of_contents::ChecksumType,
            writer::SignatureReservation,
        },
    };

    const POSTINSTALL: &[u8] = b"#!/bin/bash\necho hi\n";

    fn build() -> Vec<u8> {
        build_package("com.example.test", "1.0.0", POSTINSTALL).unwrap()
    }

    fn sign(pkg: &[u8]) -> Vec<u8> {
        sign_package(pkg, &testutil::rsa_cert(), &testutil::rsa_private_key()).unwrap()
    }

    #[test]
    fn built_package_has_expected_layout() {
        let pkg = build();
        let mut reader = XarReader::new(Cursor::new(pkg)).unwrap();

        let paths = reader
            .files()
            .unwrap()
            .into_iter()
            .map(|(path, _)| path)
            .collect::<Vec<_>>();
        assert_eq!(
            paths,
            vec![
                "Distribution",
                "payload.pkg",
                "payload.pkg/PackageInfo",
                "payload.pkg/Scripts"
            ]
        );

        // Metadata documents are stored; Scripts is the one compressed entry.
        for (path, encoding) in [
            ("Distribution", "application/octet-stream"),
            ("payload.pkg/PackageInfo", "application/octet-stream"),
            ("payload.pkg/Scripts", "application/x-gzip"),
        ] {
            let file = reader.find_file(path).unwrap().unwrap();
            assert_eq!(file.data.unwrap().encoding.style, encoding, "{}", path);
        }

        let distribution = reader
            .get_file_data_from_path("Distribution")
            .unwrap()
            .unwrap();
        let distribution =
            Distribution::from_xml(std::str::from_utf8(&distribution).unwrap()).unwrap();
        assert_eq!(distribution.pkg_ref[0].id, "com.example.test");
        assert_eq!(distribution.pkg_ref[0].version.as_deref(), Some("1.0.0"));

        let package_info = reader
            .get_file_data_from_path("payload.pkg/PackageInfo")
            .unwrap()
            .unwrap();
        let package_info =
            PackageInfo::from_xml(std::str::from_utf8(&package_info).unwrap()).unwrap();
        assert_eq!(package_info.identifier, "com.example.test");
        assert_eq!(package_info.payload.unwrap().number_of_files, 0);

        // Scripts is a gzip compressed cpio archive holding the script.
        let scripts = reader
            .get_file_data_from_path("payload.pkg/Scripts")
            .unwrap()
            .unwrap();
        let component = ComponentPackageReader::from_file_data(None, Some(scripts)).unwrap();
        let mut cpio = component.scripts_reader().unwrap().unwrap();

        let header = cpio.read_next().unwrap().unwrap();
        assert_eq!(header.name(), "./postinstall");
        assert_eq!(header.mode(), 0o100755);
        assert_eq!(header.uid(), 0);
        assert_eq!(header.gid(), 80);

        let mut content = Vec::new();
        cpio.read_to_end(&mut content).unwrap();
        assert_eq!(content, POSTINSTALL);

        assert!(cpio.read_next().unwrap().is_none());
    }

    #[test]
    fn round_trip_sign_and_verify() {
        let signed = sign(&build());

        verify_package(&signed).unwrap();

        // The emitted chain is leaf, intermediate, root.
        let mut reader = XarReader::new(Cursor::new(signed)).unwrap();
        let (_, chain) = reader.rsa_signature().unwrap().unwrap();
        assert_eq!(chain.len(), 3);
        assert_eq!(
            chain[1].constructed_data(),
            certificates::DEVELOPER_ID_CA_DER
        );
        assert_eq!(chain[2].constructed_data(), certificates::APPLE_ROOT_CA_DER);
    }

    #[test]
    fn unsigned_package_is_detected() {
        assert!(matches!(
            verify_package(&build()),
            Err(Error::NotSigned)
        ));
    }

    #[test]
    fn tampering_is_detected() {
        let signed = sign(&build());

        verify_package(&signed).unwrap();

        // Flip one byte at a time across the archive: inside the compressed
        // ToC, the stored digest, the signature, and file data. None may
        // verify.
        let probes = [
            40,                // compressed ToC
            signed.len() / 2,  // signature slot or early heap
            signed.len() - 1,  // last file data byte
        ];

        for position in probes {
            let mut tampered = signed.clone();
            tampered[position] ^= 0x01;

            let outcome = verify_package(&tampered);
            assert!(
                matches!(
                    outcome,
                    Err(Error::CorruptArchive(_)) | Err(Error::InvalidSignature)
                ),
                "byte {} flip: {:?}",
                position,
                outcome
            );
        }

        // Flipping a file data byte specifically trips the entry checksum.
        let mut tampered = signed.clone();
        let last = tampered.len() - 1;
        tampered[last] ^= 0x01;
        assert!(matches!(
            verify_package(&tampered),
            Err(Error::CorruptArchive(xar_archive::Error::FileChecksumMismatch(_)))
        ));
    }

    #[test]
    fn chain_not_ending_at_trusted_root_is_rejected() {
        // Sign with a chain consisting of only the leaf. The RSA signature
        // itself verifies, but the chain does not end at the embedded root.
        let pkg = build();
        let reader = XarReader::new(Cursor::new(pkg.as_slice())).unwrap();
        let mut signer = XarSigner::new(reader);

        let mut out = Vec::new();
        signer
            .sign(
                &mut out,
                &testutil::rsa_private_key(),
                &testutil::rsa_cert(),
                std::iter::empty(),
            )
            .unwrap();

        let mut reader = XarReader::new(Cursor::new(out.as_slice())).unwrap();
        assert!(reader.verify_rsa_checksum_signature().unwrap());

        assert!(matches!(verify_package(&out), Err(Error::UntrustedRoot)));
    }

    #[test]
    fn placeholder_signature_slot_is_not_signed() {
        let mut writer = XarWriter::new();
        writer
            .add_file("Distribution", b"<installer-gui-script/>", XarCompression::None)
            .unwrap();
        writer.reserve_signature(SignatureReservation {
            style: xar_archive::table_of_contents::SignatureStyle::Rsa,
            size: 256,
            certificates: vec![testutil::rsa_cert()],
        });

        let mut out = Vec::new();
        writer.write_to(&mut out).unwrap();

        assert!(matches!(verify_package(&out), Err(Error::NotSigned)));
    }

    #[test]
    fn mismatched_identity_is_rejected() {
        // The Developer ID CA certificate does not hold the test key.
        let outcome = sign_package(
            &build(),
            certificates::developer_id_ca(),
            &testutil::rsa_private_key(),
        );

        assert!(matches!(outcome, Err(Error::CertificateKeyMismatch)));
    }

    #[test]
    fn raw_primitive_matches_prehashed_reference() {
        // The signature over the explicit DigestInfo with the raw primitive
        // must equal what the prehashed PKCS#1 v1.5 mode produces for the
        // bare digest. Divergence here silently breaks interoperability.
        let key = testutil::rsa_private_key();
        let digest: [u8; 20] = Sha1::digest(b"table of contents stand-in").into();

        let digest_info = signing::digest_info(ChecksumType::Sha1, &digest).unwrap();
        let raw = key
            .sign(Pkcs1v15Sign::new_unprefixed(), &digest_info)
            .unwrap();
        let reference = key.sign(Pkcs1v15Sign::new::<Sha1>(), &digest).unwrap();

        assert_eq!(raw, reference);
    }
}
