// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! XAR signing.
//!
//! A XAR RSA signature is made over the ToC checksum, which itself is a
//! digest of the compressed table of contents.
//!
//! There is some trickiness to avoid a circular dependency when signing. The
//! signature itself is stored at the beginning of the heap, which shifts the
//! offsets of file entries within the heap. Metadata about the signature -
//! its offset, size, and public certificates - is included in the table of
//! contents and is digested. So the signature's size and certificate chain
//! must be fixed in the ToC *before* the signature exists. We reserve a
//! zero filled slot of the final size, digest and sign, then commit the
//! signature bytes into the slot without altering any length.
//!
//! The signed bytes are not a plain digest: they are a DER `DigestInfo`
//! structure wrapping the ToC digest, and they are passed to the RSA
//! PKCS#1 v1.5 primitive in raw mode, with no additional hashing inside the
//! primitive. Installer-compatible verifiers check exactly this
//! construction; hashing the DigestInfo again would produce a signature
//! that never verifies.

use {
    crate::{
        format::{XarChecksum, XarHeader},
        reader::XarReader,
        table_of_contents::{Checksum, ChecksumType, File, KeyInfo, Signature, SignatureStyle},
        Error, XarResult,
    },
    flate2::{write::ZlibEncoder, Compression},
    log::{debug, info},
    rsa::{traits::PublicKeyParts, Pkcs1v15Sign, RsaPrivateKey},
    scroll::IOwrite,
    std::{
        collections::HashMap,
        fmt::Debug,
        io::{Read, Seek, Write},
    },
    x509_certificate::CapturedX509Certificate,
};

/// DER prefix of a `DigestInfo` structure identifying SHA-1.
const DIGEST_INFO_PREFIX_SHA1: &[u8] = &[
    0x30, 0x21, 0x30, 0x09, 0x06, 0x05, 0x2b, 0x0e, 0x03, 0x02, 0x1a, 0x05, 0x00, 0x04, 0x14,
];

/// DER prefix of a `DigestInfo` structure identifying SHA-256.
const DIGEST_INFO_PREFIX_SHA256: &[u8] = &[
    0x30, 0x31, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01,
    0x05, 0x00, 0x04, 0x20,
];

/// DER prefix of a `DigestInfo` structure identifying SHA-512.
const DIGEST_INFO_PREFIX_SHA512: &[u8] = &[
    0x30, 0x51, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x03,
    0x05, 0x00, 0x04, 0x40,
];

/// DER prefix of a `DigestInfo` structure identifying MD5.
const DIGEST_INFO_PREFIX_MD5: &[u8] = &[
    0x30, 0x20, 0x30, 0x0c, 0x06, 0x08, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x02, 0x05, 0x05,
    0x00, 0x04, 0x10,
];

/// Produce the DER `DigestInfo` for a digest value.
///
/// These are the exact bytes the RSA primitive signs. The prefixes are the
/// standard encodings from RFC 8017 section 9.2.
pub fn digest_info(style: ChecksumType, digest: &[u8]) -> XarResult<Vec<u8>> {
    let prefix = match style {
        ChecksumType::Sha1 => DIGEST_INFO_PREFIX_SHA1,
        ChecksumType::Sha256 => DIGEST_INFO_PREFIX_SHA256,
        ChecksumType::Sha512 => DIGEST_INFO_PREFIX_SHA512,
        ChecksumType::Md5 => DIGEST_INFO_PREFIX_MD5,
        ChecksumType::None => {
            return Err(Error::Unsupported("checksum type none cannot be signed"))
        }
    };

    if digest.len() as u64 != style.digest_size()? {
        return Err(Error::TableOfContentsCorrupted(
            "digest length does not match its declared style",
        ));
    }

    let mut res = Vec::with_capacity(prefix.len() + digest.len());
    res.extend_from_slice(prefix);
    res.extend_from_slice(digest);

    Ok(res)
}

/// A reserved, fixed-size signature region within an emitted archive.
///
/// The slot is created zero filled before the signature exists. Once the
/// real signature is available it is committed into the slot in place.
/// The slot never resizes: the ToC already digested its declared size.
#[derive(Clone, Copy, Debug)]
pub struct SignatureSlot {
    /// Absolute offset of the slot within the archive.
    pub offset: u64,

    /// Reserved size in bytes.
    pub size: u64,
}

impl SignatureSlot {
    /// Fill the slot with signature bytes.
    ///
    /// Fails if the signature is larger than the reservation. A smaller
    /// signature leaves the remainder of the slot zero filled.
    pub fn commit(&self, archive: &mut [u8], signature: &[u8]) -> XarResult<()> {
        if signature.len() as u64 > self.size {
            return Err(Error::SignatureSizeMismatch {
                reserved: self.size,
                actual: signature.len() as u64,
            });
        }

        let start = self.offset as usize;
        let end = start + signature.len();

        if end > archive.len() {
            return Err(Error::TableOfContentsCorrupted(
                "signature slot lies outside the archive",
            ));
        }

        archive[start..end].copy_from_slice(signature);

        Ok(())
    }
}

/// Entity for signing a XAR file.
pub struct XarSigner<R: Read + Seek + Sized + Debug> {
    reader: XarReader<R>,
    checksum_type: ChecksumType,
}

impl<R: Read + Seek + Sized + Debug> XarSigner<R> {
    /// Create a new instance bound to an existing XAR.
    pub fn new(reader: XarReader<R>) -> Self {
        let checksum_type = reader.table_of_contents().checksum.style;

        Self {
            reader,
            checksum_type,
        }
    }

    /// Sign the archive, writing the signed archive to a writer.
    ///
    /// The `signing_key` and `signing_cert` form the signing identity.
    /// `certificates` is the rest of the chain, ordered from the signing
    /// certificate's issuer up to and including the root.
    ///
    /// The entire archive is rewritten: the signature slot lands at the
    /// front of the heap, so every file entry shifts.
    pub fn sign<W: Write>(
        &mut self,
        writer: &mut W,
        signing_key: &RsaPrivateKey,
        signing_cert: &CapturedX509Certificate,
        certificates: impl Iterator<Item = CapturedX509Certificate>,
    ) -> XarResult<()> {
        let extra_certificates = certificates.collect::<Vec<_>>();
        let chain = std::iter::once(signing_cert)
            .chain(extra_certificates.iter())
            .collect::<Vec<_>>();

        let digest_size = self.checksum_type.digest_size()?;
        // A PKCS#1 v1.5 signature is always exactly as long as the modulus.
        let signature_size = signing_key.size() as u64;

        info!(
            "reserving {} byte signature slot with a {} certificate chain",
            signature_size,
            chain.len()
        );

        let mut toc = (*self.reader.table_of_contents()).clone();
        toc.checksum = Checksum {
            style: self.checksum_type,
            offset: 0,
            size: digest_size,
        };
        toc.signature = Some(Signature {
            style: SignatureStyle::Rsa,
            // The signature goes right after the digest data.
            offset: digest_size,
            size: signature_size,
            key_info: KeyInfo::from_certificates(chain.into_iter()),
        });
        toc.x_signature = None;

        // Now go through and update file offsets. Files are nested, so do a
        // pass up front to calculate the offsets, then recursively descend
        // and update all references.
        let mut current_offset = digest_size + signature_size;
        let mut ids_to_offsets = HashMap::new();

        for (_, file) in self.reader.files()? {
            if let Some(data) = &file.data {
                ids_to_offsets.insert(file.id, current_offset);
                current_offset += data.length;
            }
        }

        toc.visit_files_mut(&|file: &mut File| {
            if let Some(data) = &mut file.data {
                if let Some(offset) = ids_to_offsets.get(&file.id) {
                    data.offset = *offset;
                }
            }
        });

        let toc_data = toc.to_xml()?;
        debug!("signed table of contents is {} bytes", toc_data.len());

        let mut zlib = ZlibEncoder::new(Vec::new(), Compression::default());
        zlib.write_all(&toc_data)?;
        let toc_compressed = zlib.finish()?;

        let toc_digest = self.checksum_type.digest_data(&toc_compressed)?;

        // The exact byte sequence to sign: the DigestInfo wrapping of the
        // ToC digest, passed to the primitive with no further hashing.
        let digest_info = digest_info(self.checksum_type, &toc_digest)?;
        let rsa_signature = signing_key.sign(Pkcs1v15Sign::new_unprefixed(), &digest_info)?;

        let mut header = *self.reader.header();
        header.checksum_algorithm_id = XarChecksum::from(self.checksum_type).into();
        header.toc_length_compressed = toc_compressed.len() as _;
        header.toc_length_uncompressed = toc_data.len() as _;

        // Assemble the archive with a zero filled slot, then commit the
        // signature into it.
        let mut out = Vec::new();
        out.iowrite_with::<XarHeader>(header, scroll::BE)?;
        out.write_all(&toc_compressed)?;
        out.write_all(&toc_digest)?;

        let slot = SignatureSlot {
            offset: out.len() as u64,
            size: signature_size,
        };
        out.resize(out.len() + signature_size as usize, 0);

        for (path, file) in self.reader.files()? {
            if file.data.is_some() {
                debug!("copying {} to output archive", path);
                self.reader.write_file_data_heap_from_file(&file, &mut out)?;
            }
        }

        slot.commit(&mut out, &rsa_signature)?;

        writer.write_all(&out)?;

        Ok(())
    }
}
