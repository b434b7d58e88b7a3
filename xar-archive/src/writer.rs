// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! XAR archive writing.

use {
    crate::{
        format::{XarChecksum, XarHeader, XAR_HEADER_SIZE, XAR_MAGIC, XAR_VERSION},
        signing::SignatureSlot,
        table_of_contents::{
            Checksum, ChecksumType, File, FileChecksum, FileData, FileEncoding, KeyInfo,
            Signature, SignatureStyle, TableOfContents, XarToC,
        },
        Error, XarResult,
    },
    chrono::Utc,
    flate2::{write::ZlibEncoder, Compression},
    scroll::IOwrite,
    std::io::Write,
    x509_certificate::CapturedX509Certificate,
};

/// How a file entry's data is encoded in the heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum XarCompression {
    /// Data is stored as-is.
    None,

    /// Data is a zlib stream.
    ///
    /// The format labels these `application/x-gzip` even though there is no
    /// gzip framing.
    Gzip,
}

impl XarCompression {
    fn mime_name(&self) -> &'static str {
        match self {
            Self::None => "application/octet-stream",
            Self::Gzip => "application/x-gzip",
        }
    }
}

/// A fixed-size signature slot to reserve in the emitted archive.
///
/// The certificate chain rides in the table of contents, so it has to be
/// known at reservation time: committing the real signature later must not
/// change any ToC length.
pub struct SignatureReservation {
    /// Signature flavor being reserved for.
    pub style: SignatureStyle,

    /// Size in bytes of the slot.
    ///
    /// For RSA this is the modulus size of the signing key. Reservations
    /// larger than the eventual signature are valid; smaller ones make the
    /// commit fail.
    pub size: u64,

    /// Certificate chain, leaf first.
    pub certificates: Vec<CapturedX509Certificate>,
}

struct PendingFile {
    path: String,
    stored: Vec<u8>,
    extracted_size: u64,
    extracted_checksum: String,
    archived_checksum: String,
    encoding: XarCompression,
}

/// Writes XAR archives.
///
/// Entries are added in order with [Self::add_file]; their order defines the
/// heap layout. Slash-separated paths materialize intermediate directory
/// records in the table of contents.
pub struct XarWriter {
    checksum_type: ChecksumType,
    files: Vec<PendingFile>,
    signature: Option<SignatureReservation>,
}

impl Default for XarWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl XarWriter {
    pub fn new() -> Self {
        Self {
            checksum_type: ChecksumType::Sha1,
            files: Vec::new(),
            signature: None,
        }
    }

    /// Add a file entry.
    ///
    /// The entry's checksums are computed here, over both the extracted and
    /// the stored (possibly compressed) bytes.
    pub fn add_file(
        &mut self,
        path: impl ToString,
        data: &[u8],
        compression: XarCompression,
    ) -> XarResult<()> {
        let extracted_checksum = hex::encode(self.checksum_type.digest_data(data)?);

        let stored = match compression {
            XarCompression::None => data.to_vec(),
            XarCompression::Gzip => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data)?;
                encoder.finish()?
            }
        };

        let archived_checksum = hex::encode(self.checksum_type.digest_data(&stored)?);

        self.files.push(PendingFile {
            path: path.to_string(),
            extracted_size: data.len() as u64,
            stored,
            extracted_checksum,
            archived_checksum,
            encoding: compression,
        });

        Ok(())
    }

    /// Reserve a signature slot in the emitted archive.
    pub fn reserve_signature(&mut self, reservation: SignatureReservation) {
        self.signature = Some(reservation);
    }

    /// Serialize the archive to a writer.
    ///
    /// If a signature slot was reserved, returns the [SignatureSlot] token
    /// used to commit the eventual signature into the emitted bytes.
    pub fn write_to(&self, writer: &mut impl Write) -> XarResult<Option<SignatureSlot>> {
        let digest_size = self.checksum_type.digest_size()?;
        let signature_size = self.signature.as_ref().map(|r| r.size).unwrap_or(0);

        // Heap layout: ToC digest, signature slot, then file data in entry
        // order.
        let mut roots: Vec<File> = Vec::new();
        let mut next_id = 1u64;
        let mut offset = digest_size + signature_size;

        for pending in &self.files {
            let components = pending.path.split('/').collect::<Vec<_>>();

            let data = FileData {
                offset,
                size: pending.extracted_size,
                length: pending.stored.len() as u64,
                extracted_checksum: FileChecksum {
                    style: self.checksum_type,
                    checksum: pending.extracted_checksum.clone(),
                },
                archived_checksum: FileChecksum {
                    style: self.checksum_type,
                    checksum: pending.archived_checksum.clone(),
                },
                encoding: FileEncoding {
                    style: pending.encoding.mime_name().to_string(),
                },
            };
            offset += pending.stored.len() as u64;

            place_file(&mut roots, &components, data, &mut next_id)?;
        }

        let toc = XarToC {
            creation_time: Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
            checksum: Checksum {
                style: self.checksum_type,
                offset: 0,
                size: digest_size,
            },
            files: roots,
            signature: self.signature.as_ref().map(|reservation| Signature {
                style: reservation.style,
                offset: digest_size,
                size: reservation.size,
                key_info: KeyInfo::from_certificates(reservation.certificates.iter()),
            }),
            x_signature: None,
        };

        let toc_data = TableOfContents::from(toc).to_xml()?;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&toc_data)?;
        let toc_compressed = encoder.finish()?;

        let toc_digest = self.checksum_type.digest_data(&toc_compressed)?;

        let header = XarHeader {
            magic: XAR_MAGIC,
            size: XAR_HEADER_SIZE,
            version: XAR_VERSION,
            toc_length_compressed: toc_compressed.len() as u64,
            toc_length_uncompressed: toc_data.len() as u64,
            checksum_algorithm_id: XarChecksum::from(self.checksum_type).into(),
        };

        writer.iowrite_with::<XarHeader>(header, scroll::BE)?;
        writer.write_all(&toc_compressed)?;
        writer.write_all(&toc_digest)?;

        if signature_size > 0 {
            writer.write_all(&vec![0u8; signature_size as usize])?;
        }

        for pending in &self.files {
            writer.write_all(&pending.stored)?;
        }

        Ok(self.signature.as_ref().map(|reservation| SignatureSlot {
            offset: XAR_HEADER_SIZE as u64 + toc_compressed.len() as u64 + digest_size,
            size: reservation.size,
        }))
    }
}

/// Insert a file record into the ToC tree, materializing directories.
fn place_file(
    files: &mut Vec<File>,
    components: &[&str],
    data: FileData,
    next_id: &mut u64,
) -> XarResult<()> {
    match components {
        [] => Err(Error::Unsupported("empty file path")),
        [name] => {
            let id = *next_id;
            *next_id += 1;
            files.push(File::new_regular(id, *name, data));
            Ok(())
        }
        [directory, rest @ ..] => {
            let existing = files.iter_mut().find(|f| {
                matches!(f.file_type, crate::table_of_contents::FileType::Directory)
                    && f.names.last().map(|n| n.as_str()) == Some(*directory)
            });

            if let Some(existing) = existing {
                place_file(&mut existing.files, rest, data, next_id)
            } else {
                let id = *next_id;
                *next_id += 1;
                let mut record = File::new_directory(id, *directory);
                place_file(&mut record.files, rest, data, next_id)?;
                files.push(record);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::reader::XarReader, std::io::Cursor};

    #[test]
    fn write_then_read_round_trips() {
        let mut writer = XarWriter::new();
        writer
            .add_file("Distribution", b"<installer-gui-script/>", XarCompression::None)
            .unwrap();
        writer
            .add_file("payload.pkg/PackageInfo", b"<pkg-info/>", XarCompression::None)
            .unwrap();
        writer
            .add_file("payload.pkg/Scripts", &[0x42u8; 4096], XarCompression::Gzip)
            .unwrap();

        let mut out = Vec::new();
        let slot = writer.write_to(&mut out).unwrap();
        assert!(slot.is_none());

        let mut reader = XarReader::new(Cursor::new(out)).unwrap();

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

        // The compressed entry decodes back to its original content.
        assert_eq!(
            reader
                .get_file_data_from_path("payload.pkg/Scripts")
                .unwrap(),
            Some(vec![0x42u8; 4096])
        );
        assert_eq!(
            reader.get_file_data_from_path("Distribution").unwrap(),
            Some(b"<installer-gui-script/>".to_vec())
        );

        // The compressed entry's stored form is actually smaller.
        let scripts = reader.find_file("payload.pkg/Scripts").unwrap().unwrap();
        let data = scripts.data.unwrap();
        assert_eq!(data.encoding.style, "application/x-gzip");
        assert!(data.length < data.size);

        reader.verify_table_of_contents_digest().unwrap();
        reader.verify_file_checksums().unwrap();

        assert!(reader.rsa_signature().unwrap().is_none());
    }

    #[test]
    fn reserved_slot_reads_back_as_placeholder() {
        let mut writer = XarWriter::new();
        writer
            .add_file("Distribution", b"data", XarCompression::None)
            .unwrap();
        writer.reserve_signature(SignatureReservation {
            style: SignatureStyle::Rsa,
            size: 256,
            certificates: vec![],
        });

        let mut out = Vec::new();
        let slot = writer.write_to(&mut out).unwrap().unwrap();
        assert_eq!(slot.size, 256);

        let mut reader = XarReader::new(Cursor::new(out)).unwrap();
        reader.verify_table_of_contents_digest().unwrap();
        reader.verify_file_checksums().unwrap();

        let (signature, certificates) = reader.rsa_signature().unwrap().unwrap();
        assert_eq!(signature, vec![0u8; 256]);
        assert!(certificates.is_empty());

        // A placeholder is present but does not count as a signature.
        assert!(!reader.verify_rsa_checksum_signature().unwrap());

        // File data sits behind the digest and the slot.
        let file = reader.find_file("Distribution").unwrap().unwrap();
        assert_eq!(file.data.unwrap().offset, 20 + 256);
    }

    #[test]
    fn corrupted_file_data_is_detected() {
        let mut writer = XarWriter::new();
        writer
            .add_file("Distribution", b"original content", XarCompression::None)
            .unwrap();

        let mut out = Vec::new();
        writer.write_to(&mut out).unwrap();

        // Flip a bit in the last heap byte, which belongs to the file data.
        let last = out.len() - 1;
        out[last] ^= 0x01;

        let mut reader = XarReader::new(Cursor::new(out)).unwrap();
        assert!(matches!(
            reader.verify_file_checksums(),
            Err(Error::FileChecksumMismatch(path)) if path == "Distribution"
        ));
    }
}
