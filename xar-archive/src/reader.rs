// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    crate::{
        format::{XarHeader, XAR_HEADER_SIZE, XAR_MAGIC},
        signing,
        table_of_contents::{ChecksumType, File, SignatureStyle, TableOfContents},
        Error, XarResult,
    },
    rsa::{pkcs1::DecodeRsaPublicKey, Pkcs1v15Sign, RsaPublicKey},
    scroll::IOread,
    std::{
        cmp::min,
        fmt::Debug,
        io::{Cursor, Read, Seek, SeekFrom, Write},
    },
    x509_certificate::CapturedX509Certificate,
};

/// Read-only interface to a single XAR archive.
#[derive(Debug)]
pub struct XarReader<R: Read + Seek + Sized + Debug> {
    /// Reader of raw XAR archive content.
    reader: R,

    /// Parsed file header.
    header: XarHeader,

    /// Parsed table of contents.
    toc: TableOfContents,

    /// The zlib compressed table of contents, as stored.
    toc_compressed: Vec<u8>,

    /// Absolute offset within the reader where the heap begins.
    heap_start_offset: u64,
}

impl<R: Read + Seek + Sized + Debug> XarReader<R> {
    /// Construct a new XAR reader from a stream reader.
    pub fn new(mut reader: R) -> XarResult<Self> {
        let header = reader.ioread_with::<XarHeader>(scroll::BE)?;

        if header.magic != XAR_MAGIC {
            return Err(Error::BadMagic);
        }
        if header.size < XAR_HEADER_SIZE {
            return Err(Error::BadHeaderSize(header.size));
        }

        // Tolerate headers longer than the fields we know about.
        let mut header_extra = vec![0u8; header.size as usize - XAR_HEADER_SIZE as usize];
        reader.read_exact(&mut header_extra)?;

        // Following the header is a zlib compressed table of contents.
        // Buffer the compressed bytes: the signature protocol digests them
        // as stored, not just their decompressed form.
        let mut toc_compressed = vec![0u8; header.toc_length_compressed as usize];
        reader.read_exact(&mut toc_compressed)?;

        let mut toc_data = Vec::with_capacity(header.toc_length_uncompressed as usize);
        flate2::read::ZlibDecoder::new(toc_compressed.as_slice()).read_to_end(&mut toc_data)?;

        if toc_data.len() as u64 != header.toc_length_uncompressed {
            return Err(Error::TableOfContentsCorrupted(
                "declared uncompressed length does not match",
            ));
        }

        let heap_start_offset = reader.stream_position()?;

        let toc = TableOfContents::from_reader(Cursor::new(toc_data))?;

        Ok(Self {
            reader,
            header,
            toc,
            toc_compressed,
            heap_start_offset,
        })
    }

    /// Obtain the inner reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Obtain the parsed [XarHeader] file header.
    pub fn header(&self) -> &XarHeader {
        &self.header
    }

    /// The start offset of the heap.
    pub fn heap_start_offset(&self) -> u64 {
        self.heap_start_offset
    }

    /// Obtain the table of contents for this archive.
    pub fn table_of_contents(&self) -> &TableOfContents {
        &self.toc
    }

    /// Obtain the file entries in this archive.
    pub fn files(&self) -> XarResult<Vec<(String, File)>> {
        self.toc.files()
    }

    /// Attempt to find the [File] entry for a given path in the archive.
    pub fn find_file(&self, filename: &str) -> XarResult<Option<File>> {
        Ok(self
            .toc
            .files()?
            .into_iter()
            .find_map(|(path, file)| if path == filename { Some(file) } else { None }))
    }

    /// Write a slice of the heap to a writer.
    fn write_heap_slice(
        &mut self,
        offset: u64,
        size: usize,
        writer: &mut impl Write,
    ) -> XarResult<()> {
        self.reader
            .seek(SeekFrom::Start(self.heap_start_offset + offset))?;

        let mut buffer = vec![0u8; 32768];
        let mut remaining = size;

        while remaining > 0 {
            let chunk = min(remaining, buffer.len());
            self.reader.read_exact(&mut buffer[..chunk])?;
            writer.write_all(&buffer[..chunk])?;
            remaining -= chunk;
        }

        Ok(())
    }

    /// Write heap file data for a given file record to a writer.
    ///
    /// This will write the raw data backing a file as stored in the heap.
    /// There's a good chance the raw data is encoded/compressed.
    ///
    /// Returns the number of bytes written.
    pub fn write_file_data_heap_from_file(
        &mut self,
        file: &File,
        writer: &mut impl Write,
    ) -> XarResult<usize> {
        let data = file.data.as_ref().ok_or(Error::FileNoData)?;

        self.write_heap_slice(data.offset, data.length as _, writer)?;

        Ok(data.length as _)
    }

    /// Write decoded file data for a given file record to a writer.
    ///
    /// This will call [Self::write_file_data_heap_from_file] and will decode
    /// that data stream, if the file data is encoded.
    pub fn write_file_data_decoded_from_file(
        &mut self,
        file: &File,
        writer: &mut impl Write,
    ) -> XarResult<usize> {
        let data = file.data.as_ref().ok_or(Error::FileNoData)?;

        let mut writer = match data.encoding.style.as_str() {
            "application/octet-stream" => Box::new(writer) as Box<dyn Write>,
            // The media type is arguably wrong, as there is no gzip header.
            "application/x-gzip" => {
                Box::new(flate2::write::ZlibDecoder::new(writer)) as Box<dyn Write>
            }
            encoding => {
                return Err(Error::UnimplementedFileEncoding(encoding.to_string()));
            }
        };

        self.write_file_data_heap_from_file(file, &mut writer)
    }

    /// Resolve decoded data for a given path.
    pub fn get_file_data_from_path(&mut self, path: &str) -> XarResult<Option<Vec<u8>>> {
        if let Some(file) = self.find_file(path)? {
            let mut buffer = Vec::<u8>::with_capacity(file.size.unwrap_or(0) as _);
            self.write_file_data_decoded_from_file(&file, &mut buffer)?;

            Ok(Some(buffer))
        } else {
            Ok(None)
        }
    }

    /// Obtain the archive checksum as stored in the heap.
    ///
    /// The checksum consists of a digest format and a raw digest.
    pub fn checksum(&mut self) -> XarResult<(ChecksumType, Vec<u8>)> {
        let mut data = Vec::<u8>::with_capacity(self.toc.checksum.size as _);
        self.write_heap_slice(
            self.toc.checksum.offset,
            self.toc.checksum.size as _,
            &mut data,
        )?;

        Ok((self.toc.checksum.style, data))
    }

    /// Compute the digest of the compressed table of contents, as stored.
    ///
    /// This is the value the stored checksum and any signature are made over.
    pub fn toc_digest(&self) -> XarResult<Vec<u8>> {
        self.toc.checksum.style.digest_data(&self.toc_compressed)
    }

    /// Validate that the stored archive checksum matches the table of contents.
    pub fn verify_table_of_contents_digest(&mut self) -> XarResult<()> {
        let expected = self.toc_digest()?;
        let (_, stored) = self.checksum()?;

        if stored == expected {
            Ok(())
        } else {
            Err(Error::TableOfContentsCorrupted(
                "stored checksum does not match table of contents",
            ))
        }
    }

    /// Validate the stored checksum of every file entry.
    ///
    /// Checksums are computed over the stored (possibly encoded) heap bytes.
    /// The first mismatch fails the validation.
    pub fn verify_file_checksums(&mut self) -> XarResult<()> {
        for (path, file) in self.files()? {
            if let Some(data) = &file.data {
                let mut stored = Vec::with_capacity(data.length as _);
                self.write_heap_slice(data.offset, data.length as _, &mut stored)?;

                let got = hex::encode(data.archived_checksum.style.digest_data(&stored)?);

                if !got.eq_ignore_ascii_case(&data.archived_checksum.checksum) {
                    return Err(Error::FileChecksumMismatch(path));
                }
            }
        }

        Ok(())
    }

    /// Obtain RSA signature data from this archive.
    ///
    /// The returned tuple contains the raw signature data and the embedded
    /// X.509 certificates. A reserved-but-never-committed slot yields
    /// all-zero signature data.
    pub fn rsa_signature(&mut self) -> XarResult<Option<(Vec<u8>, Vec<CapturedX509Certificate>)>> {
        if let Some(sig) = self.toc.find_signature(SignatureStyle::Rsa).cloned() {
            let mut data = Vec::<u8>::with_capacity(sig.size as _);
            self.write_heap_slice(sig.offset, sig.size as _, &mut data)?;

            let certs = sig.x509_certificates()?;

            Ok(Some((data, certs)))
        } else {
            Ok(None)
        }
    }

    /// Verifies the RSA signature in the archive.
    ///
    /// This verifies that the RSA signature in the archive, if present, is a
    /// valid signature over the recomputed ToC digest, checked against the
    /// public key of the first certificate in the embedded chain.
    ///
    /// The boolean return value indicates whether signature validation was
    /// performed: an absent signature, a placeholder (all zeros) slot, or an
    /// empty certificate chain all short-circuit to `false`.
    pub fn verify_rsa_checksum_signature(&mut self) -> XarResult<bool> {
        let digest_info =
            signing::digest_info(self.toc.checksum.style, &self.toc_digest()?)?;

        if let Some((signature, certificates)) = self.rsa_signature()? {
            if signature.iter().all(|b| *b == 0) {
                return Ok(false);
            }

            if let Some(cert) = certificates.first() {
                let public_key = RsaPublicKey::from_pkcs1_der(cert.public_key_data().as_ref())?;

                public_key
                    .verify(Pkcs1v15Sign::new_unprefixed(), &digest_info, &signature)
                    .map_err(|_| Error::SignatureVerification)?;

                Ok(true)
            } else {
                Ok(false)
            }
        } else {
            Ok(false)
        }
    }
}
