// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! XAR file format */

pub mod format;
pub mod reader;
pub mod signing;
pub mod table_of_contents;
pub mod writer;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("(de)serialization error: {0}")]
    Scroll(#[from] scroll::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decompression error: {0}")]
    Decompress(#[from] flate2::DecompressError),

    #[error("XML error: {0}")]
    SerdeXml(#[from] serde_xml_rs::Error),

    #[error("XML write error: {0}")]
    XmlWrite(#[from] xml::writer::Error),

    #[error("not a XAR archive (bad header magic)")]
    BadMagic,

    #[error("unsupported header size: {0}")]
    BadHeaderSize(u16),

    #[error("table of contents is corrupted: {0}")]
    TableOfContentsCorrupted(&'static str),

    #[error("file has no data")]
    FileNoData,

    #[error("file checksum mismatch: {0}")]
    FileChecksumMismatch(String),

    #[error("unimplemented file encoding: {0}")]
    UnimplementedFileEncoding(String),

    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("x509 certificate error: {0}")]
    X509Certificate(#[from] x509_certificate::X509CertificateError),

    #[error("RSA error: {0}")]
    Rsa(#[from] rsa::Error),

    #[error("RSA key error: {0}")]
    RsaKey(#[from] rsa::pkcs1::Error),

    #[error("RSA signature verification failed")]
    SignatureVerification,

    #[error("signature of {actual} bytes does not fit reserved slot of {reserved} bytes")]
    SignatureSizeMismatch { reserved: u64, actual: u64 },
}

pub type XarResult<T> = std::result::Result<T, Error>;
