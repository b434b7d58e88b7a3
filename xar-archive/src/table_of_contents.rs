// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! XAR XML table of contents data structure.

use {
    crate::{Error, XarResult},
    chrono::{DateTime, Utc},
    digest::Digest,
    serde::{Deserialize, Serialize},
    std::{
        fmt::{Display, Formatter},
        io::{Read, Write},
        ops::{Deref, DerefMut},
    },
    x509_certificate::{CapturedX509Certificate, X509CertificateError},
    xml::writer::{EmitterConfig, EventWriter, XmlEvent},
};

/// An XML table of contents in a XAR file.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TableOfContents {
    toc: XarToC,
}

impl Deref for TableOfContents {
    type Target = XarToC;

    fn deref(&self) -> &Self::Target {
        &self.toc
    }
}

impl DerefMut for TableOfContents {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.toc
    }
}

impl From<XarToC> for TableOfContents {
    fn from(toc: XarToC) -> Self {
        Self { toc }
    }
}

impl TableOfContents {
    /// Parse XML table of contents from a reader.
    pub fn from_reader(reader: impl Read) -> XarResult<Self> {
        Ok(serde_xml_rs::from_reader(reader)?)
    }

    /// Resolve the complete list of files.
    ///
    /// Files are sorted by their numerical ID, which should hopefully also
    /// be the order that file data occurs in the heap. Each element consists
    /// of the full filename and the `<file>` record.
    pub fn files(&self) -> XarResult<Vec<(String, File)>> {
        let mut files = self
            .toc
            .files
            .iter()
            .map(|f| f.files(None))
            .collect::<XarResult<Vec<_>>>()?
            .into_iter()
            .flat_map(|x| x.into_iter())
            .collect::<Vec<_>>();

        files.sort_by(|a, b| a.1.id.cmp(&b.1.id));

        Ok(files)
    }
}

/// The main data structure inside a table of contents.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct XarToC {
    pub creation_time: String,
    pub checksum: Checksum,
    #[serde(rename = "file")]
    pub files: Vec<File>,
    pub signature: Option<Signature>,
    pub x_signature: Option<Signature>,
}

impl XarToC {
    /// Signatures present in the table of contents.
    pub fn signatures(&self) -> Vec<&Signature> {
        let mut res = vec![];
        if let Some(sig) = &self.signature {
            res.push(sig);
        }
        if let Some(sig) = &self.x_signature {
            res.push(sig);
        }

        res
    }

    /// Attempt to find a signature given a signature style.
    pub fn find_signature(&self, style: SignatureStyle) -> Option<&Signature> {
        self.signatures().into_iter().find(|sig| sig.style == style)
    }

    /// Visit every `<file>` record, depth-first.
    pub fn visit_files_mut(&mut self, cb: &dyn Fn(&mut File)) {
        fn walk(files: &mut [File], cb: &dyn Fn(&mut File)) {
            for file in files {
                cb(file);
                walk(&mut file.files, cb);
            }
        }

        walk(&mut self.files, cb);
    }

    /// Serialize to table of contents XML.
    ///
    /// Serialization is explicit rather than via serde so attributes land
    /// as attributes: Apple's tooling will not accept a ToC whose `style`
    /// and `id` values are expressed as child elements.
    pub fn to_xml(&self) -> XarResult<Vec<u8>> {
        let mut writer = EmitterConfig::new()
            .perform_indent(true)
            .create_writer(Vec::new());

        writer.write(XmlEvent::start_element("xar"))?;
        writer.write(XmlEvent::start_element("toc"))?;

        text_element(&mut writer, "creation-time", &self.creation_time)?;

        writer.write(
            XmlEvent::start_element("checksum").attr("style", self.checksum.style.xml_name()),
        )?;
        text_element(&mut writer, "offset", &self.checksum.offset.to_string())?;
        text_element(&mut writer, "size", &self.checksum.size.to_string())?;
        writer.write(XmlEvent::end_element())?;

        if let Some(signature) = &self.signature {
            write_signature(&mut writer, "signature", signature)?;
        }
        if let Some(signature) = &self.x_signature {
            write_signature(&mut writer, "x-signature", signature)?;
        }

        for file in &self.files {
            write_file(&mut writer, file)?;
        }

        writer.write(XmlEvent::end_element())?;
        writer.write(XmlEvent::end_element())?;

        Ok(writer.into_inner())
    }
}

fn text_element<W: Write>(writer: &mut EventWriter<W>, name: &str, value: &str) -> XarResult<()> {
    writer.write(XmlEvent::start_element(name))?;
    writer.write(XmlEvent::characters(value))?;
    writer.write(XmlEvent::end_element())?;

    Ok(())
}

fn write_signature<W: Write>(
    writer: &mut EventWriter<W>,
    element: &str,
    signature: &Signature,
) -> XarResult<()> {
    writer.write(
        XmlEvent::start_element(element).attr("style", signature.style.to_string().as_str()),
    )?;
    text_element(writer, "offset", &signature.offset.to_string())?;
    text_element(writer, "size", &signature.size.to_string())?;

    writer.write(
        XmlEvent::start_element("KeyInfo").attr("xmlns", "http://www.w3.org/2000/09/xmldsig#"),
    )?;
    writer.write(XmlEvent::start_element("X509Data"))?;
    for certificate in &signature.key_info.x509_data.x509_certificate {
        text_element(writer, "X509Certificate", certificate)?;
    }
    writer.write(XmlEvent::end_element())?;
    writer.write(XmlEvent::end_element())?;

    writer.write(XmlEvent::end_element())?;

    Ok(())
}

fn write_file<W: Write>(writer: &mut EventWriter<W>, file: &File) -> XarResult<()> {
    writer.write(XmlEvent::start_element("file").attr("id", file.id.to_string().as_str()))?;

    for name in &file.names {
        text_element(writer, "name", name)?;
    }
    text_element(writer, "type", &file.file_type.to_string())?;

    if let Some(data) = &file.data {
        writer.write(XmlEvent::start_element("data"))?;
        text_element(writer, "offset", &data.offset.to_string())?;
        text_element(writer, "size", &data.size.to_string())?;
        text_element(writer, "length", &data.length.to_string())?;
        writer.write(
            XmlEvent::start_element("encoding").attr("style", data.encoding.style.as_str()),
        )?;
        writer.write(XmlEvent::end_element())?;
        write_file_checksum(writer, "extracted-checksum", &data.extracted_checksum)?;
        write_file_checksum(writer, "archived-checksum", &data.archived_checksum)?;
        writer.write(XmlEvent::end_element())?;
    }

    for child in &file.files {
        write_file(writer, child)?;
    }

    writer.write(XmlEvent::end_element())?;

    Ok(())
}

fn write_file_checksum<W: Write>(
    writer: &mut EventWriter<W>,
    element: &str,
    checksum: &FileChecksum,
) -> XarResult<()> {
    writer.write(XmlEvent::start_element(element).attr("style", checksum.style.xml_name()))?;
    writer.write(XmlEvent::characters(&checksum.checksum))?;
    writer.write(XmlEvent::end_element())?;

    Ok(())
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Checksum {
    /// The digest format used.
    pub style: ChecksumType,

    /// Offset within heap of the checksum data.
    pub offset: u64,

    /// Size of checksum data.
    pub size: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumType {
    None,
    Sha1,
    Sha256,
    Sha512,
    Md5,
}

impl Display for ChecksumType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Sha1 => f.write_str("SHA-1"),
            Self::Sha256 => f.write_str("SHA-256"),
            Self::Sha512 => f.write_str("SHA-512"),
            Self::Md5 => f.write_str("MD5"),
        }
    }
}

impl ChecksumType {
    /// The name of this digest in ToC XML attributes.
    pub fn xml_name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
            Self::Md5 => "md5",
        }
    }

    /// Size in bytes of digests this type produces.
    pub fn digest_size(&self) -> XarResult<u64> {
        match self {
            Self::None => Err(Error::Unsupported("cannot digest with checksum type none")),
            Self::Sha1 => Ok(20),
            Self::Sha256 => Ok(32),
            Self::Sha512 => Ok(64),
            Self::Md5 => Ok(16),
        }
    }

    /// Digest a slice of data.
    pub fn digest_data(&self, data: &[u8]) -> XarResult<Vec<u8>> {
        match self {
            Self::None => Err(Error::Unsupported("cannot digest with checksum type none")),
            Self::Sha1 => Ok(sha1::Sha1::digest(data).to_vec()),
            Self::Sha256 => Ok(sha2::Sha256::digest(data).to_vec()),
            Self::Sha512 => Ok(sha2::Sha512::digest(data).to_vec()),
            Self::Md5 => Ok(md5::Md5::digest(data).to_vec()),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct File {
    pub id: u64,
    pub ctime: Option<DateTime<Utc>>,
    pub mtime: Option<DateTime<Utc>>,
    pub atime: Option<DateTime<Utc>>,
    /// Filename.
    ///
    /// There should only be a single element. However, some Apple tools can
    /// emit multiple <name> elements.
    #[serde(rename = "name")]
    pub names: Vec<String>,
    #[serde(rename = "type")]
    pub file_type: FileType,
    pub mode: Option<u32>,
    pub deviceno: Option<u32>,
    pub inode: Option<u64>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub user: Option<String>,
    pub group: Option<String>,
    pub size: Option<u64>,
    pub data: Option<FileData>,
    #[serde(default, rename = "file")]
    pub files: Vec<File>,
}

impl File {
    /// Construct a directory record with no associated data.
    pub fn new_directory(id: u64, name: impl ToString) -> Self {
        Self {
            id,
            ctime: None,
            mtime: None,
            atime: None,
            names: vec![name.to_string()],
            file_type: FileType::Directory,
            mode: None,
            deviceno: None,
            inode: None,
            uid: None,
            gid: None,
            user: None,
            group: None,
            size: None,
            data: None,
            files: vec![],
        }
    }

    /// Construct a regular file record backed by heap data.
    pub fn new_regular(id: u64, name: impl ToString, data: FileData) -> Self {
        Self {
            id,
            ctime: None,
            mtime: None,
            atime: None,
            names: vec![name.to_string()],
            file_type: FileType::File,
            mode: None,
            deviceno: None,
            inode: None,
            uid: None,
            gid: None,
            user: None,
            group: None,
            size: Some(data.size),
            data: Some(data),
            files: vec![],
        }
    }

    pub fn files(&self, directory: Option<&str>) -> XarResult<Vec<(String, File)>> {
        let name = self
            .names
            .iter()
            .last()
            .ok_or(Error::TableOfContentsCorrupted("missing file name"))?;

        let full_path = if let Some(d) = directory {
            format!("{}/{}", d, name)
        } else {
            name.clone()
        };

        let mut files = vec![(full_path.clone(), self.clone())];

        for f in &self.files {
            files.extend(f.files(Some(&full_path))?);
        }

        Ok(files)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    File,
    Directory,
    HardLink,
    Link,
}

impl Display for FileType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FileType::File => f.write_str("file"),
            FileType::Directory => f.write_str("directory"),
            FileType::HardLink => f.write_str("hardlink"),
            FileType::Link => f.write_str("symlink"),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct FileData {
    pub offset: u64,
    pub size: u64,
    pub length: u64,
    pub extracted_checksum: FileChecksum,
    pub archived_checksum: FileChecksum,
    pub encoding: FileEncoding,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FileChecksum {
    pub style: ChecksumType,
    #[serde(rename = "$value")]
    pub checksum: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FileEncoding {
    pub style: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Signature {
    pub style: SignatureStyle,
    pub offset: u64,
    pub size: u64,
    #[serde(rename = "KeyInfo")]
    pub key_info: KeyInfo,
}

impl Signature {
    /// Obtain parsed X.509 certificates.
    pub fn x509_certificates(&self) -> XarResult<Vec<CapturedX509Certificate>> {
        self.key_info.x509_certificates()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignatureStyle {
    /// RSA signature over the ToC checksum.
    Rsa,
}

impl Display for SignatureStyle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rsa => f.write_str("RSA"),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct KeyInfo {
    #[serde(rename = "X509Data")]
    pub x509_data: X509Data,
}

impl KeyInfo {
    /// Construct an instance embedding the DER of an ordered certificate chain.
    pub fn from_certificates<'a>(
        certificates: impl Iterator<Item = &'a CapturedX509Certificate>,
    ) -> Self {
        Self {
            x509_data: X509Data {
                x509_certificate: certificates
                    .map(|cert| encode_multiline_base64(cert.constructed_data()))
                    .collect(),
            },
        }
    }

    /// Obtain parsed X.509 certificates.
    pub fn x509_certificates(&self) -> XarResult<Vec<CapturedX509Certificate>> {
        self.x509_data.x509_certificates()
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct X509Data {
    #[serde(default, rename = "X509Certificate")]
    pub x509_certificate: Vec<String>,
}

impl X509Data {
    /// Obtain parsed X.509 certificates.
    pub fn x509_certificates(&self) -> XarResult<Vec<CapturedX509Certificate>> {
        Ok(self
            .x509_certificate
            .iter()
            .map(|data| {
                // The data in the XML isn't armored. So we add armoring so it
                // can be decoded by the pem crate.
                let data = format!(
                    "-----BEGIN CERTIFICATE-----\r\n{}\r\n-----END CERTIFICATE-----\r\n",
                    data
                );

                CapturedX509Certificate::from_pem(data)
            })
            .collect::<Result<Vec<_>, X509CertificateError>>()?)
    }
}

/// Base64 encode with line breaks, as found in ToC `X509Certificate` elements.
fn encode_multiline_base64(data: &[u8]) -> String {
    let encoded = base64::encode(data);

    let mut out = String::with_capacity(encoded.len() + encoded.len() / 64 + 1);
    for (i, c) in encoded.chars().enumerate() {
        if i > 0 && i % 64 == 0 {
            out.push('\n');
        }
        out.push(c);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_data(offset: u64, content: &[u8]) -> FileData {
        FileData {
            offset,
            size: content.len() as u64,
            length: content.len() as u64,
            extracted_checksum: FileChecksum {
                style: ChecksumType::Sha1,
                checksum: hex::encode(ChecksumType::Sha1.digest_data(content).unwrap()),
            },
            archived_checksum: FileChecksum {
                style: ChecksumType::Sha1,
                checksum: hex::encode(ChecksumType::Sha1.digest_data(content).unwrap()),
            },
            encoding: FileEncoding {
                style: "application/octet-stream".to_string(),
            },
        }
    }

    #[test]
    fn xml_round_trip() {
        let mut directory = File::new_directory(2, "payload.pkg");
        directory
            .files
            .push(File::new_regular(3, "PackageInfo", file_data(30, b"<pkg-info/>")));

        let toc = XarToC {
            creation_time: "2021-10-16T22:10:18".to_string(),
            checksum: Checksum {
                style: ChecksumType::Sha1,
                offset: 0,
                size: 20,
            },
            files: vec![
                File::new_regular(1, "Distribution", file_data(20, b"<installer-gui-script/>")),
                directory,
            ],
            signature: None,
            x_signature: None,
        };

        let xml = toc.to_xml().unwrap();

        let parsed = TableOfContents::from_reader(std::io::Cursor::new(xml)).unwrap();
        assert_eq!(parsed.creation_time, "2021-10-16T22:10:18");
        assert_eq!(parsed.checksum.size, 20);
        assert!(parsed.signature.is_none());

        let files = parsed.files().unwrap();
        let paths = files.iter().map(|(path, _)| path.as_str()).collect::<Vec<_>>();
        assert_eq!(
            paths,
            vec!["Distribution", "payload.pkg", "payload.pkg/PackageInfo"]
        );

        let info = &files[2].1;
        assert_eq!(info.data.as_ref().unwrap().offset, 30);
        assert_eq!(
            info.data.as_ref().unwrap().encoding.style,
            "application/octet-stream"
        );
    }

    #[test]
    fn multiline_base64_wraps_at_64_columns() {
        let encoded = encode_multiline_base64(&[0xab; 100]);

        for line in encoded.lines() {
            assert!(line.len() <= 64);
        }
        assert_eq!(
            base64::decode(encoded.replace('\n', "")).unwrap(),
            vec![0xab; 100]
        );
    }
}
