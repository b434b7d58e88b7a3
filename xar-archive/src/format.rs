// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    crate::table_of_contents::ChecksumType,
    scroll::{IOread, IOwrite, Pread, Pwrite, SizeWith},
};

/// Value of [XarHeader::magic]. `xar!`.
pub const XAR_MAGIC: u32 = 0x7861_7221;

/// Size in bytes of the header for the supported format version.
pub const XAR_HEADER_SIZE: u16 = 28;

/// The only format version this crate understands.
pub const XAR_VERSION: u16 = 1;

/// A XAR archive header.
///
/// The header effectively defines a table of contents, which
/// holds information about the content of the archive.
///
/// All fields are big-endian.
#[derive(Clone, Copy, Debug, IOread, IOwrite, Pread, Pwrite, SizeWith)]
pub struct XarHeader {
    /// File magic. `xar!`.
    pub magic: u32,

    /// Size of this header + magic.
    pub size: u16,

    /// Format version number.
    pub version: u16,

    /// Size in bytes of zlib compressed table of contents.
    pub toc_length_compressed: u64,

    /// Size in bytes of uncompressed table of contents.
    pub toc_length_uncompressed: u64,

    /// Checksum algorithm used.
    pub checksum_algorithm_id: u32,
}

/// Checksum format used in file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum XarChecksum {
    None,
    Sha1,
    Md5,
    Sha256,
    Sha512,
    Other(u32),
}

impl From<u32> for XarChecksum {
    fn from(i: u32) -> Self {
        match i {
            0 => Self::None,
            1 => Self::Sha1,
            2 => Self::Md5,
            3 => Self::Sha256,
            4 => Self::Sha512,
            _ => Self::Other(i),
        }
    }
}

impl From<ChecksumType> for XarChecksum {
    fn from(checksum: ChecksumType) -> Self {
        match checksum {
            ChecksumType::None => Self::None,
            ChecksumType::Sha1 => Self::Sha1,
            ChecksumType::Sha256 => Self::Sha256,
            ChecksumType::Sha512 => Self::Sha512,
            ChecksumType::Md5 => Self::Md5,
        }
    }
}

impl From<XarChecksum> for u32 {
    fn from(checksum: XarChecksum) -> u32 {
        match checksum {
            XarChecksum::None => 0,
            XarChecksum::Sha1 => 1,
            XarChecksum::Md5 => 2,
            XarChecksum::Sha256 => 3,
            XarChecksum::Sha512 => 4,
            XarChecksum::Other(i) => i,
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, scroll::{Pread, Pwrite}};

    #[test]
    fn header_round_trip() {
        let header = XarHeader {
            magic: XAR_MAGIC,
            size: XAR_HEADER_SIZE,
            version: XAR_VERSION,
            toc_length_compressed: 1234,
            toc_length_uncompressed: 5678,
            checksum_algorithm_id: XarChecksum::Sha1.into(),
        };

        let mut buffer = [0u8; 28];
        buffer.pwrite_with(header, 0, scroll::BE).unwrap();

        // Magic is the literal ASCII `xar!`.
        assert_eq!(&buffer[0..4], b"xar!");

        let parsed = buffer.pread_with::<XarHeader>(0, scroll::BE).unwrap();
        assert_eq!(parsed.size, XAR_HEADER_SIZE);
        assert_eq!(parsed.toc_length_compressed, 1234);
        assert_eq!(parsed.toc_length_uncompressed, 5678);
        assert_eq!(XarChecksum::from(parsed.checksum_algorithm_id), XarChecksum::Sha1);
    }
}
