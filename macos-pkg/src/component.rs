// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interface to component packages, installable units within flat packages.

use {
    crate::{package_info::PackageInfo, PkgResult},
    cpio_odc::ChainedCpioReader,
    std::io::{Cursor, Read},
};

const GZIP_HEADER: [u8; 3] = [0x1f, 0x8b, 0x08];

/// Attempt to decode the possibly compressed content of an archive file.
///
/// `Scripts` members are conventionally gzip compressed, but raw cpio
/// occurs in the wild. Sniff and decode accordingly.
fn decode_archive(data: Vec<u8>) -> Box<dyn Read> {
    if data.len() > 3 && data[0..3] == GZIP_HEADER {
        Box::new(flate2::read::GzDecoder::new(Cursor::new(data))) as Box<dyn Read>
    } else {
        Box::new(Cursor::new(data)) as Box<dyn Read>
    }
}

/// Type alias representing a generic reader for a cpio archive.
pub type CpioReader = Box<ChainedCpioReader<Box<dyn Read>>>;

fn cpio_reader(data: &[u8]) -> PkgResult<CpioReader> {
    let decoder = decode_archive(data.to_vec());
    Ok(cpio_odc::reader(decoder)?)
}

/// Read-only interface for a single *component package*.
pub struct ComponentPackageReader {
    package_info: Option<PackageInfo>,
    scripts: Option<Vec<u8>>,
}

impl ComponentPackageReader {
    /// Construct an instance with raw file data backing different files.
    pub fn from_file_data(
        package_info: Option<Vec<u8>>,
        scripts: Option<Vec<u8>>,
    ) -> PkgResult<Self> {
        let package_info = if let Some(data) = package_info {
            Some(PackageInfo::from_reader(Cursor::new(data))?)
        } else {
            None
        };

        Ok(Self {
            package_info,
            scripts,
        })
    }

    /// Obtain the parsed `PackageInfo` XML file.
    pub fn package_info(&self) -> Option<&PackageInfo> {
        self.package_info.as_ref()
    }

    /// Obtain the raw `Scripts` file content.
    pub fn scripts(&self) -> Option<&[u8]> {
        self.scripts.as_deref()
    }

    /// Obtain a reader for the `Scripts` cpio archive.
    pub fn scripts_reader(&self) -> PkgResult<Option<CpioReader>> {
        if let Some(data) = &self.scripts {
            Ok(Some(cpio_reader(data)?))
        } else {
            Ok(None)
        }
    }
}
