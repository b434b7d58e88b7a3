// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reading support for flat package (`.pkg`) installers.

use {
    crate::{
        component::ComponentPackageReader, distribution::Distribution, PkgResult,
    },
    std::{
        fmt::Debug,
        io::{Cursor, Read, Seek},
    },
    xar_archive::reader::XarReader,
};

/// The type of a flat package.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkgFlavor {
    /// A *component* installer.
    ///
    /// This consists of a single component.
    Component,

    /// A *product* installer.
    ///
    /// This consists of one or more components, described by a
    /// `Distribution` file.
    Product,
}

/// Read-only interface to a single flat package XAR archive.
pub struct PkgReader<R: Read + Seek + Sized + Debug> {
    xar: XarReader<R>,
    flavor: PkgFlavor,
}

impl<R: Read + Seek + Sized + Debug> PkgReader<R> {
    /// Construct an instance from a reader of XAR archive data.
    pub fn new(reader: R) -> PkgResult<Self> {
        let xar = XarReader::new(reader)?;

        let flavor = if xar.find_file("Distribution")?.is_some() {
            PkgFlavor::Product
        } else {
            PkgFlavor::Component
        };

        Ok(Self { xar, flavor })
    }

    /// Return the inner reader, consuming self.
    pub fn into_inner(self) -> XarReader<R> {
        self.xar
    }

    /// Obtain the flavor of the flat package.
    pub fn flavor(&self) -> PkgFlavor {
        self.flavor
    }

    /// Obtain the parsed `Distribution` XML file describing the installer.
    ///
    /// Only *product* packages have one, so this may resolve to `None`.
    pub fn distribution(&mut self) -> PkgResult<Option<Distribution>> {
        if let Some(xml_data) = self.xar.get_file_data_from_path("Distribution")? {
            Ok(Some(Distribution::from_reader(Cursor::new(xml_data))?))
        } else {
            Ok(None)
        }
    }

    /// Attempt to resolve a component under a path prefix.
    ///
    /// Components within a product archive live in sub-directories, often
    /// named `*.pkg/`. `None` is returned if no component files exist under
    /// the prefix.
    pub fn component_at_path(
        &mut self,
        prefix: &str,
    ) -> PkgResult<Option<ComponentPackageReader>> {
        let package_info = self
            .xar
            .get_file_data_from_path(&format!("{}/PackageInfo", prefix))?;
        let scripts = self
            .xar
            .get_file_data_from_path(&format!("{}/Scripts", prefix))?;

        if package_info.is_none() && scripts.is_none() {
            Ok(None)
        } else {
            Ok(Some(ComponentPackageReader::from_file_data(
                package_info,
                scripts,
            )?))
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::package::build_package};

    #[test]
    fn built_package_reads_as_product() {
        let pkg = build_package("com.example.test", "1.0.0", b"#!/bin/sh\n").unwrap();

        let mut reader = PkgReader::new(Cursor::new(pkg)).unwrap();
        assert_eq!(reader.flavor(), PkgFlavor::Product);

        let distribution = reader.distribution().unwrap().unwrap();
        assert_eq!(distribution.title.as_deref(), Some("com.example.test"));

        let component = reader.component_at_path("payload.pkg").unwrap().unwrap();
        let info = component.package_info().unwrap();
        assert_eq!(info.identifier, "com.example.test");
        assert!(component.scripts().is_some());

        assert!(reader.component_at_path("missing.pkg").unwrap().is_none());
    }
}
