// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `PackageInfo` XML files.
//!
//! Each component in a flat package carries a `PackageInfo` document
//! describing authentication requirements, the payload, and install
//! scripts. Only the subset needed by payload-free script packages is
//! modeled here.

use {
    crate::PkgResult,
    serde::{Deserialize, Serialize},
    xml::writer::{EmitterConfig, XmlEvent},
};

/// Provides information about the package to install.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename = "pkg-info", rename_all = "kebab-case")]
pub struct PackageInfo {
    /// Format version of the package.
    ///
    /// Value is likely `2`.
    pub format_version: u8,

    /// Uniform type identifier that defines the package.
    pub identifier: String,

    /// Version of the package.
    pub version: String,

    /// Default location where the payload hierarchy should be installed.
    pub install_location: Option<String>,

    /// Authentication requirements for the package install.
    ///
    /// Values include `none` and `root`.
    pub auth: String,

    /// Provides information on the content being installed.
    pub payload: Option<Payload>,

    /// Scripts to run before and after install.
    pub scripts: Option<Scripts>,
}

impl PackageInfo {
    /// The component descriptor for a payload-free script package.
    ///
    /// Declares an empty payload and a single `postinstall` script, run
    /// with root authentication.
    pub fn script_package(identifier: &str, version: &str) -> Self {
        Self {
            format_version: 2,
            identifier: identifier.to_string(),
            version: version.to_string(),
            install_location: Some("/".to_string()),
            auth: "root".to_string(),
            payload: Some(Payload {
                install_kbytes: 0,
                number_of_files: 0,
            }),
            scripts: Some(Scripts {
                preinstall: None,
                postinstall: Some(ScriptRef {
                    file: "./postinstall".to_string(),
                }),
            }),
        }
    }

    /// Parse PackageInfo XML from a reader.
    pub fn from_reader(reader: impl std::io::Read) -> PkgResult<Self> {
        let mut de =
            serde_xml_rs::Deserializer::new_from_reader(reader).non_contiguous_seq_elements(true);

        Ok(Self::deserialize(&mut de)?)
    }

    /// Parse PackageInfo XML from a string.
    pub fn from_xml(s: &str) -> PkgResult<Self> {
        let mut de = serde_xml_rs::Deserializer::new_from_reader(s.as_bytes())
            .non_contiguous_seq_elements(true);

        Ok(Self::deserialize(&mut de)?)
    }

    /// Serialize to PackageInfo XML.
    pub fn to_xml(&self) -> PkgResult<Vec<u8>> {
        let mut writer = EmitterConfig::new()
            .perform_indent(true)
            .create_writer(Vec::new());

        let format_version = self.format_version.to_string();
        let mut element = XmlEvent::start_element("pkg-info")
            .attr("format-version", &format_version)
            .attr("identifier", &self.identifier)
            .attr("version", &self.version);
        if let Some(install_location) = &self.install_location {
            element = element.attr("install-location", install_location);
        }
        element = element.attr("auth", &self.auth);
        writer.write(element)?;

        if let Some(payload) = &self.payload {
            let install_kbytes = payload.install_kbytes.to_string();
            let number_of_files = payload.number_of_files.to_string();
            writer.write(
                XmlEvent::start_element("payload")
                    .attr("installKBytes", &install_kbytes)
                    .attr("numberOfFiles", &number_of_files),
            )?;
            writer.write(XmlEvent::end_element())?;
        }

        if let Some(scripts) = &self.scripts {
            writer.write(XmlEvent::start_element("scripts"))?;
            if let Some(preinstall) = &scripts.preinstall {
                writer.write(
                    XmlEvent::start_element("preinstall").attr("file", &preinstall.file),
                )?;
                writer.write(XmlEvent::end_element())?;
            }
            if let Some(postinstall) = &scripts.postinstall {
                writer.write(
                    XmlEvent::start_element("postinstall").attr("file", &postinstall.file),
                )?;
                writer.write(XmlEvent::end_element())?;
            }
            writer.write(XmlEvent::end_element())?;
        }

        writer.write(XmlEvent::end_element())?;

        Ok(writer.into_inner())
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Payload {
    #[serde(rename = "installKBytes")]
    pub install_kbytes: u64,
    #[serde(rename = "numberOfFiles")]
    pub number_of_files: u64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Scripts {
    pub preinstall: Option<ScriptRef>,
    pub postinstall: Option<ScriptRef>,
}

/// A script reference by archive member name.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ScriptRef {
    pub file: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_package_round_trips() {
        let info = PackageInfo::script_package("com.example.test", "1.0.0");
        let xml = info.to_xml().unwrap();

        let parsed = PackageInfo::from_xml(std::str::from_utf8(&xml).unwrap()).unwrap();
        assert_eq!(parsed.format_version, 2);
        assert_eq!(parsed.identifier, "com.example.test");
        assert_eq!(parsed.version, "1.0.0");
        assert_eq!(parsed.install_location.as_deref(), Some("/"));
        assert_eq!(parsed.auth, "root");

        let payload = parsed.payload.unwrap();
        assert_eq!(payload.install_kbytes, 0);
        assert_eq!(payload.number_of_files, 0);

        let scripts = parsed.scripts.unwrap();
        assert!(scripts.preinstall.is_none());
        assert_eq!(scripts.postinstall.unwrap().file, "./postinstall");
    }
}
