// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `Distribution` XML file format.
//!
//! A `Distribution` file in the root of the archive marks a flat package as
//! a *product* installer and describes it to Installer. See
//! <https://developer.apple.com/library/archive/documentation/DeveloperTools/Reference/DistributionDefinitionRef/Chapters/Distribution_XML_Ref.html>
//! for Apple's documentation of this file format.
//!
//! Only the subset needed by payload-free script packages is modeled here.

use {
    crate::PkgResult,
    serde::{Deserialize, Serialize},
    std::io::Write,
    xml::writer::{EmitterConfig, EventWriter, XmlEvent},
};

/// Represents a distribution XML file.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename = "installer-gui-script", rename_all = "kebab-case")]
pub struct Distribution {
    #[serde(rename = "minSpecVersion")]
    pub min_spec_version: u8,

    pub title: Option<String>,
    pub options: Option<Options>,
    pub domains: Option<Domains>,
    pub choices_outline: ChoicesOutline,
    #[serde(default)]
    pub choice: Vec<Choice>,
    #[serde(default)]
    pub pkg_ref: Vec<PkgRef>,
}

impl Distribution {
    /// The distribution describing a single payload-free script package.
    ///
    /// One hidden choice references the lone component, installable to any
    /// domain without customization.
    pub fn script_package(identifier: &str, version: &str) -> Self {
        Self {
            min_spec_version: 1,
            title: Some(identifier.to_string()),
            options: Some(Options {
                customize: Some("never".to_string()),
                allow_external_scripts: Some("no".to_string()),
            }),
            domains: Some(Domains {
                enable_anywhere: Some(true),
            }),
            choices_outline: ChoicesOutline {
                line: vec![Line {
                    choice: "default".to_string(),
                    lines: vec![Line {
                        choice: identifier.to_string(),
                        lines: vec![],
                    }],
                }],
            },
            choice: vec![
                Choice {
                    id: "default".to_string(),
                    visible: None,
                    title: None,
                    pkg_ref: vec![],
                },
                Choice {
                    id: identifier.to_string(),
                    visible: Some(false),
                    title: None,
                    pkg_ref: vec![PkgRefReference {
                        id: identifier.to_string(),
                    }],
                },
            ],
            pkg_ref: vec![PkgRef {
                id: identifier.to_string(),
                version: Some(version.to_string()),
                on_conclusion: Some("none".to_string()),
                content: Some("#payload.pkg".to_string()),
            }],
        }
    }

    /// Parse Distribution XML from a reader.
    pub fn from_reader(reader: impl std::io::Read) -> PkgResult<Self> {
        let mut de =
            serde_xml_rs::Deserializer::new_from_reader(reader).non_contiguous_seq_elements(true);

        Ok(Self::deserialize(&mut de)?)
    }

    /// Parse Distribution XML from a string.
    pub fn from_xml(s: &str) -> PkgResult<Self> {
        let mut de = serde_xml_rs::Deserializer::new_from_reader(s.as_bytes())
            .non_contiguous_seq_elements(true);

        Ok(Self::deserialize(&mut de)?)
    }

    /// Serialize to Distribution XML.
    pub fn to_xml(&self) -> PkgResult<Vec<u8>> {
        let mut writer = EmitterConfig::new()
            .perform_indent(true)
            .create_writer(Vec::new());

        let min_spec_version = self.min_spec_version.to_string();
        writer.write(
            XmlEvent::start_element("installer-gui-script")
                .attr("minSpecVersion", &min_spec_version),
        )?;

        if let Some(title) = &self.title {
            text_element(&mut writer, "title", title)?;
        }

        if let Some(options) = &self.options {
            let mut element = XmlEvent::start_element("options");
            if let Some(customize) = &options.customize {
                element = element.attr("customize", customize);
            }
            if let Some(allow) = &options.allow_external_scripts {
                element = element.attr("allow-external-scripts", allow);
            }
            writer.write(element)?;
            writer.write(XmlEvent::end_element())?;
        }

        if let Some(domains) = &self.domains {
            let enable_anywhere = domains.enable_anywhere.map(|v| v.to_string());
            let mut element = XmlEvent::start_element("domains");
            if let Some(value) = &enable_anywhere {
                element = element.attr("enable_anywhere", value);
            }
            writer.write(element)?;
            writer.write(XmlEvent::end_element())?;
        }

        writer.write(XmlEvent::start_element("choices-outline"))?;
        for line in &self.choices_outline.line {
            write_line(&mut writer, line)?;
        }
        writer.write(XmlEvent::end_element())?;

        for choice in &self.choice {
            let visible = choice.visible.map(|v| v.to_string());
            let mut element = XmlEvent::start_element("choice").attr("id", &choice.id);
            if let Some(value) = &visible {
                element = element.attr("visible", value);
            }
            if let Some(title) = &choice.title {
                element = element.attr("title", title);
            }
            writer.write(element)?;
            for reference in &choice.pkg_ref {
                writer.write(XmlEvent::start_element("pkg-ref").attr("id", &reference.id))?;
                writer.write(XmlEvent::end_element())?;
            }
            writer.write(XmlEvent::end_element())?;
        }

        for pkg_ref in &self.pkg_ref {
            let mut element = XmlEvent::start_element("pkg-ref").attr("id", &pkg_ref.id);
            if let Some(version) = &pkg_ref.version {
                element = element.attr("version", version);
            }
            if let Some(on_conclusion) = &pkg_ref.on_conclusion {
                element = element.attr("onConclusion", on_conclusion);
            }
            writer.write(element)?;
            if let Some(content) = &pkg_ref.content {
                writer.write(XmlEvent::characters(content))?;
            }
            writer.write(XmlEvent::end_element())?;
        }

        writer.write(XmlEvent::end_element())?;

        Ok(writer.into_inner())
    }
}

fn text_element<W: Write>(writer: &mut EventWriter<W>, name: &str, value: &str) -> PkgResult<()> {
    writer.write(XmlEvent::start_element(name))?;
    writer.write(XmlEvent::characters(value))?;
    writer.write(XmlEvent::end_element())?;

    Ok(())
}

fn write_line<W: Write>(writer: &mut EventWriter<W>, line: &Line) -> PkgResult<()> {
    writer.write(XmlEvent::start_element("line").attr("choice", &line.choice))?;
    for nested in &line.lines {
        write_line(writer, nested)?;
    }
    writer.write(XmlEvent::end_element())?;

    Ok(())
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Options {
    pub customize: Option<String>,
    pub allow_external_scripts: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Domains {
    pub enable_anywhere: Option<bool>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ChoicesOutline {
    #[serde(rename = "line")]
    pub line: Vec<Line>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Line {
    pub choice: String,
    #[serde(default, rename = "line")]
    pub lines: Vec<Line>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Choice {
    pub id: String,
    pub visible: Option<bool>,
    pub title: Option<String>,
    #[serde(default, rename = "pkg-ref")]
    pub pkg_ref: Vec<PkgRefReference>,
}

/// A `<pkg-ref>` inside a `<choice>`, referencing a package by ID only.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PkgRefReference {
    pub id: String,
}

/// A top-level `<pkg-ref>` describing where a component lives in the archive.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PkgRef {
    pub id: String,
    pub version: Option<String>,
    #[serde(rename = "onConclusion")]
    pub on_conclusion: Option<String>,
    #[serde(rename = "$value")]
    pub content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_package_round_trips() {
        let distribution = Distribution::script_package("com.example.test", "1.0.0");
        let xml = distribution.to_xml().unwrap();

        let parsed = Distribution::from_xml(std::str::from_utf8(&xml).unwrap()).unwrap();
        assert_eq!(parsed.min_spec_version, 1);
        assert_eq!(parsed.title.as_deref(), Some("com.example.test"));
        assert_eq!(parsed.choice.len(), 2);
        assert_eq!(parsed.choice[1].visible, Some(false));
        assert_eq!(parsed.choice[1].pkg_ref[0].id, "com.example.test");

        let pkg_ref = &parsed.pkg_ref[0];
        assert_eq!(pkg_ref.id, "com.example.test");
        assert_eq!(pkg_ref.version.as_deref(), Some("1.0.0"));
        assert_eq!(pkg_ref.content.as_deref(), Some("#payload.pkg"));

        // The outline nests the real choice under the default line.
        assert_eq!(parsed.choices_outline.line[0].choice, "default");
        assert_eq!(
            parsed.choices_outline.line[0].lines[0].choice,
            "com.example.test"
        );
    }

    #[test]
    fn identifiers_are_xml_escaped() {
        let distribution = Distribution::script_package("com.example.a&b", "1.0");
        let xml = distribution.to_xml().unwrap();
        let text = std::str::from_utf8(&xml).unwrap();

        assert!(text.contains("com.example.a&amp;b"));

        let parsed = Distribution::from_xml(text).unwrap();
        assert_eq!(parsed.pkg_ref[0].id, "com.example.a&b");
    }
}
