use std::fmt;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

/// Errors raised while reading or rewriting a version descriptor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    #[error("version string is empty")]
    Empty,
    #[error("version component {index} of \"{raw}\" is not a number")]
    NonNumeric { raw: String, index: usize },
    #[error("version \"{0}\" needs at least build and revision components")]
    TooShort(String),
    #[error("expected exactly one version entry, found {0}")]
    EntryCount(usize),
    #[error("version entry has no value attribute")]
    MissingValue,
    #[error("build component of \"{0}\" cannot be incremented")]
    BuildOverflow(String),
    #[error("malformed version document: {0}")]
    Xml(String),
}

/// Dotted numeric version whose last two components are `build` and `revision`.
/// Components are kept as written so untouched ones render back verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionDescriptor {
    parts: Vec<String>,
    build: u64,
    revision: u64,
}

impl VersionDescriptor {
    pub fn parse(raw: &str) -> Result<Self, VersionError> {
        if raw.is_empty() {
            return Err(VersionError::Empty);
        }
        let parts: Vec<String> = raw.split('.').map(str::to_string).collect();
        if let Some(index) = parts
            .iter()
            .position(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
        {
            return Err(VersionError::NonNumeric {
                raw: raw.to_string(),
                index,
            });
        }
        let n = parts.len();
        if n < 2 {
            return Err(VersionError::TooShort(raw.to_string()));
        }
        let number = |index: usize| {
            parts[index].parse::<u64>().map_err(|_| VersionError::NonNumeric {
                raw: raw.to_string(),
                index,
            })
        };
        let build = number(n - 2)?;
        let revision = number(n - 1)?;
        Ok(Self {
            parts,
            build,
            revision,
        })
    }

    /// Components as written.
    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    pub fn build(&self) -> u64 {
        self.build
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// A non-zero revision means this cycle's reset has not happened yet.
    pub fn needs_reset(&self) -> bool {
        self.revision != 0
    }

    /// The only permitted mutation: `build += 1; revision = 0`. Leading
    /// components are carried over untouched.
    pub fn reset(&self) -> Result<Self, VersionError> {
        let build = self
            .build
            .checked_add(1)
            .ok_or_else(|| VersionError::BuildOverflow(self.to_string()))?;
        let mut parts = self.parts.clone();
        let n = parts.len();
        parts[n - 2] = build.to_string();
        parts[n - 1] = "0".to_string();
        Ok(Self {
            parts,
            build,
            revision: 0,
        })
    }
}

impl fmt::Display for VersionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.parts.join("."))
    }
}

// ── Version document ──

/// Version file contents: `<root><versions><version name=".." value=".."/></versions></root>`.
///
/// Only `version` elements directly under a top-level `versions` element count
/// as entries, and exactly one is required.
#[derive(Debug, Clone)]
pub struct VersionDocument {
    text: String,
    descriptor: VersionDescriptor,
}

impl VersionDocument {
    pub fn parse(text: &str) -> Result<Self, VersionError> {
        let mut values = Vec::new();
        walk_entries(text, |entry| {
            values.push(value_attr(entry)?);
            Ok(None)
        })?;
        if values.len() != 1 {
            return Err(VersionError::EntryCount(values.len()));
        }
        let raw = values.pop().flatten().ok_or(VersionError::MissingValue)?;
        Ok(Self {
            text: text.to_string(),
            descriptor: VersionDescriptor::parse(&raw)?,
        })
    }

    pub fn descriptor(&self) -> &VersionDescriptor {
        &self.descriptor
    }

    /// Serialize the document with its single entry set to `next`. Everything
    /// outside the entry's `value` attribute is written back as read.
    pub fn render_with(&self, next: &VersionDescriptor) -> Result<String, VersionError> {
        let value = next.to_string();
        let out = walk_entries(&self.text, |entry| replace_value(entry, &value).map(Some))?;
        String::from_utf8(out).map_err(|e| VersionError::Xml(e.to_string()))
    }
}

/// Stream the document through a writer, handing each version entry to
/// `on_entry`. A returned tag replaces the entry in the output.
fn walk_entries<F>(text: &str, mut on_entry: F) -> Result<Vec<u8>, VersionError>
where
    F: FnMut(&BytesStart<'_>) -> Result<Option<BytesStart<'static>>, VersionError>,
{
    let mut reader = Reader::from_str(text);
    let mut writer = Writer::new(Vec::new());
    let mut path: Vec<Vec<u8>> = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| VersionError::Xml(e.to_string()))?;
        let out = match event {
            Event::Eof => break,
            Event::Start(tag) => {
                let replaced: Option<BytesStart<'_>> = if is_entry(&path, &tag) {
                    on_entry(&tag)?
                } else {
                    None
                };
                path.push(tag.name().as_ref().to_vec());
                Event::Start(replaced.unwrap_or(tag))
            }
            Event::Empty(tag) => {
                let replaced: Option<BytesStart<'_>> = if is_entry(&path, &tag) {
                    on_entry(&tag)?
                } else {
                    None
                };
                Event::Empty(replaced.unwrap_or(tag))
            }
            Event::End(tag) => {
                path.pop();
                Event::End(tag)
            }
            other => other,
        };
        writer
            .write_event(out)
            .map_err(|e| VersionError::Xml(e.to_string()))?;
    }

    if path.is_empty() {
        Ok(writer.into_inner())
    } else {
        Err(VersionError::Xml("unexpected end of document".into()))
    }
}

fn is_entry(path: &[Vec<u8>], tag: &BytesStart<'_>) -> bool {
    path.len() == 2 && path[1] == b"versions" && tag.name().as_ref() == b"version"
}

fn value_attr(tag: &BytesStart<'_>) -> Result<Option<String>, VersionError> {
    for attr in tag.attributes() {
        let attr = attr.map_err(|e| VersionError::Xml(e.to_string()))?;
        if attr.key.as_ref() == b"value" {
            let value = attr
                .unescape_value()
                .map_err(|e| VersionError::Xml(e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn replace_value(tag: &BytesStart<'_>, value: &str) -> Result<BytesStart<'static>, VersionError> {
    let name = std::str::from_utf8(tag.name().as_ref())
        .map_err(|e| VersionError::Xml(e.to_string()))?
        .to_string();
    let mut out = BytesStart::new(name);
    for attr in tag.attributes() {
        let attr = attr.map_err(|e| VersionError::Xml(e.to_string()))?;
        if attr.key.as_ref() == b"value" {
            out.push_attribute(("value", value));
        } else {
            out.push_attribute(attr);
        }
    }
    Ok(out)
}
