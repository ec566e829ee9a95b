#![forbid(unsafe_code)]

//! OpenDocument v1.0 manifest (`META-INF/manifest.xml`).
//!
//! The manifest must list exactly the data files of the container, plus an
//! optional root entry `/` carrying the ASiC-E MIME type. Signature files
//! are never listed.

use std::collections::{BTreeMap, HashSet};

use bdoc_core::{algorithm, ns, Error, Result};
use bdoc_xml::{xml_element, Field};

use crate::archive::AsiceFile;

/// Full path of the optional entry describing the container itself.
pub const ROOT_PATH: &str = "/";

xml_element! {
    pub struct Manifest(ns::MANIFEST, "manifest") {
        file_entries: Vec<FileEntry> = Field::repeated().optional(),
    }
}

xml_element! {
    pub struct FileEntry(ns::MANIFEST, "file-entry") {
        full_path: String = Field::attr("full-path").namespace(ns::MANIFEST),
        media_type: String = Field::attr("media-type").namespace(ns::MANIFEST),
    }
}

/// Parse the manifest and assign MIME types to the data files in `files`.
pub fn apply(data: &[u8], files: &mut BTreeMap<String, AsiceFile>) -> Result<()> {
    let manifest: Manifest = bdoc_xml::parse(data)?;

    let mut seen = HashSet::new();
    for entry in &manifest.file_entries {
        if !seen.insert(entry.full_path.as_str()) {
            return Err(Error::DuplicateManifestEntry {
                path: entry.full_path.clone(),
            });
        }

        if entry.full_path == ROOT_PATH {
            if entry.media_type != algorithm::ASICE_MIMETYPE {
                return Err(Error::ManifestRootMimetype {
                    mimetype: entry.media_type.clone(),
                });
            }
            continue;
        }

        let file = files
            .get_mut(&entry.full_path)
            .ok_or_else(|| Error::ExtraManifestEntry {
                path: entry.full_path.clone(),
            })?;
        if file.is_signature() {
            return Err(Error::SignatureInManifest {
                path: entry.full_path.clone(),
            });
        }
        file.mimetype = entry.media_type.clone();
    }

    if let Some(file) = files
        .values()
        .find(|f| !f.is_signature() && f.mimetype.is_empty())
    {
        return Err(Error::MissingManifestEntry {
            name: file.name.clone(),
        });
    }
    Ok(())
}
