#![forbid(unsafe_code)]

//! ASiC-E archive reader.

use std::collections::{BTreeMap, HashSet};
use std::io::{Cursor, Read};
use std::sync::Arc;

use bdoc_core::{algorithm, Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use zip::CompressionMethod;

use crate::manifest;
use crate::pool::{BufferPool, PooledBuffer};

/// Folder holding the manifest and signatures.
pub const META_INF: &str = "META-INF/";

/// Name of the manifest inside the archive.
pub const MANIFEST: &str = "META-INF/manifest.xml";

/// Name of the magic entry that must come first.
pub const MAGIC: &str = "mimetype";

/// Length of a ZIP local file header without name and extra field.
const LOCAL_HEADER_LEN: usize = 30;

/// Length of a central directory file header without variable fields.
const CENTRAL_HEADER_LEN: usize = 46;

/// Length of the end of central directory record without its comment.
const END_RECORD_LEN: usize = 22;

static SIGNATURE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^META-INF/[^/]*signatures[^/]*\.xml$").expect("signature file pattern compiles")
});

/// Whether `name` is a signature file.
pub fn is_signature_name(name: &str) -> bool {
    SIGNATURE_RE.is_match(name)
}

/// Size limits applied while reading an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum length of the archive itself.
    pub archive: u64,
    /// Maximum decompressed length of a single member.
    pub file: u64,
}

/// A decompressed archive member.
#[derive(Debug)]
pub struct AsiceFile {
    pub name: String,
    /// Media type from the manifest, empty for signatures.
    pub mimetype: String,
    pub data: PooledBuffer,
}

impl AsiceFile {
    pub fn is_signature(&self) -> bool {
        is_signature_name(&self.name)
    }
}

/// The checked contents of an ASiC-E archive.
///
/// The mimetype entry and manifest are consumed while opening and are not
/// part of the result.
#[derive(Debug)]
pub struct Archive {
    pub files: BTreeMap<String, AsiceFile>,
    /// Number of signature files, counted even when they are not read.
    pub signature_count: usize,
}

impl Archive {
    /// Open an archive from `reader`.
    ///
    /// With `read_signatures` unset signature files are only counted, which
    /// is enough to list the data of a container without verifying it.
    pub fn open<R: Read>(
        reader: R,
        limits: Limits,
        read_signatures: bool,
        pool: &Arc<BufferPool>,
    ) -> Result<Self> {
        let mut raw = pool.acquire();
        if !read_limited(reader, limits.archive, raw.as_mut_vec())? {
            return Err(Error::ArchiveTooLarge {
                limit: limits.archive,
            });
        }

        // Fail fast on the magic entry before reading the central directory.
        check_magic(&raw).map_err(|e| Error::NotAsice(Box::new(e)))?;

        // The zip crate keys entries by name, so a repeated name would
        // silently replace the earlier entry. Check the raw records first.
        let names = central_names(&raw)?;
        let mut seen = HashSet::new();
        for name in &names {
            if !seen.insert(name.as_slice()) {
                return Err(Error::DuplicateFileName {
                    name: String::from_utf8_lossy(name).into_owned(),
                });
            }
        }

        let mut zip =
            zip::ZipArchive::new(Cursor::new(&raw[..])).map_err(|e| Error::Zip(e.to_string()))?;
        if zip.len() != names.len() {
            return Err(Error::Zip(format!(
                "central directory has {} records but {} entries were read",
                names.len(),
                zip.len()
            )));
        }

        let mut files = BTreeMap::new();
        let mut manifest_data: Option<PooledBuffer> = None;
        let mut signature_count = 0;

        for index in 0..zip.len() {
            let name = zip
                .by_index_raw(index)
                .map_err(|e| Error::Zip(e.to_string()))?
                .name()
                .to_owned();

            if index == 0 {
                check_magic_central(&mut zip)?;
                continue;
            }

            if name == META_INF {
                continue;
            }
            if name == MANIFEST {
                manifest_data = Some(decompress(&mut zip, index, &name, limits.file, pool)?);
                continue;
            }
            if is_signature_name(&name) {
                signature_count += 1;
                if !read_signatures {
                    log::debug!("skipping signature file {name}");
                    continue;
                }
            } else if name.starts_with(META_INF) {
                return Err(Error::UnknownMetaInfFile { name });
            } else if name.contains('/') {
                return Err(Error::FileInSubfolder { name });
            }

            let data = decompress(&mut zip, index, &name, limits.file, pool)?;
            log::debug!("read {name} ({} bytes)", data.len());
            files.insert(
                name.clone(),
                AsiceFile {
                    name,
                    mimetype: String::new(),
                    data,
                },
            );
        }

        // The mimetype entry is known to be first, so with a manifest, a
        // signature and a data file the container is complete.
        let manifest_data = manifest_data.ok_or(Error::MissingManifest)?;
        if signature_count == 0 {
            return Err(Error::NoSignatures);
        }
        let mut data_files = files.len();
        if read_signatures {
            data_files -= signature_count;
        }
        if data_files == 0 {
            return Err(Error::NoDataFiles);
        }

        manifest::apply(&manifest_data, &mut files).map_err(|e| Error::Manifest(Box::new(e)))?;
        Ok(Self {
            files,
            signature_count,
        })
    }

    /// Data files in name order.
    pub fn data_files(&self) -> impl Iterator<Item = &AsiceFile> {
        self.files.values().filter(|f| !f.is_signature())
    }

    /// Signature files in name order.
    pub fn signature_files(&self) -> impl Iterator<Item = &AsiceFile> {
        self.files.values().filter(|f| f.is_signature())
    }
}

/// Read everything from `reader` into `buf`. Returns false if more than
/// `limit` bytes are available.
fn read_limited<R: Read>(reader: R, limit: u64, buf: &mut Vec<u8>) -> std::io::Result<bool> {
    let read = reader.take(limit.saturating_add(1)).read_to_end(buf)?;
    Ok(read as u64 <= limit)
}

fn le16(b: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([b[at], b[at + 1]])
}

fn le32(b: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

/// Check the local header and content of the leading mimetype entry.
fn check_magic(raw: &[u8]) -> Result<()> {
    let mime = algorithm::ASICE_MIMETYPE;
    let len = LOCAL_HEADER_LEN + MAGIC.len() + mime.len();
    let header = raw
        .get(..len)
        .ok_or(Error::ReadMagicFileHeader { len: raw.len() })?;

    if &header[..4] != b"PK\x03\x04" {
        return Err(Error::NoZipMagic);
    }

    let name_len = le16(header, 26);
    if usize::from(name_len) != MAGIC.len() {
        return Err(Error::MagicLength { len: name_len });
    }
    let name = &header[LOCAL_HEADER_LEN..LOCAL_HEADER_LEN + MAGIC.len()];
    if name != MAGIC.as_bytes() {
        return Err(Error::NotAsicMagic {
            name: String::from_utf8_lossy(name).into_owned(),
        });
    }

    let method = le16(header, 8);
    if method != 0 {
        return Err(Error::CompressedMimetype { method });
    }
    let extra = le16(header, 28);
    if extra != 0 {
        return Err(Error::MimetypeExtraField { len: extra });
    }

    let size = le32(header, 18);
    if size as usize != mime.len() {
        return Err(Error::MimetypeLength { len: size });
    }
    let content = &header[LOCAL_HEADER_LEN + MAGIC.len()..];
    if content != mime.as_bytes() {
        return Err(Error::NotAsiceMimetype {
            mimetype: String::from_utf8_lossy(content).into_owned(),
        });
    }
    Ok(())
}

/// Raw names of all central directory records, in archive order.
fn central_names(raw: &[u8]) -> Result<Vec<Vec<u8>>> {
    let malformed = |what: &str| Error::Zip(format!("malformed central directory: {what}"));

    // The end record is followed by at most a 64 KiB comment.
    let search = raw
        .len()
        .saturating_sub(END_RECORD_LEN + usize::from(u16::MAX));
    let end = raw[search..]
        .windows(4)
        .rposition(|w| w == b"PK\x05\x06")
        .map(|at| search + at)
        .ok_or_else(|| malformed("no end record"))?;
    let record = raw
        .get(end..end + END_RECORD_LEN)
        .ok_or_else(|| malformed("truncated end record"))?;

    let total = le16(record, 10);
    let offset = le32(record, 16);
    if total == u16::MAX || offset == u32::MAX {
        return Err(Error::Zip("ZIP64 archives are not supported".into()));
    }

    let mut names = Vec::with_capacity(usize::from(total));
    let mut at = offset as usize;
    for _ in 0..total {
        let header = raw
            .get(at..at + CENTRAL_HEADER_LEN)
            .filter(|h| h.starts_with(b"PK\x01\x02"))
            .ok_or_else(|| malformed("bad file header"))?;
        let name_len = usize::from(le16(header, 28));
        let extra_len = usize::from(le16(header, 30));
        let comment_len = usize::from(le16(header, 32));

        let start = at + CENTRAL_HEADER_LEN;
        let name = raw
            .get(start..start + name_len)
            .ok_or_else(|| malformed("truncated file name"))?;
        names.push(name.to_vec());
        at = start + name_len + extra_len + comment_len;
    }
    Ok(names)
}

/// Check that the central directory agrees with the local mimetype header.
fn check_magic_central<R: Read + std::io::Seek>(zip: &mut zip::ZipArchive<R>) -> Result<()> {
    let file = zip.by_index_raw(0).map_err(|e| Error::Zip(e.to_string()))?;

    if file.name() != MAGIC {
        return Err(Error::MimetypeCentralName {
            name: file.name().to_owned(),
        });
    }
    // Without an extra field the data of the first entry starts right
    // after its name.
    let offset = file.data_start();
    if offset != (LOCAL_HEADER_LEN + MAGIC.len()) as u64 {
        return Err(Error::MimetypeCentralOffset { offset });
    }
    if file.compression() != CompressionMethod::Stored {
        return Err(Error::MimetypeCentralMethod {
            method: file.compression().to_string(),
        });
    }
    if file.compressed_size() != algorithm::ASICE_MIMETYPE.len() as u64 {
        return Err(Error::MimetypeCentralSize {
            size: file.compressed_size(),
        });
    }
    let extra = file.extra_data().map_or(0, <[u8]>::len);
    if extra != 0 {
        return Err(Error::MimetypeCentralExtra { len: extra });
    }
    Ok(())
}

/// Decompress one member into a pooled buffer, enforcing `limit` and the
/// declared uncompressed size.
fn decompress<R: Read + std::io::Seek>(
    zip: &mut zip::ZipArchive<R>,
    index: usize,
    name: &str,
    limit: u64,
    pool: &Arc<BufferPool>,
) -> Result<PooledBuffer> {
    let file = zip.by_index(index).map_err(|e| Error::Decompress {
        name: name.to_owned(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
    })?;
    let declared = file.size();

    let mut data = pool.acquire();
    let within = read_limited(file, limit, data.as_mut_vec()).map_err(|source| {
        Error::Decompress {
            name: name.to_owned(),
            source,
        }
    })?;
    if !within {
        return Err(Error::FileTooLarge {
            name: name.to_owned(),
            limit,
        });
    }

    let actual = data.len() as u64;
    if declared != actual {
        return Err(Error::UncompressedSize {
            name: name.to_owned(),
            declared,
            actual,
        });
    }
    Ok(data)
}
