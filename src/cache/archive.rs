//! Artifact archives: gzip-compressed tarballs of a target's outputs
//!
//! Entries are named by their path relative to the target's base directory,
//! so unpacking an artifact reproduces the output layout under any root.
//! Headers carry no timestamps or ownership, keeping archives of identical
//! trees byte-identical.
//!
//! Both functions do blocking I/O; async callers run them on the blocking
//! pool.

use crate::error::{GbuildError, GbuildResult};
use crate::fingerprint::ignore::is_always_ignored;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use tar::{Archive, Builder, EntryType, Header};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Pack `outputs` (relative to `base`) into a `.tar.gz` at `dest`
///
/// Returns the number of entries written. A missing output aborts the pack.
pub fn pack(base: &Path, outputs: &[String], dest: &Path) -> GbuildResult<usize> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| GbuildError::io(format!("creating {}", parent.display()), e))?;
    }
    let file = File::create(dest)
        .map_err(|e| GbuildError::io(format!("creating {}", dest.display()), e))?;
    let mut builder = Builder::new(GzEncoder::new(BufWriter::new(file), Compression::default()));

    let mut count = 0;
    for output in outputs {
        let start = base.join(output);
        if !start.exists() {
            return Err(GbuildError::PathNotFound(start));
        }

        let entries = WalkDir::new(&start)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_always_ignored(e.file_name()));

        for entry in entries {
            let entry = entry.map_err(|e| GbuildError::Walk {
                path: e.path().unwrap_or(&start).to_path_buf(),
                reason: e.to_string(),
            })?;
            let Ok(name) = entry.path().strip_prefix(base) else {
                continue;
            };
            let name = normalize(name);
            if name.as_os_str().is_empty() {
                continue;
            }
            if append_entry(&mut builder, entry.path(), &name)? {
                count += 1;
            }
        }
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| GbuildError::io(format!("finishing {}", dest.display()), e))?;
    let mut writer = encoder
        .finish()
        .map_err(|e| GbuildError::io(format!("compressing {}", dest.display()), e))?;
    writer
        .flush()
        .map_err(|e| GbuildError::io(format!("writing {}", dest.display()), e))?;

    debug!("Packed {} entries into {}", count, dest.display());
    Ok(count)
}

fn append_entry<W: Write>(builder: &mut Builder<W>, path: &Path, name: &Path) -> GbuildResult<bool> {
    let metadata = fs::symlink_metadata(path)
        .map_err(|e| GbuildError::io(format!("reading metadata of {}", path.display()), e))?;

    let mut header = Header::new_gnu();
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mode(file_mode(&metadata));

    let result = if metadata.is_dir() {
        header.set_entry_type(EntryType::Directory);
        header.set_size(0);
        builder.append_data(&mut header, name, io::empty())
    } else if metadata.is_file() {
        header.set_entry_type(EntryType::Regular);
        header.set_size(metadata.len());
        let file = File::open(path)
            .map_err(|e| GbuildError::io(format!("opening {}", path.display()), e))?;
        builder.append_data(&mut header, name, file)
    } else {
        warn!("Skipping {} in artifact: not a regular file", path.display());
        return Ok(false);
    };

    result.map_err(|e| GbuildError::io(format!("archiving {}", path.display()), e))?;
    Ok(true)
}

#[cfg(unix)]
fn file_mode(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(metadata: &fs::Metadata) -> u32 {
    if metadata.is_dir() {
        0o755
    } else {
        0o644
    }
}

/// Unpack the `.tar.gz` at `archive` into `dest`
///
/// Any entry whose path is absolute or climbs out of `dest` rejects the
/// whole archive. Only regular files and directories are extracted.
pub fn unpack(archive: &Path, dest: &Path) -> GbuildResult<usize> {
    let file = File::open(archive)
        .map_err(|e| GbuildError::io(format!("opening {}", archive.display()), e))?;
    let mut tarball = Archive::new(GzDecoder::new(file));
    fs::create_dir_all(dest)
        .map_err(|e| GbuildError::io(format!("creating {}", dest.display()), e))?;

    let entries = tarball
        .entries()
        .map_err(|e| GbuildError::io(format!("reading {}", archive.display()), e))?;

    let mut count = 0;
    for entry in entries {
        let mut entry =
            entry.map_err(|e| GbuildError::io(format!("reading {}", archive.display()), e))?;
        let raw = entry
            .path()
            .map_err(|e| GbuildError::io(format!("reading entry path in {}", archive.display()), e))?
            .into_owned();
        let relative = contained_path(&raw)?;
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = dest.join(&relative);

        match entry.header().entry_type() {
            EntryType::Directory => {
                fs::create_dir_all(&target)
                    .map_err(|e| GbuildError::io(format!("creating {}", target.display()), e))?;
            }
            EntryType::Regular | EntryType::Continuous => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)
                        .map_err(|e| GbuildError::io(format!("creating {}", parent.display()), e))?;
                }
                entry
                    .unpack(&target)
                    .map_err(|e| GbuildError::io(format!("extracting {}", target.display()), e))?;
            }
            other => {
                warn!("Skipping {} in {}: unsupported entry type {:?}", raw.display(), archive.display(), other);
                continue;
            }
        }
        count += 1;
    }

    debug!("Unpacked {} entries from {}", count, archive.display());
    Ok(count)
}

/// Validate an entry path, returning it with `.` components dropped
fn contained_path(path: &Path) -> GbuildResult<PathBuf> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(GbuildError::ArchivePathEscape(path.to_path_buf()));
            }
        }
    }
    Ok(clean)
}

fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}
