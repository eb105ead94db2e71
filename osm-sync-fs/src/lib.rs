//! Shared filesystem helpers built on `cap-std` and `camino`.
//!
//! The synchronisation core stages downloaded payloads in a fixed directory
//! and the edit store keeps its objects in JSON files; both go through these
//! helpers so that every path is opened relative to an explicit directory
//! capability.
#![forbid(unsafe_code)]

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};
use std::io::{self, Read, Write};
use std::path::Component;

/// Open a UTF-8 file path using ambient authority.
pub fn open_utf8_file(path: &Utf8Path) -> io::Result<fs_utf8::File> {
    fs_utf8::File::open_ambient(path, ambient_authority())
}

/// Resolve an ambient directory for the given path and return the directory with the file name.
pub fn open_dir_and_file(path: &Utf8Path) -> io::Result<(fs_utf8::Dir, String)> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::other("target should include a file name"))?
        .to_owned();
    let dir = fs_utf8::Dir::open_ambient_dir(parent, ambient_authority())?;
    Ok((dir, file_name))
}

/// Ensure the parent directory for `path` exists, handling absolute paths safely for cap-std.
pub fn ensure_parent_dir(path: &Utf8Path) -> io::Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    ensure_dir(parent)
}

/// Ensure `dir` exists, creating intermediate directories as needed.
pub fn ensure_dir(dir: &Utf8Path) -> io::Result<()> {
    if dir.as_os_str().is_empty() || dir == Utf8Path::new("/") {
        return Ok(());
    }

    let (base_dir, relative) = base_dir_and_relative(dir)?;
    if relative.as_os_str().is_empty() {
        return Ok(());
    }
    base_dir.create_dir_all(&relative)?;
    Ok(())
}

/// Return whether a path exists and is a regular file using capability-based IO.
pub fn file_is_file(path: &Utf8Path) -> io::Result<bool> {
    let (dir, name) = open_dir_and_file(path)?;
    dir.metadata(name.as_str()).map(|meta| meta.is_file())
}

/// Read the whole file at `path` into memory.
pub fn read_file(path: &Utf8Path) -> io::Result<Vec<u8>> {
    let mut file = open_utf8_file(path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Replace the contents of `path` with `bytes`, truncating any previous content.
///
/// The parent directory is created when missing.
pub fn write_file(path: &Utf8Path, bytes: &[u8]) -> io::Result<()> {
    ensure_parent_dir(path)?;
    let (dir, name) = open_dir_and_file(path)?;
    let mut file = dir.create(name.as_str())?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Replace the contents of `path` with `bytes` via a sibling temporary file.
///
/// Readers observe either the previous or the new content, never a partial
/// write.
pub fn write_file_atomically(path: &Utf8Path, bytes: &[u8]) -> io::Result<()> {
    stage_file(path, bytes)?.commit()
}

/// Content written beside its target file and not yet moved over it.
///
/// Staging several files before committing any of them lets callers keep
/// related files in step: if one write fails, no target has changed yet.
#[derive(Debug)]
pub struct StagedFile {
    dir: fs_utf8::Dir,
    staging_name: String,
    name: String,
}

/// Write `bytes` to a temporary sibling of `path`, leaving `path` untouched.
///
/// The parent directory is created when missing.
pub fn stage_file(path: &Utf8Path, bytes: &[u8]) -> io::Result<StagedFile> {
    ensure_parent_dir(path)?;
    let (dir, name) = open_dir_and_file(path)?;
    let staging_name = format!(".{name}.tmp");
    let mut file = dir.create(staging_name.as_str())?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(StagedFile {
        dir,
        staging_name,
        name,
    })
}

impl StagedFile {
    /// Move the staged content over the target in one rename.
    pub fn commit(self) -> io::Result<()> {
        self.dir
            .rename(self.staging_name.as_str(), &self.dir, self.name.as_str())
    }

    /// Remove the staged content; the target keeps its previous content.
    pub fn discard(self) -> io::Result<()> {
        self.dir.remove_file(self.staging_name.as_str())
    }
}

/// Split an absolute or relative parent path into an ambient base directory and a relative suffix.
pub fn base_dir_and_relative(parent: &Utf8Path) -> io::Result<(fs_utf8::Dir, Utf8PathBuf)> {
    let std_parent = parent.as_std_path();

    let (base, relative) = match std_parent.components().next() {
        // Windows absolute path with a drive or UNC prefix.
        Some(Component::Prefix(prefix)) => {
            let prefix_str = prefix
                .as_os_str()
                .to_str()
                .ok_or_else(|| io::Error::other("non-UTF-8 path prefix"))?;

            let base = Utf8PathBuf::from(prefix_str).join(std::path::MAIN_SEPARATOR.to_string());
            let relative = std_parent
                .strip_prefix(base.as_std_path())
                .or_else(|_| std_parent.strip_prefix(prefix.as_os_str()))
                .map_err(|_| io::Error::other("failed to strip prefix from parent path"))?
                .to_path_buf();
            (base, relative)
        }
        Some(Component::RootDir) => {
            let base = Utf8PathBuf::from(std::path::MAIN_SEPARATOR.to_string());
            let relative = std_parent
                .strip_prefix(base.as_std_path())
                .map_err(|_| io::Error::other("failed to strip root from absolute path"))?
                .to_path_buf();
            (base, relative)
        }
        _ => (Utf8PathBuf::from("."), std_parent.to_path_buf()),
    };

    let dir = fs_utf8::Dir::open_ambient_dir(&base, ambient_authority())?;
    let relative = Utf8PathBuf::from_path_buf(relative)
        .map_err(|_| io::Error::other("non-UTF-8 parent path"))?;

    Ok((dir, relative))
}
