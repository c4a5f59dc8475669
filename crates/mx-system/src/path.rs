//! Safe path handling for filesystem calls.
//!
//! Windows limits ordinary paths to `MAX_PATH` characters. Absolute paths
//! prefixed with the `\\?\` escape bypass that limit, so every wrapper here
//! routes its arguments through [`safe_path`] before touching the OS. On all
//! other platforms the transform is the identity.

use std::fs::{self, File, Metadata, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use mx_config::log_io_debug;
use tracing::field::display;
use walkdir::WalkDir;

use crate::error::{Result, SystemError};
use crate::platform::Os;

const SEP: char = '\\';

/// Transform `path` so it is safe to hand to OS calls on `os`.
pub fn safe_path(path: impl AsRef<Path>, os: Os) -> PathBuf {
    let path = path.as_ref();
    if os.is_windows() {
        PathBuf::from(windows_safe_path(&path.to_string_lossy()))
    } else {
        path.to_path_buf()
    }
}

/// Long-path form of a Windows path.
///
/// The path is normalized first. Absolute UNC paths (`\\server\share\x`)
/// become `\\?\UNC\server\share\x`, other absolute paths get a `\\?\` prefix,
/// and paths that already carry the escape are left alone.
pub fn windows_safe_path(path: &str) -> String {
    let path = windows_normpath(path);
    if !windows_isabs(&path) {
        return path;
    }
    if let Some(rest) = path.strip_prefix(r"\\") {
        if rest.starts_with(r"?\") {
            path
        } else {
            format!(r"\\?\UNC\{rest}")
        }
    } else {
        format!(r"\\?\{path}")
    }
}

/// Split a Windows path into drive (`C:` or `\\server\share`) and the rest.
fn windows_splitdrive(path: &str) -> (&str, &str) {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0] == b'\\' && bytes[1] == b'\\' && bytes.get(2) != Some(&b'\\') {
        let Some(index) = path[2..].find(SEP).map(|i| i + 2) else {
            return ("", path);
        };
        let index2 = match path[index + 1..].find(SEP).map(|i| i + index + 1) {
            Some(i) if i == index + 1 => return ("", path),
            Some(i) => i,
            None => path.len(),
        };
        return path.split_at(index2);
    }
    if bytes.len() >= 2 && bytes[1] == b':' {
        return path.split_at(2);
    }
    ("", path)
}

fn windows_isabs(path: &str) -> bool {
    let (_, rest) = windows_splitdrive(path);
    rest.starts_with(SEP)
}

/// Lexically normalize a Windows path: unify separators, drop `.` and empty
/// components, and fold `..` where possible.
fn windows_normpath(path: &str) -> String {
    let path = path.replace('/', r"\");
    if path.starts_with(r"\\.\") || path.starts_with(r"\\?\") {
        return path;
    }

    let (drive, rest) = windows_splitdrive(&path);
    let mut prefix = drive.to_string();
    let rest = if rest.starts_with(SEP) {
        prefix.push(SEP);
        rest.trim_start_matches(SEP)
    } else {
        rest
    };

    let mut comps: Vec<&str> = Vec::new();
    for comp in rest.split(SEP) {
        match comp {
            "" | "." => {}
            ".." => match comps.last() {
                Some(last) if *last != ".." => {
                    comps.pop();
                }
                None if prefix.ends_with(SEP) => {}
                _ => comps.push(comp),
            },
            _ => comps.push(comp),
        }
    }

    if prefix.is_empty() && comps.is_empty() {
        return ".".to_string();
    }
    prefix + &comps.join(r"\")
}

/// Open `path` for reading.
pub fn open(path: impl AsRef<Path>, os: Os) -> Result<File> {
    Ok(File::open(safe_path(path, os))?)
}

/// Open `path` with explicit options.
pub fn open_with(path: impl AsRef<Path>, options: &OpenOptions, os: Os) -> Result<File> {
    Ok(options.open(safe_path(path, os))?)
}

pub fn stat(path: impl AsRef<Path>, os: Os) -> Result<Metadata> {
    Ok(fs::metadata(safe_path(path, os))?)
}

pub fn lstat(path: impl AsRef<Path>, os: Os) -> Result<Metadata> {
    Ok(fs::symlink_metadata(safe_path(path, os))?)
}

/// Last modification time of `path`.
pub fn getmtime(path: impl AsRef<Path>, os: Os) -> Result<SystemTime> {
    Ok(stat(path, os)?.modified()?)
}

/// Recursively copy `src` to `dst`, which must not exist yet.
///
/// With `symlinks` set, symbolic links are recreated in the copy; otherwise
/// the files they point to are copied.
pub fn copytree(src: impl AsRef<Path>, dst: impl AsRef<Path>, symlinks: bool, os: Os) -> Result<()> {
    let src = safe_path(src, os);
    let dst = safe_path(dst, os);

    if dst.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("Destination already exists: {}", dst.display()),
        )
        .into());
    }

    for entry in WalkDir::new(&src).follow_links(!symlinks) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry.path().strip_prefix(&src).map_err(io::Error::other)?;
        let target = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            let link = fs::read_link(entry.path())?;
            make_symlink(&link, &target, entry.path())?;
        } else if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }

    log_io_debug!("Copied tree", src = display(src.display()), dst = display(dst.display()));
    Ok(())
}

#[cfg(unix)]
fn make_symlink(link: &Path, target: &Path, _original: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(link, target)
}

#[cfg(windows)]
fn make_symlink(link: &Path, target: &Path, original: &Path) -> io::Result<()> {
    if fs::metadata(original).map(|m| m.is_dir()).unwrap_or(false) {
        std::os::windows::fs::symlink_dir(link, target)
    } else {
        std::os::windows::fs::symlink_file(link, target)
    }
}

/// What to do when deleting an entry fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorPolicy {
    Ignore,
    ClearReadOnly,
    Propagate,
}

impl ErrorPolicy {
    fn new(ignore_errors: bool, os: Os) -> Self {
        if ignore_errors {
            ErrorPolicy::Ignore
        } else if os.is_windows() {
            ErrorPolicy::ClearReadOnly
        } else {
            ErrorPolicy::Propagate
        }
    }

    fn handle(self, path: &Path, err: io::Error) -> Result<()> {
        match self {
            ErrorPolicy::Ignore => {
                log_io_debug!("Ignoring removal error", path = display(path.display()), error = display(&err));
                Ok(())
            }
            ErrorPolicy::ClearReadOnly => {
                log_io_debug!("Clearing read-only flag and retrying", path = display(path.display()));
                let mut perms = fs::symlink_metadata(path)?.permissions();
                perms.set_readonly(false);
                fs::set_permissions(path, perms)?;
                if path.is_dir() {
                    fs::remove_dir(path)?;
                } else {
                    fs::remove_file(path)?;
                }
                Ok(())
            }
            ErrorPolicy::Propagate => Err(err.into()),
        }
    }
}

/// Recursively delete `path`.
///
/// With `ignore_errors` every failure is swallowed. Otherwise read-only
/// entries are made writable and retried on Windows, and errors propagate
/// elsewhere. A path that is not a directory is removed as a single file;
/// a missing file is not an error.
pub fn rmtree(path: impl AsRef<Path>, ignore_errors: bool, os: Os) -> Result<()> {
    let path = safe_path(path, os);
    let policy = ErrorPolicy::new(ignore_errors, os);

    let is_dir = fs::symlink_metadata(&path)
        .map(|m| m.file_type().is_dir())
        .unwrap_or(false);

    if is_dir {
        remove_tree(&path, policy)
    } else {
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => policy.handle(&path, e),
        }
    }
}

fn remove_tree(root: &Path, policy: ErrorPolicy) -> Result<()> {
    for entry in WalkDir::new(root).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().unwrap_or(root).to_path_buf();
                policy.handle(&path, io::Error::from(err))?;
                continue;
            }
        };

        let removed = if entry.file_type().is_dir() {
            fs::remove_dir(entry.path())
        } else {
            fs::remove_file(entry.path())
        };
        if let Err(e) = removed {
            policy.handle(entry.path(), e)?;
        }
    }
    Ok(())
}

/// Join `prefix` with the path from `start` to `path`.
///
/// When no relative path exists (different roots or drives) an absolute
/// `path` is returned as-is; a relative one is an error.
pub fn relpath_or_absolute(
    path: impl AsRef<Path>,
    start: impl AsRef<Path>,
    prefix: impl AsRef<Path>,
) -> Result<PathBuf> {
    let path = path.as_ref();
    match relative_path(path, start.as_ref()) {
        Some(relative) => Ok(prefix.as_ref().join(relative)),
        None if path.is_absolute() => Ok(path.to_path_buf()),
        None => Err(SystemError::NoRelativePath(path.to_path_buf())),
    }
}

/// Relative path from `start` to `path`, resolved lexically.
pub fn relative_path(path: &Path, start: &Path) -> Option<PathBuf> {
    let path = lexical_absolute(path)?;
    let start = lexical_absolute(start)?;

    let mut path_iter = path.components();
    let mut start_iter = start.components();

    // Both are absolute: their first component is the root (or drive prefix).
    if path_iter.next() != start_iter.next() {
        return None;
    }

    let path_rest: Vec<Component> = path_iter.collect();
    let start_rest: Vec<Component> = start_iter.collect();
    let common = path_rest
        .iter()
        .zip(start_rest.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..start_rest.len() {
        relative.push("..");
    }
    for comp in &path_rest[common..] {
        relative.push(comp.as_os_str());
    }
    if relative.as_os_str().is_empty() {
        relative.push(".");
    }
    Some(relative)
}

fn lexical_absolute(path: &Path) -> Option<PathBuf> {
    let absolute = std::path::absolute(path).ok()?;
    let mut normalized = PathBuf::new();
    for comp in absolute.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Some(normalized)
}
