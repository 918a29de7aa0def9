//! File I/O utilities: atomic writes, recursive copy, tilde expansion,
//! extension stripping, directory-size accounting. Every mutating command
//! goes through `write_atomic` so a crash never leaves a half-written file
//! on disk.

use crate::core::error::CyberismoError;
use std::fs;
use std::path::{Path, PathBuf};

/// Write `contents` to `path`, creating parent directories as needed.
/// Writes to a sibling temp file first and renames into place so a reader
/// never observes a partially-written file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CyberismoError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| CyberismoError::filesystem(parent, e))?;
    }
    let tmp_path = sibling_tmp_path(path);
    fs::write(&tmp_path, contents).map_err(|e| CyberismoError::filesystem(&tmp_path, e))?;
    fs::rename(&tmp_path, path).map_err(|e| CyberismoError::filesystem(path, e))?;
    Ok(())
}

pub fn write_atomic_str(path: &Path, contents: &str) -> Result<(), CyberismoError> {
    write_atomic(path, contents.as_bytes())
}

fn sibling_tmp_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{file_name}.tmp-{}", std::process::id()))
}

/// Recursively copy `from` into `to`, creating directories as needed.
/// Used by module import and template instantiation.
pub fn copy_recursive(from: &Path, to: &Path) -> Result<(), CyberismoError> {
    if from.is_dir() {
        fs::create_dir_all(to).map_err(|e| CyberismoError::filesystem(to, e))?;
        for entry in fs::read_dir(from).map_err(|e| CyberismoError::filesystem(from, e))? {
            let entry = entry.map_err(|e| CyberismoError::filesystem(from, e))?;
            let dest = to.join(entry.file_name());
            copy_recursive(&entry.path(), &dest)?;
        }
    } else {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(|e| CyberismoError::filesystem(parent, e))?;
        }
        fs::copy(from, to).map_err(|e| CyberismoError::filesystem(to, e))?;
    }
    Ok(())
}

/// Recursively remove a file or directory; a no-op if it does not exist.
pub fn remove_recursive(path: &Path) -> Result<(), CyberismoError> {
    if !path.exists() {
        return Ok(());
    }
    if path.is_dir() {
        fs::remove_dir_all(path).map_err(|e| CyberismoError::filesystem(path, e))
    } else {
        fs::remove_file(path).map_err(|e| CyberismoError::filesystem(path, e))
    }
}

/// Expand a leading `~` to the user's home directory (`$HOME` on unix).
pub fn expand_tilde(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return Path::new(&home).join(rest);
        }
    } else if raw == "~" {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home);
        }
    }
    PathBuf::from(raw)
}

/// Strip a file's extension, returning the stem as a string (e.g.
/// `"decision.json"` -> `"decision"`). Used to derive a resource identifier
/// from its file name.
pub fn strip_extension(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.to_string())
}

/// Total size in bytes of a directory tree. Used by attachment/project
/// size reporting.
pub fn directory_size(path: &Path) -> Result<u64, CyberismoError> {
    let mut total = 0u64;
    if !path.exists() {
        return Ok(0);
    }
    if path.is_file() {
        return Ok(path.metadata().map_err(|e| CyberismoError::filesystem(path, e))?.len());
    }
    for entry in fs::read_dir(path).map_err(|e| CyberismoError::filesystem(path, e))? {
        let entry = entry.map_err(|e| CyberismoError::filesystem(path, e))?;
        let entry_path = entry.path();
        if entry_path.is_dir() {
            total += directory_size(&entry_path)?;
        } else {
            total += entry.metadata().map_err(|e| CyberismoError::filesystem(&entry_path, e))?.len();
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_atomic_creates_parents_and_content() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("a/b/c.json");
        write_atomic_str(&target, "{}").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "{}");
    }

    #[test]
    fn copy_recursive_copies_tree() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("nested/file.txt"), "hi").unwrap();
        let dst = dir.path().join("dst");
        copy_recursive(&src, &dst).unwrap();
        assert_eq!(fs::read_to_string(dst.join("nested/file.txt")).unwrap(), "hi");
    }

    #[test]
    fn strip_extension_handles_multi_dot() {
        assert_eq!(strip_extension("query.lp.hbs"), "query.lp");
        assert_eq!(strip_extension("decision.json"), "decision");
    }

    #[test]
    fn directory_size_sums_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "1234").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/b.txt"), "12").unwrap();
        assert_eq!(directory_size(dir.path()).unwrap(), 6);
    }

    #[test]
    fn expand_tilde_without_home_is_noop() {
        assert_eq!(expand_tilde("relative/path"), PathBuf::from("relative/path"));
    }
}
