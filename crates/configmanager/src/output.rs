//! Output destinations for CLI results
//!
//! `stdout` means standard output; anything else is a file path that is
//! created if needed and truncated on write. A file that is also the input is
//! rewritten through a temporary file in the same directory and renamed into
//! place.

use crate::error::{ConfigManagerError, Result};
use configmanager_secrets::STDOUT_PATH;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Where command output goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Standard output
    Stdout,
    /// A file on disk
    File(PathBuf),
}

impl Destination {
    /// Interpret a `--path` value
    #[must_use]
    pub fn parse(path: &str) -> Self {
        if path == STDOUT_PATH {
            Self::Stdout
        } else {
            Self::File(PathBuf::from(path))
        }
    }

    /// Write `contents`, replacing whatever the destination held.
    ///
    /// # Errors
    ///
    /// Returns an I/O error naming the path on failure.
    pub fn write(&self, contents: &str) -> Result<()> {
        match self {
            Self::Stdout => {
                let mut stdout = std::io::stdout().lock();
                stdout
                    .write_all(contents.as_bytes())
                    .and_then(|()| stdout.flush())
                    .map_err(|e| ConfigManagerError::io("write", STDOUT_PATH, e))
            }
            Self::File(path) => {
                tracing::debug!(path = %path.display(), bytes = contents.len(), "writing output");
                fs::write(path, contents).map_err(|e| ConfigManagerError::io("write", path, e))
            }
        }
    }

    /// Write `contents` given that they were derived from `input`.
    ///
    /// When this destination is the same file as `input` the write goes
    /// through [`replace_in_place`].
    ///
    /// # Errors
    ///
    /// Returns an I/O error naming the path on failure.
    pub fn write_derived(&self, input: &Path, contents: &str) -> Result<()> {
        match self {
            Self::File(path) if same_file(input, path) => replace_in_place(path, contents),
            _ => self.write(contents),
        }
    }
}

/// Whether `a` and `b` name the same existing file
#[must_use]
pub fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Atomically replace `path` with `contents`, keeping its permissions.
///
/// # Errors
///
/// Returns an I/O error naming the path on failure.
pub fn replace_in_place(path: &Path, contents: &str) -> Result<()> {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut temp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| ConfigManagerError::io("create a temporary file in", dir, e))?;
    temp.write_all(contents.as_bytes())
        .and_then(|()| temp.flush())
        .map_err(|e| ConfigManagerError::io("write", temp.path(), e))?;

    if let Ok(metadata) = fs::metadata(path) {
        fs::set_permissions(temp.path(), metadata.permissions())
            .map_err(|e| ConfigManagerError::io("set permissions on", temp.path(), e))?;
    }

    temp.persist(path)
        .map_err(|e| ConfigManagerError::io("replace", path, e.error))?;
    tracing::debug!(path = %path.display(), "replaced file in place");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(Destination::parse("stdout"), Destination::Stdout);
        assert_eq!(
            Destination::parse("/tmp/out.env"),
            Destination::File(PathBuf::from("/tmp/out.env"))
        );
    }

    #[test]
    fn test_file_is_created_then_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.env");
        let dest = Destination::File(path.clone());

        dest.write("a much longer first write\n").unwrap();
        dest.write("short\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "short\n");
    }

    #[test]
    fn test_missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let dest = Destination::File(dir.path().join("missing").join("out.env"));
        let err = dest.write("x").unwrap_err();
        assert!(matches!(err, ConfigManagerError::Io { operation: "write", .. }));
    }

    #[test]
    fn test_same_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.txt");
        fs::write(&path, "x").unwrap();

        let dotted = dir.path().join(".").join("in.txt");
        assert!(same_file(&path, &dotted));
        assert!(!same_file(&path, &dir.path().join("other.txt")));
    }

    #[test]
    fn test_write_derived_replaces_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.txt");
        fs::write(&path, "pwd=AWSSECRETS://db\n").unwrap();

        Destination::File(path.clone())
            .write_derived(&path, "pwd=s1\n")
            .unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "pwd=s1\n");

        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_replace_in_place_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.sh");
        fs::write(&path, "old").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o750)).unwrap();

        replace_in_place(&path, "new").unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o750);
    }
}
