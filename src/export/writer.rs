//! File access for exporters

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Filesystem operations the export pipeline needs.
pub trait FileWriter {
    /// Current contents, or `None` when the file does not exist.
    fn read(&self, path: &Path) -> io::Result<Option<String>>;

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    fn remove(&self, path: &Path) -> io::Result<()>;

    /// Files (not directories) directly inside `dir`, sorted. Empty when
    /// the directory does not exist.
    fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;
}

/// Writes through a temp file in the target directory, then renames.
#[derive(Debug, Clone, Copy, Default)]
pub struct AtomicFileWriter;

impl FileWriter for AtomicFileWriter {
    fn read(&self, path: &Path) -> io::Result<Option<String>> {
        match fs::read_to_string(path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("output");
        let temp_path = dir.join(format!(".{}.tmp", file_name));

        fs::write(&temp_path, contents)?;
        if let Err(e) = fs::rename(&temp_path, path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }
        Ok(())
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Called with each existing file right before it is overwritten.
pub trait BackupHook {
    fn before_overwrite(&self, path: &Path) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackup;

impl BackupHook for NoBackup {
    fn before_overwrite(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_creates_parents_and_leaves_no_temp() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".cursor/rules/testing.mdc");

        AtomicFileWriter.write(&path, b"hello").unwrap();

        assert_eq!(AtomicFileWriter.read(&path).unwrap().as_deref(), Some("hello"));
        let listed = AtomicFileWriter.list(path.parent().unwrap()).unwrap();
        assert_eq!(listed, vec![path]);
    }

    #[test]
    fn test_read_and_list_missing() {
        let temp = TempDir::new().unwrap();
        assert!(AtomicFileWriter.read(&temp.path().join("nope")).unwrap().is_none());
        assert!(AtomicFileWriter.list(&temp.path().join("nodir")).unwrap().is_empty());
    }
}
