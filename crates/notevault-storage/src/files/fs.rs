use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use notevault_fs::{atomic_write_bytes, commit_path_for, is_write_artifact, recover_atomic_file};

use super::{normalize_path, FilesStorage};
use crate::error::{Result, StorageError};

/// Files under a directory on disk. Writes go through the atomic writer and
/// reads first finish any write that was interrupted.
#[derive(Debug, Clone)]
pub struct FsFilesStorage {
    root: PathBuf,
}

impl FsFilesStorage {
    /// Create the root directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a logical path into the root. Names reserved for the atomic
    /// writer's scratch and commit files are refused.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = normalize_path(path)?;
        if relative.split('/').any(is_write_artifact) {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(relative.split('/').fold(self.root.clone(), |acc, seg| acc.join(seg)))
    }

    /// Remove empty directories from `dir` up to (not including) the root.
    fn prune_empty_dirs(&self, mut dir: &Path) {
        while dir != self.root && dir.starts_with(&self.root) {
            // Fails on non-empty directories, which ends the walk.
            if fs::remove_dir(dir).is_err() {
                break;
            }
            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }
    }

    fn collect(&self, dir: &Path, prefix: &str, out: &mut Vec<String>) -> io::Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let logical = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}/{name}")
            };
            if entry.file_type()?.is_dir() {
                self.collect(&entry.path(), &logical, out)?;
            } else if !is_write_artifact(&name) {
                out.push(logical);
            }
        }
        Ok(())
    }
}

impl FilesStorage for FsFilesStorage {
    fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let full = self.resolve(path)?;
        let outcome = recover_atomic_file(&full)?;
        if outcome.promoted {
            log::debug!("completed interrupted write of {path}");
        }
        match fs::read(&full) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let full = self.resolve(path)?;
        atomic_write_bytes(&full, bytes)?;
        Ok(())
    }

    fn delete(&self, paths: &[&str]) -> Result<()> {
        for path in paths {
            let full = self.resolve(path)?;
            for candidate in [full.clone(), commit_path_for(&full)] {
                match fs::remove_file(&candidate) {
                    Ok(()) => {}
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                    Err(err) => return Err(err.into()),
                }
            }
            if let Some(parent) = full.parent() {
                self.prune_empty_dirs(parent);
            }
        }
        Ok(())
    }

    fn delete_tree(&self, prefix: &str) -> Result<()> {
        let full = self.resolve(prefix)?;
        match fs::remove_dir_all(&full) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        }
        if let Some(parent) = full.parent() {
            self.prune_empty_dirs(parent);
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        self.collect(&self.root, "", &mut out)?;
        out.sort();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_get_list_delete() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FsFilesStorage::open(dir.path()).expect("open");

        storage.write("p1/profile.json", b"{}").expect("write");
        storage.write("p1/vault.db", b"db").expect("write");
        storage.write("top.txt", b"t").expect("write");

        assert_eq!(storage.get("p1/vault.db").expect("get"), Some(b"db".to_vec()));
        assert_eq!(storage.get("missing").expect("get"), None);
        assert_eq!(
            storage.list().expect("list"),
            vec!["p1/profile.json", "p1/vault.db", "top.txt"]
        );

        storage.delete(&["p1/profile.json", "p1/vault.db", "nope"]).expect("delete");
        assert!(!dir.path().join("p1").exists(), "emptied directory is pruned");
        assert!(dir.path().exists(), "root is kept");
        assert_eq!(storage.list().expect("list"), vec!["top.txt"]);
    }

    #[test]
    fn list_hides_write_artifacts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FsFilesStorage::open(dir.path()).expect("open");
        storage.write("a/vault.db", b"x").expect("write");
        let full = dir.path().join("a/vault.db");
        fs::write(commit_path_for(&full), b"pending").expect("commit file");
        fs::write(dir.path().join("a/.vault.db.abc.partial"), b"torn").expect("scratch");

        assert_eq!(storage.list().expect("list"), vec!["a/vault.db"]);
        // Reading finishes the pending write and discards the scratch file.
        assert_eq!(storage.get("a/vault.db").expect("get"), Some(b"pending".to_vec()));
        let mut names: Vec<_> = fs::read_dir(dir.path().join("a"))
            .expect("read_dir")
            .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["vault.db"]);
    }

    #[test]
    fn traversal_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FsFilesStorage::open(dir.path().join("root")).expect("open");
        assert!(matches!(
            storage.write("../outside.txt", b"x"),
            Err(StorageError::PathTraversal(_))
        ));
        assert!(!dir.path().join("outside.txt").exists());
    }

    #[test]
    fn temp_like_user_files_are_ordinary_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FsFilesStorage::open(dir.path()).expect("open");
        storage.write("notes.txt", b"original").expect("write");
        storage.write("notes.txt.tmp", b"other file").expect("write");
        storage.write("vault.db.commit", b"not a commit file").expect("write");

        assert_eq!(storage.get("notes.txt").expect("get"), Some(b"original".to_vec()));
        assert_eq!(
            storage.get("notes.txt.tmp").expect("get"),
            Some(b"other file".to_vec())
        );
        assert_eq!(
            storage.list().expect("list"),
            vec!["notes.txt", "notes.txt.tmp", "vault.db.commit"]
        );
    }

    #[test]
    fn reserved_artifact_names_are_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FsFilesStorage::open(dir.path()).expect("open");
        storage.write("vault.db", b"snapshot").expect("write");

        for reserved in [".vault.db.commit", "p/.vault.db.AbC123.partial", ".x.commit/y"] {
            assert!(
                matches!(
                    storage.write(reserved, b"evil"),
                    Err(StorageError::InvalidPath(_))
                ),
                "{reserved} should be refused"
            );
            assert!(matches!(
                storage.get(reserved),
                Err(StorageError::InvalidPath(_))
            ));
        }
        assert_eq!(storage.get("vault.db").expect("get"), Some(b"snapshot".to_vec()));
    }

    #[test]
    fn delete_tree_removes_everything_under_the_prefix() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FsFilesStorage::open(dir.path()).expect("open");
        storage.write("p1/vault.db", b"db").expect("write");
        storage.write("p1/draft.tmp", b"draft").expect("write");
        storage.write("p1/deep/a.png", b"png").expect("write");
        storage.write("p10/vault.db", b"other").expect("write");
        // Leftovers of an interrupted write are not listed but still removed.
        fs::write(dir.path().join("p1/.vault.db.AbC123.partial"), b"torn").expect("scratch");

        storage.delete_tree("p1").expect("delete tree");
        storage.delete_tree("missing").expect("missing prefix is ignored");

        assert!(!dir.path().join("p1").exists());
        assert_eq!(storage.get("p1/draft.tmp").expect("get"), None);
        assert_eq!(storage.list().expect("list"), vec!["p10/vault.db"]);
    }
}
