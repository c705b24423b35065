//! Crash-safe file writes for vault files.
//!
//! A write goes through three names in the destination directory:
//! - a scratch file `.<name>.<random>.partial` that receives the bytes
//! - the commit file `.<name>.commit`, which only ever appears once the
//!   scratch file has been fully written and synced
//! - the destination itself, replaced by renaming the commit file over it
//!
//! [`recover_atomic_file`] repairs a write interrupted between the last two
//! steps by promoting the commit file. A crash while the scratch file is being
//! written leaves only a `.partial` file behind, which recovery discards.
//!
//! Both artifact names start with a dot and end in a reserved suffix (see
//! [`is_write_artifact`]). Backends that map logical names onto this
//! directory must refuse such names so a user file never collides with one.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const COMMIT_SUFFIX: &str = ".commit";
const SCRATCH_SUFFIX: &str = ".partial";

#[derive(Debug)]
pub enum AtomicWriteError<E> {
    Io(io::Error),
    Writer(E),
}

impl<E> From<io::Error> for AtomicWriteError<E> {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl<E: std::fmt::Display> std::fmt::Display for AtomicWriteError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AtomicWriteError::Io(err) => write!(f, "io error: {err}"),
            AtomicWriteError::Writer(err) => write!(f, "write error: {err}"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for AtomicWriteError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AtomicWriteError::Io(err) => Some(err),
            AtomicWriteError::Writer(err) => Some(err),
        }
    }
}

/// What [`recover_atomic_file`] found next to the destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryOutcome {
    /// A commit file was promoted over the destination.
    pub promoted: bool,
    /// Number of torn scratch files that were deleted.
    pub discarded_scratch_files: usize,
}

impl RecoveryOutcome {
    pub fn is_clean(&self) -> bool {
        !self.promoted && self.discarded_scratch_files == 0
    }
}

fn parent_dir_or_dot(path: &Path) -> &Path {
    // `Path::parent` returns `Some("")` for bare relative file names like `vault.db`.
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

fn file_name_lossy(path: &Path) -> String {
    path.file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .into_owned()
}

/// Path of the commit file used while replacing `dest`.
pub fn commit_path_for(dest: impl AsRef<Path>) -> PathBuf {
    let dest = dest.as_ref();
    parent_dir_or_dot(dest).join(format!(".{}{COMMIT_SUFFIX}", file_name_lossy(dest)))
}

fn scratch_prefix(dest: &Path) -> String {
    format!(".{}.", file_name_lossy(dest))
}

/// Whether `name` is a scratch file of `dest`: `.<name>.<random>.partial`,
/// where the random part never contains a dot.
fn is_scratch_file_of(dest: &Path, name: &str) -> bool {
    name.strip_prefix(scratch_prefix(dest).as_str())
        .and_then(|rest| rest.strip_suffix(SCRATCH_SUFFIX))
        .is_some_and(|random| !random.is_empty() && !random.contains('.'))
}

/// Whether `name` is a scratch or commit file produced by this crate.
///
/// Storage backends use this to hide in-flight files from listings and to
/// reject logical names that would collide with them.
pub fn is_write_artifact(name: &str) -> bool {
    name.starts_with('.') && (name.ends_with(COMMIT_SUFFIX) || name.ends_with(SCRATCH_SUFFIX))
}

/// Atomically write a file by:
/// - creating parent directories (if needed)
/// - writing to a scratch file in the same directory, then flushing + syncing it
/// - renaming the scratch file to the commit file
/// - renaming the commit file over `dest`
///
/// If `write_fn` returns an error, or any step fails, `dest` is left untouched and
/// neither the scratch file nor the commit file is left behind.
pub fn atomic_write<T, E>(
    dest: impl AsRef<Path>,
    write_fn: impl FnOnce(&mut File) -> Result<T, E>,
) -> Result<T, AtomicWriteError<E>> {
    let dest = dest.as_ref();
    let dir = parent_dir_or_dot(dest);
    fs::create_dir_all(dir).map_err(AtomicWriteError::Io)?;

    let mut scratch = tempfile::Builder::new()
        .prefix(&scratch_prefix(dest))
        .suffix(SCRATCH_SUFFIX)
        .tempfile_in(dir)
        .map_err(AtomicWriteError::Io)?;
    let out = write_fn(scratch.as_file_mut()).map_err(AtomicWriteError::Writer)?;

    scratch.as_file_mut().flush().map_err(AtomicWriteError::Io)?;
    scratch.as_file().sync_all().map_err(AtomicWriteError::Io)?;

    let commit = commit_path_for(dest);
    scratch
        .persist(&commit)
        .map_err(|err| AtomicWriteError::Io(err.error))?;

    if let Err(err) = replace_file(&commit, dest) {
        // The caller sees the failure, so the commit file must not be promoted later.
        let _ = fs::remove_file(&commit);
        return Err(AtomicWriteError::Io(err));
    }

    // Best-effort: the file is already in place.
    let _ = sync_parent_dir(dest);

    Ok(out)
}

/// Convenience helper for atomically writing a full byte slice to disk.
pub fn atomic_write_bytes(dest: impl AsRef<Path>, bytes: &[u8]) -> io::Result<()> {
    atomic_write(dest, |file| file.write_all(bytes)).map_err(|err| match err {
        AtomicWriteError::Io(err) => err,
        AtomicWriteError::Writer(err) => err,
    })
}

/// Repair an interrupted [`atomic_write`] to `dest`.
///
/// Must run before every read of `dest`. A commit file is complete by
/// construction, so it is promoted over `dest`. Scratch files are torn by
/// definition and are deleted. Running this with nothing to repair is a no-op,
/// including when the parent directory does not exist.
///
/// Assumes a single writer per destination: a write that is in progress while
/// recovery runs loses its scratch file and fails.
pub fn recover_atomic_file(dest: impl AsRef<Path>) -> io::Result<RecoveryOutcome> {
    let dest = dest.as_ref();
    let dir = parent_dir_or_dot(dest);
    let mut outcome = RecoveryOutcome::default();

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(outcome),
        Err(err) => return Err(err),
    };

    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        if is_scratch_file_of(dest, &name.to_string_lossy()) {
            log::warn!("discarding torn scratch file {:?}", entry.path());
            match fs::remove_file(entry.path()) {
                Ok(()) => outcome.discarded_scratch_files += 1,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err),
            }
        }
    }

    let commit = commit_path_for(dest);
    match fs::symlink_metadata(&commit) {
        Ok(_) => {
            log::debug!("promoting interrupted write {commit:?} over {dest:?}");
            replace_file(&commit, dest)?;
            let _ = sync_parent_dir(dest);
            outcome.promoted = true;
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }

    Ok(outcome)
}

fn sync_parent_dir(path: &Path) -> io::Result<()> {
    let parent = parent_dir_or_dot(path);
    // Opening a directory as a file works on most Unix platforms; elsewhere this is
    // best-effort and callers ignore the error.
    let dir = File::open(parent)?;
    dir.sync_all()
}

fn replace_file(from: &Path, to: &Path) -> io::Result<()> {
    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStrExt as _;
        use windows_sys::Win32::Storage::FileSystem::{MoveFileExW, MOVEFILE_REPLACE_EXISTING};

        fn to_wide_null(path: &Path) -> Vec<u16> {
            let mut wide: Vec<u16> = path.as_os_str().encode_wide().collect();
            wide.push(0);
            wide
        }

        let from_w = to_wide_null(from);
        let to_w = to_wide_null(to);
        let ok = unsafe { MoveFileExW(from_w.as_ptr(), to_w.as_ptr(), MOVEFILE_REPLACE_EXISTING) };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    #[cfg(not(windows))]
    {
        fs::rename(from, to)
    }
}
