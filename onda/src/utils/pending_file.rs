//! Output files that only appear under their final name once complete.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

/// Prefix of the temporary name an output is written under.
pub const TEMP_PREFIX: &str = "_$_";

/// A file written next to its destination under a temporary name.
///
/// [`commit`](PendingFile::commit) renames it into place; dropping it
/// uncommitted deletes it, so failed or cancelled operations leave nothing
/// under the final path.
#[derive(Debug)]
pub struct PendingFile {
    temp_path: PathBuf,
    final_path: PathBuf,
    committed: bool,
}

/// The temporary name `final_path` is written under.
pub fn temp_path_for(final_path: &Path) -> io::Result<PathBuf> {
    let name = final_path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Output path has no file name: {}", final_path.display()),
        )
    })?;

    let mut temp_name = std::ffi::OsString::from(TEMP_PREFIX);
    temp_name.push(name);
    Ok(final_path.with_file_name(temp_name))
}

/// Deletes the temporary file an interrupted run left behind for `final_path`.
///
/// Returns whether there was one.
pub fn remove_leftover(final_path: &Path) -> io::Result<bool> {
    let temp_path = temp_path_for(final_path)?;
    match fs::symlink_metadata(&temp_path) {
        Ok(meta) if meta.is_file() => {
            fs::remove_file(&temp_path)?;
            Ok(true)
        }
        Ok(_) => Ok(false),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

impl PendingFile {
    pub fn new(final_path: impl Into<PathBuf>) -> io::Result<Self> {
        let final_path = final_path.into();
        let temp_path = temp_path_for(&final_path)?;

        Ok(Self {
            temp_path,
            final_path,
            committed: false,
        })
    }

    /// Creates (or truncates) the temporary file for reading and writing.
    pub fn create(&self) -> io::Result<File> {
        File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.temp_path)
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Moves the temporary file to the final path, replacing any file there.
    pub fn commit(mut self) -> io::Result<PathBuf> {
        fs::rename(&self.temp_path, &self.final_path)?;
        self.committed = true;
        log::debug!(
            "Renamed {} to {}",
            self.temp_path.display(),
            self.final_path.display()
        );
        Ok(std::mem::take(&mut self.final_path))
    }
}

impl Drop for PendingFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match fs::remove_file(&self.temp_path) {
            Ok(()) => log::debug!("Removed unfinished {}", self.temp_path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!(
                "Could not remove unfinished {}: {e}",
                self.temp_path.display()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn commit_renames_into_place() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("song.onda");

        let pending = PendingFile::new(&target)?;
        assert_eq!(pending.temp_path(), dir.path().join("_$_song.onda"));
        pending.create()?.write_all(b"done")?;
        assert!(!target.exists());

        let path = pending.commit()?;
        assert_eq!(path, target);
        assert_eq!(fs::read(&target)?, b"done");
        assert!(!dir.path().join("_$_song.onda").exists());
        Ok(())
    }

    #[test]
    fn drop_without_commit_cleans_up() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("song.wav");

        {
            let pending = PendingFile::new(&target)?;
            pending.create()?.write_all(b"partial")?;
            assert!(pending.temp_path().exists());
        }

        assert!(!target.exists());
        assert_eq!(fs::read_dir(dir.path())?.count(), 0);
        Ok(())
    }

    #[test]
    fn leftovers_are_removed_by_final_name() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("take.onda");
        fs::write(dir.path().join("_$_take.onda"), b"interrupted")?;
        fs::write(dir.path().join("_$_other.onda"), b"not ours")?;

        assert!(remove_leftover(&target)?);
        assert!(!dir.path().join("_$_take.onda").exists());
        assert!(dir.path().join("_$_other.onda").exists());
        assert!(!remove_leftover(&target)?);

        fs::create_dir(dir.path().join("_$_folder"))?;
        assert!(!remove_leftover(&dir.path().join("folder"))?);
        Ok(())
    }

    #[test]
    fn existing_file_survives_a_failed_write() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("keep.aiff");
        fs::write(&target, b"original")?;

        let pending = PendingFile::new(&target)?;
        pending.create()?.write_all(b"half a file")?;
        drop(pending);

        assert_eq!(fs::read(&target)?, b"original");
        assert!(!dir.path().join("_$_keep.aiff").exists());
        Ok(())
    }
}
