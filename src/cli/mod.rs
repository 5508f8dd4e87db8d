pub mod command;
pub mod compress;
pub mod expand;
pub mod info;
pub mod progress;
pub mod validate;

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use onda::utils::errors::OndaError;
use onda::utils::pending_file::remove_leftover;

/// `input` with its extension replaced by `extension`, in `output_dir` if given.
pub fn output_path(input: &Path, output_dir: Option<&Path>, extension: &str) -> PathBuf {
    let file_name = input.file_name().map(Path::new).unwrap_or(input);
    let file_name = file_name.with_extension(extension);
    match output_dir {
        Some(dir) => dir.join(file_name),
        None => input.with_file_name(file_name),
    }
}

pub fn check_overwrite(output: &Path, overwrite: bool) -> Result<()> {
    if !overwrite && output.exists() {
        bail!(
            "{} already exists (use --overwrite to replace it)",
            output.display()
        );
    }
    Ok(())
}

/// Deletes temporary files that an interrupted earlier run left next to the
/// outputs of `inputs`, for every candidate output `extension`.
pub fn remove_leftovers(inputs: &[PathBuf], output_dir: Option<&Path>, extensions: &[&str]) {
    for input in inputs {
        for extension in extensions {
            let output = output_path(input, output_dir, extension);
            match remove_leftover(&output) {
                Ok(true) => log::warn!("Removed leftover temporary file for {}", output.display()),
                Ok(false) => {}
                Err(e) => log::warn!(
                    "Could not remove leftover temporary file for {}: {e}",
                    output.display()
                ),
            }
        }
    }
}

pub fn is_cancelled(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<OndaError>())
        .any(OndaError::is_cancelled)
}

/// Runs `process` on each input, carrying on past failures.
///
/// Stops quietly at the first cancelled file.
pub fn run_batch<F>(inputs: &[PathBuf], mut process: F) -> Result<()>
where
    F: FnMut(&Path) -> Result<()>,
{
    let mut failures = 0usize;
    for input in inputs {
        match process(input) {
            Ok(()) => {}
            Err(e) if is_cancelled(&e) => {
                log::info!("Cancelled while processing {}", input.display());
                return Ok(());
            }
            Err(e) => {
                log::error!("{e:#}");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} files failed", inputs.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_paths() {
        assert_eq!(
            output_path(Path::new("music/take.1.wav"), None, "onda"),
            Path::new("music/take.1.onda")
        );
        assert_eq!(
            output_path(Path::new("music/take.onda"), Some(Path::new("out")), "aiff"),
            Path::new("out/take.aiff")
        );
        assert_eq!(
            output_path(Path::new("noext"), None, "onda"),
            Path::new("noext.onda")
        );
    }

    #[test]
    fn leftovers_of_this_batch_are_removed() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let out = dir.path().join("out");
        std::fs::create_dir(&out)?;
        for name in ["_$_a.wav", "_$_a.aiff", "_$_b.wav", "_$_c.wav"] {
            std::fs::write(out.join(name), b"")?;
        }

        let inputs = [dir.path().join("a.onda"), dir.path().join("b.onda")];
        remove_leftovers(&inputs, Some(&out), &["wav", "aiff"]);

        let mut left: Vec<_> = std::fs::read_dir(&out)?
            .map(|entry| entry.map(|e| e.file_name()))
            .collect::<std::io::Result<_>>()?;
        left.sort();
        assert_eq!(left, ["_$_c.wav"]);
        Ok(())
    }

    #[test]
    fn cancellation_is_found_through_context() {
        let err = anyhow::Error::new(OndaError::Cancelled).context("while compressing");
        assert!(is_cancelled(&err));
        assert!(!is_cancelled(&anyhow::anyhow!("disk full")));
    }

    #[test]
    fn batch_counts_failures() {
        let inputs = [PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("c")];
        let mut seen = Vec::new();
        let result = run_batch(&inputs, |path| {
            seen.push(path.to_path_buf());
            if path == Path::new("b") {
                bail!("broken")
            }
            Ok(())
        });
        assert_eq!(seen.len(), 3);
        assert_eq!(
            result.map_err(|e| e.to_string()),
            Err("1 of 3 files failed".to_string())
        );
    }

    #[test]
    fn batch_stops_on_cancel() {
        let inputs = [PathBuf::from("a"), PathBuf::from("b")];
        let mut calls = 0;
        let result = run_batch(&inputs, |_| {
            calls += 1;
            Err(OndaError::Cancelled.into())
        });
        assert!(result.is_ok());
        assert_eq!(calls, 1);
    }
}
