//! Per-bin model files and the link elided trials load them through.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{BenchError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinFile {
    /// Last `_`-separated component of the file stem (`bsim4_bin_017` -> `017`).
    pub id: String,
    pub path: PathBuf,
}

/// Bin files directly inside `dir` whose names match `prefix*suffix`, sorted by name.
///
/// Symlinks to regular files count as bins; the link path is reported.
pub fn discover(dir: &Path, prefix: &str, suffix: &str) -> Result<Vec<BinFile>> {
    if !dir.is_dir() {
        return Err(BenchError::config(format!(
            "bin directory {} does not exist",
            dir.display()
        )));
    }

    let mut bins = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !(name.starts_with(prefix) && name.ends_with(suffix)) {
            continue;
        }
        let stem = entry
            .path()
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let id = stem.rsplit('_').next().unwrap_or(&stem).to_string();
        bins.push(BinFile {
            id,
            path: entry.path().to_path_buf(),
        });
    }
    Ok(bins)
}

/// Fail unless exactly `expected` bins were found.
pub fn check_count(bins: &[BinFile], expected: Option<usize>, dir: &Path) -> Result<()> {
    match expected {
        Some(n) if bins.len() != n => Err(BenchError::config(format!(
            "expected {n} bin files in {}, found {}",
            dir.display(),
            bins.len()
        ))),
        _ if bins.is_empty() => Err(BenchError::config(format!(
            "no bin files found in {}",
            dir.display()
        ))),
        _ => Ok(()),
    }
}

pub fn sha256_hex(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect())
}

/// The single on-disk indirection shared by every elided trial.
///
/// Only the bin sweep repoints it, and only between trials.
#[derive(Debug)]
pub struct ModelLink {
    path: PathBuf,
}

impl ModelLink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Point the link at `target`, replacing whatever it pointed at, and verify.
    #[cfg(unix)]
    pub fn repoint(&self, target: &Path) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        match fs::symlink_metadata(&self.path) {
            Ok(_) => fs::remove_file(&self.path)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let target = fs::canonicalize(target)?;
        std::os::unix::fs::symlink(&target, &self.path)?;
        debug!(link = %self.path.display(), target = %target.display(), "repointed model link");
        self.verify(&target)
    }

    #[cfg(not(unix))]
    pub fn repoint(&self, _target: &Path) -> Result<()> {
        Err(BenchError::config(format!(
            "cannot repoint {}: symbolic links require a unix host",
            self.path.display()
        )))
    }

    /// Check that the link currently resolves to `expected`.
    pub fn verify(&self, expected: &Path) -> Result<()> {
        let mismatch = || BenchError::Link {
            link: self.path.clone(),
            expected: expected.to_path_buf(),
        };
        let resolved = fs::canonicalize(&self.path).map_err(|_| mismatch())?;
        let expected_resolved = fs::canonicalize(expected).map_err(|_| mismatch())?;
        if resolved != expected_resolved {
            return Err(mismatch());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(path: &Path, body: &[u8]) {
        fs::write(path, body).unwrap();
    }

    #[test]
    fn test_discover_filters_and_sorts() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("bsim4_bin_002.osdi"), b"b");
        touch(&dir.path().join("bsim4_bin_001.osdi"), b"a");
        touch(&dir.path().join("bsim4_bin_003.txt"), b"x");
        touch(&dir.path().join("other_001.osdi"), b"x");
        fs::create_dir(dir.path().join("bsim4_bin_999.osdi")).unwrap();

        let bins = discover(dir.path(), "bsim4_bin_", ".osdi").unwrap();
        let ids: Vec<&str> = bins.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["001", "002"]);

        assert!(check_count(&bins, Some(2), dir.path()).is_ok());
        assert!(matches!(
            check_count(&bins, Some(108), dir.path()),
            Err(BenchError::Config(_))
        ));
        assert!(check_count(&[], None, dir.path()).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_discover_counts_symlinked_bins() {
        let store = tempdir().unwrap();
        let dir = tempdir().unwrap();
        for id in ["001", "002"] {
            let target = store.path().join(format!("build_{id}.osdi"));
            touch(&target, id.as_bytes());
            std::os::unix::fs::symlink(&target, dir.path().join(format!("bsim4_bin_{id}.osdi")))
                .unwrap();
        }

        let bins = discover(dir.path(), "bsim4_bin_", ".osdi").unwrap();
        assert_eq!(bins.len(), 2);
        assert_eq!(bins[1].id, "002");
        assert_eq!(bins[1].path, dir.path().join("bsim4_bin_002.osdi"));
        assert!(check_count(&bins, Some(2), dir.path()).is_ok());
        assert_eq!(fs::read(&bins[0].path).unwrap(), b"001");
    }

    #[test]
    fn test_missing_dir_is_config_error() {
        let dir = tempdir().unwrap();
        let err = discover(&dir.path().join("nope"), "bsim4_bin_", ".osdi").unwrap_err();
        assert!(matches!(err, BenchError::Config(_)));
    }

    #[test]
    fn test_sha256_of_known_input() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("abc.osdi");
        touch(&path, b"abc");
        assert_eq!(
            sha256_hex(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_repoint_and_verify() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("bsim4_bin_001.osdi");
        let b = dir.path().join("bsim4_bin_002.osdi");
        touch(&a, b"a");
        touch(&b, b"b");

        let link = ModelLink::new(dir.path().join("BSIM4/bsim4.elided.osdi"));
        link.repoint(&a).unwrap();
        assert_eq!(fs::read(link.path()).unwrap(), b"a");
        link.verify(&a).unwrap();
        assert!(matches!(link.verify(&b), Err(BenchError::Link { .. })));

        link.repoint(&b).unwrap();
        assert_eq!(fs::read(link.path()).unwrap(), b"b");
        link.verify(&b).unwrap();
    }
}
