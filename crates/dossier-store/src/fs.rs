use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use dossier_types::{ContentDigest, Timestamp};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::digest::digest_file;
use crate::error::{BlobError, BlobResult};
use crate::format::ArtifactFormat;
use crate::layout::{BlobLayout, BlobTarget};
use crate::traits::{BlobStore, CommittedBlob};

/// Filesystem-backed blob store rooted at a single directory.
#[derive(Clone, Debug)]
pub struct FsBlobStore {
    layout: BlobLayout,
}

impl FsBlobStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> BlobResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            layout: BlobLayout::new(root),
        })
    }

    pub fn layout(&self) -> &BlobLayout {
        &self.layout
    }

    /// Publish `temp_path` under a name stamped with `at`.
    ///
    /// A version directory may already hold blobs: repair renumbers
    /// versions without moving their files, so a later reservation can reuse
    /// a directory. Existing files are never replaced; a name taken within
    /// the same millisecond gets a `-<n>` suffix.
    fn commit_at(
        &self,
        temp_path: &Path,
        target: &BlobTarget,
        original_name: &str,
        format: ArtifactFormat,
        at: Timestamp,
    ) -> BlobResult<CommittedBlob> {
        let dir = self.layout.version_dir(target);
        fs::create_dir_all(&dir)?;

        let (stored_name, final_path) =
            free_name(&dir, &BlobLayout::stored_name(original_name, format, at))?;

        if let Err(source) = fs::rename(temp_path, &final_path) {
            let _ = fs::remove_dir(&dir);
            return Err(BlobError::Move {
                from: temp_path.to_path_buf(),
                to: final_path,
                source,
            });
        }

        let (digest, size) = match digest_file(&final_path) {
            Ok(pair) => pair,
            Err(e) => {
                // Not yet recorded anywhere, so it is not a published blob.
                let _ = fs::remove_file(&final_path);
                let _ = fs::remove_dir(&dir);
                return Err(e.into());
            }
        };

        if let Err(e) = set_read_only(&final_path) {
            warn!(path = %final_path.display(), error = %e, "could not mark blob read-only");
        }

        info!(
            project = %target.project_id,
            discipline = %target.discipline,
            version = target.version_number,
            size,
            digest = %digest.short_hex(),
            "committed blob"
        );

        Ok(CommittedBlob {
            final_path,
            stored_name,
            size,
            digest,
        })
    }

    fn ensure_contained(&self, path: &Path) -> BlobResult<()> {
        if path.starts_with(self.layout.root()) {
            Ok(())
        } else {
            Err(BlobError::NotFound(path.to_path_buf()))
        }
    }
}

impl BlobStore for FsBlobStore {
    fn commit(
        &self,
        temp_path: &Path,
        target: &BlobTarget,
        original_name: &str,
        format: ArtifactFormat,
    ) -> BlobResult<CommittedBlob> {
        self.commit_at(temp_path, target, original_name, format, Utc::now())
    }

    fn read(&self, path: &Path) -> BlobResult<Vec<u8>> {
        self.ensure_contained(path)?;
        fs::read(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => BlobError::NotFound(path.to_path_buf()),
            _ => BlobError::Io(e),
        })
    }

    fn exists(&self, path: &Path) -> BlobResult<bool> {
        self.ensure_contained(path)?;
        Ok(path.is_file())
    }

    fn verify(&self, path: &Path, expected: &ContentDigest) -> BlobResult<()> {
        self.ensure_contained(path)?;
        let (computed, _) = digest_file(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => BlobError::NotFound(path.to_path_buf()),
            _ => BlobError::Io(e),
        })?;
        if computed != *expected {
            return Err(BlobError::DigestMismatch {
                path: path.to_path_buf(),
                expected: *expected,
                computed,
            });
        }
        debug!(path = %path.display(), "blob verified");
        Ok(())
    }

    fn list(&self) -> BlobResult<Vec<PathBuf>> {
        let root = self.layout.root();
        if !root.exists() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        for entry in WalkDir::new(root).min_depth(1) {
            let entry = entry.map_err(|e| {
                BlobError::Io(e.into_io_error().unwrap_or_else(|| {
                    io::Error::new(io::ErrorKind::Other, "filesystem loop in blob tree")
                }))
            })?;
            if entry.file_type().is_file() {
                paths.push(entry.into_path());
            }
        }
        paths.sort();
        Ok(paths)
    }
}

const NAME_ATTEMPTS: usize = 16;

/// First unused name in `dir`: `base`, then `<stem>-1.<ext>`, `<stem>-2.<ext>`...
fn free_name(dir: &Path, base: &str) -> BlobResult<(String, PathBuf)> {
    for attempt in 0..NAME_ATTEMPTS {
        let name = match (attempt, base.rsplit_once('.')) {
            (0, _) => base.to_string(),
            (n, Some((stem, ext))) => format!("{stem}-{n}.{ext}"),
            (n, None) => format!("{base}-{n}"),
        };
        let path = dir.join(&name);
        if !path.exists() {
            return Ok((name, path));
        }
    }
    Err(BlobError::AlreadyExists(dir.join(base)))
}

fn set_read_only(path: &Path) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(true);
    fs::set_permissions(path, perms)
}
