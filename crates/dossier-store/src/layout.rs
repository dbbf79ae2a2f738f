use std::path::{Path, PathBuf};

use dossier_types::{Discipline, ProjectId, Timestamp};

use crate::format::ArtifactFormat;

/// Maximum length of the sanitized stem inside a stored name.
const MAX_STEM_LEN: usize = 80;

/// Where a version's blob belongs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobTarget {
    pub project_id: ProjectId,
    pub discipline: Discipline,
    pub version_number: u64,
}

/// Deterministic directory layout under a blob root.
#[derive(Clone, Debug)]
pub struct BlobLayout {
    root: PathBuf,
}

impl BlobLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<project>/<discipline>/v<n>`
    pub fn version_dir(&self, target: &BlobTarget) -> PathBuf {
        self.root
            .join(target.project_id.to_string())
            .join(target.discipline.as_str())
            .join(format!("v{}", target.version_number))
    }

    /// Collision-free stored file name: `<stem>_<millis>.<ext>`.
    pub fn stored_name(original_name: &str, format: ArtifactFormat, at: Timestamp) -> String {
        format!(
            "{}_{}.{}",
            sanitize_stem(original_name),
            at.timestamp_millis(),
            format.canonical_extension()
        )
    }
}

/// Reduce a client-supplied file name to a safe stem.
///
/// Directory components and the extension are dropped; every character
/// outside `[A-Za-z0-9_-]` becomes `_`, runs of `_` collapse, and the result
/// is truncated. An empty result becomes `artifact`.
pub fn sanitize_stem(original_name: &str) -> String {
    let file_name = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_name);
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("");

    let mut out = String::with_capacity(stem.len().min(MAX_STEM_LEN));
    for ch in stem.chars() {
        let mapped = if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            ch
        } else {
            '_'
        };
        if mapped == '_' && out.ends_with('_') {
            continue;
        }
        out.push(mapped);
        if out.len() >= MAX_STEM_LEN {
            break;
        }
    }

    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "artifact".into()
    } else {
        trimmed.to_string()
    }
}
