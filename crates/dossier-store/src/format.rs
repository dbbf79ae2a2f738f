//! Intake checks for inbound artifacts.
//!
//! A file is accepted when its extension names an accepted format *and* its
//! leading bytes carry that format's signature. Both checks run before any
//! shared state is touched.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BlobError, BlobResult};

/// Number of leading bytes read for signature detection.
const SNIFF_LEN: usize = 512;

/// Artifact formats accepted for regulatory submissions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    Pdf,
    Dwg,
    Dxf,
    Png,
    Jpeg,
    Tiff,
}

impl ArtifactFormat {
    pub const ALL: [ArtifactFormat; 6] = [
        Self::Pdf,
        Self::Dwg,
        Self::Dxf,
        Self::Png,
        Self::Jpeg,
        Self::Tiff,
    ];

    /// Map a (case-insensitive) file extension to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "dwg" => Some(Self::Dwg),
            "dxf" => Some(Self::Dxf),
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "tif" | "tiff" => Some(Self::Tiff),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Dwg => "image/vnd.dwg",
            Self::Dxf => "image/vnd.dxf",
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Tiff => "image/tiff",
        }
    }

    /// Canonical extension used for stored names.
    pub fn canonical_extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Dwg => "dwg",
            Self::Dxf => "dxf",
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Tiff => "tif",
        }
    }

    /// Returns `true` if `head` starts with this format's signature.
    pub fn matches_signature(&self, head: &[u8]) -> bool {
        match self {
            Self::Pdf => head.starts_with(b"%PDF-"),
            // AutoCAD version strings: AC1012, AC1015, ..., AC1032, AC2.10
            Self::Dwg => head.len() >= 6 && head.starts_with(b"AC") && head[2].is_ascii_digit(),
            Self::Dxf => is_dxf(head),
            Self::Png => head.starts_with(b"\x89PNG\r\n\x1a\n"),
            Self::Jpeg => head.starts_with(&[0xFF, 0xD8, 0xFF]),
            Self::Tiff => head.starts_with(b"II*\0") || head.starts_with(b"MM\0*"),
        }
    }
}

fn is_dxf(head: &[u8]) -> bool {
    if head.starts_with(b"AutoCAD Binary DXF") {
        return true;
    }
    let text = String::from_utf8_lossy(head);
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    match (lines.next(), lines.next()) {
        (Some("0"), Some("SECTION")) => true,
        // Leading comment group.
        (Some("999"), Some(_)) => true,
        _ => false,
    }
}

/// Which formats are accepted, and how large an upload may be.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakePolicy {
    pub accepted: Vec<ArtifactFormat>,
    pub max_bytes: u64,
}

impl Default for IntakePolicy {
    fn default() -> Self {
        Self {
            accepted: ArtifactFormat::ALL.to_vec(),
            max_bytes: 200 * 1024 * 1024,
        }
    }
}

impl IntakePolicy {
    /// Check an inbound temp file against its client-supplied name.
    ///
    /// Returns the detected format, or [`BlobError::InvalidFormat`].
    pub fn inspect(&self, temp_path: &Path, original_name: &str) -> BlobResult<ArtifactFormat> {
        let ext = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| {
                BlobError::InvalidFormat(format!("{original_name:?} has no file extension"))
            })?;

        let format = ArtifactFormat::from_extension(ext)
            .filter(|f| self.accepted.contains(f))
            .ok_or_else(|| BlobError::InvalidFormat(format!("extension .{ext} is not accepted")))?;

        let size = std::fs::metadata(temp_path)?.len();
        if size == 0 {
            return Err(BlobError::InvalidFormat("file is empty".into()));
        }
        if size > self.max_bytes {
            return Err(BlobError::InvalidFormat(format!(
                "file is {size} bytes, limit is {}",
                self.max_bytes
            )));
        }

        let mut head = Vec::with_capacity(SNIFF_LEN);
        File::open(temp_path)?
            .take(SNIFF_LEN as u64)
            .read_to_end(&mut head)?;

        if !format.matches_signature(&head) {
            return Err(BlobError::InvalidFormat(format!(
                "content does not carry a .{ext} signature"
            )));
        }

        Ok(format)
    }
}
