use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Raster extensions accepted as pages, lowercase.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    Directory,
    Pdf,
    Image,
    Unsupported,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Directory => write!(f, "directory"),
            SourceKind::Pdf => write!(f, "pdf"),
            SourceKind::Image => write!(f, "image"),
            SourceKind::Unsupported => write!(f, "unsupported"),
        }
    }
}

/// One raw item found in the input directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub path: PathBuf,
    pub kind: SourceKind,
    /// File name without its extension.
    pub base_name: String,
}

impl SourceEntry {
    /// Classify by extension only (case-insensitive); contents are never read.
    pub fn classify(path: PathBuf, is_dir: bool) -> Self {
        let kind = if is_dir {
            SourceKind::Directory
        } else {
            match lowercase_extension(&path).as_deref() {
                Some("pdf") => SourceKind::Pdf,
                Some(ext) if IMAGE_EXTENSIONS.contains(&ext) => SourceKind::Image,
                _ => SourceKind::Unsupported,
            }
        };
        let base_name = base_name(&path);
        Self { path, kind, base_name }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// A single-page image materialized in the normalized directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPage {
    pub path: PathBuf,
    /// Source file this page was produced from, when known.
    pub source: Option<PathBuf>,
    /// 1-based page number; only set for pages fanned out of a multi-page PDF.
    pub page_index: Option<u32>,
}

impl NormalizedPage {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Sort key that keeps PDF fan-out pages in numeric order (`doc(2)` before `doc(10)`).
    pub fn order_key(&self) -> (String, u32, String) {
        listing_key(&self.path)
    }
}

/// Order shared by the input walk and the normalized batch: document base name,
/// then numeric page index, then file name.
pub fn listing_key(path: &Path) -> (String, u32, String) {
    let stem = base_name(path);
    let (base, index) = split_page_suffix(&stem);
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    (base.to_string(), index.unwrap_or(0), file_name)
}

pub fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}

/// File name with the final extension removed.
pub fn base_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Split a `name(3)` stem into `("name", Some(3))`; other stems come back unchanged.
pub fn split_page_suffix(stem: &str) -> (&str, Option<u32>) {
    let Some(inner) = stem.strip_suffix(')') else {
        return (stem, None);
    };
    let Some(open) = inner.rfind('(') else {
        return (stem, None);
    };
    let digits = &inner[open + 1..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return (stem, None);
    }
    match digits.parse::<u32>() {
        Ok(n) => (&inner[..open], Some(n)),
        Err(_) => (stem, None),
    }
}

/// Output file name for page `index` of a PDF with `total` pages.
pub fn page_file_name(base: &str, index: u32, total: u32) -> String {
    if total == 1 {
        format!("{base}.jpg")
    } else {
        format!("{base}({index}).jpg")
    }
}
