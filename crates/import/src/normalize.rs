use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use bizscan_core::document::{base_name, lowercase_extension, page_file_name, split_page_suffix};
use bizscan_core::{NormalizedPage, RunContext, SourceEntry, SourceKind, IMAGE_EXTENSIONS};
use bizscan_pdf::{PdfRasterizer, RenderError};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::util::{identity_set, sorted_entries};

const PAGE_JPEG_QUALITY: u8 = 95;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Unsupported input {0}: only .pdf, .png, .jpg and .jpeg are accepted")]
    Unsupported(PathBuf),
    #[error("PDF conversion failed for {path}: {source}")]
    Conversion {
        path: PathBuf,
        #[source]
        source: RenderError,
    },
}

/// What one normalization pass did.
#[derive(Debug, Default)]
pub struct NormalizeSummary {
    pub written: Vec<NormalizedPage>,
    pub skipped_directories: Vec<SourceEntry>,
    pub skipped_duplicates: Vec<SourceEntry>,
}

/// Flattens an input directory of PDFs and images into single-page images.
pub struct Normalizer<R: PdfRasterizer> {
    rasterizer: R,
}

impl<R: PdfRasterizer> Normalizer<R> {
    pub fn new(rasterizer: R) -> Self {
        Self { rasterizer }
    }

    /// Normalize every entry of `source_dir` into `target_dir`.
    ///
    /// Entries whose base name is already present in `target_dir` are skipped,
    /// so re-running over a growing input directory only converts new files.
    /// A PDF also counts as present once its first fan-out page exists.
    /// An unsupported extension or a failed PDF conversion stops the pass;
    /// pages written for earlier entries are kept.
    pub fn normalize(
        &self,
        source_dir: &Path,
        target_dir: &Path,
        ctx: &RunContext,
    ) -> Result<NormalizeSummary, NormalizeError> {
        let _run = ctx.span.enter();
        info!(source = %source_dir.display(), target = %target_dir.display(), "Normalizing documents");

        let mut seen = identity_set(target_dir)?;
        let mut summary = NormalizeSummary::default();

        for (path, is_dir) in sorted_entries(source_dir)? {
            let entry = SourceEntry::classify(path, is_dir);

            if entry.kind == SourceKind::Directory {
                warn!(path = %entry.path.display(), "Skipping directory");
                summary.skipped_directories.push(entry);
                continue;
            }
            if already_normalized(&entry, &seen, target_dir) {
                warn!(path = %entry.path.display(), "Already normalized");
                summary.skipped_duplicates.push(entry);
                continue;
            }

            let pages = match entry.kind {
                SourceKind::Pdf => {
                    info!(path = %entry.path.display(), "Rendering PDF pages");
                    self.convert_pdf(&entry, target_dir)?
                }
                SourceKind::Image => vec![copy_image(&entry, target_dir)?],
                SourceKind::Unsupported => {
                    tracing::error!(path = %entry.path.display(), "Unsupported input type");
                    return Err(NormalizeError::Unsupported(entry.path));
                }
                SourceKind::Directory => continue,
            };

            seen.insert(entry.base_name.clone());
            seen.extend(pages.iter().map(|page| base_name(&page.path)));
            summary.written.extend(pages);
        }

        info!(
            written = summary.written.len(),
            duplicates = summary.skipped_duplicates.len(),
            directories = summary.skipped_directories.len(),
            "Normalization complete"
        );
        Ok(summary)
    }

    /// All-or-nothing: on any failure every page written for this PDF is removed.
    fn convert_pdf(
        &self,
        entry: &SourceEntry,
        target_dir: &Path,
    ) -> Result<Vec<NormalizedPage>, NormalizeError> {
        let mut pages: Vec<NormalizedPage> = Vec::new();
        let mut created: Vec<PathBuf> = Vec::new();

        let rendered = self.rasterizer.render_pages(&entry.path, &mut |page| {
            let dest = target_dir.join(page_file_name(&entry.base_name, page.index, page.total));
            let file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&dest)
                .map_err(|e| RenderError::Sink(format!("{}: {e}", dest.display())))?;
            created.push(dest.clone());
            write_jpeg(&page.image, file)
                .map_err(|e| RenderError::Sink(format!("{}: {e}", dest.display())))?;
            debug!(page = page.index, total = page.total, dest = %dest.display(), "Page written");
            pages.push(NormalizedPage {
                path: dest,
                source: Some(entry.path.clone()),
                page_index: (page.total > 1).then_some(page.index),
            });
            Ok(())
        });

        match rendered {
            Ok(_) => Ok(pages),
            Err(source) => {
                tracing::error!(path = %entry.path.display(), error = %source, "PDF conversion failed, rolling back");
                rollback(&created);
                Err(NormalizeError::Conversion { path: entry.path.clone(), source })
            }
        }
    }
}

fn already_normalized(entry: &SourceEntry, seen: &HashSet<String>, target_dir: &Path) -> bool {
    if seen.contains(&entry.base_name) {
        return true;
    }
    entry.kind == SourceKind::Pdf
        && target_dir.join(page_file_name(&entry.base_name, 1, 2)).is_file()
}

fn write_jpeg(image: &DynamicImage, file: File) -> image::ImageResult<()> {
    let encoder = JpegEncoder::new_with_quality(BufWriter::new(file), PAGE_JPEG_QUALITY);
    image.to_rgb8().write_with_encoder(encoder)
}

fn copy_image(entry: &SourceEntry, target_dir: &Path) -> Result<NormalizedPage, NormalizeError> {
    let dest = target_dir.join(entry.file_name());
    let mut src = File::open(&entry.path)?;
    let mut out = OpenOptions::new().write(true).create_new(true).open(&dest)?;
    io::copy(&mut src, &mut out)?;
    debug!(from = %entry.path.display(), to = %dest.display(), "Image copied");
    Ok(NormalizedPage {
        path: dest,
        source: Some(entry.path.clone()),
        page_index: None,
    })
}

fn rollback(created: &[PathBuf]) {
    for path in created {
        match std::fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "Removed partial page"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial page"),
        }
    }
}

/// Normalized pages in batch order: by document base name, then numeric page index.
pub fn collect_pages(dir: &Path) -> io::Result<Vec<NormalizedPage>> {
    let mut pages: Vec<NormalizedPage> = sorted_entries(dir)?
        .into_iter()
        .filter(|(path, is_dir)| {
            !is_dir
                && lowercase_extension(path)
                    .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        })
        .map(|(path, _)| {
            let page_index = split_page_suffix(&base_name(&path)).1;
            NormalizedPage { path, source: None, page_index }
        })
        .collect();
    pages.sort_by_key(NormalizedPage::order_key);
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizscan_pdf::RenderedPage;
    use image::{ImageBuffer, Rgba, RgbaImage};
    use std::cell::Cell;
    use std::collections::BTreeSet;

    /// Produces `pages` blank pages, failing on page `fail_at` if set.
    struct FakeRasterizer {
        pages: u32,
        fail_at: Option<u32>,
        calls: Cell<u32>,
    }

    impl FakeRasterizer {
        fn pages(pages: u32) -> Self {
            Self { pages, fail_at: None, calls: Cell::new(0) }
        }

        fn failing(pages: u32, fail_at: u32) -> Self {
            Self { pages, fail_at: Some(fail_at), calls: Cell::new(0) }
        }
    }

    impl PdfRasterizer for FakeRasterizer {
        fn render_pages(
            &self,
            pdf: &Path,
            on_page: &mut dyn FnMut(RenderedPage) -> Result<(), RenderError>,
        ) -> Result<u32, RenderError> {
            self.calls.set(self.calls.get() + 1);
            for index in 1..=self.pages {
                if self.fail_at == Some(index) {
                    return Err(RenderError::Page {
                        path: pdf.to_path_buf(),
                        page: index,
                        message: "corrupt content stream".into(),
                    });
                }
                let img: RgbaImage = ImageBuffer::from_pixel(8, 8, Rgba([255, 255, 255, 255]));
                on_page(RenderedPage {
                    index,
                    total: self.pages,
                    image: DynamicImage::ImageRgba8(img),
                })?;
            }
            Ok(self.pages)
        }
    }

    fn tiny_png() -> Vec<u8> {
        let img: RgbaImage = ImageBuffer::from_pixel(4, 4, Rgba([10, 20, 30, 255]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn names(dir: &Path) -> BTreeSet<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    fn setup() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let root = tempfile::tempdir().unwrap();
        let src = root.path().join("in");
        let dst = root.path().join("out");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::create_dir_all(&dst).unwrap();
        (root, src, dst)
    }

    #[test]
    fn multi_page_pdf_fans_out_with_suffixes() {
        let (_root, src, dst) = setup();
        std::fs::write(src.join("doc.pdf"), b"%PDF-fake").unwrap();

        let n = Normalizer::new(FakeRasterizer::pages(3));
        let summary = n.normalize(&src, &dst, &RunContext::start()).unwrap();

        assert_eq!(
            names(&dst),
            BTreeSet::from(["doc(1).jpg".into(), "doc(2).jpg".into(), "doc(3).jpg".into()])
        );
        let indices: Vec<Option<u32>> = summary.written.iter().map(|p| p.page_index).collect();
        assert_eq!(indices, vec![Some(1), Some(2), Some(3)]);
        assert!(image::open(dst.join("doc(2).jpg")).is_ok());
    }

    #[test]
    fn single_page_pdf_has_no_suffix() {
        let (_root, src, dst) = setup();
        std::fs::write(src.join("doc.pdf"), b"%PDF-fake").unwrap();

        let n = Normalizer::new(FakeRasterizer::pages(1));
        let summary = n.normalize(&src, &dst, &RunContext::start()).unwrap();

        assert_eq!(names(&dst), BTreeSet::from(["doc.jpg".into()]));
        assert_eq!(summary.written[0].page_index, None);
    }

    #[test]
    fn images_are_copied_verbatim() {
        let (_root, src, dst) = setup();
        let bytes = tiny_png();
        std::fs::write(src.join("Scan.PNG"), &bytes).unwrap();

        let n = Normalizer::new(FakeRasterizer::pages(1));
        n.normalize(&src, &dst, &RunContext::start()).unwrap();

        assert_eq!(std::fs::read(dst.join("Scan.PNG")).unwrap(), bytes);
    }

    #[test]
    fn second_run_writes_nothing_new() {
        let (_root, src, dst) = setup();
        std::fs::write(src.join("doc.pdf"), b"%PDF-fake").unwrap();
        std::fs::write(src.join("photo.jpg"), tiny_png()).unwrap();

        let n = Normalizer::new(FakeRasterizer::pages(2));
        n.normalize(&src, &dst, &RunContext::start()).unwrap();
        let first = names(&dst);

        let again = n.normalize(&src, &dst, &RunContext::start()).unwrap();
        assert!(again.written.is_empty());
        assert_eq!(again.skipped_duplicates.len(), 2);
        assert_eq!(names(&dst), first);
        // The rasterizer is not invoked for an already-converted PDF.
        assert_eq!(n.rasterizer.calls.get(), 1);
    }

    #[test]
    fn duplicate_detection_is_exact() {
        let (_root, src, dst) = setup();
        std::fs::write(dst.join("doc2.jpg"), tiny_png()).unwrap();
        std::fs::write(src.join("doc.png"), tiny_png()).unwrap();

        let n = Normalizer::new(FakeRasterizer::pages(1));
        let summary = n.normalize(&src, &dst, &RunContext::start()).unwrap();

        assert_eq!(summary.written.len(), 1);
        assert!(dst.join("doc.png").exists());
    }

    #[test]
    fn same_base_name_in_one_pass_is_written_once() {
        let (_root, src, dst) = setup();
        std::fs::write(src.join("doc.jpg"), tiny_png()).unwrap();
        std::fs::write(src.join("doc.png"), tiny_png()).unwrap();

        let n = Normalizer::new(FakeRasterizer::pages(1));
        let summary = n.normalize(&src, &dst, &RunContext::start()).unwrap();

        assert_eq!(names(&dst), BTreeSet::from(["doc.jpg".into()]));
        assert_eq!(summary.skipped_duplicates.len(), 1);
    }

    #[test]
    fn failed_pdf_is_rolled_back_and_aborts() {
        let (_root, src, dst) = setup();
        std::fs::write(src.join("a.png"), tiny_png()).unwrap();
        std::fs::write(src.join("b.pdf"), b"%PDF-fake").unwrap();
        std::fs::write(src.join("c.png"), tiny_png()).unwrap();

        let n = Normalizer::new(FakeRasterizer::failing(3, 3));
        let err = n.normalize(&src, &dst, &RunContext::start()).unwrap_err();

        assert!(matches!(err, NormalizeError::Conversion { .. }));
        // Earlier entries survive; none of b's pages do; c was never reached.
        assert_eq!(names(&dst), BTreeSet::from(["a.png".into()]));
    }

    #[test]
    fn rolled_back_pdf_is_retried_next_run() {
        let (_root, src, dst) = setup();
        std::fs::write(src.join("b.pdf"), b"%PDF-fake").unwrap();

        let failing = Normalizer::new(FakeRasterizer::failing(2, 2));
        assert!(failing.normalize(&src, &dst, &RunContext::start()).is_err());
        assert!(names(&dst).is_empty());

        let working = Normalizer::new(FakeRasterizer::pages(2));
        let summary = working.normalize(&src, &dst, &RunContext::start()).unwrap();
        assert_eq!(summary.written.len(), 2);
    }

    #[test]
    fn unsupported_extension_aborts_pass() {
        let (_root, src, dst) = setup();
        std::fs::write(src.join("a.png"), tiny_png()).unwrap();
        std::fs::write(src.join("b.docx"), b"PK").unwrap();
        std::fs::write(src.join("c.png"), tiny_png()).unwrap();

        let n = Normalizer::new(FakeRasterizer::pages(1));
        let err = n.normalize(&src, &dst, &RunContext::start()).unwrap_err();

        assert!(matches!(err, NormalizeError::Unsupported(p) if p.ends_with("b.docx")));
        assert_eq!(names(&dst), BTreeSet::from(["a.png".into()]));
    }

    #[test]
    fn directories_are_skipped() {
        let (_root, src, dst) = setup();
        std::fs::create_dir(src.join("nested")).unwrap();
        std::fs::write(src.join("a.png"), tiny_png()).unwrap();

        let n = Normalizer::new(FakeRasterizer::pages(1));
        let summary = n.normalize(&src, &dst, &RunContext::start()).unwrap();

        assert_eq!(summary.skipped_directories.len(), 1);
        assert_eq!(names(&dst), BTreeSet::from(["a.png".into()]));
    }

    #[test]
    fn numbered_image_does_not_hide_pdf() {
        let (_root, src, dst) = setup();
        std::fs::write(src.join("scan(1).png"), tiny_png()).unwrap();
        std::fs::write(src.join("scan.pdf"), b"%PDF-fake").unwrap();

        let n = Normalizer::new(FakeRasterizer::pages(2));
        let summary = n.normalize(&src, &dst, &RunContext::start()).unwrap();

        assert_eq!(n.rasterizer.calls.get(), 1);
        assert!(dst.join("scan(1).jpg").exists());
        assert!(dst.join("scan(2).jpg").exists());
        // The image's stem equals the PDF's first page, so it is the duplicate.
        let dups: Vec<String> =
            summary.skipped_duplicates.iter().map(SourceEntry::file_name).collect();
        assert_eq!(dups, ["scan(1).png"]);

        let again = n.normalize(&src, &dst, &RunContext::start()).unwrap();
        assert!(again.written.is_empty());
        assert_eq!(n.rasterizer.calls.get(), 1);
    }

    #[test]
    fn earlier_numbered_image_does_not_hide_new_pdf() {
        let (_root, src, dst) = setup();
        std::fs::write(src.join("scan(1).png"), tiny_png()).unwrap();
        let n = Normalizer::new(FakeRasterizer::pages(2));
        n.normalize(&src, &dst, &RunContext::start()).unwrap();

        std::fs::write(src.join("scan.pdf"), b"%PDF-fake").unwrap();
        let summary = n.normalize(&src, &dst, &RunContext::start()).unwrap();

        assert_eq!(summary.written.len(), 2);
        assert_eq!(
            names(&dst),
            BTreeSet::from(["scan(1).jpg".into(), "scan(1).png".into(), "scan(2).jpg".into()])
        );
    }

    #[test]
    fn written_order_matches_batch_order() {
        let (_root, src, dst) = setup();
        std::fs::write(src.join("a b.png"), tiny_png()).unwrap();
        std::fs::write(src.join("a.pdf"), b"%PDF-fake").unwrap();
        std::fs::write(src.join("a-c.jpg"), tiny_png()).unwrap();

        let n = Normalizer::new(FakeRasterizer::pages(2));
        let summary = n.normalize(&src, &dst, &RunContext::start()).unwrap();

        let written: Vec<String> = summary.written.iter().map(NormalizedPage::file_name).collect();
        let batch: Vec<String> =
            collect_pages(&dst).unwrap().iter().map(NormalizedPage::file_name).collect();
        assert_eq!(written, ["a(1).jpg", "a(2).jpg", "a b.png", "a-c.jpg"]);
        assert_eq!(written, batch);
    }

    #[test]
    fn collect_pages_orders_fan_out_numerically() {
        let (_root, _src, dst) = setup();
        for name in ["doc(10).jpg", "doc(2).jpg", "doc(1).jpg", "alpha.png", "notes.txt"] {
            std::fs::write(dst.join(name), b"x").unwrap();
        }
        std::fs::create_dir(dst.join("sub.png")).unwrap();

        let pages = collect_pages(&dst).unwrap();
        let names: Vec<String> = pages.iter().map(NormalizedPage::file_name).collect();
        assert_eq!(names, ["alpha.png", "doc(1).jpg", "doc(2).jpg", "doc(10).jpg"]);
        assert_eq!(pages[3].page_index, Some(10));
    }
}
