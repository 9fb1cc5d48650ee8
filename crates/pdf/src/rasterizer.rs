use image::DynamicImage;
use pdfium_render::prelude::{PdfRenderConfig, Pdfium, PdfiumError};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to bind pdfium library: {0}")]
    Library(String),
    #[error("Failed to open PDF {path}: {message}")]
    Document { path: PathBuf, message: String },
    #[error("Failed to render page {page} of {path}: {message}")]
    Page { path: PathBuf, page: u32, message: String },
    #[error("PDF {0} has no pages")]
    Empty(PathBuf),
    /// Raised by the page consumer (e.g. a failed write) to stop rendering.
    #[error("Page sink failed: {0}")]
    Sink(String),
}

/// One rendered page handed to the consumer as soon as it is ready.
pub struct RenderedPage {
    /// 1-based.
    pub index: u32,
    pub total: u32,
    pub image: DynamicImage,
}

/// Turns a PDF into page bitmaps, one page at a time and in page order.
///
/// Pages are streamed to `on_page` instead of collected so a caller can write
/// each page out and still know what to roll back if a later page fails.
pub trait PdfRasterizer {
    fn render_pages(
        &self,
        pdf: &Path,
        on_page: &mut dyn FnMut(RenderedPage) -> Result<(), RenderError>,
    ) -> Result<u32, RenderError>;
}

/// Renders through a dynamically bound pdfium library.
pub struct PdfiumRasterizer {
    dpi: u32,
    library_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn new(dpi: u32, library_path: Option<PathBuf>) -> Self {
        Self { dpi, library_path }
    }

    fn bind(&self) -> Result<Pdfium, RenderError> {
        let bound = match &self.library_path {
            Some(path) if path.is_dir() => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path))
            }
            Some(path) => Pdfium::bind_to_library(path),
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        };
        bound
            .map(Pdfium::new)
            .map_err(|e| RenderError::Library(pdfium_message(e)))
    }
}

impl PdfRasterizer for PdfiumRasterizer {
    fn render_pages(
        &self,
        pdf: &Path,
        on_page: &mut dyn FnMut(RenderedPage) -> Result<(), RenderError>,
    ) -> Result<u32, RenderError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_file(pdf, None)
            .map_err(|e| RenderError::Document {
                path: pdf.to_path_buf(),
                message: pdfium_message(e),
            })?;

        let total = document.pages().len() as u32;
        if total == 0 {
            return Err(RenderError::Empty(pdf.to_path_buf()));
        }
        tracing::debug!(path = %pdf.display(), pages = total, dpi = self.dpi, "Rendering PDF");

        let config = PdfRenderConfig::new().scale_page_by_factor(self.dpi as f32 / 72.0);
        for (i, page) in document.pages().iter().enumerate() {
            let index = i as u32 + 1;
            let bitmap = page
                .render_with_config(&config)
                .map_err(|e| RenderError::Page {
                    path: pdf.to_path_buf(),
                    page: index,
                    message: pdfium_message(e),
                })?;
            on_page(RenderedPage { index, total, image: bitmap.as_image() })?;
        }
        Ok(total)
    }
}

fn pdfium_message(err: PdfiumError) -> String {
    match err {
        PdfiumError::LoadLibraryError(inner) => format!(
            "{inner}; place the pdfium shared library next to the binary, install it system-wide, or set pdf.library_path"
        ),
        other => other.to_string(),
    }
}
