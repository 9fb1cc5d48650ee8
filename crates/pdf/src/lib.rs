pub mod rasterizer;

pub use rasterizer::{PdfRasterizer, PdfiumRasterizer, RenderError, RenderedPage};
