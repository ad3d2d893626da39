//! PDF rasterisation: render every page to a JPEG file via pdfium.
//!
//! ## Why a trait?
//!
//! Rasterisation is an external collaborator. The assembler only needs
//! "ordered page images on disk"; [`PdfiumRasterizer`] provides them in
//! production and tests substitute a stub that writes synthetic pages.
//!
//! ## Why blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which is not async-safe.
//! The assembler calls [`Rasterizer::render_pages`] inside
//! `tokio::task::spawn_blocking` so CPU-heavy rendering never stalls the
//! runtime's worker threads.

use crate::error::{DocumentError, Pdf2TxtError};
use image::codecs::jpeg::JpegEncoder;
use pdfium_render::prelude::*;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// JPEG quality for rendered pages. High enough that small print survives.
const JPEG_QUALITY: u8 = 90;

/// One rasterised page on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    /// 1-based page number.
    pub index: usize,
    pub path: PathBuf,
    pub dpi: u32,
}

/// File name for page `index` (1-based).
pub fn page_file_name(index: usize) -> String {
    format!("page_{index}.jpg")
}

/// Converts a PDF into ordered page images.
pub trait Rasterizer: Send + Sync {
    /// Render every page of `pdf_path` into `out_dir` as
    /// `page_{n}.jpg`, returning the pages in page order.
    ///
    /// A PDF with zero pages yields an empty vector, not an error.
    fn render_pages(
        &self,
        pdf_path: &Path,
        out_dir: &Path,
        dpi: u32,
    ) -> Result<Vec<PageImage>, DocumentError>;
}

/// [`Rasterizer`] backed by pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    library_path: Option<PathBuf>,
    password: Option<String>,
}

impl PdfiumRasterizer {
    /// Create a rasteriser and check that pdfium can be bound.
    ///
    /// Binding failures are fatal for the whole run, so they are surfaced
    /// here rather than once per document.
    pub fn new(
        library_path: Option<PathBuf>,
        password: Option<String>,
    ) -> Result<Self, Pdf2TxtError> {
        let library_path = library_path.or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));
        let rasterizer = Self {
            library_path,
            password,
        };
        rasterizer.bind()?;
        Ok(rasterizer)
    }

    /// Bind to pdfium: explicit path, then the current directory, then the
    /// system library path.
    fn bind(&self) -> Result<Pdfium, Pdf2TxtError> {
        let bindings = match self.library_path {
            Some(ref path) => Pdfium::bind_to_library(path),
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| Pdf2TxtError::PdfiumBindingFailed(format!("{:?}", e)))?;

        Ok(Pdfium::new(bindings))
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn render_pages(
        &self,
        pdf_path: &Path,
        out_dir: &Path,
        dpi: u32,
    ) -> Result<Vec<PageImage>, DocumentError> {
        let pdfium = self
            .bind()
            .map_err(|e| DocumentError::Internal(e.to_string()))?;

        let password = self.password.as_deref();
        let document = pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
            let err_str = format!("{:?}", e);
            if err_str.contains("Password") || err_str.contains("password") {
                DocumentError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                DocumentError::CorruptPdf {
                    path: pdf_path.to_path_buf(),
                    detail: err_str,
                }
            }
        })?;

        let pages = document.pages();
        info!("PDF loaded: {} pages", pages.len());

        // PDF user space is 72 points per inch.
        let render_config = PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / 72.0);

        let mut results = Vec::with_capacity(pages.len() as usize);

        for (idx, page) in pages.iter().enumerate() {
            let page_num = idx + 1;
            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                DocumentError::RasterisationFailed {
                    page: page_num,
                    detail: format!("{:?}", e),
                }
            })?;

            let rgb = bitmap.as_image().to_rgb8();
            let path = out_dir.join(page_file_name(page_num));
            save_jpeg(&rgb, &path).map_err(|detail| DocumentError::RasterisationFailed {
                page: page_num,
                detail,
            })?;

            debug!(
                "Rendered page {} → {}x{} px → {}",
                page_num,
                rgb.width(),
                rgb.height(),
                path.display()
            );

            results.push(PageImage {
                index: page_num,
                path,
                dpi,
            });
        }

        Ok(results)
    }
}

/// Encode an RGB page as JPEG at `path`.
pub fn save_jpeg(rgb: &image::RgbImage, path: &Path) -> Result<(), String> {
    let file = File::create(path).map_err(|e| format!("create {}: {e}", path.display()))?;
    let mut writer = BufWriter::new(file);
    JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY)
        .encode_image(rgb)
        .map_err(|e| format!("JPEG encode: {e}"))
}
