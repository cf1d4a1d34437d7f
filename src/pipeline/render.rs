//! Image acquisition: one raster image per upload.
//!
//! Photos and scans are decoded as they are. PDFs are rasterised at page 1
//! through pdfium; lab reports put the results table on the first page and a
//! single image keeps the request to one vision call.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and is not safe to drive from an async task. Rendering runs on the
//! blocking pool so the runtime's worker threads never stall on it.
//!
//! ## Why cap pixels?
//!
//! Vision endpoints reject oversized payloads and gain nothing from more
//! pixels than their tiling uses. `max_rendered_pixels` caps the longest edge
//! for rendered PDFs and for large phone photos alike.

use crate::error::LabDecoderError;
use crate::pipeline::input::{Upload, UploadKind};
use image::imageops::FilterType;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};

/// Environment variable pointing at an existing pdfium shared library.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Produce the image to analyse from a validated upload.
pub async fn acquire_image(
    upload: &Upload,
    max_pixels: u32,
) -> Result<DynamicImage, LabDecoderError> {
    match upload.kind {
        UploadKind::Pdf => render_first_page(&upload.name, upload.bytes.clone(), max_pixels).await,
        UploadKind::Image(format) => {
            let img = image::load_from_memory_with_format(&upload.bytes, format).map_err(|e| {
                LabDecoderError::ImageDecodeFailed {
                    name: upload.name.clone(),
                    detail: e.to_string(),
                }
            })?;
            debug!(
                "Decoded '{}' → {}x{} px",
                upload.name,
                img.width(),
                img.height()
            );
            Ok(fit_within(img, max_pixels))
        }
    }
}

/// Scale `img` down so its longest edge is at most `max_pixels`.
///
/// Smaller images are returned untouched; nothing is ever upscaled.
pub fn fit_within(img: DynamicImage, max_pixels: u32) -> DynamicImage {
    if img.width() <= max_pixels && img.height() <= max_pixels {
        return img;
    }
    let resized = img.resize(max_pixels, max_pixels, FilterType::Triangle);
    info!(
        "Downscaled {}x{} → {}x{} px",
        img.width(),
        img.height(),
        resized.width(),
        resized.height()
    );
    resized
}

/// Rasterise page 1 of a PDF held in memory.
pub async fn render_first_page(
    name: &str,
    bytes: Vec<u8>,
    max_pixels: u32,
) -> Result<DynamicImage, LabDecoderError> {
    let name = name.to_string();

    tokio::task::spawn_blocking(move || render_first_page_blocking(&name, &bytes, max_pixels))
        .await
        .map_err(|e| LabDecoderError::Internal(format!("Render task panicked: {}", e)))?
}

/// Blocking implementation of first-page rendering.
fn render_first_page_blocking(
    name: &str,
    bytes: &[u8],
    max_pixels: u32,
) -> Result<DynamicImage, LabDecoderError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium.load_pdf_from_byte_slice(bytes, None).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            LabDecoderError::EncryptedPdf {
                name: name.to_string(),
            }
        } else {
            LabDecoderError::CorruptPdf {
                name: name.to_string(),
                detail: err_str,
            }
        }
    })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    if total_pages == 0 {
        return Err(LabDecoderError::EmptyPdf {
            name: name.to_string(),
        });
    }
    info!("PDF loaded: {} pages, rendering page 1", total_pages);

    let edge = i32::try_from(max_pixels).unwrap_or(i32::MAX);
    let render_config = PdfRenderConfig::new()
        .set_target_width(edge)
        .set_maximum_height(edge);

    let page = pages
        .get(0)
        .map_err(|e| LabDecoderError::RasterisationFailed {
            name: name.to_string(),
            detail: format!("{:?}", e),
        })?;

    let bitmap = page.render_with_config(&render_config).map_err(|e| {
        LabDecoderError::RasterisationFailed {
            name: name.to_string(),
            detail: format!("{:?}", e),
        }
    })?;

    let image = bitmap.as_image();
    debug!("Rendered page 1 → {}x{} px", image.width(), image.height());

    Ok(image)
}

/// Bind to pdfium: `PDFIUM_LIB_PATH`, then the working directory, then the
/// system library search path.
fn bind_pdfium() -> Result<Pdfium, LabDecoderError> {
    let bindings = match std::env::var_os(PDFIUM_LIB_PATH_ENV) {
        Some(path) => {
            let path = PathBuf::from(path);
            debug!("Binding pdfium from {}", path.display());
            Pdfium::bind_to_library(&path)
        }
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| LabDecoderError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}
