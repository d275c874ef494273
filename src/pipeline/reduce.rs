//! Payload reduction: keep only the first page before asking the oracle.
//!
//! A paper's first page carries its title, authors and abstract — everything
//! the oracle needs — at a fraction of the upload size. Two reductions exist:
//!
//! * [`first_page_pdf`] — a new one-page PDF, for oracles that read documents.
//! * [`render_first_page`] — a PNG of page one, for vision-only providers.
//!
//! Both run inside `spawn_blocking`: pdfium is a synchronous C++ library with
//! thread-local state and must stay off the Tokio worker threads. Callers
//! treat every [`ReduceError`] as "send the whole document instead".

use crate::error::ReduceError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Bind to libpdfium at `lib_path`, or to the system library when `None`.
pub fn bind_pdfium(lib_path: Option<&Path>) -> Result<Pdfium, ReduceError> {
    let bindings = match lib_path {
        Some(path) => Pdfium::bind_to_library(path),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| ReduceError::PdfiumUnavailable(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

/// Copy page one of `document` into a new single-page PDF.
pub async fn first_page_pdf(
    document: Vec<u8>,
    lib_path: Option<PathBuf>,
) -> Result<Vec<u8>, ReduceError> {
    tokio::task::spawn_blocking(move || first_page_pdf_blocking(&document, lib_path.as_deref()))
        .await
        .map_err(|e| ReduceError::Extraction(format!("reduce task panicked: {}", e)))?
}

fn first_page_pdf_blocking(document: &[u8], lib_path: Option<&Path>) -> Result<Vec<u8>, ReduceError> {
    let pdfium = bind_pdfium(lib_path)?;

    let source = pdfium
        .load_pdf_from_byte_slice(document, None)
        .map_err(|e| ReduceError::Unreadable(format!("{:?}", e)))?;

    let total_pages = source.pages().len() as usize;
    if total_pages == 0 {
        return Err(ReduceError::NoPages);
    }

    let mut reduced = pdfium
        .create_new_pdf()
        .map_err(|e| ReduceError::Extraction(format!("{:?}", e)))?;
    reduced
        .pages_mut()
        .copy_page_from_document(&source, 0, 0)
        .map_err(|e| ReduceError::Extraction(format!("{:?}", e)))?;

    let bytes = reduced
        .save_to_bytes()
        .map_err(|e| ReduceError::Extraction(format!("{:?}", e)))?;

    debug!(
        "Reduced {}-page PDF from {} to {} bytes",
        total_pages,
        document.len(),
        bytes.len()
    );
    Ok(bytes)
}

/// Rasterise page one of `document` and encode it as a base64 PNG.
///
/// `max_pixels` caps the longest edge so an oversized page cannot blow the
/// provider's image limits.
pub async fn render_first_page(
    document: Vec<u8>,
    lib_path: Option<PathBuf>,
    max_pixels: u32,
) -> Result<ImageData, ReduceError> {
    let image = tokio::task::spawn_blocking(move || {
        render_first_page_blocking(&document, lib_path.as_deref(), max_pixels)
    })
    .await
    .map_err(|e| ReduceError::Extraction(format!("render task panicked: {}", e)))??;

    encode_png(&image).map_err(|e| ReduceError::Extraction(format!("PNG encoding failed: {}", e)))
}

fn render_first_page_blocking(
    document: &[u8],
    lib_path: Option<&Path>,
    max_pixels: u32,
) -> Result<DynamicImage, ReduceError> {
    let pdfium = bind_pdfium(lib_path)?;

    let source = pdfium
        .load_pdf_from_byte_slice(document, None)
        .map_err(|e| ReduceError::Unreadable(format!("{:?}", e)))?;

    let pages = source.pages();
    if pages.len() as usize == 0 {
        return Err(ReduceError::NoPages);
    }

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let page = pages
        .get(0)
        .map_err(|e| ReduceError::Extraction(format!("{:?}", e)))?;
    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| ReduceError::Extraction(format!("{:?}", e)))?;

    let image = bitmap.as_image();
    debug!("Rendered page 1 → {}x{} px", image.width(), image.height());
    Ok(image)
}

/// PNG-encode and base64-wrap an image for a multimodal request.
///
/// PNG keeps small title text crisp; `detail: "high"` stops GPT-class models
/// from downsampling the page to a single low-resolution tile.
pub fn encode_png(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded page image → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([0, 0, 255, 255])));
        let data = encode_png(&img).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(&decoded[1..4], b"PNG");
    }

    #[tokio::test]
    async fn garbage_input_is_a_reduce_error() {
        // Fails with PdfiumUnavailable where no library is installed and with
        // Unreadable where one is; either way the caller gets an Err.
        let result = first_page_pdf(b"definitely not a pdf".to_vec(), None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn missing_library_path_is_unavailable() {
        let result = first_page_pdf(
            b"%PDF-1.4".to_vec(),
            Some(PathBuf::from("/nonexistent/libpdfium.so")),
        )
        .await;
        assert!(matches!(result, Err(ReduceError::PdfiumUnavailable(_))));
    }
}
