//! Image encoding: page-image file → base64 JPEG wrapped in `ImageData`.
//!
//! Every page is decoded once before it is sent. A file that does not decode
//! (truncated write, disk corruption) is dropped from its batch with a
//! warning instead of failing the whole request; the model would reject the
//! payload anyway.
//!
//! `detail: "high"` instructs GPT-4-class models to use the full image tile
//! budget; without it fine print and small tables are lost. Providers that
//! do not know the field ignore it.

use crate::pipeline::render::PageImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::ImageFormat;
use tracing::{debug, warn};

/// Why a page image could not be encoded.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },
}

/// Read, validate and base64-encode one page image.
pub fn encode_page(page: &PageImage) -> Result<ImageData, EncodeError> {
    let display = page.path.display().to_string();
    let bytes = std::fs::read(&page.path).map_err(|source| EncodeError::Read {
        path: display.clone(),
        source,
    })?;

    let format = image::guess_format(&bytes).map_err(|source| EncodeError::Decode {
        path: display.clone(),
        source,
    })?;
    image::load_from_memory_with_format(&bytes, format).map_err(|source| EncodeError::Decode {
        path: display.clone(),
        source,
    })?;

    let b64 = STANDARD.encode(&bytes);
    debug!("Encoded page {} → {} bytes base64", page.index, b64.len());

    Ok(ImageData::new(b64, mime_type(format)).with_detail("high"))
}

/// Encode a batch, skipping pages that fail to decode.
///
/// Order is preserved. An empty result means no page in the batch was usable.
pub fn encode_batch(pages: &[PageImage]) -> Vec<ImageData> {
    pages
        .iter()
        .filter_map(|page| match encode_page(page) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!("Skipping page {}: {}", page.index, e);
                None
            }
        })
        .collect()
}

fn mime_type(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "image/png",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::render::save_jpeg;
    use image::{Rgb, RgbImage};
    use std::path::Path;

    fn write_page(dir: &Path, index: usize) -> PageImage {
        let path = dir.join(format!("page_{index}.jpg"));
        save_jpeg(&RgbImage::from_pixel(8, 8, Rgb([0, 0, 0])), &path).unwrap();
        PageImage { index, path, dpi: 300 }
    }

    #[test]
    fn encode_valid_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let page = write_page(dir.path(), 1);
        let data = encode_page(&page).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/jpeg");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(decoded, std::fs::read(&page.path).unwrap());
    }

    #[test]
    fn corrupt_page_is_skipped_and_order_kept() {
        let dir = tempfile::tempdir().unwrap();
        let p1 = write_page(dir.path(), 1);
        let bad = PageImage {
            index: 2,
            path: dir.path().join("page_2.jpg"),
            dpi: 300,
        };
        std::fs::write(&bad.path, b"not an image").unwrap();
        let p3 = write_page(dir.path(), 3);

        let encoded = encode_batch(&[p1.clone(), bad, p3.clone()]);
        assert_eq!(encoded.len(), 2);
        assert_eq!(
            STANDARD.decode(&encoded[0].data).unwrap(),
            std::fs::read(&p1.path).unwrap()
        );
        assert_eq!(
            STANDARD.decode(&encoded[1].data).unwrap(),
            std::fs::read(&p3.path).unwrap()
        );
    }

    #[test]
    fn missing_file_is_read_error() {
        let page = PageImage {
            index: 1,
            path: "/no/such/page_1.jpg".into(),
            dpi: 300,
        };
        assert!(matches!(encode_page(&page), Err(EncodeError::Read { .. })));
    }
}
