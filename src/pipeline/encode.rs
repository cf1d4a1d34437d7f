//! Image encoding: `DynamicImage` → base64 JPEG wrapped in [`EncodedImage`].
//!
//! Vision endpoints take images as base64 data URLs inside the JSON body.
//! JPEG keeps phone photos of reports small enough for API payload limits;
//! at the default quality the printed digits stay legible.
//!
//! The JPEG encoder only accepts 8-bit grey or RGB, so every other colour
//! mode (RGBA screenshots, 16-bit PNG scans, …) is flattened to RGB first.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::io::Cursor;
use tracing::debug;

const JPEG_MIME: &str = "image/jpeg";

/// A base64-encoded image ready for a vision request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedImage {
    pub mime_type: String,
    /// Standard base64, no line breaks.
    pub data: String,
}

impl EncodedImage {
    /// `data:<mime>;base64,<data>` form used by OpenAI-compatible APIs.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    /// Same image in the edgequake-llm message type.
    pub fn to_image_data(&self) -> ImageData {
        ImageData::new(self.data.clone(), self.mime_type.as_str()).with_detail("high")
    }
}

/// Encode the acquired report image as base64 JPEG.
pub fn encode_image(img: &DynamicImage) -> Result<EncodedImage, image::ImageError> {
    let rgb: Cow<'_, DynamicImage> = match img {
        DynamicImage::ImageRgb8(_) => Cow::Borrowed(img),
        other => {
            debug!("Converting {:?} → Rgb8 for JPEG", other.color());
            Cow::Owned(DynamicImage::ImageRgb8(other.to_rgb8()))
        }
    };

    let mut buf = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Jpeg)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes JPEG, {} bytes base64", buf.len(), b64.len());

    Ok(EncodedImage {
        mime_type: JPEG_MIME.to_string(),
        data: b64,
    })
}
