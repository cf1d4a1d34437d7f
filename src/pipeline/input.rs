//! Input resolution: turn a path, URL, or byte buffer into a checked upload.
//!
//! Only four kinds of file are accepted: `jpg`, `jpeg`, `png` and `pdf`. The
//! extension decides what the bytes are supposed to be; the bytes are then
//! sniffed so a renamed file fails here with a clear message rather than
//! deep inside pdfium or the image decoder.
//!
//! Everything is held in memory. Reports are a few megabytes at most and
//! pdfium can load straight from a byte slice, so no temp files are needed.

use crate::error::LabDecoderError;
use image::ImageFormat;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Extensions accepted for upload, lowercase.
pub const ACCEPTED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "pdf"];

/// What the upload contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Pdf,
    Image(ImageFormat),
}

/// A validated upload, ready for image acquisition.
#[derive(Debug, Clone)]
pub struct Upload {
    /// File name used in messages, e.g. `"cbc.pdf"`.
    pub name: String,
    pub bytes: Vec<u8>,
    pub kind: UploadKind,
}

impl Upload {
    /// Validate `bytes` against the extension of `name`.
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, LabDecoderError> {
        let name = name.into();
        let kind = detect_kind(&name, &bytes)?;
        debug!("Accepted upload '{}' ({} bytes, {:?})", name, bytes.len(), kind);
        Ok(Self { name, bytes, kind })
    }

    pub fn is_pdf(&self) -> bool {
        self.kind == UploadKind::Pdf
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to an in-memory upload.
///
/// If the input is a URL, download it; otherwise read the local file.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<Upload, LabDecoderError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(Path::new(input)).await
    }
}

/// Lowercase extension of `name`, if any.
fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
}

/// Decide the upload kind from the extension, then verify the bytes agree.
fn detect_kind(name: &str, bytes: &[u8]) -> Result<UploadKind, LabDecoderError> {
    let ext = extension_of(name)
        .filter(|e| ACCEPTED_EXTENSIONS.contains(&e.as_str()))
        .ok_or_else(|| LabDecoderError::UnsupportedFileType {
            name: name.to_string(),
        })?;

    if ext == "pdf" {
        if bytes.starts_with(b"%PDF") {
            return Ok(UploadKind::Pdf);
        }
        return Err(LabDecoderError::ContentMismatch {
            name: name.to_string(),
            expected: "PDF",
        });
    }

    // A .jpg that is really a PNG is fine: both are images we can decode.
    match image::guess_format(bytes) {
        Ok(format @ (ImageFormat::Jpeg | ImageFormat::Png)) => Ok(UploadKind::Image(format)),
        _ => Err(LabDecoderError::ContentMismatch {
            name: name.to_string(),
            expected: "JPEG or PNG image",
        }),
    }
}

/// Read a local file, mapping the common I/O failures to friendly errors.
async fn resolve_local(path: &Path) -> Result<Upload, LabDecoderError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    // Reject by extension before touching the disk.
    if !extension_of(&name).is_some_and(|e| ACCEPTED_EXTENSIONS.contains(&e.as_str())) {
        return Err(LabDecoderError::UnsupportedFileType { name });
    }

    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => LabDecoderError::FileNotFound {
            path: PathBuf::from(path),
        },
        std::io::ErrorKind::PermissionDenied => LabDecoderError::PermissionDenied {
            path: PathBuf::from(path),
        },
        _ => LabDecoderError::Internal(format!("Failed to read '{}': {}", path.display(), e)),
    })?;

    debug!("Read local upload: {}", path.display());
    Upload::from_bytes(name, bytes)
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<Upload, LabDecoderError> {
    info!("Downloading report from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| LabDecoderError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let map_send_error = |e: reqwest::Error| {
        if e.is_timeout() {
            LabDecoderError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            LabDecoderError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(map_send_error)?;

    if !response.status().is_success() {
        return Err(LabDecoderError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let filename = extract_filename(url, content_type.as_deref());

    let bytes = response.bytes().await.map_err(map_send_error)?;

    info!("Downloaded {} bytes as '{}'", bytes.len(), filename);
    Upload::from_bytes(filename, bytes.to_vec())
}

/// Pick a file name from the URL path when it carries an accepted
/// extension, else derive one from the content type.
fn extract_filename(url: &str, content_type: Option<&str>) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if extension_of(last).is_some_and(|e| ACCEPTED_EXTENSIONS.contains(&e.as_str())) {
                    return last.to_string();
                }
            }
        }
    }

    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_lowercase());
    match mime.as_deref() {
        Some("image/png") => "downloaded.png".to_string(),
        Some("image/jpeg") | Some("image/jpg") => "downloaded.jpg".to_string(),
        _ => "downloaded.pdf".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    const JPEG_MAGIC: &[u8] = b"\xFF\xD8\xFF\xE0\0\x10JFIF\0";

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/report.pdf"));
        assert!(is_url("http://example.com/report.png"));
        assert!(!is_url("/tmp/report.pdf"));
        assert!(!is_url("report.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn accepts_each_extension_case_insensitively() {
        let pdf = Upload::from_bytes("CBC.PDF", b"%PDF-1.7\n".to_vec()).unwrap();
        assert!(pdf.is_pdf());
        let png = Upload::from_bytes("scan.Png", PNG_MAGIC.to_vec()).unwrap();
        assert_eq!(png.kind, UploadKind::Image(ImageFormat::Png));
        let jpg = Upload::from_bytes("photo.jpeg", JPEG_MAGIC.to_vec()).unwrap();
        assert_eq!(jpg.kind, UploadKind::Image(ImageFormat::Jpeg));
    }

    #[test]
    fn rejects_unsupported_extension() {
        for name in ["notes.txt", "scan.gif", "noextension"] {
            let err = Upload::from_bytes(name, PNG_MAGIC.to_vec()).unwrap_err();
            assert!(
                matches!(err, LabDecoderError::UnsupportedFileType { .. }),
                "{name}: {err:?}"
            );
        }
    }

    #[test]
    fn rejects_pdf_extension_with_image_bytes() {
        let err = Upload::from_bytes("report.pdf", PNG_MAGIC.to_vec()).unwrap_err();
        assert!(matches!(
            err,
            LabDecoderError::ContentMismatch { expected: "PDF", .. }
        ));
    }

    #[test]
    fn rejects_image_extension_with_pdf_bytes() {
        let err = Upload::from_bytes("report.png", b"%PDF-1.4".to_vec()).unwrap_err();
        assert!(matches!(err, LabDecoderError::ContentMismatch { .. }));
    }

    #[test]
    fn renamed_png_as_jpg_is_accepted() {
        let up = Upload::from_bytes("photo.jpg", PNG_MAGIC.to_vec()).unwrap();
        assert_eq!(up.kind, UploadKind::Image(ImageFormat::Png));
    }

    #[test]
    fn filename_from_url_path() {
        assert_eq!(
            extract_filename("https://lab.example/results/cbc.pdf?x=1", None),
            "cbc.pdf"
        );
    }

    #[test]
    fn script_url_falls_back_to_content_type() {
        assert_eq!(
            extract_filename("https://lab.example/view.php?id=42", Some("image/png")),
            "downloaded.png"
        );
        assert_eq!(
            extract_filename("https://lab.example/results/export.aspx", Some("application/pdf")),
            "downloaded.pdf"
        );
        let up = Upload::from_bytes(
            extract_filename("https://lab.example/view.php", Some("image/png")),
            PNG_MAGIC.to_vec(),
        )
        .unwrap();
        assert_eq!(up.kind, UploadKind::Image(ImageFormat::Png));
    }

    #[test]
    fn filename_from_content_type() {
        assert_eq!(
            extract_filename("https://lab.example/view", Some("image/png")),
            "downloaded.png"
        );
        assert_eq!(
            extract_filename("https://lab.example/view", Some("image/jpeg; charset=binary")),
            "downloaded.jpg"
        );
        assert_eq!(
            extract_filename("https://lab.example/view", None),
            "downloaded.pdf"
        );
    }

    #[tokio::test]
    async fn missing_local_file_is_file_not_found() {
        let err = resolve_input("/definitely/not/here/report.pdf", 5)
            .await
            .unwrap_err();
        assert!(matches!(err, LabDecoderError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn unsupported_local_file_not_read() {
        let err = resolve_input("/definitely/not/here/notes.txt", 5)
            .await
            .unwrap_err();
        assert!(matches!(err, LabDecoderError::UnsupportedFileType { .. }));
    }
}
