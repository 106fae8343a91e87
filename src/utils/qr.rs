// src/utils/qr.rs

//! QR codes for public result links.

use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD};
use qrcode::{QrCode, render::svg};
use serde::Serialize;
use url::Url;

pub use qrcode::EcLevel;

/// Rendering options handed to a `QrEncoder`.
#[derive(Debug, Clone, Copy)]
pub struct QrOptions {
    pub error_correction: EcLevel,
    /// Minimum width/height in pixels.
    pub size: u32,
    /// Whether to draw the standard 4-module quiet zone around the code.
    pub quiet_zone: bool,
}

impl QrOptions {
    /// Embedded in JSON responses.
    pub const INLINE: QrOptions = QrOptions {
        error_correction: EcLevel::M,
        size: 300,
        quiet_zone: true,
    };

    /// Served as a downloadable file.
    pub const DOWNLOAD: QrOptions = QrOptions {
        error_correction: EcLevel::M,
        size: 500,
        quiet_zone: true,
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrImage {
    pub content_type: &'static str,
    pub file_extension: &'static str,
    pub bytes: Vec<u8>,
}

impl QrImage {
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.content_type, STANDARD.encode(&self.bytes))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrEncodeError(pub String);

impl fmt::Display for QrEncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QR encoding failed: {}", self.0)
    }
}

impl std::error::Error for QrEncodeError {}

/// Text to image encoder.
pub trait QrEncoder: Send + Sync {
    fn encode(&self, text: &str, options: &QrOptions) -> Result<QrImage, QrEncodeError>;
}

/// Renders QR codes as SVG documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct SvgQrEncoder;

impl QrEncoder for SvgQrEncoder {
    fn encode(&self, text: &str, options: &QrOptions) -> Result<QrImage, QrEncodeError> {
        let code = QrCode::with_error_correction_level(text.as_bytes(), options.error_correction)
            .map_err(|e| QrEncodeError(e.to_string()))?;

        let image = code
            .render()
            .min_dimensions(options.size, options.size)
            .quiet_zone(options.quiet_zone)
            .dark_color(svg::Color("#000000"))
            .light_color(svg::Color("#ffffff"))
            .build();

        Ok(QrImage {
            content_type: "image/svg+xml",
            file_extension: "svg",
            bytes: image.into_bytes(),
        })
    }
}

/// `{origin}/result/{exam_number}`, with the exam number percent-encoded as a
/// single path segment.
pub fn result_url(origin: &Url, exam_number: &str) -> String {
    let mut url = origin.clone();
    url.set_query(None);
    url.set_fragment(None);

    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push("result").push(exam_number);
    }

    url.to_string()
}

/// Public link plus, when encoding succeeded, its QR image as a data URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QrArtifact {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code_data: Option<String>,
    pub qr_url: String,
}

/// Best-effort: an encoder failure is logged and only drops the image.
pub fn artifact(encoder: &dyn QrEncoder, qr_url: String) -> QrArtifact {
    let qr_code_data = match encoder.encode(&qr_url, &QrOptions::INLINE) {
        Ok(image) => Some(image.to_data_url()),
        Err(e) => {
            tracing::warn!("QR code generation failed for {}: {}", qr_url, e);
            None
        }
    };

    QrArtifact { qr_code_data, qr_url }
}
