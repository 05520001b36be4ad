//! QR code rendering for certificate links

use std::io::Cursor;

use image::{ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};

use crate::error::AppResult;

const PLACEHOLDER: &str = "{code}";
const MIN_SIZE: u32 = 256;

/// Turns a certificate code into an image
pub trait QrGenerator: Send + Sync {
    /// PNG bytes of the QR encoding the certificate URL
    fn generate_qr(&self, code: &str) -> AppResult<Vec<u8>>;
}

/// Encodes `url_pattern` with `{code}` substituted, medium error correction
pub struct PngQrGenerator {
    url_pattern: String,
}

impl PngQrGenerator {
    pub fn new(url_pattern: impl Into<String>) -> Self {
        Self {
            url_pattern: url_pattern.into(),
        }
    }

    pub fn payload(&self, code: &str) -> String {
        self.url_pattern.replace(PLACEHOLDER, code)
    }
}

impl QrGenerator for PngQrGenerator {
    fn generate_qr(&self, code: &str) -> AppResult<Vec<u8>> {
        let qr = QrCode::with_error_correction_level(self.payload(code).as_bytes(), EcLevel::M)?;
        let image = qr
            .render::<Luma<u8>>()
            .min_dimensions(MIN_SIZE, MIN_SIZE)
            .build();

        let mut png = Cursor::new(Vec::new());
        image.write_to(&mut png, ImageFormat::Png)?;
        Ok(png.into_inner())
    }
}
