use base64::{engine::general_purpose::STANDARD as base64, Engine as _};

use crate::errors::{AppError, Result};

const ACCEPTED_MIME_TYPES: [&str; 2] = ["image/png", "image/jpeg"];

/// Encoded signature image, always held as a `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureImage {
    data_url: String,
    mime_type: String,
}

impl SignatureImage {
    /// Builds an image from raw file bytes, sniffing the format from content.
    pub fn from_image_bytes(bytes: &[u8]) -> Result<Self> {
        let mime_type = sniff_mime(bytes)?;
        Ok(SignatureImage {
            data_url: format!("data:{};base64,{}", mime_type, base64.encode(bytes)),
            mime_type: mime_type.to_string(),
        })
    }

    /// Accepts a stored `data:image/...;base64,` URL, or bare base64 image data.
    pub fn from_data_url(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let Some(rest) = raw.strip_prefix("data:") else {
            let bytes = base64
                .decode(raw)
                .map_err(|_| AppError::InvalidImageFormat)?;
            return Self::from_image_bytes(&bytes);
        };

        let (mime_type, payload) = rest
            .split_once(";base64,")
            .ok_or(AppError::InvalidImageFormat)?;
        if !mime_type.starts_with("image/") || payload.is_empty() {
            return Err(AppError::InvalidImageFormat);
        }
        base64
            .decode(payload)
            .map_err(|_| AppError::InvalidImageFormat)?;

        Ok(SignatureImage {
            data_url: raw.to_string(),
            mime_type: mime_type.to_string(),
        })
    }

    pub fn as_data_url(&self) -> &str {
        &self.data_url
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }
}

fn sniff_mime(bytes: &[u8]) -> Result<&'static str> {
    let kind = infer::get(bytes).ok_or(AppError::InvalidImageFormat)?;
    ACCEPTED_MIME_TYPES
        .into_iter()
        .find(|accepted| *accepted == kind.mime_type())
        .ok_or(AppError::InvalidImageFormat)
}

/// Local stand-in for the signature canvas.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignaturePad {
    image: Option<SignatureImage>,
    freshly_drawn: bool,
    cleared: bool,
}

impl SignaturePad {
    /// Pad showing a signature already on file.
    pub fn with_existing(image: SignatureImage) -> Self {
        SignaturePad {
            image: Some(image),
            freshly_drawn: false,
            cleared: false,
        }
    }

    pub fn draw(&mut self, image: SignatureImage) {
        self.image = Some(image);
        self.freshly_drawn = true;
    }

    /// Wipes the pad. The `cleared` mark survives later drawings.
    pub fn clear(&mut self) {
        self.image = None;
        self.freshly_drawn = false;
        self.cleared = true;
    }

    pub fn is_empty(&self) -> bool {
        self.image.is_none()
    }

    pub fn was_cleared(&self) -> bool {
        self.cleared
    }

    pub fn is_freshly_drawn(&self) -> bool {
        self.freshly_drawn
    }

    pub fn image(&self) -> Option<&SignatureImage> {
        self.image.as_ref()
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn encodes_png_and_jpeg_as_data_urls() {
        let png = SignatureImage::from_image_bytes(PNG_BYTES).unwrap();
        assert_eq!(png.mime_type(), "image/png");
        assert!(png.as_data_url().starts_with("data:image/png;base64,iVBORw0KGgo"));

        let jpeg = SignatureImage::from_image_bytes(JPEG_BYTES).unwrap();
        assert_eq!(jpeg.mime_type(), "image/jpeg");
    }

    #[test]
    fn rejects_non_image_bytes() {
        let err = SignatureImage::from_image_bytes(b"%PDF-1.7 not a signature").unwrap_err();
        assert!(matches!(err, AppError::InvalidImageFormat));
    }

    #[test]
    fn parses_stored_data_url_and_bare_base64() {
        let original = SignatureImage::from_image_bytes(PNG_BYTES).unwrap();
        let parsed = SignatureImage::from_data_url(original.as_data_url()).unwrap();
        assert_eq!(parsed, original);

        let bare = base64.encode(PNG_BYTES);
        let wrapped = SignatureImage::from_data_url(&bare).unwrap();
        assert_eq!(wrapped.as_data_url(), original.as_data_url());

        assert!(SignatureImage::from_data_url("data:text/plain;base64,aGk=").is_err());
        assert!(SignatureImage::from_data_url("data:image/png;base64,@@@").is_err());
    }

    #[test]
    fn clear_marks_pad_even_after_redraw() {
        let mut pad = SignaturePad::with_existing(SignatureImage::from_image_bytes(PNG_BYTES).unwrap());
        assert!(!pad.is_empty());
        assert!(!pad.is_freshly_drawn());

        pad.clear();
        assert!(pad.is_empty());
        assert!(pad.was_cleared());

        pad.draw(SignatureImage::from_image_bytes(OTHER_PNG_BYTES).unwrap());
        assert!(!pad.is_empty());
        assert!(pad.is_freshly_drawn());
        assert!(pad.was_cleared());
    }
}
