//! Data URL → grayscale pixel buffer.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{GrayImage, ImageReader};
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("image payload is not a data URL (missing ',' separator)")]
    MissingSeparator,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("failed to read image bytes: {0}")]
    Io(#[from] std::io::Error),
    #[error("undecodable image: {0}")]
    Image(#[from] image::ImageError),
}

/// Decode a `<metadata>,<base64>` data URL into an 8-bit grayscale buffer.
///
/// The metadata prefix is ignored; the image format is sniffed from the bytes.
pub fn decode_data_url(data_url: &str) -> Result<GrayImage, DecodeError> {
    let (_, payload) = data_url
        .split_once(',')
        .ok_or(DecodeError::MissingSeparator)?;

    let bytes = STANDARD.decode(payload.trim())?;

    let image = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()?;

    Ok(image.to_luma8())
}
