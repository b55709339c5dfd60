//! StegVault - Biometric Gate
//!
//! Face similarity + PIN check guarding document extraction.
//!
//! The face check is a coarse perceptual heuristic, not face recognition:
//! both images are resampled to a 100x100 RGB grid and compared cell by
//! cell with Euclidean RGB distance. It has no resistance to pose or
//! lighting changes, nor to spoofing with a photo of the enrolled image.

use std::borrow::Cow;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{imageops::FilterType, RgbImage};
use serde::Serialize;

use crate::error::{VaultError, VaultResult};

/// Side of the comparison grid
pub const FACE_GRID: u32 = 100;

/// Similarity above which two faces are considered a match
pub const MATCH_THRESHOLD: f64 = 60.0;

/// Length of an enrolled PIN
pub const PIN_LEN: usize = 4;

/// Result of a face comparison
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Similarity {
    /// 0..=100, rounded to two decimals
    pub score: f64,
    /// `score > MATCH_THRESHOLD`
    pub matched: bool,
    pub threshold: f64,
    /// Set when the images could not be processed at all
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Similarity {
    fn from_score(score: f64) -> Self {
        Self {
            score,
            matched: score > MATCH_THRESHOLD,
            threshold: MATCH_THRESHOLD,
            error: None,
        }
    }

    fn failed(reason: String) -> Self {
        Self {
            score: 0.0,
            matched: false,
            threshold: MATCH_THRESHOLD,
            error: Some(reason),
        }
    }

    /// True when scoring failed for processing reasons rather than a low score
    pub fn is_service_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Score two face images. Never fails: unusable input yields
/// `score = 0, matched = false` with `error` set.
pub fn score_faces(reference: &[u8], candidate: &[u8]) -> Similarity {
    match compare_faces(reference, candidate) {
        Ok(score) => Similarity::from_score(score),
        Err(e) => {
            log::warn!("Face verification: {}", e);
            Similarity::failed(e.to_string())
        }
    }
}

/// Fallible core of [`score_faces`]
pub fn compare_faces(reference: &[u8], candidate: &[u8]) -> VaultResult<f64> {
    let a = to_grid(reference)?;
    let b = to_grid(candidate)?;

    let total: f64 = a
        .pixels()
        .zip(b.pixels())
        .map(|(p, q)| {
            let dr = p[0] as f64 - q[0] as f64;
            let dg = p[1] as f64 - q[1] as f64;
            let db = p[2] as f64 - q[2] as f64;
            (dr * dr + dg * dg + db * db).sqrt()
        })
        .sum();

    let avg_diff = total / (FACE_GRID as f64 * FACE_GRID as f64);
    let max_diff = (3.0 * 255.0f64.powi(2)).sqrt();
    let score = (100.0 - avg_diff / max_diff * 100.0).max(0.0);

    Ok((score * 100.0).round() / 100.0)
}

/// Exact comparison of trimmed PINs. `"0123"` never equals `"123"`.
pub fn match_pin(stored: &str, entered: &str) -> bool {
    let stored = stored.trim();
    let entered = entered.trim();
    if stored.is_empty() || entered.is_empty() {
        return false;
    }
    stored == entered
}

/// Enrollment rule: exactly four ASCII digits
pub fn is_valid_pin(pin: &str) -> bool {
    pin.len() == PIN_LEN && pin.bytes().all(|b| b.is_ascii_digit())
}

/// Strip a `data:image/<type>;base64,` prefix if present
pub fn strip_data_url(input: &str) -> &str {
    let Some(rest) = input.strip_prefix("data:image/") else {
        return input;
    };
    match rest.split_once(";base64,") {
        Some((kind, payload)) if is_image_subtype(kind) => payload,
        _ => input,
    }
}

fn is_image_subtype(kind: &str) -> bool {
    !kind.is_empty() && kind.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Decode a base64 or data-URL image string into raw image bytes
pub fn decode_image_payload(input: &str) -> VaultResult<Vec<u8>> {
    let cleaned = strip_data_url(input.trim()).trim();
    if cleaned.is_empty() {
        return Err(VaultError::InvalidImage("empty face image data".into()));
    }

    let bytes = STANDARD.decode(cleaned)?;
    if bytes.is_empty() {
        return Err(VaultError::InvalidImage("empty image buffer".into()));
    }
    Ok(bytes)
}

/// Accept raw encoded image bytes, or the same as base64/data-URL text
fn normalize_image_bytes(input: &[u8]) -> VaultResult<Cow<'_, [u8]>> {
    if input.is_empty() {
        return Err(VaultError::InvalidImage("empty image buffer".into()));
    }

    if image::guess_format(input).is_ok() {
        return Ok(Cow::Borrowed(input));
    }

    let text = std::str::from_utf8(input)
        .map_err(|_| VaultError::InvalidImage("unrecognized image format".into()))?;
    decode_image_payload(text).map(Cow::Owned)
}

fn to_grid(input: &[u8]) -> VaultResult<RgbImage> {
    let bytes = normalize_image_bytes(input)?;
    let img = image::load_from_memory(&bytes)?;

    if img.width() == 0 || img.height() == 0 {
        return Err(VaultError::InvalidImage("zero-sized image".into()));
    }

    Ok(image::imageops::resize(
        &img.to_rgb8(),
        FACE_GRID,
        FACE_GRID,
        FilterType::Triangle,
    ))
}
