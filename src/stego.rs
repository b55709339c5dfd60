//! StegVault - Steganographic Cover Images
//!
//! Hides a byte payload in the least significant bits of a synthetic,
//! noise-filled square RGBA image.
//!
//! ## Bit layout
//!
//! ```text
//! slot = (pixel, channel), channel in R,G,B; alpha is never used (always 255)
//!
//! header : 32 bits, big-endian payload length in bytes,
//!          one bit in the R LSB of pixels 0..32
//! payload: MSB-first per byte, every remaining R/G/B slot in raster order
//!          (pixel 0 G, pixel 0 B, pixel 1 G, ... pixel 32 R, pixel 32 G, ...)
//! ```
//!
//! Capacity of a `W x H` cover is `3 * W * H - 32` payload bits. Every bit
//! that does not carry data is uniform random noise.

use std::io::Cursor;

use image::{ImageFormat, RgbaImage};
use rand::RngCore;

use crate::error::{VaultError, VaultResult};

/// Bits reserved for the length header
pub const HEADER_BITS: usize = 32;

/// Data-carrying channels per pixel (R, G, B)
pub const DATA_CHANNELS: usize = 3;

/// Bytes per RGBA pixel
const PIXEL_STRIDE: usize = 4;

/// A synthetic cover image carrying a payload
#[derive(Debug, Clone, PartialEq)]
pub struct CoverImage {
    pixels: RgbaImage,
}

impl CoverImage {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Payload bits this cover can carry
    pub fn capacity_bits(&self) -> u64 {
        capacity_bits(self.width(), self.height())
    }

    pub fn as_rgba(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Encode as PNG (lossless, so the bit layout survives storage)
    pub fn to_png(&self) -> VaultResult<Vec<u8>> {
        let mut output = Vec::new();
        self.pixels
            .write_to(&mut Cursor::new(&mut output), ImageFormat::Png)
            .map_err(|e| VaultError::StegoCorrupt(format!("PNG encoding failed: {}", e)))?;
        Ok(output)
    }

    /// Parse a stored cover image
    pub fn from_png(data: &[u8]) -> VaultResult<Self> {
        let img = image::load_from_memory_with_format(data, ImageFormat::Png)
            .map_err(|e| VaultError::StegoCorrupt(format!("unreadable cover image: {}", e)))?;
        Ok(Self {
            pixels: img.to_rgba8(),
        })
    }
}

impl From<RgbaImage> for CoverImage {
    fn from(pixels: RgbaImage) -> Self {
        Self { pixels }
    }
}

/// Payload capacity in bits of a `width x height` cover. Zero when the
/// image cannot even hold the header.
pub fn capacity_bits(width: u32, height: u32) -> u64 {
    let pixels = width as u64 * height as u64;
    if pixels < HEADER_BITS as u64 {
        return 0;
    }
    pixels * DATA_CHANNELS as u64 - HEADER_BITS as u64
}

/// Smallest square side whose capacity holds `payload_len` bytes
pub fn side_for(payload_len: usize) -> VaultResult<u32> {
    let bits = payload_len as u64 * 8 + HEADER_BITS as u64;
    let pixels = bits.div_ceil(DATA_CHANNELS as u64).max(HEADER_BITS as u64);

    // f64 sqrt is only a starting point for large values
    let mut side = (pixels as f64).sqrt() as u64;
    while side * side < pixels {
        side += 1;
    }
    while side > 1 && (side - 1) * (side - 1) >= pixels {
        side -= 1;
    }

    u32::try_from(side).map_err(|_| VaultError::InvalidInput("payload too large".into()))
}

/// Embed a payload into a freshly generated cover of minimal size
pub fn encode(payload: &[u8]) -> VaultResult<CoverImage> {
    encode_with_side(payload, side_for(payload.len())?)
}

/// Embed a payload into a fresh `side x side` cover. Fails instead of
/// truncating when the payload does not fit.
pub fn encode_with_side(payload: &[u8], side: u32) -> VaultResult<CoverImage> {
    let length = u32::try_from(payload.len())
        .map_err(|_| VaultError::InvalidInput("payload exceeds 32-bit length header".into()))?;

    let needed = payload.len() as u64 * 8;
    let available = capacity_bits(side, side);
    let pixel_count = side as usize * side as usize;

    if pixel_count < HEADER_BITS || needed > available {
        return Err(VaultError::CoverTooSmall { needed, available });
    }

    // Cover noise
    let mut raw = vec![0u8; pixel_count * PIXEL_STRIDE];
    rand::thread_rng().fill_bytes(&mut raw);
    for px in raw.chunks_exact_mut(PIXEL_STRIDE) {
        px[3] = 255;
    }

    for i in 0..HEADER_BITS {
        let bit = ((length >> (HEADER_BITS - 1 - i)) & 1) as u8;
        set_lsb(&mut raw[i * PIXEL_STRIDE], bit);
    }

    let bits = payload
        .iter()
        .flat_map(|byte| (0..8).rev().map(move |k| (byte >> k) & 1));

    for (offset, bit) in payload_slots(pixel_count).zip(bits) {
        set_lsb(&mut raw[offset], bit);
    }

    RgbaImage::from_raw(side, side, raw)
        .map(CoverImage::from)
        .ok_or_else(|| VaultError::StegoCorrupt("pixel buffer size mismatch".into()))
}

/// Recover the payload from a cover image
pub fn decode(cover: &CoverImage) -> VaultResult<Vec<u8>> {
    let pixel_count = cover.width() as usize * cover.height() as usize;
    if pixel_count < HEADER_BITS {
        return Err(VaultError::StegoCorrupt(format!(
            "{}x{} image cannot hold a length header",
            cover.width(),
            cover.height()
        )));
    }

    let raw = cover.pixels.as_raw();
    if raw.len() < pixel_count * PIXEL_STRIDE {
        return Err(VaultError::StegoCorrupt("truncated pixel data".into()));
    }

    let length = (0..HEADER_BITS)
        .fold(0u32, |acc, i| (acc << 1) | (raw[i * PIXEL_STRIDE] & 1) as u32);

    // Bound-check the declared length before touching payload slots
    let needed = length as u64 * 8;
    let available = cover.capacity_bits();
    if needed > available {
        return Err(VaultError::StegoCorrupt(format!(
            "declared length {} bytes exceeds capacity of {} bits",
            length, available
        )));
    }

    let mut payload = vec![0u8; length as usize];
    for (i, offset) in payload_slots(pixel_count).take(needed as usize).enumerate() {
        payload[i / 8] |= (raw[offset] & 1) << (7 - i % 8);
    }

    Ok(payload)
}

/// Parse a stored PNG and recover its payload
pub fn decode_png(data: &[u8]) -> VaultResult<Vec<u8>> {
    decode(&CoverImage::from_png(data)?)
}

/// Raw-buffer offsets of the payload slots, in embedding order
fn payload_slots(pixel_count: usize) -> impl Iterator<Item = usize> {
    (0..pixel_count)
        .flat_map(|p| (0..DATA_CHANNELS).map(move |c| (p, c)))
        .filter(|&(p, c)| !(c == 0 && p < HEADER_BITS))
        .map(|(p, c)| p * PIXEL_STRIDE + c)
}

#[inline]
fn set_lsb(channel: &mut u8, bit: u8) {
    *channel = (*channel & 0xFE) | bit;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(len: usize) -> Vec<u8> {
        let mut data = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut data);
        data
    }

    #[test]
    fn test_roundtrip() {
        for len in [0usize, 1, 10, 20, 21, 48, 100, 1000, 4096] {
            let payload = sample(len);
            let cover = encode(&payload).unwrap();
            assert!(cover.capacity_bits() >= len as u64 * 8);
            assert_eq!(decode(&cover).unwrap(), payload, "length {}", len);
        }
    }

    #[test]
    fn test_png_roundtrip() {
        let payload: Vec<u8> = (1..=10).collect();
        let png = encode(&payload).unwrap().to_png().unwrap();
        assert_eq!(decode_png(&png).unwrap(), payload);
    }

    #[test]
    fn test_side_formula() {
        // header alone needs 32 pixels
        assert_eq!(side_for(0).unwrap(), 6);
        // 20 bytes + header = 192 bits = 64 pixels
        assert_eq!(side_for(20).unwrap(), 8);
        assert_eq!(side_for(21).unwrap(), 9);
        assert_eq!(capacity_bits(8, 8), 160);
        assert_eq!(capacity_bits(5, 5), 0);
    }

    #[test]
    fn test_capacity_boundary() {
        // 8x8 holds exactly 160 payload bits
        let exact = sample(20);
        let cover = encode_with_side(&exact, 8).unwrap();
        assert_eq!(decode(&cover).unwrap(), exact);

        let over = sample(21);
        assert!(matches!(
            encode_with_side(&over, 8),
            Err(VaultError::CoverTooSmall { needed: 168, available: 160 })
        ));

        // the sizing path grows the image instead
        let grown = encode(&over).unwrap();
        assert_eq!(grown.width(), 9);
        assert_eq!(decode(&grown).unwrap(), over);
    }

    #[test]
    fn test_header_in_red_lsbs() {
        let payload = sample(300);
        let cover = encode(&payload).unwrap();
        let img = cover.as_rgba();
        let width = img.width();

        let mut length = 0u32;
        for i in 0..HEADER_BITS as u32 {
            let px = img.get_pixel(i % width, i / width);
            length = (length << 1) | (px[0] & 1) as u32;
        }
        assert_eq!(length, 300);
    }

    #[test]
    fn test_payload_starts_at_first_green_slot() {
        let cover = encode(&[0b1010_0000]).unwrap();
        let img = cover.as_rgba();
        // bit 7 -> pixel 0 G, bit 6 -> pixel 0 B, bit 5 -> pixel 1 G
        assert_eq!(img.get_pixel(0, 0)[1] & 1, 1);
        assert_eq!(img.get_pixel(0, 0)[2] & 1, 0);
        assert_eq!(img.get_pixel(1, 0)[1] & 1, 1);
    }

    #[test]
    fn test_alpha_always_opaque() {
        let cover = encode(&sample(64)).unwrap();
        assert!(cover.as_rgba().pixels().all(|p| p[3] == 255));
    }

    #[test]
    fn test_oversized_header_rejected() {
        let cover = encode(&sample(4)).unwrap();
        let mut img = cover.as_rgba().clone();
        let width = img.width();
        // declare 0xFFFFFFFF bytes
        for i in 0..HEADER_BITS as u32 {
            img.get_pixel_mut(i % width, i / width)[0] |= 1;
        }

        let result = decode(&CoverImage::from(img));
        assert!(matches!(result, Err(VaultError::StegoCorrupt(_))));
    }

    #[test]
    fn test_tiny_image_rejected() {
        let img = RgbaImage::from_pixel(5, 5, image::Rgba([0, 0, 0, 255]));
        assert!(matches!(
            decode(&CoverImage::from(img)),
            Err(VaultError::StegoCorrupt(_))
        ));
    }

    #[test]
    fn test_garbage_png_rejected() {
        assert!(matches!(
            decode_png(b"definitely not a png"),
            Err(VaultError::StegoCorrupt(_))
        ));
        assert!(matches!(decode_png(&[]), Err(VaultError::StegoCorrupt(_))));
    }
}
