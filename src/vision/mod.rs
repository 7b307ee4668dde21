pub mod similarity;

use crate::error::{Error, Result};
use base64::Engine;
use image::GrayImage;

/// Detected region in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceBox {
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn center_y(&self) -> f64 {
        f64::from(self.y) + f64::from(self.height) / 2.0
    }
}

/// Optional face/eye detection capability. When no detector is configured
/// the proctoring monitor degrades to advisory mode: one face assumed
/// present, no alerts raised.
pub trait FaceDetector: Send + Sync {
    fn detect_faces(&self, frame: &GrayImage) -> Result<Vec<FaceBox>>;

    fn detect_eyes(&self, face_region: &GrayImage) -> Result<Vec<FaceBox>>;
}

/// Decodes a base64 image payload, with or without a
/// `data:image/...;base64,` prefix, into its raw bytes.
pub fn decode_base64_image(data: &str) -> Result<Vec<u8>> {
    let encoded = match data.split_once(";base64,") {
        Some((_, rest)) => rest,
        None => data,
    };
    base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| Error::BadRequest(format!("Invalid base64 image payload: {}", e)))
}

/// Decodes a webcam frame submitted as a base64 payload into a grayscale
/// buffer.
pub fn decode_frame(data: &str) -> Result<GrayImage> {
    let bytes = decode_base64_image(data)?;
    let img = image::load_from_memory(&bytes)
        .map_err(|e| Error::BadRequest(format!("Unreadable image payload: {}", e)))?;
    Ok(img.to_luma8())
}

/// Crops a detected box out of the frame, clamped to the frame bounds.
pub fn crop_region(frame: &GrayImage, region: &FaceBox) -> GrayImage {
    let x = region.x.min(frame.width().saturating_sub(1));
    let y = region.y.min(frame.height().saturating_sub(1));
    let w = region.width.min(frame.width() - x).max(1);
    let h = region.height.min(frame.height() - y).max(1);
    image::imageops::crop_imm(frame, x, y, w, h).to_image()
}
