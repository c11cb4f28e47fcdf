//! Per-client frame compression keyed to reported latency.

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

use crate::error::Result;

/// Latency tiers (seconds) and the JPEG quality each earns. Beyond the
/// last tier the client gets no pixels at all.
const QUALITY_TIERS: [(f64, u8); 4] = [(0.1, 70), (1.0, 50), (2.0, 20), (5.0, 10)];

/// JPEG quality for a reported latency. A client that has not reported
/// yet gets the best tier; `None` means skip the pixels.
pub fn quality_for_latency(latency_secs: Option<f64>) -> Option<u8> {
    let latency = latency_secs.unwrap_or(0.0);
    QUALITY_TIERS
        .iter()
        .find(|(limit, _)| latency <= *limit)
        .map(|(_, quality)| *quality)
}

/// Re-encode a frame at the given quality, scaling dimensions by
/// sqrt(quality/100) so the byte size falls roughly with the square of
/// the quality drop. Returns base64 JPEG.
pub fn encode_frame(frame: &DynamicImage, quality: u8) -> Result<String> {
    let scale = (quality as f64 / 100.0).sqrt();
    let (width, height) = frame.dimensions();
    let target_w = ((width as f64 * scale).round() as u32).max(1);
    let target_h = ((height as f64 * scale).round() as u32).max(1);

    let resized = if target_w < width {
        frame.resize_exact(target_w, target_h, FilterType::Triangle)
    } else {
        frame.clone()
    };

    let mut jpeg = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, quality);
    encoder.encode_image(&resized.to_rgb8())?;
    Ok(base64::engine::general_purpose::STANDARD.encode(&jpeg))
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    #[test]
    fn quality_ladder() {
        assert_eq!(quality_for_latency(None), Some(70));
        assert_eq!(quality_for_latency(Some(0.05)), Some(70));
        assert_eq!(quality_for_latency(Some(0.1)), Some(70));
        assert_eq!(quality_for_latency(Some(0.5)), Some(50));
        assert_eq!(quality_for_latency(Some(1.5)), Some(20));
        assert_eq!(quality_for_latency(Some(4.0)), Some(10));
        assert_eq!(quality_for_latency(Some(7.0)), None);
    }

    #[test]
    fn encode_scales_with_quality() {
        let frame = DynamicImage::ImageLuma8(GrayImage::from_pixel(100, 80, image::Luma([128])));
        let b64 = encode_frame(&frame, 70).unwrap();

        let jpeg = base64::engine::general_purpose::STANDARD
            .decode(b64)
            .unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        // sqrt(0.70) ~ 0.8367
        assert_eq!(decoded.dimensions(), (84, 67));
    }

    #[test]
    fn full_quality_keeps_dimensions() {
        let frame = DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 48, image::Luma([10])));
        let b64 = encode_frame(&frame, 100).unwrap();
        let jpeg = base64::engine::general_purpose::STANDARD
            .decode(b64)
            .unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (64, 48));
    }
}
