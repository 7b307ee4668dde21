use image::imageops::{resize, FilterType};
use image::GrayImage;

const DESCRIPTOR_SIZE: u32 = 64;

/// Weights of the combined identity score. Histogram correlation and
/// template matching carry most of the signal; the MSE term penalizes
/// gross structural change.
const HISTOGRAM_WEIGHT: f64 = 0.4;
const TEMPLATE_WEIGHT: f64 = 0.4;
const MSE_WEIGHT: f64 = 0.2;

/// Downsamples a face region to the canonical 64x64 descriptor.
pub fn to_descriptor(region: &GrayImage) -> GrayImage {
    resize(region, DESCRIPTOR_SIZE, DESCRIPTOR_SIZE, FilterType::Triangle)
}

/// Combined similarity in [0, 1] between two face descriptors:
/// 0.4 x histogram correlation + 0.4 x normalized template match
/// + 0.2 x (1 - normalized mean squared error).
pub fn compare_faces(a: &GrayImage, b: &GrayImage) -> f64 {
    let a = to_descriptor(a);
    let b = to_descriptor(b);

    let hist = histogram_correlation(&a, &b).max(0.0);
    let template = template_match(&a, &b).max(0.0);
    let mse = normalized_mse(&a, &b);

    let score = HISTOGRAM_WEIGHT * hist + TEMPLATE_WEIGHT * template + MSE_WEIGHT * (1.0 - mse);
    score.clamp(0.0, 1.0)
}

pub fn mean_brightness(img: &GrayImage) -> f64 {
    if img.is_empty() {
        return 0.0;
    }
    let sum: u64 = img.pixels().map(|p| u64::from(p.0[0])).sum();
    sum as f64 / img.len() as f64
}

/// Pearson correlation of the two 256-bin intensity histograms.
fn histogram_correlation(a: &GrayImage, b: &GrayImage) -> f64 {
    let ha = histogram(a);
    let hb = histogram(b);
    pearson(&ha, &hb)
}

/// Normalized cross-correlation over the raw descriptor pixels.
fn template_match(a: &GrayImage, b: &GrayImage) -> f64 {
    let pa: Vec<f64> = a.pixels().map(|p| f64::from(p.0[0])).collect();
    let pb: Vec<f64> = b.pixels().map(|p| f64::from(p.0[0])).collect();
    pearson(&pa, &pb)
}

/// Mean squared pixel error scaled into [0, 1].
fn normalized_mse(a: &GrayImage, b: &GrayImage) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 1.0;
    }
    let sum: f64 = a
        .pixels()
        .zip(b.pixels())
        .map(|(pa, pb)| {
            let d = f64::from(pa.0[0]) - f64::from(pb.0[0]);
            d * d
        })
        .sum();
    (sum / n as f64) / (255.0 * 255.0)
}

fn histogram(img: &GrayImage) -> Vec<f64> {
    let mut bins = vec![0.0f64; 256];
    for p in img.pixels() {
        bins[p.0[0] as usize] += 1.0;
    }
    let total: f64 = img.len() as f64;
    if total > 0.0 {
        for b in bins.iter_mut() {
            *b /= total;
        }
    }
    bins
}

fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let mean_a: f64 = a[..n].iter().sum::<f64>() / n as f64;
    let mean_b: f64 = b[..n].iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..n {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a == 0.0 || var_b == 0.0 {
        // Flat signals: identical flats correlate perfectly.
        return if (mean_a - mean_b).abs() < f64::EPSILON {
            1.0
        } else {
            0.0
        };
    }
    cov / (var_a.sqrt() * var_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn identical_faces_score_near_one() {
        let img = GrayImage::from_fn(64, 64, |x, y| Luma([((x * 3 + y * 5) % 256) as u8]));
        let score = compare_faces(&img, &img);
        assert!(score > 0.99, "score was {}", score);
    }

    #[test]
    fn dissimilar_faces_score_low() {
        let a = GrayImage::from_fn(64, 64, |x, _| Luma([((x * 4) % 256) as u8]));
        let b = GrayImage::from_fn(64, 64, |x, _| Luma([(255 - (x * 4) % 256) as u8]));
        let score = compare_faces(&a, &b);
        assert!(score < 0.7, "score was {}", score);
    }

    #[test]
    fn brightness_of_flat_image() {
        let img = GrayImage::from_pixel(10, 10, Luma([120]));
        assert!((mean_brightness(&img) - 120.0).abs() < 1e-9);
    }

    #[test]
    fn descriptor_is_64x64() {
        let img = GrayImage::from_pixel(320, 240, Luma([80]));
        let d = to_descriptor(&img);
        assert_eq!((d.width(), d.height()), (64, 64));
    }
}
