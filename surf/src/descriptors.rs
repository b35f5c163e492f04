use crate::integral::IntegralImage;
use crate::{KeyPoint, Surf};
use derive_more::Deref;
use std::f64::consts::PI;

#[cfg(feature = "rayon")]
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Which descriptor, if any, to compute for each keypoint.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DescriptorMode {
    /// Only detect keypoints.
    None,
    /// 64 components: `dx, dy, |dx|, |dy|` for each of the 4x4 sub-regions.
    #[default]
    Standard,
    /// 128 components: the standard sums split by the sign of the
    /// perpendicular response.
    Extended,
}

impl DescriptorMode {
    /// Number of components of a descriptor in this mode.
    pub fn len(self) -> usize {
        match self {
            DescriptorMode::None => 0,
            DescriptorMode::Standard => 64,
            DescriptorMode::Extended => 128,
        }
    }

    pub fn is_empty(self) -> bool {
        self.len() == 0
    }
}

/// A SURF descriptor. Unit length unless the keypoint neighborhood was flat.
#[derive(Debug, Clone, PartialEq, Deref)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Descriptor(pub Vec<f32>);

impl Descriptor {
    pub fn distance_squared(&self, other: &Descriptor) -> f32 {
        self.iter()
            .zip(other.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum()
    }

    pub fn norm(&self) -> f32 {
        self.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    /// Cosine of the angle between the two descriptors; zero if either is all zeros.
    pub fn cosine_similarity(&self, other: &Descriptor) -> f32 {
        let dot: f32 = self.iter().zip(other.iter()).map(|(a, b)| a * b).sum();
        let norms = self.norm() * other.norm();
        if norms == 0.0 {
            0.0
        } else {
            dot / norms
        }
    }
}

/// The 2D Gaussian function.
///
/// # Arguments
/// * `x`, `y` - the offset.
/// * `sigma` - standard deviation.
/// # Return value
/// The kernel value at (x, y).
fn gaussian(x: f64, y: f64, sigma: f64) -> f64 {
    (2.0 * PI * sigma * sigma).recip() * (-(x * x + y * y) / (2.0 * sigma * sigma)).exp()
}

impl Surf {
    /// Compute the descriptor of every keypoint according to `self.descriptor`.
    ///
    /// Keypoint orientations are used unless `self.orientation` is off, in
    /// which case upright descriptors are produced.
    pub fn compute_descriptors(&self, keypoints: &mut [KeyPoint], integral: &IntegralImage) {
        if self.descriptor == DescriptorMode::None {
            return;
        }
        let upright = !self.orientation;
        let extended = self.descriptor == DescriptorMode::Extended;
        #[cfg(not(feature = "rayon"))]
        for keypoint in keypoints.iter_mut() {
            keypoint.descriptor = Some(get_descriptor(keypoint, integral, upright, extended));
        }
        #[cfg(feature = "rayon")]
        keypoints.par_iter_mut().for_each(|keypoint| {
            keypoint.descriptor = Some(get_descriptor(keypoint, integral, upright, extended));
        });
    }
}

/// Computes the SURF descriptor of a keypoint.
///
/// A 20x20 (in units of scale) square around the keypoint, rotated to the
/// keypoint orientation, is split into 4x4 overlapping sub-regions of 9x9
/// samples each. Every sub-region contributes the Gaussian weighted sums of
/// its rotated Haar responses.
///
/// # Arguments
/// * `keypoint` - Input keypoint
/// * `integral` - Integral image of the source image
/// * `upright` - Ignore the orientation of the keypoint
/// * `extended` - Produce 128 instead of 64 components
pub fn get_descriptor(
    keypoint: &KeyPoint,
    integral: &IntegralImage,
    upright: bool,
    extended: bool,
) -> Descriptor {
    let components = if extended { 8 } else { 4 };
    let mut values = Vec::with_capacity(16 * components);

    let scale = f64::from(keypoint.scale);
    let x = f64::from(keypoint.point.0).round();
    let y = f64::from(keypoint.point.1).round();
    let (co, si) = if upright {
        (1.0, 0.0)
    } else {
        let orientation = f64::from(keypoint.orientation);
        (orientation.cos(), orientation.sin())
    };
    let haar_size = 2 * (scale.round() as isize).max(1);
    // Position of a sample at grid offset (k, l) in the rotated frame.
    let rotated = |k: f64, l: f64| {
        (
            (x + (-l * scale * si + k * scale * co)).round(),
            (y + (l * scale * co + k * scale * si)).round(),
        )
    };

    let mut length = 0f64;
    let mut cx = -0.5f64;
    let mut i = -8isize;
    while i < 12 {
        i -= 4;
        cx += 1.0;
        let mut cy = -0.5f64;
        let mut j = -8isize;
        while j < 12 {
            j -= 4;
            cy += 1.0;
            // Center of the sub-region.
            let (xs, ys) = rotated((i + 5) as f64, (j + 5) as f64);
            // dx, dy, |dx|, |dy|, then the negative halves when extended.
            let mut sums = [0f64; 8];
            for k in i..i + 9 {
                for l in j..j + 9 {
                    let (sample_x, sample_y) = rotated(k as f64, l as f64);
                    let weight = gaussian(xs - sample_x, ys - sample_y, 2.5 * scale);
                    let rx = integral.haar_x(sample_y as isize, sample_x as isize, haar_size);
                    let ry = integral.haar_y(sample_y as isize, sample_x as isize, haar_size);
                    // Responses in the keypoint frame.
                    let rrx = weight * (-rx * si + ry * co);
                    let rry = weight * (rx * co + ry * si);
                    if !extended {
                        sums[0] += rrx;
                        sums[1] += rry;
                        sums[2] += rrx.abs();
                        sums[3] += rry.abs();
                    } else {
                        if rry >= 0.0 {
                            sums[0] += rrx;
                            sums[2] += rrx.abs();
                        } else {
                            sums[4] += rrx;
                            sums[6] += rrx.abs();
                        }
                        if rrx >= 0.0 {
                            sums[1] += rry;
                            sums[3] += rry.abs();
                        } else {
                            sums[5] += rry;
                            sums[7] += rry.abs();
                        }
                    }
                }
            }
            let region_weight = gaussian(cx - 2.0, cy - 2.0, 1.5);
            for sum in &sums[..components] {
                let value = sum * region_weight;
                length += value * value;
                values.push(value);
            }
            j += 9;
        }
        i += 9;
    }

    let norm = length.sqrt();
    Descriptor(
        values
            .into_iter()
            .map(|v| if norm > 0.0 { (v / norm) as f32 } else { v as f32 })
            .collect(),
    )
}
