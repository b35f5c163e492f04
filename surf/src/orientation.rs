use crate::integral::IntegralImage;
use crate::{KeyPoint, Surf};
use std::f64::consts::{PI, TAU};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Width of the sliding angular window.
const WINDOW: f64 = PI / 3.0;
/// Distance between two consecutive window positions.
const WINDOW_STEP: f64 = 0.15;

/// A 7x7 Gaussian kernel (sigma = 2.5), one quadrant of the sampling disc.
#[allow(clippy::excessive_precision)]
static GAUSS25: [[f64; 7usize]; 7usize] = [
    [
        0.0254_6481,
        0.0235_0698,
        0.0184_9125,
        0.0123_9505,
        0.0070_8017,
        0.0034_4629,
        0.0014_2946,
    ],
    [
        0.0235_0698,
        0.0216_9968,
        0.0170_6957,
        0.0114_4208,
        0.0065_3582,
        0.0031_8132,
        0.0013_1956,
    ],
    [
        0.0184_9125,
        0.0170_6957,
        0.0134_2740,
        0.0090_0066,
        0.0051_4126,
        0.0025_0252,
        0.0010_3800,
    ],
    [
        0.0123_9505,
        0.0114_4208,
        0.0090_0066,
        0.0060_3332,
        0.0034_4629,
        0.0016_7749,
        0.0006_9579,
    ],
    [
        0.0070_8017,
        0.0065_3582,
        0.0051_4126,
        0.0034_4629,
        0.0019_6855,
        0.0009_5820,
        0.0003_9744,
    ],
    [
        0.0034_4629,
        0.0031_8132,
        0.0025_0252,
        0.0016_7749,
        0.0009_5820,
        0.0004_6640,
        0.0001_9346,
    ],
    [
        0.0014_2946,
        0.0013_1956,
        0.0010_3800,
        0.0006_9579,
        0.0003_9744,
        0.0001_9346,
        0.0000_8024,
    ],
];

/// Mirrors a disc offset in `-6..=6` onto a `GAUSS25` index.
const GAUSS25_INDEX: [usize; 13usize] = [6, 5, 4, 3, 2, 1, 0, 1, 2, 3, 4, 5, 6];

/// The angle of a vector in `[0, 2π)`.
fn angle(x: f64, y: f64) -> f64 {
    let angle = y.atan2(x);
    if angle < 0.0 {
        angle + TAU
    } else {
        angle
    }
}

struct Sample {
    x: f64,
    y: f64,
    angle: f64,
}

impl Surf {
    /// Assign the dominant orientation to every keypoint.
    pub fn compute_orientations(&self, keypoints: &mut [KeyPoint], integral: &IntegralImage) {
        #[cfg(not(feature = "rayon"))]
        for keypoint in keypoints.iter_mut() {
            keypoint.orientation = compute_main_orientation(keypoint, integral);
        }
        #[cfg(feature = "rayon")]
        keypoints.par_iter_mut().for_each(|keypoint| {
            keypoint.orientation = compute_main_orientation(keypoint, integral);
        });
    }
}

/// Compute the main orientation of the keypoint, in `[0, 2π)`.
///
/// Haar responses are sampled on a disc of radius `6 * scale` and weighted
/// by `GAUSS25`. A window of π/3 slides around the circle; the direction of
/// the largest summed response inside the window wins.
pub fn compute_main_orientation(keypoint: &KeyPoint, integral: &IntegralImage) -> f32 {
    let r = f64::from(keypoint.point.1).round() as isize;
    let c = f64::from(keypoint.point.0).round() as isize;
    let s = (f64::from(keypoint.scale).round() as isize).max(1);

    // Calculate Haar responses for points within radius of 6*scale
    let mut samples = Vec::with_capacity(109);
    for i in -6isize..=6 {
        for j in -6isize..=6 {
            if i * i + j * j < 36 {
                let gauss = GAUSS25[GAUSS25_INDEX[(i + 6) as usize]][GAUSS25_INDEX[(j + 6) as usize]];
                let x = gauss * integral.haar_x(r + j * s, c + i * s, 4 * s);
                let y = gauss * integral.haar_y(r + j * s, c + i * s, 4 * s);
                samples.push(Sample {
                    x,
                    y,
                    angle: angle(x, y),
                });
            }
        }
    }

    let mut max = 0f64;
    let mut orientation = 0f64;
    let mut start = 0f64;
    while start < TAU {
        let (mut sum_x, mut sum_y) = (0f64, 0f64);
        for sample in &samples {
            // Handles windows that wrap past 2π.
            if (sample.angle - start).rem_euclid(TAU) < WINDOW {
                sum_x += sample.x;
                sum_y += sample.y;
            }
        }
        // If the vector produced from this window is longer than all
        // previous vectors then this forms the new dominant direction.
        let magnitude = sum_x * sum_x + sum_y * sum_y;
        if magnitude > max {
            max = magnitude;
            orientation = angle(sum_x, sum_y);
        }
        start += WINDOW_STEP;
    }
    (orientation as f32).rem_euclid(std::f32::consts::TAU)
}
