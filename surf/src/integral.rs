use crate::image::GrayFloatImage;
use ndarray::Array2;

/// A summed-area table over a [`GrayFloatImage`].
///
/// The table is padded with a leading row and column of zeros, so entry
/// `[r, c]` holds the sum of all samples strictly above row `r` and strictly
/// left of column `c`. Sums are accumulated in `f64` to keep large images
/// from drifting.
#[derive(Debug, Clone)]
pub struct IntegralImage {
    table: Array2<f64>,
    width: usize,
    height: usize,
}

impl IntegralImage {
    pub fn new(image: &GrayFloatImage) -> Self {
        let (width, height) = (image.width(), image.height());
        let mut table = Array2::zeros((height + 1, width + 1));
        let source = image.ref_array2();
        for row in 0..height {
            let mut row_sum = 0f64;
            for col in 0..width {
                row_sum += f64::from(source[[row, col]]);
                table[[row + 1, col + 1]] = table[[row, col + 1]] + row_sum;
            }
        }
        Self {
            table,
            width,
            height,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Sum of the samples in the inclusive rectangle `(x0, y0)..=(x1, y1)`.
    ///
    /// Coordinates are clamped to the image. A rectangle that is empty after
    /// clamping sums to zero.
    pub fn rectangle_sum(&self, x0: isize, y0: isize, x1: isize, y1: isize) -> f64 {
        let clamp_x = |x: isize| x.clamp(0, self.width as isize) as usize;
        let clamp_y = |y: isize| y.clamp(0, self.height as isize) as usize;
        // Convert to half-open padded table coordinates.
        let (c0, c1) = (clamp_x(x0), clamp_x(x1.saturating_add(1)));
        let (r0, r1) = (clamp_y(y0), clamp_y(y1.saturating_add(1)));
        if c1 <= c0 || r1 <= r0 {
            return 0.0;
        }
        let t = &self.table;
        t[[r1, c1]] - t[[r0, c1]] - t[[r1, c0]] + t[[r0, c0]]
    }

    /// Sum over the box starting at `(row, col)` and spanning `rows × cols`.
    ///
    /// Parts of the box outside the image contribute nothing. The result
    /// never goes below zero, which absorbs cancellation noise on flat
    /// regions.
    pub fn box_sum(&self, row: isize, col: isize, rows: isize, cols: isize) -> f64 {
        if rows <= 0 || cols <= 0 {
            return 0.0;
        }
        self.rectangle_sum(col, row, col + cols - 1, row + rows - 1)
            .max(0.0)
    }

    /// Horizontal Haar wavelet response of side `size` centred at `(row, col)`.
    pub fn haar_x(&self, row: isize, col: isize, size: isize) -> f64 {
        let half = size / 2;
        self.box_sum(row - half, col, size, half) - self.box_sum(row - half, col - half, size, half)
    }

    /// Vertical Haar wavelet response of side `size` centred at `(row, col)`.
    pub fn haar_y(&self, row: isize, col: isize, size: isize) -> f64 {
        let half = size / 2;
        self.box_sum(row, col - half, half, size) - self.box_sum(row - half, col - half, half, size)
    }
}

#[cfg(test)]
mod tests {
    use super::IntegralImage;
    use crate::image::GrayFloatImage;

    fn ramp() -> GrayFloatImage {
        GrayFloatImage::from_fn(7, 5, |x, y| (x + 3 * y) as f32 * 0.125)
    }

    fn brute_force(image: &GrayFloatImage, x0: usize, y0: usize, x1: usize, y1: usize) -> f64 {
        let mut sum = 0.0;
        for y in y0..=y1 {
            for x in x0..=x1 {
                sum += f64::from(image.get(x, y));
            }
        }
        sum
    }

    #[test]
    fn rectangle_sums_match_brute_force() {
        let image = ramp();
        let integral = IntegralImage::new(&image);
        for (x0, y0, x1, y1) in [(0, 0, 6, 4), (2, 1, 4, 3), (5, 0, 5, 0), (0, 4, 6, 4)] {
            let expected = brute_force(&image, x0, y0, x1, y1);
            let actual = integral.rectangle_sum(x0 as isize, y0 as isize, x1 as isize, y1 as isize);
            assert!((expected - actual).abs() < 1e-9, "{expected} != {actual}");
        }
    }

    #[test]
    fn rectangles_are_clipped_to_the_image() {
        let image = ramp();
        let integral = IntegralImage::new(&image);
        let whole = brute_force(&image, 0, 0, 6, 4);
        assert!((integral.rectangle_sum(-10, -10, 100, 100) - whole).abs() < 1e-9);
        assert_eq!(integral.rectangle_sum(8, 0, 12, 4), 0.0);
        assert_eq!(integral.rectangle_sum(3, 3, 2, 4), 0.0);
        assert_eq!(integral.box_sum(1, 1, 0, 3), 0.0);
    }

    #[test]
    fn haar_responses_follow_the_gradient() {
        // Bright right half: a pure horizontal gradient.
        let image = GrayFloatImage::from_fn(32, 32, |x, _| if x >= 16 { 1.0 } else { 0.0 });
        let integral = IntegralImage::new(&image);
        assert!(integral.haar_x(16, 16, 8) > 0.0);
        assert_eq!(integral.haar_y(16, 16, 8), 0.0);
        // Far from the edge, nothing changes.
        assert_eq!(integral.haar_x(16, 4, 4), 0.0);
    }
}
